//! Integration tests for sjtagent.

mod batch_scheduling;
mod cli;
mod pipeline;
