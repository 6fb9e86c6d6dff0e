//! Loading scale and trait metadata files into a batch request.
//!
//! The scale file maps each trait id to its items:
//!
//! ```json
//! {"N1": {"items": {"1": {"item": "I worry about things"}}}}
//! ```
//!
//! The metadata file maps each trait id to its facet description:
//!
//! ```json
//! {"N1": {"domain": "Neuroticism", "facet_name": "Anxiety",
//!         "low_score": "...", "high_score": "..."}}
//! ```
//!
//! Anchors may be plain strings or structured objects. Objects are kept as
//! compact JSON text.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{GenerationError, Result};
use crate::model::TraitProfile;
use crate::parallel::{BatchRequest, TraitBatch};

#[derive(Debug, Clone, Deserialize)]
struct ScaleEntry {
    #[serde(default)]
    items: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct ItemEntry {
    item: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TraitMeta {
    domain: String,
    facet_name: String,
    low_score: Value,
    high_score: Value,
}

/// A scale and its trait metadata, parsed but not yet selected.
#[derive(Debug, Clone)]
pub struct Dataset {
    scale: Map<String, Value>,
    meta: Map<String, Value>,
}

impl Dataset {
    pub fn load(scale_path: &Path, meta_path: &Path) -> Result<Self> {
        let scale = read_object(scale_path)?;
        let meta = read_object(meta_path)?;
        Ok(Self { scale, meta })
    }

    pub fn from_values(scale: Value, meta: Value) -> Result<Self> {
        Ok(Self {
            scale: into_object(scale, "scale")?,
            meta: into_object(meta, "metadata")?,
        })
    }

    /// Trait ids in scale file order.
    pub fn trait_ids(&self) -> Vec<&str> {
        self.scale.keys().map(String::as_str).collect()
    }

    /// Source items of one trait, in file order.
    pub fn items(&self, trait_id: &str) -> Result<Vec<String>> {
        let entry = self.scale.get(trait_id).ok_or_else(|| {
            GenerationError::configuration(format!("trait {trait_id} is not in the scale file"))
        })?;
        let entry: ScaleEntry = serde_json::from_value(entry.clone()).map_err(|e| {
            GenerationError::configuration(format!("scale entry for {trait_id}: {e}"))
        })?;
        entry
            .items
            .into_iter()
            .map(|(key, value)| {
                serde_json::from_value::<ItemEntry>(value)
                    .map(|entry| entry.item)
                    .map_err(|e| {
                        GenerationError::configuration(format!(
                            "item {key} of trait {trait_id}: {e}"
                        ))
                    })
            })
            .collect()
    }

    /// The profile of one trait, named `"{domain}-{facet_name}"`.
    pub fn profile(&self, trait_id: &str) -> Result<TraitProfile> {
        let raw = self.meta.get(trait_id).ok_or_else(|| {
            GenerationError::configuration(format!("trait {trait_id} is not in the metadata file"))
        })?;
        let meta: TraitMeta = serde_json::from_value(raw.clone()).map_err(|e| {
            GenerationError::configuration(format!("metadata for {trait_id}: {e}"))
        })?;
        let profile = TraitProfile::new(
            trait_id,
            format!("{}-{}", meta.domain, meta.facet_name),
            anchor_text(&meta.low_score),
            anchor_text(&meta.high_score),
        )
        .with_description(raw.to_string());
        profile.validate()?;
        Ok(profile)
    }

    /// Builds the batch for `traits`, or for every trait in the scale when
    /// `traits` is empty.
    pub fn batch_request(&self, traits: &[String]) -> Result<BatchRequest> {
        let selected: Vec<&str> = if traits.is_empty() {
            self.trait_ids()
        } else {
            traits.iter().map(String::as_str).collect()
        };
        if selected.is_empty() {
            return Err(GenerationError::configuration("the scale file lists no traits"));
        }

        let mut batches = Vec::with_capacity(selected.len());
        for trait_id in selected {
            let profile = self.profile(trait_id)?;
            let items = self.items(trait_id)?;
            debug!(trait_id, items = items.len(), "Loaded trait");
            batches.push(TraitBatch::new(profile, items));
        }
        let request = BatchRequest::new(batches);
        request.validate()?;
        Ok(request)
    }
}

fn anchor_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn read_object(path: &Path) -> Result<Map<String, Value>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        GenerationError::configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    let value: Value = serde_json::from_str(&text)?;
    into_object(value, &path.display().to_string())
}

fn into_object(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(GenerationError::configuration(format!(
            "{what} must be a JSON object keyed by trait"
        ))),
    }
}
