//! CLI tests for the sjtagent binary.
//!
//! `generate` runs against a shell-script backend so the whole batch path,
//! including export, is exercised without a network.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const PASSING_OPTIONS: &str = r#"[
    {"label": "A", "action": "Ask for the deadline to move", "rationale": "negotiates", "trait_level": "high"},
    {"label": "B", "action": "Work late before the deadline", "rationale": "absorbs", "trait_level": "high"},
    {"label": "C", "action": "Split the deadline work", "rationale": "shares", "trait_level": "mid"},
    {"label": "D", "action": "Start the deadline task tomorrow", "rationale": "defers", "trait_level": "low"},
    {"label": "E", "action": "Ignore the deadline", "rationale": "disengages", "trait_level": "low"}
]"#;

const UNCOUPLED_OPTIONS: &str = r#"{"options": [
    {"label": "A", "action": "Keep going", "rationale": "same", "trait_level": "high"},
    {"label": "B", "action": "Keep going", "rationale": "same", "trait_level": "high"},
    {"label": "C", "action": "Keep going", "rationale": "same", "trait_level": "high"},
    {"label": "D", "action": "Keep going", "rationale": "same", "trait_level": "high"},
    {"label": "E", "action": "Keep going", "rationale": "same", "trait_level": "high"}
]}"#;

const SCALE: &str = r#"{
    "N1": {"items": {"1": {"item": "I worry about things"}, "2": {"item": "I fear for the worst"}}},
    "E1": {"items": {"1": {"item": "I make friends easily"}}}
}"#;

const META: &str = r#"{
    "N1": {"domain": "Neuroticism", "facet_name": "Anxiety",
           "low_score": "Relaxed and calm", "high_score": "Tense and apprehensive"},
    "E1": {"domain": "Extraversion", "facet_name": "Friendliness",
           "low_score": "Reserved", "high_score": "Warm"}
}"#;

/// Answers each stage with a fixed reply.
const BACKEND_SCRIPT: &str = r#"input=$(cat)
case "$input" in
  *'"template_id":"trait_analysis"'*)
    echo '{"components": {"cognitive": ["expects trouble"], "affective": ["tension"], "behavioral": ["checks twice"]}, "mapping": {"observable_cues": ["a deadline"]}}' ;;
  *'"template_id":"anchor_polish"'*)
    echo '{"high_score": {"cognitive": "c", "emotional": "e", "behavioral": "b"}, "low_score": {"cognitive": "c", "emotional": "e", "behavioral": "b"}}' ;;
  *'"template_id":"cue_generation"'*)
    echo '{"cues": ["the deadline moves up", "a colleague calls in sick"]}' ;;
  *'"template_id":"situation_construction"'*)
    echo 'Sure. {"outline": {"prototype": "pressure", "cues": ["deadline"]}, "scenario_text": "Your deadline just moved up by a day."}' ;;
  *)
    echo '{"options": [
      {"label": "A", "action": "Ask to move the deadline", "rationale": "r1", "trait_level": "high"},
      {"label": "B", "action": "Stay late for the deadline", "rationale": "r2", "trait_level": "high"},
      {"label": "C", "action": "Split the deadline work", "rationale": "r3", "trait_level": "mid"},
      {"label": "D", "action": "Note the deadline and carry on", "rationale": "r4", "trait_level": "low"},
      {"label": "E", "action": "Let the deadline slide", "rationale": "r5", "trait_level": "low"}
    ]}' ;;
esac
"#;

/// Get a Command instance for the sjtagent binary
#[allow(deprecated)]
fn sjtagent_cmd() -> Command {
    Command::cargo_bin("sjtagent").expect("Failed to find sjtagent binary")
}

#[test]
fn test_help_lists_subcommands() {
    sjtagent_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("evaluate"));
}

#[test]
fn test_evaluate_passing_options_exits_zero() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let options_path = temp_dir.path().join("options.json");
    fs::write(&options_path, PASSING_OPTIONS).expect("Failed to write options");

    sjtagent_cmd()
        .arg("evaluate")
        .arg("--options")
        .arg(&options_path)
        .arg("--cues")
        .arg("deadline")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pass\": true"))
        .stdout(predicate::str::contains("\"level_coverage\": 1.0"));
}

#[test]
fn test_evaluate_failing_options_exits_two() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let options_path = temp_dir.path().join("options.json");
    fs::write(&options_path, UNCOUPLED_OPTIONS).expect("Failed to write options");

    sjtagent_cmd()
        .args(["evaluate", "--cues", "deadline,manager", "--options"])
        .arg(&options_path)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"pass\": false"))
        .stdout(predicate::str::contains("insufficient distinctness"))
        .stdout(predicate::str::contains("missing level coverage"))
        .stdout(predicate::str::contains("insufficient cue coupling"));
}

#[test]
fn test_evaluate_missing_file_reports_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    sjtagent_cmd()
        .arg("evaluate")
        .arg("--options")
        .arg(temp_dir.path().join("absent.json"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_generate_rejects_unknown_trait() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let scale = temp_dir.path().join("scale.json");
    let meta = temp_dir.path().join("meta.json");
    fs::write(&scale, SCALE).expect("Failed to write scale");
    fs::write(&meta, META).expect("Failed to write meta");

    sjtagent_cmd()
        .env("OPENAI_API_KEY", "test-key")
        .arg("generate")
        .arg("--scale")
        .arg(&scale)
        .arg("--meta")
        .arg(&meta)
        .args(["--traits", "Z9"])
        .arg("--out")
        .arg(temp_dir.path().join("out"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("configuration error"))
        .stderr(predicate::str::contains("Z9"));

    assert!(!temp_dir.path().join("out").exists());
}

#[cfg(unix)]
#[test]
fn test_generate_with_command_backend_exports_results() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();
    let script = dir.join("backend.sh");
    fs::write(&script, BACKEND_SCRIPT).expect("Failed to write backend script");
    fs::write(dir.join("scale.json"), SCALE).expect("Failed to write scale");
    fs::write(dir.join("meta.json"), META).expect("Failed to write meta");
    fs::write(
        dir.join("sjt.toml"),
        format!(
            "[backend]\nkind = \"command\"\ncommand = [\"sh\", \"{}\"]\n",
            script.display()
        ),
    )
    .expect("Failed to write config");

    sjtagent_cmd()
        .current_dir(dir)
        .args([
            "generate",
            "--scale",
            "scale.json",
            "--meta",
            "meta.json",
            "--config",
            "sjt.toml",
            "--items-per-source",
            "2",
            "--batch-concurrency",
            "2",
            "--out",
            "out",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("generated: 6"))
        .stdout(predicate::str::contains("results.json"));

    let results: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("out/results.json")).unwrap()).unwrap();
    let n1 = results["N1"].as_object().expect("N1 entries");
    assert_eq!(n1.len(), 4);
    for key in ["1", "2", "3", "4"] {
        assert_eq!(n1[key]["options"].as_array().map(Vec::len), Some(5));
    }
    assert_eq!(results["E1"].as_object().map(|m| m.len()), Some(2));

    let detailed: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.join("out/results_detailed.json")).unwrap(),
    )
    .unwrap();
    assert!(detailed["run_id"].as_str().unwrap().starts_with("run-"));
    assert_eq!(detailed["summary"]["passing_items"], 6);
    assert_eq!(
        detailed["results"]["N1"][0]["cues"][0],
        "the deadline moves up"
    );
}
