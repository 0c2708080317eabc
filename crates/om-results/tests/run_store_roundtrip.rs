use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use om_results::{
    EnvelopeRecord, EnvelopeReport, ParticleRecord, ResultsError, RunManifest, RunReport,
    RunStore, RunType, TrackReport,
};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{}_{nanos}", std::process::id()))
}

fn envelope_report() -> RunReport {
    RunReport::Envelope(EnvelopeReport {
        space_charge: false,
        iterations: 0,
        residual: 0.0,
        records: vec![EnvelopeRecord {
            element: "START".to_string(),
            s_m: 0.0,
            sigma_x_m: 1e-3,
            sigma_y_m: 1e-3,
            sigma_z_m: 0.0,
            emittance_x_m: 1e-6,
            emittance_y_m: 1e-6,
            emittance_z_m: 0.0,
        }],
    })
}

#[test]
fn save_list_load_roundtrip() {
    let project_dir = unique_temp_dir("om_results_project");
    fs::create_dir_all(&project_dir).expect("failed to create temp project dir");
    let project_path = project_dir.join("project.yaml");
    fs::write(&project_path, "version: 1\nname: test\n").expect("failed to write project file");

    let store = RunStore::for_project(&project_path).expect("failed to create run store");
    assert!(store.root_dir().ends_with(".optim/runs"));

    let manifest = RunManifest::new("run-123".to_string(), "line", RunType::Envelope, "0.1.0");
    let report = envelope_report();
    store.save_run(&manifest, &report).expect("failed to save run");
    assert!(store.has_run("run-123"));

    let runs = store.list_runs("line").expect("failed to list runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0], manifest);
    assert!(store.list_runs("ring").unwrap().is_empty());

    let loaded = store.load_report("run-123").expect("failed to load report");
    assert_eq!(loaded, report);

    store.delete_run("run-123").unwrap();
    assert!(!store.has_run("run-123"));
    fs::remove_dir_all(project_dir).ok();
}

#[test]
fn missing_run_is_reported() {
    let store = RunStore::new(unique_temp_dir("om_results_missing")).unwrap();
    assert!(matches!(
        store.load_manifest("nope"),
        Err(ResultsError::RunNotFound { .. })
    ));
}

#[test]
fn track_report_serializes_losses() {
    let report = RunReport::Track(TrackReport {
        turns: 5,
        fast: false,
        particles: vec![ParticleRecord {
            index: 0,
            coords: [0.02, 0.0, 0.0, 0.0, 0.0, 0.0],
            turn: 2,
            alive: false,
            lost_element: Some("COL".to_string()),
            lost_element_index: Some(4),
            lost_turn: Some(2),
            loss_reason: Some("aperture".to_string()),
            history: Vec::new(),
        }],
    });
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"kind\":\"Track\""));
    assert!(!json.contains("history"));
    let back: RunReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
}
