use assert_cmd::Command;
use gridscope_cli::manifest::latest_manifest;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const BOUNDARY: &str = r#"{
  "type": "FeatureCollection",
  "features": [{
    "type": "Feature",
    "properties": { "name": "Aracaju" },
    "geometry": {
      "type": "Polygon",
      "coordinates": [[[-37.1, -11.0], [-37.0, -11.0], [-37.0, -10.9], [-37.1, -10.9], [-37.1, -11.0]]]
    }
  }]
}"#;

fn months(value: &str) -> String {
    vec![value; 12].join(",")
}

/// Workspace with boundary, asset tables and a config using relative paths.
fn workspace(substations: &str) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("boundary.geojson"), BOUNDARY).unwrap();
    fs::write(data.join("substations.csv"), substations).unwrap();
    fs::write(
        data.join("transformers.csv"),
        "COD_ID,x,y\nT-1,-37.079,-10.979\nT-2,-37.021,-10.979\nT-3,-37.05,-10.921\n",
    )
    .unwrap();
    let energy_header: Vec<String> = (1..=12).map(|m| format!("ENE_{m:02}")).collect();
    fs::write(
        data.join("consumers.csv"),
        format!(
            "COD_ID,UNI_TR_MT,CLAS_SUB,{}\nUC-1,T-1,RE1,{}\nUC-2,T-2,CO1,{}\nUC-3,T-3,IN,{}\n",
            energy_header.join(","),
            months("100"),
            months("300"),
            months(""),
        ),
    )
    .unwrap();
    fs::write(
        data.join("generation_units.csv"),
        "COD_ID,UNI_TR_MT,PN_CON,POT_INST\nGD-1,T-2,UC-2,6000\n",
    )
    .unwrap();

    let config = dir.path().join("gridscope.toml");
    fs::write(
        &config,
        r#"
place = "Aracaju"

[boundary]
file = "data/boundary.geojson"

[assets]
substations = "data/substations.csv"
transformers = "data/transformers.csv"
consumers = "data/consumers.csv"
generation_units = "data/generation_units.csv"

[store]
dir = "store"
"#,
    )
    .unwrap();
    (dir, config)
}

const THREE_SUBSTATIONS: &str =
    "COD_ID,NOM,x,y\nSE-1,Norte,-37.08,-10.98\nSE-2,Sul,-37.02,-10.98\nSE-3,Centro,-37.05,-10.92\n";

fn gridscope(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("gridscope").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

#[test]
fn run_publishes_a_snapshot_that_show_reads_back() {
    let (dir, config) = workspace(THREE_SUBSTATIONS);

    gridscope(&config)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("SE-1"))
        .stdout(predicate::str::contains("Data quality"))
        .stdout(predicate::str::contains("zero_filled_energy"));
    assert!(dir.path().join("store/CURRENT").exists());

    let output = gridscope(&config)
        .args(["show", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let records: Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[1]["id"], "SE-2");
    assert_eq!(records[1]["criticality_level"], "high");
    assert_eq!(records[1]["geometry"]["type"], "MultiPolygon");
    assert_eq!(records[2]["annual_consumption"], 0.0);

    gridscope(&config)
        .args(["show", "--territory", "SE-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Residential"))
        .stdout(predicate::str::contains("TOTAL"))
        .stdout(predicate::str::contains("SE-2").not());

    gridscope(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("fresh"))
        .stdout(predicate::str::contains("Aracaju"));

    let manifest = latest_manifest(&dir.path().join("store/runs")).unwrap().unwrap();
    assert_eq!(manifest.command, "run");
    assert_eq!(manifest.param("place"), Some("Aracaju"));
}

#[test]
fn territories_writes_geojson_without_publishing() {
    let (dir, config) = workspace(THREE_SUBSTATIONS);
    let out = dir.path().join("out/territories.geojson");

    gridscope(&config)
        .args(["territories", "--place", "Aracaju", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 territories"));

    let document: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let features = document["features"].as_array().unwrap();
    assert_eq!(features.len(), 3);
    assert_eq!(features[0]["properties"]["id"], "SE-1");
    assert_eq!(features[0]["properties"]["name"], "Norte");
    assert!(!dir.path().join("store/CURRENT").exists());
    assert!(latest_manifest(&dir.path().join("out")).unwrap().is_some());
}

#[test]
fn failed_run_exits_non_zero_and_keeps_store() {
    let (dir, config) = workspace(THREE_SUBSTATIONS);
    gridscope(&config).arg("run").assert().success();
    let pointer = fs::read_to_string(dir.path().join("store/CURRENT")).unwrap();

    fs::write(
        dir.path().join("data/substations.csv"),
        "COD_ID,NOM,x,y\nSE-1,Norte,-37.08,-10.98\nSE-9,Longe,-36.5,-10.9\n",
    )
    .unwrap();
    gridscope(&config)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[input]"))
        .stderr(predicate::str::contains("at least 2 substations"));

    assert_eq!(fs::read_to_string(dir.path().join("store/CURRENT")).unwrap(), pointer);
}

#[test]
fn show_before_any_run_is_a_persistence_error() {
    let (_dir, config) = workspace(THREE_SUBSTATIONS);
    gridscope(&config)
        .arg("show")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[persistence]"));

    gridscope(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No snapshot published"));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("gridscope.toml");
    fs::write(&config, "[pipeline]\nfar_point_factor = 1.0\n").unwrap();
    gridscope(&config)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[config]"));
}
