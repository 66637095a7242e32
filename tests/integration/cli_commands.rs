#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use netpack::{GraphStore, StoreOptions};
use serde_json::Value;
use tempfile::TempDir;

const EDGES: &str = r#"["a", "b", {"w": 1, "geom": {"type": "LineString", "coordinates": [[0.0, 0.0], [0.001, 0.0]]}}]
["b", "c", {"w": 2, "geom": {"type": "LineString", "coordinates": [[0.001, 0.0], [0.002, 0.0]]}}]

["a", "c", {"w": 5, "geom": {"type": "LineString", "coordinates": [[0.0, 0.0], [0.002, 0.0]]}}]
["a", "b", {"w": 9}]
"#;

/// Command isolated from any user-level config file.
fn netpack(dir: &TempDir) -> Command {
    let config = dir.path().join("cli.toml");
    if !config.exists() {
        fs::write(&config, "").expect("write config");
    }
    let mut cmd = cargo_bin_cmd!("netpack");
    cmd.env("NETPACK_CONFIG", config).env_remove("RUST_LOG");
    cmd
}

fn imported(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join(format!("{name}.gpkg"));
    let edges = dir.path().join("edges.jsonl");
    fs::write(&edges, EDGES).expect("write edges");
    netpack(&dir)
        .arg("import")
        .arg(&db)
        .arg(&edges)
        .arg("--quiet")
        .assert()
        .success();
    (dir, db)
}

fn json_output(dir: &TempDir, args: &[&str], db: &Path) -> Value {
    let output = netpack(dir)
        .args(["--format", "json"])
        .arg(args[0])
        .arg(db)
        .args(&args[1..])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn init_creates_an_empty_graph() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("empty.gpkg");
    let json = json_output(&dir, &["init", "--srid", "4326"], &db);
    assert_eq!(json["srid"], 4326);
    assert_eq!(json["spatial_index"], true);

    let g = GraphStore::open(&db, StoreOptions::read_only()).expect("open");
    assert_eq!(g.size().expect("size"), 0);

    netpack(&dir).arg("init").arg(&db).assert().failure();
}

#[test]
fn import_reports_counts_and_duplicates() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("net.gpkg");
    let edges = dir.path().join("edges.jsonl");
    fs::write(&edges, EDGES).expect("write edges");

    let edges_arg = edges.to_string_lossy().into_owned();
    let json = json_output(&dir, &["import", &edges_arg, "--batch-size", "2", "--layer", "walk"], &db);
    assert_eq!(json["offered"], 4);
    assert_eq!(json["inserted"], 3);
    assert_eq!(json["ignored"], 1);
    assert_eq!(json["nodes_inserted"], 3);
    assert_eq!(json["batches"], 2);

    let g = GraphStore::open(&db, StoreOptions::read_only()).expect("open");
    let ab = g.get_edge("a", "b").expect("edge");
    assert_eq!(ab.get("w").and_then(|w| w.as_i64()), Some(1));
    assert_eq!(ab.get("_layer").and_then(|l| l.as_str()), Some("walk"));
    assert!(g.edges_table().has_spatial_index().expect("index"));
}

#[test]
fn bulk_import_still_ends_indexed() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("bulk.gpkg");
    let edges = dir.path().join("edges.jsonl");
    fs::write(&edges, EDGES).expect("write edges");
    netpack(&dir)
        .arg("import")
        .arg(&db)
        .arg(&edges)
        .args(["--bulk", "--quiet"])
        .assert()
        .success();

    let json = json_output(&dir, &["info"], &db);
    assert_eq!(json["edges"], 3);
    let tables = json["tables"].as_array().expect("tables");
    assert!(tables.iter().all(|t| t["spatial_index"] == true));
}

#[test]
fn import_rejects_malformed_lines() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("bad.gpkg");
    let edges = dir.path().join("edges.jsonl");
    fs::write(&edges, "[\"a\", \"b\"]\n[\"a\"]\n").expect("write edges");
    let output = netpack(&dir)
        .arg("import")
        .arg(&db)
        .arg(&edges)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(stderr.contains("line 2"), "stderr: {stderr}");
}

#[test]
fn info_lists_both_graph_tables() {
    let (dir, db) = imported("info");
    let json = json_output(&dir, &["info"], &db);
    assert_eq!(json["nodes"], 3);
    assert_eq!(json["edges"], 3);
    let names: Vec<&str> = json["tables"]
        .as_array()
        .expect("tables")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"edges"));
    assert!(names.contains(&"nodes"));
}

#[test]
fn route_uses_the_weight_attribute() {
    let (dir, db) = imported("route");
    let json = json_output(&dir, &["route", "--from", "a", "--to", "c", "--weight", "w"], &db);
    assert_eq!(json["distance"], 3.0);
    assert_eq!(json["path"], serde_json::json!(["a", "b", "c"]));

    let json = json_output(&dir, &["route", "--from", "a", "--to", "c"], &db);
    assert_eq!(json["hops"], 1);
}

#[test]
fn route_to_unreachable_node_fails() {
    let (dir, db) = imported("noroute");
    netpack(&dir)
        .arg("route")
        .arg(&db)
        .args(["--from", "c", "--to", "a"])
        .assert()
        .failure();
}

#[test]
fn nearby_returns_sorted_hits() {
    let (dir, db) = imported("nearby");
    let json = json_output(
        &dir,
        &["nearby", "--lon", "0.0015", "--lat", "0.0", "--distance", "10", "--sorted"],
        &db,
    );
    let hits = json.as_array().expect("hits");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h["distance"].as_f64().unwrap_or(f64::MAX) <= 10.0));
    assert!(hits.iter().all(|h| h["attrs"].get("geom").is_none()));

    let json = json_output(
        &dir,
        &["nearby", "--lon", "0.0", "--lat", "0.0", "--distance", "1", "--nodes"],
        &db,
    );
    assert_eq!(json[0]["key"], "a");
}

#[test]
fn reindex_and_text_output() {
    let (dir, db) = imported("reindex");
    let output = netpack(&dir)
        .args(["--theme", "plain", "reindex"])
        .arg(&db)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("reindexed"));
}

#[test]
fn config_file_sets_the_default_format() {
    let (dir, db) = imported("config");
    fs::write(dir.path().join("cli.toml"), "format = \"json\"\n").expect("write config");
    let output = netpack(&dir)
        .arg("info")
        .arg(&db)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["edges"], 3);
}
