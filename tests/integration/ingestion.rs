#![allow(missing_docs)]

use netpack::geom::{Coord, Geometry};
use netpack::graph::{LAYER_KEY, LENGTH_KEY};
use netpack::{AttrValue, Attrs, EdgeRecord, GraphError, GraphStore, IngestOptions, Result, StoreOptions};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn json_tuples_with_geometry() -> Result<()> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    let edges = vec![
        json!(["n1", "n2", {
            "highway": "residential",
            "lanes": 2,
            "geom": {"type": "LineString", "coordinates": [[8.54, 47.37], [8.55, 47.37]]}
        }]),
        json!([3, 4]),
        json!(["n2", "n1", {"oneway": null, "maxspeed": 30.5}]),
    ];
    let summary = g.add_edges(edges, 2, None)?;
    assert_eq!(summary.offered, 3);
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.nodes_inserted, 4);
    assert_eq!(summary.batches, 2);

    let edge = g.get_edge("n1", "n2")?;
    assert_eq!(edge.get("lanes"), Some(&AttrValue::Integer(2)));
    assert_eq!(
        edge.geom(),
        Some(&Geometry::LineString(vec![Coord::new(8.54, 47.37), Coord::new(8.55, 47.37)]))
    );
    assert!(g.has_edge("3", "4")?);
    let back = g.get_edge("n2", "n1")?;
    assert!(!back.contains_key("oneway"), "null reads back as absent");
    assert_eq!(back.get("maxspeed"), Some(&AttrValue::Real(30.5)));
    assert_eq!(g.get_node("n2")?.geom(), Some(&Geometry::Point(Coord::new(8.55, 47.37))));
    Ok(())
}

#[test]
fn columns_appear_as_batches_introduce_them() -> Result<()> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    let first = g.add_edges(vec![("a", "b", Attrs::new().with("w", 1))], 10, None)?;
    let second = g.add_edges(
        vec![("b", "c", Attrs::new().with("w", 2).with("bridge", "yes"))],
        10,
        None,
    )?;
    assert_eq!(first.columns_added, 1);
    assert_eq!(second.columns_added, 1);
    assert!(!g.get_edge("a", "b")?.contains_key("bridge"));
    assert_eq!(g.get_edge("b", "c")?.get("bridge"), Some(&AttrValue::from("yes")));
    Ok(())
}

#[test]
fn duplicate_pairs_keep_the_first_edge() -> Result<()> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    let edges = (0..10).map(|i| EdgeRecord::new("a", "b", Attrs::new().with("seq", i)));
    let summary = g.add_edges(edges, 3, None)?;
    assert_eq!(summary.offered, 10);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.batches, 4);
    assert_eq!(g.size()?, 1);
    assert_eq!(g.get_edge("a", "b")?.get("seq"), Some(&AttrValue::Integer(0)));
    Ok(())
}

#[test]
fn defaults_and_derived_length() -> Result<()> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    let opts = IngestOptions::from_store(g.options())
        .defaults(Attrs::new().with(LAYER_KEY, "drive").with("w", 1))
        .compute_length(true);
    let line = Geometry::LineString(vec![Coord::new(0.0, 0.0), Coord::new(0.0, 1.0)]);
    g.ingest(
        vec![
            ("a", "b", Attrs::new().with("w", 5).with_geom(line)),
            ("b", "c", Attrs::new().with(LENGTH_KEY, 12.0)),
        ],
        &opts,
        None,
    )?;

    let ab = g.get_edge("a", "b")?;
    assert_eq!(ab.get(LAYER_KEY), Some(&AttrValue::from("drive")));
    assert_eq!(ab.get("w"), Some(&AttrValue::Integer(5)), "edge data wins over defaults");
    let length = ab.get(LENGTH_KEY).and_then(AttrValue::as_f64).unwrap_or_default();
    assert!((length - 111_195.0).abs() < 10.0, "length {length}");

    let bc = g.get_edge("b", "c")?;
    assert_eq!(bc.get("w"), Some(&AttrValue::Integer(1)));
    assert_eq!(bc.get(LENGTH_KEY), Some(&AttrValue::Real(12.0)));
    Ok(())
}

#[test]
fn malformed_input_aborts_before_the_batch_commits() -> Result<()> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    let edges = vec![json!(["a", "b"]), json!(["c", "d"]), json!(["e"]), json!(["f", "g"])];
    let err = g.add_edges(edges, 2, None).unwrap_err();
    assert!(matches!(err, GraphError::InvalidEdgeShape(_)));
    assert_eq!(g.size()?, 2, "only the first full batch was committed");

    let err = g
        .add_edges(vec![json!(["x", "y", {"tags": {"a": 1}}])], 10, None)
        .unwrap_err();
    assert!(matches!(err, GraphError::UnsupportedAttributeType { ref key, .. } if key == "tags"));
    Ok(())
}

#[test]
fn progress_counts_every_committed_edge() -> Result<()> {
    let dir = tempdir()?;
    let g = GraphStore::create(dir.path().join("net.gpkg"), StoreOptions::bulk_load())?;
    let mut seen = 0usize;
    let mut progress = |n: usize| seen += n;
    let edges: Vec<(String, String)> = (0..250).map(|i| (i.to_string(), (i + 1).to_string())).collect();
    let summary = g.add_edges(edges, 64, Some(&mut progress))?;
    assert_eq!(seen, 250);
    assert_eq!(summary.batches, 4);
    assert_eq!(summary.nodes_inserted, 251);
    assert_eq!(g.node_count()?, 251);
    Ok(())
}
