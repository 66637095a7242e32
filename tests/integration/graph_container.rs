#![allow(missing_docs)]

use netpack::geom::{Coord, Geometry};
use netpack::graph::{EDGES, LAYER_KEY, NODES, NODE_KEY, SOURCE_KEY, TARGET_KEY};
use netpack::{AttrValue, Attrs, GraphError, GraphStore, Result, StoreOptions};
use tempfile::tempdir;

fn street(from: (f64, f64), to: (f64, f64)) -> Geometry {
    Geometry::LineString(vec![Coord::from(from), Coord::from(to)])
}

fn sample(g: &GraphStore) -> Result<()> {
    g.add_edges(
        vec![
            ("a", "b", Attrs::new().with("w", 1).with_geom(street((0.0, 0.0), (0.001, 0.0)))),
            ("b", "c", Attrs::new().with("w", 2).with_geom(street((0.001, 0.0), (0.002, 0.0)))),
            ("c", "a", Attrs::new().with("w", 3).with_geom(street((0.002, 0.0), (0.0, 0.0)))),
            ("b", "d", Attrs::new().with("w", 4)),
        ],
        100,
        None,
    )?;
    Ok(())
}

#[test]
fn graph_tables_are_registered_feature_tables() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("net.gpkg");
    let g = GraphStore::create(&path, StoreOptions::default())?;
    let names: Vec<String> = g.container().feature_tables()?.into_iter().map(|d| d.name).collect();
    assert!(names.contains(&EDGES.to_string()));
    assert!(names.contains(&NODES.to_string()));
    assert_eq!(g.edges_table().def().geometry_type, "LINESTRING");
    assert_eq!(g.nodes_table().def().geometry_type, "POINT");

    let edge_columns: Vec<String> = g.edges_table().columns()?.into_iter().map(|c| c.name).collect();
    assert!(edge_columns.iter().any(|c| c == SOURCE_KEY));
    assert!(edge_columns.iter().any(|c| c == TARGET_KEY));
    let node_columns: Vec<String> = g.nodes_table().columns()?.into_iter().map(|c| c.name).collect();
    assert!(node_columns.iter().any(|c| c == NODE_KEY));
    Ok(())
}

#[test]
fn counts_and_lookups_after_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("net.gpkg");
    sample(&GraphStore::create(&path, StoreOptions::default())?)?;

    let g = GraphStore::open(&path, StoreOptions::read_only())?;
    assert_eq!(g.size()?, 4);
    assert_eq!(g.node_count()?, 4);
    assert!(g.has_node("d")?);
    assert!(!g.has_node("z")?);
    assert!(g.has_edge("c", "a")?);
    assert!(!g.has_edge("a", "c")?);
    assert_eq!(g.get_edge("b", "c")?.get("w"), Some(&AttrValue::Integer(2)));
    assert!(matches!(g.get_edge("a", "c"), Err(GraphError::EdgeNotFound { .. })));
    assert!(matches!(g.get_node("z"), Err(GraphError::NodeNotFound { .. })));
    assert_eq!(g.get_node("c")?.geom(), Some(&Geometry::Point(Coord::new(0.002, 0.0))));
    assert!(g.get_node("d")?.geom().is_none());
    Ok(())
}

#[test]
fn scans_are_lazy_and_restartable() -> Result<()> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    sample(&g)?;
    let mut scan = g.iter_edges()?;
    let first: Vec<_> = scan.iter()?.take(2).collect::<Result<_>>()?;
    assert_eq!(first.len(), 2);
    let all: Vec<_> = scan.iter()?.collect::<Result<_>>()?;
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|(_, _, attrs)| !attrs.contains_key(SOURCE_KEY)));

    let mut keys = g.node_keys()?.collect_vec()?;
    keys.sort();
    assert_eq!(keys, vec!["a", "b", "c", "d"]);
    assert_eq!(g.iter_nodes()?.collect_vec()?.len(), 4);
    Ok(())
}

#[test]
fn node_writes_merge_and_update() -> Result<()> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    g.add_node("x", &Attrs::new().with("name", "Depot"))?;
    g.add_node("x", &Attrs::new().with("capacity", 12))?;
    let x = g.get_node("x")?;
    assert_eq!(x.get("name"), Some(&AttrValue::from("Depot")));
    assert_eq!(x.get("capacity"), Some(&AttrValue::Integer(12)));

    assert_eq!(g.update_node("x", &Attrs::new().with("capacity", 20))?, 1);
    assert_eq!(g.update_node("missing", &Attrs::new().with("capacity", 1))?, 0);
    assert_eq!(g.get_node("x")?.get("capacity"), Some(&AttrValue::Integer(20)));
    Ok(())
}

#[test]
fn edge_mutations() -> Result<()> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    sample(&g)?;

    assert_eq!(
        g.update_edges(vec![("a", "b", Attrs::new().with("w", 10)), ("x", "y", Attrs::new().with("w", 1))])?,
        1
    );
    assert_eq!(g.get_edge("a", "b")?.get("w"), Some(&AttrValue::Integer(10)));
    assert!(g.get_edge("a", "b")?.geom().is_some(), "partial update keeps geometry");

    assert_eq!(g.delete_successors("b")?, 2);
    assert!(!g.has_edge("b", "c")?);
    assert!(g.has_node("c")?, "nodes outlive their edges");

    assert_eq!(g.delete_predecessors("a")?, 1);
    assert_eq!(g.delete_edges([("a", "b"), ("a", "b")])?, 1);
    assert_eq!(g.size()?, 0);
    Ok(())
}

#[test]
fn replace_neighbors_swaps_the_whole_set() -> Result<()> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    sample(&g)?;
    g.replace_successors("b", vec![("e", Attrs::new().with("w", 5))])?;
    let mut succ = g.successor_keys(Some("b"))?.collect_vec()?;
    succ.sort();
    assert_eq!(succ, vec!["e"]);
    assert!(g.has_node("e")?);

    g.replace_predecessors("a", Vec::<(String, Attrs)>::new())?;
    assert!(g.predecessor_keys(Some("a"))?.collect_vec()?.is_empty());
    Ok(())
}

#[test]
fn proximity_queries_on_both_tables() -> Result<()> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    sample(&g)?;
    // 0.0015 degrees east is the midpoint of b -> c, ~55 m from b and c.
    let edges = g.edges_within_distance(0.0015, 0.0, 10.0, true)?;
    let pairs: Vec<_> = edges.iter().map(|h| (h.u.as_str(), h.v.as_str())).collect();
    assert!(pairs.contains(&("b", "c")));
    assert!(pairs.contains(&("c", "a")), "c -> a overlaps b -> c");
    assert!(edges.windows(2).all(|w| w[0].distance <= w[1].distance));

    let nodes = g.nodes_within_distance(0.0015, 0.0, 60.0, true)?;
    let mut keys: Vec<_> = nodes.iter().map(|h| h.key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["b", "c"]);
    Ok(())
}

#[test]
fn in_memory_copy_is_independent() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("net.gpkg");
    let g = GraphStore::create(&path, StoreOptions::default())?;
    sample(&g)?;
    g.reindex()?;

    let copy = g.to_in_memory_copy()?;
    assert_eq!(copy.size()?, 4);
    assert!(copy.edges_table().has_spatial_index()?);
    copy.insert_or_replace_edge("d", "a", &Attrs::new())?;
    assert_eq!(copy.size()?, 5);
    assert_eq!(g.size()?, 4);
    Ok(())
}

#[test]
fn read_only_store_rejects_every_mutation() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("net.gpkg");
    sample(&GraphStore::create(&path, StoreOptions::default())?)?;
    let g = GraphStore::open(&path, StoreOptions::read_only())?;
    assert!(g.is_read_only());

    let rejected = [
        g.add_node("z", &Attrs::new()).err(),
        g.insert_or_replace_edge("a", "z", &Attrs::new()).err(),
        g.update_edge("a", "b", &Attrs::new().with("w", 0)).err(),
        g.delete_nodes(["a"]).err(),
        g.add_edges(vec![("x", "y")], 10, None).err(),
        g.reindex().err(),
    ];
    for err in rejected {
        assert!(matches!(err, Some(GraphError::ImmutableGraph)), "got {err:?}");
    }
    assert_eq!(g.size()?, 4);
    Ok(())
}

#[test]
fn bulk_load_defers_indexes_until_reindex() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bulk.gpkg");
    let g = GraphStore::create(&path, StoreOptions::bulk_load())?;
    assert!(!g.edges_table().has_spatial_index()?);
    g.drop_query_indexes()?;
    sample(&g)?;
    assert!(matches!(
        g.edges_within_distance(0.0, 0.0, 10.0, false),
        Err(GraphError::MissingSpatialIndex { .. })
    ));

    g.reindex()?;
    assert!(g.edges_table().has_spatial_index()?);
    assert!(g.nodes_table().has_spatial_index()?);
    assert!(!g.edges_within_distance(0.0, 0.0, 10.0, false)?.is_empty());
    Ok(())
}

#[test]
fn layer_tag_is_an_ordinary_attribute() -> Result<()> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    g.insert_or_replace_edge("a", "b", &Attrs::new().with(LAYER_KEY, "walk"))?;
    assert_eq!(g.get_edge("a", "b")?.get(LAYER_KEY), Some(&AttrValue::from("walk")));
    Ok(())
}
