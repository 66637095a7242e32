#![allow(missing_docs)]

use netpack::{AdjacencyRead, AttrValue, Attrs, Dir, EdgeAttributes, GraphError, GraphStore, Result, StoreOptions};
use tempfile::tempdir;

fn diamond() -> Result<GraphStore> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    g.add_edges(
        vec![
            ("s", "a", Attrs::new().with("w", 1)),
            ("s", "b", Attrs::new().with("w", 2)),
            ("a", "t", Attrs::new().with("w", 2)),
            ("b", "t", Attrs::new().with("w", 1)),
        ],
        2,
        None,
    )?;
    g.add_node("island", &Attrs::new())?;
    Ok(g)
}

#[test]
fn outer_views_are_keyed_by_every_node() -> Result<()> {
    let g = diamond()?;
    let succ = g.succ();
    assert_eq!(succ.dir(), Dir::Out);
    assert_eq!(AdjacencyRead::len(&succ)?, 5);
    assert!(succ.contains("island")?);
    assert!(!succ.contains("nowhere")?);
    assert!(succ.get("island").is_empty()?);
    assert!(succ.get("t").is_empty()?);
    assert_eq!(g.pred().get("t").len()?, 2);

    let mut keys: Vec<String> = succ.iter_keys()?.collect_vec()?;
    keys.sort();
    assert_eq!(keys, vec!["a", "b", "island", "s", "t"]);
    assert_eq!(succ.items()?.len(), 5);
    Ok(())
}

#[test]
fn inner_views_read_edges_in_both_directions() -> Result<()> {
    let g = diamond()?;
    let out_of_s = g.succ().get("s");
    assert_eq!(out_of_s.node(), "s");
    assert!(out_of_s.contains("a")?);
    assert!(!out_of_s.contains("t")?);
    assert_eq!(out_of_s.get("b").get("w")?, Some(AttrValue::Integer(2)));

    let into_t = g.pred().get("t");
    let mut keys = into_t.keys()?.collect_vec()?;
    keys.sort();
    assert_eq!(keys, vec!["a", "b"]);
    let edge = into_t.get("a");
    assert_eq!((edge.u(), edge.v()), (Some("a"), Some("t")));
    assert_eq!(edge.get("w")?, Some(AttrValue::Integer(2)));
    Ok(())
}

#[test]
fn missing_edges_surface_on_first_read() -> Result<()> {
    let g = diamond()?;
    let ghost = g.succ().get("s").get("t");
    assert!(matches!(ghost.get("w"), Err(GraphError::EdgeNotFound { .. })));
    assert!(matches!(ghost.keys(), Err(GraphError::EdgeNotFound { .. })));
    Ok(())
}

#[test]
fn edge_attribute_writes_go_straight_to_storage() -> Result<()> {
    let g = diamond()?;
    let mut edge = g.succ().get("s").get("a");
    edge.set("w", 7)?;
    edge.update(&Attrs::new().with("surface", "gravel"))?;
    assert_eq!(edge.get("surface")?, Some(AttrValue::from("gravel")));

    let fresh = g.pred().get("a").get("s");
    assert_eq!(fresh.get("w")?, Some(AttrValue::Integer(7)));
    assert_eq!(fresh.keys()?, vec!["surface".to_string(), "w".to_string()]);
    Ok(())
}

#[test]
fn cached_attributes_refresh_on_demand() -> Result<()> {
    let g = diamond()?;
    let mut items = g.succ().get("s").items()?;
    let (_, edge) = items.remove(0);
    assert_eq!(edge.get("w")?, Some(AttrValue::Integer(1)));

    g.update_edge("s", "a", &Attrs::new().with("w", 4))?;
    assert_eq!(edge.get("w")?, Some(AttrValue::Integer(1)), "items are preloaded");
    let mut edge = edge;
    edge.refresh();
    assert_eq!(edge.get("w")?, Some(AttrValue::Integer(4)));
    Ok(())
}

#[test]
fn view_mutators_update_the_graph() -> Result<()> {
    let g = diamond()?;
    g.pred().get("t").set("island", &Attrs::new().with("w", 9))?;
    assert!(g.has_edge("island", "t")?);

    assert!(g.succ().get("s").delete("b")?);
    assert!(!g.succ().get("s").delete("b")?);
    assert_eq!(g.pred().delete("t")?, 3);
    assert!(g.pred().get("t").is_empty()?);

    let nodes = g.node_store();
    nodes.set("depot", &Attrs::new().with("kind", "hub"))?;
    assert_eq!(nodes.get("depot")?.get("kind"), Some(&AttrValue::from("hub")));
    assert!(nodes.delete("depot")?);
    assert!(!nodes.contains("depot")?);
    assert!(matches!(nodes.get("depot"), Err(GraphError::NodeNotFound { .. })));
    Ok(())
}

#[test]
fn detached_attributes_are_read_only() {
    let mut edge = EdgeAttributes::detached(Attrs::new().with("w", 3));
    assert_eq!(edge.u(), None);
    assert_eq!(edge.to_attrs().unwrap().len(), 1);
    assert!(matches!(edge.update(&Attrs::new()), Err(GraphError::UninitializedEdge)));
}

#[test]
fn views_over_read_only_store() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("net.gpkg");
    {
        let g = GraphStore::create(&path, StoreOptions::default())?;
        g.insert_or_replace_edge("a", "b", &Attrs::new().with("w", 1))?;
    }
    let g = GraphStore::open(&path, StoreOptions::read_only())?;
    assert_eq!(g.adjacency(Dir::In).get("b").keys()?.collect_vec()?, vec!["a"]);
    assert!(matches!(g.succ().delete("a"), Err(GraphError::ImmutableGraph)));
    assert!(matches!(g.pred().set("b", Vec::<(String, Attrs)>::new()), Err(GraphError::ImmutableGraph)));
    assert!(matches!(g.node_store().set("c", &Attrs::new()), Err(GraphError::ImmutableGraph)));
    Ok(())
}
