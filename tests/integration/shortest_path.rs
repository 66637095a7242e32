#![allow(missing_docs)]

use netpack::{costs, Attrs, Dijkstra, GraphError, GraphStore, Result, StoreOptions};
use tempfile::tempdir;

/// A small grid-like street network:
///
/// ```text
///   a --1-- b --1-- c
///   |       |       |
///   4       1       1
///   |       |       |
///   d --1-- e --5-- f
/// ```
///
/// Every street is two-way except `e -> f`.
fn streets(g: &GraphStore) -> Result<()> {
    let two_way = [("a", "b", 1.0), ("b", "c", 1.0), ("a", "d", 4.0), ("b", "e", 1.0), ("c", "f", 1.0), ("d", "e", 1.0)];
    let mut edges = Vec::new();
    for (u, v, w) in two_way {
        edges.push((u, v, Attrs::new().with("cost", w)));
        edges.push((v, u, Attrs::new().with("cost", w)));
    }
    edges.push(("e", "f", Attrs::new().with("cost", 5.0)));
    g.add_edges(edges, 4, None)?;
    Ok(())
}

fn store() -> Result<GraphStore> {
    let g = GraphStore::open_in_memory(StoreOptions::default())?;
    streets(&g)?;
    Ok(g)
}

#[test]
fn weighted_route_follows_cheapest_streets() -> Result<()> {
    let g = store()?;
    let (dist, path) = g.shortest_path(["d"], "f", costs::attribute("cost"), None)?;
    assert_eq!(dist, 4.0);
    assert_eq!(path, vec!["d", "e", "b", "c", "f"]);
    Ok(())
}

#[test]
fn hop_count_prefers_fewer_edges() -> Result<()> {
    let g = store()?;
    let (hops, path) = g.shortest_path(["d"], "f", costs::unit(), None)?;
    assert_eq!(hops, 2.0);
    assert_eq!(path, vec!["d", "e", "f"]);
    Ok(())
}

#[test]
fn nearest_of_several_sources_wins() -> Result<()> {
    let g = store()?;
    let (dist, path) = g.shortest_path(["a", "f"], "c", costs::attribute("cost"), None)?;
    assert_eq!(dist, 1.0);
    assert_eq!(path, vec!["f", "c"]);

    let all = g.shortest_paths(["a", "f"], costs::attribute("cost"), None)?;
    assert_eq!(all.dist["a"], 0.0);
    assert_eq!(all.dist["f"], 0.0);
    assert_eq!(all.dist["e"], 2.0);
    assert!(all.pred["a"].is_empty());
    Ok(())
}

#[test]
fn cutoff_and_unreachable_targets() -> Result<()> {
    let g = store()?;
    g.add_node("island", &Attrs::new())?;
    let err = g
        .shortest_path(["a"], "island", costs::attribute("cost"), None)
        .unwrap_err();
    assert!(matches!(err, GraphError::NoPath { ref target } if target == "island"));

    let err = g
        .shortest_path(["a"], "f", costs::attribute("cost"), Some(2.5))
        .unwrap_err();
    assert!(matches!(err, GraphError::NoPath { .. }));
    let near = g.shortest_paths(["a"], costs::attribute("cost"), Some(2.5))?;
    let mut reached: Vec<_> = near.dist.keys().cloned().collect();
    reached.sort();
    assert_eq!(reached, vec!["a", "b", "c", "e"]);
    Ok(())
}

#[test]
fn edges_without_the_weight_are_impassable() -> Result<()> {
    let g = store()?;
    g.update_edge("b", "c", &Attrs::new().with("cost", netpack::AttrValue::Null))?;
    let (dist, path) = g.shortest_path(["a"], "c", costs::attribute("cost"), None)?;
    assert_eq!(dist, 8.0);
    assert_eq!(path, vec!["a", "b", "e", "f", "c"]);
    Ok(())
}

#[test]
fn ties_list_every_predecessor() -> Result<()> {
    let g = store()?;
    let found = g.shortest_paths(["a"], costs::unit(), None)?;
    let mut preds: Vec<_> = found.pred["e"].iter().cloned().collect();
    preds.sort();
    assert_eq!(found.dist["e"], 2.0);
    assert_eq!(preds, vec!["b", "d"]);
    Ok(())
}

#[test]
fn custom_cost_functions_see_both_endpoints() -> Result<()> {
    let g = store()?;
    let avoid_b = |u: &str, v: &str, attrs: &Attrs| {
        if u == "b" || v == "b" {
            None
        } else {
            attrs.get("cost").and_then(|w| w.as_f64())
        }
    };
    let (dist, path) = g.shortest_path(["a"], "c", avoid_b, None)?;
    assert_eq!(dist, 11.0);
    assert_eq!(path, vec!["a", "d", "e", "f", "c"]);
    Ok(())
}

#[test]
fn predecessor_view_searches_backwards() -> Result<()> {
    let g = store()?;
    let pred = g.pred();
    let (dist, path) = Dijkstra::new(&pred, costs::attribute("cost")).run_to(["f"], "e")?;
    assert_eq!(dist, 3.0);
    assert_eq!(path, vec!["f", "c", "b", "e"]);
    Ok(())
}

#[test]
fn on_disk_and_in_memory_copies_agree() -> Result<()> {
    let dir = tempdir()?;
    let g = GraphStore::create(dir.path().join("streets.gpkg"), StoreOptions::default())?;
    streets(&g)?;
    g.reindex()?;
    let copy = g.to_in_memory_copy()?;
    for target in ["b", "c", "d", "e", "f"] {
        let on_disk = g.shortest_path(["a"], target, costs::attribute("cost"), None)?;
        let in_memory = copy.shortest_path(["a"], target, costs::attribute("cost"), None)?;
        assert_eq!(on_disk, in_memory, "route to {target}");
    }
    Ok(())
}

#[test]
fn weights_added_after_a_search_are_routable() -> Result<()> {
    let g = store()?;
    g.shortest_paths(["a"], costs::unit(), None)?;
    g.update_edges(vec![
        ("a", "b", Attrs::new().with("minutes", 2)),
        ("b", "c", Attrs::new().with("minutes", 3)),
    ])?;
    let (dist, path) = g.shortest_path(["a"], "c", costs::attribute("minutes"), None)?;
    assert_eq!(dist, 5.0);
    assert_eq!(path, vec!["a", "b", "c"]);
    Ok(())
}
