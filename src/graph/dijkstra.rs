//! Multi-source Dijkstra over any [`AdjacencyRead`].

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use tracing::debug;

use super::views::AdjacencyRead;
use super::GraphStore;
use crate::error::{GraphError, Result};
use crate::storage::Attrs;

/// Fringe entry ordered by distance, then insertion sequence.
#[derive(Debug)]
struct Entry {
    dist: f64,
    seq: u64,
    node: String,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Result of an exhaustive search.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShortestPaths {
    /// Finalized distance of every reached node.
    pub dist: FxHashMap<String, f64>,
    /// Path from the nearest source to every reached node.
    pub paths: FxHashMap<String, Vec<String>>,
    /// Predecessors achieving the best distance; empty for sources.
    pub pred: FxHashMap<String, SmallVec<[String; 2]>>,
}

/// Search configuration. `cost` returns `None` for impassable edges.
pub struct Dijkstra<'a, A: ?Sized, F> {
    adj: &'a A,
    cost: F,
    cutoff: Option<f64>,
}

impl<'a, A, F> Dijkstra<'a, A, F>
where
    A: AdjacencyRead + ?Sized,
    F: Fn(&str, &str, &Attrs) -> Option<f64>,
{
    /// Search over `adj` with edge costs from `cost(u, v, attrs)`.
    pub fn new(adj: &'a A, cost: F) -> Self {
        Self {
            adj,
            cost,
            cutoff: None,
        }
    }

    /// Ignores paths longer than `cutoff`.
    pub fn cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    /// Distances and paths to every node reachable from any source.
    pub fn run<I, S>(&self, sources: I) -> Result<ShortestPaths>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.search(sources, None)
    }

    /// Distance and path to `target`; `NoPath` when it is not reached.
    pub fn run_to<I, S>(&self, sources: I, target: &str) -> Result<(f64, Vec<String>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut found = self.search(sources, Some(target))?;
        match (found.dist.remove(target), found.paths.remove(target)) {
            (Some(dist), Some(path)) => Ok((dist, path)),
            _ => Err(GraphError::NoPath {
                target: target.to_string(),
            }),
        }
    }

    fn search<I, S>(&self, sources: I, target: Option<&str>) -> Result<ShortestPaths>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = ShortestPaths::default();
        let mut seen: FxHashMap<String, f64> = FxHashMap::default();
        let mut fringe: BinaryHeap<Reverse<Entry>> = BinaryHeap::new();
        let mut seq = 0u64;

        for source in sources {
            let source = source.as_ref().to_string();
            seen.insert(source.clone(), 0.0);
            out.paths.insert(source.clone(), vec![source.clone()]);
            out.pred.insert(source.clone(), SmallVec::new());
            fringe.push(Reverse(Entry {
                dist: 0.0,
                seq,
                node: source,
            }));
            seq += 1;
        }

        let mut expanded = 0usize;
        while let Some(Reverse(Entry { dist: d, node, .. })) = fringe.pop() {
            if out.dist.contains_key(&node) {
                continue;
            }
            out.dist.insert(node.clone(), d);
            if target == Some(node.as_str()) {
                break;
            }
            expanded += 1;
            for (neighbor, attrs) in self.adj.neighbors(&node)? {
                let Some(cost) = (self.cost)(&node, &neighbor, &attrs) else {
                    continue;
                };
                let candidate = d + cost;
                if self.cutoff.is_some_and(|cutoff| candidate > cutoff) {
                    continue;
                }
                if let Some(&finalized) = out.dist.get(&neighbor) {
                    if candidate < finalized {
                        return Err(GraphError::ContradictoryPath { node: neighbor });
                    }
                    continue;
                }
                match seen.get(&neighbor) {
                    Some(&best) if candidate > best => {}
                    Some(&best) if candidate == best => {
                        if let Some(preds) = out.pred.get_mut(&neighbor) {
                            preds.push(node.clone());
                        }
                    }
                    _ => {
                        seen.insert(neighbor.clone(), candidate);
                        let mut path = out.paths.get(&node).cloned().unwrap_or_default();
                        path.push(neighbor.clone());
                        out.paths.insert(neighbor.clone(), path);
                        out.pred.insert(neighbor.clone(), smallvec![node.clone()]);
                        fringe.push(Reverse(Entry {
                            dist: candidate,
                            seq,
                            node: neighbor,
                        }));
                        seq += 1;
                    }
                }
            }
        }
        debug!(expanded, reached = out.dist.len(), "dijkstra.finished");
        Ok(out)
    }
}

impl GraphStore {
    /// Cheapest path from any of `sources` to `target` along successor
    /// edges.
    pub fn shortest_path<I, S, F>(&self, sources: I, target: &str, cost: F, cutoff: Option<f64>) -> Result<(f64, Vec<String>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str, &str, &Attrs) -> Option<f64>,
    {
        let succ = self.succ();
        let mut search = Dijkstra::new(&succ, cost);
        if let Some(cutoff) = cutoff {
            search = search.cutoff(cutoff);
        }
        search.run_to(sources, target)
    }

    /// Cheapest paths from any of `sources` to every reachable node.
    pub fn shortest_paths<I, S, F>(&self, sources: I, cost: F, cutoff: Option<f64>) -> Result<ShortestPaths>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str, &str, &Attrs) -> Option<f64>,
    {
        let succ = self.succ();
        let mut search = Dijkstra::new(&succ, cost);
        if let Some(cutoff) = cutoff {
            search = search.cutoff(cutoff);
        }
        search.run(sources)
    }
}
