//! Mapping-style views over a [`GraphStore`].
//!
//! None of these views materialize the graph. Each point lookup or
//! membership test is one indexed query; `keys` scans hold the cursor open
//! while iterating.

use std::collections::BTreeMap;

use super::{EdgeAttributes, GraphStore, KeyScan};
use crate::error::Result;
use crate::storage::Attrs;

/// Edge direction of an adjacency view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dir {
    /// Successors: edges leaving the node.
    Out,
    /// Predecessors: edges entering the node.
    In,
}

/// Read capability the path engine depends on.
pub trait AdjacencyRead {
    /// Whether `key` is a node of the graph.
    fn contains(&self, key: &str) -> Result<bool>;
    /// Number of nodes.
    fn len(&self) -> Result<usize>;
    /// Every node key.
    fn keys(&self) -> Result<Vec<String>>;
    /// Neighbors of `key` with the attributes of the connecting edge.
    fn neighbors(&self, key: &str) -> Result<Vec<(String, Attrs)>>;

    /// True when there are no nodes.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Plain in-memory adjacency lists, mostly useful for small fixtures.
impl AdjacencyRead for BTreeMap<String, Vec<(String, Attrs)>> {
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.contains_key(key))
    }

    fn len(&self) -> Result<usize> {
        Ok(BTreeMap::len(self))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(BTreeMap::keys(self).cloned().collect())
    }

    fn neighbors(&self, key: &str) -> Result<Vec<(String, Attrs)>> {
        Ok(self.get(key).cloned().unwrap_or_default())
    }
}

/// Node key to node attributes.
#[derive(Clone, Copy, Debug)]
pub struct NodeStore<'g> {
    graph: &'g GraphStore,
}

impl<'g> NodeStore<'g> {
    /// Attributes of `key`; `NodeNotFound` when absent.
    pub fn get(&self, key: &str) -> Result<Attrs> {
        self.graph.get_node(key)
    }

    /// Membership test.
    pub fn contains(&self, key: &str) -> Result<bool> {
        self.graph.has_node(key)
    }

    /// Lazy scan over every node key.
    pub fn keys(&self) -> Result<KeyScan<'g>> {
        self.graph.node_keys()
    }

    /// Number of nodes.
    pub fn len(&self) -> Result<usize> {
        self.graph.node_count()
    }

    /// True when there are no nodes.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Inserts the node or merges `attrs` into it.
    pub fn set(&self, key: &str, attrs: &Attrs) -> Result<()> {
        self.graph.add_node(key, attrs)
    }

    /// Removes the node and its incident edges. Returns whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.graph.delete_nodes([key])? > 0)
    }
}

/// Node key to its [`InnerAdjacency`] in one direction. Keyed by every node
/// of the graph; nodes without edges in this direction map to an empty
/// inner adjacency.
#[derive(Clone, Copy, Debug)]
pub struct OuterAdjacency<'g> {
    graph: &'g GraphStore,
    dir: Dir,
}

impl<'g> OuterAdjacency<'g> {
    /// Direction of the view.
    pub fn dir(&self) -> Dir {
        self.dir
    }

    /// Inner adjacency of `key`. No query is issued.
    pub fn get(&self, key: &str) -> InnerAdjacency<'g> {
        InnerAdjacency {
            graph: self.graph,
            node: key.to_string(),
            dir: self.dir,
        }
    }

    /// Lazy scan over every node key.
    pub fn iter_keys(&self) -> Result<KeyScan<'g>> {
        self.graph.node_keys()
    }

    /// Every node paired with its inner adjacency.
    pub fn items(&self) -> Result<Vec<(String, InnerAdjacency<'g>)>> {
        let keys = self.graph.node_keys()?.collect_vec()?;
        Ok(keys
            .into_iter()
            .map(|key| {
                let inner = self.get(&key);
                (key, inner)
            })
            .collect())
    }

    /// Replaces every edge of `key` in this direction.
    pub fn set<I>(&self, key: &str, neighbors: I) -> Result<usize>
    where
        I: IntoIterator<Item = (String, Attrs)>,
    {
        match self.dir {
            Dir::Out => self.graph.replace_successors(key, neighbors),
            Dir::In => self.graph.replace_predecessors(key, neighbors),
        }
    }

    /// Removes every edge of `key` in this direction.
    pub fn delete(&self, key: &str) -> Result<usize> {
        match self.dir {
            Dir::Out => self.graph.delete_successors(key),
            Dir::In => self.graph.delete_predecessors(key),
        }
    }
}

impl AdjacencyRead for OuterAdjacency<'_> {
    fn contains(&self, key: &str) -> Result<bool> {
        self.graph.has_node(key)
    }

    fn len(&self) -> Result<usize> {
        self.graph.node_count()
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.graph.node_keys()?.collect_vec()
    }

    fn neighbors(&self, key: &str) -> Result<Vec<(String, Attrs)>> {
        let scan = match self.dir {
            Dir::Out => self.graph.successors(key)?,
            Dir::In => self.graph.predecessors(key)?,
        };
        scan.collect_vec()
    }
}

/// Neighbor key to the attributes of the connecting edge, for one node.
#[derive(Clone, Debug)]
pub struct InnerAdjacency<'g> {
    graph: &'g GraphStore,
    node: String,
    dir: Dir,
}

impl<'g> InnerAdjacency<'g> {
    /// The node this adjacency belongs to.
    pub fn node(&self) -> &str {
        &self.node
    }

    fn pair<'a>(&'a self, neighbor: &'a str) -> (&'a str, &'a str) {
        match self.dir {
            Dir::Out => (self.node.as_str(), neighbor),
            Dir::In => (neighbor, self.node.as_str()),
        }
    }

    /// Lazily loaded attributes of the edge to `neighbor`. Reading them fails
    /// with `EdgeNotFound` when there is no such edge.
    pub fn get(&self, neighbor: &str) -> EdgeAttributes<'g> {
        let (u, v) = self.pair(neighbor);
        EdgeAttributes::lazy(self.graph, u.to_string(), v.to_string())
    }

    /// Membership test.
    pub fn contains(&self, neighbor: &str) -> Result<bool> {
        let (u, v) = self.pair(neighbor);
        self.graph.has_edge(u, v)
    }

    /// Lazy scan over distinct neighbor keys.
    pub fn keys(&self) -> Result<KeyScan<'g>> {
        match self.dir {
            Dir::Out => self.graph.successor_keys(Some(&self.node)),
            Dir::In => self.graph.predecessor_keys(Some(&self.node)),
        }
    }

    /// Number of distinct neighbors.
    pub fn len(&self) -> Result<usize> {
        match self.dir {
            Dir::Out => self.graph.unique_successor_count(Some(&self.node)),
            Dir::In => self.graph.unique_predecessor_count(Some(&self.node)),
        }
    }

    /// True when the node has no neighbors in this direction.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Every neighbor with preloaded edge attributes, built from a single
    /// enumerating query.
    pub fn items(&self) -> Result<Vec<(String, EdgeAttributes<'g>)>> {
        let scan = match self.dir {
            Dir::Out => self.graph.successors(&self.node)?,
            Dir::In => self.graph.predecessors(&self.node)?,
        };
        let rows = scan.collect_vec()?;
        Ok(rows
            .into_iter()
            .map(|(neighbor, attrs)| {
                let (u, v) = self.pair(&neighbor);
                let edge = EdgeAttributes::loaded(self.graph, u.to_string(), v.to_string(), attrs);
                (neighbor, edge)
            })
            .collect())
    }

    /// Inserts or replaces the edge to `neighbor`.
    pub fn set(&self, neighbor: &str, attrs: &Attrs) -> Result<()> {
        let (u, v) = self.pair(neighbor);
        self.graph.insert_or_replace_edge(u, v, attrs)
    }

    /// Removes the edge to `neighbor`. Returns whether it existed.
    pub fn delete(&self, neighbor: &str) -> Result<bool> {
        let (u, v) = self.pair(neighbor);
        Ok(self.graph.delete_edges([(u, v)])? > 0)
    }
}

impl GraphStore {
    /// Mapping view over the nodes.
    pub fn node_store(&self) -> NodeStore<'_> {
        NodeStore { graph: self }
    }

    /// Adjacency view in direction `dir`.
    pub fn adjacency(&self, dir: Dir) -> OuterAdjacency<'_> {
        OuterAdjacency { graph: self, dir }
    }

    /// Successor adjacency.
    pub fn succ(&self) -> OuterAdjacency<'_> {
        self.adjacency(Dir::Out)
    }

    /// Predecessor adjacency.
    pub fn pred(&self) -> OuterAdjacency<'_> {
        self.adjacency(Dir::In)
    }
}
