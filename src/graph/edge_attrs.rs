//! Lazily loaded, write-through attributes of one edge.

use std::cell::RefCell;

use super::{GraphStore, SOURCE_KEY, TARGET_KEY};
use crate::error::{GraphError, Result};
use crate::geom::Geometry;
use crate::storage::{AttrValue, Attrs, GEOM_COLUMN, PRIMARY_KEY};

/// Attribute mapping of one edge.
///
/// Attributes are fetched on first access and cached. Mutations are written
/// to the store immediately, so other readers observe them as soon as the
/// call returns. A detached edge (no `(u, v)` identity) can be read but not
/// written.
#[derive(Debug)]
pub struct EdgeAttributes<'g> {
    graph: Option<&'g GraphStore>,
    key: Option<(String, String)>,
    cache: RefCell<Option<Attrs>>,
}

impl<'g> EdgeAttributes<'g> {
    /// Edge attributes without storage identity.
    pub fn detached(attrs: Attrs) -> Self {
        Self {
            graph: None,
            key: None,
            cache: RefCell::new(Some(attrs)),
        }
    }

    pub(crate) fn lazy(graph: &'g GraphStore, u: String, v: String) -> Self {
        Self {
            graph: Some(graph),
            key: Some((u, v)),
            cache: RefCell::new(None),
        }
    }

    pub(crate) fn loaded(graph: &'g GraphStore, u: String, v: String, attrs: Attrs) -> Self {
        Self {
            graph: Some(graph),
            key: Some((u, v)),
            cache: RefCell::new(Some(attrs)),
        }
    }

    /// Source key, if the edge has an identity.
    pub fn u(&self) -> Option<&str> {
        self.key.as_ref().map(|(u, _)| u.as_str())
    }

    /// Target key, if the edge has an identity.
    pub fn v(&self) -> Option<&str> {
        self.key.as_ref().map(|(_, v)| v.as_str())
    }

    fn with_attrs<T>(&self, f: impl FnOnce(&Attrs) -> T) -> Result<T> {
        if self.cache.borrow().is_none() {
            let attrs = match (self.graph, &self.key) {
                (Some(graph), Some((u, v))) => graph.get_edge(u, v)?,
                _ => Attrs::new(),
            };
            *self.cache.borrow_mut() = Some(attrs);
        }
        let cache = self.cache.borrow();
        Ok(match cache.as_ref() {
            Some(attrs) => f(attrs),
            None => f(&Attrs::new()),
        })
    }

    /// One attribute value.
    pub fn get(&self, key: &str) -> Result<Option<AttrValue>> {
        self.with_attrs(|attrs| attrs.get(key).cloned())
    }

    /// The edge geometry.
    pub fn geom(&self) -> Result<Option<Geometry>> {
        self.with_attrs(|attrs| attrs.geom().cloned())
    }

    /// Attribute names in key order.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.with_attrs(|attrs| attrs.keys().map(str::to_string).collect())
    }

    /// Owned copy of every attribute.
    pub fn to_attrs(&self) -> Result<Attrs> {
        self.with_attrs(Attrs::clone)
    }

    /// Writes one attribute through to storage.
    pub fn set(&mut self, key: &str, value: impl Into<AttrValue>) -> Result<()> {
        self.update(&Attrs::new().with(key, value))
    }

    /// Writes several attributes through to storage and refreshes the cache.
    /// The identity columns of the edge cannot be written; an empty partial
    /// set is a no-op.
    pub fn update(&mut self, partial: &Attrs) -> Result<()> {
        let (Some(graph), Some((u, v))) = (self.graph, &self.key) else {
            return Err(GraphError::UninitializedEdge);
        };
        let identity = [SOURCE_KEY, TARGET_KEY, PRIMARY_KEY, GEOM_COLUMN];
        if let Some(key) = partial
            .keys()
            .find(|key| identity.iter().any(|id| id.eq_ignore_ascii_case(key)))
        {
            return Err(GraphError::InvalidArgument(format!(
                "{key:?} is not an editable edge attribute"
            )));
        }
        if partial.is_empty() {
            return Ok(());
        }
        if graph.update_edge(u, v, partial)? == 0 {
            return Err(GraphError::edge_not_found(u.as_str(), v.as_str()));
        }
        if let Some(cached) = self.cache.get_mut() {
            cached.merge(partial);
        }
        Ok(())
    }

    /// Drops cached attributes so the next read hits storage again.
    pub fn refresh(&mut self) {
        if self.graph.is_some() {
            *self.cache.get_mut() = None;
        }
    }
}
