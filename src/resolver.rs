//! Turns parent-id chains into relative backup paths.
//!
//! Resolution walks the first-parent chain with an explicit visited set, so
//! depth is bounded by the catalog size rather than the call stack. Objects
//! whose parent is missing from the catalog are treated as roots. A parent
//! cycle is rooted at its member with the smallest id, so every member
//! resolves the same way regardless of cache state.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};

use crate::catalog::Catalog;
use crate::domain::{ObjectId, RemoteObject};
use crate::fs_util::sanitize_component;

/// Resolved paths for one run. Catalog entries never change during a run, so
/// nothing here is ever invalidated.
#[derive(Debug, Clone, Default)]
pub struct PathCache {
    paths: HashMap<ObjectId, Utf8PathBuf>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ObjectId) -> Option<&Utf8Path> {
        self.paths.get(id).map(Utf8PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn insert(&mut self, id: ObjectId, path: Utf8PathBuf) {
        self.paths.insert(id, path);
    }
}

#[derive(Debug, Default)]
pub struct PathResolver {
    cache: PathCache,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, catalog: &Catalog, id: &ObjectId) -> Utf8PathBuf {
        resolve_path(id, catalog, &mut self.cache)
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }
}

/// Relative path of `id`: its first-parent ancestors' names followed by its own.
///
/// An id missing from the catalog resolves to the id itself, since no name is known.
pub fn resolve_path(id: &ObjectId, catalog: &Catalog, cache: &mut PathCache) -> Utf8PathBuf {
    if let Some(path) = cache.get(id) {
        return path.to_path_buf();
    }
    if !catalog.contains(id) {
        return Utf8PathBuf::from(sanitize_component(id.as_str()));
    }

    // Collect unresolved objects from `id` upward until a cached ancestor, a
    // root, a dangling parent or a repeated id.
    let mut chain: Vec<&RemoteObject> = Vec::new();
    let mut positions: HashMap<&ObjectId, usize> = HashMap::new();
    let mut base: Option<Utf8PathBuf> = None;
    let mut cycle_start: Option<usize> = None;
    let mut current = id;
    loop {
        if let Some(path) = cache.get(current) {
            base = Some(path.to_path_buf());
            break;
        }
        if let Some(&position) = positions.get(current) {
            cycle_start = Some(position);
            break;
        }
        let Some(object) = catalog.get(current) else {
            break;
        };
        positions.insert(&object.id, chain.len());
        chain.push(object);
        match object.primary_parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    let (tail, mut path) = match cycle_start {
        Some(start) => (&chain[..start], resolve_cycle(&chain[start..], cache)),
        None => (&chain[..], base.unwrap_or_default()),
    };
    for object in tail.iter().rev() {
        path = path.join(sanitize_component(&object.name));
        cache.insert(object.id.clone(), path.clone());
    }
    path
}

/// Caches paths for every member of a parent cycle and returns the path of
/// `cycle[0]`.
///
/// `cycle[i + 1]` is the parent of `cycle[i]` and the last member's parent is
/// `cycle[0]`. The member with the smallest id becomes the root, so the result
/// is the same whichever member the walk entered through.
fn resolve_cycle(cycle: &[&RemoteObject], cache: &mut PathCache) -> Utf8PathBuf {
    let len = cycle.len();
    let root = (0..len)
        .min_by(|&a, &b| cycle[a].id.cmp(&cycle[b].id))
        .unwrap_or(0);

    let mut path = Utf8PathBuf::new();
    let mut entry = Utf8PathBuf::new();
    // Walk child-ward from the root: the child of `cycle[i]` is `cycle[i - 1]`.
    for step in 0..len {
        let index = (root + len - step) % len;
        let object = cycle[index];
        path = path.join(sanitize_component(&object.name));
        cache.insert(object.id.clone(), path.clone());
        if index == 0 {
            entry = path.clone();
        }
    }
    entry
}
