use std::collections::{HashMap, HashSet};

use crate::domain::{ObjectId, RemoteObject};
use crate::drive::{ListFilter, RemoteStoreClient};
use crate::error::BackupError;

/// Every remote object known to one run, keyed by id, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    objects: Vec<RemoteObject>,
    index: HashMap<ObjectId, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object unless its id is already present. Returns whether it was added.
    pub fn insert(&mut self, object: RemoteObject) -> bool {
        if self.index.contains_key(&object.id) {
            return false;
        }
        self.index.insert(object.id.clone(), self.objects.len());
        self.objects.push(object);
        true
    }

    pub fn get(&self, id: &ObjectId) -> Option<&RemoteObject> {
        self.index.get(id).map(|&slot| &self.objects[slot])
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteObject> {
        self.objects.iter()
    }
}

impl FromIterator<RemoteObject> for Catalog {
    fn from_iter<I: IntoIterator<Item = RemoteObject>>(iter: I) -> Self {
        let mut catalog = Catalog::new();
        for object in iter {
            catalog.insert(object);
        }
        catalog
    }
}

impl Extend<RemoteObject> for Catalog {
    fn extend<I: IntoIterator<Item = RemoteObject>>(&mut self, iter: I) {
        for object in iter {
            self.insert(object);
        }
    }
}

pub struct CatalogBuilder<'a, C: RemoteStoreClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: RemoteStoreClient + ?Sized> CatalogBuilder<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub fn list_all(&self) -> Result<Catalog, BackupError> {
        self.list_all_with_progress(|_| {})
    }

    /// Like [`list_all`](Self::list_all), calling `on_page` with the running total after each page.
    pub fn list_all_with_progress<F>(&self, on_page: F) -> Result<Catalog, BackupError>
    where
        F: FnMut(usize),
    {
        let mut catalog = Catalog::new();
        self.paginate(&ListFilter::All, &mut catalog, on_page)?;
        Ok(catalog)
    }

    /// All objects whose name equals `name`. Names are not unique.
    pub fn list_by_name(&self, name: &str) -> Result<Vec<RemoteObject>, BackupError> {
        let mut matches = Catalog::new();
        self.paginate(&ListFilter::Name(name.to_string()), &mut matches, |_| {})?;
        Ok(matches.objects)
    }

    /// Pulls metadata for the first-parent chain above `object` into `catalog`.
    ///
    /// Ancestors already in the catalog are walked without a request. A parent the
    /// store reports as not found ends the chain; the resolver then roots the
    /// object below the last known ancestor. Returns the number of fetched ancestors.
    pub fn fetch_ancestors(
        &self,
        object: &RemoteObject,
        catalog: &mut Catalog,
    ) -> Result<usize, BackupError> {
        let mut visited = HashSet::from([object.id.clone()]);
        let mut fetched = 0usize;
        let mut current = object.primary_parent().cloned();

        while let Some(id) = current.take() {
            if !visited.insert(id.clone()) {
                break;
            }
            if let Some(known) = catalog.get(&id) {
                current = known.primary_parent().cloned();
                continue;
            }
            match self.client.get_metadata(&id) {
                Ok(parent) => {
                    current = parent.primary_parent().cloned();
                    catalog.insert(parent);
                    fetched += 1;
                }
                Err(err) if err.is_not_found() => {
                    tracing::debug!(
                        object_id = %object.id,
                        parent_id = %id,
                        "ancestor not visible"
                    );
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(fetched)
    }

    fn paginate<F>(
        &self,
        filter: &ListFilter,
        into: &mut Catalog,
        mut on_page: F,
    ) -> Result<(), BackupError>
    where
        F: FnMut(usize),
    {
        let mut page_token: Option<String> = None;
        let mut page_number = 1usize;
        loop {
            let page = self
                .client
                .list_page(filter, page_token.as_deref())
                .map_err(|err| match err {
                    BackupError::RemoteList(_) => err,
                    other => BackupError::RemoteList(format!("page {page_number}: {other}")),
                })?;
            into.extend(page.objects);
            on_page(into.len());

            match page.next_page_token {
                Some(next) if page_token.as_deref() == Some(next.as_str()) => {
                    return Err(BackupError::RemoteList(format!(
                        "page {page_number}: continuation token did not advance"
                    )));
                }
                Some(next) => page_token = Some(next),
                None => return Ok(()),
            }
            page_number += 1;
        }
    }
}
