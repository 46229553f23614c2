use std::collections::BTreeMap;

use foundation::SiteId;
use scene::{Client, ModelAnchor, OverlayAsset, Site};
use tracing::info;

use crate::CatalogError;
use crate::snapshot::Snapshot;

/// Write-back side of the data store, used on explicit save only.
pub trait SiteStore {
    fn list(&self) -> Result<Vec<Site>, CatalogError>;
    fn get(&self, id: &SiteId) -> Result<Option<Site>, CatalogError>;
    fn upsert(&mut self, site: Site) -> Result<(), CatalogError>;
    fn delete(&mut self, id: &SiteId) -> Result<bool, CatalogError>;

    /// Persists a fully calibrated overlay for an existing site.
    fn save_overlay(&mut self, id: &SiteId, overlay: OverlayAsset) -> Result<(), CatalogError> {
        if !overlay.is_complete() {
            return Err(CatalogError::IncompleteOverlay(id.clone()));
        }
        let mut site = self
            .get(id)?
            .ok_or_else(|| CatalogError::NotFound(id.clone()))?;
        site.overlay = Some(overlay);
        self.upsert(site)?;
        info!(site = %id, "overlay saved");
        Ok(())
    }

    fn save_model(&mut self, id: &SiteId, model: ModelAnchor) -> Result<(), CatalogError> {
        let mut site = self
            .get(id)?
            .ok_or_else(|| CatalogError::NotFound(id.clone()))?;
        site.model = Some(model);
        self.upsert(site)?;
        info!(site = %id, "model anchor saved");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySiteStore {
    sites: BTreeMap<SiteId, Site>,
    clients: Vec<Client>,
}

impl InMemorySiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            sites: snapshot
                .sites
                .iter()
                .map(|s| (s.id.clone(), s.clone()))
                .collect(),
            clients: snapshot.clients.clone(),
        }
    }

    /// Current contents as a snapshot, ordered by id.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            sites: self.sites.values().cloned().collect(),
            clients: self.clients.clone(),
        }
    }
}

impl SiteStore for InMemorySiteStore {
    fn list(&self) -> Result<Vec<Site>, CatalogError> {
        Ok(self.sites.values().cloned().collect())
    }

    fn get(&self, id: &SiteId) -> Result<Option<Site>, CatalogError> {
        Ok(self.sites.get(id).cloned())
    }

    fn upsert(&mut self, site: Site) -> Result<(), CatalogError> {
        self.sites.insert(site.id.clone(), site);
        Ok(())
    }

    fn delete(&mut self, id: &SiteId) -> Result<bool, CatalogError> {
        Ok(self.sites.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemorySiteStore, SiteStore};
    use crate::CatalogError;
    use foundation::{LngLat, SiteId};
    use scene::{CornerSet, Corner, OverlayAsset, Site};

    fn site(id: &str) -> Site {
        Site::new(id, id, LngLat::new(100.0, 14.0).unwrap(), "wind", "P", 2020)
    }

    fn complete_overlay() -> OverlayAsset {
        let mut corners = CornerSet::new();
        for (i, c) in Corner::ALL.into_iter().enumerate() {
            corners.set(c, LngLat::new(100.0 + i as f64, 14.0).unwrap());
        }
        OverlayAsset::partial("o.png", corners)
    }

    #[test]
    fn upsert_get_delete() {
        let mut store = InMemorySiteStore::new();
        store.upsert(site("b")).unwrap();
        store.upsert(site("a")).unwrap();
        let ids: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(store.delete(&SiteId::new("a")).unwrap());
        assert!(!store.delete(&SiteId::new("a")).unwrap());
        assert!(store.get(&SiteId::new("a")).unwrap().is_none());
    }

    #[test]
    fn save_overlay_requires_complete_corners_and_known_site() {
        let mut store = InMemorySiteStore::new();
        store.upsert(site("a")).unwrap();

        let partial = OverlayAsset::partial("o.png", CornerSet::new());
        assert!(matches!(
            store.save_overlay(&SiteId::new("a"), partial),
            Err(CatalogError::IncompleteOverlay(_))
        ));
        assert!(matches!(
            store.save_overlay(&SiteId::new("zz"), complete_overlay()),
            Err(CatalogError::NotFound(_))
        ));

        store.save_overlay(&SiteId::new("a"), complete_overlay()).unwrap();
        let saved = store.get(&SiteId::new("a")).unwrap().unwrap();
        assert!(saved.calibrated_overlay().is_some());
        assert_eq!(store.snapshot().sites.len(), 1);
    }
}
