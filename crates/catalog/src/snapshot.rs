use std::sync::Arc;

use foundation::LngLat;
use scene::{
    Client, CornerSet, ModelAnchor, ModelAnchorRecord, OverlayAsset, Site, SiteStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::CatalogError;
use crate::validate;

/// Validated sites and clients as last received from the data store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub sites: Vec<Site>,
    pub clients: Vec<Client>,
}

/// A record that did not make it into the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Record id if it could be read, else its position in the input.
    pub record: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: Vec<Rejection>,
    pub dropped_overlays: usize,
    pub dropped_models: usize,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    sites: Vec<Value>,
    #[serde(default)]
    clients: Vec<Client>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteRecord {
    id: String,
    #[serde(default)]
    name: String,
    latitude: Value,
    longitude: Value,
    category: String,
    #[serde(default)]
    province: String,
    year: i32,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    overlay: Option<OverlayRecord>,
    #[serde(default)]
    model: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverlayRecord {
    image: String,
    #[serde(default)]
    top_left: Option<[f64; 2]>,
    #[serde(default)]
    top_right: Option<[f64; 2]>,
    #[serde(default)]
    bottom_right: Option<[f64; 2]>,
    #[serde(default)]
    bottom_left: Option<[f64; 2]>,
}

impl OverlayRecord {
    /// Missing or out-of-range corners stay unset; the image is kept so
    /// calibration can resume from it.
    fn into_asset(self) -> Result<OverlayAsset, String> {
        if self.image.trim().is_empty() {
            return Err("overlay image is empty".to_string());
        }
        let mut corners = CornerSet::new();
        let raw = [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ];
        for (corner, value) in scene::Corner::ALL.into_iter().zip(raw) {
            let Some([lng, lat]) = value else {
                continue;
            };
            match LngLat::new(lng, lat) {
                Ok(at) => corners.set(corner, at),
                Err(e) => debug!(corner = corner.label(), error = %e, "ignored overlay corner"),
            }
        }
        Ok(OverlayAsset::partial(self.image, corners))
    }
}

fn parse_status(raw: Option<&str>) -> Option<SiteStatus> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("active") => Some(SiteStatus::Active),
        Some("hidden") => Some(SiteStatus::Hidden),
        Some(other) => {
            debug!(status = other, "unknown site status");
            None
        }
        None => None,
    }
}

impl Snapshot {
    /// Decodes a data-store document `{ "sites": [...], "clients": [...] }`.
    ///
    /// Only a malformed document is an error. Individual site records that fail
    /// validation are rejected; invalid overlay or model sub-records are
    /// dropped while the site itself is kept.
    pub fn from_json_str(json: &str) -> Result<(Snapshot, IngestReport), CatalogError> {
        let doc: Document = serde_json::from_str(json)?;
        let mut report = IngestReport::default();
        let mut sites = Vec::with_capacity(doc.sites.len());

        for (idx, value) in doc.sites.into_iter().enumerate() {
            let record: SiteRecord = match serde_json::from_value(value) {
                Ok(r) => r,
                Err(e) => {
                    warn!(index = idx, error = %e, "rejected site record");
                    report.rejected.push(Rejection {
                        record: format!("#{idx}"),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            match Self::site_from_record(record, &mut report) {
                Ok(site) => sites.push(site),
                Err(rejection) => {
                    warn!(site = %rejection.record, reason = %rejection.reason, "rejected site record");
                    report.rejected.push(rejection);
                }
            }
        }

        report.accepted = sites.len();
        debug!(
            accepted = report.accepted,
            rejected = report.rejected.len(),
            clients = doc.clients.len(),
            "snapshot decoded"
        );
        Ok((
            Snapshot {
                sites,
                clients: doc.clients,
            },
            report,
        ))
    }

    fn site_from_record(r: SiteRecord, report: &mut IngestReport) -> Result<Site, Rejection> {
        let reject = |reason: String| Rejection {
            record: r.id.clone(),
            reason,
        };
        if r.id.trim().is_empty() {
            return Err(reject("empty id".to_string()));
        }
        let position =
            validate::position(&r.longitude, &r.latitude).map_err(|e| reject(e.to_string()))?;

        let mut site = Site::new(
            r.id.clone(),
            r.name.clone(),
            position,
            r.category.clone(),
            r.province.clone(),
            r.year,
        )
        .with_status(parse_status(r.status.as_deref()));
        if let Some(client) = r.client_id.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            site = site.with_client(client);
        }

        if let Some(overlay) = r.overlay {
            match overlay.into_asset() {
                Ok(asset) => site = site.with_overlay(asset),
                Err(reason) => {
                    warn!(site = %r.id, %reason, "dropped overlay sub-record");
                    report.dropped_overlays += 1;
                }
            }
        }

        if let Some(model) = r.model {
            let parsed = serde_json::from_value::<ModelAnchorRecord>(model)
                .map_err(|e| e.to_string())
                .and_then(|rec| ModelAnchor::try_from(rec).map_err(|e| e.to_string()));
            match parsed {
                Ok(anchor) => site = site.with_model(anchor),
                Err(reason) => {
                    warn!(site = %r.id, %reason, "dropped model sub-record");
                    report.dropped_models += 1;
                }
            }
        }

        Ok(site)
    }
}

/// Content hash of a snapshot; equal versions mean equal content.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotVersion([u8; 32]);

impl SnapshotVersion {
    pub fn of(snapshot: &Snapshot) -> Result<Self, CatalogError> {
        let mut hasher = blake3::Hasher::new();
        serde_json::to_writer(&mut hasher, snapshot)?;
        Ok(Self(*hasher.finalize().as_bytes()))
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

/// Holds the current snapshot and recognizes no-op replacements.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: Arc<Snapshot>,
    version: Option<SnapshotVersion>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &Arc<Snapshot> {
        &self.current
    }

    pub fn version(&self) -> Option<SnapshotVersion> {
        self.version
    }

    /// Returns `true` when the content differs from what was held.
    pub fn replace(&mut self, snapshot: Snapshot) -> Result<bool, CatalogError> {
        let version = SnapshotVersion::of(&snapshot)?;
        if self.version == Some(version) {
            debug!(version = %version.to_hex(), "snapshot unchanged");
            return Ok(false);
        }
        self.current = Arc::new(snapshot);
        self.version = Some(version);
        Ok(true)
    }
}
