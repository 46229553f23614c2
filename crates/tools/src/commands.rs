use std::path::{Path, PathBuf};

use catalog::{AssetClass, CatalogError, IngestReport, Snapshot, StorageConfig, resolve};
use foundation::LngLat;
use foundation::math::normalize_degrees;
use gpu::AnchorTransform;
use scene::{Facets, FilterPredicate, ModelAnchor, ValidationError, build_features};
use serde::Serialize;
use serde_json::Value;
use streaming::{AssetFetcher, LoadError, load_model};
use tracing::warn;
use viewer::{ConfigError, ViewerConfig};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("asset path is blank")]
    BlankPath,
}

fn read_text(path: &Path) -> Result<String, ToolError> {
    std::fs::read_to_string(path).map_err(|source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a snapshot document, logging every rejected record.
pub fn load_snapshot(path: &Path) -> Result<(Snapshot, IngestReport), ToolError> {
    let (snapshot, report) = Snapshot::from_json_str(&read_text(path)?)?;
    for r in &report.rejected {
        warn!(record = %r.record, reason = %r.reason, "record rejected");
    }
    Ok((snapshot, report))
}

/// Storage section of a viewer config file, or the defaults.
pub fn load_storage(path: Option<&Path>) -> Result<StorageConfig, ToolError> {
    match path {
        Some(p) => Ok(ViewerConfig::from_json_str(&read_text(p)?)?.storage),
        None => Ok(StorageConfig::default()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub sites: usize,
    pub features: usize,
    /// `[west, south, east, north]`
    pub bbox: Option<[f64; 4]>,
}

pub fn feature_summary(snapshot: &Snapshot, predicate: &FilterPredicate) -> FeatureSummary {
    let features = build_features(&snapshot.sites, predicate);
    FeatureSummary {
        sites: snapshot.sites.len(),
        features: features.len(),
        bbox: features.bounds().map(|b| b.to_bbox()),
    }
}

pub fn feature_geojson(snapshot: &Snapshot, predicate: &FilterPredicate) -> Value {
    build_features(&snapshot.sites, predicate).to_geojson()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientFacet {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetReport {
    pub categories: Vec<String>,
    pub provinces: Vec<String>,
    pub years: Vec<i32>,
    pub clients: Vec<ClientFacet>,
}

pub fn facet_report(snapshot: &Snapshot) -> FacetReport {
    let f = Facets::collect(&snapshot.sites, &snapshot.clients);
    FacetReport {
        categories: f.categories.iter().map(|c| c.to_string()).collect(),
        provinces: f.provinces,
        years: f.years,
        clients: f
            .clients
            .into_iter()
            .map(|(id, name)| ClientFacet {
                id: id.as_str().to_string(),
                name,
            })
            .collect(),
    }
}

pub fn resolve_url(path: &str, class: AssetClass, storage: &StorageConfig) -> Result<String, ToolError> {
    resolve(path, class, storage).ok_or(ToolError::BlankPath)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelReport {
    pub meshes: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub textures: usize,
    pub skipped_primitives: usize,
    pub size: [f32; 3],
    pub cpu_bytes: usize,
    pub content_hash: String,
    /// Progress milestones seen while loading.
    pub progress: Vec<u8>,
}

/// Loads a model the same way the viewer does and summarises it.
pub fn inspect_model<F: AssetFetcher + ?Sized>(fetcher: &F, url: &str) -> Result<ModelReport, ToolError> {
    let mut progress = Vec::new();
    let scene = pollster::block_on(load_model(fetcher, url, &mut |pct| progress.push(pct)))?;
    Ok(ModelReport {
        meshes: scene.meshes.len(),
        vertices: scene.vertex_count(),
        triangles: scene.triangle_count(),
        textures: scene.textures.len(),
        skipped_primitives: scene.skipped_primitives,
        size: scene.bounds.size(),
        cpu_bytes: scene.byte_size(),
        content_hash: scene.content_hash.clone(),
        progress,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorReport {
    /// Mercator unit-space origin `[x, y, z]`.
    pub origin: [f64; 3],
    pub unit_scale: f64,
    pub meters_per_unit: f64,
    pub yaw_deg: f64,
    /// Column-major model matrix.
    pub model_matrix: [f64; 16],
}

pub fn anchor_report(
    lng: f64,
    lat: f64,
    altitude_m: f64,
    yaw_deg: f64,
    scale: f64,
) -> Result<AnchorReport, ToolError> {
    let at = LngLat::new(lng, lat).map_err(ValidationError::from)?;
    let anchor = ModelAnchor::new("inspect", at, altitude_m, yaw_deg, scale)?;
    let t = AnchorTransform::new(&anchor);
    let yaw = normalize_degrees(anchor.yaw_deg());
    Ok(AnchorReport {
        origin: [t.origin.x, t.origin.y, t.origin.z],
        unit_scale: t.unit_scale,
        meters_per_unit: 1.0 / t.unit_scale,
        yaw_deg: yaw,
        model_matrix: t.model_matrix(yaw).0,
    })
}

#[cfg(test)]
mod tests {
    use super::{ToolError, anchor_report, facet_report, feature_summary, inspect_model, resolve_url};
    use crate::fetch::FileFetcher;
    use catalog::{AssetClass, Snapshot, StorageConfig};
    use pretty_assertions::assert_eq;
    use scene::FilterPredicate;

    const SNAPSHOT: &str = r#"{
        "sites": [
            { "id": "a", "name": "Alpha Farm", "latitude": 13.7, "longitude": 100.5,
              "category": "wind", "province": "Bangkok", "year": 2020, "clientId": "c1" },
            { "id": "b", "name": "Bravo", "latitude": 18.8, "longitude": 98.9,
              "category": "solar", "province": "Chiang Mai", "year": 2021 },
            { "id": "c", "name": "Hidden", "latitude": 7.9, "longitude": 98.3,
              "category": "hydro", "province": "Phuket", "year": 2019, "status": "hidden" }
        ],
        "clients": [ { "id": "c1", "name": "Acme" } ]
    }"#;

    fn snapshot() -> Snapshot {
        Snapshot::from_json_str(SNAPSHOT).unwrap().0
    }

    #[test]
    fn summary_counts_active_matches() {
        let s = snapshot();
        let all = feature_summary(&s, &FilterPredicate::any());
        assert_eq!(all.sites, 3);
        assert_eq!(all.features, 2);
        assert_eq!(all.bbox, Some([98.9, 13.7, 100.5, 18.8]));

        let wind = feature_summary(&s, &FilterPredicate::any().with_category("wind"));
        assert_eq!(wind.features, 1);
        assert_eq!(wind.bbox, Some([100.5, 13.7, 100.5, 13.7]));
    }

    #[test]
    fn facets_skip_hidden_sites() {
        let r = facet_report(&snapshot());
        assert_eq!(r.categories, vec!["solar".to_string(), "wind".to_string()]);
        assert_eq!(r.years, vec![2020, 2021]);
        assert_eq!(r.clients.len(), 1);
        assert_eq!(r.clients[0].name, "Acme");
    }

    #[test]
    fn resolve_rejects_blank() {
        let cfg = StorageConfig::default();
        let url = resolve_url("site/a.glb", AssetClass::Model, &cfg).unwrap();
        assert!(url.ends_with("/models/site/a.glb"), "{url}");
        assert!(matches!(
            resolve_url("  ", AssetClass::Model, &cfg),
            Err(ToolError::BlankPath)
        ));
    }

    #[test]
    fn anchor_report_normalizes_yaw() {
        let r = anchor_report(100.5, 13.75, 0.0, 370.0, 1.0).unwrap();
        assert!((r.yaw_deg - 10.0).abs() < 1e-9);
        assert!(r.unit_scale > 0.0);
        assert!((r.meters_per_unit * r.unit_scale - 1.0).abs() < 1e-9);
        assert!(anchor_report(100.5, 95.0, 0.0, 0.0, 1.0).is_err());
        assert!(anchor_report(100.5, 13.0, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn inspects_a_gltf_file() {
        const TRIANGLE: &str = r#"{
            "asset": { "version": "2.0" },
            "nodes": [ { "mesh": 0 } ],
            "meshes": [ { "primitives": [ { "attributes": { "POSITION": 0 } } ] } ],
            "accessors": [ { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" } ],
            "bufferViews": [ { "buffer": 0, "byteLength": 36 } ],
            "buffers": [ { "byteLength": 36,
                "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA" } ]
        }"#;
        let dir = std::env::temp_dir().join(format!("geoviz-inspect-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tri.gltf"), TRIANGLE).unwrap();

        let report = inspect_model(&FileFetcher::new(&dir), "tri.gltf").unwrap();
        assert_eq!(report.meshes, 1);
        assert_eq!(report.vertices, 3);
        assert_eq!(report.triangles, 1);
        assert_eq!(report.progress.last(), Some(&100));
        assert!(report.progress.windows(2).all(|w| w[0] <= w[1]));

        assert!(inspect_model(&FileFetcher::new(&dir), "missing.glb").is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
