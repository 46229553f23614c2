use formats::{ModelFormatError, ModelScene};
use tracing::debug;

use crate::fetch::{AssetFetcher, FetchError};
use crate::progress::{LoadPhase, ProgressTracker};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("could not download model: {0}")]
    Fetch(#[from] FetchError),
    #[error("could not read model: {0}")]
    Format(#[from] ModelFormatError),
}

/// Downloads and parses one model, reporting monotonic percentages.
///
/// The task does not know about selection or render state; the caller decides
/// whether the result is still wanted when it resolves.
pub async fn load_model<F: AssetFetcher + ?Sized>(
    fetcher: &F,
    url: &str,
    on_progress: &mut dyn FnMut(u8),
) -> Result<ModelScene, LoadError> {
    let mut tracker = ProgressTracker::new();
    // The anchor transform was computed before the task was spawned.
    emit(tracker.enter(LoadPhase::TransformReady), &mut *on_progress);
    emit(tracker.enter(LoadPhase::LoaderReady), &mut *on_progress);

    let bytes = {
        let mut transfer = |loaded: u64, total: Option<u64>| {
            if let Some(p) = tracker.transfer(loaded, total) {
                on_progress(p);
            }
        };
        fetcher.fetch(url, &mut transfer).await?
    };
    debug!(url, bytes = bytes.len(), "model downloaded");

    emit(tracker.enter(LoadPhase::Parsing), &mut *on_progress);
    let scene = ModelScene::from_bytes(&bytes)?;
    emit(tracker.enter(LoadPhase::Done), &mut *on_progress);
    Ok(scene)
}

fn emit(percent: Option<u8>, on_progress: &mut dyn FnMut(u8)) {
    if let Some(p) = percent {
        on_progress(p);
    }
}

#[cfg(test)]
mod tests {
    use super::{LoadError, load_model};
    use crate::fetch::{FetchError, MemoryFetcher};
    use formats::ModelFormatError;

    const TRIANGLE: &str = r#"{
        "asset": { "version": "2.0" },
        "nodes": [ { "mesh": 0 } ],
        "meshes": [ { "primitives": [ { "attributes": { "POSITION": 0 } } ] } ],
        "accessors": [ { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" } ],
        "bufferViews": [ { "buffer": 0, "byteLength": 36 } ],
        "buffers": [ { "byteLength": 36,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA" } ]
    }"#;

    #[test]
    fn reports_milestones_and_transfer_progress() {
        let fetcher = MemoryFetcher::new()
            .with_asset("m.gltf", TRIANGLE.as_bytes().to_vec())
            .with_chunk_size(TRIANGLE.len() / 2 + 1);
        let mut seen = Vec::new();
        let scene = pollster::block_on(load_model(&fetcher, "m.gltf", &mut |p| seen.push(p))).unwrap();
        assert_eq!(scene.vertex_count(), 3);
        assert_eq!(seen.first(), Some(&10));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert!(seen.contains(&90));
    }

    #[test]
    fn chunked_transfer_reports_each_chunk() {
        let fetcher = MemoryFetcher::new()
            .with_asset("m.gltf", TRIANGLE.as_bytes().to_vec())
            .with_chunk_size(TRIANGLE.len() / 20);
        let mut seen = Vec::new();
        pollster::block_on(load_model(&fetcher, "m.gltf", &mut |p| seen.push(p))).unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        let transfer: Vec<u8> = seen.iter().copied().filter(|p| *p > 20 && *p < 90).collect();
        assert!(transfer.len() >= 10, "{seen:?}");
        assert_eq!(&seen[seen.len() - 2..], &[90, 100]);
    }

    #[test]
    fn fetch_failure_is_reported() {
        let fetcher = MemoryFetcher::new();
        let err = pollster::block_on(load_model(&fetcher, "missing.glb", &mut |_| {})).unwrap_err();
        assert!(matches!(err, LoadError::Fetch(FetchError::NotFound(_))));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn parse_failure_is_reported() {
        let fetcher = MemoryFetcher::new().with_asset("bad.glb", b"garbage".to_vec());
        let err = pollster::block_on(load_model(&fetcher, "bad.glb", &mut |_| {})).unwrap_err();
        assert!(matches!(err, LoadError::Format(ModelFormatError::Json(_))));
    }
}
