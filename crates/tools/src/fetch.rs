use std::path::{Path, PathBuf};

use streaming::{AssetFetcher, FetchError, TransferProgress};
use tracing::debug;

const PROGRESS_CHUNK: usize = 64 * 1024;

/// Serves model files from the local disk.
///
/// Relative paths and `file://` URLs are resolved against `root`.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        let raw = url.strip_prefix("file://").unwrap_or(url);
        let p = Path::new(raw);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

impl AssetFetcher for FileFetcher {
    async fn fetch(&self, url: &str, progress: TransferProgress<'_>) -> Result<Vec<u8>, FetchError> {
        let path = self.path_for(url);
        debug!(path = %path.display(), "reading model file");
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(path.display().to_string()),
            _ => FetchError::Network(format!("{}: {e}", path.display())),
        })?;
        let total = bytes.len() as u64;
        let mut loaded = 0usize;
        while loaded < bytes.len() {
            loaded = (loaded + PROGRESS_CHUNK).min(bytes.len());
            progress(loaded as u64, Some(total));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::FileFetcher;
    use std::path::Path;
    use streaming::{AssetFetcher, FetchError};

    #[test]
    fn resolves_relative_and_file_urls() {
        let f = FileFetcher::new("/data");
        assert_eq!(f.path_for("m.glb"), Path::new("/data/m.glb"));
        assert_eq!(f.path_for("file:///abs/m.glb"), Path::new("/abs/m.glb"));
    }

    #[test]
    fn reads_bytes_and_reports_completion() {
        let dir = std::env::temp_dir().join(format!("geoviz-fetch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("blob.bin"), vec![7u8; 70_000]).unwrap();

        let f = FileFetcher::new(&dir);
        let mut seen = Vec::new();
        let bytes = pollster::block_on(f.fetch("blob.bin", &mut |loaded, total| {
            seen.push((loaded, total));
        }))
        .unwrap();
        assert_eq!(bytes.len(), 70_000);
        assert_eq!(seen.last(), Some(&(70_000, Some(70_000))));
        assert_eq!(seen.len(), 2);

        let missing = pollster::block_on(f.fetch("nope.bin", &mut |_, _| {}));
        assert!(matches!(missing, Err(FetchError::NotFound(_))));
        std::fs::remove_dir_all(&dir).ok();
    }
}
