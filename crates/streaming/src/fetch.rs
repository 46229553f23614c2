use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },
    #[error("network error: {0}")]
    Network(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Byte-transfer callback: `(loaded, total)`; `total` is `None` when the
/// transport does not know the content length.
pub type TransferProgress<'a> = &'a mut dyn FnMut(u64, Option<u64>);

/// Source of model asset bytes.
///
/// Futures are polled on the UI thread, so no `Send` bound is required.
pub trait AssetFetcher {
    fn fetch(
        &self,
        url: &str,
        progress: TransferProgress<'_>,
    ) -> impl Future<Output = Result<Vec<u8>, FetchError>>;
}

/// In-memory fetcher for tests and offline tools. Delivers bytes in chunks
/// and can be told to fail the next N requests for a URL.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    assets: HashMap<String, Vec<u8>>,
    failures: RefCell<HashMap<String, u32>>,
    chunk: usize,
    report_total: bool,
    requests: RefCell<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self {
            chunk: 1024,
            report_total: true,
            ..Self::default()
        }
    }

    pub fn with_asset(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.assets.insert(url.into(), bytes);
        self
    }

    pub fn with_chunk_size(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    /// Hide the content length, as chunked transfers do.
    pub fn without_total(mut self) -> Self {
        self.report_total = false;
        self
    }

    pub fn fail_next(&self, url: &str, times: u32) {
        self.failures.borrow_mut().insert(url.to_string(), times);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl AssetFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str, progress: TransferProgress<'_>) -> Result<Vec<u8>, FetchError> {
        self.requests.borrow_mut().push(url.to_string());
        {
            let mut failures = self.failures.borrow_mut();
            if let Some(left) = failures.get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(FetchError::Network(format!("connection reset fetching {url}")));
                }
            }
        }
        let bytes = self
            .assets
            .get(url)
            .ok_or_else(|| FetchError::NotFound(url.to_string()))?;
        let total = self.report_total.then_some(bytes.len() as u64);
        let mut loaded = 0u64;
        for chunk in bytes.chunks(self.chunk.max(1)) {
            loaded += chunk.len() as u64;
            progress(loaded, total);
        }
        Ok(bytes.clone())
    }
}
