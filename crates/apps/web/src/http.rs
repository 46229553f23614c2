use gloo_net::http::{Request, Response};
use js_sys::{Reflect, Uint8Array};
use streaming::{AssetFetcher, FetchError, TransferProgress};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::ReadableStreamDefaultReader;

/// Fetches model binaries over HTTP from the page.
///
/// The body is read chunk by chunk, reporting progress after each one.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFetcher;

fn js_error(err: JsValue) -> FetchError {
    FetchError::Network(err.as_string().unwrap_or_else(|| format!("{err:?}")))
}

async fn read_stream(
    resp: &Response,
    total: Option<u64>,
    progress: TransferProgress<'_>,
) -> Result<Vec<u8>, FetchError> {
    let Some(body) = resp.body() else {
        let bytes = resp
            .binary()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let loaded = bytes.len() as u64;
        progress(loaded, Some(total.unwrap_or(loaded)));
        return Ok(bytes);
    };
    let reader: ReadableStreamDefaultReader = body.get_reader().unchecked_into();
    let mut bytes = Vec::with_capacity(total.unwrap_or(0).min(64 << 20) as usize);
    let result = loop {
        let step = match JsFuture::from(reader.read()).await {
            Ok(step) => step,
            Err(err) => break Err(js_error(err)),
        };
        let done = Reflect::get(&step, &JsValue::from_str("done"))
            .map(|v| v.is_truthy())
            .unwrap_or(true);
        if done {
            break Ok(());
        }
        let Ok(value) = Reflect::get(&step, &JsValue::from_str("value")) else {
            break Err(FetchError::Network("stream chunk without a value".into()));
        };
        let chunk = Uint8Array::new(&value);
        let start = bytes.len();
        bytes.resize(start + chunk.length() as usize, 0);
        chunk.copy_to(&mut bytes[start..]);
        progress(bytes.len() as u64, total);
    };
    reader.release_lock();
    result.map(|()| bytes)
}

impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, progress: TransferProgress<'_>) -> Result<Vec<u8>, FetchError> {
        let resp = Request::get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        match resp.status() {
            404 => return Err(FetchError::NotFound(url.to_string())),
            _ if !resp.ok() => {
                return Err(FetchError::Http {
                    url: url.to_string(),
                    status: resp.status(),
                });
            }
            _ => {}
        }
        let total = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        read_stream(&resp, total, progress).await
    }
}
