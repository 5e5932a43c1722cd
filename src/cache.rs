use serde::{Serialize, de::DeserializeOwned};
use worker::{Cache, Response};

use crate::error::ApiError;

/// Synthetic URL the Workers cache stores an entry under.
pub fn cache_url(key: &str) -> String {
    format!("https://cache.local/{}", urlencoding::encode(key))
}

/// Cache key for one document's extraction under the given page/column options.
pub fn extraction_key(prefix: &str, digest: &str, options_fingerprint: &str) -> String {
    [prefix, digest, options_fingerprint]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(":")
}

pub async fn get_json<T>(key: &str) -> Result<Option<T>, ApiError>
where
    T: DeserializeOwned,
{
    let Some(mut hit) = Cache::default().get(cache_url(key), true).await? else {
        return Ok(None);
    };
    let body = hit.text().await?;
    // A stale entry from an older payload shape counts as a miss.
    Ok(serde_json::from_str::<T>(&body).ok())
}

pub async fn put_json<T>(key: &str, value: &T, ttl_seconds: u32) -> Result<(), ApiError>
where
    T: Serialize,
{
    let mut entry = Response::from_json(value)?;
    let headers = entry.headers_mut();
    headers.set("Cache-Control", &format!("public, max-age={ttl_seconds}"))?;
    headers.set("Content-Type", "application/json; charset=utf-8")?;

    Cache::default().put(cache_url(key), entry).await?;
    Ok(())
}
