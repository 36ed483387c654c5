use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

const DIGEST_CHARS: usize = 20;

/// Request parameters. Ordered so the cache key is independent of insertion order.
pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub endpoint: String,
    pub params: Params,
    pub fetched_at_unix: f64,
    pub duration_ms: u64,
    pub retries: u32,
    pub max_attempts: u32,
    pub timeout_s: f64,
    pub min_interval_s: f64,
}

/// One cached request: fetch metadata plus the verbatim decoded payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub meta: CacheMeta,
    pub data: Value,
}

pub fn cache_key(endpoint: &str, params: &Params) -> String {
    let encoded = serde_json::to_string(params).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(format!("{endpoint}|{encoded}").as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{endpoint}_{}", &digest[..DIGEST_CHARS])
}

pub fn cache_path(dir: &Path, endpoint: &str, params: &Params) -> PathBuf {
    dir.join(format!("{}.json", cache_key(endpoint, params)))
}

pub fn load_cached(path: &Path) -> Option<CachedResponse> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<CachedResponse>(&raw) {
        Ok(cached) => Some(cached),
        Err(err) => {
            tracing::warn!("ignoring unreadable cache file {}: {err}", path.display());
            None
        }
    }
}

pub fn store(path: &Path, response: &CachedResponse) -> Result<()> {
    write_json_atomic(path, response)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str::<T>(&raw).ok()
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value).context("serialize cache entry")?;
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

pub fn unix_now_secs() -> f64 {
    system_time_to_secs(SystemTime::now()).unwrap_or_default()
}

fn system_time_to_secs(time: SystemTime) -> Option<f64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs_f64())
}
