use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::FetchError;
use crate::http_cache::{self, CacheMeta, CachedResponse, Params};
use crate::http_client::{STATS_HEADERS, http_client};

const STATS_BASE_URL: &str = "https://stats.nba.com/stats";

static LAST_REQUEST: Mutex<Option<Instant>> = Mutex::new(None);

/// Something that can answer a stats request. Network in production, scripted in tests.
pub trait Transport {
    fn get_json(&self, endpoint: &str, params: &Params) -> Result<Value, FetchError>;
}

pub struct StatsTransport {
    base_url: String,
    timeout: Duration,
}

impl StatsTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            base_url: STATS_BASE_URL.to_string(),
            timeout,
        }
    }
}

impl Transport for StatsTransport {
    fn get_json(&self, endpoint: &str, params: &Params) -> Result<Value, FetchError> {
        let client = http_client().map_err(|err| FetchError::Fatal(format!("{err:#}")))?;
        let url = format!("{}/{}", self.base_url, endpoint.to_ascii_lowercase());
        let mut req = client.get(&url).query(params).timeout(self.timeout);
        for (name, value) in STATS_HEADERS {
            req = req.header(*name, *value);
        }
        let resp = req.send().map_err(classify_send_error)?;
        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(FetchError::Transient(format!("http {status} from {endpoint}")));
        }
        if !status.is_success() {
            return Err(FetchError::Fatal(format!("http {status} from {endpoint}")));
        }
        let body = resp
            .text()
            .map_err(|err| FetchError::Transient(format!("read body: {err}")))?;
        serde_json::from_str::<Value>(body.trim())
            .map_err(|err| FetchError::Fatal(format!("malformed json from {endpoint}: {err}")))
    }
}

fn classify_send_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        FetchError::Transient(err.to_string())
    } else {
        FetchError::Fatal(err.to_string())
    }
}

/// Exponential backoff with additive jitter: `min(max, initial * 2^(attempt-1)) + U[0, jitter)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff);
        if self.jitter.is_zero() {
            return base;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..self.jitter.as_millis().max(1) as u64);
        base + Duration::from_millis(jitter_ms)
    }
}

/// Runs `op` until it succeeds, fails fatally, or the attempt budget is spent.
/// Returns the value together with the number of retries it took.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    label: &str,
    mut op: impl FnMut(u32) -> Result<T, FetchError>,
) -> Result<(T, u32), FetchError> {
    let attempts = policy.max_attempts.max(1);
    let mut last_err: Option<FetchError> = None;
    for attempt in 1..=attempts {
        match op(attempt) {
            Ok(value) => return Ok((value, attempt - 1)),
            Err(err) if err.is_transient() && attempt < attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{label}: attempt {attempt}/{attempts} failed ({err}); retrying in {:.1}s",
                    delay.as_secs_f64()
                );
                thread::sleep(delay);
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| FetchError::Fatal(format!("{label}: no attempts made"))))
}

/// Sleeps until at least `min_interval` has passed since the previous request in this process.
pub fn rate_limit(min_interval: Duration) {
    let mut last = LAST_REQUEST.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(prev) = *last {
        let elapsed = prev.elapsed();
        if elapsed < min_interval {
            thread::sleep(min_interval - elapsed);
        }
    }
    *last = Some(Instant::now());
}

/// Cached, paced, retrying front of a [`Transport`].
pub struct Fetcher<T: Transport> {
    transport: T,
    cache_dir: PathBuf,
    policy: RetryPolicy,
    min_interval: Duration,
    timeout: Duration,
    use_cache: bool,
}

impl Fetcher<StatsTransport> {
    pub fn from_settings(settings: &Settings) -> Self {
        Fetcher::new(StatsTransport::new(settings.timeout), settings.raw_dir())
            .with_policy(RetryPolicy {
                max_attempts: settings.max_attempts,
                ..RetryPolicy::default()
            })
            .with_min_interval(settings.min_interval)
            .with_timeout(settings.timeout)
    }
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            cache_dir: cache_dir.into(),
            policy: RetryPolicy::default(),
            min_interval: Duration::from_millis(1200),
            timeout: Duration::from_secs(15),
            use_cache: true,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the cached response, or fetches and caches it. Failures are logged and
    /// collapse to `None` so callers can treat the source as unavailable for this run.
    pub fn fetch(&self, endpoint: &str, params: &Params) -> Option<CachedResponse> {
        let path = http_cache::cache_path(&self.cache_dir, endpoint, params);
        if self.use_cache
            && let Some(cached) = http_cache::load_cached(&path)
        {
            info!("CACHE HIT: {endpoint} {params:?}");
            return Some(cached);
        }

        let started = Instant::now();
        let outcome = with_retry(&self.policy, endpoint, |_| {
            rate_limit(self.min_interval);
            info!("calling {endpoint} {params:?}");
            self.transport.get_json(endpoint, params)
        });
        let (data, retries) = match outcome {
            Ok(ok) => ok,
            Err(err) => {
                error!("FETCH FAILED: {endpoint} {params:?}: {err}");
                return None;
            }
        };

        let response = CachedResponse {
            meta: CacheMeta {
                endpoint: endpoint.to_string(),
                params: params.clone(),
                fetched_at_unix: http_cache::unix_now_secs(),
                duration_ms: started.elapsed().as_millis() as u64,
                retries,
                max_attempts: self.policy.max_attempts,
                timeout_s: self.timeout.as_secs_f64(),
                min_interval_s: self.min_interval.as_secs_f64(),
            },
            data,
        };
        if let Err(err) = http_cache::store(&path, &response) {
            warn!("could not cache {endpoint}: {err:#}");
        } else {
            info!("cached {endpoint} -> {}", path.display());
        }
        Some(response)
    }
}
