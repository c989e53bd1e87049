use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MIN_INTERVAL_MS: u64 = 750;

static CLIENT: OnceCell<Client> = OnceCell::new();

fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

/// Retrieval seam for the adapters. Network and timeout failures are `Err`;
/// a successful fetch of a useless page is still `Ok` and left to the
/// extraction fallback chains.
pub trait Fetcher: Send + Sync {
    fn fetch_html(&self, path: &str) -> Result<String>;
}

/// HTTP fetcher with a private minimum-interval gate. The gate belongs to the
/// instance, not the process: two independently constructed fetchers against
/// the same host do not share it.
pub struct HttpFetcher {
    base_url: String,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_min_interval(base_url, Duration::from_millis(DEFAULT_MIN_INTERVAL_MS))
    }

    pub fn with_min_interval(base_url: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Reserve the next send slot and return how long to wait for it.
    fn reserve_slot(&self) -> Duration {
        let mut last = self.last_call.lock().expect("throttle lock poisoned");
        let now = Instant::now();
        let ready = match *last {
            Some(prev) => (prev + self.min_interval).max(now),
            None => now,
        };
        *last = Some(ready);
        ready.saturating_duration_since(now)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_html(&self, path: &str) -> Result<String> {
        let wait = self.reserve_slot();
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }

        let url = self.url_for(path);
        log::debug!("GET {url}");
        let resp = http_client()?
            .get(&url)
            .header(USER_AGENT, "Mozilla/5.0")
            .send()
            .with_context(|| format!("request failed: {url}"))?;
        let status = resp.status();
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "http {status} for {url}: {}",
                crate::util::truncate_for_log(&body, 160)
            ));
        }
        Ok(body)
    }
}
