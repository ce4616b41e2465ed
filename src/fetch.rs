use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::{CachePolicy, RunConfig};
use crate::dom::Document;
use crate::region::Region;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_ENV: &str = "EDUMAP_USER_AGENT";
const DEFAULT_USER_AGENT: &str = concat!("edumap/", env!("CARGO_PKG_VERSION"));
const DETAIL_URL_PREFIX: &str = "https://en.wikipedia.org";

/// Cache key of a region's listing page.
pub const LISTING_KEY: &str = "(ALL)";

/// Absolute locator for a candidate link.
pub fn detail_url(link: &str) -> String {
    if link.starts_with("http") {
        link.to_string()
    } else {
        format!("{}{}", DETAIL_URL_PREFIX, link)
    }
}

/// Parsed documents by key. Failures come back as `None`, never as errors.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, region: &Region, key: &str, locator: &str) -> Option<Document>;
}

/// HTTP fetcher backed by a per-region document cache on disk.
pub struct CachedFetcher {
    client: reqwest::Client,
    cache_dir: PathBuf,
    policy: CachePolicy,
    write_docs: bool,
}

impl CachedFetcher {
    pub fn new(config: &RunConfig) -> Result<Self> {
        let user_agent =
            std::env::var(USER_AGENT_ENV).unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            cache_dir: config.cache_dir.clone(),
            policy: config.cache_policy,
            write_docs: config.write_docs,
        })
    }

    /// `<cache>/<ABBR>/docs/<key>.html`
    pub fn cache_path(&self, region: &Region, key: &str) -> PathBuf {
        self.cache_dir
            .join(&region.abbr)
            .join("docs")
            .join(format!("{}.html", key))
    }

    async fn load(&self, path: &Path, locator: &str) -> Result<Option<String>> {
        let cached = tokio::fs::try_exists(path).await.unwrap_or(false);
        if cached && self.policy != CachePolicy::RemoteOnly {
            let html = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return Ok(Some(html));
        }
        if self.policy == CachePolicy::Never {
            return Ok(None);
        }

        let html = fetch_with_retry(&self.client, locator).await?;
        if self.write_docs {
            if let Err(e) = store(path, &html).await {
                warn!("Could not cache {}: {:#}", path.display(), e);
            }
        }
        Ok(Some(html))
    }
}

#[async_trait]
impl DocumentSource for CachedFetcher {
    async fn fetch(&self, region: &Region, key: &str, locator: &str) -> Option<Document> {
        let path = self.cache_path(region, key);
        match self.load(&path, locator).await {
            Ok(Some(html)) => Some(Document::parse(&html)),
            Ok(None) => {
                debug!("{}: no cached copy of {}", region.abbr, key);
                None
            }
            Err(e) => {
                warn!("{}: fetch failed for {}: {:#}", region.abbr, key, e);
                None
            }
        }
    }
}

async fn store(path: &Path, html: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, html).await?;
    Ok(())
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff_for(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt))
}

async fn fetch_with_retry(client: &reqwest::Client, url: &str) -> Result<String> {
    let mut attempt = 0;
    loop {
        let start = Instant::now();
        let response = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await.context("Failed to read body")?;
            debug!("GET {} {} in {}ms", url, status, start.elapsed().as_millis());
            return Ok(body);
        }
        if !should_retry(status) || attempt == MAX_RETRIES {
            bail!("GET {} returned {}", url, status);
        }

        let backoff = backoff_for(attempt);
        warn!(
            "{} on {} (attempt {}/{}), backing off {:.1}s",
            status,
            url,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// Documents keyed by locator, for tests.
#[cfg(test)]
pub struct MemorySource(std::collections::HashMap<String, String>);

#[cfg(test)]
impl MemorySource {
    pub fn new(pages: &[(&str, &str)]) -> Self {
        Self(
            pages
                .iter()
                .map(|(url, html)| (url.to_string(), html.to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
#[async_trait]
impl DocumentSource for MemorySource {
    async fn fetch(&self, _region: &Region, _key: &str, locator: &str) -> Option<Document> {
        self.0.get(locator).map(|html| Document::parse(html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(dir: &Path, policy: CachePolicy) -> CachedFetcher {
        let config = RunConfig {
            cache_dir: dir.to_path_buf(),
            cache_policy: policy,
            ..Default::default()
        };
        CachedFetcher::new(&config).unwrap()
    }

    #[test]
    fn detail_urls() {
        assert_eq!(
            detail_url("/wiki/Duke_University"),
            "https://en.wikipedia.org/wiki/Duke_University"
        );
        assert_eq!(detail_url("https://example.org/x"), "https://example.org/x");
    }

    #[test]
    fn retry_policy() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::NOT_FOUND));
        assert_eq!(backoff_for(0), Duration::from_millis(2000));
        assert_eq!(backoff_for(2), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn cached_copy_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let region = Region::new("NC", "North Carolina");
        let f = fetcher(dir.path(), CachePolicy::PreferCache);
        let path = f.cache_path(&region, "Duke University");
        assert!(path.ends_with("NC/docs/Duke University.html"));
        store(&path, "<html><body><p class=\"x\">cached</p></body></html>")
            .await
            .unwrap();

        // unroutable locator: only the cache can answer
        let doc = f.fetch(&region, "Duke University", "http://127.0.0.1:9/").await.unwrap();
        assert!(doc.root().text().contains("cached"));
    }

    #[tokio::test]
    async fn never_policy_stays_offline() {
        let dir = tempfile::tempdir().unwrap();
        let region = Region::new("NC", "North Carolina");
        let f = fetcher(dir.path(), CachePolicy::Never);
        assert!(f.fetch(&region, "Missing College", "http://127.0.0.1:9/").await.is_none());
    }

    #[tokio::test]
    async fn unreachable_remote_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let region = Region::new("NC", "North Carolina");
        let f = fetcher(dir.path(), CachePolicy::RemoteOnly);
        assert!(f.fetch(&region, "Gone", "http://127.0.0.1:9/").await.is_none());
        assert!(!f.cache_path(&region, "Gone").exists());
    }
}
