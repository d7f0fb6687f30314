//!
//! src/fetch.rs
//!
//! Defines request builders for the proxy and iTunes endpoints, the
//! CatalogClient seam the resolver works against, and the retrying
//! HTTP implementation behind it
//!
//!

use std::time::Duration;

use async_trait::async_trait;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use reqwest::{Client, header, redirect, RequestBuilder};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::config::{AppConfig, HttpConfig, ItunesConfig, ProxyConfig, RetryConfig};
use crate::errors::ResolverError;
use crate::types::{Provider, RawCandidate, Track};

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

pub fn base_client(http: &HttpConfig) -> Result<Client, ResolverError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_helper(http)
        .default_headers(h)
        .build()
        .map_err(|e| ResolverError::Http(format!("build client: {e}")))
}

/// Simple function to generate random wait for http_with_retry
fn generate_backoff(ms: u64, attempt: usize, rng: &mut SmallRng) -> Duration {
    let exp = (1_u64 << attempt.min(6)) * ms;
    let jitter = rng.gen_range(50..=200) as u64;
    Duration::from_millis(exp + jitter)
}

/// Sends a request, retrying 429s and server errors with exponential
/// backoff. A 404 surfaces as NotFound so lookups of bad ids stay
/// distinguishable from transport trouble.
pub async fn http_with_retry(
    request: RequestBuilder,
    max_retries: usize,
    backoff_ms: u64
) -> Result<Value, ResolverError> {
    let mut rng = SmallRng::from_entropy();
    let mut attempt = 0_usize;
    loop {
        let response = request.try_clone()
            .ok_or_else(|| ResolverError::Http("non-cloneable request".to_string()))?
            .send()
            .await;
        match response {
            Ok(resp) => {
                if resp.status().is_success() {
                    let v = resp.json::<Value>().await?;
                    return Ok(v);
                }
                let status = resp.status();
                let _body = resp.text().await.unwrap_or_default();
                let retryable = status.as_u16() == 429 || status.is_server_error();
                if !retryable || attempt >= max_retries {
                    if status.as_u16() == 404 {
                        return Err(ResolverError::NotFound(format!("status {status}")));
                    }
                    return Err(ResolverError::Http(
                        format!("status {} after {} retries", status, attempt)
                    ));
                }
                let backoff = generate_backoff(backoff_ms, attempt, &mut rng);
                warn!(status = %status, backoff = ?backoff.as_millis(), "http.retry");
                sleep(backoff).await;
                attempt += 1;
            },
            Err(e) => {
                if attempt >= max_retries {
                    return Err(e.into());
                }
                let backoff = generate_backoff(backoff_ms, attempt, &mut rng);
                warn!(backoff = ?backoff.as_millis(), "http.retry.error");
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProxyClient {
    pub http: Client,
    pub base: Url,
}

impl ProxyClient {
    pub fn new(http_config: &HttpConfig, cfg: &ProxyConfig) ->
        Result<Self, ResolverError> {

        let http = base_client(http_config)?;
        Ok( Self {
            http,
            base: cfg.base_url.clone()
        })
    }

    /// GET /track/{id}
    pub fn spotify_track(&self, track_id: &str) -> RequestBuilder {
        let url = self.base.join(&format!("track/{track_id}")).unwrap();
        self.http.get(url)
    }

    /// GET /apple-track/{id}
    pub fn apple_track(&self, track_id: &str) -> RequestBuilder {
        let url = self.base.join(&format!("apple-track/{track_id}")).unwrap();
        self.http.get(url)
    }

    /// GET /get-video-title?v={id}
    pub fn youtube_title(&self, video_id: &str) -> RequestBuilder {
        let url = self.base.join("get-video-title").unwrap();
        self.http.get(url).query(&[("v", video_id)])
    }

    /// GET /search-{provider}?q=...&region=
    pub fn search(&self, provider: Provider, query: &str, region: Option<&str>)
        -> RequestBuilder {
        let url = self.base.join(&format!("search-{provider}")).unwrap();
        let mut rb = self.http.get(url).query(&[("q", query)]);
        if let Some(region) = region {
            rb = rb.query(&[("region", region)]);
        }
        rb
    }
}

#[derive(Clone, Debug)]
pub struct ItunesClient {
    pub http: Client,
    pub base: Url,
    pub entity: String,
}

impl ItunesClient {
    pub fn new(http_config: &HttpConfig, cfg: &ItunesConfig) ->
        Result<Self, ResolverError> {

        let http = base_client(http_config)?;
        Ok( Self {
            http,
            base: cfg.base_url.clone(),
            entity: cfg.entity.clone()
        })
    }

    /// GET /search?term=...&entity=song&limit=&country=
    pub fn search(&self, term: &str, limit: u32, country: Option<&str>)
        -> RequestBuilder {
        let url = self.base.join("search").unwrap();
        let limit = limit.to_string();
        let mut rb = self.http.get(url).query(&[
            ("term", term),
            ("entity", self.entity.as_str()),
            ("limit", limit.as_str()),
        ]);
        if let Some(country) = country {
            rb = rb.query(&[("country", country)]);
        }
        rb
    }
}

/// Capability seam between the resolver and the catalogs. Matching logic
/// only ever sees this trait, never the transport.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Resolve a provider-specific track id to its canonical metadata.
    async fn lookup(&self, provider: Provider, id: &str) -> Result<Track, ResolverError>;

    /// Free-text search against one provider's catalog, relevance-ordered.
    async fn search(
        &self,
        provider: Provider,
        query: &str,
        region: Option<&str>,
    ) -> Result<Vec<RawCandidate>, ResolverError>;
}

/// Production CatalogClient: proxy endpoints with retry, plus the public
/// iTunes Search API as a fallback for Apple searches.
#[derive(Clone, Debug)]
pub struct HttpCatalogClient {
    proxy: ProxyClient,
    itunes: ItunesClient,
    retry: RetryConfig,
    limit: u32,
}

impl HttpCatalogClient {
    pub fn new(cfg: &AppConfig) -> Result<Self, ResolverError> {
        Ok( Self {
            proxy: ProxyClient::new(&cfg.http, &cfg.proxy)?,
            itunes: ItunesClient::new(&cfg.http, &cfg.itunes)?,
            retry: cfg.http.retry.clone(),
            limit: cfg.search.limit,
        })
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn lookup(&self, provider: Provider, id: &str) -> Result<Track, ResolverError> {
        let request = match provider {
            Provider::Spotify => self.proxy.spotify_track(id),
            Provider::Apple   => self.proxy.apple_track(id),
            Provider::Youtube => self.proxy.youtube_title(id),
        };
        let value = http_with_retry(
            request,
            self.retry.max_attempts as usize,
            self.retry.base_backoff.as_millis() as u64
        ).await?;
        decode_track(provider, &value)
    }

    async fn search(&self, provider: Provider, query: &str, region: Option<&str>)
        -> Result<Vec<RawCandidate>, ResolverError> {
        let max_retries = self.retry.max_attempts as usize;
        let backoff_ms = self.retry.base_backoff.as_millis() as u64;

        let proxied = http_with_retry(
            self.proxy.search(provider, query, region),
            max_retries,
            backoff_ms
        ).await
        .and_then(|value| decode_candidates(&value));

        let candidates = match proxied {
            Ok(candidates) => candidates,
            Err(e) if provider == Provider::Apple => {
                debug!(error = ?e, %query, "search.itunes.fallback");
                let value = http_with_retry(
                    self.itunes.search(query, self.limit, region),
                    max_retries,
                    backoff_ms
                ).await
                .map_err(|e| ResolverError::Search(format!("apple search: {e}")))?;
                decode_itunes_results(&value)
                    .map_err(|e| ResolverError::Search(format!("apple search: {e}")))?
            }
            Err(e) => {
                return Err(ResolverError::Search(format!("{provider} search: {e}")));
            }
        };

        Ok(candidates.into_iter().take(self.limit as usize).collect())
    }
}

fn decode_track(provider: Provider, value: &Value) -> Result<Track, ResolverError> {
    match provider {
        Provider::Spotify => {
            let title = value.get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ResolverError::Parse("spotify track missing name".into()))?
                .to_string();
            let artist = value.get("artists")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter()
                    .filter_map(|a| a.get("name").and_then(|v| v.as_str()))
                    .collect::<Vec<_>>()
                    .join(", "))
                .filter(|joined| !joined.is_empty());
            Ok( Track { title, artist } )
        }
        Provider::Apple => {
            let title = value.get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ResolverError::Parse("apple track missing name".into()))?
                .to_string();
            let artist = value.get("artist")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .filter(|a| !a.is_empty());
            Ok( Track { title, artist } )
        }
        Provider::Youtube => {
            let title = value.get("title")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ResolverError::Parse("video response missing title".into()))?
                .to_string();
            Ok( Track { title, artist: None } )
        }
    }
}

// A payload that isn't the expected shape is an error; rows missing
// required fields within a well-formed payload are skipped.
fn decode_candidates(value: &Value) -> Result<Vec<RawCandidate>, ResolverError> {
    let rows = value.as_array()
        .ok_or_else(|| ResolverError::Parse("search payload is not an array".into()))?;
    Ok(rows.iter().filter_map(decode_candidate).collect())
}

fn decode_candidate(value: &Value) -> Option<RawCandidate> {
    let title = value.get("title").and_then(|v| v.as_str())?.to_string();
    let url = value.get("url").and_then(|v| v.as_str())?.to_string();
    let artist = value.get("artist")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let track_number = value.get("trackNumber")
        .and_then(|v| v.as_u64())
        .map(|n| n as u32);
    Some( RawCandidate { title, artist, url, track_number } )
}

fn decode_itunes_results(value: &Value) -> Result<Vec<RawCandidate>, ResolverError> {
    let rows = value.get("results")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ResolverError::Parse("itunes payload missing results array".into()))?;
    Ok(rows.iter()
        .filter_map(|r| {
            let title = r.get("trackName").and_then(|v| v.as_str())?.to_string();
            let url = r.get("trackViewUrl").and_then(|v| v.as_str())?.to_string();
            let artist = r.get("artistName")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let track_number = r.get("trackNumber")
                .and_then(|v| v.as_u64())
                .map(|n| n as u32);
            Some( RawCandidate { title, artist, url, track_number } )
        })
        .collect())
}
