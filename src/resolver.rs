//!
//! src/resolver.rs
//!
//! Walks ordered search strategies against foreign catalogs until one
//! produces a confident match, and orchestrates the two opposite-platform
//! resolutions that make up a conversion
//!
//!

use std::{sync::Arc, time::{Duration, Instant}};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, SearchConfig};
use crate::errors::ResolverError;
use crate::fetch::CatalogClient;
use crate::normalize::normalize_title;
use crate::scoring::{select_best, MatchPolicy};
use crate::types::{
    Conversion, MatchResult, MatchTarget, PlatformMatch, Provider, SearchStrategy, Track,
};

#[derive(Debug)]
struct RateGate {
    min_interval: Duration,
    state: tokio::sync::Mutex<Instant>,
}

impl RateGate {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: tokio::sync::Mutex::new(Instant::now() - min_interval),
        }
    }

    async fn wait(&self) {
        let mut last = self.state.lock().await;
        let elapsed = last.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        *last = Instant::now();
    }
}

/// Builds the descending-priority attempt list for one opposite platform:
/// combined query on the default locale first, then each configured region,
/// then a title-only rescue when an artist is available. YouTube queries
/// carry an "audio" hint to bias results away from music videos.
pub fn build_strategies(
    provider: Provider,
    target: &MatchTarget,
    cfg: &SearchConfig,
) -> Vec<SearchStrategy> {
    let base = match (&target.artist, provider) {
        (Some(artist), Provider::Youtube) => format!("{} {} audio", target.title, artist),
        (Some(artist), _)                 => format!("{} {}", target.title, artist),
        (None, Provider::Youtube)         => format!("{} audio", target.title),
        (None, _)                         => target.title.clone(),
    };

    let mut strategies = vec![SearchStrategy {
        query: base.clone(),
        region: None,
        priority: 100,
    }];

    let mut priority = 90_u32;
    for region in &cfg.regions {
        strategies.push(SearchStrategy {
            query: base.clone(),
            region: Some(region.clone()),
            priority,
        });
        priority = priority.saturating_sub(10);
    }

    // The counter has already stepped below every region priority, which
    // keeps the rescue last no matter how many regions are configured.
    if target.artist.is_some() {
        let title_only = match provider {
            Provider::Youtube => format!("{} audio", target.title),
            _ => target.title.clone(),
        };
        strategies.push(SearchStrategy {
            query: title_only,
            region: None,
            priority,
        });
    }

    strategies
}

pub struct Resolver {
    client: Arc<dyn CatalogClient>,
    policy: MatchPolicy,
    search: SearchConfig,
    cancel: CancellationToken,
}

impl Resolver {
    pub fn new(client: Arc<dyn CatalogClient>, policy: MatchPolicy, search: SearchConfig) -> Self {
        Self {
            client,
            policy,
            search,
            cancel: CancellationToken::new(),
        }
    }

    /// Builds a resolver whose acceptance threshold comes from configuration.
    pub fn from_config(client: Arc<dyn CatalogClient>, cfg: &AppConfig) -> Self {
        Self::new(
            client,
            MatchPolicy::with_threshold(cfg.search.threshold),
            cfg.search.clone(),
        )
    }

    /// Token callers cancel to abandon every in-flight resolution.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Walks strategies in descending priority order and returns the first
    /// accepted match. Individual attempt failures are logged and swallowed;
    /// only cancellation escalates. Ok(None) means every strategy was
    /// exhausted without a confident match.
    pub async fn resolve_across_strategies(
        &self,
        provider: Provider,
        mut strategies: Vec<SearchStrategy>,
        target: &MatchTarget,
    ) -> Result<Option<MatchResult>, ResolverError> {
        strategies.sort_by(|a, b| b.priority.cmp(&a.priority));

        let gate = RateGate::new(self.search.attempt_delay);
        for strategy in &strategies {
            if self.cancel.is_cancelled() {
                return Err(ResolverError::Cancelled);
            }
            tokio::select! {
                () = self.cancel.cancelled() => return Err(ResolverError::Cancelled),
                () = gate.wait() => {}
            }

            debug!(
                provider = %provider, query = %strategy.query,
                region = ?strategy.region, priority = strategy.priority,
                "resolve.attempt"
            );

            let outcome = tokio::select! {
                () = self.cancel.cancelled() => return Err(ResolverError::Cancelled),
                r = self.client.search(provider, &strategy.query, strategy.region.as_deref()) => r
            };

            let candidates = match outcome {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(provider = %provider, query = %strategy.query, error = ?e,
                        "search.attempt.failed");
                    continue;
                }
            };

            if let Some(result) = select_best(&candidates, target, &self.policy) {
                info!(provider = %provider, url = %result.candidate.url,
                    score = result.score, "resolve.accept");
                return Ok(Some(result));
            }
        }

        info!(provider = %provider, attempts = strategies.len(), "resolve.miss");
        Ok(None)
    }

    /// Resolves the target on one platform using the standard strategy list.
    pub async fn resolve_on(
        &self,
        provider: Provider,
        target: &MatchTarget,
    ) -> Result<Option<MatchResult>, ResolverError> {
        let strategies = build_strategies(provider, target, &self.search);
        self.resolve_across_strategies(provider, strategies, target).await
    }

    /// Full conversion: look up the source track, then resolve both opposite
    /// platforms concurrently. The two resolutions are isolated; a partial
    /// report (one platform matched, the other not) is a normal outcome.
    pub async fn convert(&self, source: Provider, id: &str) -> Result<Conversion, ResolverError> {
        let request_id = Uuid::new_v4();
        info!(request = %request_id, source = %source, track = %id, "convert.start");

        let track = tokio::select! {
            () = self.cancel.cancelled() => return Err(ResolverError::Cancelled),
            r = self.client.lookup(source, id) => r?
        };
        debug!(request = %request_id, title = %track.title, artist = ?track.artist,
            "convert.lookup");

        let target = derive_target(&track);

        let [first, second] = source.others();
        let (first_outcome, second_outcome) = tokio::join!(
            self.resolve_on(first, &target),
            self.resolve_on(second, &target),
        );

        // The strategy loop swallows search failures, so an Err outcome
        // here is only ever a cancellation.
        let matches = vec![
            PlatformMatch { provider: first, result: first_outcome? },
            PlatformMatch { provider: second, result: second_outcome? },
        ];

        info!(
            request = %request_id,
            found = matches.iter().filter(|m| m.result.is_some()).count(),
            "convert.done"
        );

        Ok( Conversion { request_id, source, track, matches } )
    }
}

/// Canonical metadata passes through untouched; a free-text title (no
/// artist from the source platform) gets normalized first.
fn derive_target(track: &Track) -> MatchTarget {
    match &track.artist {
        Some(artist) => MatchTarget {
            title: track.title.clone(),
            artist: Some(artist.clone()),
        },
        None => normalize_title(&track.title).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawCandidate;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    type SearchScript = Vec<Result<Vec<RawCandidate>, ResolverError>>;

    /// In-memory CatalogClient fed per-provider response scripts. An empty
    /// script answers every further search with no candidates.
    struct ScriptedClient {
        track: Option<Track>,
        scripts: Mutex<HashMap<Provider, SearchScript>>,
        queries: Mutex<Vec<(Provider, String, Option<String>)>>,
    }

    impl ScriptedClient {
        fn new(track: Option<Track>, scripts: Vec<(Provider, SearchScript)>) -> Self {
            Self {
                track,
                scripts: Mutex::new(scripts.into_iter().collect()),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CatalogClient for ScriptedClient {
        async fn lookup(&self, _provider: Provider, id: &str) -> Result<Track, ResolverError> {
            self.track
                .clone()
                .ok_or_else(|| ResolverError::NotFound(format!("track {id}")))
        }

        async fn search(
            &self,
            provider: Provider,
            query: &str,
            region: Option<&str>,
        ) -> Result<Vec<RawCandidate>, ResolverError> {
            self.queries.lock().unwrap().push((
                provider,
                query.to_string(),
                region.map(str::to_string),
            ));
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&provider) {
                Some(script) if !script.is_empty() => script.remove(0),
                _ => Ok(Vec::new()),
            }
        }
    }

    fn candidate(title: &str, artist: &str, url: &str) -> RawCandidate {
        RawCandidate {
            title: title.to_string(),
            artist: artist.to_string(),
            url: url.to_string(),
            track_number: None,
        }
    }

    fn target(title: &str, artist: Option<&str>) -> MatchTarget {
        MatchTarget {
            title: title.to_string(),
            artist: artist.map(str::to_string),
        }
    }

    fn search_config() -> SearchConfig {
        SearchConfig {
            threshold: 0.75,
            regions: vec!["jp".to_string()],
            attempt_delay: Duration::from_millis(1),
            limit: 5,
        }
    }

    #[test]
    fn strategies_order_and_fallbacks() {
        let cfg = search_config();
        let t = target("Flowers", Some("Miley Cyrus"));

        let strategies = build_strategies(Provider::Spotify, &t, &cfg);
        assert_eq!(strategies.len(), 3);
        assert_eq!(strategies[0].query, "Flowers Miley Cyrus");
        assert_eq!(strategies[0].region, None);
        assert_eq!(strategies[1].region.as_deref(), Some("jp"));
        assert!(strategies[0].priority > strategies[1].priority);
        assert_eq!(strategies[2].query, "Flowers");
        assert!(strategies[1].priority > strategies[2].priority);

        let youtube = build_strategies(Provider::Youtube, &t, &cfg);
        assert_eq!(youtube[0].query, "Flowers Miley Cyrus audio");
        assert_eq!(youtube[2].query, "Flowers audio");

        let no_artist = target("Flowers", None);
        let strategies = build_strategies(Provider::Apple, &no_artist, &cfg);
        assert_eq!(strategies.len(), 2);
        assert_eq!(strategies[0].query, "Flowers");
        assert!(strategies[1].region.is_some());
    }

    #[test]
    fn title_only_rescue_stays_last_for_long_region_lists() {
        let cfg = SearchConfig {
            regions: ["jp", "us", "gb", "de", "fr", "br", "kr"]
                .iter()
                .map(|r| r.to_string())
                .collect(),
            ..search_config()
        };
        let t = target("Flowers", Some("Miley Cyrus"));

        let strategies = build_strategies(Provider::Spotify, &t, &cfg);
        let rescue = strategies.last().unwrap();
        assert_eq!(rescue.query, "Flowers");
        assert_eq!(rescue.region, None);
        for earlier in &strategies[..strategies.len() - 1] {
            assert!(earlier.priority > rescue.priority);
        }
    }

    #[tokio::test]
    async fn first_accepted_strategy_short_circuits() {
        let t = target("Cruel Summer", Some("Taylor Swift"));
        let client = Arc::new(ScriptedClient::new(None, vec![(
            Provider::Apple,
            vec![
                Err(ResolverError::Search("region unavailable".into())),
                Ok(vec![
                    candidate("Cruel Summer", "Taylor Swift", "https://m.example/x"),
                    candidate("Cruel Summer (Live)", "Taylor Swift", "https://m.example/y"),
                ]),
            ],
        )]));
        let resolver = Resolver::new(
            client.clone(),
            MatchPolicy::with_threshold(0.8),
            search_config(),
        );

        let result = resolver.resolve_on(Provider::Apple, &t).await.unwrap();
        let result = result.expect("second strategy should match");
        assert_eq!(result.candidate.url, "https://m.example/x");
        assert!(result.score >= 0.8);
        assert_eq!(client.queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn accepted_match_skips_remaining_strategies() {
        let t = target("Flowers", Some("Miley Cyrus"));
        let client = Arc::new(ScriptedClient::new(None, vec![(
            Provider::Spotify,
            vec![Ok(vec![candidate("Flowers", "Miley Cyrus", "https://m.example/1")])],
        )]));
        let resolver = Resolver::new(client.clone(), MatchPolicy::default(), search_config());

        let result = resolver.resolve_on(Provider::Spotify, &t).await.unwrap();
        assert!(result.is_some());
        assert_eq!(client.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_strategies_return_no_match() {
        let t = target("Flowers", Some("Miley Cyrus"));
        let client = Arc::new(ScriptedClient::new(None, vec![(
            Provider::Spotify,
            vec![
                Err(ResolverError::Search("boom".into())),
                Err(ResolverError::Search("boom".into())),
                Err(ResolverError::Search("boom".into())),
            ],
        )]));
        let resolver = Resolver::new(client.clone(), MatchPolicy::default(), search_config());

        let outcome = resolver.resolve_on(Provider::Spotify, &t).await.unwrap();
        assert!(outcome.is_none());

        let queries = client.queries.lock().unwrap();
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[1].2.as_deref(), Some("jp"));
    }

    #[tokio::test]
    async fn weak_candidates_rejected_by_threshold() {
        let t = target("Blinding Lights", Some("The Weeknd"));
        let client = Arc::new(ScriptedClient::new(None, vec![(
            Provider::Youtube,
            vec![Ok(vec![candidate("Starboy", "The Weeknd", "https://m.example/w")])],
        )]));
        let resolver = Resolver::new(client.clone(), MatchPolicy::default(), search_config());

        let outcome = resolver.resolve_on(Provider::Youtube, &t).await.unwrap();
        assert!(outcome.is_none());
        assert_eq!(client.queries.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let client = Arc::new(ScriptedClient::new(None, vec![]));
        let resolver = Resolver::new(client.clone(), MatchPolicy::default(), search_config());
        resolver.cancellation_token().cancel();

        let t = target("Flowers", None);
        let strategies = vec![SearchStrategy {
            query: "Flowers".to_string(),
            region: None,
            priority: 100,
        }];
        let outcome = resolver
            .resolve_across_strategies(Provider::Spotify, strategies, &t)
            .await;
        assert!(matches!(outcome, Err(ResolverError::Cancelled)));
        assert!(client.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_interrupts_resolution() {
        let client = Arc::new(ScriptedClient::new(None, vec![]));
        let mut search = search_config();
        search.attempt_delay = Duration::from_millis(200);
        let resolver = Arc::new(Resolver::new(client, MatchPolicy::default(), search));

        let cancel = resolver.cancellation_token();
        let task = {
            let resolver = resolver.clone();
            tokio::spawn(async move {
                let t = target("Flowers", Some("Miley Cyrus"));
                resolver.resolve_on(Provider::Spotify, &t).await
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, Err(ResolverError::Cancelled)));
    }

    #[tokio::test]
    async fn convert_resolves_both_platforms_independently() {
        let track = Track {
            title: "Cruel Summer".to_string(),
            artist: Some("Taylor Swift".to_string()),
        };
        let client = Arc::new(ScriptedClient::new(Some(track), vec![
            (Provider::Youtube, vec![
                Err(ResolverError::Search("boom".into())),
                Err(ResolverError::Search("boom".into())),
                Err(ResolverError::Search("boom".into())),
            ]),
            (Provider::Apple, vec![
                Ok(vec![candidate("Cruel Summer", "Taylor Swift", "https://m.apple.example/x")]),
            ]),
        ]));
        let resolver = Resolver::new(
            client.clone(),
            MatchPolicy::with_threshold(0.8),
            search_config(),
        );

        let conversion = resolver.convert(Provider::Spotify, "id123").await.unwrap();
        assert_eq!(conversion.source, Provider::Spotify);
        assert_eq!(conversion.matches.len(), 2);

        let youtube = conversion.matches.iter()
            .find(|m| m.provider == Provider::Youtube)
            .unwrap();
        assert!(youtube.result.is_none());

        let apple = conversion.matches.iter()
            .find(|m| m.provider == Provider::Apple)
            .unwrap();
        let accepted = apple.result.as_ref().unwrap();
        assert_eq!(accepted.candidate.url, "https://m.apple.example/x");
        assert!(accepted.score >= 0.8);

        // youtube queries carry the audio hint
        let queries = client.queries.lock().unwrap();
        assert!(queries.iter()
            .filter(|(p, _, _)| *p == Provider::Youtube)
            .all(|(_, q, _)| q.ends_with("audio")));
    }

    #[tokio::test]
    async fn convert_normalizes_free_text_source_titles() {
        let track = Track {
            title: "Miley Cyrus - Flowers (Official Video)".to_string(),
            artist: None,
        };
        let client = Arc::new(ScriptedClient::new(Some(track), vec![
            (Provider::Spotify, vec![
                Ok(vec![candidate("Flowers", "Miley Cyrus", "https://m.example/s")]),
            ]),
        ]));
        let resolver = Resolver::new(client.clone(), MatchPolicy::default(), search_config());

        let conversion = resolver.convert(Provider::Youtube, "dQw4w9WgXcQ").await.unwrap();

        let spotify_query = client.queries.lock().unwrap().iter()
            .find(|(p, _, _)| *p == Provider::Spotify)
            .map(|(_, q, _)| q.clone())
            .unwrap();
        assert_eq!(spotify_query, "Flowers Miley Cyrus");

        let spotify = conversion.matches.iter()
            .find(|m| m.provider == Provider::Spotify)
            .unwrap();
        assert!(spotify.result.is_some());
    }

    #[tokio::test]
    async fn missing_source_track_escalates() {
        let client = Arc::new(ScriptedClient::new(None, vec![]));
        let resolver = Resolver::new(client, MatchPolicy::default(), search_config());

        let err = resolver.convert(Provider::Spotify, "nope").await.unwrap_err();
        assert!(matches!(err, ResolverError::NotFound(_)));
    }

    #[tokio::test]
    async fn convert_escalates_mid_resolution_cancellation() {
        let track = Track {
            title: "Flowers".to_string(),
            artist: Some("Miley Cyrus".to_string()),
        };
        let client = Arc::new(ScriptedClient::new(Some(track), vec![]));
        let mut search = search_config();
        search.attempt_delay = Duration::from_millis(200);
        let resolver = Arc::new(Resolver::new(client, MatchPolicy::default(), search));

        let cancel = resolver.cancellation_token();
        let task = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.convert(Provider::Spotify, "id123").await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, Err(ResolverError::Cancelled)));
    }
}
