use std::collections::HashSet;

use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::Config,
    error::Result,
    types::{EvidenceBundle, VideoRef},
    validate::normalize_loose,
};

/// Trade press the search results are restricted to
pub const TRADE_DOMAINS: &[&str] = &[
    "adage.com",
    "adweek.com",
    "adsoftheworld.com",
    "campaignlive.co.uk",
    "campaignlive.com",
    "creativereview.co.uk",
    "lbbonline.com",
    "musebycl.io",
    "shots.net",
    "thedrum.com",
];

const THUMBNAIL_STILLS: &[&str] = &["maxresdefault", "hqdefault", "1", "2", "3"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchProvider {
    Tavily { api_key: String },
    SerpApi { api_key: String },
}

impl SearchProvider {
    /// Tavily when its key is set, SerpApi otherwise, nothing without keys
    pub fn from_config(config: &Config) -> Option<Self> {
        if let Some(api_key) = &config.tavily_api_key {
            return Some(SearchProvider::Tavily {
                api_key: api_key.clone(),
            });
        }
        config
            .serpapi_api_key
            .as_ref()
            .map(|api_key| SearchProvider::SerpApi {
                api_key: api_key.clone(),
            })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SearchProvider::Tavily { .. } => "tavily",
            SearchProvider::SerpApi { .. } => "serpapi",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    pub snippet: String,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<SerpApiResult>,
}

#[derive(Deserialize)]
struct SerpApiResult {
    link: String,
    #[serde(default)]
    snippet: String,
}

pub struct EvidenceGatherer {
    client: reqwest::Client,
    search: Option<SearchProvider>,
    tavily_url: String,
    serpapi_url: String,
    reader_proxy_url: Option<String>,
    max_thumbnails: usize,
    max_snippets: usize,
    snippet_chars: usize,
}

impl EvidenceGatherer {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        Self {
            client,
            search: SearchProvider::from_config(config),
            tavily_url: config.tavily_url.clone(),
            serpapi_url: config.serpapi_url.clone(),
            reader_proxy_url: config.reader_proxy_url.clone(),
            max_thumbnails: config.max_thumbnails,
            max_snippets: config.max_snippets,
            snippet_chars: config.snippet_chars,
        }
    }

    /// Best effort; every upstream failure shrinks the bundle instead of failing
    pub async fn gather(&self, video: &VideoRef) -> EvidenceBundle {
        let thumbnail_urls = if video.has_known_id() {
            self.thumbnails(&video.id).await
        } else {
            Vec::new()
        };

        let (trade_snippets, trade_citations) = match &self.search {
            Some(provider) => self.trade_press(provider, video).await,
            None => {
                debug!("No search API key configured; skipping trade press");
                (Vec::new(), Vec::new())
            }
        };

        info!(
            thumbnails = thumbnail_urls.len(),
            snippets = trade_snippets.len(),
            "Gathered evidence"
        );
        EvidenceBundle {
            thumbnail_urls,
            frames: Vec::new(),
            trade_snippets,
            trade_citations,
        }
    }

    async fn thumbnails(&self, video_id: &str) -> Vec<String> {
        let mut found = Vec::new();
        for url in candidate_thumbnails(video_id) {
            if found.len() >= self.max_thumbnails {
                break;
            }
            match self.client.head(&url).send().await {
                Ok(resp) if resp.status().is_success() => found.push(url),
                Ok(resp) => debug!(%url, status = %resp.status(), "Thumbnail not available"),
                Err(e) => debug!(%url, error = %e, "Thumbnail check failed"),
            }
        }
        found
    }

    async fn trade_press(
        &self,
        provider: &SearchProvider,
        video: &VideoRef,
    ) -> (Vec<String>, Vec<String>) {
        let query = search_query(video);
        let hits = match self.search_hits(provider, &query).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "Trade press search failed");
                return (Vec::new(), Vec::new());
            }
        };

        // Read a few spare hits so duplicates can be dropped without coming up short
        let mut found = Vec::new();
        for hit in hits.into_iter().filter(|h| is_trade_domain(&h.url)) {
            if found.len() >= self.max_snippets * 2 {
                break;
            }
            let text = match self.read(&hit.url).await {
                Some(readable) if !readable.trim().is_empty() => readable,
                _ => hit.snippet,
            };
            if text.trim().is_empty() {
                continue;
            }
            found.push((text, hit.url));
        }

        dedupe_snippets(found, self.snippet_chars, self.max_snippets)
            .into_iter()
            .unzip()
    }

    async fn search_hits(&self, provider: &SearchProvider, query: &str) -> Result<Vec<SearchHit>> {
        match provider {
            SearchProvider::Tavily { api_key } => {
                let response = self
                    .client
                    .post(&self.tavily_url)
                    .json(&serde_json::json!({
                        "api_key": api_key,
                        "query": query,
                        "search_depth": "basic",
                        "include_domains": TRADE_DOMAINS,
                        "max_results": 8,
                    }))
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<TavilyResponse>()
                    .await?;
                Ok(response
                    .results
                    .into_iter()
                    .map(|r| SearchHit {
                        url: r.url,
                        snippet: r.content,
                    })
                    .collect())
            }
            SearchProvider::SerpApi { api_key } => {
                let sites = TRADE_DOMAINS
                    .iter()
                    .map(|d| format!("site:{d}"))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                let q = format!("{query} ({sites})");
                let response = self
                    .client
                    .get(&self.serpapi_url)
                    .query(&[
                        ("engine", "google"),
                        ("q", q.as_str()),
                        ("num", "8"),
                        ("api_key", api_key.as_str()),
                    ])
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<SerpApiResponse>()
                    .await?;
                Ok(response
                    .organic_results
                    .into_iter()
                    .map(|r| SearchHit {
                        url: r.link,
                        snippet: r.snippet,
                    })
                    .collect())
            }
        }
    }

    /// Readable article text through the proxy, if one is configured
    async fn read(&self, url: &str) -> Option<String> {
        let proxy = self.reader_proxy_url.as_ref()?;
        let target = format!("{proxy}{url}");
        let response = match self.client.get(&target).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!(%url, status = %resp.status(), "Reader proxy refused page");
                return None;
            }
            Err(e) => {
                debug!(%url, error = %e, "Reader proxy failed");
                return None;
            }
        };
        response.text().await.ok()
    }
}

pub fn candidate_thumbnails(video_id: &str) -> Vec<String> {
    THUMBNAIL_STILLS
        .iter()
        .map(|still| format!("https://i.ytimg.com/vi/{video_id}/{still}.jpg"))
        .collect()
}

fn search_query(video: &VideoRef) -> String {
    format!("\"{}\" {} commercial", video.title, video.channel)
}

/// True when the URL's host is one of the trade domains or a subdomain of one
pub fn is_trade_domain(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    TRADE_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

/// Collapse whitespace, truncate, and drop snippets whose normalized text
/// repeats. Takes `(text, source url)` pairs; each kept snippet keeps its url.
pub fn dedupe_snippets(
    found: Vec<(String, String)>,
    max_chars: usize,
    max_count: usize,
) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (text, url) in found {
        if out.len() >= max_count {
            break;
        }
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let snippet: String = collapsed.chars().take(max_chars).collect();
        let key = normalize_loose(&snippet);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        out.push((snippet, url));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{
        Json, Router,
        extract::{Query, State},
        http::{StatusCode, Uri},
        routing::{get, post},
    };
    use serde_json::{Value, json};

    use super::*;
    use crate::{provider::Provider, testing};

    #[test]
    fn prefers_tavily_when_both_keys_exist() {
        let mut config = Config::new(Provider::Openai, "k");
        assert_eq!(SearchProvider::from_config(&config), None);

        config.serpapi_api_key = Some("serp".into());
        assert_eq!(SearchProvider::from_config(&config).unwrap().name(), "serpapi");

        config.tavily_api_key = Some("tv".into());
        assert_eq!(SearchProvider::from_config(&config).unwrap().name(), "tavily");
    }

    #[test]
    fn allow_list_accepts_subdomains_only_of_trade_sites() {
        assert!(is_trade_domain("https://www.adweek.com/creativity/spot/"));
        assert!(is_trade_domain("https://adage.com/article/x"));
        assert!(!is_trade_domain("https://notadage.com/x"));
        assert!(!is_trade_domain("https://adage.com.evil.net/x"));
        assert!(!is_trade_domain("not a url"));
    }

    fn pair(text: &str, url: &str) -> (String, String) {
        (text.to_string(), url.to_string())
    }

    #[test]
    fn snippets_are_deduplicated_loosely() {
        let found = vec![
            pair("The  spot was shot\nin Lisbon.", "https://adage.com/a"),
            pair("the spot was shot in lisbon", "https://adweek.com/b"),
            pair("   ", "https://thedrum.com/c"),
            pair("Directed by a music-video veteran.", "https://shots.net/d"),
        ];
        let out = dedupe_snippets(found, 600, 5);
        assert_eq!(
            out,
            vec![
                pair("The spot was shot in Lisbon.", "https://adage.com/a"),
                pair("Directed by a music-video veteran.", "https://shots.net/d"),
            ]
        );
    }

    #[test]
    fn snippets_are_truncated_and_capped() {
        let found = (0..10)
            .map(|i| {
                let text = format!("snippet number {i} {}", "x".repeat(50));
                (text, format!("https://adage.com/{i}"))
            })
            .collect();
        let out = dedupe_snippets(found, 20, 3);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|(s, _)| s.chars().count() <= 20));
        assert_eq!(out[2].1, "https://adage.com/2");
    }

    #[test]
    fn thumbnail_candidates_start_with_the_largest_still() {
        let urls = candidate_thumbnails("abc123");
        assert_eq!(urls[0], "https://i.ytimg.com/vi/abc123/maxresdefault.jpg");
        assert_eq!(urls.len(), 5);
    }

    #[tokio::test]
    async fn no_keys_and_unknown_id_gathers_nothing() {
        let config = Config::new(Provider::Openai, "k");
        let gatherer = EvidenceGatherer::new(&config, reqwest::Client::new());
        let video = VideoRef::parse("https://vimeo.com/1").unwrap();
        let bundle = gatherer.gather(&video).await;
        assert!(bundle.is_empty());
        assert!(bundle.trade_citations.is_empty());
    }

    fn titled_video() -> VideoRef {
        // Unknown id keeps the thumbnail lookups off the network
        let mut video = VideoRef::parse("not a video").unwrap();
        video.title = "Fearless".into();
        video.channel = "Nike".into();
        video
    }

    fn tavily_results() -> Value {
        json!({
            "results": [
                {"url": "https://www.adweek.com/a", "content": "Shot in Lisbon."},
                {"url": "https://spam.example.com/x", "content": "Buy followers"},
                {"url": "https://adage.com/b", "content": "shot in  lisbon"},
                {"url": "https://www.thedrum.com/c", "content": "Directed by Jane Roe."},
            ]
        })
    }

    type Seen<T> = Arc<Mutex<T>>;

    async fn record_tavily(
        State(seen): State<Seen<Option<Value>>>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        *seen.lock().unwrap() = Some(body);
        Json(tavily_results())
    }

    async fn record_serpapi(
        State(seen): State<Seen<HashMap<String, String>>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        *seen.lock().unwrap() = params;
        Json(json!({
            "organic_results": [
                {"link": "https://lbbonline.com/news/x", "snippet": "A quiet film."}
            ]
        }))
    }

    #[tokio::test]
    async fn tavily_citations_stay_aligned_with_snippets() {
        let seen: Seen<Option<Value>> = Arc::new(Mutex::new(None));
        let app = Router::new()
            .route("/search", post(record_tavily))
            .with_state(seen.clone());
        let addr = testing::serve(app).await;

        let mut config = Config::new(Provider::Openai, "k");
        config.tavily_api_key = Some("tv-key".into());
        config.tavily_url = format!("http://{addr}/search");
        let gatherer = EvidenceGatherer::new(&config, reqwest::Client::new());

        let bundle = gatherer.gather(&titled_video()).await;
        assert_eq!(
            bundle.trade_snippets,
            vec!["Shot in Lisbon.".to_string(), "Directed by Jane Roe.".to_string()]
        );
        assert_eq!(
            bundle.trade_citations,
            vec![
                "https://www.adweek.com/a".to_string(),
                "https://www.thedrum.com/c".to_string(),
            ]
        );

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["api_key"], "tv-key");
        assert_eq!(body["query"], "\"Fearless\" Nike commercial");
        assert!(body["include_domains"].as_array().unwrap().contains(&json!("adage.com")));
    }

    #[tokio::test]
    async fn serpapi_query_is_restricted_to_trade_sites() {
        let seen: Seen<HashMap<String, String>> = Arc::new(Mutex::new(HashMap::new()));
        let app = Router::new()
            .route("/search.json", get(record_serpapi))
            .with_state(seen.clone());
        let addr = testing::serve(app).await;

        let mut config = Config::new(Provider::Openai, "k");
        config.serpapi_api_key = Some("serp-key".into());
        config.serpapi_url = format!("http://{addr}/search.json");
        let gatherer = EvidenceGatherer::new(&config, reqwest::Client::new());

        let bundle = gatherer.gather(&titled_video()).await;
        assert_eq!(bundle.trade_snippets, vec!["A quiet film.".to_string()]);
        assert_eq!(bundle.trade_citations, vec!["https://lbbonline.com/news/x".to_string()]);

        let params = seen.lock().unwrap().clone();
        assert_eq!(params["engine"], "google");
        assert_eq!(params["api_key"], "serp-key");
        assert!(params["q"].starts_with("\"Fearless\" Nike commercial ("));
        assert!(params["q"].contains("site:adage.com OR site:adweek.com"));
    }

    #[tokio::test]
    async fn reader_proxy_text_wins_over_search_snippet() {
        let app = Router::new()
            .route("/search", post(|| async { Json(tavily_results()) }))
            .fallback(|uri: Uri| async move {
                if uri.path().ends_with("adweek.com/a") {
                    (StatusCode::OK, "Full article: the spot was shot in Lisbon by night.")
                } else {
                    (StatusCode::NOT_FOUND, "")
                }
            });
        let addr = testing::serve(app).await;

        let mut config = Config::new(Provider::Openai, "k");
        config.tavily_api_key = Some("tv-key".into());
        config.tavily_url = format!("http://{addr}/search");
        config.reader_proxy_url = Some(format!("http://{addr}/read/"));
        let gatherer = EvidenceGatherer::new(&config, reqwest::Client::new());

        let bundle = gatherer.gather(&titled_video()).await;
        assert_eq!(
            bundle.trade_snippets,
            vec![
                "Full article: the spot was shot in Lisbon by night.".to_string(),
                "shot in lisbon".to_string(),
                "Directed by Jane Roe.".to_string(),
            ]
        );
        assert_eq!(bundle.trade_citations[1], "https://adage.com/b");
    }

    #[tokio::test]
    async fn failed_search_leaves_no_trade_press() {
        let app = Router::new().route("/search", post(|| async { StatusCode::UNAUTHORIZED }));
        let addr = testing::serve(app).await;

        let mut config = Config::new(Provider::Openai, "k");
        config.tavily_api_key = Some("bad".into());
        config.tavily_url = format!("http://{addr}/search");
        let gatherer = EvidenceGatherer::new(&config, reqwest::Client::new());

        let bundle = gatherer.gather(&titled_video()).await;
        assert!(bundle.trade_snippets.is_empty());
        assert!(bundle.trade_citations.is_empty());
    }
}
