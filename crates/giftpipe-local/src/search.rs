use giftpipe_core::{
    Error, ProductSearchProvider, RawProductRow, Result, SearchQuery, SearchResponse,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::links::DEFAULT_MARKETPLACE_DOMAIN;

fn timeout_ms_from_query(q: &SearchQuery) -> u64 {
    // Provider requests can hang indefinitely without an explicit timeout.
    q.timeout_ms.unwrap_or(8_000).clamp(1_000, 60_000)
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn serpapi_api_key_from_env() -> Option<String> {
    env("GIFTPIPE_SERPAPI_API_KEY").or_else(|| env("SERPAPI_API_KEY"))
}

fn rainforest_api_key_from_env() -> Option<String> {
    env("GIFTPIPE_RAINFOREST_API_KEY").or_else(|| env("RAINFOREST_API_KEY"))
}

/// `amazon.com` style domain expected by the search APIs (no `www.`).
fn api_domain(marketplace_domain: &str) -> String {
    marketplace_domain
        .trim()
        .trim_start_matches("www.")
        .to_string()
}

/// Parse a display price ("$1,299.99", "24,99 €", "EUR 12") into a number.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let normalized = match (last_dot, last_comma) {
        // "1,299.99": comma is a thousands separator.
        (Some(d), Some(c)) if d > c => cleaned.replace(',', ""),
        // "1.299,99": dot is a thousands separator.
        (Some(_), Some(_)) => cleaned.replace('.', "").replace(',', "."),
        // "24,99" is a decimal comma; "1,299" is a thousands separator.
        (None, Some(c)) => {
            if cleaned.len() - c - 1 == 3 {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        _ => cleaned,
    };
    let v: f64 = normalized.parse().ok()?;
    (v.is_finite() && v >= 0.0).then_some(v)
}

#[derive(Debug, Clone)]
pub struct SerpApiProductSearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    marketplace_domain: String,
}

#[derive(Debug, Clone)]
pub struct RainforestProductSearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    marketplace_domain: String,
}

impl SerpApiProductSearch {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = serpapi_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing GIFTPIPE_SERPAPI_API_KEY (or SERPAPI_API_KEY)".to_string(),
            )
        })?;
        Ok(Self::new(
            client,
            api_key,
            env("GIFTPIPE_SERPAPI_ENDPOINT"),
            env("GIFTPIPE_MARKETPLACE_DOMAIN"),
        ))
    }

    pub fn new(
        client: reqwest::Client,
        api_key: String,
        endpoint: Option<String>,
        marketplace_domain: Option<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            endpoint: endpoint.unwrap_or_else(|| "https://serpapi.com/search.json".to_string()),
            marketplace_domain: marketplace_domain
                .unwrap_or_else(|| DEFAULT_MARKETPLACE_DOMAIN.to_string()),
        }
    }

    pub fn with_marketplace_domain(mut self, domain: impl Into<String>) -> Self {
        self.marketplace_domain = domain.into();
        self
    }
}

impl RainforestProductSearch {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = rainforest_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing GIFTPIPE_RAINFOREST_API_KEY (or RAINFOREST_API_KEY)".to_string(),
            )
        })?;
        Ok(Self::new(
            client,
            api_key,
            env("GIFTPIPE_RAINFOREST_ENDPOINT"),
            env("GIFTPIPE_MARKETPLACE_DOMAIN"),
        ))
    }

    pub fn new(
        client: reqwest::Client,
        api_key: String,
        endpoint: Option<String>,
        marketplace_domain: Option<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            endpoint: endpoint
                .unwrap_or_else(|| "https://api.rainforestapi.com/request".to_string()),
            marketplace_domain: marketplace_domain
                .unwrap_or_else(|| DEFAULT_MARKETPLACE_DOMAIN.to_string()),
        }
    }

    pub fn with_marketplace_domain(mut self, domain: impl Into<String>) -> Self {
        self.marketplace_domain = domain.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Option<Vec<SerpApiProduct>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpApiProduct {
    title: Option<String>,
    asin: Option<String>,
    link: Option<String>,
    #[serde(default)]
    link_clean: Option<String>,
    thumbnail: Option<String>,
    rating: Option<f64>,
    reviews: Option<u64>,
    #[serde(default)]
    extracted_price: Option<f64>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[async_trait::async_trait]
impl ProductSearchProvider for SerpApiProductSearch {
    fn name(&self) -> &'static str {
        "serpapi"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let timeout_ms = timeout_ms_from_query(q);
        let domain = api_domain(&self.marketplace_domain);

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("engine", "amazon"),
                ("k", q.text.as_str()),
                ("amazon_domain", domain.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("serpapi search HTTP {status}")));
        }

        let parsed: SerpApiResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        if let Some(err) = parsed.error {
            return Err(Error::Search(format!("serpapi: {err}")));
        }

        let mut rows = Vec::new();
        for p in parsed.organic_results.unwrap_or_default() {
            let price = p
                .extracted_price
                .or_else(|| p.price.as_deref().and_then(parse_price));
            rows.push(RawProductRow {
                title: p.title,
                price,
                asin: p.asin,
                rating: p.rating,
                review_count: p.reviews,
                image_url: p.thumbnail,
                link: p.link_clean.or(p.link),
                snippet: p.snippet,
            });
        }

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());

        Ok(SearchResponse {
            rows,
            provider: "serpapi".to_string(),
            timings_ms,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RainforestResponse {
    #[serde(default)]
    search_results: Option<Vec<RainforestProduct>>,
    #[serde(default)]
    request_info: Option<RainforestRequestInfo>,
}

#[derive(Debug, Deserialize)]
struct RainforestRequestInfo {
    success: Option<bool>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RainforestProduct {
    title: Option<String>,
    asin: Option<String>,
    link: Option<String>,
    image: Option<String>,
    rating: Option<f64>,
    ratings_total: Option<u64>,
    price: Option<RainforestPrice>,
}

#[derive(Debug, Deserialize)]
struct RainforestPrice {
    value: Option<f64>,
    raw: Option<String>,
}

#[async_trait::async_trait]
impl ProductSearchProvider for RainforestProductSearch {
    fn name(&self) -> &'static str {
        "rainforest"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let timeout_ms = timeout_ms_from_query(q);
        let domain = api_domain(&self.marketplace_domain);
        let min = format!("{:.0}", q.band.min.floor());
        let max = format!("{:.0}", q.band.max.ceil());

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("type", "search"),
                ("amazon_domain", domain.as_str()),
                ("search_term", q.text.as_str()),
                ("min_price", min.as_str()),
                ("max_price", max.as_str()),
            ])
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("rainforest search HTTP {status}")));
        }

        let parsed: RainforestResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        if let Some(info) = &parsed.request_info {
            if info.success == Some(false) {
                return Err(Error::Search(format!(
                    "rainforest: {}",
                    info.message.as_deref().unwrap_or("request failed")
                )));
            }
        }

        let mut rows = Vec::new();
        for p in parsed.search_results.unwrap_or_default() {
            let price = p.price.and_then(|pr| {
                pr.value
                    .or_else(|| pr.raw.as_deref().and_then(parse_price))
            });
            rows.push(RawProductRow {
                title: p.title,
                price,
                asin: p.asin,
                rating: p.rating,
                review_count: p.ratings_total,
                image_url: p.image,
                link: p.link,
                snippet: None,
            });
        }

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());

        Ok(SearchResponse {
            rows,
            provider: "rainforest".to_string(),
            timings_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvGuard {
        k: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(k: &'static str, v: &str) -> Self {
            let prev = std::env::var(k).ok();
            std::env::set_var(k, v);
            Self { k, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(v) = self.prev.take() {
                std::env::set_var(self.k, v);
            } else {
                std::env::remove_var(self.k);
            }
        }
    }

    #[test]
    fn empty_api_keys_are_treated_as_missing() {
        let _g1 = EnvGuard::set("GIFTPIPE_SERPAPI_API_KEY", "");
        let _g2 = EnvGuard::set("SERPAPI_API_KEY", "  ");
        let _g3 = EnvGuard::set("GIFTPIPE_RAINFOREST_API_KEY", "   ");
        let _g4 = EnvGuard::set("RAINFOREST_API_KEY", "");
        assert!(serpapi_api_key_from_env().is_none());
        assert!(rainforest_api_key_from_env().is_none());
    }

    #[test]
    fn parses_prices_in_common_formats() {
        assert_eq!(parse_price("$24.99"), Some(24.99));
        assert_eq!(parse_price("24,99 €"), Some(24.99));
        assert_eq!(parse_price("$1,299.99"), Some(1299.99));
        assert_eq!(parse_price("1.299,99 €"), Some(1299.99));
        assert_eq!(parse_price("1,299"), Some(1299.0));
        assert_eq!(parse_price("EUR 12"), Some(12.0));
        assert_eq!(parse_price("Currently unavailable"), None);
    }

    #[test]
    fn parses_minimal_serpapi_shape() {
        let js = r#"
        {
          "organic_results": [
            {"asin":"B08N5WRWNW","title":"Yoga Mat","link":"https://www.amazon.com/dp/B08N5WRWNW",
             "rating":4.6,"reviews":1200,"price":"$24.99","extracted_price":24.99,
             "thumbnail":"https://m.media-amazon.com/x.jpg"}
          ]
        }
        "#;
        let parsed: SerpApiResponse = serde_json::from_str(js).unwrap();
        let rs = parsed.organic_results.unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].asin.as_deref(), Some("B08N5WRWNW"));
        assert_eq!(rs[0].extracted_price, Some(24.99));
        assert_eq!(rs[0].reviews, Some(1200));
    }

    #[test]
    fn parses_minimal_rainforest_shape() {
        let js = r#"
        {
          "request_info": {"success": true},
          "search_results": [
            {"asin":"B000000001","title":"Tea Set","link":"https://www.amazon.com/dp/B000000001",
             "rating":4.2,"ratings_total":88,"price":{"value":31.5,"raw":"$31.50"}}
          ]
        }
        "#;
        let parsed: RainforestResponse = serde_json::from_str(js).unwrap();
        let rs = parsed.search_results.unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].ratings_total, Some(88));
        assert_eq!(rs[0].price.as_ref().and_then(|p| p.value), Some(31.5));
    }

    #[test]
    fn api_domain_drops_www_prefix() {
        assert_eq!(api_domain("www.amazon.fr"), "amazon.fr");
        assert_eq!(api_domain("amazon.de"), "amazon.de");
    }
}
