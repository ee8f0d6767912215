//! `serve` configuration.
//!
//! Tunables are flags with `GIFTPIPE_*` env fallbacks. Credentials are read from the environment
//! only (with vendor-name fallbacks) by each adapter's `from_env`, so they never show up in a
//! process listing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use giftpipe_core::{LanguageModel, LinkVerifier, ProductSearchProvider};
use giftpipe_local::fanout::FanoutPolicy;
use giftpipe_local::links::{LinkConfig, DEFAULT_MARKETPLACE_DOMAIN};
use giftpipe_local::openai_compat::OpenAiCompatClient;
use giftpipe_local::reconcile::ReconcileConfig;
use giftpipe_local::search::{RainforestProductSearch, SerpApiProductSearch};
use giftpipe_local::supabase::SupabaseBackend;
use giftpipe_local::verify::HttpLinkVerifier;
use giftpipe_local::{GiftPipeline, PipelineConfig, SearchProviders};

const VERIFY_TIMEOUT_MS: u64 = 3_000;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "GIFTPIPE_BIND", default_value = "127.0.0.1:8787")]
    pub bind: SocketAddr,
    /// Log output: compact text or JSON lines (stderr).
    #[arg(long, env = "GIFTPIPE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
    /// Commerce domain for synthesized links and provider requests.
    #[arg(long, env = "GIFTPIPE_MARKETPLACE_DOMAIN", default_value = DEFAULT_MARKETPLACE_DOMAIN)]
    pub marketplace_domain: String,
    #[arg(long, env = "GIFTPIPE_AFFILIATE_TAG")]
    pub affiliate_tag: Option<String>,
    /// Tag links only when this is true and a tag is set.
    #[arg(
        long,
        env = "GIFTPIPE_AFFILIATE_ACTIVE",
        action = clap::ArgAction::Set,
        default_value_t = false
    )]
    pub affiliate_active: bool,
    /// HEAD-check synthesized product links before returning them.
    #[arg(
        long,
        env = "GIFTPIPE_VERIFY_LINKS",
        action = clap::ArgAction::Set,
        default_value_t = false
    )]
    pub verify_links: bool,
    /// Minimum title similarity for a fuzzy match (0..=1).
    #[arg(long, env = "GIFTPIPE_SIMILARITY_THRESHOLD", default_value_t = 0.45)]
    pub similarity_threshold: f64,
    /// Pools smaller than this keep unmatched model picks (without an identifier).
    #[arg(long, env = "GIFTPIPE_SMALL_POOL_THRESHOLD", default_value_t = 6)]
    pub small_pool_threshold: usize,
    /// Candidates shown to the language model.
    #[arg(long, env = "GIFTPIPE_POOL_SIZE", default_value_t = 4)]
    pub pool_size: usize,
    #[arg(long, env = "GIFTPIPE_SEARCH_BUDGET_MS", default_value_t = 15_000)]
    pub search_budget_ms: u64,
    #[arg(long, env = "GIFTPIPE_SEARCH_CALL_TIMEOUT_MS", default_value_t = 8_000)]
    pub search_call_timeout_ms: u64,
    /// Roles that bypass the daily usage limit (comma-separated).
    #[arg(long, env = "GIFTPIPE_UNLIMITED_ROLES", value_delimiter = ',', default_value = "admin")]
    pub unlimited_roles: Vec<String>,
}

impl ServeArgs {
    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.similarity_threshold),
            "similarity threshold must be within 0..=1 (got {})",
            self.similarity_threshold
        );
        anyhow::ensure!(self.pool_size > 0, "pool size must be at least 1");
        anyhow::ensure!(
            self.search_budget_ms > 0 && self.search_call_timeout_ms > 0,
            "search budgets must be positive"
        );

        let base = PipelineConfig::default();
        let affiliate_tag = self
            .affiliate_tag
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Ok(PipelineConfig {
            fanout: FanoutPolicy {
                global_budget: Duration::from_millis(self.search_budget_ms),
                per_call_timeout: Duration::from_millis(self.search_call_timeout_ms),
                marketplace_domain: self.marketplace_domain.clone(),
                ..base.fanout
            },
            pool_size: self.pool_size,
            reconcile: ReconcileConfig {
                similarity_threshold: self.similarity_threshold,
                small_pool_threshold: self.small_pool_threshold,
                ..base.reconcile
            },
            links: LinkConfig {
                domain: self.marketplace_domain.clone(),
                affiliate_tag,
                affiliate_active: self.affiliate_active,
                verify_links: self.verify_links,
            },
            unlimited_roles: self
                .unlimited_roles
                .iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            selector: base.selector,
        })
    }

    /// Wire every collaborator. The backend is required; search, model and link verification
    /// degrade to the fallback path or to unverified links when absent.
    pub fn build_pipeline(&self, client: reqwest::Client) -> anyhow::Result<GiftPipeline> {
        let config = self.pipeline_config()?;
        let backend = SupabaseBackend::from_env(client.clone())?;

        let providers = search_providers_from_env(&client, &self.marketplace_domain);
        if providers.is_empty() {
            tracing::warn!(
                "no product search credentials; every request will use curated fallback ideas"
            );
        }

        let llm: Option<Arc<dyn LanguageModel>> =
            match OpenAiCompatClient::from_env(client.clone(), None) {
                Ok(c) => Some(Arc::new(c)),
                Err(e) => {
                    tracing::warn!(error = %e, "language model not configured");
                    None
                }
            };

        let verifier: Option<Arc<dyn LinkVerifier>> = if self.verify_links {
            Some(Arc::new(HttpLinkVerifier::new(client, VERIFY_TIMEOUT_MS)))
        } else {
            None
        };

        Ok(GiftPipeline::new(
            Arc::new(backend),
            providers,
            llm,
            verifier,
            config,
        ))
    }
}

/// SerpApi is primary when configured; Rainforest is its fallback, or primary on its own.
pub fn search_providers_from_env(
    client: &reqwest::Client,
    marketplace_domain: &str,
) -> SearchProviders {
    let serp = SerpApiProductSearch::from_env(client.clone()).ok().map(|p| {
        Arc::new(p.with_marketplace_domain(marketplace_domain)) as Arc<dyn ProductSearchProvider>
    });
    let rainforest = RainforestProductSearch::from_env(client.clone()).ok().map(|p| {
        Arc::new(p.with_marketplace_domain(marketplace_domain)) as Arc<dyn ProductSearchProvider>
    });
    SearchProviders::from_ordered(serp.into_iter().chain(rainforest))
}
