//! The request pipeline: validate, authenticate, meter, search, select, reconcile, enrich.
//!
//! Stages run strictly in sequence. Only the search stage fans out.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use giftpipe_core::{
    AccountService, Error, GiftRequest, GiftResponse, LanguageModel, LinkVerifier, QuotaStatus,
    Result, SubjectProfile, SuggestionSource,
};

use crate::enrich::enrich;
use crate::fallback::fallback_suggestions;
use crate::fanout::{search_products, FanoutPolicy, SearchProviders};
use crate::links::LinkConfig;
use crate::queries::generate_queries;
use crate::reconcile::{reconcile, ReconcileConfig};
use crate::sanitize::{working_pool, DEFAULT_POOL_SIZE};
use crate::select::{select_products, SelectionContext, SelectorPolicy};

pub const MAX_CONTEXT_CHARS: usize = 500;
pub const MAX_BUDGET: f64 = 100_000.0;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fanout: FanoutPolicy,
    pub pool_size: usize,
    pub selector: SelectorPolicy,
    pub reconcile: ReconcileConfig,
    pub links: LinkConfig,
    /// Roles that skip the usage counter entirely.
    pub unlimited_roles: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fanout: FanoutPolicy::default(),
            pool_size: DEFAULT_POOL_SIZE,
            selector: SelectorPolicy::default(),
            reconcile: ReconcileConfig::default(),
            links: LinkConfig::default(),
            unlimited_roles: vec!["admin".to_string()],
        }
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub subject_id: String,
    pub event_type: String,
    pub budget: f64,
    pub context: Option<String>,
}

fn required(v: &Option<String>, field: &str) -> Result<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInput(format!("{field} is required")))
}

/// Check the request body before any external call is made.
pub fn validate_request(req: &GiftRequest) -> Result<ValidatedRequest> {
    let subject_id = required(&req.person_id, "personId")?;
    let event_type = required(&req.event_type, "eventType")?;
    let budget = req
        .budget
        .ok_or_else(|| Error::InvalidInput("budget is required".to_string()))?;
    if !budget.is_finite() || budget <= 0.0 || budget > MAX_BUDGET {
        return Err(Error::InvalidInput(format!(
            "budget must be greater than 0 and at most {MAX_BUDGET}"
        )));
    }
    let context = req
        .additional_context
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| c.chars().take(MAX_CONTEXT_CHARS).collect());
    Ok(ValidatedRequest {
        subject_id,
        event_type,
        budget,
        context,
    })
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

pub struct GiftPipeline {
    backend: Arc<dyn AccountService>,
    providers: SearchProviders,
    llm: Option<Arc<dyn LanguageModel>>,
    verifier: Option<Arc<dyn LinkVerifier>>,
    config: PipelineConfig,
}

impl GiftPipeline {
    pub fn new(
        backend: Arc<dyn AccountService>,
        providers: SearchProviders,
        llm: Option<Arc<dyn LanguageModel>>,
        verifier: Option<Arc<dyn LinkVerifier>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            backend,
            providers,
            llm,
            verifier,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn is_unlimited(&self, role: &str) -> bool {
        self.config
            .unlimited_roles
            .iter()
            .any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Run one gift-suggestion request end to end.
    pub async fn run(
        &self,
        bearer_token: Option<&str>,
        request: &GiftRequest,
    ) -> Result<GiftResponse> {
        let t0 = Instant::now();
        let token = bearer_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Unauthorized("missing bearer token".to_string()))?;
        let req = validate_request(request)?;

        let account = self.backend.resolve_account(token).await?;
        let usage = if self.is_unlimited(&account.role) {
            tracing::debug!(role = %account.role, "usage limit bypassed");
            None
        } else {
            let decision = self.backend.check_and_increment_usage(&account).await?;
            if !decision.allowed {
                tracing::info!(role = %account.role, "daily usage limit reached");
                return Err(Error::QuotaExceeded(decision.status));
            }
            Some(decision.status)
        };

        let profile = self
            .backend
            .fetch_profile(&account, &req.subject_id)
            .await?;

        let resp = if self.providers.is_empty() {
            tracing::warn!("no product search provider configured");
            self.fallback(&profile, &req, usage)
        } else {
            self.verified(&profile, &req, usage).await?
        };
        tracing::info!(
            source = ?resp.source,
            suggestions = resp.suggestions.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "gift suggestions ready"
        );
        Ok(resp)
    }

    async fn verified(
        &self,
        profile: &SubjectProfile,
        req: &ValidatedRequest,
        usage: Option<QuotaStatus>,
    ) -> Result<GiftResponse> {
        // ThreadRng is not Send; keep it out of the await points below.
        let queries = {
            let mut rng = rand::thread_rng();
            generate_queries(profile, &req.event_type, req.budget, &mut rng, now_ms())
        };
        let report = search_products(&queries, &self.providers, &self.config.fanout).await;
        if !report.failures.is_empty() {
            tracing::warn!(failures = ?report.failures, "absorbed search failures");
        }
        let pool = working_pool(report.products, self.config.pool_size);
        if pool.is_empty() {
            tracing::warn!(
                queries_run = report.queries_run,
                queries_skipped = report.queries_skipped,
                "no usable products found"
            );
            return Ok(self.fallback(profile, req, usage));
        }

        let llm = self.llm.as_ref().ok_or_else(|| {
            Error::NotConfigured("language model credentials are missing".to_string())
        })?;
        let ctx = SelectionContext {
            profile,
            event_type: &req.event_type,
            budget: req.budget,
            extra_context: req.context.as_deref(),
        };
        let selections = select_products(&**llm, &pool, &ctx, &self.config.selector).await?;
        let reconciled = reconcile(&selections, &pool, &self.config.reconcile)?;
        let suggestions = enrich(
            reconciled,
            profile,
            req.budget,
            &self.config.links,
            self.verifier.as_deref(),
        )
        .await?;

        Ok(GiftResponse {
            success: true,
            suggestions,
            person_name: profile.name.clone(),
            event_type: req.event_type.clone(),
            budget: req.budget,
            source: SuggestionSource::Verified,
            usage,
        })
    }

    fn fallback(
        &self,
        profile: &SubjectProfile,
        req: &ValidatedRequest,
        usage: Option<QuotaStatus>,
    ) -> GiftResponse {
        let mut rng = rand::thread_rng();
        let suggestions = fallback_suggestions(profile, req.budget, &self.config.links, &mut rng);
        GiftResponse {
            success: true,
            suggestions,
            person_name: profile.name.clone(),
            event_type: req.event_type.clone(),
            budget: req.budget,
            source: SuggestionSource::Fallback,
            usage,
        }
    }
}
