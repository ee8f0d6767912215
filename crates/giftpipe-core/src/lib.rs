use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod call;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("daily suggestion limit reached")]
    QuotaExceeded(QuotaStatus),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("backend failed: {0}")]
    Backend(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("llm response truncated")]
    LlmTruncated,
    #[error("llm context length exceeded")]
    LlmContextLength,
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("no valid suggestions: {0}")]
    NoValidSuggestions(String),
    #[error("over budget: {0}")]
    OverBudget(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// True when `s` looks like a marketplace product identifier (exactly 10 ASCII alphanumerics).
pub fn is_valid_asin(s: &str) -> bool {
    s.len() == 10 && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Caller identity resolved from a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub role: String,
}

/// Outcome of the remote check-and-increment usage call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub role: String,
    pub reset_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub status: QuotaStatus,
}

/// The person a gift is being chosen for. Read-only input owned by the persistence layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubjectProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub relationship: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceBand {
    pub min: f64,
    pub max: f64,
}

impl PriceBand {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub band: PriceBand,
    /// Per-call timeout hint for the provider adapter.
    pub timeout_ms: Option<u64>,
}

/// One product row as returned by a search provider, before any validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawProductRow {
    pub title: Option<String>,
    pub price: Option<f64>,
    pub asin: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub rows: Vec<RawProductRow>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait ProductSearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

/// A product that passed the adapter boundary: it carries a detail link or a valid identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateProduct {
    pub title: String,
    pub price: Option<f64>,
    pub asin: Option<String>,
    pub detail_url: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub image_url: Option<String>,
    pub snippet: Option<String>,
    pub source: String,
}

impl CandidateProduct {
    /// Stable identity used for dedup: the identifier when present, else the detail link.
    pub fn key(&self) -> Option<&str> {
        self.asin.as_deref().or(self.detail_url.as_deref())
    }
}

/// A pick returned by the language model. Untrusted until reconciled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSelection {
    pub title: String,
    pub price: Option<f64>,
    pub asin: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub category: Option<String>,
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Unverified,
    Backfill,
    Search,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciledSuggestion {
    pub title: String,
    pub price: Option<f64>,
    /// Always the identifier of a pool entry when set.
    pub asin: Option<String>,
    pub detail_url: Option<String>,
    pub image_url: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub confidence: f64,
    pub reasoning: String,
    pub category: Option<String>,
    pub alternatives: Vec<String>,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductData {
    pub asin: Option<String>,
    pub product_url: Option<String>,
    pub add_to_cart_url: Option<String>,
    pub search_url: String,
    pub match_type: MatchType,
    pub image_url: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinalGiftSuggestion {
    pub title: String,
    pub description: String,
    pub estimated_price: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub category: String,
    pub alternatives: Vec<String>,
    pub purchase_links: Vec<String>,
    pub amazon_data: ProductData,
    pub within_budget: bool,
}

/// Request body accepted by the handler. Fields are optional so the validator, not the
/// deserializer, owns the error messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftRequest {
    #[serde(default, alias = "subjectId")]
    pub person_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default, alias = "context")]
    pub additional_context: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    Verified,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftResponse {
    pub success: bool,
    pub suggestions: Vec<FinalGiftSuggestion>,
    pub person_name: String,
    pub event_type: String,
    pub budget: f64,
    pub source: SuggestionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<QuotaStatus>,
}

/// Persistence/auth collaborator: token resolution, profile reads, atomic usage counting.
#[async_trait::async_trait]
pub trait AccountService: Send + Sync {
    async fn resolve_account(&self, bearer_token: &str) -> Result<Account>;
    async fn fetch_profile(&self, account: &Account, subject_id: &str) -> Result<SubjectProfile>;
    /// Check the daily limit and count this request in one remote operation.
    async fn check_and_increment_usage(&self, account: &Account) -> Result<QuotaDecision>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u64,
    pub temperature: f64,
    pub json_mode: bool,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Completion {
    pub text: String,
    pub finish_reason: Option<String>,
}

#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion>;
}

#[async_trait::async_trait]
pub trait LinkVerifier: Send + Sync {
    async fn verify(&self, url: &str) -> bool;
}
