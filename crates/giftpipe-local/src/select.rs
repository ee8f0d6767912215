//! Language-model selection over the working pool.
//!
//! The model only sees titles, prices and identifiers, and is told to pick from that list.
//! Its answer is normalized into [`ModelSelection`]s right after parsing; nothing here trusts
//! the identifiers it returns (that is the reconciler's job).

use giftpipe_core::call::CallMachine;
use giftpipe_core::{
    CandidateProduct, Completion, CompletionRequest, Error, LanguageModel, ModelSelection, Result,
    SubjectProfile,
};
use serde::Deserialize;

use crate::search::parse_price;

#[derive(Debug, Clone)]
pub struct SelectorPolicy {
    pub picks: usize,
    pub max_tokens: u64,
    /// Output allowance for the single retry after a truncated answer.
    pub retry_max_tokens: u64,
    pub temperature: f64,
    pub timeout_ms: u64,
    /// Pool size used when the prompt had to be compressed.
    pub compressed_pool: usize,
}

impl Default for SelectorPolicy {
    fn default() -> Self {
        Self {
            picks: 3,
            max_tokens: 900,
            retry_max_tokens: 1_800,
            temperature: 0.2,
            timeout_ms: 30_000,
            compressed_pool: 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub profile: &'a SubjectProfile,
    pub event_type: &'a str,
    pub budget: f64,
    pub extra_context: Option<&'a str>,
}

const DEFAULT_CONFIDENCE: f64 = 0.7;

fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('…');
    out
}

fn system_prompt(picks: usize) -> String {
    format!(
        "You choose gifts from a fixed product list. Pick exactly {picks} products ONLY from the \
list you are given. Copy each product's ASIN and title verbatim; never invent products, titles \
or identifiers. Respond with a JSON object of the form \
{{\"suggestions\":[{{\"title\":string,\"price\":number,\"asin\":string,\"confidence\":number between 0 and 1,\
\"reasoning\":string,\"category\":string,\"alternatives\":[string]}}]}}."
    )
}

/// Build the user prompt. `compressed` shortens free text to fit small context windows.
pub fn user_prompt(
    pool: &[CandidateProduct],
    ctx: &SelectionContext<'_>,
    compressed: bool,
) -> String {
    let p = ctx.profile;
    let text_cap = if compressed { 120 } else { 600 };
    let title_cap = if compressed { 80 } else { 200 };

    let mut s = String::new();
    s.push_str(&format!("Recipient: {}\n", p.name));
    if let Some(rel) = &p.relationship {
        s.push_str(&format!("Relationship: {rel}\n"));
    }
    if let Some(age) = p.age {
        s.push_str(&format!("Age: {age}\n"));
    }
    if !p.interests.is_empty() {
        s.push_str(&format!("Interests: {}\n", p.interests.join(", ")));
    }
    if let Some(notes) = &p.notes {
        s.push_str(&format!("Notes: {}\n", clip(notes, text_cap)));
    }
    s.push_str(&format!("Occasion: {}\n", ctx.event_type));
    s.push_str(&format!("Budget: {:.2}\n", ctx.budget));
    if !compressed {
        if let Some(extra) = ctx.extra_context.filter(|e| !e.trim().is_empty()) {
            s.push_str(&format!("Additional context: {}\n", clip(extra.trim(), text_cap)));
        }
    }
    s.push_str("\nProducts:\n");
    for (i, c) in pool.iter().enumerate() {
        let price = c
            .price
            .map(|p| format!("{p:.2}"))
            .unwrap_or_else(|| "unknown".to_string());
        s.push_str(&format!(
            "{}. ASIN: {} | {} | price: {}\n",
            i + 1,
            c.asin.as_deref().unwrap_or("none"),
            clip(&c.title, title_cap),
            price
        ));
    }
    s
}

/// Remove a surrounding markdown code fence (```json … ```), if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let t = raw.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // Info string ("json") may be followed by a newline or sit on the same line as the body.
    let info_len = if rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
        rest.find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')))
            .unwrap_or(rest.len())
    } else {
        0
    };
    let body = rest[info_len..].trim();
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SelectionEnvelope {
    Suggestions { suggestions: Vec<RawPick> },
    Gifts { gifts: Vec<RawPick> },
}

#[derive(Debug, Deserialize)]
struct RawPick {
    #[serde(default, alias = "name")]
    title: Option<String>,
    #[serde(default, alias = "estimatedPrice", alias = "estimated_price")]
    price: Option<serde_json::Value>,
    #[serde(default, alias = "productId", alias = "product_id")]
    asin: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, alias = "reason")]
    reasoning: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    alternatives: Vec<String>,
}

fn price_value(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64().filter(|p| p.is_finite() && *p >= 0.0),
        serde_json::Value::String(s) => parse_price(s),
        _ => None,
    }
}

impl RawPick {
    fn normalize(self) -> Option<ModelSelection> {
        let title = self.title?.trim().to_string();
        if title.is_empty() {
            return None;
        }
        let asin = self
            .asin
            .map(|a| a.trim().to_ascii_uppercase())
            .filter(|a| !a.is_empty() && a != "NULL" && a != "NONE");
        Some(ModelSelection {
            title,
            price: self.price.as_ref().and_then(price_value),
            asin,
            confidence: self
                .confidence
                .filter(|c| c.is_finite())
                .unwrap_or(DEFAULT_CONFIDENCE)
                .clamp(0.0, 1.0),
            reasoning: self.reasoning.unwrap_or_default().trim().to_string(),
            category: self.category.filter(|c| !c.trim().is_empty()),
            alternatives: self
                .alternatives
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
        })
    }
}

/// Parse a model answer (optionally fenced) into selections.
///
/// Accepts `{"suggestions": [...]}` and `{"gifts": [...]}`.
pub fn parse_selections(raw: &str) -> Result<Vec<ModelSelection>> {
    let body = strip_code_fences(raw);
    let env: SelectionEnvelope = serde_json::from_str(body)
        .map_err(|e| Error::Llm(format!("could not parse model answer: {e}")))?;
    let picks = match env {
        SelectionEnvelope::Suggestions { suggestions } => suggestions,
        SelectionEnvelope::Gifts { gifts } => gifts,
    };
    Ok(picks.into_iter().filter_map(RawPick::normalize).collect())
}

fn is_truncated(c: &Completion) -> bool {
    c.finish_reason.as_deref() == Some("length")
}

/// Ask the model for `policy.picks` selections from `pool`.
///
/// One bounded retry: a truncated answer retries with a larger output allowance, a context
/// overflow retries with a compressed prompt, a timeout retries as-is. Anything else fails.
pub async fn select_products(
    llm: &dyn LanguageModel,
    pool: &[CandidateProduct],
    ctx: &SelectionContext<'_>,
    policy: &SelectorPolicy,
) -> Result<Vec<ModelSelection>> {
    let mut machine = CallMachine::new(2);
    let mut max_tokens = policy.max_tokens;
    let mut compressed = false;
    let system = system_prompt(policy.picks);

    loop {
        let Some(attempt) = machine.start() else {
            return Err(Error::Llm("no attempts left".to_string()));
        };
        let view = if compressed {
            &pool[..pool.len().min(policy.compressed_pool)]
        } else {
            pool
        };
        let req = CompletionRequest {
            system: system.clone(),
            user: user_prompt(view, ctx, compressed),
            max_tokens,
            temperature: policy.temperature,
            json_mode: true,
            timeout_ms: policy.timeout_ms,
        };
        tracing::debug!(
            attempt,
            model = llm.name(),
            pool = view.len(),
            prompt_chars = req.user.len(),
            max_tokens,
            "requesting selections"
        );

        let err = match llm.complete(&req).await {
            Ok(c) if is_truncated(&c) => Error::LlmTruncated,
            Ok(c) => {
                machine.succeed();
                let mut picks = parse_selections(&c.text)?;
                picks.truncate(policy.picks);
                tracing::info!(picks = picks.len(), attempt, "model selections parsed");
                return Ok(picks);
            }
            Err(e) => e,
        };

        match &err {
            Error::LlmTruncated => {
                machine.fail(true, "truncated");
                max_tokens = policy.retry_max_tokens;
            }
            Error::LlmContextLength => {
                machine.fail(true, "context length exceeded");
                compressed = true;
            }
            Error::Timeout(_) => machine.fail(true, err.to_string()),
            other => machine.fail(false, other.to_string()),
        }
        if !machine.can_retry() {
            tracing::warn!(state = ?machine.state(), "model selection gave up");
            return Err(err);
        }
        tracing::warn!(state = ?machine.state(), "retrying model selection");
    }
}
