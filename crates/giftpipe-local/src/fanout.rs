//! Bounded, time-boxed product search fan-out.
//!
//! - at most `concurrency` queries in flight
//! - a global deadline: queries not started when it passes are skipped, not queued
//! - a per-call timeout on every provider call
//! - per-query fallback to the secondary provider, once
//!
//! Results are merged by query index, so completion order never changes the output.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use giftpipe_core::call::CallMachine;
use giftpipe_core::{
    is_valid_asin, CandidateProduct, PriceBand, ProductSearchProvider, RawProductRow, SearchQuery,
};

use crate::links;
use crate::sanitize;

#[derive(Debug, Clone)]
pub struct FanoutPolicy {
    pub max_queries: usize,
    pub concurrency: usize,
    pub global_budget: Duration,
    pub per_call_timeout: Duration,
    pub marketplace_domain: String,
}

impl Default for FanoutPolicy {
    fn default() -> Self {
        Self {
            max_queries: 4,
            concurrency: 2,
            global_budget: Duration::from_millis(15_000),
            per_call_timeout: Duration::from_millis(8_000),
            marketplace_domain: links::DEFAULT_MARKETPLACE_DOMAIN.to_string(),
        }
    }
}

#[derive(Clone, Default)]
pub struct SearchProviders {
    pub primary: Option<Arc<dyn ProductSearchProvider>>,
    pub secondary: Option<Arc<dyn ProductSearchProvider>>,
}

impl SearchProviders {
    /// First provider becomes primary, second secondary; the rest are ignored.
    pub fn from_ordered(list: impl IntoIterator<Item = Arc<dyn ProductSearchProvider>>) -> Self {
        let mut it = list.into_iter();
        Self {
            primary: it.next(),
            secondary: it.next(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.secondary.is_none()
    }

    fn chain(&self) -> Vec<Arc<dyn ProductSearchProvider>> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FanoutReport {
    pub products: Vec<CandidateProduct>,
    pub queries_run: usize,
    pub queries_skipped: usize,
    pub fallback_calls: usize,
    /// `provider: reason` for every absorbed failure.
    pub failures: Vec<String>,
    pub elapsed_ms: u128,
}

enum QueryOutcome {
    Skipped,
    Ran {
        products: Vec<CandidateProduct>,
        failures: Vec<String>,
        fallback_used: bool,
    },
}

/// Convert one provider row into a candidate, or drop it.
///
/// Drops rows with no title, rows whose parsable price falls outside `band`, and rows that have
/// neither a marketplace detail link nor a valid identifier. Unparsable prices pass through.
pub fn accept_row(
    row: RawProductRow,
    band: &PriceBand,
    domain: &str,
    source: &str,
) -> Option<CandidateProduct> {
    let title = row
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())?
        .to_string();
    if let Some(p) = row.price {
        if !band.contains(p) {
            return None;
        }
    }
    let link = row.link.as_deref().map(str::trim).filter(|l| !l.is_empty());
    let asin = row
        .asin
        .as_deref()
        .map(str::trim)
        .filter(|a| is_valid_asin(a))
        .map(str::to_ascii_uppercase)
        .or_else(|| link.and_then(links::extract_asin_from_url));
    let detail_url = link
        .filter(|l| links::is_detail_page_url(l, domain))
        .map(str::to_string);
    if asin.is_none() && detail_url.is_none() {
        return None;
    }
    Some(CandidateProduct {
        title,
        price: row.price,
        asin,
        detail_url,
        rating: row.rating.filter(|r| r.is_finite() && *r >= 0.0),
        review_count: row.review_count,
        image_url: row.image_url,
        snippet: row.snippet,
        source: source.to_string(),
    })
}

async fn run_query(
    q: SearchQuery,
    providers: SearchProviders,
    policy: FanoutPolicy,
    deadline: Instant,
) -> QueryOutcome {
    if Instant::now() >= deadline {
        return QueryOutcome::Skipped;
    }
    let chain = providers.chain();
    let mut machine = CallMachine::new(chain.len() as u32);
    let mut failures = Vec::new();
    let mut fallback_used = false;

    for (i, provider) in chain.iter().enumerate() {
        if i > 0 {
            if !machine.can_retry() || Instant::now() >= deadline {
                break;
            }
            fallback_used = true;
        }
        if machine.start().is_none() {
            break;
        }
        let q = SearchQuery {
            timeout_ms: Some(policy.per_call_timeout.as_millis() as u64),
            ..q.clone()
        };
        match tokio::time::timeout(policy.per_call_timeout, provider.search(&q)).await {
            Ok(Ok(resp)) => {
                let source = if resp.provider.trim().is_empty() {
                    provider.name()
                } else {
                    resp.provider.as_str()
                };
                tracing::debug!(
                    provider = source,
                    query = %q.text,
                    rows = resp.rows.len(),
                    timings_ms = ?resp.timings_ms,
                    "product search answered"
                );
                let products: Vec<CandidateProduct> = resp
                    .rows
                    .into_iter()
                    .filter_map(|r| accept_row(r, &q.band, &policy.marketplace_domain, source))
                    .collect();
                if products.is_empty() {
                    machine.fail(true, "no usable rows");
                    failures.push(format!("{}: no usable rows", provider.name()));
                } else {
                    machine.succeed();
                    return QueryOutcome::Ran {
                        products,
                        failures,
                        fallback_used,
                    };
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    provider = provider.name(),
                    query = %q.text,
                    error = %e,
                    "product search failed"
                );
                machine.fail(true, e.to_string());
                failures.push(format!("{}: {e}", provider.name()));
            }
            Err(_elapsed) => {
                tracing::warn!(
                    provider = provider.name(),
                    query = %q.text,
                    "product search timed out"
                );
                machine.fail(true, "timeout");
                failures.push(format!(
                    "{}: timed out after {}ms",
                    provider.name(),
                    policy.per_call_timeout.as_millis()
                ));
            }
        }
    }

    QueryOutcome::Ran {
        products: Vec::new(),
        failures,
        fallback_used,
    }
}

/// Run up to `policy.max_queries` queries and merge the accepted candidates.
pub async fn search_products(
    queries: &[SearchQuery],
    providers: &SearchProviders,
    policy: &FanoutPolicy,
) -> FanoutReport {
    let t0 = Instant::now();
    let mut report = FanoutReport::default();
    if providers.is_empty() || queries.is_empty() {
        return report;
    }
    let deadline = t0 + policy.global_budget;
    let concurrency = policy.concurrency.max(1);

    let mut outcomes: Vec<(usize, QueryOutcome)> = stream::iter(
        queries
            .iter()
            .take(policy.max_queries)
            .cloned()
            .enumerate(),
    )
    .map(|(i, q)| {
        let providers = providers.clone();
        let policy = policy.clone();
        async move { (i, run_query(q, providers, policy, deadline).await) }
    })
    .buffer_unordered(concurrency)
    .collect()
    .await;

    outcomes.sort_by_key(|(i, _)| *i);

    let mut merged = Vec::new();
    for (_, outcome) in outcomes {
        match outcome {
            QueryOutcome::Skipped => report.queries_skipped += 1,
            QueryOutcome::Ran {
                products,
                failures,
                fallback_used,
            } => {
                report.queries_run += 1;
                if fallback_used {
                    report.fallback_calls += 1;
                }
                report.failures.extend(failures);
                merged.extend(products);
            }
        }
    }
    report.products = sanitize::dedup(merged);
    report.elapsed_ms = t0.elapsed().as_millis();
    tracing::info!(
        products = report.products.len(),
        queries_run = report.queries_run,
        queries_skipped = report.queries_skipped,
        fallback_calls = report.fallback_calls,
        failures = report.failures.len(),
        elapsed_ms = report.elapsed_ms as u64,
        "product search finished"
    );
    report
}
