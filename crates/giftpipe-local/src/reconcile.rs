//! Reconciliation of model selections against the working pool.
//!
//! Every identifier that leaves this module is copied from a pool entry. Selections that
//! cannot be tied to one either lose their identifier (small pools) or are dropped.

use std::collections::BTreeSet;

use giftpipe_core::{
    CandidateProduct, Error, MatchType, ModelSelection, ReconciledSuggestion, Result,
};

use crate::textprep;

pub use crate::compare::title_similarity;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileConfig {
    /// Minimum title similarity for a fuzzy match.
    pub similarity_threshold: f64,
    /// Pools smaller than this keep unmatched selections (without an identifier).
    pub small_pool_threshold: usize,
    pub target: usize,
    pub backfill_confidence: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.45,
            small_pool_threshold: 6,
            target: 3,
            backfill_confidence: 0.6,
        }
    }
}

enum Resolution {
    Pool { index: usize, match_type: MatchType },
    Unverified,
    Discard(&'static str),
}

fn find_exact(sel: &ModelSelection, pool: &[CandidateProduct]) -> Option<usize> {
    let asin = sel.asin.as_deref()?;
    pool.iter().position(|c| {
        c.asin
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(asin))
    })
}

/// Best title match at or above the threshold. Ties go to the earlier pool entry.
fn find_fuzzy(sel: &ModelSelection, pool: &[CandidateProduct], threshold: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, c) in pool.iter().enumerate() {
        let s = title_similarity(&sel.title, &c.title);
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((i, s));
        }
    }
    best.filter(|(_, s)| *s >= threshold).map(|(i, _)| i)
}

fn resolve(sel: &ModelSelection, pool: &[CandidateProduct], cfg: &ReconcileConfig) -> Resolution {
    if let Some(index) = find_exact(sel, pool) {
        return Resolution::Pool {
            index,
            match_type: MatchType::Exact,
        };
    }
    if let Some(index) = find_fuzzy(sel, pool, cfg.similarity_threshold) {
        return Resolution::Pool {
            index,
            match_type: MatchType::Fuzzy,
        };
    }
    if pool.len() < cfg.small_pool_threshold {
        return Resolution::Unverified;
    }
    Resolution::Discard("no identifier or title match in pool")
}

fn from_pool(
    c: &CandidateProduct,
    sel: Option<&ModelSelection>,
    match_type: MatchType,
    backfill_confidence: f64,
) -> ReconciledSuggestion {
    let (title, price) = match (match_type, sel) {
        // An exact identifier match keeps the model's wording.
        (MatchType::Exact, Some(s)) => (s.title.clone(), c.price.or(s.price)),
        (_, s) => (c.title.clone(), c.price.or(s.and_then(|s| s.price))),
    };
    ReconciledSuggestion {
        title,
        price,
        asin: c.asin.clone(),
        detail_url: c.detail_url.clone(),
        image_url: c.image_url.clone(),
        rating: c.rating,
        review_count: c.review_count,
        confidence: sel.map_or(backfill_confidence, |s| s.confidence),
        reasoning: sel.map(|s| s.reasoning.clone()).unwrap_or_default(),
        category: sel.and_then(|s| s.category.clone()),
        alternatives: sel.map(|s| s.alternatives.clone()).unwrap_or_default(),
        match_type,
    }
}

fn unverified(sel: &ModelSelection) -> ReconciledSuggestion {
    ReconciledSuggestion {
        title: sel.title.clone(),
        price: sel.price,
        asin: None,
        detail_url: None,
        image_url: None,
        rating: None,
        review_count: None,
        confidence: sel.confidence,
        reasoning: sel.reasoning.clone(),
        category: sel.category.clone(),
        alternatives: sel.alternatives.clone(),
        match_type: MatchType::Unverified,
    }
}

/// Tie each selection to a pool entry, then backfill from unused pool entries up to
/// `cfg.target`.
///
/// Fails with [`Error::NoValidSuggestions`] when no selection survives; backfill never runs
/// on its own.
pub fn reconcile(
    selections: &[ModelSelection],
    pool: &[CandidateProduct],
    cfg: &ReconcileConfig,
) -> Result<Vec<ReconciledSuggestion>> {
    let mut used: BTreeSet<usize> = BTreeSet::new();
    let mut unverified_titles: BTreeSet<String> = BTreeSet::new();
    let mut out: Vec<ReconciledSuggestion> = Vec::new();

    for sel in selections {
        if out.len() >= cfg.target {
            break;
        }
        match resolve(sel, pool, cfg) {
            Resolution::Pool { index, match_type } => {
                if !used.insert(index) {
                    tracing::debug!(title = %sel.title, "duplicate pick discarded");
                    continue;
                }
                out.push(from_pool(
                    &pool[index],
                    Some(sel),
                    match_type,
                    cfg.backfill_confidence,
                ));
            }
            Resolution::Unverified => {
                if !unverified_titles.insert(textprep::scrub(&sel.title)) {
                    tracing::debug!(title = %sel.title, "duplicate pick discarded");
                    continue;
                }
                out.push(unverified(sel));
            }
            Resolution::Discard(why) => {
                tracing::info!(title = %sel.title, asin = ?sel.asin, why, "selection discarded");
            }
        }
    }

    if out.is_empty() {
        return Err(Error::NoValidSuggestions(format!(
            "none of the {} model selections matched one of the {} searched products",
            selections.len(),
            pool.len()
        )));
    }

    let survivors = out.len();
    for (i, c) in pool.iter().enumerate() {
        if out.len() >= cfg.target {
            break;
        }
        if used.insert(i) {
            out.push(from_pool(c, None, MatchType::Backfill, cfg.backfill_confidence));
        }
    }
    tracing::info!(
        selections = selections.len(),
        survivors,
        backfilled = out.len() - survivors,
        "reconciled model selections"
    );
    Ok(out)
}
