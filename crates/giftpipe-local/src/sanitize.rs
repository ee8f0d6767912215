//! Working-pool construction: dedup, relevance ranking, trim.

use std::collections::BTreeSet;

use giftpipe_core::{is_valid_asin, CandidateProduct};

pub const DEFAULT_POOL_SIZE: usize = 4;

/// Rating assumed for unrated products (midpoint of a 1..5 scale).
const NEUTRAL_RATING: f64 = 3.0;

/// Drop later duplicates by identifier (or detail link when there is none). First wins.
pub fn dedup(candidates: Vec<CandidateProduct>) -> Vec<CandidateProduct> {
    let mut seen = BTreeSet::new();
    candidates
        .into_iter()
        .filter(|c| match c.key() {
            Some(k) => seen.insert(k.to_ascii_lowercase()),
            None => false,
        })
        .collect()
}

/// rating × review count, with neutral defaults so unrated items are not zeroed out.
pub fn relevance(c: &CandidateProduct) -> f64 {
    let rating = c.rating.unwrap_or(NEUTRAL_RATING);
    let reviews = c.review_count.unwrap_or(1).max(1) as f64;
    rating * reviews
}

fn verifiable(c: &CandidateProduct) -> bool {
    c.detail_url.is_some() || c.asin.as_deref().is_some_and(is_valid_asin)
}

/// Build the working pool passed to the language model.
///
/// Deterministic for a given input order: ties keep their input order.
pub fn working_pool(candidates: Vec<CandidateProduct>, size: usize) -> Vec<CandidateProduct> {
    let mut pool: Vec<CandidateProduct> = dedup(candidates)
        .into_iter()
        .filter(verifiable)
        .collect();
    pool.sort_by(|a, b| relevance(b).total_cmp(&relevance(a)));
    pool.truncate(size);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(
        asin: Option<&str>,
        url: Option<&str>,
        rating: Option<f64>,
        reviews: Option<u64>,
    ) -> CandidateProduct {
        CandidateProduct {
            title: format!("item {}", asin.or(url).unwrap_or("?")),
            price: Some(20.0),
            asin: asin.map(str::to_string),
            detail_url: url.map(str::to_string),
            rating,
            review_count: reviews,
            image_url: None,
            snippet: None,
            source: "test".to_string(),
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut a = cand(Some("B000000001"), None, Some(4.0), Some(10));
        a.source = "first".to_string();
        let mut b = cand(Some("b000000001"), None, Some(5.0), Some(999));
        b.source = "second".to_string();
        let out = dedup(vec![a, b, cand(Some("B000000002"), None, None, None)]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].source, "first");
    }

    #[test]
    fn dedup_keys_on_identity_not_title() {
        let mut a = cand(Some("B000000001"), None, None, None);
        let mut b = cand(Some("B000000002"), None, None, None);
        a.title = "Yoga Mat".to_string();
        b.title = "Yoga Mat".to_string();
        let link = "https://www.amazon.com/dp/B000000009";
        let out = dedup(vec![
            a,
            b,
            cand(None, Some(link), None, None),
            cand(None, Some(&link.to_uppercase()), None, None),
        ]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].title, out[1].title);
        assert_eq!(out[2].detail_url.as_deref(), Some(link));
    }

    #[test]
    fn ranks_by_rating_times_reviews_and_trims() {
        let pool = working_pool(
            vec![
                cand(Some("B000000001"), None, Some(4.0), Some(10)),
                cand(Some("B000000002"), None, Some(4.5), Some(1000)),
                cand(Some("B000000003"), None, None, None),
                cand(Some("B000000004"), None, Some(5.0), Some(200)),
                cand(Some("B000000005"), None, Some(3.9), Some(50)),
            ],
            4,
        );
        let ids: Vec<&str> = pool.iter().filter_map(|c| c.asin.as_deref()).collect();
        assert_eq!(ids, vec!["B000000002", "B000000004", "B000000005", "B000000001"]);
    }

    #[test]
    fn unrated_products_are_not_zeroed() {
        let c = cand(Some("B000000003"), None, None, None);
        assert_eq!(relevance(&c), 3.0);
        let c = cand(Some("B000000003"), None, Some(4.0), Some(0));
        assert_eq!(relevance(&c), 4.0);
    }

    #[test]
    fn unverifiable_candidates_never_enter_the_pool() {
        let pool = working_pool(
            vec![
                cand(Some("not-an-id"), None, Some(5.0), Some(10_000)),
                cand(None, Some("https://www.amazon.com/dp/B000000007"), None, None),
            ],
            4,
        );
        assert_eq!(pool.len(), 1);
        assert!(pool[0].detail_url.is_some());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_candidate() -> impl Strategy<Value = CandidateProduct> {
            (
                proptest::option::of("[A-Za-z0-9-]{0,12}"),
                proptest::option::of(Just("https://www.amazon.com/dp/B000000007".to_string())),
                proptest::option::of(0.0f64..5.0),
                proptest::option::of(0u64..10_000),
            )
                .prop_map(|(asin, url, rating, reviews)| CandidateProduct {
                    title: "t".to_string(),
                    price: None,
                    asin,
                    detail_url: url,
                    rating,
                    review_count: reviews,
                    image_url: None,
                    snippet: None,
                    source: "p".to_string(),
                })
        }

        proptest! {
            #[test]
            fn pool_members_are_always_verifiable(
                cs in proptest::collection::vec(arb_candidate(), 0..20),
                size in 0usize..8,
            ) {
                let pool = working_pool(cs, size);
                prop_assert!(pool.len() <= size);
                for c in &pool {
                    prop_assert!(
                        c.detail_url.is_some() || c.asin.as_deref().is_some_and(is_valid_asin)
                    );
                }
            }
        }
    }
}
