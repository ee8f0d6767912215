//! Search-query generation from a subject profile.
//!
//! Phrasing is randomized (adjective suffixes, final shuffle) so repeated calls for the same
//! person do not keep hitting the same result pages.

use std::collections::BTreeSet;

use giftpipe_core::{PriceBand, SearchQuery, SubjectProfile};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::textprep;

pub const MIN_QUERIES: usize = 3;
pub const MAX_QUERIES: usize = 8;

struct InterestTemplates {
    /// Scrubbed keys, matched with [`textprep::matches_any`].
    keys: &'static [&'static str],
    phrases: &'static [&'static str],
}

const INTEREST_TEMPLATES: &[InterestTemplates] = &[
    InterestTemplates {
        keys: &["sport", "sports", "fitness", "gym", "running", "course"],
        phrases: &["fitness accessories", "sports gear gift", "running equipment"],
    },
    InterestTemplates {
        keys: &["cuisine", "cooking", "kitchen", "baking", "patisserie", "food"],
        phrases: &["cooking gadgets", "kitchen gift set", "baking tools"],
    },
    InterestTemplates {
        keys: &["lecture", "reading", "books", "book", "livres", "litterature"],
        phrases: &["book lover gift", "reading accessories", "bestselling novel"],
    },
    InterestTemplates {
        keys: &["musique", "music", "guitar", "guitare", "piano"],
        phrases: &["music lover gift", "portable speaker", "music accessories"],
    },
    InterestTemplates {
        keys: &["voyage", "travel", "voyages", "traveling"],
        phrases: &["travel accessories", "travel organizer", "carry on essentials"],
    },
    InterestTemplates {
        keys: &["tech", "technologie", "technology", "gadgets", "informatique", "computers"],
        phrases: &["tech gadgets", "smart home device", "desk accessories"],
    },
    InterestTemplates {
        keys: &["jardinage", "gardening", "garden", "plantes", "plants"],
        phrases: &["gardening tools gift", "indoor plant kit"],
    },
    InterestTemplates {
        keys: &["jeux", "gaming", "games", "video", "jeux video", "boardgames"],
        phrases: &["gaming accessories", "board game"],
    },
    InterestTemplates {
        keys: &["art", "dessin", "drawing", "painting", "peinture"],
        phrases: &["art supplies set", "drawing kit"],
    },
    InterestTemplates {
        keys: &["randonnee", "hiking", "outdoor", "camping", "nature"],
        phrases: &["hiking gear", "camping accessories", "outdoor adventure gift"],
    },
    InterestTemplates {
        keys: &["photo", "photography", "photographie"],
        phrases: &["photography accessories", "camera gear"],
    },
    InterestTemplates {
        keys: &["mode", "fashion", "style", "vetements", "clothing"],
        phrases: &["fashion accessories", "stylish wallet"],
    },
    InterestTemplates {
        keys: &["beaute", "beauty", "skincare", "maquillage", "makeup"],
        phrases: &["skincare gift set", "beauty essentials"],
    },
    InterestTemplates {
        keys: &["cafe", "coffee", "the", "tea"],
        phrases: &["coffee lover gift", "tea gift set"],
    },
    InterestTemplates {
        keys: &["yoga", "meditation", "bien etre", "wellness"],
        phrases: &["yoga accessories", "wellness gift box"],
    },
];

const ADJECTIVES: &[&str] = &[
    "unique",
    "premium",
    "original",
    "popular",
    "personalized",
    "top rated",
    "creative",
    "practical",
];

const GENERIC_TEMPLATES: &[&str] = &[
    "gift idea",
    "best gifts",
    "trending gifts",
    "thoughtful present",
    "gift box",
    "useful gadgets gift",
    "home decor gift",
];

/// Price band the queries target. Very cheap items are excluded so results stay gift-like.
pub fn price_band(budget: f64) -> PriceBand {
    let max = budget.max(0.0);
    PriceBand {
        min: (max * 0.2).floor(),
        max,
    }
}

fn interest_phrases(interest: &str) -> Option<&'static [&'static str]> {
    INTEREST_TEMPLATES
        .iter()
        .find(|t| textprep::matches_any(interest, t.keys))
        .map(|t| t.phrases)
}

fn age_phrase(age: u32) -> &'static str {
    match age {
        0..=3 => "baby toddler gift",
        4..=12 => "gift for kids",
        13..=19 => "gift for teenager",
        20..=29 => "gift for young adult",
        30..=59 => "gift for adult",
        _ => "gift for senior",
    }
}

fn event_phrase(event_type: &str) -> String {
    let e = textprep::scrub(event_type);
    let has = |k: &str| e.contains(k);
    if has("birthday") || has("anniversaire") {
        "birthday gift".to_string()
    } else if has("christmas") || has("noel") {
        "christmas gift".to_string()
    } else if has("wedding") || has("mariage") {
        "wedding gift".to_string()
    } else if has("anniversary") {
        "anniversary gift".to_string()
    } else if has("valentine") || has("valentin") {
        "valentine gift".to_string()
    } else if has("graduation") || has("diplome") {
        "graduation gift".to_string()
    } else if e.is_empty() {
        "gift".to_string()
    } else {
        format!("{e} gift")
    }
}

/// Produce 3..=8 distinct, non-empty queries for the profile.
///
/// `now_ms` seeds the rotation of generic templates used when the profile is too sparse.
pub fn generate_queries<R: Rng + ?Sized>(
    profile: &SubjectProfile,
    event_type: &str,
    budget: f64,
    rng: &mut R,
    now_ms: u128,
) -> Vec<SearchQuery> {
    let band = price_band(budget);
    let mut texts: Vec<String> = Vec::new();

    for interest in &profile.interests {
        let interest = interest.trim();
        if interest.is_empty() {
            continue;
        }
        match interest_phrases(interest) {
            Some(phrases) => {
                let take = rng.gen_range(1..=phrases.len().min(2));
                let picks: Vec<&&str> = phrases.choose_multiple(rng, take).collect();
                for p in picks {
                    let adj = ADJECTIVES.choose(rng).copied().unwrap_or("unique");
                    texts.push(format!("{p} {adj}"));
                }
            }
            None => {
                let adj = ADJECTIVES.choose(rng).copied().unwrap_or("unique");
                texts.push(format!("{} gift {adj}", interest.to_lowercase()));
            }
        }
    }

    if let Some(age) = profile.age {
        texts.push(age_phrase(age).to_string());
    }
    texts.push(event_phrase(event_type));

    let mut seen = BTreeSet::new();
    let mut out: Vec<String> = Vec::new();
    for t in texts {
        let t = t.split_whitespace().collect::<Vec<_>>().join(" ");
        if t.is_empty() {
            continue;
        }
        if seen.insert(textprep::scrub(&t)) {
            out.push(t);
        }
    }

    if out.len() < MIN_QUERIES {
        let start = ((now_ms / 1000) % GENERIC_TEMPLATES.len() as u128) as usize;
        for i in 0..GENERIC_TEMPLATES.len() {
            if out.len() >= MIN_QUERIES {
                break;
            }
            let g = GENERIC_TEMPLATES[(start + i) % GENERIC_TEMPLATES.len()];
            let t = format!("{g} under {}", band.max.round() as u64);
            if seen.insert(textprep::scrub(&t)) {
                out.push(t);
            }
        }
    }

    out.shuffle(rng);
    out.truncate(MAX_QUERIES);
    tracing::debug!(queries = ?out, "generated search queries");

    out.into_iter()
        .map(|text| SearchQuery {
            text,
            band,
            timeout_ms: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn profile(interests: &[&str], age: Option<u32>) -> SubjectProfile {
        SubjectProfile {
            id: "p1".to_string(),
            name: "Ana".to_string(),
            interests: interests.iter().map(|s| s.to_string()).collect(),
            age,
            ..SubjectProfile::default()
        }
    }

    fn assert_well_formed(qs: &[SearchQuery]) {
        assert!(qs.len() >= MIN_QUERIES && qs.len() <= MAX_QUERIES, "n={}", qs.len());
        let mut seen = BTreeSet::new();
        for q in qs {
            assert!(!q.text.trim().is_empty());
            assert!(seen.insert(textprep::scrub(&q.text)), "duplicate: {}", q.text);
        }
    }

    #[test]
    fn empty_profile_gets_generic_fill() {
        let mut rng = StdRng::seed_from_u64(7);
        let qs = generate_queries(&profile(&[], None), "", 50.0, &mut rng, 123_456);
        assert_eq!(qs.len(), MIN_QUERIES);
        assert_well_formed(&qs);
        assert!(qs.iter().all(|q| q.band.max == 50.0 && q.band.min == 10.0));
    }

    #[test]
    fn many_interests_are_capped() {
        let mut rng = StdRng::seed_from_u64(1);
        let p = profile(
            &[
                "Sport", "Cuisine", "Lecture", "Musique", "Voyage", "Tech", "Jardinage", "Art",
                "Photo", "Yoga",
            ],
            Some(34),
        );
        let qs = generate_queries(&p, "Anniversaire", 80.0, &mut rng, 0);
        assert_eq!(qs.len(), MAX_QUERIES);
        assert_well_formed(&qs);
    }

    #[test]
    fn interest_matching_ignores_case_and_accents() {
        assert!(interest_phrases("RANDONNÉE").is_some());
        assert!(interest_phrases("jeux vidéo").is_some());
        assert!(interest_phrases("falconry").is_none());
    }

    #[test]
    fn unknown_interest_is_used_verbatim() {
        let mut rng = StdRng::seed_from_u64(3);
        let qs = generate_queries(&profile(&["Falconry"], None), "birthday", 40.0, &mut rng, 0);
        assert_well_formed(&qs);
        assert!(qs.iter().any(|q| q.text.starts_with("falconry gift")));
        assert!(qs.iter().any(|q| q.text == "birthday gift"));
    }

    #[test]
    fn event_and_age_templates_are_always_added() {
        let mut rng = StdRng::seed_from_u64(11);
        let qs = generate_queries(&profile(&["Sport"], Some(16)), "Noël", 30.0, &mut rng, 0);
        assert_well_formed(&qs);
        assert!(qs.iter().any(|q| q.text == "christmas gift"));
        assert!(qs.iter().any(|q| q.text == "gift for teenager"));
    }

    #[test]
    fn different_seeds_vary_phrasing() {
        let p = profile(&["Sport", "Cuisine", "Tech"], Some(40));
        let texts = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut v: Vec<String> = generate_queries(&p, "birthday", 60.0, &mut rng, 0)
                .into_iter()
                .map(|q| q.text)
                .collect();
            v.sort();
            v
        };
        let distinct: BTreeSet<Vec<String>> = (0..8u64).map(texts).collect();
        assert!(distinct.len() > 1);
    }
}
