use std::collections::BTreeSet;

use crate::textprep;

/// Scrubbed word set of a title. Single-character tokens are dropped ("a", "x", "2").
pub fn token_set(text: &str) -> BTreeSet<String> {
    textprep::tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() > 1)
        .collect()
}

pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count() as f64;
    let uni = a.union(b).count() as f64;
    if uni == 0.0 {
        0.0
    } else {
        inter / uni
    }
}

/// Word-set overlap between two product titles, in [0, 1].
///
/// Two titles that scrub to nothing are not considered similar.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let sa = token_set(a);
    let sb = token_set(b);
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    jaccard(&sa, &sb)
}
