//! Minimal, deterministic text normalization helpers.
//!
//! Used only for matching (title similarity, keyword rules, interest lookups), never for display.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Conservative "scrub" used for matching keys.
///
/// - NFD decomposition + combining-mark removal (accents stripped: "vélo" -> "velo")
/// - lowercase
/// - a few ligatures folded to ASCII pairs
/// - treat non-alphanumeric as separators (collapse to single spaces)
pub fn scrub(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for ch in s.nfd().filter(|c| !is_combining_mark(*c)) {
        let folded: Option<&str> = match ch {
            'œ' | 'Œ' => Some("oe"),
            'æ' | 'Æ' => Some("ae"),
            'ß' => Some("ss"),
            _ => None,
        };
        if let Some(f) = folded {
            out.push_str(f);
            last_space = false;
            continue;
        }
        if ch.is_alphanumeric() {
            for lc in ch.to_lowercase() {
                out.push(lc);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim().to_string()
}

/// Scrubbed whitespace tokens.
pub fn tokens(s: &str) -> Vec<String> {
    scrub(s).split_whitespace().map(str::to_string).collect()
}

/// True when `text` hits any of the scrubbed `keys`.
///
/// Single-word keys must match a whole token; multi-word keys match a token run.
pub fn matches_any(text: &str, keys: &[&str]) -> bool {
    let scrubbed = scrub(text);
    if scrubbed.is_empty() {
        return false;
    }
    let padded = format!(" {scrubbed} ");
    keys.iter().any(|k| {
        let k = k.trim();
        !k.is_empty() && padded.contains(&format!(" {k} "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrub_strips_accents_case_and_punctuation() {
        assert_eq!(scrub("Sac à dos Randonnée, 30L!"), "sac a dos randonnee 30l");
        assert_eq!(scrub("  Café--Crème  "), "cafe creme");
    }

    #[test]
    fn scrub_folds_ligatures() {
        assert_eq!(scrub("Œuvre"), "oeuvre");
        assert_eq!(scrub("Straße"), "strasse");
    }

    #[test]
    fn scrub_output_has_no_double_spaces() {
        let s = scrub("a  -  b // c");
        assert_eq!(s, "a b c");
    }

    #[test]
    fn tokens_split_on_scrubbed_whitespace() {
        assert_eq!(tokens("Yoga-Mat (Pro)"), vec!["yoga", "mat", "pro"]);
        assert!(tokens("!!!").is_empty());
    }

    #[test]
    fn matches_any_respects_token_boundaries() {
        assert!(matches_any("Tapis de Yoga", &["yoga"]));
        assert!(matches_any("Jeux Vidéo", &["jeux video"]));
        assert!(!matches_any("Teapot", &["tea"]));
        assert!(!matches_any("", &["tea"]));
    }
}
