//! Marketplace link building.
//!
//! All links are built with `url::Url` so query encoding is never hand-rolled.

use giftpipe_core::is_valid_asin;

pub const DEFAULT_MARKETPLACE_DOMAIN: &str = "www.amazon.com";

#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Host of the commerce site, e.g. `www.amazon.com`.
    pub domain: String,
    pub affiliate_tag: Option<String>,
    /// Tagging happens only when this is true *and* a tag is set.
    pub affiliate_active: bool,
    /// HEAD-check synthesized detail links before returning them.
    pub verify_links: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            domain: DEFAULT_MARKETPLACE_DOMAIN.to_string(),
            affiliate_tag: None,
            affiliate_active: false,
            verify_links: false,
        }
    }
}

impl LinkConfig {
    fn active_tag(&self) -> Option<&str> {
        if !self.affiliate_active {
            return None;
        }
        self.affiliate_tag
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Apply the affiliate tag when configured; otherwise return the link unchanged.
    pub fn tag(&self, url: &str) -> String {
        match self.active_tag() {
            Some(tag) => apply_affiliate_tag(url, tag, &self.domain),
            None => url.to_string(),
        }
    }

    pub fn product_url(&self, asin: &str) -> Option<String> {
        canonical_product_url(&self.domain, asin)
    }

    pub fn search_url(&self, title: &str) -> String {
        search_url(&self.domain, title)
    }

    pub fn cart_url(&self, asin: &str) -> Option<String> {
        cart_url(&self.domain, asin)
    }
}

fn base_domain(domain: &str) -> &str {
    domain.trim().trim_start_matches("www.")
}

/// True when `host` is the marketplace host or one of its subdomains.
pub fn is_marketplace_host(host: &str, domain: &str) -> bool {
    let base = base_domain(domain).to_ascii_lowercase();
    if base.is_empty() {
        return false;
    }
    let host = host.to_ascii_lowercase();
    host == base || host.ends_with(&format!(".{base}"))
}

/// `https://<domain>/dp/<ASIN>` for a syntactically valid identifier.
pub fn canonical_product_url(domain: &str, asin: &str) -> Option<String> {
    let asin = asin.trim();
    if !is_valid_asin(asin) {
        return None;
    }
    Some(format!(
        "https://{}/dp/{}",
        domain.trim(),
        asin.to_ascii_uppercase()
    ))
}

/// Search-results link for a free-text title. Always succeeds.
pub fn search_url(domain: &str, title: &str) -> String {
    let base = format!("https://{}/s", domain.trim());
    match url::Url::parse_with_params(&base, &[("k", title.trim())]) {
        Ok(u) => u.to_string(),
        Err(_) => base,
    }
}

pub fn cart_url(domain: &str, asin: &str) -> Option<String> {
    let asin = asin.trim();
    if !is_valid_asin(asin) {
        return None;
    }
    let base = format!("https://{}/gp/aws/cart/add.html", domain.trim());
    url::Url::parse_with_params(
        &base,
        &[("ASIN.1", asin.to_ascii_uppercase().as_str()), ("Quantity.1", "1")],
    )
    .ok()
    .map(|u| u.to_string())
}

/// Set (never append) the `tag` query parameter on marketplace links.
///
/// Non-marketplace or unparsable links are returned unchanged. Applying the transform twice
/// yields the same string as applying it once.
pub fn apply_affiliate_tag(url: &str, tag: &str, domain: &str) -> String {
    let Ok(mut u) = url::Url::parse(url) else {
        return url.to_string();
    };
    let Some(host) = u.host_str() else {
        return url.to_string();
    };
    if !is_marketplace_host(host, domain) {
        return url.to_string();
    }
    let kept: Vec<(String, String)> = u
        .query_pairs()
        .filter(|(k, _)| k != "tag")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut qp = u.query_pairs_mut();
        qp.clear();
        for (k, v) in &kept {
            qp.append_pair(k, v);
        }
        qp.append_pair("tag", tag);
    }
    u.to_string()
}

/// Pull an identifier out of a detail-page link (`/dp/<ASIN>`, `/gp/product/<ASIN>`).
pub fn extract_asin_from_url(url: &str) -> Option<String> {
    let u = url::Url::parse(url).ok()?;
    let segs: Vec<&str> = u.path_segments()?.filter(|s| !s.is_empty()).collect();
    for w in segs.windows(2) {
        let marker = w[0].to_ascii_lowercase();
        if matches!(marker.as_str(), "dp" | "product" | "asin") && is_valid_asin(w[1]) {
            return Some(w[1].to_ascii_uppercase());
        }
    }
    None
}

/// A canonical detail-page link on the marketplace (as opposed to a search or ad link).
pub fn is_detail_page_url(url: &str, domain: &str) -> bool {
    let Ok(u) = url::Url::parse(url) else {
        return false;
    };
    let Some(host) = u.host_str() else {
        return false;
    };
    is_marketplace_host(host, domain) && extract_asin_from_url(url).is_some()
}
