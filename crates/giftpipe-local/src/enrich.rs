//! Descriptions, purchase links and the final budget check.

use giftpipe_core::{
    is_valid_asin, Error, FinalGiftSuggestion, LinkVerifier, ProductData, ReconciledSuggestion,
    Result, SubjectProfile,
};

use crate::links::{is_detail_page_url, LinkConfig};
use crate::textprep;

/// Share of the budget assumed when neither the pool nor the model gave a price.
pub const ESTIMATED_PRICE_SHARE: f64 = 0.8;

const MIN_REASONING_CHARS: usize = 40;

/// Reasoning that says nothing about the recipient.
const BOILERPLATE: &[&str] = &[
    "great gift",
    "perfect gift",
    "nice gift",
    "ideal gift",
    "good gift",
    "this is a great gift",
    "this product is perfect",
    "a great choice",
    "excellent choice",
    "un cadeau parfait",
    "un excellent cadeau",
    "cadeau ideal",
    "excellent choix",
];

/// One description rule: a product matching any keyword gets `template`, with `{name}`
/// replaced by the recipient's name.
pub struct DescriptionRule {
    pub category: &'static str,
    pub keywords: &'static [&'static str],
    pub template: &'static str,
}

/// Evaluated in order; the first hit wins.
pub const DESCRIPTION_RULES: &[DescriptionRule] = &[
    DescriptionRule {
        category: "Outdoor",
        keywords: &[
            "hiking", "camping", "tent", "backpack", "randonnee", "sac a dos", "lampe frontale",
            "headlamp", "outdoor", "trekking",
        ],
        template: "Solid outdoor gear for {name}'s next trip outside.",
    },
    DescriptionRule {
        category: "Fitness",
        keywords: &[
            "yoga", "fitness", "dumbbell", "dumbbells", "halteres", "running", "sport", "gym",
            "resistance", "tapis", "workout", "velo",
        ],
        template: "Helps {name} keep up an active routine at home or at the gym.",
    },
    DescriptionRule {
        category: "Travel",
        keywords: &[
            "travel", "voyage", "luggage", "valise", "passport", "passeport", "organizer",
            "neck pillow", "trousse",
        ],
        template: "Makes every trip a little easier for {name}.",
    },
    DescriptionRule {
        category: "Apparel",
        keywords: &[
            "shirt", "t shirt", "hoodie", "sweat", "scarf", "echarpe", "gloves", "gants",
            "socks", "chaussettes", "jacket", "veste", "hat", "bonnet",
        ],
        template: "A comfortable piece {name} can wear every day.",
    },
    DescriptionRule {
        category: "Electronics",
        keywords: &[
            "bluetooth", "wireless", "sans fil", "headphones", "casque", "earbuds", "ecouteurs",
            "speaker", "enceinte", "charger", "chargeur", "smart", "usb", "camera",
        ],
        template: "A handy gadget {name} will use every day.",
    },
    DescriptionRule {
        category: "Kitchen",
        keywords: &[
            "kitchen", "cuisine", "knife", "couteau", "pan", "poele", "skillet", "baking",
            "patisserie", "mug", "tasse", "coffee", "cafe", "tea", "teapot", "theiere",
        ],
        template: "Something {name} will enjoy using in the kitchen.",
    },
    DescriptionRule {
        category: "Books",
        keywords: &["book", "books", "livre", "livres", "novel", "roman", "journal", "carnet"],
        template: "A good read picked with {name}'s tastes in mind.",
    },
    DescriptionRule {
        category: "Music",
        keywords: &["guitar", "guitare", "piano", "ukulele", "vinyl", "vinyle", "music", "musique"],
        template: "A treat for the music lover in {name}.",
    },
    DescriptionRule {
        category: "Games",
        keywords: &["game", "games", "jeu", "jeux", "puzzle", "lego", "controller", "manette"],
        template: "Hours of fun for {name}, alone or with friends.",
    },
    DescriptionRule {
        category: "Beauty",
        keywords: &[
            "skincare", "soin", "beauty", "beaute", "parfum", "perfume", "candle", "bougie",
        ],
        template: "A little self-care moment for {name}.",
    },
    DescriptionRule {
        category: "Garden",
        keywords: &[
            "garden", "jardin", "jardinage", "plant", "plante", "plantes", "seeds", "graines",
        ],
        template: "Everything {name} needs to grow something new.",
    },
    DescriptionRule {
        category: "Art",
        keywords: &["paint", "peinture", "drawing", "dessin", "sketch", "watercolor", "aquarelle"],
        template: "Gives {name} new ways to create.",
    },
];

fn fill(template: &str, name: &str) -> String {
    let name = if name.trim().is_empty() { "them" } else { name.trim() };
    template.replace("{name}", name)
}

/// True when `reasoning` is long enough and not a stock phrase.
pub fn is_substantive(reasoning: &str) -> bool {
    let r = reasoning.trim();
    if r.chars().count() < MIN_REASONING_CHARS {
        return false;
    }
    let scrubbed = textprep::scrub(r);
    !BOILERPLATE
        .iter()
        .any(|b| scrubbed == *b || (scrubbed.starts_with(b) && scrubbed.len() < b.len() + 25))
}

fn rule_for_title(title: &str) -> Option<&'static DescriptionRule> {
    DESCRIPTION_RULES
        .iter()
        .find(|r| textprep::matches_any(title, r.keywords))
}

fn rule_for_interests(profile: &SubjectProfile) -> Option<(&'static DescriptionRule, &str)> {
    profile.interests.iter().find_map(|i| {
        DESCRIPTION_RULES
            .iter()
            .find(|r| textprep::matches_any(i, r.keywords))
            .map(|r| (r, i.as_str()))
    })
}

/// Human-facing description: model reasoning, then title rules, then interests, then a
/// generic sentence.
pub fn describe(s: &ReconciledSuggestion, profile: &SubjectProfile) -> String {
    if is_substantive(&s.reasoning) {
        return s.reasoning.trim().to_string();
    }
    if let Some(rule) = rule_for_title(&s.title) {
        return fill(rule.template, &profile.name);
    }
    if let Some((rule, interest)) = rule_for_interests(profile) {
        return format!(
            "{} Chosen for their interest in {}.",
            fill(rule.template, &profile.name),
            interest.trim().to_lowercase()
        );
    }
    fill("A well-reviewed pick for {name} that fits the budget.", &profile.name)
}

fn category_for(s: &ReconciledSuggestion, profile: &SubjectProfile) -> String {
    if let Some(c) = s.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        return c.to_string();
    }
    rule_for_title(&s.title)
        .or_else(|| rule_for_interests(profile).map(|(r, _)| r))
        .map(|r| r.category.to_string())
        .unwrap_or_else(|| "Gift".to_string())
}

pub fn round_price(p: f64) -> f64 {
    (p * 100.0).round() / 100.0
}

/// Resolve the detail link: the pool's own link first, then one synthesized from the
/// identifier (HEAD-checked when enabled).
async fn resolve_product_url(
    s: &ReconciledSuggestion,
    links: &LinkConfig,
    verifier: Option<&dyn LinkVerifier>,
) -> Option<String> {
    if let Some(u) = s
        .detail_url
        .as_deref()
        .filter(|u| is_detail_page_url(u, &links.domain))
    {
        return Some(u.to_string());
    }
    let asin = s.asin.as_deref().filter(|a| is_valid_asin(a))?;
    let synthesized = links.product_url(asin)?;
    if links.verify_links {
        if let Some(v) = verifier {
            if !v.verify(&synthesized).await {
                tracing::info!(asin, "synthesized link failed verification");
                return None;
            }
        }
    }
    Some(synthesized)
}

async fn enrich_one(
    s: ReconciledSuggestion,
    profile: &SubjectProfile,
    budget: f64,
    links: &LinkConfig,
    verifier: Option<&dyn LinkVerifier>,
) -> FinalGiftSuggestion {
    let estimated_price = round_price(s.price.unwrap_or(budget * ESTIMATED_PRICE_SHARE));
    let product_url = resolve_product_url(&s, links, verifier).await;
    let search_url = links.tag(&links.search_url(&s.title));
    let add_to_cart_url = match (&product_url, s.asin.as_deref()) {
        (Some(_), Some(asin)) => links.cart_url(asin).map(|u| links.tag(&u)),
        _ => None,
    };
    let product_url = product_url.map(|u| links.tag(&u));

    let mut purchase_links = Vec::new();
    if let Some(u) = &product_url {
        purchase_links.push(u.clone());
    }
    purchase_links.push(search_url.clone());

    FinalGiftSuggestion {
        description: describe(&s, profile),
        category: category_for(&s, profile),
        estimated_price,
        confidence: s.confidence.clamp(0.0, 1.0),
        within_budget: estimated_price <= budget,
        purchase_links,
        amazon_data: ProductData {
            asin: s.asin.clone(),
            product_url,
            add_to_cart_url,
            search_url,
            match_type: s.match_type,
            image_url: s.image_url.clone(),
            rating: s.rating,
            review_count: s.review_count,
        },
        title: s.title,
        reasoning: s.reasoning,
        alternatives: s.alternatives,
    }
}

/// Attach descriptions and links, then drop anything over `budget`.
///
/// Returns [`Error::OverBudget`] when every suggestion was too expensive.
pub async fn enrich(
    suggestions: Vec<ReconciledSuggestion>,
    profile: &SubjectProfile,
    budget: f64,
    links: &LinkConfig,
    verifier: Option<&dyn LinkVerifier>,
) -> Result<Vec<FinalGiftSuggestion>> {
    let total = suggestions.len();
    let mut out = Vec::with_capacity(total);
    for s in suggestions {
        let f = enrich_one(s, profile, budget, links, verifier).await;
        if f.within_budget {
            out.push(f);
        } else {
            tracing::info!(
                title = %f.title,
                price = f.estimated_price,
                budget,
                "dropped over budget"
            );
        }
    }
    if out.is_empty() && total > 0 {
        return Err(Error::OverBudget(format!(
            "all {total} suggestions cost more than the budget of {budget:.2}"
        )));
    }
    Ok(out)
}
