//! Curated suggestions used when product search produced nothing.
//!
//! No identifiers are claimed here: every suggestion carries match type `search` and only a
//! search-results link.

use std::collections::BTreeSet;

use giftpipe_core::{FinalGiftSuggestion, MatchType, ProductData, SubjectProfile};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::enrich::round_price;
use crate::links::LinkConfig;
use crate::textprep;

pub const FALLBACK_COUNT: usize = 3;
const FALLBACK_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct CuratedIdea {
    pub title: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    /// Estimated price as a share of the budget, in (0, 1].
    pub price_fraction: f64,
}

struct InterestIdeas {
    keys: &'static [&'static str],
    ideas: &'static [CuratedIdea],
}

const fn idea(
    title: &'static str,
    description: &'static str,
    category: &'static str,
    price_fraction: f64,
) -> CuratedIdea {
    CuratedIdea {
        title,
        description,
        category,
        price_fraction,
    }
}

const INTEREST_IDEAS: &[InterestIdeas] = &[
    InterestIdeas {
        keys: &["sport", "sports", "fitness", "gym", "running", "course", "yoga"],
        ideas: &[
            idea(
                "Insulated sports water bottle",
                "Keeps drinks cold through long workouts.",
                "Fitness",
                0.5,
            ),
            idea(
                "Non-slip yoga mat",
                "A thick, grippy mat for stretching and yoga.",
                "Fitness",
                0.7,
            ),
            idea("Resistance band set", "Compact strength training anywhere.", "Fitness", 0.45),
            idea(
                "Running armband for phone",
                "Keeps the phone secure on every run.",
                "Fitness",
                0.3,
            ),
        ],
    },
    InterestIdeas {
        keys: &["cuisine", "cooking", "kitchen", "baking", "patisserie", "food"],
        ideas: &[
            idea("Chef's knife", "A sharp, balanced knife for everyday cooking.", "Kitchen", 0.8),
            idea("Cookbook of world recipes", "New dishes to try every week.", "Books", 0.5),
            idea("Silicone baking mat set", "Non-stick baking without parchment.", "Kitchen", 0.4),
        ],
    },
    InterestIdeas {
        keys: &["lecture", "reading", "books", "book", "livres", "litterature"],
        ideas: &[
            idea("Clip-on reading light", "Reading late without disturbing anyone.", "Books", 0.35),
            idea("Leather bookmark set", "A classic touch for every book.", "Books", 0.25),
            idea("E-reader sleeve", "Protects an e-reader on the go.", "Books", 0.4),
        ],
    },
    InterestIdeas {
        keys: &["musique", "music", "guitar", "guitare", "piano"],
        ideas: &[
            idea(
                "Portable Bluetooth speaker",
                "Music anywhere, with solid battery life.",
                "Electronics",
                0.8,
            ),
            idea(
                "Noise-isolating earbuds",
                "Clear sound on the daily commute.",
                "Electronics",
                0.7,
            ),
            idea("Guitar accessory kit", "Picks, capo and tuner in one pouch.", "Music", 0.4),
        ],
    },
    InterestIdeas {
        keys: &["voyage", "travel", "voyages", "traveling"],
        ideas: &[
            idea("Packing cubes set", "Keeps a suitcase tidy on every trip.", "Travel", 0.5),
            idea(
                "Memory foam travel pillow",
                "Rest on long flights and train rides.",
                "Travel",
                0.5,
            ),
            idea("Universal travel adapter", "One plug for outlets worldwide.", "Travel", 0.45),
        ],
    },
    InterestIdeas {
        keys: &["tech", "technologie", "technology", "gadgets", "informatique", "computers"],
        ideas: &[
            idea(
                "Wireless charging pad",
                "Charges a phone by just setting it down.",
                "Electronics",
                0.5,
            ),
            idea(
                "Smart plug pair",
                "Controls lamps and appliances from a phone.",
                "Electronics",
                0.5,
            ),
            idea("Desk cable organizer", "Keeps a workspace free of clutter.", "Electronics", 0.3),
        ],
    },
    InterestIdeas {
        keys: &["jardinage", "gardening", "garden", "plantes", "plants"],
        ideas: &[
            idea("Gardening tool set", "Sturdy hand tools for beds and pots.", "Garden", 0.6),
            idea("Herb growing kit", "Fresh herbs from a windowsill.", "Garden", 0.45),
        ],
    },
    InterestIdeas {
        keys: &["randonnee", "hiking", "outdoor", "camping", "nature"],
        ideas: &[
            idea(
                "Rechargeable headlamp",
                "Hands-free light for trails and campsites.",
                "Outdoor",
                0.4,
            ),
            idea("Lightweight daypack", "Carries the essentials on day hikes.", "Outdoor", 0.8),
            idea("Insulated camping mug", "Hot coffee at the campsite.", "Outdoor", 0.3),
        ],
    },
    InterestIdeas {
        keys: &["art", "dessin", "drawing", "painting", "peinture"],
        ideas: &[
            idea("Watercolor paint set", "Vivid colors for sketches and paintings.", "Art", 0.5),
            idea("Sketchbook and pencil kit", "Everything needed to draw on the go.", "Art", 0.4),
        ],
    },
    InterestIdeas {
        keys: &["cafe", "coffee", "tea"],
        ideas: &[
            idea("Pour-over coffee set", "A calm coffee ritual at home.", "Kitchen", 0.6),
            idea("Loose-leaf tea sampler", "A tour of teas from around the world.", "Kitchen", 0.4),
        ],
    },
];

const GENERIC_IDEAS: &[CuratedIdea] = &[
    idea("Scented candle gift set", "A cozy touch for any room.", "Home", 0.4),
    idea("Personalized photo frame", "A favourite memory on display.", "Home", 0.45),
    idea("Gourmet chocolate box", "An assortment of fine chocolates.", "Food", 0.35),
    idea("Soft throw blanket", "Warm evenings on the couch.", "Home", 0.6),
    idea("Insulated travel mug", "Coffee that stays hot all morning.", "Kitchen", 0.3),
];

/// An idea plus the profile interest that selected it (`None` for generic padding).
#[derive(Debug, Clone, Copy)]
struct Picked<'a> {
    idea: CuratedIdea,
    interest: Option<&'a str>,
}

/// Curated ideas for the profile's interests, first interest first, without repeats.
fn matching_ideas(profile: &SubjectProfile) -> Vec<Picked<'_>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for interest in &profile.interests {
        for entry in INTEREST_IDEAS
            .iter()
            .filter(|e| textprep::matches_any(interest, e.keys))
        {
            for i in entry.ideas {
                if seen.insert(i.title) {
                    out.push(Picked {
                        idea: *i,
                        interest: Some(interest.trim()),
                    });
                }
            }
        }
    }
    out
}

fn to_suggestion(
    picked: &Picked<'_>,
    profile: &SubjectProfile,
    budget: f64,
    links: &LinkConfig,
) -> FinalGiftSuggestion {
    let i = &picked.idea;
    let search_url = links.tag(&links.search_url(i.title));
    let reasoning = match picked.interest {
        Some(interest) => format!(
            "Curated idea matching {}'s interest in {}.",
            profile.name, interest
        ),
        None => format!("Popular gift idea for {}.", profile.name),
    };
    let estimated_price = round_price(budget * i.price_fraction.clamp(0.0, 1.0));
    FinalGiftSuggestion {
        title: i.title.to_string(),
        description: i.description.to_string(),
        estimated_price,
        confidence: FALLBACK_CONFIDENCE,
        reasoning,
        category: i.category.to_string(),
        alternatives: vec![],
        purchase_links: vec![search_url.clone()],
        amazon_data: ProductData {
            asin: None,
            product_url: None,
            add_to_cart_url: None,
            search_url,
            match_type: MatchType::Search,
            image_url: None,
            rating: None,
            review_count: None,
        },
        within_budget: estimated_price <= budget,
    }
}

/// Three curated suggestions with search links only. Never calls the language model.
pub fn fallback_suggestions<R: Rng + ?Sized>(
    profile: &SubjectProfile,
    budget: f64,
    links: &LinkConfig,
    rng: &mut R,
) -> Vec<FinalGiftSuggestion> {
    let mut ideas = matching_ideas(profile);
    let matched = ideas.len();
    ideas.shuffle(rng);
    ideas.truncate(FALLBACK_COUNT);

    if ideas.len() < FALLBACK_COUNT {
        let mut generic: Vec<Picked<'_>> = GENERIC_IDEAS
            .iter()
            .filter(|g| ideas.iter().all(|p| p.idea.title != g.title))
            .map(|g| Picked {
                idea: *g,
                interest: None,
            })
            .collect();
        generic.shuffle(rng);
        let missing = FALLBACK_COUNT - ideas.len();
        ideas.extend(generic.into_iter().take(missing));
    }

    tracing::info!(
        matched,
        returned = ideas.len(),
        "using curated fallback suggestions"
    );
    ideas
        .iter()
        .map(|p| to_suggestion(p, profile, budget, links))
        .collect()
}
