//! Static extraction of price, availability and title from fetched HTML.
//!
//! Nothing here fails: a document that matches nothing yields empty strings
//! and [`Availability::Available`].

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::models::Availability;

/// Price patterns in priority order. The first one that matches anywhere in
/// the document wins, regardless of where later patterns would match.
static PRICE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\$[\d,]+\.?\d*",
        r"USD\s*[\d,]+\.?\d*",
        r"€[\d,]+\.?\d*",
        r"EUR\s*[\d,]+\.?\d*",
        r"£[\d,]+\.?\d*",
        r"GBP\s*[\d,]+\.?\d*",
        r#"data-price="([^"]+)""#,
        r#"class="[^"]*price[^"]*"[^>]*>[\s]*([^<]+)"#,
        r#""price"\s*:\s*"([^"]+)""#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("price pattern must compile"))
    .collect()
});

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector must parse"));

// Checked top to bottom; the first state with a matching phrase wins.
const AVAILABILITY_PHRASES: [(Availability, &[&str]); 3] = [
    (Availability::OutOfStock, &["out of stock", "outofstock"]),
    (Availability::InStock, &["in stock", "instock", "available"]),
    (Availability::PreOrder, &["pre-order", "preorder"]),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Extraction {
    pub price: String,
    pub availability: Availability,
    pub title: String,
}

pub fn extract(html: &str) -> Extraction {
    Extraction {
        price: extract_price(html),
        availability: extract_availability(html),
        title: extract_title(html),
    }
}

pub fn extract_price(html: &str) -> String {
    for pattern in PRICE_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(html) {
            let matched = captures.get(1).or_else(|| captures.get(0));
            if let Some(m) = matched {
                return m.as_str().trim().to_string();
            }
        }
    }
    String::new()
}

pub fn extract_availability(html: &str) -> Availability {
    let lowered = html.to_lowercase();
    AVAILABILITY_PHRASES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|phrase| lowered.contains(phrase)))
        .map(|(availability, _)| *availability)
        .unwrap_or(Availability::Available)
}

pub fn extract_title(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|title| title.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}
