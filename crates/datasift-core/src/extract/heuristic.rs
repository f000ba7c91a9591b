//! Local keyword heuristic used when the remote extractor is unavailable

use super::ExtractionStrategy;
use crate::dataset::{DatasetKind, DatasetSchema, NEWS_CATEGORIES};
use crate::error::Result;
use crate::filter::StructuredFilter;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;

lazy_static! {
    static ref STAR_RE: Regex = Regex::new(
        r"(?i)\b([1-5])[\s-]*stars?\b(?:\s+(?:and|or)\s+(above|up|higher|more|over|below|less|lower|under))?"
    )
    .unwrap();
    static ref PRODUCT_ID_RE: Regex = Regex::new(r"\b[A-Z0-9]{10}\b").unwrap();
    static ref YEAR_RE: Regex = Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap();
    static ref RATING_RE: Regex = Regex::new(
        r"(?i)\b(?:rated|rating|score[ds]?)\s+(?:above|over|at\s+least|of\s+at\s+least|>=?)\s*(\d+(?:\.\d+)?)"
    )
    .unwrap();
    static ref DIRECTOR_RE: Regex =
        Regex::new(r"(?i)\b(?:directed\s+by|director)\s+([\p{L}.'-]+(?:\s+[\p{L}.'-]+){0,3})")
            .unwrap();
    static ref ACTOR_RE: Regex =
        Regex::new(r"(?i)\b(?:starring|featuring|with\s+actor|with\s+actress)\s+([\p{L}.'-]+(?:\s+[\p{L}.'-]+){0,3})")
            .unwrap();
    static ref LIMIT_RE: Regex = Regex::new(r"(?i)\b(?:top|first|last)\s+(\d{1,3})\b").unwrap();
}

/// Words that end a captured person name
const NAME_TERMINATORS: &[&str] = &[
    "from", "in", "with", "and", "or", "starring", "featuring", "released", "after", "before",
    "about", "that", "which", "who", "directed", "movies", "movie", "films", "film", "rated",
    "rating", "above", "over", "under", "since", "during", "for", "on", "at", "the",
];

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "also", "articles", "article", "below", "could", "find", "from",
    "give", "have", "latest", "list", "looking", "more", "most", "news", "please", "recent",
    "related", "concerning", "search", "show", "some", "stories", "story", "that", "their",
    "there", "these", "they", "this", "those", "want", "what", "when", "where", "which", "with",
    "would", "your", "movies", "movie", "films", "film", "reviews", "review", "products",
    "product", "stars", "rating", "ratings", "rated", "items", "people", "anything", "something",
    "best", "worst", "good",
];

const GENRES: &[&str] = &[
    "action",
    "adventure",
    "animation",
    "comedy",
    "crime",
    "documentary",
    "drama",
    "family",
    "fantasy",
    "history",
    "horror",
    "music",
    "mystery",
    "romance",
    "thriller",
    "war",
    "western",
];

const POSITIVE_WORDS: &[&str] = &[
    "positive", "good", "great", "excellent", "best", "love", "loved", "amazing", "favorite",
];
const NEGATIVE_WORDS: &[&str] = &[
    "negative", "bad", "worst", "terrible", "awful", "poor", "hate", "hated", "disappointing",
];
const NEUTRAL_WORDS: &[&str] = &["neutral", "average", "mixed", "okay"];

/// Rule-based extractor. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous extraction
    pub fn parse(&self, text: &str, schema: &DatasetSchema) -> StructuredFilter {
        let mut filter = StructuredFilter::new();
        let mut rest = text.to_string();

        if let Some((value, span)) = capture(&LIMIT_RE, &rest) {
            if let Some(n) = value.parse::<i64>().ok().filter(|n| *n > 0) {
                filter.set("limit", n);
            }
            blank(&mut rest, span);
        }

        match schema.kind {
            DatasetKind::News => {}
            DatasetKind::Movies => parse_movie_phrases(&mut rest, &mut filter),
            DatasetKind::Reviews => parse_review_phrases(&mut rest, &mut filter),
        }

        let tokens: Vec<String> = rest
            .split_whitespace()
            .map(normalize_token)
            .filter(|t| !t.is_empty())
            .collect();
        let mut consumed = vec![false; tokens.len()];

        for (idx, token) in tokens.iter().enumerate() {
            match schema.kind {
                DatasetKind::News => {
                    if filter.contains("category") {
                        continue;
                    }
                    if let Some(cat) = NEWS_CATEGORIES
                        .iter()
                        .find(|c| token.as_str() == **c || token.strip_suffix('s') == Some(**c))
                    {
                        filter.set("category", *cat);
                        consumed[idx] = true;
                    }
                }
                DatasetKind::Movies => {
                    if filter.contains("genre") {
                        continue;
                    }
                    if let Some(genre) = match_genre(token) {
                        filter.set("genre", genre);
                        consumed[idx] = true;
                    }
                }
                DatasetKind::Reviews => {
                    if filter.contains("sentiment")
                        || filter.contains("min_score")
                        || filter.contains("max_score")
                    {
                        continue;
                    }
                    if let Some(sentiment) = match_sentiment(token) {
                        filter.set("sentiment", sentiment);
                        consumed[idx] = true;
                    }
                }
            }
        }

        let mut keyword: Option<&str> = None;
        for (idx, token) in tokens.iter().enumerate() {
            if consumed[idx]
                || token.chars().count() <= 3
                || token.chars().all(|c| c.is_ascii_digit())
                || STOPWORDS.contains(&token.as_str())
                || NEWS_CATEGORIES.contains(&token.as_str())
            {
                continue;
            }
            if keyword.map_or(true, |k| token.chars().count() > k.chars().count()) {
                keyword = Some(token.as_str());
            }
        }
        if let Some(keyword) = keyword {
            filter.set("keyword", keyword);
        }

        filter.normalize(schema);
        filter
    }
}

#[async_trait]
impl ExtractionStrategy for HeuristicExtractor {
    async fn extract(
        &self,
        text: &str,
        schema: &'static DatasetSchema,
    ) -> Result<StructuredFilter> {
        Ok(self.parse(text, schema))
    }

    fn name(&self) -> &'static str {
        "heuristic extractor"
    }
}

fn parse_movie_phrases(rest: &mut String, filter: &mut StructuredFilter) {
    if let Some((value, span)) = capture(&RATING_RE, rest) {
        if let Ok(rating) = value.parse::<f64>() {
            filter.set("min_rating", rating);
        }
        blank(rest, span);
    }

    if let Some((value, span)) = capture(&YEAR_RE, rest) {
        if let Ok(year) = value.parse::<i64>() {
            filter.set("year", year);
        }
        blank(rest, span);
    }

    for (re, field) in [(&*DIRECTOR_RE, "director"), (&*ACTOR_RE, "actor")] {
        if let Some((value, span)) = capture(re, rest) {
            let name = trim_name(&value);
            if !name.is_empty() {
                filter.set(field, name);
            }
            blank(rest, span);
        }
    }
}

fn parse_review_phrases(rest: &mut String, filter: &mut StructuredFilter) {
    let stars = STAR_RE.captures(rest).map(|caps| {
        (
            caps[1].parse::<i64>().ok(),
            caps.get(2).map(|m| m.as_str().to_lowercase()),
            caps.get(0).map(|m| m.range()).unwrap_or(0..0),
        )
    });
    if let Some((Some(stars), direction, span)) = stars {
        match direction.as_deref() {
            Some("below" | "less" | "lower" | "under") => filter.set("max_score", stars),
            Some(_) => filter.set("min_score", stars),
            None => {
                filter.set("min_score", stars);
                filter.set("max_score", stars);
            }
        }
        blank(rest, span);
    }

    let product = PRODUCT_ID_RE
        .find_iter(rest)
        .find(|m| {
            let s = m.as_str();
            s.chars().any(|c| c.is_ascii_digit()) && s.chars().any(|c| c.is_ascii_alphabetic())
        })
        .map(|m| (m.as_str().to_string(), m.range()));
    if let Some((id, span)) = product {
        filter.set("product", id);
        blank(rest, span);
    }
}

/// First capture group and the span of the whole match
fn capture(re: &Regex, text: &str) -> Option<(String, Range<usize>)> {
    let caps = re.captures(text)?;
    let whole = caps.get(0)?;
    let value = caps.get(1).unwrap_or(whole);
    Some((value.as_str().to_string(), whole.range()))
}

fn match_genre(token: &str) -> Option<&'static str> {
    let singular = token
        .strip_suffix("ies")
        .map(|s| format!("{}y", s))
        .or_else(|| token.strip_suffix('s').map(String::from));
    GENRES
        .iter()
        .find(|g| token == **g || singular.as_deref() == Some(**g))
        .copied()
}

fn match_sentiment(token: &str) -> Option<&'static str> {
    if POSITIVE_WORDS.contains(&token) {
        Some("positive")
    } else if NEGATIVE_WORDS.contains(&token) {
        Some("negative")
    } else if NEUTRAL_WORDS.contains(&token) {
        Some("neutral")
    } else {
        None
    }
}

/// Cut a captured name at the first word that cannot belong to it
fn trim_name(raw: &str) -> String {
    raw.split_whitespace()
        .take_while(|w| !NAME_TERMINATORS.contains(&w.to_lowercase().as_str()))
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_token(raw: &str) -> String {
    raw.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Overwrite a byte range with spaces, keeping later offsets valid
fn blank(text: &mut String, span: Range<usize>) {
    let len = span.end - span.start;
    text.replace_range(span, &" ".repeat(len));
}
