//! Project name generation
//!
//! Names are canonical kebab-case ending in `-wind-farm`, plus a `-N` counter
//! when the plain name is taken. A name comes from a
//! location phrase in the request when there is one ("in Amarillo",
//! "for west texas"), otherwise from a reverse lookup of the coordinates,
//! otherwise from the coordinates themselves. The result is then made unique
//! against the stored projects.

use crate::project::{now_millis, ProjectStore};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;
use vane_sdk::errors::EngineError;
use vane_sdk::types::Coordinates;

pub mod geocode;

pub use geocode::{CachedGeocoder, GeocodeError, NominatimGeocoder, ReverseGeocoder};

const SUFFIX: &str = "-wind-farm";

/// Words that end a location phrase
const PHRASE_TERMINATORS: &[&str] = &[
    "with", "using", "and", "at", "for", "near", "in", "on", "to", "of", "from", "then", "please",
    "units", "unit", "turbines", "turbine", "wind", "farm", "project",
];

/// Leading filler dropped from a phrase
const PHRASE_FILLER: &[&str] = &["the", "a", "an", "my", "new", "our"];

/// Phrases that refer to something already known rather than a place
const NON_PLACES: &[&str] = &[
    "it", "this", "that", "them", "there", "here", "terrain", "layout", "simulation", "report",
    "analysis", "me", "us", "all", "everything",
];

static LOCATION_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Location phrase patterns, tried in order
fn location_patterns() -> &'static Vec<Regex> {
    const WORDS: &str = r"([a-z][a-z'-]*(?:,?\s+[a-z][a-z'-]*){0,4})";

    LOCATION_PATTERNS.get_or_init(|| {
        [
            format!(r"\bin\s+{}", WORDS),
            format!(r"\bat\s+{}", WORDS),
            r"\b([a-z][a-z'-]*(?:\s+[a-z][a-z'-]*){0,2})\s+wind\s+farm\b".to_string(),
            format!(r"\bfor\s+{}", WORDS),
            format!(r"\bnear\s+{}", WORDS),
            format!(r"\bcreate\s+(?:a\s+)?(?:new\s+)?project\s+{}", WORDS),
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("Invalid location pattern"))
        .collect()
    })
}

fn clean_phrase(raw: &str) -> Option<String> {
    let words: Vec<&str> = raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|word| !word.is_empty())
        .skip_while(|word| PHRASE_FILLER.contains(word))
        .take_while(|word| !PHRASE_TERMINATORS.contains(word))
        .collect();

    let phrase = words.join(" ");
    if phrase.is_empty() || NON_PLACES.contains(&phrase.as_str()) {
        None
    } else {
        Some(phrase)
    }
}

/// First usable location phrase in the query, lowercased
pub fn location_phrase(query: &str) -> Option<String> {
    let lowered = query.to_lowercase();

    location_patterns().iter().find_map(|regex| {
        regex
            .captures_iter(&lowered)
            .find_map(|caps| clean_phrase(caps.get(1)?.as_str()))
    })
}

/// Canonical kebab-case form with the `-wind-farm` suffix
///
/// Returns an empty string when nothing usable is left of the input.
pub fn normalize(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len() + SUFFIX.len());
    for c in raw.to_lowercase().chars() {
        let mapped = if c.is_whitespace() || c == '_' { '-' } else { c };
        if !(mapped.is_ascii_lowercase() || mapped.is_ascii_digit() || mapped == '-') {
            continue;
        }
        if mapped == '-' && name.ends_with('-') {
            continue;
        }
        name.push(mapped);
    }

    let name = name.trim_matches('-');
    if name.is_empty() {
        return String::new();
    }

    if name.ends_with(SUFFIX) || name == &SUFFIX[1..] {
        name.to_string()
    } else {
        format!("{}{}", name, SUFFIX)
    }
}

/// Deterministic name derived from the coordinates alone
///
/// The hemisphere is part of the name: (35.07, -101.40) becomes
/// `site-3507n-10140w-wind-farm`.
pub fn coordinate_name(coordinates: Coordinates) -> String {
    let ns = if coordinates.lat < 0.0 { 's' } else { 'n' };
    let ew = if coordinates.lon < 0.0 { 'w' } else { 'e' };
    normalize(&format!(
        "site-{:.2}{}-{:.2}{}",
        coordinates.lat.abs(),
        ns,
        coordinates.lon.abs(),
        ew
    ))
}

/// Builds unique project names
#[derive(Clone)]
pub struct NameGenerator {
    store: ProjectStore,
    geocoder: Option<CachedGeocoder>,
    max_unique_attempts: u32,
}

impl NameGenerator {
    pub fn new(
        store: ProjectStore,
        geocoder: Option<CachedGeocoder>,
        max_unique_attempts: u32,
    ) -> Self {
        Self {
            store,
            geocoder,
            max_unique_attempts: max_unique_attempts.max(1),
        }
    }

    /// Unique name for a new project described by `query`
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the existing names cannot be listed. Lookup
    /// failures never surface; they fall back to the coordinate name.
    pub async fn from_query(
        &self,
        query: &str,
        coordinates: Option<Coordinates>,
    ) -> Result<String, EngineError> {
        let base = self.base_name(query, coordinates).await;
        let existing = self.store.names().await?;
        let name = self.ensure_unique(&base, &existing);

        debug!(base = %base, name = %name, "Generated project name");
        Ok(name)
    }

    /// Name before uniqueness is applied
    pub async fn base_name(&self, query: &str, coordinates: Option<Coordinates>) -> String {
        if let Some(name) = location_phrase(query)
            .map(|phrase| normalize(&phrase))
            .filter(|name| !name.is_empty())
        {
            return name;
        }

        let Some(coordinates) = coordinates else {
            return format!("project-{}{}", now_millis(), SUFFIX);
        };

        if let Some(geocoder) = &self.geocoder {
            if let Ok(Some(place)) = geocoder.lookup(coordinates).await {
                let name = normalize(&place);
                if !name.is_empty() {
                    return name;
                }
            }
        }

        coordinate_name(coordinates)
    }

    /// `base`, or the first free numbered variant of it
    ///
    /// Numbered variants (`amarillo-wind-farm-2`) run from 2 up to the
    /// configured attempt budget. Past that a timestamp suffix is used, and a
    /// random one if even that is taken.
    pub fn ensure_unique(&self, base: &str, existing: &[String]) -> String {
        let taken = |candidate: &str| existing.iter().any(|name| name.eq_ignore_ascii_case(candidate));

        if !taken(base) {
            return base.to_string();
        }

        for n in 2..=u64::from(self.max_unique_attempts) + 1 {
            let candidate = format!("{}-{}", base, n);
            if !taken(&candidate) {
                return candidate;
            }
        }

        let stamped = format!("{}-{}", base, chrono::Utc::now().format("%Y%m%d%H%M%S%3f"));
        if !taken(&stamped) {
            return stamped;
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", base, &id[..12])
    }
}
