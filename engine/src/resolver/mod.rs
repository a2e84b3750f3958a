//! Project resolution
//!
//! Decides which project a request is about. Rules are tried in order:
//!
//! 1. **Explicit**: the query names a stored project.
//! 2. **Partial**: a word of the query is a whole segment of stored project
//!    names ("texas" in `west-texas-wind-farm`, never "out" in `southwest-..`).
//! 3. **Implicit**: the session has an active project and the query either
//!    refers back to it ("continue", "that project") or does not describe a
//!    new site.
//! 4. **New**: the query carries coordinates or a location phrase.
//!
//! An explicit full-name match always beats partial matches, and partial
//! matches only resolve when they narrow to a single name.

use crate::intent::{extract_coordinates, normalize_query};
use crate::naming::{location_phrase, NameGenerator};
use crate::project::ProjectStore;
use crate::session::SessionContext;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;
use vane_sdk::errors::EngineError;

/// Which project a request refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// An existing project (or the session's active one)
    Resolved(String),
    /// A new project under a freshly generated name
    New(String),
    /// Several projects match; the user has to pick
    Ambiguous(Vec<String>),
    /// Nothing to go on
    None,
}

impl ResolutionOutcome {
    pub fn project_name(&self) -> Option<&str> {
        match self {
            ResolutionOutcome::Resolved(name) | ResolutionOutcome::New(name) => Some(name),
            _ => None,
        }
    }
}

/// Words never used as partial-name fragments
const STOP_WORDS: &[&str] = &[
    "wind", "farm", "farms", "project", "projects", "site", "the", "and", "for", "with", "near",
    "from", "into", "that", "this", "same", "please", "can", "you", "then", "now", "run", "start",
    "analyze", "analyse", "analysis", "assess", "terrain", "layout", "optimize", "optimise",
    "optimization", "design", "simulation", "simulate", "wake", "report", "generate", "create",
    "new", "show", "list", "status", "details", "units", "unit", "turbines", "turbine", "model",
    "using", "continue", "again", "what", "about", "let", "lets", "let's", "next", "step",
];

static CONTINUATION: OnceLock<Regex> = OnceLock::new();

fn continuation_pattern() -> &'static Regex {
    CONTINUATION.get_or_init(|| {
        Regex::new(
            r"\b(continue|proceed|next step|go on|keep going|that project|this project|same project|the project|current project|the layout|the terrain|the simulation|the results|it|its|them)\b",
        )
        .expect("Invalid continuation pattern")
    })
}

/// Whether `name` occurs in `haystack` bounded by non-name characters
fn contains_name(haystack: &str, name: &str) -> bool {
    let is_name_char = |c: char| c.is_ascii_alphanumeric() || c == '-';

    haystack.match_indices(name).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(is_name_char) && !after.is_some_and(is_name_char)
    })
}

/// Whether `fragment` covers whole hyphen-delimited segments of `name`
fn on_segments(name: &str, fragment: &str) -> bool {
    name.match_indices(fragment).any(|(start, matched)| {
        let before = name[..start].chars().next_back();
        let after = name[start + matched.len()..].chars().next();
        !before.is_some_and(|c| c != '-') && !after.is_some_and(|c| c != '-')
    })
}

/// Fragments of the query worth looking up as partial names
fn fragments(normalized: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    normalized
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .map(|word| word.trim_matches('-'))
        .filter(|word| word.len() >= 3)
        .filter(|word| word.chars().any(|c| c.is_ascii_alphabetic()))
        .filter(|word| !STOP_WORDS.contains(word))
        .filter(|word| seen.insert(word.to_string()))
        .map(str::to_string)
        .collect()
}

/// Resolves requests to projects
#[derive(Clone)]
pub struct ProjectResolver {
    store: ProjectStore,
    sessions: SessionContext,
    names: NameGenerator,
}

impl ProjectResolver {
    pub fn new(store: ProjectStore, sessions: SessionContext, names: NameGenerator) -> Self {
        Self {
            store,
            sessions,
            names,
        }
    }

    pub async fn resolve(
        &self,
        query: &str,
        session_id: &str,
    ) -> Result<ResolutionOutcome, EngineError> {
        let normalized = normalize_query(query);
        let existing = self.store.names().await?;

        // 1. Explicit, either as written or with spaces for hyphens
        let explicit: BTreeSet<&String> = existing
            .iter()
            .filter(|name| {
                let name = name.to_lowercase();
                contains_name(&normalized, &name)
                    || contains_name(&normalized, &name.replace('-', " "))
            })
            .collect();
        let explicit = drop_contained(explicit);

        match explicit.len() {
            0 => {}
            1 => {
                let name = explicit[0].clone();
                debug!(project = %name, "Resolved by explicit name");
                return Ok(ResolutionOutcome::Resolved(name));
            }
            _ => {
                debug!(candidates = ?explicit, "Several explicit names");
                return Ok(ResolutionOutcome::Ambiguous(explicit));
            }
        }

        let coordinates = extract_coordinates(&normalized);
        let phrase = location_phrase(&normalized);
        let describes_new_site = coordinates.is_some() || phrase.is_some();

        // 2. Partial
        let mut match_sets: Vec<BTreeSet<String>> = Vec::new();
        let mut unmatched = BTreeSet::new();
        for fragment in fragments(&normalized) {
            let matches: BTreeSet<String> = self
                .store
                .find_by_partial_name(&fragment)
                .await?
                .into_iter()
                .filter(|name| on_segments(&name.to_lowercase(), &fragment))
                .collect();
            if matches.is_empty() {
                unmatched.insert(fragment);
            } else {
                match_sets.push(matches);
            }
        }

        // "east texas" while only west-texas exists names a different site
        let names_other_site = phrase
            .as_deref()
            .is_some_and(|p| fragments(p).iter().any(|f| unmatched.contains(f)));

        if let (Some(first), false) = (match_sets.first(), names_other_site) {
            let intersection: BTreeSet<String> = match_sets[1..]
                .iter()
                .fold(first.clone(), |acc, set| acc.intersection(set).cloned().collect());

            let candidates: Vec<String> = if intersection.is_empty() {
                match_sets.iter().flatten().cloned().collect::<BTreeSet<_>>().into_iter().collect()
            } else {
                intersection.into_iter().collect()
            };

            if let [name] = candidates.as_slice() {
                debug!(project = %name, "Resolved by partial name");
                return Ok(ResolutionOutcome::Resolved(name.clone()));
            }
            debug!(candidates = ?candidates, "Ambiguous partial name");
            return Ok(ResolutionOutcome::Ambiguous(candidates));
        }

        // 3. Implicit
        if let Some(active) = self.sessions.get_active(session_id).await {
            if continuation_pattern().is_match(&normalized) || !describes_new_site {
                debug!(project = %active, session = session_id, "Resolved to active project");
                return Ok(ResolutionOutcome::Resolved(active));
            }
        }

        // 4. New
        if describes_new_site {
            let name = self.names.from_query(query, coordinates).await?;
            debug!(project = %name, "New project");
            return Ok(ResolutionOutcome::New(name));
        }

        Ok(ResolutionOutcome::None)
    }
}

/// Keep only names that are not part of another matched name
///
/// "texas-wind-farm" also occurs inside "west-texas-wind-farm"; if the query
/// contains the longer name it means the longer one.
fn drop_contained(names: BTreeSet<&String>) -> Vec<String> {
    names
        .iter()
        .filter(|name| {
            !names
                .iter()
                .any(|other| other.len() > name.len() && other.contains(name.as_str()))
        })
        .map(|name| name.to_string())
        .collect()
}
