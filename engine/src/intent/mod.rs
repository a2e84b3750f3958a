//! Intent classification
//!
//! Maps a free-text request onto one pipeline step (or a read-only project
//! query) and extracts the typed parameters the step workers accept.
//!
//! The rule table is static data. Each rule carries an explicit priority and
//! the table is sorted by it once, when the classifier is built; the first
//! matching rule wins. Compound phrasings sit at low numbers so that
//! "generate a report on the layout" is a report request, not a layout one.
//!
//! # Examples
//!
//! ```
//! use vane_engine::intent::{Intent, IntentClassifier};
//! use vane_sdk::types::StepKind;
//!
//! let classifier = IntentClassifier::new();
//! let classification = classifier.classify("optimize layout with 10 units");
//! assert_eq!(classification.intent, Some(Intent::Step(StepKind::Layout)));
//! assert_eq!(classification.parameters["unit_count"], 10);
//! ```

use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use vane_sdk::types::{Coordinates, StepKind};

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Run one pipeline step
    Step(StepKind),
    /// List stored projects
    ListProjects,
    /// Describe one project
    ShowProject,
}

impl Intent {
    pub fn step(&self) -> Option<StepKind> {
        match self {
            Intent::Step(step) => Some(*step),
            _ => None,
        }
    }

    /// Read-only queries are answered from storage without any worker
    pub fn is_read_only(&self) -> bool {
        !matches!(self, Intent::Step(_))
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Step(step) => write!(f, "{}", step),
            Intent::ListProjects => f.write_str("list_projects"),
            Intent::ShowProject => f.write_str("show_project"),
        }
    }
}

/// One row of the rule table
struct Rule {
    priority: u16,
    intent: Intent,
    pattern: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        priority: 1,
        intent: Intent::ListProjects,
        pattern: r"\b(list|show|what are|which)\b.*\bprojects\b|\bmy projects\b|^projects$",
    },
    // Compound phrasings
    Rule {
        priority: 10,
        intent: Intent::Step(StepKind::Report),
        pattern: r"\b(generate|create|write|produce|build|make|export)\b.*\breport\b",
    },
    Rule {
        priority: 20,
        intent: Intent::Step(StepKind::Simulation),
        pattern: r"\b(run|perform|execute|start|do)\b.*\b(wake|energy yield|aep|simulation|simulate)\b|\bwake\s+(simulation|analysis|model)\b",
    },
    Rule {
        priority: 30,
        intent: Intent::Step(StepKind::Layout),
        pattern: r"\b(optimi[sz]e|design|generate|place|plan|arrange)\b.*\b(layout|turbines?|units?)\b|\blayout\s+optimi[sz]ation\b",
    },
    Rule {
        priority: 40,
        intent: Intent::Step(StepKind::Terrain),
        pattern: r"\b(analy[sz]e|assess|survey|evaluate|study)\b.*\b(terrain|site|elevation|slope|land)\b|\bterrain\s+analysis\b",
    },
    // Read-only project detail
    Rule {
        priority: 60,
        intent: Intent::ShowProject,
        pattern: r"\b(show|describe|details?|status|summari[sz]e)\b.*\bproject\b|\bproject\s+(details|status|summary)\b",
    },
    // Single keywords
    Rule {
        priority: 70,
        intent: Intent::Step(StepKind::Report),
        pattern: r"\breport\b",
    },
    Rule {
        priority: 75,
        intent: Intent::Step(StepKind::Simulation),
        pattern: r"\b(simulat\w*|wake)\b",
    },
    Rule {
        priority: 80,
        intent: Intent::Step(StepKind::Layout),
        pattern: r"\blayout\b",
    },
    Rule {
        priority: 85,
        intent: Intent::Step(StepKind::Terrain),
        pattern: r"\b(terrain|elevation|topography)\b",
    },
];

struct CompiledRule {
    priority: u16,
    intent: Intent,
    regex: Regex,
}

/// Typed parameter patterns, compiled once
struct ParameterPatterns {
    coordinate_pair: Regex,
    labeled_coordinates: Regex,
    unit_count: Regex,
    unit_capacity: Regex,
    wake_model: Regex,
    report_format: Regex,
}

static PARAMETER_PATTERNS: OnceLock<ParameterPatterns> = OnceLock::new();

fn parameter_patterns() -> &'static ParameterPatterns {
    PARAMETER_PATTERNS.get_or_init(|| ParameterPatterns {
        // "35.07, -101.40"
        coordinate_pair: Regex::new(
            r"(?:^|[^\w.-])(-?\d{1,2}(?:\.\d+)?)\s*,\s*(-?\d{1,3}(?:\.\d+)?)\b",
        )
        .expect("Invalid coordinate pair pattern"),
        // "lat 35.07 lon -101.40"
        labeled_coordinates: Regex::new(
            r"\blat(?:itude)?\s*[:=]?\s*(-?\d{1,2}(?:\.\d+)?)[\s,;]+lon(?:g|gitude)?\s*[:=]?\s*(-?\d{1,3}(?:\.\d+)?)\b",
        )
        .expect("Invalid labeled coordinate pattern"),
        unit_count: Regex::new(r"\b(\d{1,4})\s*(?:wind\s+)?(?:units?|turbines?)\b")
            .expect("Invalid unit count pattern"),
        unit_capacity: Regex::new(r"\b(\d{1,3}(?:\.\d+)?)\s*-?\s*mw\b")
            .expect("Invalid unit capacity pattern"),
        wake_model: Regex::new(r"\b(jensen|park|bastankhah|gaussian|turbopark|larsen|floris)\b")
            .expect("Invalid wake model pattern"),
        report_format: Regex::new(r"\b(pdf|html|markdown|md|docx|csv)\b")
            .expect("Invalid report format pattern"),
    })
}

/// Lowercase, trim and collapse whitespace
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Extract a range-checked coordinate pair from free text
pub fn extract_coordinates(query: &str) -> Option<Coordinates> {
    let normalized = normalize_query(query);
    let patterns = parameter_patterns();

    [&patterns.labeled_coordinates, &patterns.coordinate_pair]
        .iter()
        .flat_map(|regex| regex.captures_iter(&normalized).collect::<Vec<_>>())
        .find_map(|caps| {
            let lat = caps.get(1)?.as_str().parse::<f64>().ok()?;
            let lon = caps.get(2)?.as_str().parse::<f64>().ok()?;
            Coordinates::new(lat, lon)
        })
}

/// Result of classifying one request
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Option<Intent>,
    pub parameters: BTreeMap<String, Value>,
}

/// Rule-table classifier
pub struct IntentClassifier {
    rules: Vec<CompiledRule>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    /// Compile the rule table, ordered by priority
    pub fn new() -> Self {
        let mut rules: Vec<CompiledRule> = RULES
            .iter()
            .map(|rule| CompiledRule {
                priority: rule.priority,
                intent: rule.intent,
                regex: Regex::new(rule.pattern).expect("Invalid intent pattern"),
            })
            .collect();
        rules.sort_by_key(|rule| rule.priority);

        Self { rules }
    }

    /// Intents in the order they are tried
    pub fn priority_order(&self) -> Vec<(u16, Intent)> {
        self.rules
            .iter()
            .map(|rule| (rule.priority, rule.intent))
            .collect()
    }

    pub fn classify(&self, query: &str) -> Classification {
        let normalized = normalize_query(query);

        let intent = self
            .rules
            .iter()
            .find(|rule| rule.regex.is_match(&normalized))
            .map(|rule| rule.intent);

        Classification {
            intent,
            parameters: extract_parameters(&normalized),
        }
    }
}

fn extract_parameters(normalized: &str) -> BTreeMap<String, Value> {
    let patterns = parameter_patterns();
    let mut parameters = BTreeMap::new();

    if let Some(coordinates) = extract_coordinates(normalized) {
        parameters.insert(
            "coordinates".to_string(),
            json!({"lat": coordinates.lat, "lon": coordinates.lon}),
        );
    }

    if let Some(count) = patterns
        .unit_count
        .captures(normalized)
        .and_then(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
        .filter(|count| *count > 0)
    {
        parameters.insert("unit_count".to_string(), json!(count));
    }

    if let Some(capacity) = patterns
        .unit_capacity
        .captures(normalized)
        .and_then(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .filter(|capacity| *capacity > 0.0)
    {
        parameters.insert("unit_capacity_mw".to_string(), json!(capacity));
    }

    if let Some(model) = patterns.wake_model.captures(normalized) {
        parameters.insert("wake_model".to_string(), json!(&model[1]));
    }

    if let Some(format) = patterns.report_format.captures(normalized) {
        let format = match &format[1] {
            "md" => "markdown",
            other => other,
        };
        parameters.insert("report_format".to_string(), json!(format));
    }

    parameters
}

/// Read coordinates back out of a parameter map
pub fn coordinates_param(parameters: &BTreeMap<String, Value>) -> Option<Coordinates> {
    let value = parameters.get("coordinates")?;
    Coordinates::new(value.get("lat")?.as_f64()?, value.get("lon")?.as_f64()?)
}
