//! Keyword-table query classifier.
//!
//! Classification is case-insensitive substring matching of the query
//! against one keyword list per [`IntentTag`]. Every tag is evaluated
//! independently, so a query can carry several tags at once. The lists live
//! in a [`KeywordTable`] value rather than in conditionals so that the
//! configuration layer can replace any of them.
//!
//! A single [`Route`] is then picked from the tags with a fixed precedence:
//!
//! | Route | Condition |
//! |-------|-----------|
//! | `calculation` | `calculation` tag and the query mentions fluid |
//! | `pediatric` | `pediatric` tag |
//! | `emergency` | `emergency` or `critical` tag |
//! | `follow_up` | `follow_up` tag |
//! | `general` | anything else, including empty queries |

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::text::contains_any;

/// Fixed intent vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
    Emergency,
    Pediatric,
    Critical,
    FollowUp,
    Calculation,
    GeneralNursing,
}

impl IntentTag {
    pub const ALL: [IntentTag; 6] = [
        IntentTag::Emergency,
        IntentTag::Pediatric,
        IntentTag::Critical,
        IntentTag::FollowUp,
        IntentTag::Calculation,
        IntentTag::GeneralNursing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentTag::Emergency => "emergency",
            IntentTag::Pediatric => "pediatric",
            IntentTag::Critical => "critical",
            IntentTag::FollowUp => "follow_up",
            IntentTag::Calculation => "calculation",
            IntentTag::GeneralNursing => "general_nursing",
        }
    }
}

impl fmt::Display for IntentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IntentTag::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown intent tag '{}'", s))
    }
}

/// The set of tags that fired for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryIntent(BTreeSet<IntentTag>);

impl QueryIntent {
    pub fn contains(&self, tag: IntentTag) -> bool {
        self.0.contains(&tag)
    }

    pub fn insert(&mut self, tag: IntentTag) {
        self.0.insert(tag);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = IntentTag> + '_ {
        self.0.iter().copied()
    }

    /// `emergency` or `critical` is set.
    pub fn is_urgent(&self) -> bool {
        self.contains(IntentTag::Emergency) || self.contains(IntentTag::Critical)
    }
}

impl FromIterator<IntentTag> for QueryIntent {
    fn from_iter<I: IntoIterator<Item = IntentTag>>(iter: I) -> Self {
        QueryIntent(iter.into_iter().collect())
    }
}

/// The single processing path chosen for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Calculation,
    Pediatric,
    Emergency,
    FollowUp,
    General,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Calculation => "calculation",
            Route::Pediatric => "pediatric",
            Route::Emergency => "emergency",
            Route::FollowUp => "follow_up",
            Route::General => "general",
        }
    }
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub intent: QueryIntent,
    pub is_follow_up: bool,
    pub route: Route,
}

/// One row of the keyword table.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordRule {
    pub tag: IntentTag,
    /// Lower-case keywords; any one contained in the query fires the tag.
    pub keywords: Vec<String>,
}

/// Ordered `(tag, keywords)` table.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordTable {
    rules: Vec<KeywordRule>,
}

const EMERGENCY: &[&str] = &[
    "emergency",
    "cardiac arrest",
    "anaphylaxis",
    "shock",
    "seizure",
    "respiratory failure",
    "code blue",
    "cpr",
    "resuscitation",
    "critical",
    "poisoning",
    "overdose",
    "paracetamol",
    "abcde",
    "unconscious",
];

const PEDIATRIC: &[&str] = &[
    "pediatric",
    "paediatric",
    "child",
    "infant",
    "neonate",
    "toddler",
    "baby",
    "newborn",
    "adolescent",
    "vital signs",
    "heart rate",
    "blood pressure",
    "respiratory rate",
    "temperature",
    "normal range",
    "neonatal",
];

const CRITICAL: &[&str] = &[
    "critically ill",
    "critical illness",
    "recognise",
    "recognize",
    "emergency",
    "medical attention",
];

const FOLLOW_UP: &[&str] = &[
    "what are the",
    "how do i",
    "when should i",
    "how to",
    "what is the",
    "what are normal",
    "how often should",
    "when to",
    "how deep should",
    "what complications",
    "how to assess",
    "when to escalate",
];

const CALCULATION: &[&str] = &["calculate", "fluid", "weight", "dosage"];

const GENERAL_NURSING: &[&str] = &[
    "hand hygiene",
    "medication administration",
    "five rights",
    "infection control",
    "isolation",
    "ppe",
    "documentation",
];

impl Default for KeywordTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KeywordTable {
    /// The built-in keyword lists.
    pub fn builtin() -> Self {
        let row = |tag, words: &[&str]| KeywordRule {
            tag,
            keywords: words.iter().map(|w| w.to_string()).collect(),
        };
        Self {
            rules: vec![
                row(IntentTag::Emergency, EMERGENCY),
                row(IntentTag::Pediatric, PEDIATRIC),
                row(IntentTag::Critical, CRITICAL),
                row(IntentTag::FollowUp, FOLLOW_UP),
                row(IntentTag::Calculation, CALCULATION),
                row(IntentTag::GeneralNursing, GENERAL_NURSING),
            ],
        }
    }

    /// Replace the keyword list for `tag`. Keywords are lower-cased and
    /// blank entries dropped.
    pub fn set(&mut self, tag: IntentTag, keywords: &[String]) {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        match self.rules.iter_mut().find(|r| r.tag == tag) {
            Some(rule) => rule.keywords = keywords,
            None => self.rules.push(KeywordRule { tag, keywords }),
        }
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    pub fn keywords(&self, tag: IntentTag) -> &[String] {
        self.rules
            .iter()
            .find(|r| r.tag == tag)
            .map(|r| r.keywords.as_slice())
            .unwrap_or(&[])
    }

    /// `true` when `text` contains any keyword of `tag`.
    pub fn matches(&self, tag: IntentTag, text: &str) -> bool {
        contains_any(&text.to_lowercase(), self.keywords(tag))
    }

    pub fn classify(&self, query: &str) -> Classification {
        let lower = query.trim().to_lowercase();
        if lower.is_empty() {
            return Classification {
                intent: QueryIntent::default(),
                is_follow_up: false,
                route: Route::General,
            };
        }

        let intent: QueryIntent = self
            .rules
            .iter()
            .filter(|r| contains_any(&lower, &r.keywords))
            .map(|r| r.tag)
            .collect();

        let route = if intent.contains(IntentTag::Calculation) && lower.contains("fluid") {
            Route::Calculation
        } else if intent.contains(IntentTag::Pediatric) {
            Route::Pediatric
        } else if intent.is_urgent() {
            Route::Emergency
        } else if intent.contains(IntentTag::FollowUp) {
            Route::FollowUp
        } else {
            Route::General
        };

        Classification {
            is_follow_up: intent.contains(IntentTag::FollowUp),
            intent,
            route,
        }
    }
}
