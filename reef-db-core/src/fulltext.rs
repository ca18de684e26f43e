//! Full-text search seam
//!
//! The stage builder materializes an `FtsMatcher` at build time from the
//! index catalog and embeds it into the compiled plan as a constant; the
//! matching itself runs in the executor.

use serde::{Deserialize, Serialize};

/// Full-text index specification, stored on the index's access method
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FtsSpec {
    /// Default analysis language, e.g. `english`
    pub language: String,
    /// Per-field weights in index order
    pub weights: Vec<(String, i32)>,
}

impl FtsSpec {
    /// Spec over `fields`, each with weight 1
    pub fn simple(language: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            language: language.into(),
            weights: fields.iter().map(|f| (f.to_string(), 1)).collect(),
        }
    }
}

/// A text-search predicate as produced by the upstream planner.
///
/// Only the parsed shape can be compiled; `Unparsed` stands in for
/// placeholder predicates that never reach the builder in a valid plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TextQuery {
    /// Fully parsed search terms
    Parsed {
        terms: Vec<String>,
        language: String,
        case_sensitive: bool,
    },
    /// Raw, unparsed query string (not compilable)
    Unparsed(String),
}

impl TextQuery {
    /// Parsed query over whitespace-split `search` terms
    pub fn parse(search: &str, language: impl Into<String>) -> Self {
        TextQuery::Parsed {
            terms: search.split_whitespace().map(str::to_string).collect(),
            language: language.into(),
            case_sensitive: false,
        }
    }
}

/// Build-time-materialized matcher pairing a parsed query with its index spec
#[derive(Clone, Debug, PartialEq)]
pub struct FtsMatcher {
    pub terms: Vec<String>,
    pub language: String,
    pub case_sensitive: bool,
    pub spec: FtsSpec,
}

impl FtsMatcher {
    /// Pair a parsed query with the index spec it will run against
    pub fn new(terms: Vec<String>, language: String, case_sensitive: bool, spec: FtsSpec) -> Self {
        Self {
            terms,
            language,
            case_sensitive,
            spec,
        }
    }
}
