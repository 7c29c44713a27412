//! Persistent knowledge graph: nouns and typed, weighted relations.
//!
//! The graph is the kernel's long-term memory. Nouns are unique by label;
//! relations are directed, typed from a closed vocabulary, and carry a
//! weight in [0, 1]. Everything is serialized as JSON records inside Sled.

mod store;

pub use store::{DuplicatePolicy, GraphStore};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Classification of a noun. `Unknown` is the default for labels the kernel
/// has not yet categorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NounType {
    Concept,
    Entity,
    Process,
    Property,
    Value,
    Context,
    Unknown,
}

impl NounType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::Entity => "entity",
            Self::Process => "process",
            Self::Property => "property",
            Self::Value => "value",
            Self::Context => "context",
            Self::Unknown => "unknown",
        }
    }
}

/// A vertex in the graph. Labels are lower-cased, trimmed, and unique per store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Noun {
    pub id: Uuid,
    pub label: String,
    pub noun_type: NounType,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// Unix timestamp (milliseconds) of creation.
    pub created_at: i64,
}

impl Noun {
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

/// The closed vocabulary of relation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    IsA,
    Has,
    Causes,
    PartOf,
    UsedFor,
    Opposes,
    Requires,
    Produces,
    Equals,
    GreaterThan,
    LessThan,
    Contains,
    Precedes,
    Follows,
    RelatesTo,
    ExampleOf,
    DefinedAs,
}

impl RelationType {
    pub const ALL: [RelationType; 17] = [
        Self::IsA,
        Self::Has,
        Self::Causes,
        Self::PartOf,
        Self::UsedFor,
        Self::Opposes,
        Self::Requires,
        Self::Produces,
        Self::Equals,
        Self::GreaterThan,
        Self::LessThan,
        Self::Contains,
        Self::Precedes,
        Self::Follows,
        Self::RelatesTo,
        Self::ExampleOf,
        Self::DefinedAs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsA => "is_a",
            Self::Has => "has",
            Self::Causes => "causes",
            Self::PartOf => "part_of",
            Self::UsedFor => "used_for",
            Self::Opposes => "opposes",
            Self::Requires => "requires",
            Self::Produces => "produces",
            Self::Equals => "equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Contains => "contains",
            Self::Precedes => "precedes",
            Self::Follows => "follows",
            Self::RelatesTo => "relates_to",
            Self::ExampleOf => "example_of",
            Self::DefinedAs => "defined_as",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, weighted edge between two nouns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: Uuid,
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub rel_type: RelationType,
    /// Strength in [0, 1].
    pub weight: f32,
    /// Optional context noun this edge was observed under (e.g. a subject).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<Uuid>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub created_at: i64,
}

impl Relation {
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

/// Filter half of a [`Pattern`]: match a noun by label and/or type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NounFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noun_type: Option<NounType>,
}

impl NounFilter {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            noun_type: None,
        }
    }

    fn matches(&self, noun: &Noun) -> bool {
        if let Some(label) = &self.label {
            if noun.label != *label {
                return false;
            }
        }
        if let Some(nt) = self.noun_type {
            if noun.noun_type != nt {
                return false;
            }
        }
        true
    }
}

/// Triple-pattern query: any combination of from/relation/to constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NounFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<RelationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NounFilter>,
}

impl Pattern {
    pub(crate) fn matches(&self, from: &Noun, relation: &Relation, to: &Noun) -> bool {
        if let Some(f) = &self.from {
            if !f.matches(from) {
                return false;
            }
        }
        if let Some(rt) = self.relation {
            if relation.rel_type != rt {
                return false;
            }
        }
        if let Some(t) = &self.to {
            if !t.matches(to) {
                return false;
            }
        }
        true
    }
}

/// One `query` result: the full joined triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTriple {
    pub from: Noun,
    pub relation: Relation,
    pub to: Noun,
}

/// One visited node in a bounded BFS traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalNode {
    pub noun: Noun,
    pub depth: usize,
    /// Labels along the path from the start noun, inclusive.
    pub path: Vec<String>,
}

/// Aggregate counts for the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nouns: usize,
    pub relations: usize,
    /// Edge count per relation type, for types with at least one edge.
    pub types: BTreeMap<String, usize>,
}
