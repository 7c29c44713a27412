//! The demon library: seven small pure reasoners and their registry.
//!
//! A demon consumes a read view of working memory and returns a mutation
//! plan plus a chain hint — it never writes memory itself. Demons whose
//! rules need the graph are constructed with an `Arc<GraphStore>`; only
//! `learn` is allowed to mutate it.

mod analogize;
mod decompose;
mod infer;
mod learn;
mod parse;
mod question;
mod relate;

pub use analogize::AnalogizeDemon;
pub use decompose::DecomposeDemon;
pub use infer::InferDemon;
pub use learn::LearnDemon;
pub use parse::ParseDemon;
pub use question::QuestionDemon;
pub use relate::RelateDemon;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::KernelResult;
use crate::graph::{GraphStore, Pattern};
use crate::memory::{EdgeFact, Intent, SlotContent, SlotDraft, Subject, Tag, WorkingMemory};

/// Identifier of a demon. Closed set; doubles as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemonId {
    Parse,
    Relate,
    Infer,
    Decompose,
    Analogize,
    Question,
    Learn,
}

impl DemonId {
    pub const ALL: [DemonId; 7] = [
        Self::Parse,
        Self::Relate,
        Self::Infer,
        Self::Decompose,
        Self::Analogize,
        Self::Question,
        Self::Learn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Relate => "relate",
            Self::Infer => "infer",
            Self::Decompose => "decompose",
            Self::Analogize => "analogize",
            Self::Question => "question",
            Self::Learn => "learn",
        }
    }
}

impl std::fmt::Display for DemonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a demon is eligible to run. Under chain-only scheduling the
/// hypervisor consults only `NewInput`; the rest document intent and feed
/// nothing mid-turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    NewInput,
    ChainFrom(DemonId),
    TagPresent(Tag),
    TagAbsent(Tag),
    TickInterval(u64),
    Always,
}

/// Side requests a demon can attach to its plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Terminal user-visible reply.
    Respond(String),
    /// A guiding question; treated as a response for user-visible purposes.
    Ask(String),
    /// Opaque request to persist a noun and some edges.
    Store { noun: String, relations: Vec<EdgeFact> },
    /// Diagnostic graph query.
    Query(Pattern),
    Log(String),
}

impl Action {
    /// The user-visible text, if this action carries one.
    pub fn response_text(&self) -> Option<&str> {
        match self {
            Self::Respond(text) | Self::Ask(text) => Some(text),
            _ => None,
        }
    }
}

/// A demon's full result: memory mutations, side actions, and the ordered
/// list of demons it wants enlisted next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemonOutput {
    pub writes: Vec<SlotDraft>,
    pub evict: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<Vec<Uuid>>,
    pub actions: Vec<Action>,
    pub chain: Vec<DemonId>,
}

impl DemonOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A pure reasoner over working memory.
pub trait Demon: Send + Sync {
    fn id(&self) -> DemonId;

    fn name(&self) -> &str {
        self.id().as_str()
    }

    fn description(&self) -> &str;

    fn triggers(&self) -> Vec<Trigger>;

    /// Runs the demon against a memory snapshot. `chained_from` names the
    /// demon whose chain hint enlisted this run, when there is one.
    fn run(
        &self,
        memory: &WorkingMemory,
        chained_from: Option<DemonId>,
    ) -> KernelResult<DemonOutput>;
}

/// Descriptor for `list_demons`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemonDescriptor {
    pub id: DemonId,
    pub name: String,
    pub description: String,
}

/// Registry of demons dispatched by id.
pub struct DemonRegistry {
    demons: Vec<Arc<dyn Demon>>,
}

impl DemonRegistry {
    pub fn new() -> Self {
        Self { demons: Vec::new() }
    }

    pub fn register(&mut self, demon: Arc<dyn Demon>) {
        self.demons.push(demon);
    }

    pub fn get(&self, id: DemonId) -> Option<Arc<dyn Demon>> {
        self.demons.iter().find(|d| d.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.demons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.demons.is_empty()
    }

    /// Ids of demons declaring a given trigger.
    pub fn with_trigger(&self, trigger: &Trigger) -> Vec<DemonId> {
        self.demons
            .iter()
            .filter(|d| d.triggers().contains(trigger))
            .map(|d| d.id())
            .collect()
    }

    pub fn descriptors(&self) -> Vec<DemonDescriptor> {
        self.demons
            .iter()
            .map(|d| DemonDescriptor {
                id: d.id(),
                name: d.name().to_string(),
                description: d.description().to_string(),
            })
            .collect()
    }
}

impl Default for DemonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the standard seven-demon registry against one graph handle.
pub fn default_registry(graph: Arc<GraphStore>) -> DemonRegistry {
    let mut registry = DemonRegistry::new();
    registry.register(Arc::new(ParseDemon::new()));
    registry.register(Arc::new(RelateDemon::new(Arc::clone(&graph))));
    registry.register(Arc::new(InferDemon::new()));
    registry.register(Arc::new(DecomposeDemon::new(Arc::clone(&graph))));
    registry.register(Arc::new(AnalogizeDemon::new(Arc::clone(&graph))));
    registry.register(Arc::new(QuestionDemon::new()));
    registry.register(Arc::new(LearnDemon::new(graph)));
    registry
}

// Shared read helpers over memory snapshots, used by several demons.

pub(crate) fn current_intent(memory: &WorkingMemory) -> Option<Intent> {
    match memory.latest_by_tag(&Tag::Intent)?.content {
        SlotContent::Intent(intent) => Some(intent),
        _ => None,
    }
}

pub(crate) fn current_subject(memory: &WorkingMemory) -> Option<Subject> {
    match memory.latest_by_tag(&Tag::Subject)?.content {
        SlotContent::Subject(subject) => Some(subject),
        _ => None,
    }
}

pub(crate) fn question_focus(memory: &WorkingMemory) -> Option<String> {
    match &memory.latest_by_tag(&Tag::QuestionFocus)?.content {
        SlotContent::QuestionFocus(focus) => Some(focus.clone()),
        _ => None,
    }
}

pub(crate) fn noun_phrases(memory: &WorkingMemory) -> Vec<String> {
    memory
        .find_by_tag(&Tag::NounPhrase)
        .into_iter()
        .filter_map(|s| match &s.content {
            SlotContent::NounPhrase(p) => Some(p.clone()),
            _ => None,
        })
        .collect()
}

/// Focus target for demons that decompose or analogize: the question focus,
/// else the latest noun phrase.
pub(crate) fn focus_concept(memory: &WorkingMemory) -> Option<String> {
    question_focus(memory).or_else(|| {
        match &memory.latest_by_tag(&Tag::NounPhrase)?.content {
            SlotContent::NounPhrase(p) => Some(p.clone()),
            _ => None,
        }
    })
}

pub(crate) fn edge_facts(memory: &WorkingMemory, tag: &Tag) -> Vec<EdgeFact> {
    memory
        .find_by_tag(tag)
        .into_iter()
        .filter_map(|s| match &s.content {
            SlotContent::Relation(e)
            | SlotContent::ContextFact(e)
            | SlotContent::InferredRelation(e) => Some(e.clone()),
            _ => None,
        })
        .collect()
}
