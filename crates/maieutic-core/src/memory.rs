//! Working memory: the transient, tagged scratchpad the demons reason over.
//!
//! Slots carry a semantic tag from a closed vocabulary, a confidence, and a
//! TTL measured in ticks (`0` = lives to the end-of-turn sweep). The memory
//! keeps an ordered focus list and a monotonic tick counter; slots are never
//! persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::demons::DemonId;
use crate::error::KernelResult;
use crate::graph::RelationType;
use crate::shared::now_ms;

/// Semantic role of a slot. Closed vocabulary; unrecognized tags round-trip
/// through [`Tag::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tag {
    RawInput,
    Intent,
    Subject,
    NounPhrase,
    QuestionFocus,
    Relation,
    ContextFact,
    Hierarchy,
    InferredRelation,
    Contradiction,
    ClaimAssessment,
    UnknownConcepts,
    Decomposition,
    Prerequisites,
    KnowledgeGaps,
    Examples,
    SolutionSteps,
    SimplificationNeeded,
    Analogy,
    FuzzyMatch,
    Response,
    StudentTopic,
    StudentConfusion,
    Other(String),
}

impl Tag {
    pub fn as_str(&self) -> &str {
        match self {
            Self::RawInput => "raw_input",
            Self::Intent => "intent",
            Self::Subject => "subject",
            Self::NounPhrase => "noun_phrase",
            Self::QuestionFocus => "question_focus",
            Self::Relation => "relation",
            Self::ContextFact => "context_fact",
            Self::Hierarchy => "hierarchy",
            Self::InferredRelation => "inferred_relation",
            Self::Contradiction => "contradiction",
            Self::ClaimAssessment => "claim_assessment",
            Self::UnknownConcepts => "unknown_concepts",
            Self::Decomposition => "decomposition",
            Self::Prerequisites => "prerequisites",
            Self::KnowledgeGaps => "knowledge_gaps",
            Self::Examples => "examples",
            Self::SolutionSteps => "solution_steps",
            Self::SimplificationNeeded => "simplification_needed",
            Self::Analogy => "analogy",
            Self::FuzzyMatch => "fuzzy_match",
            Self::Response => "response",
            Self::StudentTopic => "student_topic",
            Self::StudentConfusion => "student_confusion",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        match s.as_str() {
            "raw_input" => Self::RawInput,
            "intent" => Self::Intent,
            "subject" => Self::Subject,
            "noun_phrase" => Self::NounPhrase,
            "question_focus" => Self::QuestionFocus,
            "relation" => Self::Relation,
            "context_fact" => Self::ContextFact,
            "hierarchy" => Self::Hierarchy,
            "inferred_relation" => Self::InferredRelation,
            "contradiction" => Self::Contradiction,
            "claim_assessment" => Self::ClaimAssessment,
            "unknown_concepts" => Self::UnknownConcepts,
            "decomposition" => Self::Decomposition,
            "prerequisites" => Self::Prerequisites,
            "knowledge_gaps" => Self::KnowledgeGaps,
            "examples" => Self::Examples,
            "solution_steps" => Self::SolutionSteps,
            "simplification_needed" => Self::SimplificationNeeded,
            "analogy" => Self::Analogy,
            "fuzzy_match" => Self::FuzzyMatch,
            "response" => Self::Response,
            "student_topic" => Self::StudentTopic,
            "student_confusion" => Self::StudentConfusion,
            _ => Self::Other(s),
        }
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.as_str().to_string()
    }
}

/// What the user is doing with this utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Question,
    Request,
    Confusion,
    Correction,
    Claim,
    Unknown,
}

/// Subject bucket the utterance most likely belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Mathematics,
    Physics,
    Chemistry,
    Biology,
    History,
    Language,
    ComputerScience,
    Geography,
    Economics,
    General,
}

impl Subject {
    pub const ALL: [Subject; 10] = [
        Self::Mathematics,
        Self::Physics,
        Self::Chemistry,
        Self::Biology,
        Self::History,
        Self::Language,
        Self::ComputerScience,
        Self::Geography,
        Self::Economics,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mathematics => "mathematics",
            Self::Physics => "physics",
            Self::Chemistry => "chemistry",
            Self::Biology => "biology",
            Self::History => "history",
            Self::Language => "language",
            Self::ComputerScience => "computer_science",
            Self::Geography => "geography",
            Self::Economics => "economics",
            Self::General => "general",
        }
    }
}

/// An edge expressed at working-memory level, by label rather than id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeFact {
    pub from: String,
    pub rel_type: RelationType,
    pub to: String,
    pub weight: f32,
}

/// One `is_a` hop found while climbing a concept's ancestry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyFact {
    pub child: String,
    pub parent: String,
    pub weight: f32,
}

/// Two claims about the same concept that cannot both hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub concept: String,
    pub claim1: String,
    pub claim2: String,
    pub reason: String,
}

/// How well a user claim is supported by what the graph already holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimAssessment {
    pub supported: Vec<EdgeFact>,
    pub weak: Vec<EdgeFact>,
    pub unsupported: Vec<String>,
    pub confidence: f32,
}

/// A concept broken into named parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub concept: String,
    pub parts: Vec<String>,
}

/// Prerequisites of a concept, with the subset the student has not touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prerequisites {
    pub concept: String,
    pub prerequisites: Vec<String>,
    pub gaps: Vec<String>,
}

/// A source-to-analog mapping for one shared outgoing relation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogyMapping {
    pub rel_type: RelationType,
    pub concept_target: String,
    pub analog_target: String,
}

/// A comparison the question demon can hand to the student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analogy {
    pub concept: String,
    pub analog: String,
    pub explanation: String,
    pub similarity: f32,
    #[serde(default)]
    pub shared_types: Vec<RelationType>,
    #[serde(default)]
    pub mapping: Vec<AnalogyMapping>,
}

/// Slot payload, one variant per recognized tag. Unknown tags carry their
/// original JSON in [`SlotContent::Raw`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotContent {
    RawInput(String),
    Intent(Intent),
    Subject(Subject),
    NounPhrase(String),
    QuestionFocus(String),
    Relation(EdgeFact),
    ContextFact(EdgeFact),
    Hierarchy(HierarchyFact),
    InferredRelation(EdgeFact),
    Contradiction(Contradiction),
    ClaimAssessment(ClaimAssessment),
    UnknownConcepts(Vec<String>),
    Decomposition(Decomposition),
    Prerequisites(Prerequisites),
    KnowledgeGaps(Vec<String>),
    Examples(Vec<String>),
    SolutionSteps(Vec<String>),
    SimplificationNeeded(String),
    Analogy(Analogy),
    FuzzyMatch { query: String, resolved: String },
    Response(String),
    StudentTopic(String),
    StudentConfusion(String),
    Raw(serde_json::Value),
}

impl SlotContent {
    /// The tag this content naturally belongs under. `Raw` defaults to an
    /// opaque tag and is normally paired with an explicit one on the draft.
    pub fn tag(&self) -> Tag {
        match self {
            Self::RawInput(_) => Tag::RawInput,
            Self::Intent(_) => Tag::Intent,
            Self::Subject(_) => Tag::Subject,
            Self::NounPhrase(_) => Tag::NounPhrase,
            Self::QuestionFocus(_) => Tag::QuestionFocus,
            Self::Relation(_) => Tag::Relation,
            Self::ContextFact(_) => Tag::ContextFact,
            Self::Hierarchy(_) => Tag::Hierarchy,
            Self::InferredRelation(_) => Tag::InferredRelation,
            Self::Contradiction(_) => Tag::Contradiction,
            Self::ClaimAssessment(_) => Tag::ClaimAssessment,
            Self::UnknownConcepts(_) => Tag::UnknownConcepts,
            Self::Decomposition(_) => Tag::Decomposition,
            Self::Prerequisites(_) => Tag::Prerequisites,
            Self::KnowledgeGaps(_) => Tag::KnowledgeGaps,
            Self::Examples(_) => Tag::Examples,
            Self::SolutionSteps(_) => Tag::SolutionSteps,
            Self::SimplificationNeeded(_) => Tag::SimplificationNeeded,
            Self::Analogy(_) => Tag::Analogy,
            Self::FuzzyMatch { .. } => Tag::FuzzyMatch,
            Self::Response(_) => Tag::Response,
            Self::StudentTopic(_) => Tag::StudentTopic,
            Self::StudentConfusion(_) => Tag::StudentConfusion,
            Self::Raw(_) => Tag::Other("raw".to_string()),
        }
    }
}

/// A working-memory record. Exists only while in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noun_id: Option<Uuid>,
    pub tag: Tag,
    pub content: SlotContent,
    pub confidence: f32,
    /// Demon that wrote the slot; `None` for orchestrator-written slots.
    pub source_demon: Option<DemonId>,
    /// Ticks to live. 0 means "lives to end of turn".
    pub ttl: u32,
    pub created_at: i64,
    /// Monotonic write counter; breaks millisecond ties for ordering.
    pub seq: u64,
}

/// What a demon asks the orchestrator to write. Ids, timestamps, and the
/// producing demon are filled in by the memory on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDraft {
    pub content: SlotContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Tag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noun_id: Option<Uuid>,
    pub confidence: f32,
    pub ttl: u32,
}

impl SlotDraft {
    pub fn new(content: SlotContent) -> Self {
        Self {
            content,
            tag: None,
            noun_id: None,
            confidence: 0.5,
            ttl: 0,
        }
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn noun(mut self, noun_id: Uuid) -> Self {
        self.noun_id = Some(noun_id);
        self
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }
}

/// Snapshot counters for the facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub slots: usize,
    pub focused: usize,
    pub total_ticks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingMemory {
    slots: BTreeMap<Uuid, Slot>,
    focus: Vec<Uuid>,
    tick: u64,
    next_seq: u64,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materializes a draft into a slot and stores it. Returns the new id.
    pub fn write(&mut self, draft: SlotDraft, source_demon: Option<DemonId>) -> Uuid {
        let tag = draft.tag.unwrap_or_else(|| draft.content.tag());
        let slot = Slot {
            id: Uuid::new_v4(),
            noun_id: draft.noun_id,
            tag,
            content: draft.content,
            confidence: draft.confidence.clamp(0.0, 1.0),
            source_demon,
            ttl: draft.ttl,
            created_at: now_ms(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let id = slot.id;
        self.slots.insert(id, slot);
        id
    }

    pub fn read(&self, id: Uuid) -> Option<&Slot> {
        self.slots.get(&id)
    }

    /// All slots under a tag, in write order.
    pub fn find_by_tag(&self, tag: &Tag) -> Vec<&Slot> {
        let mut out: Vec<&Slot> = self.slots.values().filter(|s| &s.tag == tag).collect();
        out.sort_by_key(|s| s.seq);
        out
    }

    /// Most recently created slot under a tag.
    pub fn latest_by_tag(&self, tag: &Tag) -> Option<&Slot> {
        self.slots
            .values()
            .filter(|s| &s.tag == tag)
            .max_by_key(|s| (s.created_at, s.seq))
    }

    pub fn evict(&mut self, id: Uuid) -> bool {
        let removed = self.slots.remove(&id).is_some();
        if removed {
            self.focus.retain(|f| *f != id);
        }
        removed
    }

    /// Replaces the focus list. Ids not present in memory are silently dropped.
    pub fn set_focus(&mut self, ids: Vec<Uuid>) {
        self.focus = ids
            .into_iter()
            .filter(|id| self.slots.contains_key(id))
            .collect();
    }

    pub fn focused(&self) -> Vec<&Slot> {
        self.focus.iter().filter_map(|id| self.slots.get(id)).collect()
    }

    /// Advances the clock: every `ttl > 0` slot is decremented and evicted on
    /// reaching zero. `ttl = 0` slots are untouched by decay.
    pub fn tick(&mut self) -> Vec<Uuid> {
        self.tick += 1;
        let mut expired = Vec::new();
        for slot in self.slots.values_mut() {
            if slot.ttl > 0 {
                slot.ttl -= 1;
                if slot.ttl == 0 {
                    expired.push(slot.id);
                }
            }
        }
        for id in &expired {
            self.evict(*id);
        }
        expired
    }

    /// Evicts while size exceeds `max`, unfocused low-confidence oldest first.
    /// Focused slots go only when everything else is exhausted.
    pub fn enforce_limit(&mut self, max: usize) -> Vec<Uuid> {
        if self.slots.len() <= max {
            return Vec::new();
        }
        let mut candidates: Vec<(bool, f32, u64, Uuid)> = self
            .slots
            .values()
            .map(|s| (self.focus.contains(&s.id), s.confidence, s.seq, s.id))
            .collect();
        candidates.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .then(a.2.cmp(&b.2))
        });
        let mut evicted = Vec::new();
        for (_, _, _, id) in candidates {
            if self.slots.len() <= max {
                break;
            }
            self.evict(id);
            evicted.push(id);
        }
        evicted
    }

    /// Evicts every slot whose tag is in the given set. Used by the
    /// hypervisor's end-of-turn sweep.
    pub fn sweep_tags(&mut self, tags: &[Tag]) -> Vec<Uuid> {
        let doomed: Vec<Uuid> = self
            .slots
            .values()
            .filter(|s| tags.contains(&s.tag))
            .map(|s| s.id)
            .collect();
        for id in &doomed {
            self.evict(*id);
        }
        doomed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn total_ticks(&self) -> u64 {
        self.tick
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            slots: self.slots.len(),
            focused: self.focus.len(),
            total_ticks: self.tick,
        }
    }

    /// JSON snapshot of the whole memory.
    pub fn to_json(&self) -> KernelResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restores a snapshot produced by [`WorkingMemory::to_json`]. Parsing
    /// happens before anything is replaced, so a bad blob mutates nothing.
    pub fn from_json(blob: &str) -> KernelResult<Self> {
        Ok(serde_json::from_str(blob)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn draft(tag_content: SlotContent, confidence: f32, ttl: u32) -> SlotDraft {
        SlotDraft::new(tag_content).confidence(confidence).ttl(ttl)
    }

    #[test]
    fn tick_decays_only_positive_ttls() {
        let mut mem = WorkingMemory::new();
        let short = mem.write(draft(SlotContent::NounPhrase("dog".into()), 0.7, 2), None);
        let turn_long = mem.write(draft(SlotContent::Intent(Intent::Question), 0.9, 0), None);

        assert!(mem.tick().is_empty());
        let expired = mem.tick();
        assert_eq!(expired, vec![short]);
        assert!(mem.read(short).is_none());
        assert!(mem.read(turn_long).is_some());
        assert_eq!(mem.total_ticks(), 2);
    }

    #[test]
    fn enforce_limit_prefers_unfocused_low_confidence_old_slots() {
        let mut mem = WorkingMemory::new();
        let weak_old = mem.write(draft(SlotContent::NounPhrase("a1".into()), 0.1, 0), None);
        let strong = mem.write(draft(SlotContent::NounPhrase("b2".into()), 0.9, 0), None);
        let weak_new = mem.write(draft(SlotContent::NounPhrase("c3".into()), 0.1, 0), None);
        let focused_weak = mem.write(draft(SlotContent::NounPhrase("d4".into()), 0.05, 0), None);
        mem.set_focus(vec![focused_weak]);

        let evicted = mem.enforce_limit(2);
        assert_eq!(evicted, vec![weak_old, weak_new]);
        assert!(mem.read(strong).is_some());
        assert!(mem.read(focused_weak).is_some());
    }

    #[test]
    fn focused_slots_fall_last() {
        let mut mem = WorkingMemory::new();
        let focused = mem.write(draft(SlotContent::NounPhrase("keep".into()), 0.1, 0), None);
        let other = mem.write(draft(SlotContent::NounPhrase("drop".into()), 0.9, 0), None);
        mem.set_focus(vec![focused]);

        let evicted = mem.enforce_limit(1);
        assert_eq!(evicted, vec![other]);

        let evicted = mem.enforce_limit(0);
        assert_eq!(evicted, vec![focused]);
        assert!(mem.focused().is_empty());
    }

    #[test]
    fn set_focus_drops_unknown_ids_and_eviction_cleans_focus() {
        let mut mem = WorkingMemory::new();
        let id = mem.write(draft(SlotContent::NounPhrase("x1".into()), 0.5, 0), None);
        mem.set_focus(vec![id, Uuid::new_v4()]);
        assert_eq!(mem.focused().len(), 1);
        mem.evict(id);
        assert!(mem.focused().is_empty());
    }

    #[test]
    fn latest_by_tag_returns_most_recent_write() {
        let mut mem = WorkingMemory::new();
        mem.write(draft(SlotContent::NounPhrase("first".into()), 0.5, 0), None);
        mem.write(draft(SlotContent::NounPhrase("second".into()), 0.5, 0), None);
        let latest = mem.latest_by_tag(&Tag::NounPhrase).unwrap();
        assert_eq!(
            latest.content,
            SlotContent::NounPhrase("second".to_string())
        );
    }

    #[test]
    fn sweep_removes_only_listed_tags() {
        let mut mem = WorkingMemory::new();
        mem.write(draft(SlotContent::NounPhrase("dog".into()), 0.5, 5), None);
        let kept = mem.write(draft(SlotContent::Response("hi".into()), 0.9, 20), None);
        let swept = mem.sweep_tags(&[Tag::NounPhrase]);
        assert_eq!(swept.len(), 1);
        assert!(mem.read(kept).is_some());
        assert_eq!(mem.len(), 1);
    }

    #[test]
    fn unknown_tag_round_trips_through_other() {
        let tag = Tag::from("sensor_reading".to_string());
        assert_eq!(tag, Tag::Other("sensor_reading".to_string()));
        assert_eq!(String::from(tag), "sensor_reading");
    }

    #[test]
    fn snapshot_round_trip_preserves_memory() {
        let mut mem = WorkingMemory::new();
        let id = mem.write(
            draft(
                SlotContent::Relation(EdgeFact {
                    from: "dog".into(),
                    rel_type: RelationType::IsA,
                    to: "mammal".into(),
                    weight: 0.8,
                }),
                0.8,
                3,
            ),
            Some(DemonId::Relate),
        );
        mem.write(draft(SlotContent::Response("ok".into()), 0.9, 20), None);
        mem.set_focus(vec![id]);
        mem.tick();

        let blob = mem.to_json().unwrap();
        let restored = WorkingMemory::from_json(&blob).unwrap();
        assert_eq!(restored, mem);
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(WorkingMemory::from_json("not json").is_err());
    }

    proptest! {
        #[test]
        fn enforce_limit_never_leaves_memory_above_max(
            confidences in proptest::collection::vec(0.0f32..1.0, 0..40),
            max in 0usize..20,
        ) {
            let mut mem = WorkingMemory::new();
            for (i, c) in confidences.iter().enumerate() {
                mem.write(
                    draft(SlotContent::NounPhrase(format!("p{}", i)), *c, (i % 7) as u32),
                    None,
                );
            }
            mem.enforce_limit(max);
            prop_assert!(mem.len() <= max.max(0));
        }

        #[test]
        fn snapshot_round_trip_holds_for_random_memories(
            phrases in proptest::collection::vec("[a-z]{2,10}", 0..20),
            ticks in 0u32..5,
        ) {
            let mut mem = WorkingMemory::new();
            for p in &phrases {
                mem.write(draft(SlotContent::NounPhrase(p.clone()), 0.5, 4), None);
            }
            for _ in 0..ticks {
                mem.tick();
            }
            let blob = mem.to_json().unwrap();
            prop_assert_eq!(WorkingMemory::from_json(&blob).unwrap(), mem);
        }
    }
}
