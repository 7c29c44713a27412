//! Learn demon: the only writer of the persistent graph.
//!
//! Fires once per turn, after the response. Persists the turn's noun
//! phrases, re-scans the raw utterance with a small statement-pattern table,
//! and records what the student is studying. Individual `link` failures are
//! logged and skipped; each edge is independent.

use regex::Regex;
use std::sync::Arc;

use super::{
    current_intent, current_subject, focus_concept, noun_phrases, parse::is_subject_keyword,
    Action, Demon, DemonId, DemonOutput, Trigger,
};
use crate::error::KernelResult;
use crate::graph::{GraphStore, NounType, RelationType};
use crate::memory::{Intent, SlotContent, SlotDraft, Subject, Tag, WorkingMemory};

const DESCRIPTION: &str = "Persists the turn's nouns, stated relations, and study markers";

/// Weight for relations learned from a raw statement.
const STATEMENT_WEIGHT: f32 = 0.6;
/// Minimum confidence for a relation slot to be persisted.
const PERSIST_CONFIDENCE: f32 = 0.5;

const STUDENT_LABEL: &str = "student";
const STUDENT_TOPIC_TTL: u32 = 30;
const STUDENT_CONFUSION_TTL: u32 = 50;

pub struct LearnDemon {
    graph: Arc<GraphStore>,
    /// Ordered statement patterns; the first match wins.
    statements: Vec<(Regex, RelationType)>,
}

impl LearnDemon {
    pub fn new(graph: Arc<GraphStore>) -> Self {
        let table: [(&str, RelationType); 8] = [
            (r"^(.+?)\s+(?:is|are)\s+part\s+of\s+(.+)$", RelationType::PartOf),
            (r"^(.+?)\s+(?:is|are)\s+used\s+(?:for|to)\s+(.+)$", RelationType::UsedFor),
            (r"^(.+?)\s+(?:is|are)\s+(?:a|an)\s+(.+)$", RelationType::IsA),
            (
                r"^(.+?)\s+(?:causes?|leads?\s+to|results?\s+in)\s+(.+)$",
                RelationType::Causes,
            ),
            (
                r"^(.+?)\s+(?:produces?|makes?|creates?)\s+(.+)$",
                RelationType::Produces,
            ),
            (r"^(.+?)\s+(?:has|have|contains?)\s+(.+)$", RelationType::Has),
            (r"^(.+?)\s+(?:requires?|needs?)\s+(.+)$", RelationType::Requires),
            (
                r"^(.+?)\s+(?:equals?|is\s+equal\s+to|=)\s+(.+)$",
                RelationType::Equals,
            ),
        ];
        let statements = table
            .into_iter()
            .map(|(pattern, rel_type)| {
                (Regex::new(pattern).expect("statement pattern"), rel_type)
            })
            .collect();
        Self { graph, statements }
    }

    /// Lightweight noun typing from the label alone. Known curricular terms
    /// stay concepts even when they end in a property-like suffix.
    fn infer_noun_type(label: &str) -> NounType {
        let is_number = !label.is_empty()
            && label.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-')
            && label.chars().any(|c| c.is_ascii_digit());
        if is_number || label == "true" || label == "false" {
            return NounType::Value;
        }
        if Subject::ALL.iter().any(|s| s.as_str() == label) {
            return NounType::Context;
        }
        let last = label.split_whitespace().last().unwrap_or(label);
        if ["ing", "tion", "sis", "ment"].iter().any(|s| last.ends_with(s)) {
            return NounType::Process;
        }
        // Curricular terms like "gravity" read as concepts, not properties,
        // whatever their suffix says.
        if is_subject_keyword(label) {
            return NounType::Concept;
        }
        if ["ness", "ity", "ful", "ous", "ive", "able"]
            .iter()
            .any(|s| last.ends_with(s))
        {
            return NounType::Property;
        }
        NounType::Concept
    }

    fn clean_operand(text: &str) -> String {
        let trimmed = text
            .trim()
            .trim_end_matches(['.', '!', '?', ','])
            .trim()
            .to_lowercase();
        for article in ["a ", "an ", "the "] {
            if let Some(rest) = trimmed.strip_prefix(article) {
                return rest.trim().to_string();
            }
        }
        trimmed
    }

    /// First matching statement pattern, as (from, type, to).
    fn scan_statement(&self, raw: &str) -> Option<(String, RelationType, String)> {
        let lower = raw.trim().trim_end_matches(['?', '!', '.']).to_lowercase();
        for (pattern, rel_type) in &self.statements {
            if let Some(caps) = pattern.captures(&lower) {
                let from = Self::clean_operand(caps.get(1)?.as_str());
                let to = Self::clean_operand(caps.get(2)?.as_str());
                if !from.is_empty() && !to.is_empty() {
                    return Some((from, *rel_type, to));
                }
            }
        }
        None
    }

    fn try_link(
        &self,
        from: &str,
        rel_type: RelationType,
        to: &str,
        weight: f32,
        context: Option<&str>,
    ) -> usize {
        match self.graph.link(from, rel_type, to, weight, context) {
            Ok(_) => 1,
            Err(e) => {
                tracing::warn!(
                    target: "maieutic::demon",
                    demon = "learn",
                    from,
                    to,
                    rel_type = rel_type.as_str(),
                    error = %e,
                    "link failed, skipping edge"
                );
                0
            }
        }
    }
}

impl Demon for LearnDemon {
    fn id(&self) -> DemonId {
        DemonId::Learn
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn triggers(&self) -> Vec<Trigger> {
        // Both triggers are declared but dead: only new_input seeds the
        // queue, no demon ever chains to learn, and tag triggers are not
        // consulted mid-turn. The hypervisor invokes learn directly once
        // per turn, after the response.
        vec![Trigger::TagPresent(Tag::Response), Trigger::TickInterval(5)]
    }

    fn run(
        &self,
        memory: &WorkingMemory,
        _chained_from: Option<DemonId>,
    ) -> KernelResult<DemonOutput> {
        let mut out = DemonOutput::new();
        let mut nouns_written = 0usize;
        let mut links_written = 0usize;

        for phrase in noun_phrases(memory) {
            match self
                .graph
                .ensure_noun(&phrase, Self::infer_noun_type(&phrase), Default::default())
            {
                Ok(_) => nouns_written += 1,
                Err(e) => tracing::warn!(
                    target: "maieutic::demon",
                    demon = "learn",
                    phrase = %phrase,
                    error = %e,
                    "noun persist failed"
                ),
            }
        }

        let subject = current_subject(memory).filter(|s| *s != Subject::General);
        if let Some(subject) = subject {
            match self
                .graph
                .ensure_noun(subject.as_str(), NounType::Context, Default::default())
            {
                Ok(_) => nouns_written += 1,
                Err(e) => tracing::warn!(
                    target: "maieutic::demon",
                    demon = "learn",
                    subject = subject.as_str(),
                    error = %e,
                    "subject persist failed"
                ),
            }
        }
        let context_label = subject.map(|s| s.as_str());

        if let Some(raw) = memory.latest_by_tag(&Tag::RawInput).and_then(|s| match &s.content {
            SlotContent::RawInput(text) => Some(text.clone()),
            _ => None,
        }) {
            if let Some((from, rel_type, to)) = self.scan_statement(&raw) {
                links_written +=
                    self.try_link(&from, rel_type, &to, STATEMENT_WEIGHT, context_label);
            }
        }

        for slot in memory.find_by_tag(&Tag::Relation) {
            if slot.confidence < PERSIST_CONFIDENCE {
                continue;
            }
            if let SlotContent::Relation(edge) = &slot.content {
                links_written += self.try_link(
                    &edge.from,
                    edge.rel_type,
                    &edge.to,
                    edge.weight,
                    context_label,
                );
            }
        }

        if let Some(topic) = focus_concept(memory) {
            let already_tracked = memory.latest_by_tag(&Tag::StudentTopic).is_some();
            out.writes.push(
                SlotDraft::new(SlotContent::StudentTopic(topic.clone()))
                    .confidence(0.7)
                    .ttl(STUDENT_TOPIC_TTL),
            );
            if !already_tracked {
                if self
                    .graph
                    .ensure_noun(STUDENT_LABEL, NounType::Entity, Default::default())
                    .is_ok()
                {
                    let mut props = serde_json::Map::new();
                    props.insert(
                        "note".to_string(),
                        serde_json::Value::String("currently_studying".to_string()),
                    );
                    if let (Ok(Some(student)), Ok(Some(focus_noun))) =
                        (self.graph.find(STUDENT_LABEL), self.graph.find(&topic))
                    {
                        if let Err(e) = self.graph.create_relation(
                            student.id,
                            RelationType::RelatesTo,
                            focus_noun.id,
                            0.8,
                            None,
                            props,
                        ) {
                            tracing::warn!(
                                target: "maieutic::demon",
                                demon = "learn",
                                error = %e,
                                "study marker edge failed"
                            );
                        } else {
                            links_written += 1;
                        }
                    }
                }
            }
            if current_intent(memory) == Some(Intent::Confusion) {
                out.writes.push(
                    SlotDraft::new(SlotContent::StudentConfusion(topic))
                        .confidence(0.8)
                        .ttl(STUDENT_CONFUSION_TTL),
                );
            }
        }

        out.actions.push(Action::Log(format!(
            "learned {} nouns, {} relations",
            nouns_written, links_written
        )));
        tracing::debug!(
            target: "maieutic::demon",
            demon = "learn",
            nouns = nouns_written,
            links = links_written,
            "turn persisted"
        );
        Ok(out)
    }
}
