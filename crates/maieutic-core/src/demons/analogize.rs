//! Analogize demon: offers a familiar stand-in for the concept at hand.
//!
//! Two sources: a small built-in table of well-worn classroom analogies, and
//! structural matches found by comparing relation patterns in the graph
//! (Jaccard similarity over outgoing and incoming relation-type sets).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{focus_concept, noun_phrases, Demon, DemonId, DemonOutput, Trigger};
use crate::error::KernelResult;
use crate::graph::{GraphStore, Noun, Pattern, RelationType};
use crate::memory::{
    Analogy, AnalogyMapping, SlotContent, SlotDraft, Tag, WorkingMemory,
};

const DESCRIPTION: &str = "Maps the focus concept onto a familiar analog, bootstrapped or structural";

const BOOTSTRAP_CONFIDENCE: f32 = 0.85;
const STRUCTURAL_THRESHOLD: f32 = 0.3;
const STRUCTURAL_PER_CONCEPT: usize = 2;
const OUT_WEIGHT: f32 = 0.6;
const IN_WEIGHT: f32 = 0.4;

/// Pre-written analog + explanation pairs for well-known labels.
const BOOTSTRAP_ANALOGIES: &[(&str, &str, &str)] = &[
    (
        "electricity",
        "water flowing through pipes",
        "Electricity flows through wires like water flows through pipes - voltage is like water pressure, current is like the flow rate, and resistance is like the width of the pipe.",
    ),
    (
        "atom",
        "a tiny solar system",
        "An atom is like a tiny solar system - the nucleus sits at the center like the sun, and the electrons orbit around it like planets.",
    ),
    (
        "cell",
        "a busy factory",
        "A cell is like a busy factory - the nucleus is the control room, the mitochondria are the power generators, and the membrane is the security gate.",
    ),
    (
        "dna",
        "a recipe book",
        "DNA is like a recipe book - each gene is a single recipe, and the cell reads those recipes to build the proteins it needs.",
    ),
    (
        "variable",
        "a labeled box",
        "A variable is like a labeled box - you can put a value inside, look at it later, or swap it for another one, and the label on the box stays the same.",
    ),
    (
        "function",
        "a vending machine",
        "A function is like a vending machine - you put an input in, something happens inside, and a predictable output comes out.",
    ),
    (
        "evolution",
        "a gradual sieve",
        "Evolution is like a gradual sieve - differences that help an organism survive pass through to the next generation, and over many generations the population changes shape.",
    ),
    (
        "gravity",
        "a ball on a stretched sheet",
        "Gravity is like a heavy ball resting on a stretched sheet - massive objects curve the space around them, and smaller objects roll toward the dip.",
    ),
];

pub struct AnalogizeDemon {
    graph: Arc<GraphStore>,
}

impl AnalogizeDemon {
    pub fn new(graph: Arc<GraphStore>) -> Self {
        Self { graph }
    }

    fn bootstrap(concept: &str) -> Option<Analogy> {
        BOOTSTRAP_ANALOGIES
            .iter()
            .find(|(label, _, _)| *label == concept)
            .map(|(label, analog, explanation)| Analogy {
                concept: label.to_string(),
                analog: analog.to_string(),
                explanation: explanation.to_string(),
                similarity: BOOTSTRAP_CONFIDENCE,
                shared_types: Vec::new(),
                mapping: Vec::new(),
            })
    }

    /// Out/in relation patterns of a noun: type -> neighbor labels.
    fn relation_pattern(
        &self,
        noun: &Noun,
    ) -> KernelResult<(
        HashMap<RelationType, Vec<String>>,
        HashMap<RelationType, Vec<String>>,
    )> {
        let mut out_pattern: HashMap<RelationType, Vec<String>> = HashMap::new();
        for (rel, to) in self.graph.relations_from(noun.id, None)? {
            out_pattern.entry(rel.rel_type).or_default().push(to.label);
        }
        let mut in_pattern: HashMap<RelationType, Vec<String>> = HashMap::new();
        for (rel, from) in self.graph.relations_to(noun.id, None)? {
            in_pattern.entry(rel.rel_type).or_default().push(from.label);
        }
        Ok((out_pattern, in_pattern))
    }

    fn jaccard(a: &HashSet<RelationType>, b: &HashSet<RelationType>) -> f32 {
        let union = a.union(b).count();
        if union == 0 {
            return 0.0;
        }
        a.intersection(b).count() as f32 / union as f32
    }

    fn structural(&self, concept: &Noun) -> KernelResult<Vec<Analogy>> {
        let (out_pattern, in_pattern) = self.relation_pattern(concept)?;
        if out_pattern.is_empty() {
            return Ok(Vec::new());
        }
        let out_types: HashSet<RelationType> = out_pattern.keys().copied().collect();
        let in_types: HashSet<RelationType> = in_pattern.keys().copied().collect();

        // Candidates: every other source of any outgoing type the concept uses.
        let mut candidates: Vec<Noun> = Vec::new();
        let mut seen: HashSet<uuid::Uuid> = HashSet::new();
        seen.insert(concept.id);
        for rel_type in &out_types {
            let triples = self.graph.query(
                &Pattern {
                    from: None,
                    relation: Some(*rel_type),
                    to: None,
                },
                64,
            )?;
            for triple in triples {
                if seen.insert(triple.from.id) {
                    candidates.push(triple.from);
                }
            }
        }

        let mut scored: Vec<Analogy> = Vec::new();
        for candidate in candidates {
            let (cand_out, cand_in) = self.relation_pattern(&candidate)?;
            let cand_out_types: HashSet<RelationType> = cand_out.keys().copied().collect();
            let cand_in_types: HashSet<RelationType> = cand_in.keys().copied().collect();
            let score = OUT_WEIGHT * Self::jaccard(&out_types, &cand_out_types)
                + IN_WEIGHT * Self::jaccard(&in_types, &cand_in_types);
            if score < STRUCTURAL_THRESHOLD {
                continue;
            }
            let mut shared: Vec<RelationType> = out_types
                .intersection(&cand_out_types)
                .copied()
                .collect();
            shared.sort();
            let mapping: Vec<AnalogyMapping> = shared
                .iter()
                .filter_map(|t| {
                    let left = out_pattern.get(t).and_then(|v| v.first())?;
                    let right = cand_out.get(t).and_then(|v| v.first())?;
                    Some(AnalogyMapping {
                        rel_type: *t,
                        concept_target: left.clone(),
                        analog_target: right.clone(),
                    })
                })
                .collect();
            let explanation = match mapping.first() {
                Some(m) => format!(
                    "{} is shaped like {}: where {} {} {}, {} {} {}.",
                    concept.label,
                    candidate.label,
                    concept.label,
                    m.rel_type,
                    m.concept_target,
                    candidate.label,
                    m.rel_type,
                    m.analog_target,
                ),
                None => format!(
                    "{} and {} play similar roles in what you already know.",
                    concept.label, candidate.label
                ),
            };
            scored.push(Analogy {
                concept: concept.label.clone(),
                analog: candidate.label.clone(),
                explanation,
                similarity: score,
                shared_types: shared,
                mapping,
            });
        }
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(STRUCTURAL_PER_CONCEPT);
        Ok(scored)
    }
}

impl Demon for AnalogizeDemon {
    fn id(&self) -> DemonId {
        DemonId::Analogize
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn triggers(&self) -> Vec<Trigger> {
        vec![
            Trigger::ChainFrom(DemonId::Decompose),
            Trigger::ChainFrom(DemonId::Relate),
            Trigger::TagPresent(Tag::SimplificationNeeded),
        ]
    }

    fn run(
        &self,
        memory: &WorkingMemory,
        _chained_from: Option<DemonId>,
    ) -> KernelResult<DemonOutput> {
        let mut candidates: Vec<String> = Vec::new();
        if let Some(focus) = focus_concept(memory) {
            candidates.push(focus);
        }
        for phrase in noun_phrases(memory) {
            if !candidates.contains(&phrase) {
                candidates.push(phrase);
            }
        }

        // Per-turn dedup: never repeat an analogy already in memory.
        let mut emitted: HashSet<(String, String)> = memory
            .find_by_tag(&Tag::Analogy)
            .into_iter()
            .filter_map(|s| match &s.content {
                SlotContent::Analogy(a) => Some((a.concept.clone(), a.analog.clone())),
                _ => None,
            })
            .collect();

        let mut out = DemonOutput::new();
        let mut push = |analogy: Analogy, out: &mut DemonOutput| {
            let key = (analogy.concept.clone(), analogy.analog.clone());
            if emitted.insert(key) {
                let confidence = analogy.similarity;
                out.writes
                    .push(SlotDraft::new(SlotContent::Analogy(analogy)).confidence(confidence));
            }
        };

        for concept in &candidates {
            if let Some(analogy) = Self::bootstrap(concept) {
                push(analogy, &mut out);
            }
            if let Some(noun) = self.graph.find(concept)? {
                for analogy in self.structural(&noun)? {
                    push(analogy, &mut out);
                }
            }
        }

        out.chain.push(DemonId::Question);
        tracing::debug!(
            target: "maieutic::demon",
            demon = "analogize",
            candidates = candidates.len(),
            analogies = out.writes.len(),
            "analogies drafted"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &tempfile::TempDir) -> Arc<GraphStore> {
        Arc::new(GraphStore::open_path(dir.path().join("graph")).unwrap())
    }

    fn analogies(out: &DemonOutput) -> Vec<Analogy> {
        out.writes
            .iter()
            .filter_map(|w| match &w.content {
                SlotContent::Analogy(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn bootstrap_table_covers_electricity_verbatim() {
        let dir = tempdir().unwrap();
        let demon = AnalogizeDemon::new(store(&dir));
        let mut memory = WorkingMemory::new();
        memory.write(
            SlotDraft::new(SlotContent::NounPhrase("electricity".to_string())).ttl(10),
            Some(DemonId::Parse),
        );
        let out = demon.run(&memory, Some(DemonId::Decompose)).unwrap();
        let found = analogies(&out);
        assert_eq!(found.len(), 1);
        assert!(found[0]
            .explanation
            .starts_with("Electricity flows through wires like water flows through pipes"));
        assert!((found[0].similarity - 0.85).abs() < f32::EPSILON);
        assert_eq!(out.chain, vec![DemonId::Question]);
    }

    #[test]
    fn repeated_runs_do_not_duplicate_analogies() {
        let dir = tempdir().unwrap();
        let demon = AnalogizeDemon::new(store(&dir));
        let mut memory = WorkingMemory::new();
        memory.write(
            SlotDraft::new(SlotContent::NounPhrase("electricity".to_string())).ttl(10),
            Some(DemonId::Parse),
        );
        let first = demon.run(&memory, Some(DemonId::Decompose)).unwrap();
        for draft in first.writes {
            memory.write(draft, Some(DemonId::Analogize));
        }
        let second = demon.run(&memory, Some(DemonId::Decompose)).unwrap();
        assert!(analogies(&second).is_empty());
    }

    #[test]
    fn structural_match_scores_shared_relation_types() {
        let dir = tempdir().unwrap();
        let graph = store(&dir);
        // heart and pump share outgoing types (part_of, used_for)
        graph
            .link("heart", RelationType::PartOf, "body", 1.0, None)
            .unwrap();
        graph
            .link("heart", RelationType::UsedFor, "moving blood", 1.0, None)
            .unwrap();
        graph
            .link("pump", RelationType::PartOf, "machine", 1.0, None)
            .unwrap();
        graph
            .link("pump", RelationType::UsedFor, "moving water", 1.0, None)
            .unwrap();

        let demon = AnalogizeDemon::new(Arc::clone(&graph));
        let mut memory = WorkingMemory::new();
        memory.write(
            SlotDraft::new(SlotContent::QuestionFocus("heart".to_string())),
            Some(DemonId::Parse),
        );
        let out = demon.run(&memory, Some(DemonId::Relate)).unwrap();
        let found = analogies(&out);
        let pump = found.iter().find(|a| a.analog == "pump").unwrap();
        // identical out-type sets, empty in-type sets on both sides
        assert!((pump.similarity - 0.6).abs() < 1e-6);
        assert_eq!(pump.shared_types.len(), 2);
        assert!(pump
            .mapping
            .iter()
            .any(|m| m.rel_type == RelationType::UsedFor
                && m.concept_target == "moving blood"
                && m.analog_target == "moving water"));
    }

    #[test]
    fn weak_structural_candidates_are_dropped() {
        let dir = tempdir().unwrap();
        let graph = store(&dir);
        graph
            .link("heart", RelationType::PartOf, "body", 1.0, None)
            .unwrap();
        graph
            .link("heart", RelationType::UsedFor, "moving blood", 1.0, None)
            .unwrap();
        graph
            .link("heart", RelationType::Requires, "oxygen", 1.0, None)
            .unwrap();
        // wheel shares only one of three outgoing types and has extra noise
        graph
            .link("wheel", RelationType::PartOf, "cart", 1.0, None)
            .unwrap();
        graph
            .link("wheel", RelationType::Causes, "motion", 1.0, None)
            .unwrap();
        graph
            .link("wheel", RelationType::Has, "spokes", 1.0, None)
            .unwrap();
        graph
            .link("wheel", RelationType::Opposes, "friction", 1.0, None)
            .unwrap();

        let demon = AnalogizeDemon::new(Arc::clone(&graph));
        let mut memory = WorkingMemory::new();
        memory.write(
            SlotDraft::new(SlotContent::QuestionFocus("heart".to_string())),
            Some(DemonId::Parse),
        );
        let out = demon.run(&memory, Some(DemonId::Relate)).unwrap();
        // jaccard = 1/6, score = 0.1 < 0.3
        assert!(analogies(&out).iter().all(|a| a.analog != "wheel"));
    }
}
