//! Relate demon: grounds the parsed phrases in the persistent graph.
//!
//! Resolves each candidate label (noun phrases plus the question focus),
//! loads edges between resolved pairs, each noun's near neighborhood, and
//! `is_a` ancestry, and collects what could not be resolved.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::collections::HashSet;
use std::sync::Arc;

use super::{
    current_subject, noun_phrases, question_focus, Demon, DemonId, DemonOutput, Trigger,
};
use crate::error::KernelResult;
use crate::graph::{GraphStore, Noun, RelationType};
use crate::memory::{
    EdgeFact, HierarchyFact, SlotContent, SlotDraft, Subject, Tag, WorkingMemory,
};

const DESCRIPTION: &str =
    "Resolves phrases against the graph and loads relations, ancestry, and context";

/// How many outgoing edges to load per resolved noun.
const NEIGHBOR_EDGE_CAP: usize = 8;
/// How many subject-context edges to load.
const SUBJECT_EDGE_CAP: usize = 10;
/// How far up the `is_a` chain to climb.
const HIERARCHY_DEPTH: usize = 3;
/// Fuzzy search candidates considered for an unresolved label.
const SEARCH_CANDIDATES: usize = 5;

pub struct RelateDemon {
    graph: Arc<GraphStore>,
}

impl RelateDemon {
    pub fn new(graph: Arc<GraphStore>) -> Self {
        Self { graph }
    }

    /// Exact lookup, then fuzzy: substring search ranked by skim score.
    fn resolve(&self, label: &str) -> KernelResult<Option<Noun>> {
        if let Some(noun) = self.graph.find(label)? {
            return Ok(Some(noun));
        }
        let candidates = self.graph.search(label, SEARCH_CANDIDATES)?;
        if candidates.is_empty() {
            return Ok(None);
        }
        let matcher = SkimMatcherV2::default();
        Ok(candidates
            .into_iter()
            .filter_map(|n| matcher.fuzzy_match(&n.label, label).map(|score| (score, n)))
            .max_by_key(|(score, _)| *score)
            .map(|(_, n)| n))
    }

    /// Climbs the `is_a` chain from a noun, breadth-first, bounded.
    fn collect_hierarchy(&self, start: &Noun) -> KernelResult<Vec<HierarchyFact>> {
        let mut facts = Vec::new();
        let mut seen: HashSet<uuid::Uuid> = HashSet::new();
        let mut frontier = vec![start.clone()];
        seen.insert(start.id);
        for _ in 0..HIERARCHY_DEPTH {
            let mut next = Vec::new();
            for noun in &frontier {
                for (rel, parent) in self.graph.relations_from(noun.id, Some(RelationType::IsA))? {
                    facts.push(HierarchyFact {
                        child: noun.label.clone(),
                        parent: parent.label.clone(),
                        weight: rel.weight,
                    });
                    if seen.insert(parent.id) {
                        next.push(parent);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        Ok(facts)
    }
}

impl Demon for RelateDemon {
    fn id(&self) -> DemonId {
        DemonId::Relate
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn triggers(&self) -> Vec<Trigger> {
        vec![
            Trigger::ChainFrom(DemonId::Parse),
            Trigger::TagPresent(Tag::NounPhrase),
        ]
    }

    fn run(
        &self,
        memory: &WorkingMemory,
        _chained_from: Option<DemonId>,
    ) -> KernelResult<DemonOutput> {
        let mut candidates = noun_phrases(memory);
        if let Some(focus) = question_focus(memory) {
            // A focus that fell back to the whole utterance is not a label;
            // only pattern-extracted foci are worth a lookup.
            let whole_input = memory
                .latest_by_tag(&Tag::RawInput)
                .and_then(|s| match &s.content {
                    SlotContent::RawInput(text) => {
                        Some(text.trim().trim_end_matches(['?', '.', '!']).trim().to_lowercase())
                    }
                    _ => None,
                });
            if whole_input.as_deref() != Some(focus.as_str()) && !candidates.contains(&focus) {
                candidates.push(focus);
            }
        }

        let mut out = DemonOutput::new();
        let mut resolved: Vec<Noun> = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();

        for candidate in &candidates {
            match self.resolve(candidate)? {
                Some(noun) => {
                    if noun.label != *candidate {
                        out.writes.push(
                            SlotDraft::new(SlotContent::FuzzyMatch {
                                query: candidate.clone(),
                                resolved: noun.label.clone(),
                            })
                            .confidence(0.6),
                        );
                    }
                    if !resolved.iter().any(|n| n.id == noun.id) {
                        resolved.push(noun);
                    }
                }
                None => unresolved.push(candidate.clone()),
            }
        }

        // Edges between resolved pairs are first-class relation slots.
        let mut edges_seen: HashSet<(String, RelationType, String)> = HashSet::new();
        for a in &resolved {
            for b in &resolved {
                if a.id == b.id {
                    continue;
                }
                for (rel, to) in self.graph.relations_from(a.id, None)? {
                    if to.id != b.id {
                        continue;
                    }
                    let key = (a.label.clone(), rel.rel_type, to.label.clone());
                    if !edges_seen.insert(key) {
                        continue;
                    }
                    out.writes.push(
                        SlotDraft::new(SlotContent::Relation(EdgeFact {
                            from: a.label.clone(),
                            rel_type: rel.rel_type,
                            to: to.label.clone(),
                            weight: rel.weight,
                        }))
                        .confidence(rel.weight),
                    );
                }
            }
        }
        let pair_edges = out
            .writes
            .iter()
            .filter(|w| matches!(w.content, SlotContent::Relation(_)))
            .count();

        // Each noun's near neighborhood feeds inference as lower-confidence
        // context facts.
        let mut context_edges = 0usize;
        for noun in &resolved {
            for (rel, to) in self
                .graph
                .relations_from(noun.id, None)?
                .into_iter()
                .take(NEIGHBOR_EDGE_CAP)
            {
                let key = (noun.label.clone(), rel.rel_type, to.label.clone());
                if !edges_seen.insert(key) {
                    continue;
                }
                out.writes.push(
                    SlotDraft::new(SlotContent::ContextFact(EdgeFact {
                        from: noun.label.clone(),
                        rel_type: rel.rel_type,
                        to: to.label.clone(),
                        weight: rel.weight,
                    }))
                    .confidence(0.6),
                );
                context_edges += 1;
            }
        }

        let mut hierarchy_seen: HashSet<(String, String)> = HashSet::new();
        for noun in &resolved {
            for fact in self.collect_hierarchy(noun)? {
                if hierarchy_seen.insert((fact.child.clone(), fact.parent.clone())) {
                    out.writes
                        .push(SlotDraft::new(SlotContent::Hierarchy(fact)).confidence(0.8));
                }
            }
        }

        if !unresolved.is_empty() {
            out.writes.push(
                SlotDraft::new(SlotContent::UnknownConcepts(unresolved.clone())).confidence(0.8),
            );
        }

        if let Some(subject) = current_subject(memory) {
            if subject != Subject::General {
                if let Some(subject_noun) = self.graph.find(subject.as_str())? {
                    for (rel, to) in self
                        .graph
                        .relations_from(subject_noun.id, None)?
                        .into_iter()
                        .take(SUBJECT_EDGE_CAP)
                    {
                        let key = (subject_noun.label.clone(), rel.rel_type, to.label.clone());
                        if !edges_seen.insert(key) {
                            continue;
                        }
                        out.writes.push(
                            SlotDraft::new(SlotContent::ContextFact(EdgeFact {
                                from: subject_noun.label.clone(),
                                rel_type: rel.rel_type,
                                to: to.label.clone(),
                                weight: rel.weight,
                            }))
                            .confidence(0.5),
                        );
                        context_edges += 1;
                    }
                }
            }
        }

        let any_edges = pair_edges > 0 || context_edges > 0;
        if any_edges {
            out.chain.push(DemonId::Infer);
        }
        if !unresolved.is_empty() {
            out.chain.push(DemonId::Question);
        }
        if !resolved.is_empty() && !any_edges {
            out.chain.push(DemonId::Analogize);
        }

        tracing::debug!(
            target: "maieutic::demon",
            demon = "relate",
            resolved = resolved.len(),
            unresolved = unresolved.len(),
            pair_edges,
            context_edges,
            "phrases grounded"
        );
        Ok(out)
    }
}
