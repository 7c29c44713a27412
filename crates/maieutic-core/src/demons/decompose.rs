//! Decompose demon: breaks the current concept into parts, prerequisites,
//! and examples, and spots gaps between prerequisites and what the student
//! has already touched.

use std::collections::HashSet;
use std::sync::Arc;

use super::{
    current_intent, current_subject, focus_concept, noun_phrases, Demon, DemonId, DemonOutput,
    Trigger,
};
use crate::error::KernelResult;
use crate::graph::{GraphStore, Noun, RelationType};
use crate::memory::{
    Decomposition, Intent, Prerequisites, SlotContent, SlotDraft, Subject, Tag, WorkingMemory,
};

const DESCRIPTION: &str = "Breaks the focus concept into parts, prerequisites, examples, and gaps";

/// Canonical ordered solution steps per subject. Independent of graph content.
const HEURISTIC_STEPS: &[(Subject, &[&str])] = &[
    (
        Subject::Mathematics,
        &[
            "identify what the problem is asking for",
            "write down the known values",
            "choose a formula or strategy that connects them",
            "work through the steps one at a time",
            "check the result against the original question",
        ],
    ),
    (
        Subject::Physics,
        &[
            "describe the physical situation in plain words",
            "identify the forces or quantities involved",
            "pick the principle that governs them",
            "set up the relationship and solve",
            "sanity-check units and magnitude",
        ],
    ),
    (
        Subject::Biology,
        &[
            "name the structure or process involved",
            "describe what goes in and what comes out",
            "trace the steps in order",
            "connect the process to its purpose for the organism",
        ],
    ),
    (
        Subject::History,
        &[
            "place the event in time and place",
            "identify the key actors",
            "trace causes leading into the event",
            "trace consequences flowing out of it",
        ],
    ),
    (
        Subject::Language,
        &[
            "identify the part of speech or structure",
            "look at how it behaves in an example sentence",
            "compare it with a similar structure",
            "practice producing one yourself",
        ],
    ),
    (
        Subject::ComputerScience,
        &[
            "state what the program or concept should do",
            "break it into smaller operations",
            "walk through an example input by hand",
            "express the steps precisely",
            "test against an edge case",
        ],
    ),
];

const GENERAL_STEPS: &[&str] = &[
    "start with what the concept is for",
    "break it into smaller pieces",
    "understand each piece on its own",
    "put the pieces back together",
];

pub struct DecomposeDemon {
    graph: Arc<GraphStore>,
}

impl DecomposeDemon {
    pub fn new(graph: Arc<GraphStore>) -> Self {
        Self { graph }
    }

    fn resolve(&self, label: &str) -> KernelResult<Option<Noun>> {
        if let Some(noun) = self.graph.find(label)? {
            return Ok(Some(noun));
        }
        Ok(self.graph.search(label, 1)?.into_iter().next())
    }

    fn steps_for(subject: Option<Subject>) -> Vec<String> {
        let steps = subject
            .and_then(|s| {
                HEURISTIC_STEPS
                    .iter()
                    .find(|(sub, _)| *sub == s)
                    .map(|(_, steps)| *steps)
            })
            .unwrap_or(GENERAL_STEPS);
        steps.iter().map(|s| s.to_string()).collect()
    }
}

impl Demon for DecomposeDemon {
    fn id(&self) -> DemonId {
        DemonId::Decompose
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn triggers(&self) -> Vec<Trigger> {
        vec![
            Trigger::ChainFrom(DemonId::Infer),
            Trigger::ChainFrom(DemonId::Parse),
            Trigger::TagPresent(Tag::SimplificationNeeded),
        ]
    }

    fn run(
        &self,
        memory: &WorkingMemory,
        _chained_from: Option<DemonId>,
    ) -> KernelResult<DemonOutput> {
        let mut out = DemonOutput::new();
        let confused = current_intent(memory) == Some(Intent::Confusion);
        let Some(target) = focus_concept(memory) else {
            out.chain.push(DemonId::Question);
            return Ok(out);
        };

        let mut parts: Vec<String> = Vec::new();
        let mut prerequisites: Vec<String> = Vec::new();
        let mut examples: Vec<String> = Vec::new();

        if let Some(noun) = self.resolve(&target)? {
            for (rel, to) in self.graph.relations_from(noun.id, None)? {
                match rel.rel_type {
                    RelationType::PartOf | RelationType::Has | RelationType::Contains => {
                        parts.push(to.label)
                    }
                    RelationType::Requires => prerequisites.push(to.label),
                    RelationType::ExampleOf => examples.push(to.label),
                    _ => {}
                }
            }
            for (_, from) in self.graph.relations_to(noun.id, Some(RelationType::PartOf))? {
                parts.push(from.label);
            }
            for (_, from) in self
                .graph
                .relations_to(noun.id, Some(RelationType::ExampleOf))?
            {
                examples.push(from.label);
            }
        }
        for list in [&mut parts, &mut prerequisites, &mut examples] {
            let mut seen = HashSet::new();
            list.retain(|x| seen.insert(x.clone()));
        }

        // Gaps: prerequisites the student has not touched in this session.
        let mut known: HashSet<String> = noun_phrases(memory).into_iter().collect();
        for slot in memory.find_by_tag(&Tag::Hierarchy) {
            if let SlotContent::Hierarchy(h) = &slot.content {
                known.insert(h.child.clone());
                known.insert(h.parent.clone());
            }
        }
        let gaps: Vec<String> = prerequisites
            .iter()
            .filter(|p| !known.contains(*p))
            .cloned()
            .collect();

        if !parts.is_empty() {
            out.writes.push(
                SlotDraft::new(SlotContent::Decomposition(Decomposition {
                    concept: target.clone(),
                    parts: parts.clone(),
                }))
                .confidence(0.8),
            );
        }
        if !prerequisites.is_empty() {
            out.writes.push(
                SlotDraft::new(SlotContent::Prerequisites(Prerequisites {
                    concept: target.clone(),
                    prerequisites: prerequisites.clone(),
                    gaps: gaps.clone(),
                }))
                .confidence(0.8),
            );
        }
        if !gaps.is_empty() {
            out.writes
                .push(SlotDraft::new(SlotContent::KnowledgeGaps(gaps.clone())).confidence(0.8));
        }
        if !examples.is_empty() {
            out.writes
                .push(SlotDraft::new(SlotContent::Examples(examples.clone())).confidence(0.7));
        }
        out.writes.push(
            SlotDraft::new(SlotContent::SolutionSteps(Self::steps_for(current_subject(
                memory,
            ))))
            .confidence(0.6),
        );
        if confused {
            out.writes.push(
                SlotDraft::new(SlotContent::SimplificationNeeded(target.clone()))
                    .confidence(0.9),
            );
        }

        if confused {
            out.chain.push(DemonId::Analogize);
        }
        out.chain.push(DemonId::Question);

        tracing::debug!(
            target: "maieutic::demon",
            demon = "decompose",
            concept = %target,
            parts = parts.len(),
            prerequisites = prerequisites.len(),
            gaps = gaps.len(),
            "concept decomposed"
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

    fn memory_with_focus(focus: &str) -> WorkingMemory {
        let mut memory = WorkingMemory::new();
        memory.write(
            SlotDraft::new(SlotContent::QuestionFocus(focus.to_string())),
            Some(DemonId::Parse),
        );
        memory
    }

    #[test]
    fn collects_parts_prerequisites_and_examples_from_the_graph() {
        let dir = tempdir().unwrap();
        let graph = store(&dir);
        graph
            .link("photosynthesis", RelationType::Requires, "sunlight", 1.0, None)
            .unwrap();
        graph
            .link("photosynthesis", RelationType::Has, "light reactions", 1.0, None)
            .unwrap();
        graph
            .link("chloroplast", RelationType::PartOf, "photosynthesis", 0.9, None)
            .unwrap();
        graph
            .link("leaf", RelationType::ExampleOf, "photosynthesis", 0.9, None)
            .unwrap();

        let demon = DecomposeDemon::new(Arc::clone(&graph));
        let memory = memory_with_focus("photosynthesis");
        let out = demon.run(&memory, Some(DemonId::Infer)).unwrap();

        let decomposition = out
            .writes
            .iter()
            .find_map(|w| match &w.content {
                SlotContent::Decomposition(d) => Some(d.clone()),
                _ => None,
            })
            .unwrap();
        assert!(decomposition.parts.contains(&"light reactions".to_string()));
        assert!(decomposition.parts.contains(&"chloroplast".to_string()));

        let prereqs = out
            .writes
            .iter()
            .find_map(|w| match &w.content {
                SlotContent::Prerequisites(p) => Some(p.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(prereqs.prerequisites, vec!["sunlight"]);
        // student never mentioned sunlight: it is a gap
        assert_eq!(prereqs.gaps, vec!["sunlight"]);

        let examples = out
            .writes
            .iter()
            .find_map(|w| match &w.content {
                SlotContent::Examples(e) => Some(e.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(examples, vec!["leaf"]);
    }

    #[test]
    fn known_prerequisites_are_not_gaps() {
        let dir = tempdir().unwrap();
        let graph = store(&dir);
        graph
            .link("algebra", RelationType::Requires, "arithmetic", 1.0, None)
            .unwrap();
        let demon = DecomposeDemon::new(Arc::clone(&graph));
        let mut memory = memory_with_focus("algebra");
        memory.write(
            SlotDraft::new(SlotContent::NounPhrase("arithmetic".to_string())).ttl(10),
            Some(DemonId::Parse),
        );
        let out = demon.run(&memory, Some(DemonId::Infer)).unwrap();
        let prereqs = out
            .writes
            .iter()
            .find_map(|w| match &w.content {
                SlotContent::Prerequisites(p) => Some(p.clone()),
                _ => None,
            })
            .unwrap();
        assert!(prereqs.gaps.is_empty());
        assert!(!out
            .writes
            .iter()
            .any(|w| matches!(w.content, SlotContent::KnowledgeGaps(_))));
    }

    #[test]
    fn heuristic_steps_follow_the_subject() {
        let dir = tempdir().unwrap();
        let demon = DecomposeDemon::new(store(&dir));
        let mut memory = memory_with_focus("fractions");
        memory.write(
            SlotDraft::new(SlotContent::Subject(Subject::Mathematics)).confidence(0.8),
            Some(DemonId::Parse),
        );
        let out = demon.run(&memory, Some(DemonId::Parse)).unwrap();
        let steps = out
            .writes
            .iter()
            .find_map(|w| match &w.content {
                SlotContent::SolutionSteps(s) => Some(s.clone()),
                _ => None,
            })
            .unwrap();
        assert!(steps[0].contains("identify what the problem"));
    }

    #[test]
    fn confusion_adds_simplification_and_chains_analogize() {
        let dir = tempdir().unwrap();
        let demon = DecomposeDemon::new(store(&dir));
        let mut memory = WorkingMemory::new();
        memory.write(
            SlotDraft::new(SlotContent::Intent(Intent::Confusion)).confidence(0.9),
            Some(DemonId::Parse),
        );
        memory.write(
            SlotDraft::new(SlotContent::NounPhrase("electricity".to_string())).ttl(10),
            Some(DemonId::Parse),
        );
        let out = demon.run(&memory, Some(DemonId::Parse)).unwrap();
        assert!(out
            .writes
            .iter()
            .any(|w| matches!(w.content, SlotContent::SimplificationNeeded(_))));
        assert_eq!(out.chain, vec![DemonId::Analogize, DemonId::Question]);
    }
}
