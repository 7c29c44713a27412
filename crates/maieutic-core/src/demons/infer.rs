//! Infer demon: small forward inference over the edges in working memory.
//!
//! Four rules in one pass: bounded transitive closure, property inheritance
//! through `is_a`, contradiction detection over `equals`, and claim
//! assessment. Inferred edges do not feed later rules in the same run.

use std::collections::{HashMap, HashSet};

use super::{current_intent, edge_facts, Demon, DemonId, DemonOutput, Trigger};
use crate::error::KernelResult;
use crate::graph::RelationType;
use crate::memory::{
    ClaimAssessment, Contradiction, EdgeFact, HierarchyFact, Intent, SlotContent, SlotDraft, Tag,
    WorkingMemory,
};

const DESCRIPTION: &str =
    "Derives transitive edges, inherited properties, contradictions, and claim support";

/// Relation types the transitive rule closes over.
const TRANSITIVE_TYPES: [RelationType; 5] = [
    RelationType::IsA,
    RelationType::Causes,
    RelationType::Requires,
    RelationType::PartOf,
    RelationType::Precedes,
];

const TRANSITIVE_DECAY: f32 = 0.9;
const INHERITANCE_DECAY: f32 = 0.85;

pub struct InferDemon;

impl InferDemon {
    pub fn new() -> Self {
        Self
    }

    /// The working corpus: relation + context-fact edges plus hierarchy hops,
    /// deduplicated by (from, type, to) keeping the max weight.
    fn corpus(memory: &WorkingMemory) -> Vec<EdgeFact> {
        let mut edges = edge_facts(memory, &Tag::Relation);
        edges.extend(edge_facts(memory, &Tag::ContextFact));
        for slot in memory.find_by_tag(&Tag::Hierarchy) {
            if let SlotContent::Hierarchy(HierarchyFact { child, parent, weight }) = &slot.content {
                edges.push(EdgeFact {
                    from: child.clone(),
                    rel_type: RelationType::IsA,
                    to: parent.clone(),
                    weight: *weight,
                });
            }
        }
        let mut best: HashMap<(String, RelationType, String), f32> = HashMap::new();
        for e in edges {
            let key = (e.from, e.rel_type, e.to);
            let entry = best.entry(key).or_insert(e.weight);
            if e.weight > *entry {
                *entry = e.weight;
            }
        }
        best.into_iter()
            .map(|((from, rel_type, to), weight)| EdgeFact { from, rel_type, to, weight })
            .collect()
    }

    fn transitive_closure(corpus: &[EdgeFact], known: &HashSet<(String, RelationType, String)>) -> Vec<EdgeFact> {
        let mut inferred = Vec::new();
        let mut emitted: HashSet<(String, RelationType, String)> = HashSet::new();
        for t in TRANSITIVE_TYPES {
            for e1 in corpus.iter().filter(|e| e.rel_type == t) {
                for e2 in corpus.iter().filter(|e| e.rel_type == t && e.from == e1.to) {
                    if e1.from == e2.to {
                        continue;
                    }
                    let key = (e1.from.clone(), t, e2.to.clone());
                    if known.contains(&key) || !emitted.insert(key) {
                        continue;
                    }
                    inferred.push(EdgeFact {
                        from: e1.from.clone(),
                        rel_type: t,
                        to: e2.to.clone(),
                        weight: e1.weight.min(e2.weight) * TRANSITIVE_DECAY,
                    });
                }
            }
        }
        inferred
    }

    fn inherit_properties(corpus: &[EdgeFact], known: &HashSet<(String, RelationType, String)>) -> Vec<EdgeFact> {
        let mut inferred = Vec::new();
        let mut emitted: HashSet<(String, RelationType, String)> = HashSet::new();
        for is_a in corpus.iter().filter(|e| e.rel_type == RelationType::IsA) {
            for prop in corpus.iter().filter(|e| {
                e.from == is_a.to
                    && matches!(e.rel_type, RelationType::Has | RelationType::Requires)
            }) {
                let key = (is_a.from.clone(), prop.rel_type, prop.to.clone());
                if known.contains(&key) || !emitted.insert(key) {
                    continue;
                }
                inferred.push(EdgeFact {
                    from: is_a.from.clone(),
                    rel_type: prop.rel_type,
                    to: prop.to.clone(),
                    weight: is_a.weight.min(prop.weight) * INHERITANCE_DECAY,
                });
            }
        }
        inferred
    }

    fn detect_contradictions(corpus: &[EdgeFact]) -> Vec<Contradiction> {
        let mut by_from: HashMap<&str, Vec<&EdgeFact>> = HashMap::new();
        for e in corpus.iter().filter(|e| e.rel_type == RelationType::Equals) {
            by_from.entry(e.from.as_str()).or_default().push(e);
        }
        let opposes: Vec<(&str, &str)> = corpus
            .iter()
            .filter(|e| e.rel_type == RelationType::Opposes)
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect();

        let mut out = Vec::new();
        let mut froms: Vec<&&str> = by_from.keys().collect();
        froms.sort();
        for from in froms {
            let mut targets: Vec<&str> = by_from[*from].iter().map(|e| e.to.as_str()).collect();
            targets.sort();
            targets.dedup();
            for i in 0..targets.len() {
                for j in (i + 1)..targets.len() {
                    let (t1, t2) = (targets[i], targets[j]);
                    out.push(Contradiction {
                        concept: from.to_string(),
                        claim1: format!("{} equals {}", from, t1),
                        claim2: format!("{} equals {}", from, t2),
                        reason: format!("{} cannot be equal to both {} and {}", from, t1, t2),
                    });
                }
            }
            // equals targets that are themselves linked by an opposes edge
            for (a, b) in &opposes {
                if targets.contains(a) && targets.contains(b) {
                    out.push(Contradiction {
                        concept: from.to_string(),
                        claim1: format!("{} equals {}", from, a),
                        claim2: format!("{} equals {}", from, b),
                        reason: format!(
                            "{} is equated with {} and {}, which oppose each other",
                            from, a, b
                        ),
                    });
                }
            }
        }
        out
    }

    fn assess_claim(corpus: &[EdgeFact], hierarchy: &[HierarchyFact]) -> ClaimAssessment {
        let supported: Vec<EdgeFact> =
            corpus.iter().filter(|e| e.weight > 0.5).cloned().collect();
        let weak: Vec<EdgeFact> = corpus.iter().filter(|e| e.weight <= 0.5).cloned().collect();

        let mut concepts: Vec<&str> = Vec::new();
        for e in corpus {
            for c in [e.from.as_str(), e.to.as_str()] {
                if !concepts.contains(&c) {
                    concepts.push(c);
                }
            }
        }
        let in_hierarchy: HashSet<&str> = hierarchy
            .iter()
            .flat_map(|h| [h.child.as_str(), h.parent.as_str()])
            .collect();
        let unsupported: Vec<String> = concepts
            .iter()
            .filter(|c| {
                let grounded = corpus.iter().any(|e| {
                    e.weight > 0.3 && (e.from.as_str() == **c || e.to.as_str() == **c)
                });
                !grounded && !in_hierarchy.contains(**c)
            })
            .map(|c| c.to_string())
            .collect();

        let confidence = if concepts.is_empty() {
            0.0
        } else {
            supported.len() as f32 / concepts.len() as f32
        };
        ClaimAssessment {
            supported,
            weak,
            unsupported,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

impl Default for InferDemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Demon for InferDemon {
    fn id(&self) -> DemonId {
        DemonId::Infer
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn triggers(&self) -> Vec<Trigger> {
        vec![
            Trigger::ChainFrom(DemonId::Relate),
            Trigger::TagPresent(Tag::Relation),
        ]
    }

    fn run(
        &self,
        memory: &WorkingMemory,
        _chained_from: Option<DemonId>,
    ) -> KernelResult<DemonOutput> {
        let corpus = Self::corpus(memory);
        let known: HashSet<(String, RelationType, String)> = corpus
            .iter()
            .map(|e| (e.from.clone(), e.rel_type, e.to.clone()))
            .collect();

        let mut inferred = Self::transitive_closure(&corpus, &known);
        inferred.extend(Self::inherit_properties(&corpus, &known));
        let contradictions = Self::detect_contradictions(&corpus);

        let mut out = DemonOutput::new();
        for edge in &inferred {
            out.writes.push(
                SlotDraft::new(SlotContent::InferredRelation(edge.clone()))
                    .confidence(edge.weight),
            );
        }
        for c in &contradictions {
            out.writes
                .push(SlotDraft::new(SlotContent::Contradiction(c.clone())).confidence(0.9));
        }

        if current_intent(memory) == Some(Intent::Claim) {
            let hierarchy: Vec<HierarchyFact> = memory
                .find_by_tag(&Tag::Hierarchy)
                .into_iter()
                .filter_map(|s| match &s.content {
                    SlotContent::Hierarchy(h) => Some(h.clone()),
                    _ => None,
                })
                .collect();
            let assessment = Self::assess_claim(&corpus, &hierarchy);
            out.writes.push(
                SlotDraft::new(SlotContent::ClaimAssessment(assessment)).confidence(0.8),
            );
        }

        if !contradictions.is_empty() {
            out.chain.push(DemonId::Question);
        }
        if !inferred.is_empty() {
            out.chain.push(DemonId::Decompose);
        }
        if !out.chain.contains(&DemonId::Question) {
            out.chain.push(DemonId::Question);
        }

        tracing::debug!(
            target: "maieutic::demon",
            demon = "infer",
            corpus = corpus.len(),
            inferred = inferred.len(),
            contradictions = contradictions.len(),
            "inference pass complete"
        );
        Ok(out)
    }
}
