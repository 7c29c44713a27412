//! Question demon: the terminal step of every chain. Reads the state of
//! working memory and produces a guiding question, never an answer.
//!
//! Response construction is a strict first-match dispatch: greeting,
//! contradiction, confusion, claim, question/request, correction, fallback.

use super::{
    current_intent, current_subject, focus_concept, Demon, DemonId, DemonOutput, Trigger,
};
use crate::error::KernelResult;
use crate::graph::RelationType;
use crate::memory::{
    Analogy, ClaimAssessment, Contradiction, Decomposition, EdgeFact, Intent, SlotContent,
    SlotDraft, Subject, Tag, WorkingMemory,
};

const DESCRIPTION: &str = "Builds the guiding question that closes the turn";

const RESPONSE_TTL: u32 = 20;

const GENERAL_GREETINGS: [&str; 4] = [
    "Hello! What would you like to learn about today?",
    "Hi there! What topic is on your mind?",
    "Welcome back! What should we dig into today?",
    "Hey! Pick a topic and let's explore it together.",
];

pub struct QuestionDemon;

impl QuestionDemon {
    pub fn new() -> Self {
        Self
    }

    fn first_contradiction(memory: &WorkingMemory) -> Option<Contradiction> {
        memory
            .find_by_tag(&Tag::Contradiction)
            .into_iter()
            .find_map(|s| match &s.content {
                SlotContent::Contradiction(c) => Some(c.clone()),
                _ => None,
            })
    }

    fn first_analogy(memory: &WorkingMemory) -> Option<Analogy> {
        memory
            .find_by_tag(&Tag::Analogy)
            .into_iter()
            .find_map(|s| match &s.content {
                SlotContent::Analogy(a) => Some(a.clone()),
                _ => None,
            })
    }

    fn first_decomposition(memory: &WorkingMemory) -> Option<Decomposition> {
        memory
            .find_by_tag(&Tag::Decomposition)
            .into_iter()
            .find_map(|s| match &s.content {
                SlotContent::Decomposition(d) => Some(d.clone()),
                _ => None,
            })
    }

    fn claim_assessment(memory: &WorkingMemory) -> Option<ClaimAssessment> {
        memory
            .latest_by_tag(&Tag::ClaimAssessment)
            .and_then(|s| match &s.content {
                SlotContent::ClaimAssessment(a) => Some(a.clone()),
                _ => None,
            })
    }

    fn knowledge_gaps(memory: &WorkingMemory) -> Vec<String> {
        memory
            .latest_by_tag(&Tag::KnowledgeGaps)
            .and_then(|s| match &s.content {
                SlotContent::KnowledgeGaps(g) => Some(g.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn unknown_concepts(memory: &WorkingMemory) -> Vec<String> {
        memory
            .latest_by_tag(&Tag::UnknownConcepts)
            .and_then(|s| match &s.content {
                SlotContent::UnknownConcepts(u) => Some(u.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn examples(memory: &WorkingMemory) -> Vec<String> {
        memory
            .latest_by_tag(&Tag::Examples)
            .and_then(|s| match &s.content {
                SlotContent::Examples(e) => Some(e.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn solution_steps(memory: &WorkingMemory) -> Vec<String> {
        memory
            .latest_by_tag(&Tag::SolutionSteps)
            .and_then(|s| match &s.content {
                SlotContent::SolutionSteps(s) => Some(s.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn first_inferred(memory: &WorkingMemory) -> Option<EdgeFact> {
        memory
            .find_by_tag(&Tag::InferredRelation)
            .into_iter()
            .find_map(|s| match &s.content {
                SlotContent::InferredRelation(e) => Some(e.clone()),
                _ => None,
            })
    }

    /// The edge the leading question is keyed on: a `relation` slot first,
    /// then an inferred one, then a hierarchy hop, then a context fact.
    fn pick_edge(memory: &WorkingMemory) -> Option<EdgeFact> {
        for tag in [Tag::Relation, Tag::InferredRelation] {
            if let Some(edge) = memory.find_by_tag(&tag).into_iter().find_map(|s| {
                match &s.content {
                    SlotContent::Relation(e) | SlotContent::InferredRelation(e) => Some(e.clone()),
                    _ => None,
                }
            }) {
                return Some(edge);
            }
        }
        if let Some(edge) = memory
            .find_by_tag(&Tag::Hierarchy)
            .into_iter()
            .find_map(|s| match &s.content {
                SlotContent::Hierarchy(h) => Some(EdgeFact {
                    from: h.child.clone(),
                    rel_type: RelationType::IsA,
                    to: h.parent.clone(),
                    weight: h.weight,
                }),
                _ => None,
            })
        {
            return Some(edge);
        }
        memory
            .find_by_tag(&Tag::ContextFact)
            .into_iter()
            .find_map(|s| match &s.content {
                SlotContent::ContextFact(e) => Some(e.clone()),
                _ => None,
            })
    }

    fn leading_question(edge: &EdgeFact) -> String {
        match edge.rel_type {
            RelationType::Causes => format!(
                "Here's a thread to pull: {} causes {}. What other effects of {} have you seen?",
                edge.from, edge.to, edge.from
            ),
            RelationType::IsA => format!(
                "So {} is a kind of {}. What other kinds of {} can you think of?",
                edge.from, edge.to, edge.to
            ),
            RelationType::Has | RelationType::Contains => format!(
                "{} has {} as one of its parts. What role do you think {} plays?",
                edge.from, edge.to, edge.to
            ),
            RelationType::Requires => format!(
                "{} requires {}. Why do you think {} is necessary?",
                edge.from, edge.to, edge.to
            ),
            RelationType::Opposes => format!(
                "{} and {} work against each other. What makes them opposites?",
                edge.from, edge.to
            ),
            _ => format!(
                "How do you think {} relates to {}?",
                edge.from, edge.to
            ),
        }
    }

    fn build_response(memory: &WorkingMemory) -> String {
        let intent = current_intent(memory);
        let focus = focus_concept(memory).unwrap_or_else(|| "this topic".to_string());

        // 1. Greeting
        if intent == Some(Intent::Greeting) {
            return match current_subject(memory) {
                Some(subject) if subject != Subject::General => format!(
                    "Hello! I see {} is on your mind. What would you like to explore first?",
                    subject.as_str().replace('_', " ")
                ),
                _ => {
                    let variant = (memory.total_ticks() as usize) % GENERAL_GREETINGS.len();
                    GENERAL_GREETINGS[variant].to_string()
                }
            };
        }

        // 2. Contradiction outranks everything but a greeting
        if let Some(c) = Self::first_contradiction(memory) {
            return format!(
                "Wait - I have conflicting information about {}. {}, but also {}. {}. Which one do you think is correct?",
                c.concept, c.claim1, c.claim2, c.reason
            );
        }

        // 3. Confusion
        let simplification = memory.latest_by_tag(&Tag::SimplificationNeeded).is_some();
        if intent == Some(Intent::Confusion) || simplification {
            let mut response = String::from("No problem - let's break this down together.");
            if let Some(analogy) = Self::first_analogy(memory) {
                response.push_str(&format!(" Think of it this way: {}", analogy.explanation));
            }
            match Self::first_decomposition(memory) {
                Some(d) if !d.parts.is_empty() => {
                    response.push_str(&format!(
                        " Let's start with one piece: what do you know about {}?",
                        d.parts[0]
                    ));
                }
                _ => {
                    response.push_str(&format!(
                        " What part of {} feels most confusing?",
                        focus
                    ));
                }
            }
            return response;
        }

        // 4. Claim with assessment
        if intent == Some(Intent::Claim) {
            if let Some(assessment) = Self::claim_assessment(memory) {
                if assessment.confidence > 0.7 {
                    return match Self::first_inferred(memory) {
                        Some(edge) => format!(
                            "That holds up well against what we've built so far. It even suggests something more: {} {} {}. What do you think follows from that?",
                            edge.from,
                            edge.rel_type.as_str().replace('_', " "),
                            edge.to
                        ),
                        None => "That holds up well against what we've built so far. What evidence convinced you of it?".to_string(),
                    };
                }
                if assessment.confidence < 0.3 {
                    let challenged = assessment
                        .unsupported
                        .first()
                        .cloned()
                        .unwrap_or_else(|| focus.clone());
                    return format!(
                        "Interesting claim! I don't know much about {} yet - what makes you say that?",
                        challenged
                    );
                }
                return "That might be right. Can you give me an example that supports it?"
                    .to_string();
            }
        }

        // 5. Question / request
        if matches!(intent, Some(Intent::Question) | Some(Intent::Request)) {
            let gaps = Self::knowledge_gaps(memory);
            if let Some(gap) = gaps.first() {
                return format!(
                    "Good question! Before we tackle {}, let's check a building block: what do you know about {}?",
                    focus, gap
                );
            }
            if Self::unknown_concepts(memory).contains(&focus) {
                let mut response = format!(
                    "I haven't explored {} with you yet - let's figure it out together!",
                    focus
                );
                if let Some(analogy) = Self::first_analogy(memory) {
                    response.push_str(&format!(" {}", analogy.explanation));
                }
                if let Some(step) = Self::solution_steps(memory).first() {
                    response.push_str(&format!(" A good first move is to {}.", step));
                }
                response.push_str(&format!(" What do you know about {} so far?", focus));
                return response;
            }
            if let Some(edge) = Self::pick_edge(memory) {
                let mut response = Self::leading_question(&edge);
                if let Some(d) = Self::first_decomposition(memory) {
                    if !d.parts.is_empty() {
                        let hint: Vec<String> = d.parts.iter().take(3).cloned().collect();
                        response.push_str(&format!(
                            " (Hint: {} involves {}.)",
                            d.concept,
                            hint.join(", ")
                        ));
                    }
                }
                return response;
            }
            if let Some(analogy) = Self::first_analogy(memory) {
                return format!(
                    "{} Does that comparison help? What would you add to it?",
                    analogy.explanation
                );
            }
            if let Some(example) = Self::examples(memory).first() {
                return format!(
                    "Let's start from an example: {}. What do you notice about it?",
                    example
                );
            }
            return format!(
                "I'm curious about {} too! What's your best guess about how it works?",
                focus
            );
        }

        // 6. Correction
        if intent == Some(Intent::Correction) {
            return "Fair enough - I appreciate the correction. What part was wrong, and what's the right way to think about it?".to_string();
        }

        // 7. Fallback
        format!(
            "Let's explore {} together - what would you like to know first?",
            focus
        )
    }
}

impl Default for QuestionDemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Demon for QuestionDemon {
    fn id(&self) -> DemonId {
        DemonId::Question
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn triggers(&self) -> Vec<Trigger> {
        vec![
            Trigger::ChainFrom(DemonId::Parse),
            Trigger::ChainFrom(DemonId::Relate),
            Trigger::ChainFrom(DemonId::Infer),
            Trigger::ChainFrom(DemonId::Decompose),
            Trigger::ChainFrom(DemonId::Analogize),
        ]
    }

    fn run(
        &self,
        memory: &WorkingMemory,
        _chained_from: Option<DemonId>,
    ) -> KernelResult<DemonOutput> {
        let response = Self::build_response(memory);
        let mut out = DemonOutput::new();
        out.writes.push(
            SlotDraft::new(SlotContent::Response(response.clone()))
                .confidence(0.9)
                .ttl(RESPONSE_TTL),
        );
        out.actions.push(super::Action::Ask(response));
        // terminal: no chain
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HierarchyFact;

    fn respond(memory: &WorkingMemory) -> String {
        let out = QuestionDemon::new().run(memory, Some(DemonId::Parse)).unwrap();
        out.actions
            .iter()
            .find_map(|a| a.response_text().map(str::to_string))
            .unwrap()
    }

    fn with_intent(intent: Intent) -> WorkingMemory {
        let mut memory = WorkingMemory::new();
        memory.write(
            SlotDraft::new(SlotContent::Intent(intent)).confidence(0.9),
            Some(DemonId::Parse),
        );
        memory
    }

    #[test]
    fn greeting_is_subject_aware() {
        let mut memory = with_intent(Intent::Greeting);
        memory.write(
            SlotDraft::new(SlotContent::Subject(Subject::Physics)).confidence(0.8),
            Some(DemonId::Parse),
        );
        assert!(respond(&memory).contains("physics"));
    }

    #[test]
    fn general_greeting_uses_a_fixed_variant_family() {
        let memory = with_intent(Intent::Greeting);
        assert!(GENERAL_GREETINGS.contains(&respond(&memory).as_str()));
    }

    #[test]
    fn contradiction_outranks_question_intent() {
        let mut memory = with_intent(Intent::Question);
        memory.write(
            SlotDraft::new(SlotContent::Contradiction(Contradiction {
                concept: "x".into(),
                claim1: "x equals 5".into(),
                claim2: "x equals 7".into(),
                reason: "x cannot be equal to both 5 and 7".into(),
            }))
            .confidence(0.9),
            Some(DemonId::Infer),
        );
        let response = respond(&memory);
        assert!(response.contains("cannot be equal to both 5 and 7"));
        assert!(response.contains("Which one do you think is correct?"));
    }

    #[test]
    fn confusion_injects_analogy_and_first_part() {
        let mut memory = with_intent(Intent::Confusion);
        memory.write(
            SlotDraft::new(SlotContent::Analogy(Analogy {
                concept: "electricity".into(),
                analog: "water flowing through pipes".into(),
                explanation: "Electricity flows through wires like water flows through pipes."
                    .into(),
                similarity: 0.85,
                shared_types: vec![],
                mapping: vec![],
            }))
            .confidence(0.85),
            Some(DemonId::Analogize),
        );
        memory.write(
            SlotDraft::new(SlotContent::Decomposition(Decomposition {
                concept: "electricity".into(),
                parts: vec!["current".into(), "voltage".into()],
            }))
            .confidence(0.8),
            Some(DemonId::Decompose),
        );
        let response = respond(&memory);
        assert!(response.contains("break this down"));
        assert!(response.contains("Electricity flows through wires"));
        assert!(response.contains("current"));
    }

    #[test]
    fn unknown_focus_invites_the_student_in() {
        let mut memory = with_intent(Intent::Question);
        memory.write(
            SlotDraft::new(SlotContent::QuestionFocus("gravity".into())).confidence(0.8),
            Some(DemonId::Parse),
        );
        memory.write(
            SlotDraft::new(SlotContent::UnknownConcepts(vec!["gravity".into()]))
                .confidence(0.8),
            Some(DemonId::Relate),
        );
        let response = respond(&memory);
        assert!(response.contains("gravity"));
        assert!(response.contains("What do you know about gravity so far?"));
    }

    #[test]
    fn knowledge_gaps_pivot_the_question() {
        let mut memory = with_intent(Intent::Question);
        memory.write(
            SlotDraft::new(SlotContent::QuestionFocus("algebra".into())).confidence(0.8),
            Some(DemonId::Parse),
        );
        memory.write(
            SlotDraft::new(SlotContent::KnowledgeGaps(vec!["arithmetic".into()]))
                .confidence(0.8),
            Some(DemonId::Decompose),
        );
        let response = respond(&memory);
        assert!(response.contains("arithmetic"));
    }

    #[test]
    fn relation_keyed_question_matches_edge_type() {
        let mut memory = with_intent(Intent::Question);
        memory.write(
            SlotDraft::new(SlotContent::Relation(EdgeFact {
                from: "friction".into(),
                rel_type: RelationType::Causes,
                to: "heat".into(),
                weight: 0.9,
            }))
            .confidence(0.9),
            Some(DemonId::Relate),
        );
        let response = respond(&memory);
        assert!(response.contains("friction causes heat"));
        assert!(response.contains("effects"));
    }

    #[test]
    fn hierarchy_feeds_the_leading_question_when_no_relations_exist() {
        let mut memory = with_intent(Intent::Question);
        memory.write(
            SlotDraft::new(SlotContent::Hierarchy(HierarchyFact {
                child: "dog".into(),
                parent: "mammal".into(),
                weight: 1.0,
            }))
            .confidence(0.8),
            Some(DemonId::Relate),
        );
        let response = respond(&memory);
        assert!(response.contains("dog is a kind of mammal"));
    }

    #[test]
    fn claim_branches_on_assessment_confidence() {
        let mut low = with_intent(Intent::Claim);
        low.write(
            SlotDraft::new(SlotContent::ClaimAssessment(ClaimAssessment {
                supported: vec![],
                weak: vec![],
                unsupported: vec!["moonlight".into()],
                confidence: 0.1,
            }))
            .confidence(0.8),
            Some(DemonId::Infer),
        );
        assert!(respond(&low).contains("moonlight"));

        let mut mid = with_intent(Intent::Claim);
        mid.write(
            SlotDraft::new(SlotContent::ClaimAssessment(ClaimAssessment {
                supported: vec![],
                weak: vec![],
                unsupported: vec![],
                confidence: 0.5,
            }))
            .confidence(0.8),
            Some(DemonId::Infer),
        );
        assert!(respond(&mid).contains("example"));
    }

    #[test]
    fn correction_acknowledges_and_asks_why() {
        let memory = with_intent(Intent::Correction);
        let response = respond(&memory);
        assert!(response.contains("correction"));
        assert!(response.contains('?'));
    }

    #[test]
    fn fallback_explores_the_focus() {
        let mut memory = WorkingMemory::new();
        memory.write(
            SlotDraft::new(SlotContent::NounPhrase("volcano".into())).ttl(10),
            Some(DemonId::Parse),
        );
        assert!(respond(&memory).contains("volcano"));
    }

    #[test]
    fn response_slot_is_written_with_ttl() {
        let memory = with_intent(Intent::Greeting);
        let out = QuestionDemon::new().run(&memory, None).unwrap();
        let draft = out
            .writes
            .iter()
            .find(|w| matches!(w.content, SlotContent::Response(_)))
            .unwrap();
        assert_eq!(draft.ttl, RESPONSE_TTL);
        assert!(out.chain.is_empty());
    }
}
