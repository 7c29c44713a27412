//! Hypervisor: the per-turn scheduler that drives the demon chain to a
//! terminal response under hard resource budgets.
//!
//! Scheduling is chain-only: the queue is seeded by `new_input` demons and
//! grows only from chain hints returned by fired demons. Tag triggers are
//! never consulted mid-turn; that is what makes turn termination provable.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

use crate::demons::{Action, Demon, DemonId, DemonRegistry, Trigger};
use crate::memory::{SlotContent, SlotDraft, Tag, WorkingMemory};

/// Canonical reply when no demon produced one.
pub const FALLBACK_RESPONSE: &str =
    "I'd love to help you learn! What topic are you curious about today?";

/// Slot tags that never survive a turn.
const EPHEMERAL_TAGS: [Tag; 19] = [
    Tag::RawInput,
    Tag::Intent,
    Tag::NounPhrase,
    Tag::QuestionFocus,
    Tag::Relation,
    Tag::ContextFact,
    Tag::Hierarchy,
    Tag::InferredRelation,
    Tag::Contradiction,
    Tag::ClaimAssessment,
    Tag::UnknownConcepts,
    Tag::Decomposition,
    Tag::Prerequisites,
    Tag::KnowledgeGaps,
    Tag::Examples,
    Tag::SolutionSteps,
    Tag::SimplificationNeeded,
    Tag::Analogy,
    Tag::FuzzyMatch,
];

/// Resource budgets for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypervisorConfig {
    pub max_ticks_per_turn: u32,
    pub max_demons_per_tick: usize,
    pub max_memory_slots: usize,
    pub tick_timeout_ms: u64,
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            max_ticks_per_turn: 20,
            max_demons_per_tick: 5,
            max_memory_slots: 100,
            tick_timeout_ms: 500,
        }
    }
}

impl HypervisorConfig {
    /// Tighter profile used by the tutor kernel.
    pub fn tutor() -> Self {
        Self {
            max_ticks_per_turn: 15,
            max_demons_per_tick: 4,
            max_memory_slots: 80,
            tick_timeout_ms: 300,
        }
    }
}

/// Record of one scheduling step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickResult {
    pub tick: u64,
    pub demons_fired: Vec<DemonId>,
    pub slots_written: usize,
    pub slots_evicted: usize,
    pub actions: Vec<Action>,
    pub duration_ms: u64,
}

/// Everything one turn produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub response: String,
    pub trace: Vec<TickResult>,
    pub actions: Vec<Action>,
    /// Demon invocations in this turn, including the post-turn learn.
    pub demons_fired: u64,
}

pub struct Hypervisor {
    config: HypervisorConfig,
}

impl Hypervisor {
    pub fn new(config: HypervisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HypervisorConfig {
        &self.config
    }

    /// Drives a single turn: seed with `new_input` demons, follow chain
    /// hints until a terminal response, then learn and sweep.
    pub fn run_turn(
        &self,
        registry: &DemonRegistry,
        memory: &mut WorkingMemory,
        input: &str,
    ) -> TurnOutcome {
        memory.write(
            SlotDraft::new(SlotContent::RawInput(input.to_string())).confidence(1.0),
            None,
        );

        // Each pending entry remembers the demon whose chain hint enlisted it.
        let mut pending: VecDeque<(DemonId, Option<DemonId>)> = registry
            .with_trigger(&Trigger::NewInput)
            .into_iter()
            .map(|id| (id, None))
            .collect();
        let mut response: Option<String> = None;
        let mut trace: Vec<TickResult> = Vec::new();
        let mut all_actions: Vec<Action> = Vec::new();
        let mut fired_total: u64 = 0;
        let mut ticks = 0u32;
        let mut terminal = false;

        while !pending.is_empty() && ticks < self.config.max_ticks_per_turn && !terminal {
            ticks += 1;
            let tick_start = Instant::now();
            let mut fired_this_tick: Vec<DemonId> = Vec::new();
            let mut written = 0usize;
            let mut evicted = 0usize;
            let mut tick_actions: Vec<Action> = Vec::new();
            let mut new_chain: Vec<(DemonId, Option<DemonId>)> = Vec::new();

            let batch: Vec<(DemonId, Option<DemonId>)> = {
                let take = self.config.max_demons_per_tick.min(pending.len());
                pending.drain(..take).collect()
            };

            for (id, chained_from) in batch {
                if fired_this_tick.contains(&id) {
                    continue;
                }
                if tick_start.elapsed().as_millis() as u64 > self.config.tick_timeout_ms {
                    tracing::warn!(
                        target: "maieutic::hypervisor",
                        tick = ticks,
                        "tick timeout exceeded, stopping tick"
                    );
                    break;
                }
                let Some(demon) = registry.get(id) else {
                    tracing::warn!(target: "maieutic::hypervisor", demon = %id, "demon not registered");
                    continue;
                };
                let output = match demon.run(memory, chained_from) {
                    Ok(output) => output,
                    Err(e) => {
                        tracing::error!(
                            target: "maieutic::hypervisor",
                            demon = %id,
                            error = %e,
                            "demon failed; turn continues"
                        );
                        fired_this_tick.push(id);
                        fired_total += 1;
                        continue;
                    }
                };
                fired_this_tick.push(id);
                fired_total += 1;

                written += output.writes.len();
                for draft in output.writes {
                    memory.write(draft, Some(id));
                }
                for slot_id in output.evict {
                    if memory.evict(slot_id) {
                        evicted += 1;
                    }
                }
                if let Some(focus) = output.focus {
                    memory.set_focus(focus);
                }
                let overflow = memory.enforce_limit(self.config.max_memory_slots);
                if !overflow.is_empty() {
                    tracing::debug!(
                        target: "maieutic::hypervisor",
                        count = overflow.len(),
                        "memory pressure evictions"
                    );
                    evicted += overflow.len();
                }

                let mut responded_now = false;
                for action in &output.actions {
                    if response.is_none() {
                        if let Some(text) = action.response_text() {
                            response = Some(text.to_string());
                            responded_now = true;
                        }
                    }
                }
                tick_actions.extend(output.actions);

                if response.is_none() {
                    new_chain.extend(output.chain.iter().map(|next| (*next, Some(id))));
                } else if responded_now && output.chain.is_empty() {
                    terminal = true;
                    break;
                }
            }

            let decayed = memory.tick();
            evicted += decayed.len();

            for (id, source) in new_chain {
                if !pending.iter().any(|(pid, _)| *pid == id) {
                    pending.push_back((id, source));
                }
            }

            all_actions.extend(tick_actions.iter().cloned());
            trace.push(TickResult {
                tick: memory.total_ticks(),
                demons_fired: fired_this_tick,
                slots_written: written,
                slots_evicted: evicted,
                actions: tick_actions,
                duration_ms: tick_start.elapsed().as_millis() as u64,
            });

            if pending.is_empty() && response.is_some() {
                break;
            }
        }
        if ticks >= self.config.max_ticks_per_turn && response.is_none() {
            tracing::warn!(
                target: "maieutic::hypervisor",
                ticks,
                "tick budget exhausted without a response"
            );
        }

        // Post-turn learn, independent of the chain model.
        if let Some(learn) = registry.get(DemonId::Learn) {
            match learn.run(memory, None) {
                Ok(output) => {
                    fired_total += 1;
                    for draft in output.writes {
                        memory.write(draft, Some(DemonId::Learn));
                    }
                    all_actions.extend(output.actions);
                }
                Err(e) => {
                    tracing::error!(
                        target: "maieutic::hypervisor",
                        error = %e,
                        "post-turn learn failed"
                    );
                }
            }
        }

        let swept = memory.sweep_tags(&EPHEMERAL_TAGS);
        tracing::debug!(
            target: "maieutic::hypervisor",
            ticks,
            swept = swept.len(),
            slots = memory.len(),
            "turn complete"
        );

        TurnOutcome {
            response: response.unwrap_or_else(|| FALLBACK_RESPONSE.to_string()),
            trace,
            actions: all_actions,
            demons_fired: fired_total,
        }
    }
}
