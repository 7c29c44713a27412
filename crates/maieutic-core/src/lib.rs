//! maieutic-core: a local, LLM-free reasoning kernel for a Socratic tutor.
//!
//! The kernel interprets short utterances against a persistent noun-and-relation
//! graph, derives new facts with small pure reasoners ("demons"), and answers
//! with a guiding question instead of a declarative statement. One turn flows
//! `parse -> {relate, infer, ...} -> question -> learn`, mediated entirely by
//! the hypervisor's chain-only scheduler.
//!
//! | Module       | Role                                                    |
//! |--------------|---------------------------------------------------------|
//! | graph        | Persistent directed multigraph of nouns and relations   |
//! | memory       | Transient tagged working-memory slots with TTLs         |
//! | demons       | The seven reasoners and their registry                  |
//! | orchestrator | Per-turn scheduler (hypervisor) with resource budgets   |
//! | kernel       | Process-level facade: `process(text) -> response`       |

mod demons;
mod error;
mod graph;
mod kernel;
mod memory;
mod orchestrator;
mod shared;

pub use demons::{
    default_registry, Action, Demon, DemonDescriptor, DemonId, DemonOutput, DemonRegistry,
    Trigger,
};
pub use error::{KernelError, KernelResult};
pub use graph::{
    DuplicatePolicy, GraphStats, GraphStore, Noun, NounFilter, NounType, Pattern, QueryTriple,
    Relation, RelationType, TraversalNode,
};
pub use kernel::{DemonStats, Kernel, KernelStats, TurnResponse, MAX_INPUT_CHARS};
pub use memory::{
    Analogy, AnalogyMapping, ClaimAssessment, Contradiction, Decomposition, EdgeFact,
    HierarchyFact, Intent, MemoryStats, Prerequisites, Slot, SlotContent, SlotDraft, Subject,
    Tag, WorkingMemory,
};
pub use orchestrator::{Hypervisor, HypervisorConfig, TickResult, TurnOutcome};
pub use shared::{now_ms, KernelConfig};
