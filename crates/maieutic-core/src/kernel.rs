//! Kernel facade: owns one graph handle, one working memory, and the
//! hypervisor, and exposes the `process(text) -> response` contract.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::demons::{default_registry, DemonDescriptor, DemonRegistry};
use crate::error::{KernelError, KernelResult};
use crate::graph::{GraphStats, GraphStore};
use crate::memory::{MemoryStats, WorkingMemory};
use crate::orchestrator::{Hypervisor, TickResult};
use crate::shared::KernelConfig;

/// Longest accepted utterance, in characters.
pub const MAX_INPUT_CHARS: usize = 5000;

/// One processed turn, as seen by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub text: String,
    /// Per-tick trace; present when the debug flag is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TickResult>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemonStats {
    pub registered: usize,
    pub total_fired: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelStats {
    pub memory: MemoryStats,
    pub graph: GraphStats,
    pub demons: DemonStats,
}

pub struct Kernel {
    config: KernelConfig,
    graph: Arc<GraphStore>,
    registry: DemonRegistry,
    hypervisor: Hypervisor,
    /// Turns serialize on this lock; `process` is not re-entrant.
    memory: Mutex<WorkingMemory>,
    total_fired: AtomicU64,
}

impl Kernel {
    /// Builds a kernel from config: opens the store and wires the standard
    /// demon registry against it.
    pub fn new(config: KernelConfig) -> KernelResult<Self> {
        let graph = Arc::new(GraphStore::open_path_with(
            &config.storage_path,
            config.resolve_duplicate_policy(),
        )?);
        let registry = default_registry(Arc::clone(&graph));
        let hypervisor = Hypervisor::new(config.hypervisor_config());
        tracing::info!(
            target: "maieutic::kernel",
            storage = %config.storage_path,
            demons = registry.len(),
            profile = %config.profile,
            "kernel constructed"
        );
        Ok(Self {
            config,
            graph,
            registry,
            hypervisor,
            memory: Mutex::new(WorkingMemory::new()),
            total_fired: AtomicU64::new(0),
        })
    }

    /// Verifies the persistent store is ready.
    pub fn init(&self) -> KernelResult<()> {
        self.graph.stats()?;
        self.graph.flush()?;
        Ok(())
    }

    /// The persistent graph handle, for bootstrap and diagnostics.
    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    fn validate(text: &str) -> KernelResult<()> {
        if text.trim().is_empty() {
            return Err(KernelError::EmptyInput);
        }
        let len = text.chars().count();
        if len > MAX_INPUT_CHARS {
            return Err(KernelError::InputTooLong {
                len,
                limit: MAX_INPUT_CHARS,
            });
        }
        Ok(())
    }

    /// Processes one utterance to a guiding question. The trace is attached
    /// only when the config's debug flag is set.
    pub fn process(&self, text: &str) -> KernelResult<TurnResponse> {
        let outcome = self.run_turn(text)?;
        Ok(TurnResponse {
            text: outcome.0,
            trace: if self.config.debug_trace {
                Some(outcome.1)
            } else {
                None
            },
        })
    }

    /// Like [`Kernel::process`] but always returns the trace.
    pub fn process_with_trace(&self, text: &str) -> KernelResult<TurnResponse> {
        let outcome = self.run_turn(text)?;
        Ok(TurnResponse {
            text: outcome.0,
            trace: Some(outcome.1),
        })
    }

    fn run_turn(&self, text: &str) -> KernelResult<(String, Vec<TickResult>)> {
        Self::validate(text)?;
        let mut memory = self.memory.lock().unwrap();
        let outcome = self.hypervisor.run_turn(&self.registry, &mut memory, text);
        self.total_fired.fetch_add(outcome.demons_fired, Ordering::Relaxed);
        tracing::info!(
            target: "maieutic::kernel",
            ticks = outcome.trace.len(),
            demons = outcome.demons_fired,
            "turn processed"
        );
        Ok((outcome.response, outcome.trace))
    }

    pub fn stats(&self) -> KernelResult<KernelStats> {
        let memory = self.memory.lock().unwrap();
        Ok(KernelStats {
            memory: memory.stats(),
            graph: self.graph.stats()?,
            demons: DemonStats {
                registered: self.registry.len(),
                total_fired: self.total_fired.load(Ordering::Relaxed),
            },
        })
    }

    /// JSON snapshot of working memory.
    pub fn save_state(&self) -> KernelResult<String> {
        self.memory.lock().unwrap().to_json()
    }

    /// Restores a snapshot. A blob that fails to parse mutates nothing.
    pub fn load_state(&self, blob: &str) -> KernelResult<()> {
        let restored = WorkingMemory::from_json(blob)?;
        *self.memory.lock().unwrap() = restored;
        Ok(())
    }

    pub fn list_demons(&self) -> Vec<DemonDescriptor> {
        self.registry.descriptors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn kernel(dir: &tempfile::TempDir) -> Kernel {
        let config = KernelConfig {
            storage_path: dir.path().join("graph").to_string_lossy().into_owned(),
            ..KernelConfig::default()
        };
        let kernel = Kernel::new(config).unwrap();
        kernel.init().unwrap();
        kernel
    }

    #[test]
    fn rejects_empty_and_oversized_input() {
        let dir = tempdir().unwrap();
        let k = kernel(&dir);
        assert!(matches!(k.process(""), Err(KernelError::EmptyInput)));
        assert!(matches!(k.process("   "), Err(KernelError::EmptyInput)));
        let long = "x".repeat(MAX_INPUT_CHARS + 1);
        assert!(matches!(
            k.process(&long),
            Err(KernelError::InputTooLong { .. })
        ));
    }

    #[test]
    fn every_input_gets_a_non_empty_response() {
        let dir = tempdir().unwrap();
        let k = kernel(&dir);
        for text in ["hi", "what is gravity?", "asdf qwerty zxcv", "42?"] {
            let response = k.process(text).unwrap();
            assert!(!response.text.is_empty(), "empty response for {:?}", text);
        }
    }

    #[test]
    fn trace_is_gated_by_the_debug_flag() {
        let dir = tempdir().unwrap();
        let k = kernel(&dir);
        assert!(k.process("hi").unwrap().trace.is_none());
        assert!(k.process_with_trace("hi").unwrap().trace.is_some());

        let dir2 = tempdir().unwrap();
        let config = KernelConfig {
            storage_path: dir2.path().join("graph").to_string_lossy().into_owned(),
            debug_trace: true,
            ..KernelConfig::default()
        };
        let k2 = Kernel::new(config).unwrap();
        assert!(k2.process("hi").unwrap().trace.is_some());
    }

    #[test]
    fn stats_reflect_turns_and_registry() {
        let dir = tempdir().unwrap();
        let k = kernel(&dir);
        let before = k.stats().unwrap();
        assert_eq!(before.demons.registered, 7);
        assert_eq!(before.demons.total_fired, 0);
        k.process("what is gravity?").unwrap();
        let after = k.stats().unwrap();
        assert!(after.demons.total_fired > 0);
        assert!(after.memory.total_ticks > 0);
    }

    #[test]
    fn state_round_trips_and_bad_blobs_leave_memory_untouched() {
        let dir = tempdir().unwrap();
        let k = kernel(&dir);
        k.process("what is gravity?").unwrap();
        let blob = k.save_state().unwrap();

        assert!(k.load_state("{broken").is_err());
        // memory unchanged: saving again yields the same snapshot
        assert_eq!(k.save_state().unwrap(), blob);

        k.load_state(&blob).unwrap();
        assert_eq!(k.save_state().unwrap(), blob);
    }

    #[test]
    fn list_demons_names_all_seven() {
        let dir = tempdir().unwrap();
        let k = kernel(&dir);
        let names: Vec<String> = k.list_demons().into_iter().map(|d| d.name).collect();
        for expected in ["parse", "relate", "infer", "decompose", "analogize", "question", "learn"] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }
    }
}
