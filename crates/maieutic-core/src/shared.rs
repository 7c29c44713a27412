//! Shared configuration and small helpers used across the kernel.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{KernelError, KernelResult};
use crate::graph::DuplicatePolicy;
use crate::orchestrator::HypervisorConfig;

/// Kernel configuration. Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Path for the Sled-backed graph store.
    pub storage_path: String,
    /// Hypervisor budget profile: "default" (20/5/100/500) or "tutor" (15/4/80/300).
    pub profile: String,
    /// When true, `process` attaches the per-tick trace to every response.
    pub debug_trace: bool,
    /// Duplicate-edge policy for repeated `link` calls: "merge" or "keep".
    pub duplicate_policy: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            storage_path: "./data/maieutic_graph".to_string(),
            profile: "tutor".to_string(),
            debug_trace: false,
            duplicate_policy: "merge".to_string(),
        }
    }
}

impl KernelConfig {
    /// Load config from file and environment.
    /// Precedence: env `MAIEUTIC_CONFIG` path > `config/kernel.toml` > defaults,
    /// then environment with prefix `MAIEUTIC` and `__` separator on top.
    pub fn load() -> KernelResult<Self> {
        let config_path =
            std::env::var("MAIEUTIC_CONFIG").unwrap_or_else(|_| "config/kernel".to_string());
        let builder = config::Config::builder()
            .set_default("storage_path", "./data/maieutic_graph")
            .and_then(|b| b.set_default("profile", "tutor"))
            .and_then(|b| b.set_default("debug_trace", false))
            .and_then(|b| b.set_default("duplicate_policy", "merge"))
            .map_err(|e| KernelError::ConfigError(e.to_string()))?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("MAIEUTIC").separator("__"))
            .build()
            .map_err(|e| KernelError::ConfigError(e.to_string()))?;

        built
            .try_deserialize()
            .map_err(|e| KernelError::ConfigError(e.to_string()))
    }

    /// Resolved hypervisor budgets for the configured profile.
    pub fn hypervisor_config(&self) -> HypervisorConfig {
        match self.profile.as_str() {
            "tutor" => HypervisorConfig::tutor(),
            _ => HypervisorConfig::default(),
        }
    }

    /// Resolved duplicate-edge policy. Unrecognized values fall back to merge.
    pub fn resolve_duplicate_policy(&self) -> DuplicatePolicy {
        match self.duplicate_policy.as_str() {
            "keep" => DuplicatePolicy::Keep,
            _ => DuplicatePolicy::Merge,
        }
    }
}

/// Current unix epoch time in milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_resolves_tutor_budgets() {
        let config = KernelConfig::default();
        let hv = config.hypervisor_config();
        assert_eq!(hv.max_ticks_per_turn, 15);
        assert_eq!(hv.max_demons_per_tick, 4);
        assert_eq!(hv.max_memory_slots, 80);
        assert_eq!(hv.tick_timeout_ms, 300);
    }

    #[test]
    fn unknown_duplicate_policy_falls_back_to_merge() {
        let config = KernelConfig {
            duplicate_policy: "whatever".into(),
            ..KernelConfig::default()
        };
        assert_eq!(config.resolve_duplicate_policy(), DuplicatePolicy::Merge);
    }
}
