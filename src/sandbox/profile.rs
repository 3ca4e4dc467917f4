use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::types::{Difficulty, Language};
use crate::config::SandboxSettings;

/// Resource envelope applied to one sandboxed launch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionProfile {
    /// Address-space cap in bytes.
    pub memory_limit: u64,
    /// Hard CPU-time budget in whole seconds (rlimit granularity).
    pub cpu_time_limit_secs: u64,
    /// Wall-clock watchdog budget.
    pub wall_time_limit_ms: u64,
    /// Open file descriptor cap.
    pub fd_limit: u64,
    /// Output file size cap in bytes.
    pub file_size_limit: u64,
    /// Detach the process from the host network namespace.
    pub isolate_network: bool,
}

impl ExecutionProfile {
    /// Envelope for one (difficulty, language) pair.
    ///
    /// The configured fractional CPU share caps CPU time against the wall
    /// budget: share x wall, rounded up to rlimit's whole-second
    /// granularity. The JVM gets fixed extra headroom for its runtime
    /// footprint.
    pub fn for_submission(
        settings: &SandboxSettings,
        difficulty: Difficulty,
        language: Language,
    ) -> Self {
        let mut memory_mb = settings.memory_mb.get(difficulty);
        let mut fd_limit = 64;
        if language == Language::Java {
            memory_mb += 256;
            fd_limit = 256;
        }

        let wall_ms = settings.time_ms.get(difficulty);
        let cpu_secs = ((wall_ms as f64 / 1000.0) * settings.cpu_share).ceil() as u64;

        Self {
            memory_limit: memory_mb * 1024 * 1024,
            cpu_time_limit_secs: cpu_secs.max(1),
            wall_time_limit_ms: wall_ms,
            fd_limit,
            file_size_limit: 16 * 1024 * 1024,
            isolate_network: !settings.permissive,
        }
    }

    pub fn wall_time_limit(&self) -> Duration {
        Duration::from_millis(self.wall_time_limit_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_budget_scales_with_share() {
        let mut settings = SandboxSettings::default();
        settings.cpu_share = 0.5;
        let profile = ExecutionProfile::for_submission(&settings, Difficulty::Easy, Language::Python);
        // 10s wall at half a core -> 5s of CPU.
        assert_eq!(profile.cpu_time_limit_secs, 5);
        assert_eq!(profile.wall_time_limit_ms, 10_000);
    }

    #[test]
    fn java_gets_memory_headroom() {
        let settings = SandboxSettings::default();
        let python = ExecutionProfile::for_submission(&settings, Difficulty::Medium, Language::Python);
        let java = ExecutionProfile::for_submission(&settings, Difficulty::Medium, Language::Java);
        assert_eq!(java.memory_limit - python.memory_limit, 256 * 1024 * 1024);
        assert!(java.fd_limit > python.fd_limit);
    }

    #[test]
    fn permissive_mode_keeps_host_network() {
        let mut settings = SandboxSettings::default();
        settings.permissive = true;
        let profile = ExecutionProfile::for_submission(&settings, Difficulty::Hard, Language::Cpp);
        assert!(!profile.isolate_network);
    }
}
