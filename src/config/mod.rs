//! Environment-driven configuration.
//!
//! Every tunable has a default aligned with the test environment; production
//! deployments override through `DUELBOX_*` variables. Values are validated
//! at startup so a malformed deployment fails fast instead of mid-match.

pub mod types;

use std::env;

use crate::error::{DuelError, Result};
use types::{GameSettings, PerDifficulty, RankTable, RankTier};

/// Resource envelope and admission configuration for the sandbox layer.
#[derive(Clone, Debug)]
pub struct SandboxSettings {
    /// Concurrent submissions admitted per difficulty.
    pub concurrency: PerDifficulty<u32>,
    /// Memory cap per difficulty (MB).
    pub memory_mb: PerDifficulty<u64>,
    /// Wall-clock cap per difficulty (ms).
    pub time_ms: PerDifficulty<u64>,
    /// Fraction of one CPU granted to a submission; converted to a CPU-time
    /// budget against the wall cap.
    pub cpu_share: f64,
    /// Permissive mode skips isolation steps that need privileges
    /// (development only; unsafe for untrusted code).
    pub permissive: bool,
    pub python_bin: String,
    pub java_bin: String,
    pub cpp_compiler: String,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            concurrency: PerDifficulty {
                easy: 12,
                medium: 8,
                hard: 4,
            },
            memory_mb: PerDifficulty {
                easy: 256,
                medium: 384,
                hard: 512,
            },
            time_ms: PerDifficulty {
                easy: 10_000,
                medium: 15_000,
                hard: 20_000,
            },
            cpu_share: 0.5,
            permissive: false,
            python_bin: "/usr/bin/python3".to_string(),
            java_bin: "/usr/bin/java".to_string(),
            cpp_compiler: "/usr/bin/g++".to_string(),
        }
    }
}

/// Full server configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    pub sandbox: SandboxSettings,
    pub game: GameSettings,
    pub ranks: RankTable,
    /// ELO K-factor for ranked rating updates.
    pub rating_k: f64,
    pub room_code_length: usize,
    pub room_update_throttle_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sandbox: SandboxSettings::default(),
            game: GameSettings::default(),
            ranks: RankTable::default(),
            rating_k: 32.0,
            room_code_length: 6,
            room_update_throttle_secs: 2,
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| DuelError::Config(format!("{key}: invalid value '{raw}'"))),
        None => Ok(None),
    }
}

fn parse_triplet_var<T: std::str::FromStr + Copy>(key: &str) -> Result<Option<PerDifficulty<T>>> {
    match var(key) {
        Some(raw) => PerDifficulty::parse_triplet(&raw, key).map(Some),
        None => Ok(None),
    }
}

impl Settings {
    /// Load settings from the process environment, falling back to defaults
    /// per key.
    pub fn from_env() -> Result<Self> {
        let mut settings = Settings::default();

        if let Some(v) = parse_triplet_var("DUELBOX_CONCURRENCY")? {
            settings.sandbox.concurrency = v;
        }
        if let Some(v) = parse_triplet_var("DUELBOX_MEMORY_MB")? {
            settings.sandbox.memory_mb = v;
        }
        if let Some(v) = parse_triplet_var("DUELBOX_TIME_MS")? {
            settings.sandbox.time_ms = v;
        }
        if let Some(v) = parse_var("DUELBOX_CPU_SHARE")? {
            settings.sandbox.cpu_share = v;
        }
        if let Some(v) = var("DUELBOX_PYTHON_BIN") {
            settings.sandbox.python_bin = v;
        }
        if let Some(v) = var("DUELBOX_JAVA_BIN") {
            settings.sandbox.java_bin = v;
        }
        if let Some(v) = var("DUELBOX_CPP_COMPILER") {
            settings.sandbox.cpp_compiler = v;
        }

        if let Some(v) = parse_var("DUELBOX_STARTING_HP")? {
            settings.game.starting_hp = v;
        }
        if let Some(v) = parse_var("DUELBOX_BASE_HP_DEDUCTION")? {
            settings.game.base_hp_deduction = v;
        }
        if let Some(v) = parse_triplet_var("DUELBOX_HP_MULTIPLIERS")? {
            settings.game.hp_multipliers = v;
        }
        if let Some(v) = parse_var("DUELBOX_STARTING_SP")? {
            settings.game.starting_skill_points = v;
        }
        if let Some(v) = parse_var("DUELBOX_STARTING_MP")? {
            settings.game.starting_mana_points = v;
        }
        if let Some(v) = parse_var("DUELBOX_MANA_RECHARGE")? {
            settings.game.mana_recharge = v;
        }
        if let Some(v) = parse_var("DUELBOX_MATCH_TIMEOUT_SECS")? {
            settings.game.match_timeout_secs = v;
        }
        if let Some(v) = parse_var("DUELBOX_SUBMISSION_COOLDOWN_SECS")? {
            settings.game.submission_cooldown_secs = v;
        }
        if let Some(v) = parse_var("DUELBOX_PROBLEM_COUNT")? {
            settings.game.problem_count = v;
        }
        if let Some(v) = parse_triplet_var("DUELBOX_PROBLEM_WEIGHTS")? {
            settings.game.problem_weights = v;
        }

        if let Some(ranks) = Self::rank_table_from_env()? {
            settings.ranks = ranks;
        }
        if let Some(v) = parse_var("DUELBOX_RATING_K")? {
            settings.rating_k = v;
        }
        if let Some(v) = parse_var("DUELBOX_ROOM_CODE_LENGTH")? {
            settings.room_code_length = v;
        }
        if let Some(v) = parse_var("DUELBOX_ROOM_UPDATE_THROTTLE_SECS")? {
            settings.room_update_throttle_secs = v;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Rank table from `DUELBOX_RANK_THRESHOLDS` (comma ints),
    /// `DUELBOX_RANK_NAMES` (comma names) and `DUELBOX_RANK_DISTRIBUTIONS`
    /// (semicolon-separated easy,medium,hard triplets, one per tier).
    /// All three must be present together.
    fn rank_table_from_env() -> Result<Option<RankTable>> {
        let (thresholds, names, distributions) = match (
            var("DUELBOX_RANK_THRESHOLDS"),
            var("DUELBOX_RANK_NAMES"),
            var("DUELBOX_RANK_DISTRIBUTIONS"),
        ) {
            (None, None, None) => return Ok(None),
            (Some(t), Some(n), Some(d)) => (t, n, d),
            _ => {
                return Err(DuelError::Config(
                    "rank configuration requires DUELBOX_RANK_THRESHOLDS, \
                     DUELBOX_RANK_NAMES and DUELBOX_RANK_DISTRIBUTIONS together"
                        .to_string(),
                ))
            }
        };

        let thresholds = thresholds
            .split(',')
            .map(|s| {
                s.trim().parse::<i32>().map_err(|_| {
                    DuelError::Config(format!("DUELBOX_RANK_THRESHOLDS: invalid value '{s}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let names: Vec<String> = names.split(',').map(|s| s.trim().to_string()).collect();

        let distributions = distributions
            .split(';')
            .map(|t| PerDifficulty::parse_triplet(t, "DUELBOX_RANK_DISTRIBUTIONS"))
            .collect::<Result<Vec<PerDifficulty<u32>>>>()?;

        if names.len() != distributions.len() {
            return Err(DuelError::Config(format!(
                "rank configuration: {} names but {} distributions",
                names.len(),
                distributions.len()
            )));
        }

        let tiers = names
            .into_iter()
            .zip(distributions)
            .map(|(name, distribution)| RankTier { name, distribution })
            .collect();

        Ok(Some(RankTable { thresholds, tiers }))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.sandbox.cpu_share) || self.sandbox.cpu_share == 0.0 {
            return Err(DuelError::Config(format!(
                "cpu share must be in (0.0, 1.0], got {}",
                self.sandbox.cpu_share
            )));
        }
        if self.game.problem_count == 0 {
            return Err(DuelError::Config("problem count must be positive".to_string()));
        }
        if self.game.starting_hp == 0 {
            return Err(DuelError::Config("starting HP must be positive".to_string()));
        }
        if self.room_code_length == 0 {
            return Err(DuelError::Config("room code length must be positive".to_string()));
        }
        self.ranks.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn zero_cpu_share_rejected() {
        let mut settings = Settings::default();
        settings.sandbox.cpu_share = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_problem_count_rejected() {
        let mut settings = Settings::default();
        settings.game.problem_count = 0;
        assert!(settings.validate().is_err());
    }
}
