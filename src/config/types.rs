use serde::{Deserialize, Serialize};

use crate::error::{DuelError, Result};

/// Problem difficulty. Closed set; drives resource envelopes, admission
/// caps and HP multipliers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Difficulty {
    #[serde(rename = "easy")]
    Easy,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "hard")]
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(DuelError::Config(format!("unknown difficulty: {other}"))),
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission language. Closed set; each variant has a harness generator
/// and a sandbox launch recipe.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Language {
    #[serde(rename = "python")]
    Python,
    #[serde(rename = "java")]
    Java,
    #[serde(rename = "cpp")]
    Cpp,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "cpp",
        }
    }

    /// Accepts the common aliases so config defaults and runtime selection
    /// stay deterministic.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "cpp" | "c++" | "cxx" | "cc" | "c" => Ok(Language::Cpp),
            other => Err(DuelError::Config(format!("unsupported language: {other}"))),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per difficulty. Configured from comma-triplets
/// (easy,medium,hard order).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PerDifficulty<T> {
    pub easy: T,
    pub medium: T,
    pub hard: T,
}

impl<T: Copy> PerDifficulty<T> {
    pub fn uniform(value: T) -> Self {
        Self {
            easy: value,
            medium: value,
            hard: value,
        }
    }

    pub fn get(&self, difficulty: Difficulty) -> T {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }
}

impl<T: std::str::FromStr + Copy> PerDifficulty<T> {
    /// Parse an `easy,medium,hard` comma-triplet.
    pub fn parse_triplet(raw: &str, key: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(DuelError::Config(format!(
                "{key}: expected comma-triplet easy,medium,hard, got '{raw}'"
            )));
        }
        let parse = |s: &str| {
            s.parse::<T>()
                .map_err(|_| DuelError::Config(format!("{key}: invalid value '{s}'")))
        };
        Ok(Self {
            easy: parse(parts[0])?,
            medium: parse(parts[1])?,
            hard: parse(parts[2])?,
        })
    }
}

/// How a custom room picks its problem set.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DistributionMode {
    /// Weighted random draws from the configured probabilities.
    #[serde(rename = "auto")]
    #[default]
    Auto,
    /// Fixed per-difficulty counts.
    #[serde(rename = "fixed")]
    Fixed,
}

/// Immutable per-match rules snapshot. Captured at match creation so later
/// configuration changes never affect an in-flight match.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameSettings {
    pub starting_hp: u32,
    pub base_hp_deduction: u32,
    pub hp_multipliers: PerDifficulty<f64>,
    pub starting_skill_points: u32,
    pub starting_mana_points: u32,
    /// Mana granted per successful submission.
    pub mana_recharge: u32,
    pub match_timeout_secs: u64,
    pub submission_cooldown_secs: u64,
    pub problem_count: u32,
    /// Categorical weights for auto distribution; normalized at draw time.
    pub problem_weights: PerDifficulty<f64>,
    pub distribution_mode: DistributionMode,
    /// Per-difficulty counts used when `distribution_mode` is `Fixed`.
    pub fixed_distribution: PerDifficulty<u32>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            starting_hp: 140,
            base_hp_deduction: 5,
            hp_multipliers: PerDifficulty {
                easy: 1.0,
                medium: 2.0,
                hard: 3.0,
            },
            starting_skill_points: 0,
            starting_mana_points: 0,
            mana_recharge: 1,
            match_timeout_secs: 1800,
            submission_cooldown_secs: 2,
            problem_count: 3,
            problem_weights: PerDifficulty {
                easy: 0.5,
                medium: 0.3,
                hard: 0.2,
            },
            distribution_mode: DistributionMode::Auto,
            fixed_distribution: PerDifficulty {
                easy: 1,
                medium: 1,
                hard: 1,
            },
        }
    }
}

/// A named rating tier with its ranked problem distribution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RankTier {
    pub name: String,
    pub distribution: PerDifficulty<u32>,
}

/// Rating thresholds -> tiers. `thresholds` has one fewer entry than
/// `tiers`: rating < thresholds[i] falls into tiers[i], anything above the
/// last threshold lands in the final tier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RankTable {
    pub thresholds: Vec<i32>,
    pub tiers: Vec<RankTier>,
}

impl RankTable {
    pub fn tier_index(&self, rating: f64) -> usize {
        for (i, threshold) in self.thresholds.iter().enumerate() {
            if rating < *threshold as f64 {
                return i;
            }
        }
        self.tiers.len() - 1
    }

    pub fn tier(&self, rating: f64) -> &RankTier {
        &self.tiers[self.tier_index(rating)]
    }

    pub fn validate(&self) -> Result<()> {
        if self.tiers.is_empty() {
            return Err(DuelError::Config("rank table has no tiers".to_string()));
        }
        if self.thresholds.len() + 1 != self.tiers.len() {
            return Err(DuelError::Config(format!(
                "rank table mismatch: {} thresholds require {} tiers, got {}",
                self.thresholds.len(),
                self.thresholds.len() + 1,
                self.tiers.len()
            )));
        }
        if self.thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(DuelError::Config(
                "rank thresholds must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RankTable {
    fn default() -> Self {
        let tier = |name: &str, easy: u32, medium: u32, hard: u32| RankTier {
            name: name.to_string(),
            distribution: PerDifficulty { easy, medium, hard },
        };
        Self {
            thresholds: vec![1200, 1500, 1800],
            tiers: vec![
                tier("bronze", 2, 1, 0),
                tier("silver", 1, 2, 0),
                tier("gold", 1, 1, 1),
                tier("platinum", 0, 2, 1),
            ],
        }
    }
}
