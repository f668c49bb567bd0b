//! Search parameters and difficulty presets.
//!
//! Resolution is layered: [`SearchParams::DEFAULT`] <- difficulty [`Preset`]
//! <- caller [`ParamOverrides`]. The result is one immutable [`SearchParams`]
//! fixed before the search starts.

use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{heuristic::DEFAULT_RANDOMNESS, tt::DEFAULT_TT_MAX_ENTRIES, Seed};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown difficulty '{0}' (expected easy, medium, hard or insane)")]
    UnknownDifficulty(String),

    #[error("unknown rollout policy '{0}' (expected random or light)")]
    UnknownRolloutPolicy(String),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to parse presets: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// How moves are picked during a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloutPolicy {
    /// Uniform over legal moves.
    #[default]
    Random,
    /// Immediate win if any, else avoid handing the opponent one, else uniform.
    Light,
}

impl FromStr for RolloutPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(RolloutPolicy::Random),
            "light" => Ok(RolloutPolicy::Light),
            _ => Err(ConfigError::UnknownRolloutPolicy(s.to_string())),
        }
    }
}

/// Stop a rollout early once the heuristic is confident.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyCutoff {
    /// Minimum rollout depth before the heuristic is consulted.
    pub depth: u32,
    /// Stop when the value is `>= confidence` or `<= 1 - confidence`.
    pub confidence: f64,
}

impl EarlyCutoff {
    pub const DEFAULT: EarlyCutoff = EarlyCutoff {
        depth: 6,
        confidence: 0.9,
    };

    #[inline]
    pub fn is_decisive(&self, value: f64) -> bool {
        value >= self.confidence || value <= 1.0 - self.confidence
    }
}

/// Fully resolved parameters of one search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Maximum number of completed iterations.
    pub iteration_budget: u32,
    /// Wall-clock budget; `None` means iterations only.
    pub time_budget_ms: Option<u64>,
    /// UCB1 exploration constant `C`.
    pub exploration: f64,
    pub rollout: RolloutPolicy,
    /// Only used when a move scorer is available.
    pub early_cutoff: Option<EarlyCutoff>,
    /// Base multiplier `kBase` of progressive widening.
    pub widening_k: Option<f64>,
    /// Exponent applied to the parent visit count.
    pub widening_alpha: f64,
    /// Fallback for `widening_k` when it is unset.
    pub move_ordering_top_k: Option<usize>,
    pub use_transposition_table: bool,
    pub tt_max_entries: usize,
    /// Install the built-in heuristic scorer when no scorer is supplied.
    pub use_heuristic: bool,
    /// Jitter scale of the built-in scorer, in `[0, 1]`.
    pub randomness: f64,
    pub diagnostics_top_n: usize,
    pub diagnostics_streaming: bool,
    pub diagnostics_throttle_ms: u64,
    pub seed: Option<Seed>,
}

impl SearchParams {
    pub const DEFAULT: SearchParams = SearchParams {
        iteration_budget: 1000,
        time_budget_ms: None,
        exploration: std::f64::consts::SQRT_2,
        rollout: RolloutPolicy::Random,
        early_cutoff: Some(EarlyCutoff::DEFAULT),
        widening_k: None,
        widening_alpha: 0.5,
        move_ordering_top_k: None,
        use_transposition_table: false,
        tt_max_entries: DEFAULT_TT_MAX_ENTRIES,
        use_heuristic: false,
        randomness: DEFAULT_RANDOMNESS,
        diagnostics_top_n: 8,
        diagnostics_streaming: false,
        diagnostics_throttle_ms: 200,
        seed: None,
    };

    pub fn with_iterations(mut self, n: u32) -> Self {
        self.iteration_budget = n;
        self
    }

    pub fn with_time_budget_ms(mut self, ms: Option<u64>) -> Self {
        self.time_budget_ms = ms;
        self
    }

    pub fn with_exploration(mut self, c: f64) -> Self {
        self.exploration = c;
        self
    }

    pub fn with_rollout(mut self, policy: RolloutPolicy) -> Self {
        self.rollout = policy;
        self
    }

    pub fn with_early_cutoff(mut self, cutoff: Option<EarlyCutoff>) -> Self {
        self.early_cutoff = cutoff;
        self
    }

    pub fn with_widening(mut self, k: Option<f64>, alpha: f64) -> Self {
        self.widening_k = k;
        self.widening_alpha = alpha;
        self
    }

    pub fn with_transposition_table(mut self, enabled: bool, max_entries: usize) -> Self {
        self.use_transposition_table = enabled;
        self.tt_max_entries = max_entries;
        self
    }

    pub fn with_heuristic(mut self, enabled: bool, randomness: f64) -> Self {
        self.use_heuristic = enabled;
        self.randomness = randomness;
        self
    }

    pub fn with_streaming(mut self, enabled: bool, throttle_ms: u64) -> Self {
        self.diagnostics_streaming = enabled;
        self.diagnostics_throttle_ms = throttle_ms;
        self
    }

    pub fn with_seed(mut self, seed: impl Into<Seed>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    /// Progressive-widening base for a node with `untried` candidate moves.
    pub fn widening_base(&self, untried: usize) -> f64 {
        self.widening_k
            .or(self.move_ordering_top_k.map(|k| k as f64))
            .unwrap_or(untried.min(3) as f64)
    }

    /// Whether any budget bounds this search.
    #[inline]
    pub fn is_budgeted(&self) -> bool {
        self.time_budget_ms.is_some_and(|t| t > 0) || self.iteration_budget > 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.exploration.is_finite() && self.exploration >= 0.0) {
            return Err(invalid("exploration", format!("{} must be >= 0", self.exploration)));
        }
        if let Some(cutoff) = &self.early_cutoff {
            if !(cutoff.confidence > 0.5 && cutoff.confidence <= 1.0) {
                return Err(invalid(
                    "early_cutoff.confidence",
                    format!("{} must be in (0.5, 1]", cutoff.confidence),
                ));
            }
        }
        if !(self.widening_alpha.is_finite() && self.widening_alpha >= 0.0) {
            return Err(invalid("widening_alpha", format!("{} must be >= 0", self.widening_alpha)));
        }
        if let Some(k) = self.widening_k {
            if !(k.is_finite() && k >= 0.0) {
                return Err(invalid("widening_k", format!("{k} must be >= 0")));
            }
        }
        if self.tt_max_entries == 0 {
            return Err(invalid("tt_max_entries", "must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.randomness) {
            return Err(invalid("randomness", format!("{} must be in [0, 1]", self.randomness)));
        }
        Ok(())
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams::DEFAULT
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

/// Named strength levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Insane,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::Insane,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Insane => "insane",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Difficulty {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Difficulty::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownDifficulty(s.to_string()))
    }
}

/// Parameter bundle of one difficulty level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub time_budget_ms: u64,
    pub iteration_budget: u32,
    pub randomness: f64,
    pub use_transposition_table: bool,
    pub tt_max_entries: usize,
    pub progressive_widening_k: f64,
    pub progressive_widening_alpha: f64,
    pub move_ordering_top_k: usize,
    #[serde(default)]
    pub use_heuristic: bool,
}

impl Preset {
    pub const EASY: Preset = Preset {
        time_budget_ms: 50,
        iteration_budget: 50,
        randomness: 0.6,
        use_transposition_table: false,
        tt_max_entries: 500,
        progressive_widening_k: 1.0,
        progressive_widening_alpha: 0.5,
        move_ordering_top_k: 2,
        use_heuristic: false,
    };

    pub const MEDIUM: Preset = Preset {
        time_budget_ms: 400,
        iteration_budget: 800,
        randomness: 0.25,
        use_transposition_table: true,
        tt_max_entries: 3000,
        progressive_widening_k: 2.0,
        progressive_widening_alpha: 0.5,
        move_ordering_top_k: 3,
        use_heuristic: false,
    };

    pub const HARD: Preset = Preset {
        time_budget_ms: 4000,
        iteration_budget: 8000,
        randomness: 0.02,
        use_transposition_table: true,
        tt_max_entries: 20_000,
        progressive_widening_k: 4.0,
        progressive_widening_alpha: 0.5,
        move_ordering_top_k: 6,
        use_heuristic: true,
    };

    pub const INSANE: Preset = Preset {
        time_budget_ms: 12_000,
        iteration_budget: 50_000,
        randomness: 0.0,
        use_transposition_table: true,
        tt_max_entries: 100_000,
        progressive_widening_k: 6.0,
        progressive_widening_alpha: 0.5,
        move_ordering_top_k: 10,
        use_heuristic: true,
    };

    /// Writes this preset over `params`.
    pub fn apply(&self, mut params: SearchParams) -> SearchParams {
        params.time_budget_ms = Some(self.time_budget_ms);
        params.iteration_budget = self.iteration_budget;
        params.randomness = self.randomness;
        params.use_transposition_table = self.use_transposition_table;
        params.tt_max_entries = self.tt_max_entries;
        params.widening_k = Some(self.progressive_widening_k);
        params.widening_alpha = self.progressive_widening_alpha;
        params.move_ordering_top_k = Some(self.move_ordering_top_k);
        params.use_heuristic = self.use_heuristic;
        params
    }
}

/// The four presets, replaceable as a whole from TOML.
///
/// ```toml
/// [easy]
/// time_budget_ms = 50
/// iteration_budget = 50
/// # ...
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetTable {
    pub easy: Preset,
    pub medium: Preset,
    pub hard: Preset,
    pub insane: Preset,
}

impl Default for PresetTable {
    fn default() -> Self {
        PresetTable {
            easy: Preset::EASY,
            medium: Preset::MEDIUM,
            hard: Preset::HARD,
            insane: Preset::INSANE,
        }
    }
}

impl PresetTable {
    pub fn get(&self, difficulty: Difficulty) -> &Preset {
        match difficulty {
            Difficulty::Easy => &self.easy,
            Difficulty::Medium => &self.medium,
            Difficulty::Hard => &self.hard,
            Difficulty::Insane => &self.insane,
        }
    }

    /// Parses a table; levels missing from `content` keep their built-in values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "loaded difficulty presets");
        Ok(table)
    }
}

/// Caller-supplied values that win over both defaults and presets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamOverrides {
    pub difficulty: Option<Difficulty>,
    pub iteration_budget: Option<u32>,
    pub time_budget_ms: Option<u64>,
    pub exploration: Option<f64>,
    pub rollout: Option<RolloutPolicy>,
    pub early_cutoff_depth: Option<u32>,
    pub early_cutoff_confidence: Option<f64>,
    pub widening_k: Option<f64>,
    pub widening_alpha: Option<f64>,
    pub move_ordering_top_k: Option<usize>,
    pub use_transposition_table: Option<bool>,
    pub tt_max_entries: Option<usize>,
    pub use_heuristic: Option<bool>,
    pub randomness: Option<f64>,
    pub diagnostics_top_n: Option<usize>,
    pub diagnostics_streaming: Option<bool>,
    pub diagnostics_throttle_ms: Option<u64>,
    pub seed: Option<Seed>,
}

impl ParamOverrides {
    pub fn difficulty(difficulty: Difficulty) -> Self {
        ParamOverrides {
            difficulty: Some(difficulty),
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: impl Into<Seed>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    pub fn with_time_budget_ms(mut self, ms: u64) -> Self {
        self.time_budget_ms = Some(ms);
        self
    }

    pub fn with_iterations(mut self, n: u32) -> Self {
        self.iteration_budget = Some(n);
        self
    }

    /// Resolves against the built-in presets.
    pub fn resolve(&self) -> Result<SearchParams, ConfigError> {
        self.resolve_with(&PresetTable::default())
    }

    /// Resolves `defaults <- preset <- self` and validates the result.
    pub fn resolve_with(&self, presets: &PresetTable) -> Result<SearchParams, ConfigError> {
        let mut p = SearchParams::DEFAULT;
        if let Some(d) = self.difficulty {
            p = presets.get(d).apply(p);
        }

        if let Some(v) = self.iteration_budget {
            p.iteration_budget = v;
        }
        if let Some(v) = self.time_budget_ms {
            p.time_budget_ms = Some(v);
        }
        if let Some(v) = self.exploration {
            p.exploration = v;
        }
        if let Some(v) = self.rollout {
            p.rollout = v;
        }
        if self.early_cutoff_depth.is_some() || self.early_cutoff_confidence.is_some() {
            let base = p.early_cutoff.unwrap_or(EarlyCutoff::DEFAULT);
            p.early_cutoff = Some(EarlyCutoff {
                depth: self.early_cutoff_depth.unwrap_or(base.depth),
                confidence: self.early_cutoff_confidence.unwrap_or(base.confidence),
            });
        }
        if let Some(v) = self.widening_k {
            p.widening_k = Some(v);
        }
        if let Some(v) = self.widening_alpha {
            p.widening_alpha = v;
        }
        if let Some(v) = self.move_ordering_top_k {
            p.move_ordering_top_k = Some(v);
        }
        if let Some(v) = self.use_transposition_table {
            p.use_transposition_table = v;
        }
        if let Some(v) = self.tt_max_entries {
            p.tt_max_entries = v;
        }
        if let Some(v) = self.use_heuristic {
            p.use_heuristic = v;
        }
        if let Some(v) = self.randomness {
            p.randomness = v;
        }
        if let Some(v) = self.diagnostics_top_n {
            p.diagnostics_top_n = v;
        }
        if let Some(v) = self.diagnostics_streaming {
            p.diagnostics_streaming = v;
        }
        if let Some(v) = self.diagnostics_throttle_ms {
            p.diagnostics_throttle_ms = v;
        }
        if self.seed.is_some() {
            p.seed = self.seed.clone();
        }

        p.validate()?;
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let p = SearchParams::default();
        assert_eq!(p.iteration_budget, 1000);
        assert_eq!(p.time_budget_ms, None);
        assert!((p.exploration - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert_eq!(p.rollout, RolloutPolicy::Random);
        assert_eq!(p.early_cutoff, Some(EarlyCutoff::DEFAULT));
        assert!(!p.use_transposition_table);
        assert_eq!(p.tt_max_entries, 10_000);
        assert_eq!(p.diagnostics_top_n, 8);
        assert_eq!(p.diagnostics_throttle_ms, 200);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_preset_table_exact() {
        let t = PresetTable::default();
        let rows = [
            (Difficulty::Easy, 50, 50, 0.6, false, 1.0),
            (Difficulty::Medium, 400, 800, 0.25, true, 2.0),
            (Difficulty::Hard, 4000, 8000, 0.02, true, 4.0),
            (Difficulty::Insane, 12_000, 50_000, 0.0, true, 6.0),
        ];
        for (d, ms, iters, rnd, tt, k) in rows {
            let p = t.get(d);
            assert_eq!(p.time_budget_ms, ms, "{d}");
            assert_eq!(p.iteration_budget, iters, "{d}");
            assert_eq!(p.randomness, rnd, "{d}");
            assert_eq!(p.use_transposition_table, tt, "{d}");
            assert_eq!(p.progressive_widening_k, k, "{d}");
            assert_eq!(p.progressive_widening_alpha, 0.5, "{d}");
        }
        assert!(!t.medium.use_heuristic);
        assert!(t.hard.use_heuristic && t.insane.use_heuristic);
    }

    #[test]
    fn test_difficulty_parse() -> Result<(), ConfigError> {
        assert_eq!("easy".parse::<Difficulty>()?, Difficulty::Easy);
        assert_eq!("INSANE".parse::<Difficulty>()?, Difficulty::Insane);
        assert!(matches!(
            "nightmare".parse::<Difficulty>(),
            Err(ConfigError::UnknownDifficulty(_))
        ));
        assert_eq!("light".parse::<RolloutPolicy>()?, RolloutPolicy::Light);
        Ok(())
    }

    #[test]
    fn test_resolution_layers() -> Result<(), ConfigError> {
        let overrides = ParamOverrides {
            difficulty: Some(Difficulty::Medium),
            iteration_budget: Some(10),
            early_cutoff_confidence: Some(0.6),
            seed: Some("s1".into()),
            ..Default::default()
        };
        let p = overrides.resolve()?;
        // Override wins over preset.
        assert_eq!(p.iteration_budget, 10);
        // Preset wins over default.
        assert_eq!(p.time_budget_ms, Some(400));
        assert!(p.use_transposition_table);
        assert_eq!(p.widening_k, Some(2.0));
        // Partial cutoff override keeps the default depth.
        assert_eq!(
            p.early_cutoff,
            Some(EarlyCutoff {
                depth: 6,
                confidence: 0.6
            })
        );
        assert_eq!(p.seed, Some(Seed::Text("s1".into())));
        Ok(())
    }

    #[test]
    fn test_validation_rejects() {
        let bad = ParamOverrides {
            randomness: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(bad.resolve(), Err(ConfigError::Invalid { field: "randomness", .. })));

        let bad = ParamOverrides {
            early_cutoff_confidence: Some(0.4),
            ..Default::default()
        };
        assert!(bad.resolve().is_err());

        let bad = SearchParams::DEFAULT.with_transposition_table(true, 0);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_widening_base_fallbacks() {
        let p = SearchParams::DEFAULT;
        assert_eq!(p.widening_base(10), 3.0);
        assert_eq!(p.widening_base(2), 2.0);

        let mut p = SearchParams::DEFAULT;
        p.move_ordering_top_k = Some(5);
        assert_eq!(p.widening_base(10), 5.0);
        p.widening_k = Some(1.5);
        assert_eq!(p.widening_base(10), 1.5);
    }

    #[test]
    fn test_early_cutoff_decisive() {
        let c = EarlyCutoff {
            depth: 2,
            confidence: 0.6,
        };
        assert!(c.is_decisive(0.6));
        assert!(c.is_decisive(0.4));
        assert!(c.is_decisive(0.0));
        assert!(!c.is_decisive(0.5));
    }

    #[test]
    fn test_presets_from_toml() -> Result<(), ConfigError> {
        let content = r#"
            [easy]
            time_budget_ms = 10
            iteration_budget = 20
            randomness = 0.3
            use_transposition_table = true
            tt_max_entries = 64
            progressive_widening_k = 1.0
            progressive_widening_alpha = 0.25
            move_ordering_top_k = 1
        "#;
        let table = PresetTable::from_toml_str(content)?;
        assert_eq!(table.easy.iteration_budget, 20);
        assert!(!table.easy.use_heuristic);
        assert_eq!(table.hard, Preset::HARD);

        let p = ParamOverrides::difficulty(Difficulty::Easy).resolve_with(&table)?;
        assert_eq!(p.time_budget_ms, Some(10));
        assert_eq!(p.tt_max_entries, 64);
        Ok(())
    }

    #[test]
    fn test_presets_bad_toml() {
        assert!(matches!(
            PresetTable::from_toml_str("[easy]\ntime_budget_ms = \"soon\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_params_json_defaults() -> Result<(), serde_json::Error> {
        let p: SearchParams = serde_json::from_str(r#"{"iteration_budget": 7, "rollout": "light"}"#)?;
        assert_eq!(p.iteration_budget, 7);
        assert_eq!(p.rollout, RolloutPolicy::Light);
        assert_eq!(p.diagnostics_top_n, 8);
        Ok(())
    }
}
