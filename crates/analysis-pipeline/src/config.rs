//! Pipeline configuration: per-stage engine settings, timeouts and quality thresholds

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::analysis::QualityThresholds;
use crate::engine::EngineOptions;
use crate::stage::Stage;

/// Engine settings for one automated stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StageSettings {
    pub threads: u32,
    pub hash_mb: u32,
    pub use_nnue: bool,
    /// Time budget per move
    pub move_time: Duration,
}

impl StageSettings {
    /// Automated stages always run a single principal line.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            threads: self.threads,
            hash_mb: self.hash_mb,
            multi_pv: 1,
            use_nnue: self.use_nnue,
        }
    }
}

/// Engine settings and retry policy for interactive analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct ManualSettings {
    pub threads: u32,
    pub hash_mb: u32,
    pub use_nnue: bool,
    pub multi_pv: u32,
    pub depth: u32,
    /// Attempts (engine restart + resubmission) before giving up on a position
    pub retries: u32,
    pub poll_interval: Duration,
    /// How long one attempt waits for a first result
    pub wait_window: Duration,
}

impl ManualSettings {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            threads: self.threads,
            hash_mb: self.hash_mb,
            multi_pv: self.multi_pv.max(1),
            use_nnue: self.use_nnue,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisConfig {
    pub preview: StageSettings,
    pub analyse: StageSettings,
    pub manual: ManualSettings,

    /// Added to the per-move budget before an automated wait times out
    pub grace_period: Duration,

    /// Pause after configuring a freshly restarted engine
    pub settle_delay: Duration,

    /// Pause after stopping a timed-out search, before reading its result
    pub stop_pause: Duration,

    pub thresholds: QualityThresholds,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let threads = default_threads();
        Self {
            preview: StageSettings {
                threads,
                hash_mb: 64,
                use_nnue: false,
                move_time: Duration::from_millis(250),
            },
            analyse: StageSettings {
                threads,
                hash_mb: 256,
                use_nnue: true,
                move_time: Duration::from_millis(1500),
            },
            manual: ManualSettings {
                threads,
                hash_mb: 256,
                use_nnue: true,
                multi_pv: 3,
                depth: 20,
                retries: 3,
                poll_interval: Duration::from_millis(100),
                wait_window: Duration::from_secs(5),
            },
            grace_period: Duration::from_secs(2),
            settle_delay: Duration::from_millis(100),
            stop_pause: Duration::from_millis(200),
            thresholds: QualityThresholds::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load from environment variables, falling back to the defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let threads = env_or("ENGINE_THREADS", defaults.preview.threads);
        let use_nnue = env_or("ENGINE_USE_NNUE", defaults.analyse.use_nnue);

        let preview = StageSettings {
            threads,
            hash_mb: env_or("PREVIEW_HASH_MB", defaults.preview.hash_mb),
            use_nnue: env_or("PREVIEW_USE_NNUE", defaults.preview.use_nnue),
            move_time: env_millis("PREVIEW_MOVE_TIME_MS", defaults.preview.move_time),
        };

        let analyse = StageSettings {
            threads,
            hash_mb: env_or("ANALYSE_HASH_MB", defaults.analyse.hash_mb),
            use_nnue,
            move_time: env_millis("ANALYSE_MOVE_TIME_MS", defaults.analyse.move_time),
        };

        let manual = ManualSettings {
            threads,
            hash_mb: env_or("MANUAL_HASH_MB", defaults.manual.hash_mb),
            use_nnue,
            multi_pv: env_or("MANUAL_MULTIPV", defaults.manual.multi_pv),
            depth: env_or("MANUAL_DEPTH", defaults.manual.depth),
            retries: env_or("MANUAL_RETRIES", defaults.manual.retries),
            poll_interval: env_millis("MANUAL_POLL_MS", defaults.manual.poll_interval),
            wait_window: env_millis("MANUAL_WAIT_MS", defaults.manual.wait_window),
        };

        let t = defaults.thresholds;
        let thresholds = QualityThresholds {
            blunder: env_or("QUALITY_BLUNDER", t.blunder),
            mistake: env_or("QUALITY_MISTAKE", t.mistake),
            dubious: env_or("QUALITY_DUBIOUS", t.dubious),
            good: env_or("QUALITY_GOOD", t.good),
            brilliant: env_or("QUALITY_BRILLIANT", t.brilliant),
        };

        Self {
            preview,
            analyse,
            manual,
            grace_period: env_millis("ENGINE_GRACE_MS", defaults.grace_period),
            settle_delay: env_millis("ENGINE_SETTLE_MS", defaults.settle_delay),
            stop_pause: env_millis("ENGINE_STOP_PAUSE_MS", defaults.stop_pause),
            thresholds,
        }
    }

    /// Settings for an automated stage. Manual has its own [`ManualSettings`].
    pub fn stage_settings(&self, stage: Stage) -> Option<&StageSettings> {
        match stage {
            Stage::Preview => Some(&self.preview),
            Stage::Analyse => Some(&self.analyse),
            Stage::Manual => None,
        }
    }
}

fn default_threads() -> u32 {
    // Leave one core for the UI
    (num_cpus::get().saturating_sub(1)).clamp(1, 8) as u32
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
