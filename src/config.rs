//! Engine configuration, read from a camelCase JSON file. Every field has a
//! default so an empty or missing file yields a working setup.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tokio::time::Duration;

use crate::activity::DEFAULT_WINDOW_CAPACITY;
use crate::chat::{IrcConfig, OverflowPolicy, PumpConfig, QueueConfig};
use crate::engine::LoopConfig;
use crate::policy::TriggerConfig;
use crate::recorder::RetryPolicy;
use crate::utils::time::MAX_WAIT;

pub const CONFIG_PATH_ENV: &str = "CLIPWATCH_CONFIG";
pub const TWITCH_TOKEN_ENV: &str = "CLIPWATCH_TWITCH_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerSettings {
    /// Messages per second
    pub activity_threshold: f64,
    pub sentiment_threshold: f64,
    pub clip_duration_secs: u64,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        let trigger = TriggerConfig::default();
        Self {
            activity_threshold: trigger.activity_threshold,
            sentiment_threshold: trigger.sentiment_threshold,
            clip_duration_secs: trigger.clip_duration.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivitySettings {
    pub window_capacity: usize,
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderSettings {
    pub backoff_ms: u64,
    /// `null` retries forever
    pub max_attempts: Option<u32>,
    pub call_timeout_ms: u64,
    /// argv run to begin a recording; empty means dry run
    pub begin_command: Vec<String>,
    pub end_command: Vec<String>,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            backoff_ms: retry.backoff.as_millis() as u64,
            max_attempts: retry.max_attempts,
            call_timeout_ms: retry.call_timeout.as_millis() as u64,
            begin_command: Vec::new(),
            end_command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    pub irc: IrcConfig,
    pub queue_capacity: usize,
    pub block_timeout_ms: u64,
    pub overflow: OverflowPolicy,
    pub receive_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        let queue = QueueConfig::default();
        let pump = PumpConfig::default();
        Self {
            irc: IrcConfig::default(),
            queue_capacity: queue.capacity,
            block_timeout_ms: queue.block_timeout.as_millis() as u64,
            overflow: queue.overflow,
            receive_timeout_ms: pump.receive_timeout.as_millis() as u64,
            reconnect_delay_ms: pump.reconnect_delay.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopSettings {
    pub poll_timeout_ms: u64,
    pub idle_interval_ms: u64,
}

impl Default for LoopSettings {
    fn default() -> Self {
        let config = LoopConfig::default();
        Self {
            poll_timeout_ms: config.poll_timeout.as_millis() as u64,
            idle_interval_ms: config.idle_interval.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// SQLite file for persisted sentiment scores; in-memory only when unset
    pub score_db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub trigger: TriggerSettings,
    pub activity: ActivitySettings,
    pub recorder: RecorderSettings,
    pub chat: ChatSettings,
    pub engine: LoopSettings,
    pub storage: StorageSettings,
}

impl EngineConfig {
    /// Reads the config at `path`. A missing file gives the defaults; a file
    /// that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config at {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Config path from `CLIPWATCH_CONFIG`, if set.
    pub fn path_from_env() -> Option<PathBuf> {
        env::var_os(CONFIG_PATH_ENV).map(PathBuf::from)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = env::var(TWITCH_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.chat.irc.token = Some(token.trim().to_string());
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let trigger = &self.trigger;
        if !trigger.activity_threshold.is_finite() || trigger.activity_threshold < 0.0 {
            bail!(
                "trigger.activityThreshold must be a non-negative number, got {}",
                trigger.activity_threshold
            );
        }
        if !(-1.0..=1.0).contains(&trigger.sentiment_threshold) {
            bail!(
                "trigger.sentimentThreshold must be within [-1, 1], got {}",
                trigger.sentiment_threshold
            );
        }
        if trigger.clip_duration_secs == 0 {
            bail!("trigger.clipDurationSecs must be positive");
        }
        if self.activity.window_capacity == 0 {
            bail!("activity.windowCapacity must be positive");
        }
        if self.recorder.backoff_ms == 0 || self.recorder.call_timeout_ms == 0 {
            bail!("recorder.backoffMs and recorder.callTimeoutMs must be positive");
        }
        if self.recorder.max_attempts == Some(0) {
            bail!("recorder.maxAttempts must be positive or null");
        }
        if self.recorder.begin_command.is_empty() != self.recorder.end_command.is_empty() {
            bail!("recorder.beginCommand and recorder.endCommand must be set together");
        }
        if self.chat.queue_capacity == 0 {
            bail!("chat.queueCapacity must be positive");
        }
        if self.chat.receive_timeout_ms == 0 || self.engine.poll_timeout_ms == 0 {
            bail!("chat.receiveTimeoutMs and engine.pollTimeoutMs must be positive");
        }

        let max_ms = MAX_WAIT.as_millis() as u64;
        let intervals = [
            ("recorder.backoffMs", self.recorder.backoff_ms),
            ("recorder.callTimeoutMs", self.recorder.call_timeout_ms),
            ("chat.blockTimeoutMs", self.chat.block_timeout_ms),
            ("chat.receiveTimeoutMs", self.chat.receive_timeout_ms),
            ("chat.reconnectDelayMs", self.chat.reconnect_delay_ms),
            ("chat.irc.connectTimeoutMs", self.chat.irc.connect_timeout_ms),
            ("engine.pollTimeoutMs", self.engine.poll_timeout_ms),
            ("engine.idleIntervalMs", self.engine.idle_interval_ms),
        ];
        for (name, value) in intervals {
            if value > max_ms {
                bail!("{name} must be at most {max_ms}, got {value}");
            }
        }
        if trigger.clip_duration_secs > MAX_WAIT.as_secs() {
            bail!(
                "trigger.clipDurationSecs must be at most {}, got {}",
                MAX_WAIT.as_secs(),
                trigger.clip_duration_secs
            );
        }
        Ok(())
    }

    pub fn trigger_config(&self) -> TriggerConfig {
        TriggerConfig {
            activity_threshold: self.trigger.activity_threshold,
            sentiment_threshold: self.trigger.sentiment_threshold,
            clip_duration: Duration::from_secs(self.trigger.clip_duration_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff: Duration::from_millis(self.recorder.backoff_ms),
            max_attempts: self.recorder.max_attempts,
            call_timeout: Duration::from_millis(self.recorder.call_timeout_ms),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.chat.queue_capacity,
            block_timeout: Duration::from_millis(self.chat.block_timeout_ms),
            overflow: self.chat.overflow,
        }
    }

    pub fn pump_config(&self) -> PumpConfig {
        PumpConfig {
            receive_timeout: Duration::from_millis(self.chat.receive_timeout_ms),
            reconnect_delay: Duration::from_millis(self.chat.reconnect_delay_ms),
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            poll_timeout: Duration::from_millis(self.engine.poll_timeout_ms),
            idle_interval: Duration::from_millis(self.engine.idle_interval_ms),
        }
    }
}
