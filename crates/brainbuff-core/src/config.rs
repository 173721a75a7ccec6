use crate::geometry::OverlayPosition;
use crate::question::QuizMode;
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bounds for durations and sizes. Anything larger is a typo, and
/// would overflow `Instant` arithmetic or pixel math further down.
pub const MAX_SNOOZE_MINUTES: u64 = 24 * 60;
pub const MAX_COOLDOWN_SEC: u64 = 24 * 60 * 60;
pub const MAX_WINDOW_SEC: u64 = 60 * 60;
pub const MAX_MILLIS: u64 = 60_000;
pub const MAX_PIXELS: u32 = 16_384;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub popup: PopupConfig,
    #[serde(default)]
    pub screen: ScreenConfig,
    #[serde(default)]
    pub quiz: QuizConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "GeneralConfig::default_enabled")]
    pub enabled: bool,
    /// Period of the admission tick.
    #[serde(default = "GeneralConfig::default_tick")]
    pub tick_ms: u64,
}

impl GeneralConfig {
    fn default_enabled() -> bool { true }
    fn default_tick() -> u64 { 200 }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "ActivityConfig::default_window")]
    pub window_sec: u64,
    /// At or below this many inputs in the window the user counts as idle.
    #[serde(default = "ActivityConfig::default_low")]
    pub low_threshold: u32,
    /// At or above this many inputs a visible popup is hidden again.
    #[serde(default = "ActivityConfig::default_spike")]
    pub spike_threshold: u32,
    #[serde(default = "ActivityConfig::default_move_throttle")]
    pub mouse_move_throttle_ms: u64,
}

impl ActivityConfig {
    fn default_window() -> u64 { 8 }
    fn default_low() -> u32 { 6 }
    fn default_spike() -> u32 { 14 }
    fn default_move_throttle() -> u64 { 120 }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            window_sec: 8,
            low_threshold: 6,
            spike_threshold: 14,
            mouse_move_throttle_ms: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopupConfig {
    #[serde(default = "PopupConfig::default_cooldown")]
    pub cooldown_sec: u64,
    #[serde(default = "PopupConfig::default_snooze")]
    pub snooze_minutes: u64,
    #[serde(default = "PopupConfig::default_max_per_hour")]
    pub max_per_hour: u32,
    #[serde(default = "PopupConfig::default_spike_grace")]
    pub spike_grace_ms: u64,
    #[serde(default = "PopupConfig::default_auto_dismiss")]
    pub auto_dismiss_after_answer_ms: u64,
    #[serde(default)]
    pub position: OverlayPosition,
    #[serde(default = "PopupConfig::default_margin")]
    pub margin_px: i32,
    #[serde(default = "PopupConfig::default_width")]
    pub width: u32,
    #[serde(default = "PopupConfig::default_height")]
    pub height: u32,
    #[serde(default)]
    pub monitor_index: u32,
}

impl PopupConfig {
    fn default_cooldown() -> u64 { 45 }
    fn default_snooze() -> u64 { 10 }
    fn default_max_per_hour() -> u32 { 20 }
    fn default_spike_grace() -> u64 { 2000 }
    fn default_auto_dismiss() -> u64 { 1200 }
    fn default_margin() -> i32 { 40 }
    fn default_width() -> u32 { 700 }
    fn default_height() -> u32 { 400 }
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            cooldown_sec: 45,
            snooze_minutes: 10,
            max_per_hour: 20,
            spike_grace_ms: 2000,
            auto_dismiss_after_answer_ms: 1200,
            position: OverlayPosition::default(),
            margin_px: 40,
            width: 700,
            height: 400,
            monitor_index: 0,
        }
    }
}

/// Bounds for integrating relative mouse motion into a pointer position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenConfig {
    #[serde(default = "ScreenConfig::default_width")]
    pub width: u32,
    #[serde(default = "ScreenConfig::default_height")]
    pub height: u32,
}

impl ScreenConfig {
    fn default_width() -> u32 { 1920 }
    fn default_height() -> u32 { 1080 }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizConfig {
    #[serde(default)]
    pub mode: QuizMode,
    #[serde(default)]
    pub bank_path: Option<PathBuf>,
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    #[serde(default = "QuizConfig::default_topics")]
    pub topics: Vec<String>,
    #[serde(default = "QuizConfig::default_difficulty")]
    pub difficulty: String,
}

impl QuizConfig {
    fn default_topics() -> Vec<String> {
        [
            "Mathematics",
            "Science",
            "English",
            "History",
            "Geography",
            "General Knowledge",
        ]
        .into_iter()
        .map(Into::into)
        .collect()
    }
    fn default_difficulty() -> String { "easy".into() }
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            mode: QuizMode::default(),
            bank_path: None,
            cache_path: None,
            topics: Self::default_topics(),
            difficulty: Self::default_difficulty(),
        }
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("brainbuff")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load and validate the user config, falling back to defaults when no
    /// file exists.
    pub fn load() -> Result<Self> {
        Self::load_or_default(&Self::config_path())
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would silently produce a popup storm, no
    /// popups at all, or out-of-range time and pixel arithmetic.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.general.tick_ms > 0, "general.tick_ms must be positive");
        ensure!(self.activity.window_sec > 0, "activity.window_sec must be positive");
        ensure!(
            self.activity.mouse_move_throttle_ms > 0,
            "activity.mouse_move_throttle_ms must be positive"
        );
        for (name, value, max) in [
            ("general.tick_ms", self.general.tick_ms, MAX_MILLIS),
            ("activity.window_sec", self.activity.window_sec, MAX_WINDOW_SEC),
            ("activity.mouse_move_throttle_ms", self.activity.mouse_move_throttle_ms, MAX_MILLIS),
            ("popup.cooldown_sec", self.popup.cooldown_sec, MAX_COOLDOWN_SEC),
            ("popup.snooze_minutes", self.popup.snooze_minutes, MAX_SNOOZE_MINUTES),
            ("popup.spike_grace_ms", self.popup.spike_grace_ms, MAX_MILLIS),
            ("popup.auto_dismiss_after_answer_ms", self.popup.auto_dismiss_after_answer_ms, MAX_MILLIS),
        ] {
            ensure!(value <= max, "{} ({}) must be at most {}", name, value, max);
        }
        ensure!(
            self.activity.low_threshold < self.activity.spike_threshold,
            "activity.low_threshold ({}) must be below activity.spike_threshold ({})",
            self.activity.low_threshold,
            self.activity.spike_threshold
        );
        ensure!(self.popup.max_per_hour > 0, "popup.max_per_hour must be positive");
        ensure!(
            self.popup.width > 0 && self.popup.height > 0,
            "popup.width and popup.height must be positive"
        );
        ensure!(
            self.screen.width > 0 && self.screen.height > 0,
            "screen.width and screen.height must be positive"
        );
        for (name, value) in [
            ("popup.width", self.popup.width),
            ("popup.height", self.popup.height),
            ("screen.width", self.screen.width),
            ("screen.height", self.screen.height),
            ("popup.margin_px", self.popup.margin_px.unsigned_abs()),
        ] {
            ensure!(value <= MAX_PIXELS, "{} ({}) must be at most {}", name, value, MAX_PIXELS);
        }
        ensure!(
            self.quiz.topics.iter().any(|t| !t.trim().is_empty()),
            "quiz.topics must name at least one topic"
        );
        Ok(())
    }

    /// Persist the quiz mode into the config file at `path`, keeping every
    /// other key the file already has. A missing file is created.
    pub fn save_quiz_mode_to(path: &Path, mode: QuizMode) -> Result<()> {
        let mut doc: toml::Table = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading config from {}", path.display()))?;
            contents.parse().context("parsing config TOML")?
        } else {
            toml::Table::new()
        };

        let quiz = doc
            .entry("quiz")
            .or_insert(toml::Value::Table(toml::Table::new()));
        let Some(quiz) = quiz.as_table_mut() else {
            anyhow::bail!("[quiz] in {} is not a table", path.display());
        };
        quiz.insert("mode".into(), toml::Value::String(mode.to_string()));

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let contents = toml::to_string(&doc).context("serializing config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("writing config to {}", path.display()))
    }

    pub fn bank_path(&self) -> PathBuf {
        self.quiz
            .bank_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("questions.json"))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.quiz
            .cache_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("ai_cache.jsonl"))
    }
}

pub fn socket_path() -> PathBuf {
    // BRAINBUFF_SOCK overrides for testing.
    if let Ok(path) = std::env::var("BRAINBUFF_SOCK") {
        return PathBuf::from(path);
    }
    dirs::runtime_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("brainbuff.sock")
}
