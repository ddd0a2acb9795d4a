//! Configuration management for ccbell-monitor

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Direction, EntityId, TransitionKind};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Sound sink configuration
    pub sound: SoundConfig,

    /// Monitors keyed by domain name
    pub monitors: BTreeMap<String, MonitorDefinition>,
}

impl Config {
    /// Load configuration from a file (or the default location) plus
    /// `CCBELL__`-prefixed environment variables, then validate it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Self::environment())
    }

    /// Environment source. Values are parsed into booleans and numbers so
    /// overrides reach non-string fields, including those of flattened
    /// monitor sections.
    fn environment() -> config::Environment {
        config::Environment::with_prefix("CCBELL")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    fn load_with_env(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path));
            }
            None => {
                if let Some(path) = Self::default_path() {
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        let config: Config = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location (`<config dir>/ccbell/monitors.toml`)
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "ccbell")
            .map(|dirs| dirs.config_dir().join("monitors.toml"))
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.sound.validate()?;

        for (domain, definition) in &self.monitors {
            definition.validate().map_err(|e| e.for_monitor(domain))?;
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
    /// Write daily-rotated log files here instead of stderr
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
        }
    }
}

/// Global sound sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    /// Playback volume in [0, 1]
    pub volume: f32,
    /// Player binary override (platform default when unset)
    pub player: Option<String>,
    /// Directory holding `bundled:` sounds
    pub sounds_dir: Option<PathBuf>,
    /// Upper bound for a single playback
    #[serde(with = "humantime_serde")]
    pub play_timeout: Duration,
    /// Default sound per event key (kind name, level name or `status:<value>`)
    pub events: BTreeMap<String, String>,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            volume: 0.5,
            player: None,
            sounds_dir: None,
            play_timeout: Duration::from_secs(10),
            events: BTreeMap::new(),
        }
    }
}

impl SoundConfig {
    /// Validate volume and timeout
    pub fn validate(&self) -> Result<()> {
        validate_volume(self.volume)?;
        if self.play_timeout.is_zero() {
            return Err(Error::config("sound.play_timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn validate_volume(volume: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&volume) {
        return Err(Error::config(format!("volume {volume} is outside [0, 1]")));
    }
    Ok(())
}

/// Per-domain sound overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundRoutes {
    /// Volume override for this domain
    pub volume: Option<f32>,
    /// Sound per event key, checked before the global defaults
    pub events: BTreeMap<String, String>,
}

/// External command backing a configured collector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Program followed by its arguments
    pub command: Vec<String>,
}

/// A monitor as declared in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorDefinition {
    /// Monitor behaviour
    #[serde(flatten)]
    pub monitor: MonitorConfig,

    /// Command producing line-protocol output
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Sound overrides for this domain
    #[serde(default)]
    pub sound: SoundRoutes,
}

impl MonitorDefinition {
    /// Validate monitor, collector and sound sections
    pub fn validate(&self) -> Result<()> {
        self.monitor.validate()?;
        if self.collector.command.is_empty() {
            return Err(Error::config("collector.command must not be empty"));
        }
        if let Some(volume) = self.sound.volume {
            validate_volume(volume)?;
        }
        Ok(())
    }
}

/// Configuration of a single monitor. Immutable for the monitor's lifetime;
/// changing it means restarting the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Whether the monitor should run
    pub enabled: bool,

    /// Time between polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Upper bound of the random delay before the first tick
    #[serde(with = "humantime_serde")]
    pub jitter: Duration,

    /// Upper bound for a single collection
    #[serde(with = "humantime_serde")]
    pub collect_timeout: Duration,

    /// How long `stop` waits for an in-flight tick
    #[serde(with = "humantime_serde")]
    pub stop_grace: Duration,

    /// Transition kinds that produce events
    pub enabled_kinds: BTreeSet<TransitionKind>,

    /// Cooldown used for kinds without an explicit entry
    #[serde(with = "humantime_serde")]
    pub default_cooldown: Duration,

    /// Per-kind cooldowns
    #[serde(with = "duration_map")]
    pub cooldowns: BTreeMap<TransitionKind, Duration>,

    /// Entity allow/deny patterns
    pub entity_filter: EntityFilter,

    /// Threshold ladders for numeric metrics
    pub thresholds: Vec<ThresholdRule>,

    /// Only report status changes into these statuses (all when empty)
    pub watch_statuses: BTreeSet<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
            collect_timeout: Duration::from_secs(10),
            stop_grace: Duration::from_secs(5),
            enabled_kinds: TransitionKind::ALL.into_iter().collect(),
            default_cooldown: Duration::from_secs(30),
            cooldowns: BTreeMap::new(),
            entity_filter: EntityFilter::default(),
            thresholds: Vec::new(),
            watch_statuses: BTreeSet::new(),
        }
    }
}

impl MonitorConfig {
    /// Cooldown window for a kind
    pub fn cooldown_for(&self, kind: TransitionKind) -> Duration {
        self.cooldowns
            .get(&kind)
            .copied()
            .unwrap_or(self.default_cooldown)
    }

    /// Whether a kind produces events
    pub fn kind_enabled(&self, kind: TransitionKind) -> bool {
        self.enabled_kinds.contains(&kind)
    }

    /// Restrict events to the given kinds
    #[must_use]
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = TransitionKind>) -> Self {
        self.enabled_kinds = kinds.into_iter().collect();
        self
    }

    /// Set a cooldown for one kind
    #[must_use]
    pub fn with_cooldown(mut self, kind: TransitionKind, window: Duration) -> Self {
        self.cooldowns.insert(kind, window);
        self
    }

    /// Add a threshold rule
    #[must_use]
    pub fn with_threshold(mut self, rule: ThresholdRule) -> Self {
        self.thresholds.push(rule);
        self
    }

    /// Check the configuration; errors here are fatal at monitor start
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll_interval must be greater than zero"));
        }
        if self.collect_timeout.is_zero() {
            return Err(Error::config("collect_timeout must be greater than zero"));
        }
        if self.enabled_kinds.is_empty() {
            return Err(Error::config("enabled_kinds must name at least one kind"));
        }
        for kind in self.cooldowns.keys() {
            if !self.kind_enabled(*kind) {
                return Err(Error::config(format!(
                    "cooldown configured for disabled kind '{kind}'"
                )));
            }
        }
        for rule in &self.thresholds {
            rule.validate()?;
        }
        self.entity_filter.compile()?;
        Ok(())
    }
}

/// A ladder of named levels for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    /// Metric name
    pub metric: String,
    /// Crossing direction
    #[serde(default)]
    pub direction: Direction,
    /// Levels in severity order
    pub levels: Vec<ThresholdLevel>,
}

/// One named boundary of a threshold ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLevel {
    /// Level name ("warning", "critical", ...)
    pub name: String,
    /// Boundary value
    pub value: f64,
}

impl ThresholdRule {
    /// Create a rising rule
    pub fn rising(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            direction: Direction::Rising,
            levels: Vec::new(),
        }
    }

    /// Create a falling rule
    pub fn falling(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            direction: Direction::Falling,
            levels: Vec::new(),
        }
    }

    /// Append a level
    #[must_use]
    pub fn level(mut self, name: impl Into<String>, value: f64) -> Self {
        self.levels.push(ThresholdLevel {
            name: name.into(),
            value,
        });
        self
    }

    /// Levels must be finite, uniquely named and ordered along the direction
    pub fn validate(&self) -> Result<()> {
        if self.metric.is_empty() {
            return Err(Error::config("threshold metric must not be empty"));
        }
        if self.levels.is_empty() {
            return Err(Error::config(format!(
                "threshold '{}' has no levels",
                self.metric
            )));
        }

        let mut names = HashSet::new();
        for level in &self.levels {
            if !level.value.is_finite() {
                return Err(Error::config(format!(
                    "threshold '{}' level '{}' is not finite",
                    self.metric, level.name
                )));
            }
            if !names.insert(level.name.as_str()) {
                return Err(Error::config(format!(
                    "threshold '{}' repeats level '{}'",
                    self.metric, level.name
                )));
            }
        }

        let ordered = self.levels.windows(2).all(|pair| match self.direction {
            Direction::Rising => pair[0].value < pair[1].value,
            Direction::Falling => pair[0].value > pair[1].value,
        });
        if !ordered {
            return Err(Error::config(format!(
                "threshold '{}' levels are not ordered for a {:?} ladder",
                self.metric, self.direction
            )));
        }

        Ok(())
    }
}

/// Allow/deny regular expressions matched against entity ids
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityFilter {
    /// If non-empty, an entity must match at least one pattern
    pub allow: Vec<String>,
    /// An entity matching any pattern is dropped
    pub deny: Vec<String>,
}

impl EntityFilter {
    /// Compile the patterns
    pub fn compile(&self) -> Result<CompiledFilter> {
        let build = |patterns: &[String]| {
            RegexSet::new(patterns).map_err(|e| Error::config(format!("invalid entity filter: {e}")))
        };

        Ok(CompiledFilter {
            allow: build(&self.allow)?,
            deny: build(&self.deny)?,
        })
    }
}

/// Compiled form of [`EntityFilter`]
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    allow: RegexSet,
    deny: RegexSet,
}

impl CompiledFilter {
    /// Whether an entity passes the filter
    pub fn admits(&self, id: &EntityId) -> bool {
        let allowed = self.allow.is_empty() || self.allow.is_match(id.as_str());
        allowed && !self.deny.is_match(id.as_str())
    }
}

/// Serde adapter for kind → humantime duration maps
mod duration_map {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::models::TransitionKind;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<TransitionKind, Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        map.iter()
            .map(|(kind, window)| (*kind, humantime::format_duration(*window).to_string()))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<TransitionKind, Duration>, D::Error> {
        BTreeMap::<TransitionKind, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(kind, raw)| {
                humantime::parse_duration(&raw)
                    .map(|window| (kind, window))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
