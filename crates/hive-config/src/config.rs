use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Current schema version for hivemind.toml
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HivemindConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub agent: AgentMeta,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Ordered list: position is the fallback priority (first = tried first).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub reflection: ReflectionConfig,
}

fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMeta {
    #[serde(default = "default_agent_name")]
    pub name: String,
    /// Override for the state directory. Defaults to the platform state dir
    /// (`~/.local/state/hivemind` on Linux).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

impl Default for AgentMeta {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            state_dir: None,
        }
    }
}

fn default_agent_name() -> String {
    "hivemind".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Base tick cadence for the scheduling loop, in seconds.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Heartbeat cadence. Exempt from reflector adjustment.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// How often the snapshot is persisted to disk.
    #[serde(default = "default_persist_secs")]
    pub persist_secs: u64,
    /// Grace period for in-flight tasks at shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Recurring tasks, keyed by task id.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            heartbeat_secs: default_heartbeat_secs(),
            persist_secs: default_persist_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            tasks: BTreeMap::new(),
        }
    }
}

fn default_tick_secs() -> u64 {
    30
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_persist_secs() -> u64 {
    60
}

fn default_shutdown_grace_secs() -> u64 {
    45
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Base interval between runs, in seconds. The reflector adjusts the
    /// effective interval at runtime within the configured bounds.
    pub interval_secs: u64,
    /// Dispatch ordering when several tasks come due in the same tick
    /// (lower runs first; ties broken by task id).
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Prompt template for generation tasks registered by the CLI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Wire protocol family for a provider endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// OpenAI-style `POST {base_url}/chat/completions` with bearer auth
    /// (groq, nvidia NIM, and most hosted inference APIs).
    OpenaiCompat,
    /// Google `generateContent` endpoint, key passed as a query parameter.
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    /// Required for `openai-compat`; ignored for `gemini`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub model: String,
    /// Env var holding the API key. Unset at startup means the provider is
    /// registered permanently unavailable.
    pub api_key_env: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Consecutive failures before a provider goes DEGRADED.
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u32,
    /// Consecutive failures before a provider goes UNAVAILABLE for the
    /// remainder of the process lifetime.
    #[serde(default = "default_unavailable_threshold")]
    pub unavailable_threshold: u32,
    #[serde(default = "default_cooldown_base_secs")]
    pub cooldown_base_secs: u64,
    #[serde(default = "default_cooldown_max_secs")]
    pub cooldown_max_secs: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            degraded_threshold: default_degraded_threshold(),
            unavailable_threshold: default_unavailable_threshold(),
            cooldown_base_secs: default_cooldown_base_secs(),
            cooldown_max_secs: default_cooldown_max_secs(),
        }
    }
}

fn default_degraded_threshold() -> u32 {
    3
}

fn default_unavailable_threshold() -> u32 {
    8
}

fn default_cooldown_base_secs() -> u64 {
    60
}

fn default_cooldown_max_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Cadence of reflection passes, in seconds.
    #[serde(default = "default_reflection_interval_secs")]
    pub interval_secs: u64,
    /// Number of most-recent outcomes per task considered by a pass.
    #[serde(default = "default_reflection_window")]
    pub window: usize,
    /// Success rate below which a task's interval is lengthened.
    #[serde(default = "default_low_water")]
    pub low_water: f64,
    /// Success rate at or above which the interval may shorten back
    /// toward base, provided latency is acceptable.
    #[serde(default = "default_high_water")]
    pub high_water: f64,
    /// Mean latency ceiling (ms) for interval shortening.
    #[serde(default = "default_latency_ceiling_ms")]
    pub latency_ceiling_ms: u64,
    /// Hard bound: interval never exceeds `base * max_slowdown`.
    #[serde(default = "default_max_slowdown")]
    pub max_slowdown: f64,
    /// Hard bound: interval never drops below `base / max_speedup`.
    #[serde(default = "default_max_speedup")]
    pub max_speedup: f64,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reflection_interval_secs(),
            window: default_reflection_window(),
            low_water: default_low_water(),
            high_water: default_high_water(),
            latency_ceiling_ms: default_latency_ceiling_ms(),
            max_slowdown: default_max_slowdown(),
            max_speedup: default_max_speedup(),
        }
    }
}

fn default_reflection_interval_secs() -> u64 {
    6 * 3600
}

fn default_reflection_window() -> usize {
    30
}

fn default_low_water() -> f64 {
    0.5
}

fn default_high_water() -> f64 {
    0.95
}

fn default_latency_ceiling_ms() -> u64 {
    10_000
}

fn default_max_slowdown() -> f64 {
    4.0
}

fn default_max_speedup() -> f64 {
    1.0
}

impl Default for HivemindConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            agent: AgentMeta::default(),
            schedule: ScheduleConfig::default(),
            providers: Vec::new(),
            fallback: FallbackConfig::default(),
            reflection: ReflectionConfig::default(),
        }
    }
}

impl HivemindConfig {
    /// Load and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: HivemindConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the state directory: explicit override, or the platform
    /// state dir (`state_dir()` is Linux-only; fall back to
    /// `data_local_dir()` on macOS/Windows).
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.agent.state_dir {
            return Ok(dir.clone());
        }
        let proj_dirs = directories::ProjectDirs::from("", "", "hivemind")
            .context("Failed to determine project directories")?;
        let state_dir = proj_dirs
            .state_dir()
            .unwrap_or_else(|| proj_dirs.data_local_dir());
        Ok(state_dir.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
schema_version = 1

[agent]
name = "hivemind"

[schedule]
tick_secs = 30
heartbeat_secs = 30

[schedule.tasks.publish-paper]
interval_secs = 14400
priority = 0
prompt = "Summarize a recent paper."

[schedule.tasks.engagement]
interval_secs = 1800
priority = 1

[[providers]]
id = "gemini"
kind = "gemini"
model = "gemini-2.0-flash"
api_key_env = "GEMINI_API_KEY"

[[providers]]
id = "groq"
kind = "openai-compat"
base_url = "https://api.groq.com/openai/v1"
model = "llama-3.3-70b-versatile"
api_key_env = "GROQ_API_KEY"

[fallback]
degraded_threshold = 3
cooldown_base_secs = 60

[reflection]
interval_secs = 21600
max_slowdown = 4.0
"#;

    #[test]
    fn test_parse_sample_config() {
        let config: HivemindConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].id, "gemini");
        assert_eq!(config.providers[0].kind, ProviderKind::Gemini);
        assert_eq!(config.providers[1].kind, ProviderKind::OpenaiCompat);
        assert_eq!(config.schedule.tasks.len(), 2);
        assert_eq!(config.schedule.tasks["publish-paper"].interval_secs, 14400);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: HivemindConfig = toml::from_str("").unwrap();
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.schedule.tick_secs, 30);
        assert_eq!(config.fallback.degraded_threshold, 3);
        assert_eq!(config.fallback.unavailable_threshold, 8);
        assert!((config.reflection.max_slowdown - 4.0).abs() < f64::EPSILON);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_task_enabled_by_default() {
        let config: HivemindConfig = toml::from_str(SAMPLE).unwrap();
        assert!(config.schedule.tasks["engagement"].enabled);
    }

    #[test]
    fn test_provider_timeout_default() {
        let config: HivemindConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.providers[0].timeout_secs, 30);
    }

    #[test]
    fn test_state_dir_override() {
        let config = HivemindConfig {
            agent: AgentMeta {
                state_dir: Some(PathBuf::from("/tmp/hivemind-test")),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            config.state_dir().unwrap(),
            PathBuf::from("/tmp/hivemind-test")
        );
    }

    #[test]
    fn test_load_missing_file_fails_with_path() {
        let err = HivemindConfig::load(Path::new("/nonexistent/hivemind.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hivemind.toml"));
    }

    #[test]
    fn test_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hivemind.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = HivemindConfig::load(&path).unwrap();
        assert_eq!(config.providers[1].id, "groq");
    }
}
