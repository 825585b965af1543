use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dispatch::DispatcherConfig;
use crate::session::SessionConfig;
use crate::waapi::WaapiConfig;

// ---------------------------------------------------------------------------
// Config structs (parsed from TOML)
// ---------------------------------------------------------------------------

/// Represents the parsed TOML config file. All fields optional.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    pub connection: ConnectionConfig,
    pub dispatcher: DispatcherFileConfig,
    pub subscriptions: SubscriptionsConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub url: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub call_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherFileConfig {
    pub max_queue_size: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub shutdown_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriptionsConfig {
    pub buffer_size: Option<usize>,
}

/// Every section and key the file format knows about. `parse_config`
/// diffs the parsed table against this to flag typos without rejecting
/// the file.
const KNOWN_KEYS: &[(&str, &[&str])] = &[
    ("connection", &["url", "connect_timeout_ms", "call_timeout_ms"]),
    (
        "dispatcher",
        &["max_queue_size", "poll_interval_ms", "shutdown_timeout_ms"],
    ),
    ("subscriptions", &["buffer_size"]),
];

// ---------------------------------------------------------------------------
// Resolved config (all defaults filled in)
// ---------------------------------------------------------------------------

/// Default WAAPI endpoint of a local authoring app.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/waapi";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CALL_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_MAX_QUEUE_SIZE: usize = 100_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_SUBSCRIPTION_BUFFER: usize = 256;

/// Fully resolved configuration with all defaults filled in.
#[derive(Debug, Serialize)]
pub struct ResolvedConfig {
    pub config_path: Option<PathBuf>,
    pub url: String,
    pub connect_timeout_ms: u64,
    pub call_timeout_ms: u64,
    pub max_queue_size: usize,
    pub poll_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub subscription_buffer_size: usize,
}

impl ResolvedConfig {
    /// Project the resolved file config into the session's runtime
    /// configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            url: self.url.clone(),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            waapi: WaapiConfig {
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                event_capacity: self.subscription_buffer_size,
                ..WaapiConfig::default()
            },
            dispatcher: DispatcherConfig {
                max_queue_size: self.max_queue_size,
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Config file search
// ---------------------------------------------------------------------------

/// Locations a config file may live, most specific first: the `--config`
/// flag, `$AGENTWWISE_CONFIG`, a project-local `./.agentwwise.toml`, the
/// platform config directory, and finally `~/.agentwwise.toml`.
///
/// Paths that cannot be derived on this machine (no home directory, no
/// env var) simply do not appear; existence is the caller's concern.
fn candidate_paths(explicit: Option<&Path>, env_override: Option<String>) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(5);
    candidates.extend(explicit.map(Path::to_path_buf));
    candidates.extend(env_override.map(PathBuf::from));
    candidates.push(PathBuf::from(".agentwwise.toml"));
    candidates.extend(
        dirs::config_dir().map(|dir| dir.join("agentwwise").join("config.toml")),
    );
    candidates.extend(dirs::home_dir().map(|home| home.join(".agentwwise.toml")));
    candidates
}

/// First existing config file along the search precedence, if any.
#[must_use]
pub fn find_config_file(explicit_path: Option<&Path>) -> Option<PathBuf> {
    find_config_file_with(explicit_path, std::env::var("AGENTWWISE_CONFIG").ok())
}

/// Testable variant of [`find_config_file`] that accepts an explicit env value.
#[must_use]
pub fn find_config_file_with(
    explicit_path: Option<&Path>,
    env_override: Option<String>,
) -> Option<PathBuf> {
    candidate_paths(explicit_path, env_override)
        .into_iter()
        .find(|candidate| candidate.exists())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Locate, read, and parse the config file. Returns the path that was
/// used (if any) together with the parsed config; a missing file means
/// defaults.
#[must_use]
pub fn load_config(explicit_path: Option<&Path>) -> (Option<PathBuf>, ConfigFile) {
    let Some(path) = find_config_file(explicit_path) else {
        return (None, ConfigFile::default());
    };
    let config = load_config_from(&path);
    (Some(path), config)
}

/// Read and parse one specific config file.
///
/// Config problems never abort startup: an unreadable or invalid file
/// logs a warning and falls back to defaults.
#[must_use]
pub fn load_config_from(path: &Path) -> ConfigFile {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents, path),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config file unreadable; using defaults");
            ConfigFile::default()
        }
    }
}

/// Parse TOML content into a `ConfigFile`.
///
/// The content is parsed once into a generic table, whose keys are
/// diffed against [`KNOWN_KEYS`] so typos get a warning while the known
/// parts of the file still apply. Only then is the table deserialized
/// into the typed config.
#[must_use]
pub fn parse_config(contents: &str, path: &Path) -> ConfigFile {
    let table: toml::Table = match toml::from_str(contents) {
        Ok(table) => table,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config file is not valid TOML; using defaults");
            return ConfigFile::default();
        }
    };

    for unknown in unknown_keys(&table) {
        warn!(path = %path.display(), key = %unknown, "ignoring unknown config key");
    }

    match toml::Value::Table(table).try_into() {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config file has wrong value types; using defaults");
            ConfigFile::default()
        }
    }
}

/// Dotted names of table entries the file format does not define.
fn unknown_keys(table: &toml::Table) -> Vec<String> {
    let mut unknown = Vec::new();
    for (section, value) in table {
        let Some((_, fields)) = KNOWN_KEYS.iter().find(|(name, _)| *name == section.as_str())
        else {
            unknown.push(section.clone());
            continue;
        };
        if let toml::Value::Table(entries) = value {
            for key in entries.keys() {
                if !fields.contains(&key.as_str()) {
                    unknown.push(format!("{section}.{key}"));
                }
            }
        }
    }
    unknown
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

/// Resolve a config file into a fully-populated `ResolvedConfig` with all defaults.
#[must_use]
pub fn resolve_config(file: &ConfigFile, config_path: Option<PathBuf>) -> ResolvedConfig {
    ResolvedConfig {
        config_path,
        url: file
            .connection
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_URL.to_string()),
        connect_timeout_ms: file
            .connection
            .connect_timeout_ms
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
        call_timeout_ms: file
            .connection
            .call_timeout_ms
            .unwrap_or(DEFAULT_CALL_TIMEOUT_MS),
        max_queue_size: file
            .dispatcher
            .max_queue_size
            .unwrap_or(DEFAULT_MAX_QUEUE_SIZE),
        poll_interval_ms: file
            .dispatcher
            .poll_interval_ms
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        shutdown_timeout_ms: file
            .dispatcher
            .shutdown_timeout_ms
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS),
        subscription_buffer_size: file
            .subscriptions
            .buffer_size
            .unwrap_or(DEFAULT_SUBSCRIPTION_BUFFER),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
