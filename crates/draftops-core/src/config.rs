// Configuration loading and parsing (session.toml).

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::reconcile::ReconcilerConfig;

const SESSION_FILE: &str = "session.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// session.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub session: SessionConfig,
    #[serde(default)]
    pub resolver: ResolverSettings,
    #[serde(default)]
    pub data: DataPaths,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub league_id: String,
    /// The user's team (1-based).
    pub team_id: u32,
    pub team_count: u32,
    /// Picks per team, which is also the number of rounds.
    pub roster_size: u32,
    /// Team ids in round-one order. Enables snake-order tracking.
    #[serde(default)]
    pub draft_order: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverSettings {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl ResolverSettings {
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
        }
    }
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_batch_size() -> usize {
    50
}

fn default_flush_interval_ms() -> u64 {
    250
}

/// File locations, relative to the base directory unless absolute.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    #[serde(default = "default_players_csv")]
    pub players_csv: String,
    #[serde(default = "default_cache_db")]
    pub cache_db: String,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            players_csv: default_players_csv(),
            cache_db: default_cache_db(),
        }
    }
}

fn default_players_csv() -> String {
    "data/players.csv".into()
}

fn default_cache_db() -> String {
    "player_cache.db".into()
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/session.toml` relative to `base_dir`.
///
/// Does not copy defaults; call `ensure_session_file` first, or use
/// `load_config` which does both.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(SESSION_FILE);
    let text = read_file(&path)?;
    let config = parse_config(&text, &path)?;
    validate(&config)?;
    Ok(config)
}

fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Copy `defaults/session.toml` to `config/session.toml` unless the latter
/// already exists. Returns the written path, or `None` when nothing was copied.
pub fn ensure_session_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let source = base_dir.join("defaults").join(SESSION_FILE);
    let target = base_dir.join("config").join(SESSION_FILE);

    if target.exists() {
        return Ok(None);
    }
    if !source.is_file() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "no {SESSION_FILE} under config/ or defaults/ in {}",
                base_dir.display()
            ),
        });
    }

    let copy_error = |e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {} to {}: {e}", source.display(), target.display()),
    };
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(copy_error)?;
    }
    std::fs::copy(&source, &target).map_err(copy_error)?;
    Ok(Some(target))
}

/// Copy missing defaults into `base_dir/config`, then load.
pub fn load_config(base_dir: &Path) -> Result<Config, ConfigError> {
    ensure_session_file(base_dir)?;
    load_config_from(base_dir)
}

/// Resolve a configured data path against the base directory.
pub fn resolve_path(base_dir: &Path, configured: &str) -> PathBuf {
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validation_error(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let session = &config.session;

    if session.league_id.trim().is_empty() {
        return Err(validation_error("session.league_id", "must not be empty"));
    }
    if session.team_count == 0 {
        return Err(validation_error("session.team_count", "must be greater than 0"));
    }
    if session.roster_size == 0 {
        return Err(validation_error("session.roster_size", "must be greater than 0"));
    }
    if session.team_id == 0 || session.team_id > session.team_count {
        return Err(validation_error(
            "session.team_id",
            format!(
                "must be between 1 and {} inclusive, got {}",
                session.team_count, session.team_id
            ),
        ));
    }

    if let Some(order) = &session.draft_order {
        let unique: HashSet<u32> = order.iter().copied().collect();
        let complete = order.len() == session.team_count as usize
            && unique.len() == order.len()
            && order.iter().all(|&t| (1..=session.team_count).contains(&t));
        if !complete {
            return Err(validation_error(
                "session.draft_order",
                format!(
                    "must list each team id 1..={} exactly once, got {:?}",
                    session.team_count, order
                ),
            ));
        }
    }

    let resolver = &config.resolver;
    let resolver_fields: &[(&str, u64)] = &[
        ("resolver.queue_capacity", resolver.queue_capacity as u64),
        ("resolver.batch_size", resolver.batch_size as u64),
        ("resolver.flush_interval_ms", resolver.flush_interval_ms),
    ];
    for (name, val) in resolver_fields {
        if *val == 0 {
            return Err(validation_error(name, "must be > 0"));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const VALID: &str = r#"
[session]
league_id = "12345"
team_id = 3
team_count = 10
roster_size = 16
draft_order = [4, 1, 3, 2, 5, 6, 7, 8, 9, 10]

[resolver]
queue_capacity = 64
batch_size = 10
flush_interval_ms = 100

[data]
players_csv = "data/players.csv"
cache_db = "cache.db"
"#;

    fn parse(text: &str) -> Result<Config, ConfigError> {
        let config = parse_config(text, Path::new("session.toml"))?;
        validate(&config)?;
        Ok(config)
    }

    fn expect_field_error(text: &str, expected_field: &str) {
        match parse(text).unwrap_err() {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, expected_field),
            other => panic!("expected ValidationError, got: {other}"),
        }
    }

    /// Path to the workspace root, where `defaults/` lives.
    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
    }

    #[test]
    fn parses_full_config() {
        let config = parse(VALID).unwrap();
        assert_eq!(config.session.league_id, "12345");
        assert_eq!(config.session.team_id, 3);
        assert_eq!(config.session.draft_order.as_ref().unwrap()[0], 4);
        assert_eq!(config.resolver.queue_capacity, 64);
        assert_eq!(config.data.cache_db, "cache.db");

        let reconciler = config.resolver.reconciler_config();
        assert_eq!(reconciler.batch_size, 10);
        assert_eq!(reconciler.flush_interval, Duration::from_millis(100));
    }

    #[test]
    fn optional_sections_use_defaults() {
        let config = parse(
            "[session]\nleague_id = \"l\"\nteam_id = 1\nteam_count = 12\nroster_size = 16\n",
        )
        .unwrap();
        assert!(config.session.draft_order.is_none());
        assert_eq!(config.resolver.queue_capacity, 1024);
        assert_eq!(config.resolver.batch_size, 50);
        assert_eq!(config.resolver.flush_interval_ms, 250);
        assert_eq!(config.data.players_csv, "data/players.csv");
        assert_eq!(config.data.cache_db, "player_cache.db");
    }

    #[test]
    fn shipped_defaults_are_valid() {
        let path = workspace_root().join("defaults/session.toml");
        let text = fs::read_to_string(&path).unwrap();
        parse_config(&text, &path).and_then(|c| validate(&c)).unwrap();
    }

    #[test]
    fn rejects_team_count_zero() {
        expect_field_error(
            "[session]\nleague_id = \"l\"\nteam_id = 1\nteam_count = 0\nroster_size = 16\n",
            "session.team_count",
        );
    }

    #[test]
    fn rejects_roster_size_zero() {
        expect_field_error(
            "[session]\nleague_id = \"l\"\nteam_id = 1\nteam_count = 12\nroster_size = 0\n",
            "session.roster_size",
        );
    }

    #[test]
    fn rejects_team_id_out_of_range() {
        expect_field_error(
            "[session]\nleague_id = \"l\"\nteam_id = 13\nteam_count = 12\nroster_size = 16\n",
            "session.team_id",
        );
    }

    #[test]
    fn rejects_empty_league_id() {
        expect_field_error(
            "[session]\nleague_id = \" \"\nteam_id = 1\nteam_count = 12\nroster_size = 16\n",
            "session.league_id",
        );
    }

    #[test]
    fn rejects_draft_order_with_repeats() {
        expect_field_error(
            "[session]\nleague_id = \"l\"\nteam_id = 1\nteam_count = 3\nroster_size = 2\n\
             draft_order = [1, 1, 3]\n",
            "session.draft_order",
        );
    }

    #[test]
    fn rejects_draft_order_wrong_length() {
        expect_field_error(
            "[session]\nleague_id = \"l\"\nteam_id = 1\nteam_count = 3\nroster_size = 2\n\
             draft_order = [1, 2]\n",
            "session.draft_order",
        );
    }

    #[test]
    fn rejects_zero_batch_size() {
        expect_field_error(
            "[session]\nleague_id = \"l\"\nteam_id = 1\nteam_count = 3\nroster_size = 2\n\
             [resolver]\nbatch_size = 0\n",
            "resolver.batch_size",
        );
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        match parse("[session\nleague_id = ").unwrap_err() {
            ConfigError::ParseError { path, .. } => assert!(path.ends_with("session.toml")),
            other => panic!("expected ParseError, got: {other}"),
        }
    }

    #[test]
    fn file_not_found_for_missing_session_toml() {
        let tmp = std::env::temp_dir().join("draftops_config_test_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();

        match load_config_from(&tmp).unwrap_err() {
            ConfigError::FileNotFound { path } => assert!(path.ends_with("session.toml")),
            other => panic!("expected FileNotFound, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn load_config_copies_defaults_then_loads() {
        let tmp = std::env::temp_dir().join("draftops_config_test_load");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults/session.toml"), VALID).unwrap();

        let config = load_config(&tmp).unwrap();
        assert_eq!(config.session.team_count, 10);
        assert!(tmp.join("config/session.toml").exists());
        assert_eq!(ensure_session_file(&tmp).unwrap(), None);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn existing_session_file_is_kept() {
        let tmp = std::env::temp_dir().join("draftops_config_test_skips");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("defaults/session.toml"), VALID).unwrap();
        fs::write(tmp.join("config/session.toml"), "# custom\n").unwrap();

        let copied = ensure_session_file(&tmp).unwrap();
        assert!(copied.is_none());
        let content = fs::read_to_string(tmp.join("config/session.toml")).unwrap();
        assert_eq!(content, "# custom\n");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_defaults_and_config_is_an_error() {
        let tmp = std::env::temp_dir().join("draftops_config_test_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        match ensure_session_file(&tmp).unwrap_err() {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("no session.toml under config/ or defaults/"));
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn resolve_path_keeps_absolute_paths() {
        let base = Path::new("/srv/draft");
        assert_eq!(resolve_path(base, "data/p.csv"), PathBuf::from("/srv/draft/data/p.csv"));
        assert_eq!(resolve_path(base, "/tmp/p.csv"), PathBuf::from("/tmp/p.csv"));
    }
}
