//! The agent's YAML configuration file.
//!
//! # Storage layout
//!
//! ```text
//! ~/.forecourt/
//!   agent.yaml   (mode 0600, created by `forecourt init`)
//! ```
//!
//! # API pattern
//!
//! Every function touching the config has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::AgentConfig;

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.forecourt/`
///
/// Creates the directory (mode `0700`) if it does not yet exist.
pub fn agent_dir_at(home: &Path) -> Result<PathBuf, ConfigError> {
    let dir = home.join(".forecourt");
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<home>/.forecourt/` (convenience — uses `dirs::home_dir()`).
pub fn agent_dir() -> Result<PathBuf, ConfigError> {
    agent_dir_at(&home()?)
}

/// `<home>/.forecourt/agent.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".forecourt").join("agent.yaml")
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load the agent config from `<home>/.forecourt/agent.yaml`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<AgentConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<AgentConfig, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the agent config to `<home>/.forecourt/agent.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem — no EXDEV on macOS).
pub fn save_at(home: &Path, config: &AgentConfig) -> Result<(), ConfigError> {
    agent_dir_at(home)?; // create dir + 0700 if absent
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("agent.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &AgentConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    #[test]
    fn config_path_is_correct() {
        let home = make_home();
        let path = config_path_at(home.path());
        assert!(path.ends_with(".forecourt/agent.yaml"));
    }

    #[test]
    fn agent_dir_created_with_perms() {
        let home = make_home();
        let dir = agent_dir_at(home.path()).expect("agent_dir_at");
        assert!(dir.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn save_then_load_roundtrip() {
        let home = make_home();
        let created = AgentConfig::new(
            PathBuf::from("/var/exports"),
            "https://erp.example.com".into(),
            1042,
        );
        save_at(home.path(), &created).expect("save");
        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded, created);
        assert_eq!(loaded.station.id, 1042);
        assert_eq!(loaded.exports.archive_ext, "zip");
    }

    #[test]
    fn save_overwrites_atomically() {
        let home = make_home();
        let mut cfg = AgentConfig::new(PathBuf::from("/a"), "http://one".into(), 1);
        save_at(home.path(), &cfg).expect("first save");
        cfg.station.expected_code = Some("ST-0001".into());
        save_at(home.path(), &cfg).expect("save");

        let tmp = config_path_at(home.path()).with_file_name("agent.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");

        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded.station.expected_code.as_deref(), Some("ST-0001"));
    }

    #[test]
    fn config_file_mode_is_0600() {
        let home = make_home();
        let cfg = AgentConfig::new(PathBuf::from("/a"), "http://one".into(), 1);
        save_at(home.path(), &cfg).expect("save");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(config_path_at(home.path()))
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn load_missing_config_returns_not_found() {
        let home = make_home();
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigNotFound { .. }));
    }

    #[test]
    fn load_malformed_yaml_names_the_path() {
        let home = make_home();
        agent_dir_at(home.path()).expect("dir");
        std::fs::write(config_path_at(home.path()), "watch_dir: [unterminated").expect("write");
        let err = load_at(home.path()).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert!(path.ends_with("agent.yaml")),
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
    }
}
