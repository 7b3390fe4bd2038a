//! XML configuration support.
//! - Loads settings from config.xml (quick_xml).
//! - A missing file means defaults; a malformed file is an error.
//!
//! Notes:
//! - Unknown XML fields are rejected so typos surface instead of being ignored.
//! - Mode values are octal strings ("0755", "755", "0o755").

use anyhow::{Context, Result, bail};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::paths::default_config_path;
use super::types::{Config, LogLevel};
use crate::node::perms::parse_mode;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "ATLAS_CONFIG";

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    default_dir_mode: Option<String>,
    lock_dir: Option<String>,
    log_level: Option<String>,
    log_file: Option<String>,
    json_logs: Option<bool>,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|t| !t.is_empty())
}

// Map XmlConfig -> Config; absent fields keep their defaults.
fn xml_to_config(parsed: XmlConfig, path: &Path) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(s) = non_empty(parsed.default_dir_mode.as_deref()) {
        cfg.default_dir_mode = match parse_mode(s) {
            Some(m) => m,
            None => bail!("invalid default_dir_mode '{s}' in {}", path.display()),
        };
    }
    if let Some(s) = non_empty(parsed.lock_dir.as_deref()) {
        cfg.lock_dir = PathBuf::from(s);
    }
    if let Some(s) = non_empty(parsed.log_level.as_deref()) {
        cfg.log_level = s
            .parse::<LogLevel>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("log_level in {}", path.display()))?;
    }
    if let Some(s) = non_empty(parsed.log_file.as_deref()) {
        cfg.log_file = Some(PathBuf::from(s));
    }
    cfg.json_logs = parsed.json_logs.unwrap_or(false);

    Ok(cfg)
}

/// Load a Config from a specific XML file path.
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = from_xml_str(&contents)
        .with_context(|| format!("parse config xml '{}'", path.display()))?;
    xml_to_config(parsed, path)
}

/// Resolve which config file applies: `$ATLAS_CONFIG` wins over the default path.
pub fn config_path() -> Option<PathBuf> {
    match env::var_os(CONFIG_ENV) {
        Some(p) if !p.is_empty() => Some(PathBuf::from(p)),
        _ => default_config_path(),
    }
}

/// Load the effective Config. A file named by `$ATLAS_CONFIG` must exist;
/// a missing default file yields defaults.
pub fn load_config() -> Result<Config> {
    let explicit = env::var_os(CONFIG_ENV).is_some_and(|p| !p.is_empty());
    let Some(path) = config_path() else {
        debug!("no config directory available; using defaults");
        return Ok(Config::default());
    };
    if !explicit && !path.exists() {
        debug!(path = %path.display(), "no config file; using defaults");
        return Ok(Config::default());
    }
    let cfg = load_config_from_xml_path(&path)?;
    debug!(path = %path.display(), "loaded config");
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    fn write(dir: &Path, body: &str) -> PathBuf {
        let p = dir.join("config.xml");
        fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn parses_all_fields() {
        let dir = tempdir().unwrap();
        let p = write(
            dir.path(),
            "<config>\n  <default_dir_mode>0750</default_dir_mode>\n  <lock_dir>/var/lock/atlas</lock_dir>\n  <log_level>debug</log_level>\n  <log_file> /tmp/atlas.log </log_file>\n  <json_logs>true</json_logs>\n</config>\n",
        );
        let cfg = load_config_from_xml_path(&p).unwrap();
        assert_eq!(cfg.default_dir_mode, 0o750);
        assert_eq!(cfg.lock_dir, PathBuf::from("/var/lock/atlas"));
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.log_file, Some(PathBuf::from("/tmp/atlas.log")));
        assert!(cfg.json_logs);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let p = write(dir.path(), "<config><log_level>info</log_level></config>");
        let cfg = load_config_from_xml_path(&p).unwrap();
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert_eq!(cfg.default_dir_mode, 0o777);
        assert!(cfg.log_file.is_none());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let dir = tempdir().unwrap();
        let p = write(dir.path(), "<config><colour>blue</colour></config>");
        assert!(load_config_from_xml_path(&p).is_err());
    }

    #[test]
    fn bad_mode_is_rejected() {
        let dir = tempdir().unwrap();
        let p = write(dir.path(), "<config><default_dir_mode>0999</default_dir_mode></config>");
        let err = load_config_from_xml_path(&p).unwrap_err();
        assert!(err.to_string().contains("default_dir_mode"));
    }

    #[test]
    #[serial]
    fn env_override_is_used() {
        let dir = tempdir().unwrap();
        let p = write(dir.path(), "<config><json_logs>true</json_logs></config>");
        unsafe { env::set_var(CONFIG_ENV, &p) };
        let cfg = load_config();
        unsafe { env::remove_var(CONFIG_ENV) };
        assert!(cfg.unwrap().json_logs);
    }

    #[test]
    #[serial]
    fn missing_env_file_is_an_error() {
        let dir = tempdir().unwrap();
        unsafe { env::set_var(CONFIG_ENV, dir.path().join("absent.xml")) };
        let res = load_config();
        unsafe { env::remove_var(CONFIG_ENV) };
        assert!(res.is_err());
    }
}
