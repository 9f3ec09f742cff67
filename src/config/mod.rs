//! Configuration Management
//!
//! This module resolves the provider-level configuration: the cluster host,
//! admin credentials, and the CA certificate path.
//!
//! # Configuration Locations
//! - Local: `.cockroach-provider/config.json` (team-shareable, per-project)
//! - Global: `~/.config/cockroach-provider/config.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit values (CLI flags / environment, or the `configure` request)
//! 2. Local config file
//! 3. Global config file
//!
//! Values are merged field by field, so an explicit `--host` can be combined
//! with credentials stored in a file.
//!
//! # Named Profiles
//! Files hold named profiles (e.g., "staging", "prod") plus an optional
//! default pointer.
//!
//! # Validation Boundary
//! [`ProviderConfig::validate`] is the only place raw configuration becomes a
//! [`ConnectionDescriptor`]. It reports every problem at once and runs before
//! any connection is attempted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::cockroach::ConnectionDescriptor;
use crate::error::{ConfigIssue, ProviderError, Result};

const CONFIG_DIR_NAME: &str = "cockroach-provider";
const LOCAL_DIR_NAME: &str = ".cockroach-provider";
const CONFIG_FILE_NAME: &str = "config.json";

/// Provider configuration as supplied by the user
///
/// Every field is optional at this level; [`Self::validate`] decides what is
/// missing.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Host of the Cockroach cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// User with cluster admin permissions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for the admin user
    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable name holding the password (if not storing it directly)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Path to the certificate authority for the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certpath: Option<PathBuf>,
}

impl ProviderConfig {
    /// Fill every unset field from `fallback`
    ///
    /// `password` and `password_env` travel together: if either is set here,
    /// the fallback's password settings are ignored.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        let (password, password_env) = if self.password.is_some() || self.password_env.is_some() {
            (self.password, self.password_env)
        } else {
            (fallback.password, fallback.password_env)
        };

        Self {
            host: self.host.or(fallback.host),
            username: self.username.or(fallback.username),
            password,
            password_env,
            certpath: self.certpath.or(fallback.certpath),
        }
    }

    /// Validate the configuration and build the connection descriptor
    ///
    /// All four attributes are required. Absent or empty values are reported
    /// as missing; a `password_env` that does not resolve is reported as
    /// unknown.
    pub fn validate(&self) -> Result<ConnectionDescriptor> {
        let mut issues = Vec::new();

        let host = required(&self.host, "host", &mut issues);
        let username = required(&self.username, "username", &mut issues);
        let password = self.resolve_password(&mut issues);
        let certpath = match &self.certpath {
            Some(path) if !path.as_os_str().is_empty() => Some(path.clone()),
            _ => {
                issues.push(ConfigIssue::missing("certpath"));
                None
            }
        };

        match (host, username, password, certpath) {
            (Some(host), Some(username), Some(password), Some(certpath)) if issues.is_empty() => {
                Ok(ConnectionDescriptor::new(host, username, password, certpath))
            }
            _ => Err(ProviderError::configuration(issues)),
        }
    }

    fn resolve_password(&self, issues: &mut Vec<ConfigIssue>) -> Option<String> {
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            return Some(password.to_string());
        }

        match &self.password_env {
            Some(env_var) => match std::env::var(env_var) {
                Ok(password) if !password.is_empty() => Some(password),
                _ => {
                    issues.push(ConfigIssue::unknown("password"));
                    None
                }
            },
            None => {
                issues.push(ConfigIssue::missing("password"));
                None
            }
        }
    }
}

fn required(value: &Option<String>, attribute: &str, issues: &mut Vec<ConfigIssue>) -> Option<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => {
            issues.push(ConfigIssue::missing(attribute));
            None
        }
    }
}

// Hand-written so the password never reaches logs
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("password_env", &self.password_env)
            .field("certpath", &self.certpath)
            .finish()
    }
}

/// Contents of a config file: named profiles plus a default pointer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Named provider configurations
    #[serde(default)]
    pub profiles: BTreeMap<String, ProviderConfig>,

    /// Name of the default profile (must exist in profiles map)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ConfigFile {
    /// Merge `local` over `self`: profiles with the same name are replaced,
    /// and a local default pointer wins.
    #[must_use]
    pub fn merged_with(mut self, local: Self) -> Self {
        self.profiles.extend(local.profiles);
        if local.default.is_some() {
            self.default = local.default;
        }
        self
    }

    /// Look up a profile by name, or the default profile when `name` is `None`
    ///
    /// With no name and no default, an empty configuration is returned so
    /// explicit values alone can still satisfy validation.
    pub fn profile(&self, name: Option<&str>) -> Result<ProviderConfig> {
        let name = match name.or(self.default.as_deref()) {
            Some(n) => n,
            None => return Ok(ProviderConfig::default()),
        };

        self.profiles.get(name).cloned().ok_or_else(|| {
            let available: Vec<_> = self.profiles.keys().collect();
            ProviderError::config_file(format!(
                "Profile '{name}' not found. Available profiles: {available:?}"
            ))
        })
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.cockroach-provider/config.json` (team-shareable)
    Local,
    /// Global config: `~/.config/cockroach-provider/config.json` (per-user)
    Global,
}

/// Get path to local config file
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        ProviderError::config_file(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(LOCAL_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Get path to global config file
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ProviderError::config_file("Could not determine user config directory"))?;

    Ok(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Path for a config location
pub fn config_path(location: ConfigLocation) -> Result<PathBuf> {
    match location {
        ConfigLocation::Local => local_config_path(),
        ConfigLocation::Global => global_config_path(),
    }
}

/// Load a config file; a missing file is an empty config
pub fn load_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| ProviderError::config_file(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents).map_err(|e| {
        ProviderError::config_file(format!("Invalid config file format ({}): {e}", path.display()))
    })
}

/// Save a config file, creating its directory if needed
pub fn save_file(path: &Path, file: &ConfigFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ProviderError::config_file(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(file)
        .map_err(|e| ProviderError::config_file(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| ProviderError::config_file(format!("Could not write config file: {e}")))
}

/// Load global and local files, local taking precedence
pub fn load_with_precedence() -> Result<ConfigFile> {
    let global = load_file(&global_config_path()?)?;
    let local = load_file(&local_config_path()?)?;
    Ok(global.merged_with(local))
}

/// Resolve the effective provider configuration
///
/// `explicit` values win over the named (or default) profile from the merged
/// config files.
pub fn resolve(explicit: ProviderConfig, profile: Option<&str>) -> Result<ProviderConfig> {
    let files = load_with_precedence()?;
    Ok(explicit.or(files.profile(profile)?))
}

/// Save a profile to a config file
///
/// The first profile written to a file becomes its default.
pub fn save_profile(name: &str, config: ProviderConfig, location: ConfigLocation) -> Result<PathBuf> {
    let path = config_path(location)?;
    let mut file = load_file(&path)?;

    if file.profiles.is_empty() {
        file.default = Some(name.to_string());
    }
    file.profiles.insert(name.to_string(), config);

    save_file(&path, &file)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigIssueKind;

    fn full_config() -> ProviderConfig {
        ProviderConfig {
            host: Some("crdb.internal".to_string()),
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            password_env: None,
            certpath: Some(PathBuf::from("/etc/crdb/ca.crt")),
        }
    }

    fn issues(err: ProviderError) -> Vec<ConfigIssue> {
        match err {
            ProviderError::Configuration(issues) => issues,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_complete_config() {
        let descriptor = full_config().validate().unwrap();
        assert_eq!(descriptor.host(), "crdb.internal");
        assert_eq!(descriptor.admin_username(), "admin");
        assert_eq!(descriptor.ca_cert_path(), Path::new("/etc/crdb/ca.crt"));
    }

    #[test]
    fn test_validate_reports_every_missing_field() {
        let found = issues(ProviderConfig::default().validate().unwrap_err());
        let attributes: Vec<_> = found.iter().map(|i| i.attribute.as_str()).collect();
        assert_eq!(attributes, vec!["host", "username", "password", "certpath"]);
        assert!(found.iter().all(|i| i.kind == ConfigIssueKind::Missing));
    }

    #[test]
    fn test_validate_empty_strings_are_missing() {
        let config = ProviderConfig { host: Some("  ".to_string()), ..full_config() };
        let found = issues(config.validate().unwrap_err());
        assert_eq!(found, vec![ConfigIssue::missing("host")]);
    }

    #[test]
    fn test_password_env_resolution() {
        std::env::set_var("COCKROACH_PROVIDER_TEST_PASSWORD", "from-env");
        let config = ProviderConfig {
            password: None,
            password_env: Some("COCKROACH_PROVIDER_TEST_PASSWORD".to_string()),
            ..full_config()
        };
        let descriptor = config.validate().unwrap();
        assert_eq!(descriptor.pg_config().get_password(), Some(b"from-env".as_slice()));
        std::env::remove_var("COCKROACH_PROVIDER_TEST_PASSWORD");
    }

    #[test]
    fn test_unresolved_password_env_is_unknown() {
        let config = ProviderConfig {
            password: None,
            password_env: Some("COCKROACH_PROVIDER_NONEXISTENT_VAR".to_string()),
            ..full_config()
        };
        let found = issues(config.validate().unwrap_err());
        assert_eq!(found, vec![ConfigIssue::unknown("password")]);
    }

    #[test]
    fn test_explicit_values_override_fallback() {
        let explicit = ProviderConfig { host: Some("override".to_string()), ..Default::default() };
        let merged = explicit.or(full_config());
        assert_eq!(merged.host.as_deref(), Some("override"));
        assert_eq!(merged.username.as_deref(), Some("admin"));
        assert_eq!(merged.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_password_settings_travel_together() {
        let explicit = ProviderConfig {
            password_env: Some("ADMIN_PW".to_string()),
            ..Default::default()
        };
        let merged = explicit.or(full_config());
        assert_eq!(merged.password, None);
        assert_eq!(merged.password_env.as_deref(), Some("ADMIN_PW"));
    }

    #[test]
    fn test_debug_masks_password() {
        let debug = format!("{:?}", full_config());
        assert!(!debug.contains("secret"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_unknown_config_fields_rejected() {
        let parsed = serde_json::from_str::<ProviderConfig>(r#"{"host": "h", "port": 26257}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_local_file_overrides_global_profile() {
        let mut global = ConfigFile::default();
        global.profiles.insert("prod".to_string(), full_config());
        global.profiles.insert("staging".to_string(), full_config());
        global.default = Some("prod".to_string());

        let mut local = ConfigFile::default();
        local.profiles.insert(
            "prod".to_string(),
            ProviderConfig { host: Some("local-host".to_string()), ..Default::default() },
        );
        local.default = Some("staging".to_string());

        let merged = global.merged_with(local);
        assert_eq!(merged.profiles.len(), 2);
        assert_eq!(merged.default.as_deref(), Some("staging"));
        assert_eq!(merged.profiles["prod"].host.as_deref(), Some("local-host"));
        assert_eq!(merged.profiles["prod"].username, None);
    }

    #[test]
    fn test_profile_lookup() {
        let mut file = ConfigFile::default();
        file.profiles.insert("prod".to_string(), full_config());

        assert_eq!(file.profile(None).unwrap(), ProviderConfig::default());
        assert_eq!(file.profile(Some("prod")).unwrap(), full_config());

        let err = file.profile(Some("dev")).unwrap_err();
        assert!(err.message().contains("Profile 'dev' not found"));

        file.default = Some("prod".to_string());
        assert_eq!(file.profile(None).unwrap(), full_config());
    }

    #[test]
    fn test_save_and_load_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCAL_DIR_NAME).join(CONFIG_FILE_NAME);

        let mut file = ConfigFile::default();
        file.profiles.insert("prod".to_string(), full_config());
        file.default = Some("prod".to_string());
        save_file(&path, &file).unwrap();

        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded.default.as_deref(), Some("prod"));
        assert_eq!(loaded.profiles["prod"], full_config());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_file(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.profiles.is_empty());
        assert!(loaded.default.is_none());
    }

    #[test]
    fn test_malformed_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();

        let err = load_file(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
        assert!(err.message().contains("Invalid config file format"));
    }
}
