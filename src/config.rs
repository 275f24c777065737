use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;

pub const DEFAULT_LOCAL_URL: &str = "http://localhost:3000";
pub const DEFAULT_LAN_URL: &str = "http://192.168.10.108:3000";

/// Where the backend lives.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Explicit backend URL. Wins over everything else when set and non-empty.
    pub url: Option<String>,
    /// Hostname the application is served from. Picks between `local_url` and `lan_url`.
    pub host: String,
    pub local_url: String,
    pub lan_url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Session file. Defaults to `<data dir>/drpilot/session.json`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Whether the client should print progress lines to the console.
    pub debug: bool,
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("api.host", "localhost")?
        .set_default("api.local_url", DEFAULT_LOCAL_URL)?
        .set_default("api.lan_url", DEFAULT_LAN_URL)?
        .set_default("debug", false)
}

impl Settings {
    /// Loads defaults, then `config/drpilot.*` if present, then `DRPILOT_*` variables.
    /// E.g. `DRPILOT_API__URL=https://api.drpilot.app` sets `Settings.api.url`.
    pub fn new() -> Result<Self, ConfigError> {
        with_defaults()?
            .add_source(File::with_name("config/drpilot").required(false))
            .add_source(
                Environment::with_prefix("drpilot")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults only, with the given overrides applied on top.
    pub fn with_overrides(overrides: &[(&str, &str)]) -> Result<Self, ConfigError> {
        let mut builder = with_defaults()?;
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }
        builder.build()?.try_deserialize()
    }

    /// Resolves the single backend base URL every collaborator uses.
    pub fn base_url(&self) -> String {
        resolve_base_url(
            self.api.url.as_deref(),
            &self.api.host,
            &self.api.local_url,
            &self.api.lan_url,
        )
    }

    /// The session file path, or `None` when no data directory can be found.
    pub fn storage_path(&self) -> Option<PathBuf> {
        self.storage
            .path
            .clone()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("drpilot").join("session.json")))
    }
}

pub fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

pub fn resolve_base_url(override_url: Option<&str>, host: &str, local_url: &str, lan_url: &str) -> String {
    let base = match override_url.map(str::trim) {
        Some(url) if !url.is_empty() => url,
        _ if is_loopback_host(host) => local_url,
        _ => lan_url,
    };

    base.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::with_overrides(&[]).expect("Failed to load settings");
        assert_eq!(settings.api.url, None);
        assert_eq!(settings.api.host, "localhost");
        assert!(!settings.debug);
        assert_eq!(settings.base_url(), DEFAULT_LOCAL_URL);
    }

    #[test]
    fn test_override_wins() {
        let settings = Settings::with_overrides(&[
            ("api.url", "https://api.drpilot.app/"),
            ("api.host", "drpilot.app"),
        ])
        .expect("Failed to load settings");
        assert_eq!(settings.base_url(), "https://api.drpilot.app");
    }

    #[test]
    fn test_lan_host_picks_lan_url() {
        let settings =
            Settings::with_overrides(&[("api.host", "192.168.10.20")]).expect("Failed to load settings");
        assert_eq!(settings.base_url(), DEFAULT_LAN_URL);
    }

    #[test]
    fn test_blank_override_is_ignored() {
        assert_eq!(
            resolve_base_url(Some("  "), "127.0.0.1", DEFAULT_LOCAL_URL, DEFAULT_LAN_URL),
            DEFAULT_LOCAL_URL
        );
    }

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback_host("localhost"));
        assert!(is_loopback_host("LOCALHOST"));
        assert!(is_loopback_host("127.0.0.1"));
        assert!(is_loopback_host("[::1]"));
        assert!(!is_loopback_host("192.168.10.108"));
        assert!(!is_loopback_host("drpilot.app"));
    }

    #[test]
    fn test_explicit_storage_path() {
        let settings = Settings::with_overrides(&[("storage.path", "/tmp/drpilot/session.json")])
            .expect("Failed to load settings");
        assert_eq!(
            settings.storage_path(),
            Some(PathBuf::from("/tmp/drpilot/session.json"))
        );
    }
}
