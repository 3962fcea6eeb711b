//! Runtime configuration
//!
//! Configuration comes from the environment; there is no config file.

use std::env;

use log::warn;

/// Environment variable selecting the backend
pub const BACKEND_ENV: &str = "LUMINA_BACKEND";
/// Environment variable overriding the application id
pub const APP_ID_ENV: &str = "LUMINA_APP_ID";

const DEFAULT_APP_ID: &str = "lumina";

/// Which display protocol to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendPreference {
    /// Probe the session environment
    #[default]
    Auto,
    X11,
    Wayland,
}

impl BackendPreference {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "x11" => Some(BackendPreference::X11),
            "wayland" => Some(BackendPreference::Wayland),
            "auto" | "" => Some(BackendPreference::Auto),
            _ => None,
        }
    }
}

/// Application-level settings shared by every backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: BackendPreference,
    /// Wayland app-id and X11 `WM_CLASS`
    pub app_id: String,
}

impl Config {
    /// Read the configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let backend = match lookup(BACKEND_ENV) {
            Some(value) => BackendPreference::parse(&value).unwrap_or_else(|| {
                warn!("Ignoring unknown {}={:?}, probing instead", BACKEND_ENV, value);
                BackendPreference::Auto
            }),
            None => BackendPreference::Auto,
        };

        let app_id = lookup(APP_ID_ENV)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_APP_ID.to_string());

        Self { backend, app_id }
    }

    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            app_id: DEFAULT_APP_ID.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.app_id, "lumina");
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!(config_from(&[(BACKEND_ENV, "X11")]).backend, BackendPreference::X11);
        assert_eq!(
            config_from(&[(BACKEND_ENV, " wayland ")]).backend,
            BackendPreference::Wayland
        );
        assert_eq!(config_from(&[(BACKEND_ENV, "gdi")]).backend, BackendPreference::Auto);
    }

    #[test]
    fn test_app_id_override() {
        let config = config_from(&[(APP_ID_ENV, "org.example.viewer")]);
        assert_eq!(config.app_id, "org.example.viewer");

        let config = config_from(&[(APP_ID_ENV, "")]);
        assert_eq!(config.app_id, "lumina");
    }

    #[test]
    fn test_builders() {
        let config = Config::default()
            .with_backend(BackendPreference::Wayland)
            .with_app_id("demo");
        assert_eq!(config.backend, BackendPreference::Wayland);
        assert_eq!(config.app_id, "demo");
    }
}
