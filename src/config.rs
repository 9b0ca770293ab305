use serde::Deserialize;
use thiserror::Error;
use wasm_bindgen::JsValue;

const WINDOW_CONFIG_KEY: &str = "MARKPAD_CONFIG";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration value `{0}`")]
    Missing(&'static str),
    #[error("backend URL must start with http:// or https://, got `{0}`")]
    InvalidUrl(String),
}

/// Raw, possibly partial configuration as supplied by the page.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl RawConfig {
    fn from_build_env() -> Self {
        Self {
            supabase_url: option_env!("MARKPAD_SUPABASE_URL").map(str::to_string),
            supabase_anon_key: option_env!("MARKPAD_SUPABASE_ANON_KEY").map(str::to_string),
            log_level: option_env!("MARKPAD_LOG").map(str::to_string),
        }
    }

    fn from_window() -> Option<Self> {
        let window = web_sys::window()?;
        let value =
            js_sys::Reflect::get(window.as_ref(), &JsValue::from_str(WINDOW_CONFIG_KEY)).ok()?;
        if value.is_undefined() || value.is_null() {
            return None;
        }
        match serde_wasm_bindgen::from_value(value) {
            Ok(raw) => Some(raw),
            Err(err) => {
                log::warn!("ignoring malformed window.{WINDOW_CONFIG_KEY}: {err}");
                None
            }
        }
    }

    /// Fields set in `self` win over `fallback`.
    fn or(self, fallback: RawConfig) -> Self {
        Self {
            supabase_url: self.supabase_url.or(fallback.supabase_url),
            supabase_anon_key: self.supabase_anon_key.or(fallback.supabase_anon_key),
            log_level: self.log_level.or(fallback.log_level),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub log_level: log::Level,
}

impl AppConfig {
    /// Page-provided `window.MARKPAD_CONFIG` first, then build-time env.
    pub fn load() -> Result<Self, ConfigError> {
        let raw = RawConfig::from_window()
            .unwrap_or_default()
            .or(RawConfig::from_build_env());
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let url = non_empty(raw.supabase_url).ok_or(ConfigError::Missing("supabase_url"))?;
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::InvalidUrl(url));
        }
        let key =
            non_empty(raw.supabase_anon_key).ok_or(ConfigError::Missing("supabase_anon_key"))?;
        let log_level = raw
            .log_level
            .as_deref()
            .and_then(|level| level.trim().parse().ok())
            .unwrap_or(log::Level::Info);
        Ok(Self {
            supabase_url: url.trim_end_matches('/').to_string(),
            supabase_anon_key: key,
            log_level,
        })
    }

    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.supabase_url, path.trim_start_matches('/'))
    }

    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.supabase_url, table)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
