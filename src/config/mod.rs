use serde::{Deserialize, Serialize};

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_COLLAB_URL: &str = "ws://localhost:1234";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("Invalid sync config: {0}")]
    Parse(String),
}

/// Endpoints of the document store and the collaboration server.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EnvConfig {
    pub api_url: String,
    pub collab_url: String,
}

impl EnvConfig {
    /// In the browser the host page provides `window.ENV`; both the
    /// `API_URL` and the legacy `api_url` spellings are accepted.
    #[cfg(target_arch = "wasm32")]
    pub fn new() -> Self {
        use wasm_bindgen::JsValue;

        let read = |keys: &[&str]| -> Option<String> {
            let env = web_sys::window()?.get("ENV")?;
            if env.is_undefined() || !env.is_object() {
                return None;
            }
            keys.iter().find_map(|k| {
                js_sys::Reflect::get(&env, &JsValue::from_str(k))
                    .ok()
                    .and_then(|v| v.as_string())
            })
        };

        Self {
            api_url: read(&["API_URL", "api_url"]).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            collab_url: read(&["COLLAB_URL", "collab_url"])
                .unwrap_or_else(|| DEFAULT_COLLAB_URL.to_string()),
        }
    }

    /// Natively the process environment (and a `.env` file, if present) is used.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new() -> Self {
        Self {
            api_url: dotenvy::var("COLLABTREE_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            collab_url: dotenvy::var("COLLABTREE_COLLAB_URL")
                .unwrap_or_else(|_| DEFAULT_COLLAB_URL.to_string()),
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_debounce_ms() -> u64 {
    3_000
}

fn default_autosave_interval_ms() -> u64 {
    3_000
}

/// Timing of the persistence engine, in milliseconds.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after the last edit before a debounced save fires.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Period of the autosave tick.
    #[serde(default = "default_autosave_interval_ms")]
    pub autosave_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            autosave_interval_ms: default_autosave_interval_ms(),
        }
    }
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "debounce_ms",
            });
        }
        if self.autosave_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "autosave_interval_ms",
            });
        }
        Ok(self)
    }
}
