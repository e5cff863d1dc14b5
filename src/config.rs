use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::errors::{GenError, GenResult};

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const ASSISTANT_ID_VAR: &str = "ASSISTANT_ID";
pub const API_KEY_PREFIX: &str = "sk-";

const REQUIRED_KEYS: [&str; 2] = [API_KEY_VAR, ASSISTANT_ID_VAR];

/// API credentials, loaded once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub assistant_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("assistant_id", &self.assistant_id)
            .finish()
    }
}

impl Credentials {
    /// Load from a `KEY=VALUE` file, falling back to the process environment
    /// for any key the file does not provide.
    pub fn load(path: &Path) -> GenResult<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    pub fn load_with<F>(path: &Path, env: F) -> GenResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = read_config_file(path);

        for key in REQUIRED_KEYS {
            if values.contains_key(key) {
                continue;
            }
            if let Some(value) = env(key).filter(|v| !v.is_empty()) {
                debug!(key, "loaded from environment");
                values.insert(key.to_string(), value);
            }
        }

        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|k| !values.contains_key(**k))
            .map(|k| k.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(GenError::Config { missing });
        }

        Ok(Self {
            api_key: values.remove(API_KEY_VAR).unwrap_or_default(),
            assistant_id: values.remove(ASSISTANT_ID_VAR).unwrap_or_default(),
        })
    }

    /// Minimal format check, run before any remote call.
    pub fn validate(&self) -> GenResult<()> {
        if !self.api_key.starts_with(API_KEY_PREFIX) {
            return Err(GenError::InvalidKeyFormat(API_KEY_PREFIX));
        }
        if self.assistant_id.trim().is_empty() {
            return Err(GenError::Config {
                missing: vec![ASSISTANT_ID_VAR.to_string()],
            });
        }
        Ok(())
    }
}

/// Read the required keys from the config file. Unknown keys and malformed
/// lines are ignored; a missing file yields an empty map.
// `from_path_iter` parses the file without touching the process environment.
#[allow(deprecated)]
fn read_config_file(path: &Path) -> HashMap<String, String> {
    let mut values = HashMap::new();

    let iter = match dotenv::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => {
            info!(path = %path.display(), "config file not found, checking environment variables");
            return values;
        }
        Err(e) => {
            warn!(path = %path.display(), "Failed to open config file: {}", e);
            return values;
        }
    };

    for item in iter {
        match item {
            Ok((key, value)) => {
                if REQUIRED_KEYS.contains(&key.as_str()) && !value.is_empty() {
                    values.insert(key, value);
                }
            }
            Err(e) => warn!(path = %path.display(), "Skipping config line: {}", e),
        }
    }

    values
}
