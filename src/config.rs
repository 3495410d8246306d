//! Backend configuration and its on-disk store.
//!
//! The configuration is a flat YAML document:
//!
//! ```yaml
//! API_Url: https://api.example.com/v1
//! API_Key: sk-...
//! Model: gpt-4o-mini
//! System_Prompt: You are a helpful assistant.
//! Temperature: 0.7
//! Available_Models: [gpt-4o-mini, o3-mini]
//! ```
//!
//! [`ConfigStore`] reads and writes the document as a whole and keeps the
//! active [`Config`] for the session. A configuration is never edited in
//! place: a candidate is validated and then swapped in atomically.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::observability::{CONFIG_REJECTIONS, CONFIG_SAVES};

/// Default location of the persisted configuration.
pub const DEFAULT_CONFIG_PATH: &str = "api_configuration.yaml";

/// Lowest accepted sampling temperature.
pub const MIN_TEMPERATURE: f64 = 0.0;

/// Highest accepted sampling temperature.
pub const MAX_TEMPERATURE: f64 = 2.0;

/// Temperature used when no configuration exists yet.
const DEFAULT_TEMPERATURE: f64 = 0.5;

/// Models suggested when the document does not carry its own list.
pub const KNOWN_MODELS: &[&str] = &[
    "gpt-4o-mini",
    "o3-mini",
    "deepseek/deepseek-chat",
    "deepseek/deepseek-r1",
    "deepseek-reasoner",
    "deepseek-chat",
];

fn default_models() -> Vec<String> {
    KNOWN_MODELS.iter().map(|m| m.to_string()).collect()
}

/// Settings for the chat-completion backend.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the backend, e.g. `https://api.openai.com/v1`.
    #[serde(rename = "API_Url")]
    pub api_url: String,

    /// Bearer credential sent with every request.
    #[serde(rename = "API_Key")]
    pub api_key: String,

    /// Model identifier passed through to the backend.
    #[serde(rename = "Model", default)]
    pub model: String,

    /// System prompt sent ahead of every user message.
    #[serde(rename = "System_Prompt", default)]
    pub system_prompt: String,

    /// Sampling temperature in `[0.0, 2.0]`.
    #[serde(rename = "Temperature")]
    pub temperature: f64,

    /// Models the user is expected to pick from.
    #[serde(rename = "Available_Models", default = "default_models")]
    pub available_models: Vec<String>,
}

impl Config {
    /// Creates a configuration with the given endpoint and credential and
    /// defaults for everything else.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the list of suggested models.
    pub fn with_available_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }

    /// Returns true if both the endpoint and the credential are present.
    pub fn has_credentials(&self) -> bool {
        !self.api_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            model: KNOWN_MODELS[0].to_string(),
            system_prompt: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            available_models: default_models(),
        }
    }
}

// The credential never reaches logs or debug output.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("temperature", &self.temperature)
            .field("available_models", &self.available_models)
            .finish()
    }
}

/// A non-blocking finding from [`ConfigStore::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigWarning {
    /// No model was given; the backend default (if any) applies.
    EmptyModel,
    /// The model is not in the configuration's list of suggested models.
    UnknownModel {
        /// The model that was not recognized.
        model: String,
    },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::EmptyModel => write!(f, "no model selected"),
            ConfigWarning::UnknownModel { model } => write!(
                f,
                "model '{model}' is not in the list of suggested models; \
                 make sure it is valid for your API endpoint"
            ),
        }
    }
}

/// Outcome of a successful validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validation {
    /// Findings that do not prevent the configuration from being saved.
    pub warnings: Vec<ConfigWarning>,
}

impl Validation {
    /// Returns true if there were no warnings.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Loads, validates, and persists the backend configuration.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    active: Option<Arc<Config>>,
}

impl ConfigStore {
    /// Creates a store backed by the file at `path`.  Nothing is read until
    /// [`ConfigStore::load`] is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            active: None,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configuration currently in effect, if any.
    pub fn current(&self) -> Option<&Arc<Config>> {
        self.active.as_ref()
    }

    /// Reads the persisted configuration and makes it active.
    ///
    /// Returns `Ok(None)` when the file does not exist.  A document that
    /// cannot be parsed is reported as [`ConfigError::Malformed`] rather than
    /// replaced with defaults.
    pub fn load(&mut self) -> Result<Option<Arc<Config>>, ConfigError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no configuration file");
                return Ok(None);
            }
            Err(err) => {
                return Err(ConfigError::io(
                    format!("failed to read {}", self.path.display()),
                    err,
                ));
            }
        };
        let config: Config =
            serde_yaml::from_str(&content).map_err(|err| ConfigError::malformed(err.to_string()))?;
        if let Err(err) = Self::validate(&config) {
            tracing::warn!(path = %self.path.display(), error = %err, "loaded configuration does not validate");
        }
        tracing::info!(path = %self.path.display(), model = %config.model, "configuration loaded");
        let config = Arc::new(config);
        self.active = Some(Arc::clone(&config));
        Ok(Some(config))
    }

    /// Checks a candidate configuration.
    ///
    /// Checks run in order and the first blocking failure is returned:
    /// empty URL, URL without scheme or host, empty key, temperature out of
    /// range.  Model problems are reported as warnings only.
    pub fn validate(candidate: &Config) -> Result<Validation, ConfigError> {
        let api_url = candidate.api_url.trim();
        if api_url.is_empty() {
            return Err(ConfigError::empty("API_Url"));
        }
        let parsed = Url::parse(api_url)
            .map_err(|err| ConfigError::invalid_url(api_url, err.to_string()))?;
        if parsed.scheme().is_empty() || !parsed.has_host() {
            return Err(ConfigError::invalid_url(
                api_url,
                "a scheme and host are required",
            ));
        }
        if candidate.api_key.trim().is_empty() {
            return Err(ConfigError::empty("API_Key"));
        }
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&candidate.temperature) {
            return Err(ConfigError::invalid_temperature(candidate.temperature));
        }

        let mut validation = Validation::default();
        let model = candidate.model.trim();
        if model.is_empty() {
            validation.warnings.push(ConfigWarning::EmptyModel);
        } else if !candidate.available_models.iter().any(|m| m == model) {
            validation.warnings.push(ConfigWarning::UnknownModel {
                model: model.to_string(),
            });
        }
        Ok(validation)
    }

    /// Validates `candidate`, writes it to disk, and makes it active.
    ///
    /// The file is replaced with a rename, so a failure never leaves a
    /// partially written document behind.  On any error the previously
    /// active configuration stays in effect.
    pub fn save(&mut self, candidate: Config) -> Result<Validation, ConfigError> {
        let validation = match Self::validate(&candidate) {
            Ok(validation) => validation,
            Err(err) => {
                CONFIG_REJECTIONS.click();
                tracing::warn!(error = %err, "configuration rejected");
                return Err(err);
            }
        };
        for warning in &validation.warnings {
            tracing::warn!(%warning, "configuration accepted with warning");
        }
        let document = serde_yaml::to_string(&candidate)
            .map_err(|err| ConfigError::malformed(err.to_string()))?;
        write_atomically(&self.path, document.as_bytes()).map_err(|err| {
            ConfigError::io(format!("failed to write {}", self.path.display()), err)
        })?;
        CONFIG_SAVES.click();
        tracing::info!(path = %self.path.display(), model = %candidate.model, "configuration saved");
        self.active = Some(Arc::new(candidate));
        Ok(validation)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}

/// Write `contents` to a sibling temporary file and rename it over `path`.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "palaver".to_string());
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp-{}", std::process::id()));
    let result = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
