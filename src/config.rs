//! Runtime configuration read from the environment.
//!
//! Every value has a default. A malformed value is logged, recorded in
//! [`AppConfig::warnings`] and replaced by its default; nothing here aborts
//! start-up. A missing API key switches the front-end to simulation mode.

use crate::constants::{
    DEFAULT_HISTORY_LIMIT, DEFAULT_INFER_TIMEOUT, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT,
    DEFAULT_TEMPERATURE,
};
use crate::error::{ArchitectError, ConfigError};
use crate::gateway::gemini::GEMINI_API_BASE;
use crate::gateway::openai::OPENAI_API_BASE;
use crate::gateway::{GeminiGateway, InferenceGateway, OpenAiGateway, SimulatedGateway};
use crate::pricing::{RateTable, parse_rate_overrides};
use crate::session::SessionOptions;
use crate::types::ModelId;
use crate::utils::default_data_dir;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_PROVIDER: &str = "ARCHITECT_PROVIDER";
pub const ENV_API_KEY: &str = "ARCHITECT_API_KEY";
pub const ENV_ENDPOINT: &str = "ARCHITECT_ENDPOINT";
pub const ENV_MODEL: &str = "ARCHITECT_MODEL";
pub const ENV_TEMPERATURE: &str = "ARCHITECT_TEMPERATURE";
pub const ENV_TIMEOUT_SECS: &str = "ARCHITECT_TIMEOUT_SECS";
pub const ENV_HISTORY_LIMIT: &str = "ARCHITECT_HISTORY_LIMIT";
pub const ENV_DATA_DIR: &str = "ARCHITECT_DATA_DIR";
pub const ENV_RATES: &str = "ARCHITECT_RATES";
pub const ENV_SYSTEM_PROMPT: &str = "ARCHITECT_SYSTEM_PROMPT";
pub const ENV_USER_NAME: &str = "ARCHITECT_USER_NAME";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAi,
}

impl Provider {
    fn key_var(self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }

    fn default_endpoint(self) -> &'static str {
        match self {
            Provider::Gemini => GEMINI_API_BASE,
            Provider::OpenAi => OPENAI_API_BASE,
        }
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
        })
    }
}

/// Whether inference calls reach a real provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Online,
    Simulation { reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: ModelId,
    pub temperature: f32,
    pub timeout: Duration,
    pub history_limit: usize,
    /// `None` when no home directory can be found; the front-end then keeps
    /// everything in memory
    pub data_dir: Option<PathBuf>,
    pub rates: RateTable,
    pub system_prompt: String,
    pub user_name: Option<String>,
    /// Values that were present but unusable
    pub warnings: Vec<ConfigError>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key/value source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut warnings = Vec::new();

        let provider = match get(ENV_PROVIDER).map(|v| v.parse::<Provider>()) {
            Some(Ok(provider)) => provider,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "falling back to gemini");
                warnings.push(e);
                Provider::Gemini
            }
            None => Provider::Gemini,
        };

        let api_key = get(ENV_API_KEY).or_else(|| get(provider.key_var()));
        let endpoint = get(ENV_ENDPOINT)
            .unwrap_or_else(|| provider.default_endpoint().to_string())
            .trim_end_matches('/')
            .to_string();
        let model = ModelId::from(get(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string()));

        let temperature = parse_or(
            get(ENV_TEMPERATURE),
            ENV_TEMPERATURE,
            DEFAULT_TEMPERATURE,
            |t: &f32| (0.0..=2.0).contains(t),
            &mut warnings,
        );
        let timeout = Duration::from_secs(parse_or(
            get(ENV_TIMEOUT_SECS),
            ENV_TIMEOUT_SECS,
            DEFAULT_INFER_TIMEOUT.as_secs(),
            |secs: &u64| *secs > 0,
            &mut warnings,
        ));
        let history_limit = parse_or(
            get(ENV_HISTORY_LIMIT),
            ENV_HISTORY_LIMIT,
            DEFAULT_HISTORY_LIMIT,
            |limit: &usize| *limit > 0,
            &mut warnings,
        );

        let data_dir = get(ENV_DATA_DIR).map(PathBuf::from).or_else(default_data_dir);

        let mut rates = RateTable::builtin();
        if let Some(spec) = get(ENV_RATES) {
            let applied = parse_rate_overrides(&spec)
                .and_then(|overrides| overrides.into_iter().try_for_each(|r| rates.insert(r)));
            if let Err(e) = applied {
                tracing::warn!(error = %e, "ignoring rate overrides");
                warnings.push(e);
            }
        }

        Self {
            provider,
            api_key,
            endpoint,
            model,
            temperature,
            timeout,
            history_limit,
            data_dir,
            rates,
            system_prompt: get(ENV_SYSTEM_PROMPT)
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            user_name: get(ENV_USER_NAME),
            warnings,
        }
    }

    pub fn mode(&self) -> Mode {
        match self.api_key {
            Some(_) => Mode::Online,
            None => Mode::Simulation {
                reason: ConfigError::MissingApiKey {
                    var: ENV_API_KEY.to_string(),
                }
                .to_string(),
            },
        }
    }

    /// Notice shown for as long as the front-end runs in simulation mode
    pub fn banner(&self) -> Option<String> {
        match self.mode() {
            Mode::Online => None,
            Mode::Simulation { reason } => Some(format!(
                "SIMULATION MODE: {reason}. Replies are canned and no provider is called. \
                 Set {ENV_API_KEY} (or {}) to go online.",
                self.provider.key_var()
            )),
        }
    }

    /// System prompt, personalised with the user's name when one is set
    pub fn effective_system_prompt(&self) -> String {
        match &self.user_name {
            Some(name) => format!("{} User: {name}.", self.system_prompt),
            None => self.system_prompt.clone(),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            model: self.model.clone(),
            system_prompt: self.effective_system_prompt(),
            history_limit: self.history_limit,
            timeout: self.timeout,
        }
    }

    /// Gateway for the configured provider, or the simulated one without a key
    pub fn gateway(&self) -> Result<Arc<dyn InferenceGateway>, ArchitectError> {
        let Some(key) = &self.api_key else {
            return Ok(Arc::new(SimulatedGateway::new()));
        };
        let gateway: Arc<dyn InferenceGateway> = match self.provider {
            Provider::Gemini => Arc::new(GeminiGateway::new(
                &self.endpoint,
                key,
                self.temperature,
                self.timeout,
            )?),
            Provider::OpenAi => Arc::new(OpenAiGateway::new(
                &self.endpoint,
                key,
                self.temperature,
                self.timeout,
            )?),
        };
        Ok(gateway)
    }
}

fn parse_or<T, P>(
    raw: Option<String>,
    var: &str,
    default: T,
    valid: P,
    warnings: &mut Vec<ConfigError>,
) -> T
where
    T: FromStr,
    P: Fn(&T) -> bool,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            tracing::warn!(var, value = %raw, "invalid configuration value, using default");
            warnings.push(ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            });
            default
        }
    }
}
