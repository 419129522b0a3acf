use std::env;
use thiserror::Error;

pub const DISPLAY_WIDTH: u32 = 1280;
pub const DISPLAY_HEIGHT: u32 = 800;

const DEFAULT_KEYWORDS: &str = "refund,refund request,refund please";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "missing required environment variables: {}; create a .env file with these values (see .env.example)",
        .0.join(", ")
    )]
    MissingVars(Vec<String>),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Login pair for a browser-operated service. Only embedded into the
/// instruction when both halves are present.
#[derive(Clone, Debug, Default)]
pub struct ServiceLogin {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl ServiceLogin {
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (self.email.as_deref(), self.password.as_deref()) {
            (Some(e), Some(p)) if !e.is_empty() && !p.is_empty() => Some((e, p)),
            _ => None,
        }
    }
}

/// Immutable snapshot of environment-derived settings, built once at startup
/// and passed by reference to the orchestrator and instruction builder.
#[derive(Clone, Debug)]
pub struct Settings {
    pub orgo_api_key: String,      // env ORGO_API_KEY
    pub anthropic_api_key: String, // env ANTHROPIC_API_KEY
    pub computer_id: String,       // env ORGO_COMPUTER_ID, empty = create new
    pub email_login: ServiceLogin,
    pub payment_login: ServiceLogin,
    pub search_keywords: Vec<String>,
    pub display_width: u32,
    pub display_height: u32,
}

impl Settings {
    /// Load settings from the process environment, populating it from a local
    /// `.env` file first when one exists.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an injected lookup. Tests use this to avoid
    /// touching the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let keywords = get("SEARCH_KEYWORDS").unwrap_or_else(|| DEFAULT_KEYWORDS.to_string());
        Self {
            orgo_api_key: get("ORGO_API_KEY").unwrap_or_default(),
            anthropic_api_key: get("ANTHROPIC_API_KEY").unwrap_or_default(),
            computer_id: get("ORGO_COMPUTER_ID").unwrap_or_default(),
            email_login: ServiceLogin {
                email: get("EMAIL_SERVICE_EMAIL"),
                password: get("EMAIL_SERVICE_PASSWORD"),
            },
            payment_login: ServiceLogin {
                email: get("PAYMENT_SERVICE_EMAIL"),
                password: get("PAYMENT_SERVICE_PASSWORD"),
            },
            search_keywords: parse_keywords(&keywords),
            display_width: DISPLAY_WIDTH,
            display_height: DISPLAY_HEIGHT,
        }
    }

    /// Check that both required API keys are present, reporting every missing
    /// variable at once. On success the keys are mirrored back into the
    /// process environment so client configuration picks them up; this must
    /// run before any remote-session call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.orgo_api_key.is_empty() {
            missing.push("ORGO_API_KEY".to_string());
        }
        if self.anthropic_api_key.is_empty() {
            missing.push("ANTHROPIC_API_KEY".to_string());
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing));
        }
        env::set_var("ORGO_API_KEY", &self.orgo_api_key);
        env::set_var("ANTHROPIC_API_KEY", &self.anthropic_api_key);
        Ok(())
    }
}

fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}
