use crate::error::AppError;
use crate::models::MessagePage;
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::time::Duration;

const DEFAULT_API_ROOT: &str = "http://localhost:3000/api";
const DEFAULT_BURN_DELAY_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Clone)]
pub struct Config {
    /// Base URL of the chat REST API, without a trailing slash
    pub api_root: String,
    pub bearer_token: String,
    /// Seconds between a read receipt and the burn of a read-gated message
    pub burn_delay_secs: u64,
    pub page_limit: u32,
    pub request_timeout_secs: u64,
}

// Keep the bearer token out of logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_root", &self.api_root)
            .field("bearer_token", &"<redacted>")
            .field("burn_delay_secs", &self.burn_delay_secs)
            .field("page_limit", &self.page_limit)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_root = lookup("CHAT_API_ROOT")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_ROOT.to_string());

        let bearer_token = lookup("CHAT_BEARER_TOKEN")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Config("CHAT_BEARER_TOKEN missing".into()))?;

        let burn_delay_secs =
            parse_or(&lookup, "CHAT_BURN_DELAY_SECS", DEFAULT_BURN_DELAY_SECS)?;

        let page_limit = parse_or(&lookup, "CHAT_PAGE_LIMIT", MessagePage::DEFAULT_LIMIT)?;
        if !(1..=MessagePage::MAX_LIMIT).contains(&page_limit) {
            return Err(AppError::Config(format!(
                "CHAT_PAGE_LIMIT must be between 1 and {}, got {page_limit}",
                MessagePage::MAX_LIMIT
            )));
        }

        let request_timeout_secs = parse_or(
            &lookup,
            "CHAT_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        if request_timeout_secs == 0 {
            return Err(AppError::Config(
                "CHAT_REQUEST_TIMEOUT_SECS must be positive".into(),
            ));
        }

        Ok(Config {
            api_root,
            bearer_token,
            burn_delay_secs,
            page_limit,
            request_timeout_secs,
        })
    }

    pub fn burn_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.burn_delay_secs as i64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn default_page(&self) -> MessagePage {
        MessagePage {
            limit: self.page_limit,
            offset: 0,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} is not a valid number: {raw}"))),
        _ => Ok(default),
    }
}
