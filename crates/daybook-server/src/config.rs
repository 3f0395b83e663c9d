use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use daybook_core::analysis::ChatConfig;
use daybook_core::question::SheetConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub sheet: SheetConfig,
    pub llm: ChatConfig,
    pub generation_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = var("DAYBOOK_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("DAYBOOK_JWT_SECRET is unset or still a placeholder; it must match the identity provider's secret");
        }

        let host = or("DAYBOOK_HOST", "0.0.0.0");
        let port: u16 = parse(&var, "DAYBOOK_PORT", 3000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", host, port))?;

        let source_timeout = Duration::from_secs(parse(&var, "DAYBOOK_SOURCE_TIMEOUT_SECS", 10)?);
        let generation_timeout =
            Duration::from_secs(parse(&var, "DAYBOOK_GENERATION_TIMEOUT_SECS", 90)?);
        if generation_timeout.is_zero() {
            bail!("DAYBOOK_GENERATION_TIMEOUT_SECS must be at least 1");
        }

        Ok(Self {
            addr,
            db_path: or("DAYBOOK_DB_PATH", "daybook.db").into(),
            jwt_secret,
            sheet: SheetConfig {
                base_url: or("DAYBOOK_SHEET_BASE_URL", "https://sheets.googleapis.com/v4"),
                sheet_id: or("DAYBOOK_SHEET_ID", ""),
                range: or("DAYBOOK_SHEET_RANGE", "Questions!A2:B"),
                api_key: var("DAYBOOK_SHEET_API_KEY"),
                timeout: source_timeout,
            },
            llm: ChatConfig {
                base_url: or("DAYBOOK_LLM_BASE_URL", "https://api.openai.com/v1"),
                model: or("DAYBOOK_LLM_MODEL", "gpt-4o-mini"),
                api_key: var("DAYBOOK_LLM_API_KEY"),
                // Transport bound sits just past the pipeline's own timeout.
                timeout: generation_timeout + Duration::from_secs(5),
            },
            generation_timeout,
        })
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value {:?}", key, raw)),
        None => Ok(default),
    }
}
