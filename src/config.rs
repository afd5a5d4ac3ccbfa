use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub assignment_api_url: Url,
    pub request_timeout_secs: u64,
    pub redirect_delay_secs: u64,
    pub session_idle_secs: u64,
    pub public_rps: u32,
    pub max_concurrent_requests: usize,
    pub log_json: bool,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let raw_url = get_env("ASSIGNMENT_API_URL")?;
        let assignment_api_url = Url::parse(&raw_url).map_err(|e| {
            Error::Config(format!("Invalid value for ASSIGNMENT_API_URL: {}", e))
        })?;

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            assignment_api_url,
            request_timeout_secs: get_env_parse_or("REQUEST_TIMEOUT_SECS", 15)?,
            redirect_delay_secs: get_env_parse_or("REDIRECT_DELAY_SECS", 3)?,
            session_idle_secs: get_env_parse_or("SESSION_IDLE_SECS", 1800)?,
            public_rps: get_env_parse_or("PUBLIC_RPS", 50)?,
            max_concurrent_requests: get_env_parse_or("MAX_CONCURRENT_REQUESTS", 256)?,
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_secs(self.redirect_delay_secs)
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        _ => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}
