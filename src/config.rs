use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub cors_origins: Vec<String>,
    pub dispatch: DispatchSettings,
}

/// Tunables of the dispatch core.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub match_queue_size: usize,
    pub match_radius_km: f64,
    pub match_candidate_limit: usize,
    pub trip_page_limit: usize,
    pub surge_window: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            match_queue_size: 1024,
            match_radius_km: 10.0,
            match_candidate_limit: 10,
            trip_page_limit: 50,
            surge_window: Duration::from_secs(300),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = DispatchSettings::default();

        Ok(Self {
            http_port: parse_or_default("PORT", 8000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            cors_origins: cors_origins(
                env::var("CORS_ORIGINS").ok(),
                env::var("FRONTEND_ORIGIN").ok(),
            ),
            dispatch: DispatchSettings {
                match_queue_size: parse_or_default("MATCH_QUEUE_SIZE", defaults.match_queue_size)?,
                match_radius_km: parse_or_default("MATCH_RADIUS_KM", defaults.match_radius_km)?,
                match_candidate_limit: parse_or_default(
                    "MATCH_CANDIDATE_LIMIT",
                    defaults.match_candidate_limit,
                )?,
                trip_page_limit: parse_or_default("TRIP_PAGE_LIMIT", defaults.trip_page_limit)?,
                surge_window: Duration::from_secs(parse_or_default(
                    "SURGE_WINDOW_SECS",
                    defaults.surge_window.as_secs(),
                )?),
            },
        })
    }
}

/// An empty result means any origin is allowed.
fn cors_origins(cors_origins: Option<String>, frontend_origin: Option<String>) -> Vec<String> {
    if let Some(raw) = cors_origins {
        return raw
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty() && *origin != "*")
            .map(str::to_string)
            .collect();
    }

    match frontend_origin {
        Some(origin) if !origin.trim().is_empty() && origin.trim() != "*" => {
            vec![origin.trim().to_string()]
        }
        _ => Vec::new(),
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
