//! Server configuration from environment variables
//!
//! Every setting has a default so the server starts with no environment at all.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::geodesy::ReferencePoint;

pub const DEFAULT_CATALOG_PATH: &str = "NURSARY.xlsx";
pub const DEFAULT_BOUNDARY_PATH: &str = "khariar_boundary.geojson";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_FALLBACK: (f64, f64) = (20.56, 84.14);
pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_SESSIONS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub catalog_path: PathBuf,
    pub boundary_path: PathBuf,
    pub port: u16,
    pub fallback: ReferencePoint,
    pub location_timeout: Duration,
    pub session_idle: Duration,
    pub max_sessions: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from(DEFAULT_CATALOG_PATH),
            boundary_path: PathBuf::from(DEFAULT_BOUNDARY_PATH),
            port: DEFAULT_PORT,
            fallback: ReferencePoint::fallback(DEFAULT_FALLBACK.0, DEFAULT_FALLBACK.1),
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
            session_idle: DEFAULT_SESSION_IDLE,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (tests pass a map instead of the process env)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let fallback_lat = parse_or("FALLBACK_LAT", lookup("FALLBACK_LAT"), DEFAULT_FALLBACK.0);
        let fallback_lon = parse_or("FALLBACK_LON", lookup("FALLBACK_LON"), DEFAULT_FALLBACK.1);
        let fallback = ReferencePoint::fallback(fallback_lat, fallback_lon);
        fallback
            .validate()
            .map_err(|e| anyhow::anyhow!("FALLBACK_LAT/FALLBACK_LON: {}", e))?;

        Ok(Self {
            catalog_path: lookup("CATALOG_PATH").map(PathBuf::from).unwrap_or(defaults.catalog_path),
            boundary_path: lookup("BOUNDARY_PATH").map(PathBuf::from).unwrap_or(defaults.boundary_path),
            port: parse_or("PORT", lookup("PORT"), DEFAULT_PORT),
            fallback,
            location_timeout: Duration::from_secs(parse_or(
                "LOCATION_TIMEOUT_SECS",
                lookup("LOCATION_TIMEOUT_SECS"),
                DEFAULT_LOCATION_TIMEOUT.as_secs(),
            )),
            session_idle: Duration::from_secs(parse_or(
                "SESSION_IDLE_SECS",
                lookup("SESSION_IDLE_SECS"),
                DEFAULT_SESSION_IDLE.as_secs(),
            )),
            max_sessions: defaults.max_sessions,
        })
    }

    pub fn log(&self) {
        tracing::info!("Configuration:");
        tracing::info!("  CATALOG_PATH: {}", self.catalog_path.display());
        tracing::info!("  BOUNDARY_PATH: {}", self.boundary_path.display());
        tracing::info!("  PORT: {}", self.port);
        tracing::info!("  FALLBACK: ({}, {})", self.fallback.latitude, self.fallback.longitude);
        tracing::info!("  LOCATION_TIMEOUT: {:?}", self.location_timeout);
        tracing::info!("  SESSION_IDLE: {:?}", self.session_idle);
    }
}

fn parse_or<T: std::str::FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using default", key, value);
            default
        }),
    }
}
