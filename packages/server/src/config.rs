use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Public endpoint of the deces search API.
const DEFAULT_DECES_API_URL: &str = "https://deces.matchid.io/deces/api/v1";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub deces_api_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            deces_api_url: env::var("DECES_API_URL")
                .unwrap_or_else(|_| DEFAULT_DECES_API_URL.to_string()),
        })
    }
}
