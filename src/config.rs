use dotenvy::dotenv;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Outbound buffer per websocket session. A session that cannot
    /// drain this many events is disconnected rather than allowed to
    /// backpressure the router.
    pub session_buffer: usize,
    pub default_page_size: i64,
    pub max_page_size: i64,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let session_buffer = env::var("WS_SESSION_BUFFER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(64);
        let default_page_size = env::var("HISTORY_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50);
        let max_page_size = env::var("HISTORY_MAX_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);
        let max_body_bytes = env::var("MESSAGE_MAX_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(16 * 1024);

        if session_buffer == 0 {
            return Err(AppError::Config("WS_SESSION_BUFFER must be > 0".into()));
        }
        if default_page_size <= 0 || max_page_size <= 0 || default_page_size > max_page_size {
            return Err(AppError::Config("invalid history page size bounds".into()));
        }

        Ok(Self {
            database_url,
            port,
            jwt_secret,
            session_buffer,
            default_page_size,
            max_page_size,
            max_body_bytes,
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/sage_messaging_test".into(),
            port: 3000,
            jwt_secret: "test-secret".into(),
            session_buffer: 64,
            default_page_size: 50,
            max_page_size: 200,
            max_body_bytes: 16 * 1024,
        }
    }
}
