// src/utils.rs
use actix_web::http::header::AUTHORIZATION;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::RateLimiter;
use log::{error, warn};
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::reconcile::ReconcileError;
use crate::storage::registry::RegistryError;

pub type AdminRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

#[derive(Debug)]
pub enum AdminError {
    MissingPeerIP,
    Unauthorized,
    RateLimitExceeded,
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Upstream(String),
    Internal(String),
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPeerIP => write!(f, "Failed to extract client IP"),
            Self::Unauthorized => write!(f, "Missing or invalid admin key"),
            Self::RateLimitExceeded => write!(f, "Rate limit exceeded"),
            Self::BadRequest(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Upstream(msg)
            | Self::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl ResponseError for AdminError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingPeerIP | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

impl From<RegistryError> for AdminError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::IntervalTooShort { min } => Self::BadRequest(format!(
                "Interval must be at least {} seconds to respect API rate limits.",
                min
            )),
            other => {
                error!("Failed to save settings: {}", other);
                Self::Internal("Failed to save settings".to_string())
            }
        }
    }
}

impl From<ReconcileError> for AdminError {
    fn from(e: ReconcileError) -> Self {
        error!("Refresh failed: {}", e);
        Self::Internal(format!("Refresh failed: {}", e))
    }
}

/// Checks the admin key and the caller's per-IP quota.
pub fn authorize(req: &HttpRequest, config: &Config, limiter: &AdminRateLimiter) -> Result<(), AdminError> {
    let peer_ip = req.peer_addr().map(|addr| addr.ip()).ok_or(AdminError::MissingPeerIP)?;

    if limiter.check_key(&peer_ip).is_err() {
        warn!("Rate limit exceeded for admin request from {}", peer_ip);
        return Err(AdminError::RateLimitExceeded);
    }

    if let Some(key) = &config.admin_api_key {
        let presented = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(key.as_str()) {
            warn!("Rejected admin request from {}: bad key", peer_ip);
            return Err(AdminError::Unauthorized);
        }
    }
    Ok(())
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
