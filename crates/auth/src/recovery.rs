//! Time-boxed password-recovery links.
//!
//! A recovery link is an ordinary in-app URL carrying `type=recovery` and
//! `ts=<epoch-ms>` (its issuance time). Validity lives entirely in the URL;
//! nothing is persisted server-side.

use chrono::{DateTime, Duration, TimeZone, Utc};
use thiserror::Error;
use url::Url;

use crate::location::Location;

pub const RECOVERY_TYPE: &str = "recovery";

/// Default validity window of a recovery link, in minutes.
pub const DEFAULT_RECOVERY_WINDOW_MINUTES: i64 = 15;

/// Tolerated drift for links stamped slightly in the future, in seconds.
pub const MAX_CLOCK_SKEW_SECONDS: i64 = 60;

pub fn default_recovery_window() -> Duration {
    Duration::minutes(DEFAULT_RECOVERY_WINDOW_MINUTES)
}

/// A recovery link that is inside its validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryLink {
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecoveryLinkError {
    #[error("recovery link has no issuance timestamp")]
    MissingTimestamp,

    #[error("recovery link timestamp is not a valid epoch-millisecond value")]
    InvalidTimestamp,

    #[error("recovery link has expired")]
    Expired,

    #[error("recovery link was issued in the future")]
    NotYetValid,
}

impl RecoveryLinkError {
    /// Message shown in place of the reset form.
    pub fn user_message(&self) -> &'static str {
        "This reset link has expired. Please request a new one."
    }
}

/// Whether the location claims to be a recovery link at all.
pub fn is_recovery_request(location: &Location) -> bool {
    location.query_param("type") == Some(RECOVERY_TYPE)
}

/// Deterministically validate a recovery link against `now`.
///
/// Every failure is terminal for the link; callers render the expired
/// message instead of redirecting.
pub fn validate_recovery_link(
    location: &Location,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<RecoveryLink, RecoveryLinkError> {
    let raw = location
        .query_param("ts")
        .ok_or(RecoveryLinkError::MissingTimestamp)?;
    let millis: i64 = raw
        .trim()
        .parse()
        .map_err(|_| RecoveryLinkError::InvalidTimestamp)?;
    let issued_at = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or(RecoveryLinkError::InvalidTimestamp)?;

    if issued_at > now + Duration::seconds(MAX_CLOCK_SKEW_SECONDS) {
        return Err(RecoveryLinkError::NotYetValid);
    }
    if now - issued_at > window {
        return Err(RecoveryLinkError::Expired);
    }
    Ok(RecoveryLink { issued_at })
}

/// Build the redirect URL sent in a password-reset email.
pub fn recovery_redirect_url(
    site: &Url,
    path: &str,
    issued_at: DateTime<Utc>,
) -> Result<Url, url::ParseError> {
    let mut url = site.join(path)?;
    url.query_pairs_mut()
        .clear()
        .append_pair("type", RECOVERY_TYPE)
        .append_pair("ts", &issued_at.timestamp_millis().to_string());
    Ok(url)
}
