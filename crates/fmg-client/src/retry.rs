//! Retry and timeout policy
//!
//! Decides, per failed attempt, whether a request may be sent again. The
//! rule that matters: a non-idempotent request that may already have reached
//! the appliance is never replayed. It surfaces as
//! [`FmgError::EffectUnknown`] so the caller can check remote state.

use std::time::Duration;

use crate::config::{BackoffKind, ClientSettings};
use crate::error::FmgError;
use crate::protocol::{Method, ResponseEnvelope, StatusKind};

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Try again; `reauth` asks for a fresh session first
    Retry { reauth: bool },
    /// Return the error as-is
    Surface,
    /// Return the error flagged as possibly applied
    SurfaceEffectUnknown,
}

/// Bounded retry with per-attempt timeout
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: BackoffKind,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            backoff: BackoffKind::Exponential,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            max_attempts: settings.retry.max_attempts.max(1),
            attempt_timeout: settings.request_timeout(),
            backoff: settings.retry.backoff,
            base_delay: Duration::from_millis(settings.retry.base_delay_ms),
            max_delay: Duration::from_millis(settings.retry.max_delay_ms),
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            BackoffKind::Fixed => self.base_delay,
            BackoffKind::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    /// Classify a failed attempt of `method`.
    pub fn classify(&self, method: Method, err: &FmgError) -> Decision {
        match err {
            FmgError::Connectivity {
                request_sent: false,
                ..
            } => Decision::Retry { reauth: false },
            FmgError::Connectivity {
                request_sent: true,
                ..
            }
            | FmgError::Transport { .. }
            | FmgError::Remote {
                kind: StatusKind::InternalServerError,
                ..
            } => {
                if method.is_idempotent() {
                    Decision::Retry { reauth: false }
                } else {
                    Decision::SurfaceEffectUnknown
                }
            }
            // The appliance refused the request before acting on it.
            FmgError::Remote {
                kind: StatusKind::SessionExpired,
                ..
            } => Decision::Retry { reauth: true },
            _ => Decision::Surface,
        }
    }
}

/// Turn envelope-wide transient statuses into an error the policy can act on.
///
/// A session-expired or internal-error sub-result means the whole envelope
/// has to be replayed (or surfaced); other statuses are per-target outcomes
/// and stay in the envelope.
pub(crate) fn escalate(envelope: ResponseEnvelope) -> Result<ResponseEnvelope, FmgError> {
    let transient = envelope.find_kind(&[StatusKind::SessionExpired, StatusKind::InternalServerError]);
    match transient {
        Some(result) => Err(result.to_error()),
        None => Ok(envelope),
    }
}
