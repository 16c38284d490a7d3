//! Retry pacing shared by the poller and the worker loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PollConfig;

/// How the delay between attempts evolves after each miss.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay every time.
    #[default]
    Fixed,
    /// Multiply the delay by `factor` after each attempt, capped at `max_interval`.
    Exponential { factor: f64, max_interval: Duration },
}

impl Backoff {
    pub fn exponential(factor: f64, max_interval: Duration) -> Self {
        Backoff::Exponential {
            factor,
            max_interval,
        }
    }

    /// Pick the strategy configured for result polling.
    pub fn from_poll_config(cfg: &PollConfig) -> Self {
        if cfg.backoff_factor > 1.0 {
            Backoff::exponential(cfg.backoff_factor, cfg.max_interval())
        } else {
            Backoff::Fixed
        }
    }

    /// Delay to use after `current`.
    pub fn next(&self, current: Duration) -> Duration {
        match *self {
            Backoff::Fixed => current,
            Backoff::Exponential {
                factor,
                max_interval,
            } => {
                if !factor.is_finite() || factor <= 1.0 {
                    return current.min(max_interval);
                }
                Duration::try_from_secs_f64(current.as_secs_f64() * factor)
                    .unwrap_or(max_interval)
                    .min(max_interval)
            }
        }
    }
}
