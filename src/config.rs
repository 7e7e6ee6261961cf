//! Scheduler rate-limit configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SchedulerError;

/// Rate limits enforced by the scheduler.
///
/// All three constraints apply simultaneously; a dispatch happens only
/// when none of them is violated. The defaults are tuned for a chat
/// platform that allows roughly 30 messages per second overall and 20
/// per minute to a single recipient, with headroom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Max dispatches per second across all queue keys
    #[serde(default = "default_global_per_sec")]
    pub global_per_sec: u32,

    /// Max dispatches per minute for a single queue key
    #[serde(default = "default_per_key_per_min")]
    pub per_key_per_min: u32,

    /// Minimum milliseconds between consecutive dispatches on one key
    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: u64,
}

fn default_global_per_sec() -> u32 {
    28
}

fn default_per_key_per_min() -> u32 {
    18
}

fn default_min_spacing_ms() -> u64 {
    1500
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            global_per_sec: 28,
            per_key_per_min: 18,
            min_spacing_ms: 1500,
        }
    }
}

impl Limits {
    /// Validate limits before use.
    ///
    /// A zero limit would deadlock every queue (no dispatch can ever
    /// satisfy the checks), so construction fails fast instead.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.global_per_sec == 0 {
            return Err(SchedulerError::InvalidLimit {
                field: "global_per_sec",
                value: 0,
            });
        }
        if self.per_key_per_min == 0 {
            return Err(SchedulerError::InvalidLimit {
                field: "per_key_per_min",
                value: 0,
            });
        }
        if self.min_spacing_ms == 0 {
            return Err(SchedulerError::InvalidLimit {
                field: "min_spacing_ms",
                value: 0,
            });
        }
        Ok(())
    }

    /// Get the minimum per-key spacing as a Duration
    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }
}
