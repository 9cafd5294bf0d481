//! Bounded retry with a fixed pause between attempts.
//!
//! The workspace shares its artifacts with desktop GIS clients that hold file
//! handles open long after the user is done. Retrying a handful of times with
//! a short pause is enough to ride out those transient locks.
use anyhow::{anyhow, Result};
use std::thread;
use std::time::Duration;

/// Run `op` up to `attempts` times, sleeping `pause` between failures.
///
/// Each failed attempt is logged at warn level under `label`. On exhaustion
/// the last error is returned so callers can decide whether the failure is
/// fatal or best-effort.
pub fn with_fixed_pause<T, F>(attempts: u32, pause: Duration, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_err = None;
    for attempt in 1..=attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!("attempt {attempt}/{attempts} failed for {label}: {err:#}");
                last_err = Some(err);
                if attempt < attempts {
                    thread::sleep(pause);
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("{label}: zero attempts configured")))
}
