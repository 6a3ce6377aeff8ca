//! Explicit call profiling.
//!
//! A [`Profiler`] is owned by whoever does the work (the tree builder, the
//! inference cycle) and handed out by reference; there is no global registry.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::error::{ProfileError, ProfileResult};

/// Accumulated timing for one call name.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CallStats {
    pub calls: u64,
    pub total: Duration,
}

#[derive(Debug, Default)]
pub struct Profiler {
    open: BTreeMap<String, Instant>,
    stats: BTreeMap<String, CallStats>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_call(&mut self, name: &str) -> ProfileResult<()> {
        if self.open.contains_key(name) {
            return Err(ProfileError::AlreadyStarted {
                name: name.to_string(),
            });
        }
        self.open.insert(name.to_string(), Instant::now());
        Ok(())
    }

    pub fn end_call(&mut self, name: &str) -> ProfileResult<Duration> {
        let started = self
            .open
            .remove(name)
            .ok_or_else(|| ProfileError::EndWithoutStart {
                name: name.to_string(),
            })?;
        let elapsed = started.elapsed();
        let entry = self.stats.entry(name.to_string()).or_default();
        entry.calls += 1;
        entry.total += elapsed;
        Ok(elapsed)
    }

    /// Run `f` between `start_call` and `end_call`.
    pub fn time<T, E>(&mut self, name: &str, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: From<ProfileError>,
    {
        self.start_call(name)?;
        let result = f();
        self.end_call(name)?;
        result
    }

    pub fn stats(&self, name: &str) -> Option<CallStats> {
        self.stats.get(name).copied()
    }

    pub fn report(&self) -> &BTreeMap<String, CallStats> {
        &self.stats
    }

    /// Forget all open calls and accumulated stats.
    pub fn reset(&mut self) {
        self.open.clear();
        self.stats.clear();
    }
}
