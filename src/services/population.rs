//! Population aggregator: streaming mean/variance of all agents' personal
//! scores via Welford's online algorithm.
//!
//! One instance per collection, seeded at startup from existing aggregates
//! and updated synchronously on every scoring event. Supplies the Bayesian
//! prior used everywhere else. Explicitly scoped, constructor-injected
//! state: callers that need sharing wrap it themselves (the reputation
//! service holds it behind a `Mutex`), never a process global.

use serde::{Deserialize, Serialize};

use super::scoring::NEUTRAL_PRIOR;

/// Durable form of the aggregator state, for startup seeding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub count: u64,
    pub mean: f64,
    pub m2: f64,
}

/// Streaming mean/variance over an unbounded score population.
///
/// Each `update` is one O(1) Welford step; no raw samples are buffered and
/// the recurrence stays numerically stable for arbitrarily large
/// populations.
#[derive(Debug, Clone, Default)]
pub struct PopulationAggregator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl PopulationAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one personal score into the population.
    pub fn update(&mut self, score: f64) {
        self.count += 1;
        let delta = score - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = score - self.mean;
        self.m2 += delta * delta2;
    }

    /// Population mean, or the neutral 0.5 prior when empty.
    ///
    /// The empty-population default is an epistemic-neutrality choice, not
    /// an observed value.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            NEUTRAL_PRIOR
        } else {
            self.mean
        }
    }

    /// Sample variance (Bessel-corrected); 0.0 with fewer than two samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Snapshot the running state for durable storage.
    pub fn snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot {
            count: self.count,
            mean: self.mean,
            m2: self.m2,
        }
    }

    /// Restore from a durable snapshot.
    pub fn restore(snapshot: &PopulationSnapshot) -> Self {
        Self {
            count: snapshot.count,
            mean: snapshot.mean,
            m2: snapshot.m2,
        }
    }

    /// Seed from existing personal scores (startup path).
    pub fn seed_from<I: IntoIterator<Item = f64>>(scores: I) -> Self {
        let mut aggregator = Self::new();
        for score in scores {
            aggregator.update(score);
        }
        aggregator
    }
}
