//! Reputation domain model.
//!
//! An aggregate is one agent's trust record within one collection (pool of
//! agents scored against each other). It accumulates quality observations
//! from review outcomes and is never deleted, only superseded by snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lifecycle state of a reputation aggregate, advanced by evidence volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateState {
    /// No observations yet
    Cold,
    /// At least one observation
    Warming,
    /// Enough evidence to trust the personal score
    Established,
    /// Long-lived, heavily-evidenced record
    Authoritative,
}

impl Default for AggregateState {
    fn default() -> Self {
        Self::Cold
    }
}

impl AggregateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warming => "warming",
            Self::Established => "established",
            Self::Authoritative => "authoritative",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cold" => Some(Self::Cold),
            "warming" => Some(Self::Warming),
            "established" => Some(Self::Established),
            "authoritative" => Some(Self::Authoritative),
            _ => None,
        }
    }

    /// State implied by a given number of observations.
    pub fn for_sample_count(sample_count: u64, established_at: u64, authoritative_at: u64) -> Self {
        if sample_count == 0 {
            Self::Cold
        } else if sample_count < established_at {
            Self::Warming
        } else if sample_count < authoritative_at {
            Self::Established
        } else {
            Self::Authoritative
        }
    }
}

/// Per-(model, task type) reputation bucket, independent from the
/// aggregate's overall score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTypeCohort {
    pub model: String,
    pub task_type: String,
    /// None until the cohort sees its first observation
    pub personal_score: Option<f64>,
    pub sample_count: u64,
}

impl TaskTypeCohort {
    pub fn new(model: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            task_type: task_type.into(),
            personal_score: None,
            sample_count: 0,
        }
    }

    /// Whether this cohort has seen any observations.
    pub fn is_cold(&self) -> bool {
        self.sample_count == 0 || self.personal_score.is_none()
    }
}

/// One score along a named quality dimension, with its own sample count so
/// dimensions with intermittent coverage dampen independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: f64,
    pub sample_count: u64,
}

/// A discrete quality observation from a review outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityObservation {
    /// Overall quality score in [0, 1]
    pub score: f64,
    /// Per-dimension scores (correctness, style, ...); may be sparse
    #[serde(default)]
    pub dimensions: BTreeMap<String, f64>,
    /// Model that produced the reviewed work
    pub model: Option<String>,
    /// Task type of the reviewed work
    pub task_type: Option<String>,
    /// Reviewer identity for contributor tracking
    pub source: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl QualityObservation {
    pub fn new(score: f64) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            dimensions: BTreeMap::new(),
            model: None,
            task_type: None,
            source: None,
            observed_at: Utc::now(),
        }
    }

    pub fn with_dimension(mut self, name: impl Into<String>, score: f64) -> Self {
        self.dimensions.insert(name.into(), score.clamp(0.0, 1.0));
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// One agent's trust record within one collection.
///
/// `blended_score` is recomputed on every score-affecting event; it must
/// never lag `personal_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationAggregate {
    /// Collection (scoring pool) this aggregate lives in
    pub collection: String,
    /// Agent being scored
    pub agent_id: String,
    /// Lifecycle state
    pub state: AggregateState,
    /// Dampened personal score; None until the first observation
    pub personal_score: Option<f64>,
    /// Human-legible score with a direct cold start
    pub display_score: Option<f64>,
    /// Population prior at the time of the last update
    pub collection_score: f64,
    /// Bayesian blend of personal evidence against the population prior
    pub blended_score: f64,
    /// Number of observations folded in
    pub sample_count: u64,
    /// Prior strength used in Bayesian blending
    pub pseudo_count: u64,
    /// Distinct reviewers that contributed observations
    pub contributors: BTreeSet<String>,
    /// Per-dimension decomposition; dimensions persist across sparse coverage
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, DimensionScore>,
    /// Per-(model, task type) buckets, if cohort tracking is on
    #[serde(default)]
    pub task_cohorts: Vec<TaskTypeCohort>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReputationAggregate {
    /// Create a cold aggregate, as done on the first quality event.
    pub fn new(
        collection: impl Into<String>,
        agent_id: impl Into<String>,
        pseudo_count: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            collection: collection.into(),
            agent_id: agent_id.into(),
            state: AggregateState::Cold,
            personal_score: None,
            display_score: None,
            collection_score: 0.5,
            blended_score: 0.5,
            sample_count: 0,
            pseudo_count,
            contributors: BTreeSet::new(),
            dimension_scores: BTreeMap::new(),
            task_cohorts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn contributor_count(&self) -> u64 {
        self.contributors.len() as u64
    }

    /// Find a cohort for a (model, task type) pairing.
    pub fn cohort(&self, model: &str, task_type: &str) -> Option<&TaskTypeCohort> {
        self.task_cohorts
            .iter()
            .find(|c| c.model == model && c.task_type == task_type)
    }

    /// Get or create the cohort for a (model, task type) pairing.
    pub fn cohort_mut(&mut self, model: &str, task_type: &str) -> &mut TaskTypeCohort {
        let pos = self
            .task_cohorts
            .iter()
            .position(|c| c.model == model && c.task_type == task_type);
        let idx = match pos {
            Some(idx) => idx,
            None => {
                self.task_cohorts.push(TaskTypeCohort::new(model, task_type));
                self.task_cohorts.len() - 1
            }
        };
        &mut self.task_cohorts[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_aggregate_is_cold_and_neutral() {
        let agg = ReputationAggregate::new("reviews", "agent-1", 10);
        assert_eq!(agg.state, AggregateState::Cold);
        assert_eq!(agg.personal_score, None);
        assert!((agg.blended_score - 0.5).abs() < f64::EPSILON);
        assert_eq!(agg.sample_count, 0);
        assert_eq!(agg.contributor_count(), 0);
    }

    #[test]
    fn test_state_for_sample_count() {
        assert_eq!(
            AggregateState::for_sample_count(0, 10, 50),
            AggregateState::Cold
        );
        assert_eq!(
            AggregateState::for_sample_count(1, 10, 50),
            AggregateState::Warming
        );
        assert_eq!(
            AggregateState::for_sample_count(10, 10, 50),
            AggregateState::Established
        );
        assert_eq!(
            AggregateState::for_sample_count(49, 10, 50),
            AggregateState::Established
        );
        assert_eq!(
            AggregateState::for_sample_count(50, 10, 50),
            AggregateState::Authoritative
        );
    }

    #[test]
    fn test_cohort_get_or_create() {
        let mut agg = ReputationAggregate::new("reviews", "agent-1", 10);
        assert!(agg.cohort("gpt-x", "refactor").is_none());

        let cohort = agg.cohort_mut("gpt-x", "refactor");
        assert!(cohort.is_cold());
        cohort.personal_score = Some(0.8);
        cohort.sample_count = 3;

        let again = agg.cohort("gpt-x", "refactor").unwrap();
        assert_eq!(again.sample_count, 3);
        assert_eq!(agg.task_cohorts.len(), 1);
    }

    #[test]
    fn test_observation_clamps_scores() {
        let obs = QualityObservation::new(1.5).with_dimension("style", -0.2);
        assert!((obs.score - 1.0).abs() < f64::EPSILON);
        assert!((obs.dimensions["style"]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_state_round_trip() {
        for state in [
            AggregateState::Cold,
            AggregateState::Warming,
            AggregateState::Established,
            AggregateState::Authoritative,
        ] {
            assert_eq!(AggregateState::from_str(state.as_str()), Some(state));
        }
    }
}
