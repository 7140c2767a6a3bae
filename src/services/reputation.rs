//! Reputation event-processing service.
//!
//! Wires the pure scoring engine, the population aggregator, and the
//! reputation store into the event path: a quality observation arrives, the
//! new personal/blended scores are computed against the current population
//! prior, the aggregate is persisted, and the event is appended. One
//! service instance per collection; the population aggregator inside it is
//! the process-wide instance for that collection, seeded at startup.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AggregateState, QualityObservation, ReputationAggregate, ScoringConfig,
};
use crate::domain::ports::ReputationStore;
use crate::services::population::{PopulationAggregator, PopulationSnapshot};
use crate::services::scoring::{
    compute_blended_score, compute_dampened_score, compute_dimensional_blended,
    compute_dual_track_score, compute_task_aware_cross_model_score,
};

/// Per-collection reputation pipeline.
pub struct ReputationService {
    collection: String,
    store: Arc<dyn ReputationStore>,
    population: Mutex<PopulationAggregator>,
    config: ScoringConfig,
}

impl ReputationService {
    pub fn new(
        collection: impl Into<String>,
        store: Arc<dyn ReputationStore>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            collection: collection.into(),
            store,
            population: Mutex::new(PopulationAggregator::new()),
            config,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Seed the population aggregator from durable aggregates (startup).
    pub async fn seed_population(&self) -> DomainResult<u64> {
        let aggregates = self.store.list_all(&self.collection).await?;
        let seeded = PopulationAggregator::seed_from(
            aggregates.iter().filter_map(|a| a.personal_score),
        );
        let count = seeded.count();
        *self.lock_population() = seeded;
        info!(collection = %self.collection, agents = count, "population aggregator seeded");
        Ok(count)
    }

    /// Restore the population aggregator from a durable snapshot.
    pub fn restore_population(&self, snapshot: &PopulationSnapshot) {
        *self.lock_population() = PopulationAggregator::restore(snapshot);
    }

    /// Snapshot the population aggregator for durable storage.
    pub fn population_snapshot(&self) -> PopulationSnapshot {
        self.lock_population().snapshot()
    }

    /// Current population prior (0.5 when the population is empty).
    pub fn population_mean(&self) -> f64 {
        self.lock_population().mean()
    }

    /// Fold one quality observation into an agent's aggregate.
    ///
    /// Creates the aggregate on the first event. The blended score is
    /// recomputed in the same step as the personal score so it never lags;
    /// the event append is atomic with the aggregate's event counter, and a
    /// compaction snapshot is taken when the counter crosses the threshold.
    pub async fn record_observation(
        &self,
        agent_id: &str,
        observation: &QualityObservation,
    ) -> DomainResult<ReputationAggregate> {
        let mut aggregate = match self.store.get(&self.collection, agent_id).await? {
            Some(aggregate) => aggregate,
            None => ReputationAggregate::new(
                self.collection.clone(),
                agent_id,
                self.config.pseudo_count,
            ),
        };

        let prior_mean = self.population_mean();
        let dual = compute_dual_track_score(
            aggregate.personal_score,
            aggregate.display_score,
            observation.score,
            aggregate.sample_count,
            &self.config,
        );

        aggregate.personal_score = Some(dual.governance);
        aggregate.display_score = Some(dual.display);
        aggregate.sample_count = dual.observations;
        aggregate.collection_score = prior_mean;
        aggregate.blended_score = compute_blended_score(
            dual.governance,
            prior_mean,
            aggregate.sample_count,
            aggregate.pseudo_count,
        );
        aggregate.dimension_scores = compute_dimensional_blended(
            &aggregate.dimension_scores,
            &observation.dimensions,
            &self.config,
        );
        aggregate.state = AggregateState::for_sample_count(
            aggregate.sample_count,
            self.config.established_threshold,
            self.config.authoritative_threshold,
        );
        if let Some(source) = &observation.source {
            aggregate.contributors.insert(source.clone());
        }
        aggregate.updated_at = chrono::Utc::now();

        if let (Some(model), Some(task_type)) = (&observation.model, &observation.task_type) {
            let cohort = aggregate.cohort_mut(model, task_type);
            let score = compute_dampened_score(
                cohort.personal_score,
                observation.score,
                cohort.sample_count,
                &self.config,
            );
            cohort.personal_score = Some(score);
            cohort.sample_count += 1;
            let cohort = cohort.clone();
            self.store
                .put_cohort(&self.collection, agent_id, &cohort)
                .await?;
        }

        self.lock_population().update(dual.governance);

        self.store.put(&aggregate).await?;
        let event_count = self
            .store
            .append_event(&self.collection, agent_id, observation)
            .await?;

        if event_count >= self.config.compaction_threshold {
            let snapshot_version = self.store.compact_snapshot(&aggregate).await?;
            debug!(
                collection = %self.collection,
                agent = agent_id,
                snapshot_version,
                "aggregate compacted"
            );
        }

        Ok(aggregate)
    }

    /// Task-aware cross-model trust score over the agent's cohorts.
    ///
    /// None only when the agent has no warm cohorts.
    pub async fn cross_model_score(
        &self,
        agent_id: &str,
        task_type: Option<&str>,
    ) -> DomainResult<Option<f64>> {
        let cohorts = self.store.list_cohorts(&self.collection, agent_id).await?;
        Ok(compute_task_aware_cross_model_score(
            &cohorts,
            task_type,
            self.config.task_type_weight_multiplier,
        ))
    }

    fn lock_population(&self) -> MutexGuard<'_, PopulationAggregator> {
        match self.population.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
