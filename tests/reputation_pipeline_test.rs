//! Reputation pipeline against real SQLite: event atomicity, compaction,
//! and the full record-observation path including restart reseeding.

use std::sync::Arc;

use magistrate::adapters::sqlite::{create_migrated_test_pool, SqliteReputationRepository};
use magistrate::domain::ports::ReputationStore;
use magistrate::services::ReputationService;
use magistrate::{AggregateState, QualityObservation, ScoringConfig};

async fn sqlite_service(config: ScoringConfig) -> (ReputationService, Arc<SqliteReputationRepository>) {
    let pool = create_migrated_test_pool().await.unwrap();
    let store = Arc::new(SqliteReputationRepository::new(pool));
    let service = ReputationService::new("reviews", store.clone(), config);
    (service, store)
}

#[tokio::test]
async fn first_observation_round_trips_through_sqlite() {
    let (service, store) = sqlite_service(ScoringConfig::default()).await;

    let aggregate = service
        .record_observation("agent-1", &QualityObservation::new(0.95))
        .await
        .unwrap();
    assert_eq!(aggregate.state, AggregateState::Warming);
    assert!((aggregate.personal_score.unwrap() - 0.541).abs() < 1e-3);
    assert!((aggregate.display_score.unwrap() - 0.95).abs() < 1e-12);

    // What the service returned is exactly what durable storage holds.
    let stored = store.get("reviews", "agent-1").await.unwrap().unwrap();
    assert_eq!(stored, aggregate);
    assert!(store.needs_compaction("reviews", "agent-1", 1).await.unwrap());
}

#[tokio::test]
async fn event_stream_and_counter_stay_in_lockstep() {
    let (service, store) = sqlite_service(ScoringConfig::default()).await;

    for i in 0..5 {
        service
            .record_observation("agent-1", &QualityObservation::new(0.5 + 0.05 * f64::from(i)))
            .await
            .unwrap();
    }

    assert!(store.needs_compaction("reviews", "agent-1", 5).await.unwrap());
    assert!(!store.needs_compaction("reviews", "agent-1", 6).await.unwrap());

    let stored = store.get("reviews", "agent-1").await.unwrap().unwrap();
    assert_eq!(stored.sample_count, 5);
}

#[tokio::test]
async fn compaction_resets_counter_and_bumps_version() {
    let config = ScoringConfig {
        compaction_threshold: 3,
        ..ScoringConfig::default()
    };
    let (service, store) = sqlite_service(config).await;

    for _ in 0..3 {
        service
            .record_observation("agent-1", &QualityObservation::new(0.8))
            .await
            .unwrap();
    }

    // The third event crossed the threshold; the counter is back to zero.
    assert!(!store.needs_compaction("reviews", "agent-1", 1).await.unwrap());

    // Three more events trigger the second snapshot.
    for _ in 0..3 {
        service
            .record_observation("agent-1", &QualityObservation::new(0.8))
            .await
            .unwrap();
    }
    let stored = store.get("reviews", "agent-1").await.unwrap().unwrap();
    assert_eq!(stored.sample_count, 6);
}

#[tokio::test]
async fn cohorts_persist_and_feed_cross_model_scores() {
    let (service, store) = sqlite_service(ScoringConfig::default()).await;

    for _ in 0..3 {
        service
            .record_observation(
                "agent-1",
                &QualityObservation::new(0.9)
                    .with_model("model-a")
                    .with_task_type("refactor"),
            )
            .await
            .unwrap();
        service
            .record_observation(
                "agent-1",
                &QualityObservation::new(0.4)
                    .with_model("model-b")
                    .with_task_type("bugfix"),
            )
            .await
            .unwrap();
    }

    let cohorts = store.list_cohorts("reviews", "agent-1").await.unwrap();
    assert_eq!(cohorts.len(), 2);
    assert!(cohorts.iter().all(|c| c.sample_count == 3));

    let refactor = service
        .cross_model_score("agent-1", Some("refactor"))
        .await
        .unwrap()
        .unwrap();
    let bugfix = service
        .cross_model_score("agent-1", Some("bugfix"))
        .await
        .unwrap()
        .unwrap();
    assert!(refactor > bugfix);
}

#[tokio::test]
async fn population_reseeds_after_restart() {
    let pool = create_migrated_test_pool().await.unwrap();
    let store = Arc::new(SqliteReputationRepository::new(pool));

    let service = ReputationService::new("reviews", store.clone(), ScoringConfig::default());
    for agent in ["agent-1", "agent-2", "agent-3"] {
        service
            .record_observation(agent, &QualityObservation::new(0.9))
            .await
            .unwrap();
    }
    let mean_before = service.population_mean();
    assert!(mean_before > 0.5);

    // A fresh service over the same store starts neutral, then reseeds
    // from durable aggregates.
    let restarted = ReputationService::new("reviews", store, ScoringConfig::default());
    assert!((restarted.population_mean() - 0.5).abs() < f64::EPSILON);
    assert_eq!(restarted.seed_population().await.unwrap(), 3);
    assert!((restarted.population_mean() - mean_before).abs() < 1e-9);
}

#[tokio::test]
async fn contributors_and_dimensions_survive_the_blob() {
    let (service, store) = sqlite_service(ScoringConfig::default()).await;

    service
        .record_observation(
            "agent-1",
            &QualityObservation::new(0.8)
                .with_dimension("correctness", 0.9)
                .with_source("reviewer-a"),
        )
        .await
        .unwrap();
    service
        .record_observation(
            "agent-1",
            &QualityObservation::new(0.7)
                .with_dimension("style", 0.6)
                .with_source("reviewer-b"),
        )
        .await
        .unwrap();

    let stored = store.get("reviews", "agent-1").await.unwrap().unwrap();
    assert_eq!(stored.contributor_count(), 2);
    assert!(stored.dimension_scores.contains_key("correctness"));
    assert!(stored.dimension_scores.contains_key("style"));
    // Carried-forward dimension keeps its own sample count.
    assert_eq!(stored.dimension_scores["correctness"].sample_count, 1);
}
