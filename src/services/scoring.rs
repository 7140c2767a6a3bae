//! Scoring engine: pure functions over quality observations.
//!
//! Everything in this module is total, synchronous, and numeric. Missing
//! data degrades gracefully: a null personal score means "cold", an empty
//! population falls back to the neutral 0.5 prior. Nothing here suspends
//! or touches I/O; the event-processing path and routing logic call these
//! with whatever aggregate state they hold.

use crate::domain::models::{
    ColdStartStrategy, DimensionScore, RampDirection, ScoringConfig, TaskTypeCohort,
};
use std::collections::BTreeMap;

/// Neutral prior used when no evidence exists. Epistemic default, not an
/// observed value.
pub const NEUTRAL_PRIOR: f64 = 0.5;

/// EMA dampening factor for a given evidence level.
///
/// Under the ascending ramp alpha rises from `alpha_min` to `alpha_max` as
/// samples accumulate (conservative first); the descending ramp is the exact
/// mirror (responsive first, settling down as evidence accumulates).
pub fn ramp_alpha(sample_count: u64, config: &ScoringConfig) -> f64 {
    let progress = if config.ramp_samples == 0 {
        1.0
    } else {
        (sample_count as f64 / config.ramp_samples as f64).min(1.0)
    };
    let span = config.alpha_max - config.alpha_min;
    match config.ramp {
        RampDirection::Ascending => config.alpha_min + span * progress,
        RampDirection::Descending => config.alpha_max - span * progress,
    }
}

/// Fold one observation into a personal score.
///
/// Cold start (`old_score == None`): the `direct` strategy returns the
/// observation verbatim; the `bayesian` strategy blends it toward the
/// neutral prior with weight `pseudo_count / (pseudo_count + samples)`,
/// counting the incoming observation. Steady state applies the ramped EMA;
/// the result always lies between `old_score` and `new_score`.
pub fn compute_dampened_score(
    old_score: Option<f64>,
    new_score: f64,
    sample_count: u64,
    config: &ScoringConfig,
) -> f64 {
    match old_score {
        None => match config.cold_start {
            ColdStartStrategy::Direct => new_score,
            ColdStartStrategy::Bayesian => {
                let effective_samples = (sample_count + 1) as f64;
                let pseudo = config.pseudo_count as f64;
                if pseudo + effective_samples == 0.0 {
                    return new_score;
                }
                let prior_weight = pseudo / (pseudo + effective_samples);
                prior_weight * NEUTRAL_PRIOR + (1.0 - prior_weight) * new_score
            }
        },
        Some(old) => {
            let alpha = ramp_alpha(sample_count, config);
            old + alpha * (new_score - old)
        }
    }
}

/// Governance and display tracks of one agent's score.
///
/// The governance score uses the Bayesian cold start and feeds admission
/// and routing decisions; the display score starts direct so the number a
/// human sees matches what reviewers reported. The two converge after
/// warm-up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualTrackScore {
    pub governance: f64,
    pub display: f64,
    pub observations: u64,
}

/// Fold one observation into both score tracks.
pub fn compute_dual_track_score(
    governance_old: Option<f64>,
    display_old: Option<f64>,
    new_score: f64,
    sample_count: u64,
    config: &ScoringConfig,
) -> DualTrackScore {
    let governance_config = ScoringConfig {
        cold_start: ColdStartStrategy::Bayesian,
        ..config.clone()
    };
    let display_config = ScoringConfig {
        cold_start: ColdStartStrategy::Direct,
        ..config.clone()
    };
    DualTrackScore {
        governance: compute_dampened_score(governance_old, new_score, sample_count, &governance_config),
        display: compute_dampened_score(display_old, new_score, sample_count, &display_config),
        observations: sample_count + 1,
    }
}

/// Canonical Bayesian blend of personal evidence against the population
/// prior. With no samples the blend is the prior; personal evidence takes
/// over as `sample_count` grows past `pseudo_count`.
pub fn compute_blended_score(
    personal: f64,
    collection: f64,
    sample_count: u64,
    pseudo_count: u64,
) -> f64 {
    let n = sample_count as f64;
    let pseudo = pseudo_count as f64;
    if n + pseudo == 0.0 {
        return collection;
    }
    let personal_weight = n / (n + pseudo);
    personal_weight * personal + (1.0 - personal_weight) * collection
}

/// Apply the dampening pipeline independently per named quality dimension.
///
/// Dimensions absent from the latest observation are carried forward
/// unchanged, so intermittent coverage never silently drops prior data.
pub fn compute_dimensional_blended(
    previous: &BTreeMap<String, DimensionScore>,
    observation: &BTreeMap<String, f64>,
    config: &ScoringConfig,
) -> BTreeMap<String, DimensionScore> {
    let mut result = previous.clone();
    for (name, &observed) in observation {
        let prior = previous.get(name);
        let score = compute_dampened_score(
            prior.map(|d| d.score),
            observed,
            prior.map_or(0, |d| d.sample_count),
            config,
        );
        result.insert(
            name.clone(),
            DimensionScore {
                score,
                sample_count: prior.map_or(0, |d| d.sample_count) + 1,
            },
        );
    }
    result
}

/// Cross-model score over an agent's task cohorts.
///
/// Without a task type this is the sample-count-weighted average across all
/// warm cohorts. With a task type, matching cohorts have their sample count
/// multiplied by `weight_multiplier` before averaging, biasing toward
/// task-relevant evidence while still incorporating cross-task signal.
/// Returns `None` only when every cohort is cold.
pub fn compute_task_aware_cross_model_score(
    cohorts: &[TaskTypeCohort],
    task_type: Option<&str>,
    weight_multiplier: f64,
) -> Option<f64> {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for cohort in cohorts {
        let Some(score) = cohort.personal_score else {
            continue;
        };
        if cohort.sample_count == 0 {
            continue;
        }
        let mut weight = cohort.sample_count as f64;
        if task_type.is_some_and(|t| t == cohort.task_type) {
            weight *= weight_multiplier;
        }
        weighted_sum += weight * score;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        Some(weighted_sum / total_weight)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ScoringConfig {
        ScoringConfig::default()
    }

    fn approx(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_ascending_ramp_endpoints() {
        let cfg = config();
        assert!(approx(ramp_alpha(0, &cfg), 0.1, 1e-12));
        assert!(approx(ramp_alpha(cfg.ramp_samples, &cfg), 0.5, 1e-12));
        assert!(approx(ramp_alpha(cfg.ramp_samples * 10, &cfg), 0.5, 1e-12));
    }

    #[test]
    fn test_ascending_ramp_monotone() {
        let cfg = config();
        let mut previous = ramp_alpha(0, &cfg);
        for n in 1..=cfg.ramp_samples {
            let alpha = ramp_alpha(n, &cfg);
            assert!(alpha >= previous);
            previous = alpha;
        }
    }

    #[test]
    fn test_descending_ramp_mirrors_ascending() {
        let asc = config();
        let desc = ScoringConfig {
            ramp: RampDirection::Descending,
            ..config()
        };
        for n in 0..=asc.ramp_samples {
            let a = ramp_alpha(n, &asc);
            let d = ramp_alpha(n, &desc);
            assert!(approx(a + d, asc.alpha_min + asc.alpha_max, 1e-12));
        }
        assert!(approx(ramp_alpha(0, &desc), 0.5, 1e-12));
        assert!(approx(ramp_alpha(desc.ramp_samples, &desc), 0.1, 1e-12));
    }

    #[test]
    fn test_bayesian_cold_start_known_values() {
        let cfg = config();
        // pseudo 10, one effective sample: (10 * 0.5 + 1 * 0.95) / 11
        let score = compute_dampened_score(None, 0.95, 0, &cfg);
        assert!(approx(score, 0.541, 1e-3));

        // An observation equal to the prior is a fixed point.
        let score = compute_dampened_score(None, 0.5, 0, &cfg);
        assert!(approx(score, 0.5, 1e-12));
    }

    #[test]
    fn test_direct_cold_start_verbatim() {
        let cfg = ScoringConfig {
            cold_start: ColdStartStrategy::Direct,
            ..config()
        };
        assert!(approx(compute_dampened_score(None, 0.95, 0, &cfg), 0.95, 1e-12));
        assert!(approx(compute_dampened_score(None, 0.0, 0, &cfg), 0.0, 1e-12));
    }

    #[test]
    fn test_ema_never_overshoots() {
        let cfg = config();
        for &(old, new, n) in &[
            (0.2_f64, 0.9_f64, 0_u64),
            (0.9, 0.2, 3),
            (0.5, 0.5, 100),
            (0.0, 1.0, 7),
        ] {
            let result = compute_dampened_score(Some(old), new, n, &cfg);
            assert!(result >= old.min(new) - 1e-12);
            assert!(result <= old.max(new) + 1e-12);
        }
    }

    #[test]
    fn test_ema_moves_toward_observation() {
        let cfg = config();
        // alpha(0) = 0.1: 0.2 + 0.1 * (0.9 - 0.2) = 0.27
        let result = compute_dampened_score(Some(0.2), 0.9, 0, &cfg);
        assert!(approx(result, 0.27, 1e-12));
        // alpha(>= ramp) = 0.5: halfway
        let result = compute_dampened_score(Some(0.2), 0.9, cfg.ramp_samples, &cfg);
        assert!(approx(result, 0.55, 1e-12));
    }

    #[test]
    fn test_dual_track_diverges_then_converges() {
        let cfg = config();
        let first = compute_dual_track_score(None, None, 0.95, 0, &cfg);
        assert!(approx(first.governance, 0.541, 1e-3));
        assert!(approx(first.display, 0.95, 1e-12));
        assert_eq!(first.observations, 1);

        // Feed identical observations; the gap shrinks every step.
        let mut governance = Some(first.governance);
        let mut display = Some(first.display);
        let mut gap = (first.display - first.governance).abs();
        for n in 1..30 {
            let next = compute_dual_track_score(governance, display, 0.95, n, &cfg);
            let next_gap = (next.display - next.governance).abs();
            assert!(next_gap <= gap + 1e-12);
            gap = next_gap;
            governance = Some(next.governance);
            display = Some(next.display);
        }
        assert!(gap < 0.01);
    }

    #[test]
    fn test_blended_score_weighting() {
        // No evidence: blend is the prior.
        assert!(approx(compute_blended_score(0.9, 0.5, 0, 10), 0.5, 1e-12));
        // Equal evidence and pseudo count: midpoint.
        assert!(approx(compute_blended_score(0.9, 0.5, 10, 10), 0.7, 1e-12));
        // Overwhelming evidence: converges on personal.
        assert!(compute_blended_score(0.9, 0.5, 10_000, 10) > 0.89);
        // Degenerate zero/zero: prior.
        assert!(approx(compute_blended_score(0.9, 0.4, 0, 0), 0.4, 1e-12));
    }

    #[test]
    fn test_dimensional_carries_forward_missing_dimensions() {
        let cfg = config();
        let mut previous = BTreeMap::new();
        previous.insert(
            "correctness".to_string(),
            DimensionScore { score: 0.8, sample_count: 5 },
        );
        previous.insert(
            "style".to_string(),
            DimensionScore { score: 0.6, sample_count: 2 },
        );

        // Observation only covers correctness.
        let mut observation = BTreeMap::new();
        observation.insert("correctness".to_string(), 0.4);

        let result = compute_dimensional_blended(&previous, &observation, &cfg);

        // style untouched
        assert!(approx(result["style"].score, 0.6, 1e-12));
        assert_eq!(result["style"].sample_count, 2);
        // correctness dampened and counted
        assert!(result["correctness"].score < 0.8);
        assert!(result["correctness"].score > 0.4);
        assert_eq!(result["correctness"].sample_count, 6);
    }

    #[test]
    fn test_dimensional_cold_dimension_uses_cold_start() {
        let cfg = config();
        let previous = BTreeMap::new();
        let mut observation = BTreeMap::new();
        observation.insert("depth".to_string(), 0.95);

        let result = compute_dimensional_blended(&previous, &observation, &cfg);
        assert!(approx(result["depth"].score, 0.541, 1e-3));
        assert_eq!(result["depth"].sample_count, 1);
    }

    fn cohort(model: &str, task_type: &str, score: f64, samples: u64) -> TaskTypeCohort {
        TaskTypeCohort {
            model: model.to_string(),
            task_type: task_type.to_string(),
            personal_score: Some(score),
            sample_count: samples,
        }
    }

    #[test]
    fn test_cross_model_unweighted_without_task_type() {
        let cohorts = vec![
            cohort("model-a", "refactor", 0.8, 10),
            cohort("model-b", "bugfix", 0.4, 30),
        ];
        let score = compute_task_aware_cross_model_score(&cohorts, None, 3.0).unwrap();
        // (0.8 * 10 + 0.4 * 30) / 40 = 0.5
        assert!(approx(score, 0.5, 1e-12));
    }

    #[test]
    fn test_cross_model_task_type_triples_matching_weight() {
        let cohorts = vec![
            cohort("model-a", "refactor", 0.8, 10),
            cohort("model-b", "bugfix", 0.4, 30),
        ];
        let score =
            compute_task_aware_cross_model_score(&cohorts, Some("refactor"), 3.0).unwrap();
        // refactor weight becomes 10 * 3 = 30: (0.8 * 30 + 0.4 * 30) / 60 = 0.6
        assert!(approx(score, 0.6, 1e-12));
    }

    #[test]
    fn test_cross_model_none_only_when_all_cold() {
        let cold = vec![
            TaskTypeCohort::new("model-a", "refactor"),
            TaskTypeCohort::new("model-b", "bugfix"),
        ];
        assert!(compute_task_aware_cross_model_score(&cold, None, 3.0).is_none());

        let mut mixed = cold;
        mixed.push(cohort("model-c", "docs", 0.7, 1));
        let score = compute_task_aware_cross_model_score(&mixed, Some("refactor"), 3.0).unwrap();
        // Only the warm cohort contributes, despite the task-type mismatch.
        assert!(approx(score, 0.7, 1e-12));
    }
}
