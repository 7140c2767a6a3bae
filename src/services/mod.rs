//! Service layer: scoring, population statistics, and governance.

pub mod fleet_governor;
pub mod governed;
pub mod population;
pub mod reputation;
pub mod scoring;

pub use fleet_governor::{
    FleetAdmissionGovernor, TierLimits, INV_CAPACITY, INV_DOWNGRADE, INV_NO_RESURRECTION,
};
pub use governed::{
    AuditEntry, AuditTrail, GovernanceEvent, GovernedResource, GovernorHealth, GovernorRegistry,
    InvariantCheck, MutationRecord, ResourceType, TransitionOutcome, GENESIS_HASH,
};
pub use population::{PopulationAggregator, PopulationSnapshot};
pub use reputation::ReputationService;
pub use scoring::{
    compute_blended_score, compute_dampened_score, compute_dimensional_blended,
    compute_dual_track_score, compute_task_aware_cross_model_score, ramp_alpha, DualTrackScore,
    NEUTRAL_PRIOR,
};
