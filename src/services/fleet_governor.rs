//! Fleet admission governor.
//!
//! Decides, under concurrent requests, whether an operator may spawn a new
//! agent. Two-phase design: `can_spawn` is a cheap advisory pre-check
//! against a TTL-bounded in-memory count, `admit_and_insert` is the
//! authoritative transactional path. The two have different consistency
//! guarantees and are deliberately kept separate; the cache is never
//! folded into the authoritative path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::domain::errors::{AdmissionDenial, DomainError, DomainResult};
use crate::domain::models::{ConvictionTier, FleetConfig, FleetState, FleetTask, SpawnInput};
use crate::domain::ports::{AdmissionOutcome, FleetTaskStore};
use crate::services::governed::{
    AuditEntry, AuditTrail, GovernanceEvent, GovernedResource, InvariantCheck, MutationRecord,
    ResourceType, TransitionOutcome,
};

/// Invariant: active count never exceeds the tier limit.
pub const INV_CAPACITY: &str = "INV-014";
/// Invariant: a cancelled task can never re-enter the active set.
pub const INV_NO_RESURRECTION: &str = "INV-015";
/// Invariant: a tier downgrade never leaves the active count above the new
/// limit.
pub const INV_DOWNGRADE: &str = "INV-016";

/// Tier → capacity table with per-deployment overrides.
#[derive(Debug, Clone, Default)]
pub struct TierLimits {
    overrides: HashMap<ConvictionTier, u32>,
}

impl TierLimits {
    /// Build from config overrides keyed by tier name; unknown tier names
    /// are ignored with a warning.
    pub fn from_config(config: &FleetConfig) -> Self {
        let mut overrides = HashMap::new();
        for (name, limit) in &config.tier_limits {
            match ConvictionTier::from_str(name) {
                Some(tier) => {
                    overrides.insert(tier, *limit);
                }
                None => warn!(tier = %name, "ignoring limit override for unknown tier"),
            }
        }
        Self { overrides }
    }

    pub fn limit_for(&self, tier: ConvictionTier) -> u32 {
        self.overrides
            .get(&tier)
            .copied()
            .unwrap_or_else(|| tier.default_limit())
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedCount {
    count: u32,
    refreshed_at: Instant,
}

/// Mutable governor state behind one lock: the last-observed snapshot, the
/// version counter, and the audit/mutation logs move together.
#[derive(Default)]
struct GovernorState {
    snapshot: Option<FleetState>,
    version: u64,
    audit: AuditTrail,
    mutations: Vec<MutationRecord>,
}

impl GovernorState {
    fn record(&mut self, actor_id: &str, event_kind: &str, state: &serde_json::Value) {
        self.version += 1;
        self.audit.append(actor_id, event_kind, state);
        self.mutations.push(MutationRecord {
            actor_id: actor_id.to_string(),
            event_kind: event_kind.to_string(),
            version: self.version,
            occurred_at: chrono::Utc::now(),
        });
    }
}

/// Per-operator spawn admission governor.
///
/// The optimistic active-count cache and the governor snapshot are
/// constructor-injected, explicitly-scoped state: one instance per process
/// (or per test), never an implicit global.
pub struct FleetAdmissionGovernor {
    resource_id: String,
    limits: TierLimits,
    cache_ttl: Duration,
    store: Arc<dyn FleetTaskStore>,
    counts: Mutex<HashMap<String, CachedCount>>,
    state: Mutex<GovernorState>,
}

impl FleetAdmissionGovernor {
    pub fn new(store: Arc<dyn FleetTaskStore>, config: &FleetConfig) -> Self {
        Self {
            resource_id: "fleet-admission".to_string(),
            limits: TierLimits::from_config(config),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            store,
            counts: Mutex::new(HashMap::new()),
            state: Mutex::new(GovernorState::default()),
        }
    }

    /// Capacity ceiling for a tier under this deployment's overrides.
    pub fn get_tier_limit(&self, tier: ConvictionTier) -> u32 {
        self.limits.limit_for(tier)
    }

    /// O(1) advisory pre-check. A zero tier limit always denies; a cache
    /// miss or a stale entry optimistically allows.
    ///
    /// This path exists purely to reject obviously-denied spawns cheaply.
    /// It may be stale in the permissive direction and must never be the
    /// authority for a final denial; that is `admit_and_insert`'s job.
    pub fn can_spawn(&self, operator_id: &str, tier: ConvictionTier) -> bool {
        let limit = self.limits.limit_for(tier);
        if limit == 0 {
            return false;
        }
        let counts = match self.counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match counts.get(operator_id) {
            Some(cached) if cached.refreshed_at.elapsed() <= self.cache_ttl => {
                cached.count < limit
            }
            // Miss or stale: optimistic allow.
            _ => true,
        }
    }

    /// Authoritative admission: transactional count-then-insert, serialized
    /// per operator by the store's write lock.
    ///
    /// On success the in-memory cache is optimistically bumped and the
    /// derived snapshot updated; on denial nothing is written and the error
    /// carries full diagnostic state.
    pub async fn admit_and_insert(
        &self,
        input: &SpawnInput,
        tier: ConvictionTier,
    ) -> DomainResult<FleetTask> {
        input
            .validate()
            .map_err(DomainError::ValidationFailed)?;

        let tier_limit = self.limits.limit_for(tier);
        if tier_limit == 0 {
            debug!(operator = %input.operator_id, tier = %tier.as_str(), "zero-limit tier, denying without storage");
            return Err(self.denial(input, tier, 0, tier_limit, "tier allows no concurrent agents"));
        }

        match self.store.admit_insert(input, tier_limit).await? {
            AdmissionOutcome::Admitted { task, active_count } => {
                self.cache_count(&input.operator_id, active_count);
                self.observe_admission(&input.operator_id, tier, active_count, tier_limit);
                info!(
                    operator = %input.operator_id,
                    tier = %tier.as_str(),
                    active = active_count,
                    limit = tier_limit,
                    task = %task.id,
                    "spawn admitted"
                );
                Ok(task)
            }
            AdmissionOutcome::Denied { active_count } => {
                self.cache_count(&input.operator_id, active_count);
                debug!(
                    operator = %input.operator_id,
                    active = active_count,
                    limit = tier_limit,
                    "spawn denied at capacity"
                );
                Err(self.denial(input, tier, active_count, tier_limit, "active agent limit reached"))
            }
        }
    }

    /// Drop the cached count for an operator so the next admission
    /// re-derives truth from storage. Called on task completion/failure.
    pub fn invalidate_cache(&self, operator_id: &str) {
        let mut counts = match self.counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        counts.remove(operator_id);
    }

    /// Administrative escape hatch: drop every cached count.
    pub fn invalidate_all_caches(&self) {
        let mut counts = match self.counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        counts.clear();
    }

    fn cache_count(&self, operator_id: &str, count: u32) {
        let mut counts = match self.counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        counts.insert(
            operator_id.to_string(),
            CachedCount {
                count,
                refreshed_at: Instant::now(),
            },
        );
    }

    fn denial(
        &self,
        input: &SpawnInput,
        tier: ConvictionTier,
        active_count: u32,
        tier_limit: u32,
        reason: &str,
    ) -> DomainError {
        DomainError::AdmissionDenied(AdmissionDenial {
            operator_id: input.operator_id.clone(),
            tier: tier.as_str().to_string(),
            active_count,
            tier_limit,
            reason: reason.to_string(),
        })
    }

    fn observe_admission(
        &self,
        operator_id: &str,
        tier: ConvictionTier,
        active_count: u32,
        tier_limit: u32,
    ) {
        let mut state = self.lock_state();
        let snapshot = FleetState {
            operator_id: operator_id.to_string(),
            tier,
            active_count,
            tier_limit,
        };
        let json = serde_json::to_value(&snapshot).unwrap_or_default();
        state.snapshot = Some(snapshot);
        state.record(operator_id, "spawn_admitted", &json);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GovernorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_capacity_invariant(&self, invariant_id: &str) -> InvariantCheck {
        let state = self.lock_state();
        match &state.snapshot {
            Some(snapshot) => {
                if snapshot.active_count <= snapshot.tier_limit {
                    InvariantCheck::satisfied(
                        invariant_id,
                        format!(
                            "operator {}: {} active <= limit {}",
                            snapshot.operator_id, snapshot.active_count, snapshot.tier_limit
                        ),
                    )
                } else {
                    InvariantCheck::violated(
                        invariant_id,
                        format!(
                            "operator {}: {} active > limit {}",
                            snapshot.operator_id, snapshot.active_count, snapshot.tier_limit
                        ),
                    )
                }
            }
            None => InvariantCheck::satisfied(invariant_id, "no operator observed yet"),
        }
    }
}

impl GovernedResource for FleetAdmissionGovernor {
    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::FleetCapacity
    }

    fn current_state(&self) -> serde_json::Value {
        let state = self.lock_state();
        serde_json::to_value(&state.snapshot).unwrap_or(serde_json::Value::Null)
    }

    fn version(&self) -> u64 {
        self.lock_state().version
    }

    /// Update the last-observed snapshot from a fleet event.
    ///
    /// Known limitation, preserved on purpose: the governor keeps a single
    /// last-observed snapshot rather than a canonical per-operator map, so
    /// `verify`/`verify_all` only reflect the most recently touched
    /// operator. The database row count remains the sole canonical truth.
    fn transition(&self, event: GovernanceEvent, actor_id: &str) -> TransitionOutcome {
        let mut state = self.lock_state();
        let operator_id = event.operator_id().to_string();
        let same_operator = state
            .snapshot
            .as_ref()
            .is_some_and(|s| s.operator_id == operator_id);

        let next = match &event {
            GovernanceEvent::SpawnRequested { tier, .. } => {
                let tier_limit = self.limits.limit_for(*tier);
                let previous = if same_operator {
                    state.snapshot.as_ref().map_or(0, |s| s.active_count)
                } else {
                    0
                };
                let active_count = previous + 1;
                if active_count > tier_limit {
                    return TransitionOutcome::Rejected {
                        reason: format!(
                            "operator {operator_id}: {active_count} active would exceed limit {tier_limit}"
                        ),
                        code: "CAPACITY_EXCEEDED".to_string(),
                    };
                }
                FleetState {
                    operator_id,
                    tier: *tier,
                    active_count,
                    tier_limit,
                }
            }
            GovernanceEvent::AgentCompleted { .. } | GovernanceEvent::AgentFailed { .. } => {
                if !same_operator {
                    return TransitionOutcome::Rejected {
                        reason: format!("no observed state for operator {operator_id}"),
                        code: "UNKNOWN_OPERATOR".to_string(),
                    };
                }
                let Some(snapshot) = state.snapshot.as_ref() else {
                    return TransitionOutcome::Rejected {
                        reason: format!("no observed state for operator {operator_id}"),
                        code: "UNKNOWN_OPERATOR".to_string(),
                    };
                };
                FleetState {
                    active_count: snapshot.active_count.saturating_sub(1),
                    ..snapshot.clone()
                }
            }
            GovernanceEvent::TierChanged { tier, .. } => {
                let tier_limit = self.limits.limit_for(*tier);
                let active_count = if same_operator {
                    state.snapshot.as_ref().map_or(0, |s| s.active_count)
                } else {
                    0
                };
                FleetState {
                    operator_id,
                    tier: *tier,
                    active_count,
                    tier_limit,
                }
            }
        };

        let json = serde_json::to_value(&next).unwrap_or_default();
        state.snapshot = Some(next);
        state.record(actor_id, event.kind(), &json);
        TransitionOutcome::Applied {
            state: json,
            version: state.version,
        }
    }

    fn verify(&self, invariant_id: &str) -> InvariantCheck {
        match invariant_id {
            // Both reduce to the capacity bound on the snapshot.
            INV_CAPACITY | INV_DOWNGRADE => self.check_capacity_invariant(invariant_id),
            // Asserted structurally: the status machine gives cancelled no
            // outgoing transitions, so resurrection is unreachable.
            INV_NO_RESURRECTION => {
                use crate::domain::models::FleetTaskStatus;
                if FleetTaskStatus::Cancelled.valid_transitions().is_empty() {
                    InvariantCheck::satisfied(
                        invariant_id,
                        "cancelled has no outgoing transitions",
                    )
                } else {
                    InvariantCheck::violated(
                        invariant_id,
                        "cancelled has outgoing transitions",
                    )
                }
            }
            other => InvariantCheck::violated(other, "unknown invariant id"),
        }
    }

    fn verify_all(&self) -> Vec<InvariantCheck> {
        vec![
            self.verify(INV_CAPACITY),
            self.verify(INV_NO_RESURRECTION),
            self.verify(INV_DOWNGRADE),
        ]
    }

    fn audit_trail(&self) -> Vec<AuditEntry> {
        self.lock_state().audit.entries().to_vec()
    }

    fn mutation_log(&self) -> Vec<MutationRecord> {
        self.lock_state().mutations.clone()
    }
}
