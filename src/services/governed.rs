//! Governed-Resource contract.
//!
//! Every governor in the system (fleet capacity here; autonomy and
//! freshness governors live elsewhere) exposes the same shape: identity,
//! versioned state, event-driven transition, invariant verification, an
//! append-only hash-linked audit trail, and an actor-attributed mutation
//! log. The uniform shape lets one registry answer "what does this system
//! govern, and is it healthy?" across otherwise-unrelated resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::ConvictionTier;

/// Fixed genesis value the first audit entry links to.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Discriminator tag for governed resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Per-operator spawn capacity
    FleetCapacity,
    /// Agent autonomy envelope
    Autonomy,
    /// Knowledge freshness
    Freshness,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FleetCapacity => "fleet_capacity",
            Self::Autonomy => "autonomy",
            Self::Freshness => "freshness",
        }
    }
}

/// Events a governor can be driven with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GovernanceEvent {
    SpawnRequested {
        operator_id: String,
        tier: ConvictionTier,
    },
    AgentCompleted {
        operator_id: String,
    },
    AgentFailed {
        operator_id: String,
    },
    TierChanged {
        operator_id: String,
        tier: ConvictionTier,
    },
}

impl GovernanceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SpawnRequested { .. } => "spawn_requested",
            Self::AgentCompleted { .. } => "agent_completed",
            Self::AgentFailed { .. } => "agent_failed",
            Self::TierChanged { .. } => "tier_changed",
        }
    }

    pub fn operator_id(&self) -> &str {
        match self {
            Self::SpawnRequested { operator_id, .. }
            | Self::AgentCompleted { operator_id }
            | Self::AgentFailed { operator_id }
            | Self::TierChanged { operator_id, .. } => operator_id,
        }
    }
}

/// Result of driving a governor with an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "success", rename_all = "snake_case")]
pub enum TransitionOutcome {
    #[serde(rename = "true")]
    Applied {
        state: serde_json::Value,
        version: u64,
    },
    #[serde(rename = "false")]
    Rejected { reason: String, code: String },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Diagnostic result of checking one invariant.
///
/// Invariant checking is observational: a violated invariant reports
/// `satisfied: false` with a human-readable detail, it never blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantCheck {
    pub invariant_id: String,
    pub satisfied: bool,
    pub detail: String,
    pub checked_at: DateTime<Utc>,
}

impl InvariantCheck {
    pub fn satisfied(invariant_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            invariant_id: invariant_id.into(),
            satisfied: true,
            detail: detail.into(),
            checked_at: Utc::now(),
        }
    }

    pub fn violated(invariant_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            invariant_id: invariant_id.into(),
            satisfied: false,
            detail: detail.into(),
            checked_at: Utc::now(),
        }
    }
}

/// Actor-attributed record of one applied mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub actor_id: String,
    pub event_kind: String,
    pub version: u64,
    pub occurred_at: DateTime<Utc>,
}

/// One hash-linked audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub event_kind: String,
    /// sha256 of the serialized post-transition state
    pub state_hash: String,
    /// entry hash of the previous entry, or the genesis value
    pub previous_hash: String,
    /// sha256 over (previous_hash, index, actor, event, state_hash)
    pub entry_hash: String,
}

/// Append-only audit trail linked by entry-hash/previous-hash back to a
/// fixed genesis value.
#[derive(Debug, Clone, Default)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry for an applied transition.
    pub fn append(
        &mut self,
        actor_id: &str,
        event_kind: &str,
        state: &serde_json::Value,
    ) -> &AuditEntry {
        let index = self.entries.len() as u64;
        let previous_hash = self
            .entries
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |e| e.entry_hash.clone());
        let state_hash = sha256_hex(state.to_string().as_bytes());
        let entry_hash = chain_hash(&previous_hash, index, actor_id, event_kind, &state_hash);

        self.entries.push(AuditEntry {
            index,
            timestamp: Utc::now(),
            actor_id: actor_id.to_string(),
            event_kind: event_kind.to_string(),
            state_hash,
            previous_hash,
            entry_hash,
        });
        // Just pushed.
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Walk the chain and confirm every link and digest.
    pub fn verify_chain(&self) -> bool {
        let mut previous = GENESIS_HASH.to_string();
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.index != i as u64 || entry.previous_hash != previous {
                return false;
            }
            let expected = chain_hash(
                &entry.previous_hash,
                entry.index,
                &entry.actor_id,
                &entry.event_kind,
                &entry.state_hash,
            );
            if entry.entry_hash != expected {
                return false;
            }
            previous = entry.entry_hash.clone();
        }
        true
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn chain_hash(
    previous_hash: &str,
    index: u64,
    actor_id: &str,
    event_kind: &str,
    state_hash: &str,
) -> String {
    let payload = format!("{previous_hash}:{index}:{actor_id}:{event_kind}:{state_hash}");
    sha256_hex(payload.as_bytes())
}

/// The shared contract every governor implements.
///
/// Methods take `&self`; implementations use interior mutability so a
/// governor can sit behind an `Arc` while concurrent requests drive it.
pub trait GovernedResource: Send + Sync {
    fn resource_id(&self) -> &str;

    fn resource_type(&self) -> ResourceType;

    /// Serialized snapshot of the current state.
    fn current_state(&self) -> serde_json::Value;

    /// Monotonically increasing state version.
    fn version(&self) -> u64;

    /// Drive the governor with an event.
    fn transition(&self, event: GovernanceEvent, actor_id: &str) -> TransitionOutcome;

    /// Check one invariant by ID.
    fn verify(&self, invariant_id: &str) -> InvariantCheck;

    /// Check every invariant this governor owns.
    fn verify_all(&self) -> Vec<InvariantCheck>;

    /// Copy of the append-only audit trail.
    fn audit_trail(&self) -> Vec<AuditEntry>;

    /// Copy of the actor-attributed mutation log.
    fn mutation_log(&self) -> Vec<MutationRecord>;
}

/// Health report for one registered governor.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorHealth {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub version: u64,
    pub checks: Vec<InvariantCheck>,
    pub healthy: bool,
}

/// Registry of governors keyed by their resource-type discriminator.
#[derive(Default)]
pub struct GovernorRegistry {
    governors: HashMap<ResourceType, Arc<dyn GovernedResource>>,
}

impl GovernorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, governor: Arc<dyn GovernedResource>) {
        self.governors.insert(governor.resource_type(), governor);
    }

    pub fn get(&self, resource_type: ResourceType) -> Option<&Arc<dyn GovernedResource>> {
        self.governors.get(&resource_type)
    }

    pub fn resource_types(&self) -> Vec<ResourceType> {
        self.governors.keys().copied().collect()
    }

    /// Answer "what does this system govern, and is it healthy?"
    pub fn health(&self) -> Vec<GovernorHealth> {
        self.governors
            .values()
            .map(|g| {
                let checks = g.verify_all();
                let healthy = checks.iter().all(|c| c.satisfied);
                GovernorHealth {
                    resource_id: g.resource_id().to_string(),
                    resource_type: g.resource_type(),
                    version: g.version(),
                    checks,
                    healthy,
                }
            })
            .collect()
    }
}
