//! Fleet domain model.
//!
//! Fleet tasks are agent spawns owned by a wallet-identified operator.
//! How many an operator may run concurrently is gated by their conviction
//! tier; the admission governor enforces that ceiling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discrete access level earned through staked governance commitment.
///
/// The tier itself is resolved externally from wallet/stake; this core only
/// consumes it to derive a capacity ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvictionTier {
    Observer,
    Participant,
    Builder,
    Architect,
    Sovereign,
}

impl ConvictionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observer => "observer",
            Self::Participant => "participant",
            Self::Builder => "builder",
            Self::Architect => "architect",
            Self::Sovereign => "sovereign",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "observer" => Some(Self::Observer),
            "participant" => Some(Self::Participant),
            "builder" => Some(Self::Builder),
            "architect" => Some(Self::Architect),
            "sovereign" => Some(Self::Sovereign),
            _ => None,
        }
    }

    /// Default concurrent-agent ceiling for this tier.
    ///
    /// Deployments may override these via `FleetConfig::tier_limits`.
    pub fn default_limit(&self) -> u32 {
        match self {
            Self::Observer | Self::Participant => 0,
            Self::Builder => 1,
            Self::Architect => 3,
            Self::Sovereign => 10,
        }
    }
}

/// Status of a fleet task through the spawn/review pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetTaskStatus {
    /// Admitted but not yet spawned
    Proposed,
    /// Agent process is being brought up
    Spawning,
    /// Agent is working
    Running,
    /// Agent opened a pull request
    PrCreated,
    /// PR is under review
    Reviewing,
    /// Review passed, awaiting merge
    Ready,
    /// Failed attempt being retried
    Retrying,
    /// PR merged
    Merged,
    /// Execution failed
    Failed,
    /// Retries exhausted, given up
    Abandoned,
    /// Cancelled by the operator or an administrator
    Cancelled,
}

impl Default for FleetTaskStatus {
    fn default() -> Self {
        Self::Proposed
    }
}

impl FleetTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Spawning => "spawning",
            Self::Running => "running",
            Self::PrCreated => "pr_created",
            Self::Reviewing => "reviewing",
            Self::Ready => "ready",
            Self::Retrying => "retrying",
            Self::Merged => "merged",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "proposed" => Some(Self::Proposed),
            "spawning" => Some(Self::Spawning),
            "running" => Some(Self::Running),
            "pr_created" => Some(Self::PrCreated),
            "reviewing" => Some(Self::Reviewing),
            "ready" => Some(Self::Ready),
            "retrying" => Some(Self::Retrying),
            "merged" => Some(Self::Merged),
            "failed" => Some(Self::Failed),
            "abandoned" => Some(Self::Abandoned),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether this status consumes one of the operator's capacity slots.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Proposed
                | Self::Spawning
                | Self::Running
                | Self::PrCreated
                | Self::Reviewing
                | Self::Ready
                | Self::Retrying
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged | Self::Abandoned | Self::Cancelled)
    }

    /// Statuses that consume a capacity slot, in a fixed order for SQL
    /// `IN (...)` clauses.
    pub fn active_set() -> &'static [FleetTaskStatus] {
        &[
            Self::Proposed,
            Self::Spawning,
            Self::Running,
            Self::PrCreated,
            Self::Reviewing,
            Self::Ready,
            Self::Retrying,
        ]
    }

    /// Valid transitions from this status.
    ///
    /// `Cancelled` has no outgoing transitions: a cancelled task can never
    /// re-enter the active set. The invariant is structural, not a runtime
    /// check.
    pub fn valid_transitions(&self) -> Vec<FleetTaskStatus> {
        match self {
            Self::Proposed => vec![Self::Spawning, Self::Cancelled],
            Self::Spawning => vec![Self::Running, Self::Failed, Self::Cancelled],
            Self::Running => vec![Self::PrCreated, Self::Failed, Self::Cancelled],
            Self::PrCreated => vec![Self::Reviewing, Self::Failed, Self::Cancelled],
            Self::Reviewing => vec![Self::Ready, Self::Failed, Self::Cancelled],
            Self::Ready => vec![Self::Merged, Self::Failed, Self::Cancelled],
            Self::Retrying => vec![Self::Spawning, Self::Failed, Self::Cancelled],
            Self::Failed => vec![Self::Retrying, Self::Abandoned],
            Self::Merged | Self::Abandoned | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Input to an admission request. Becomes a `FleetTask` row if admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnInput {
    /// Wallet-identified operator requesting the spawn
    pub operator_id: String,
    /// Agent type to spawn (coder, reviewer, ...)
    pub agent_type: Option<String>,
    /// Human-readable title for the work
    pub title: String,
    /// Maximum retry attempts before abandoning
    pub max_retries: u32,
}

impl SpawnInput {
    pub fn new(operator_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            operator_id: operator_id.into(),
            agent_type: None,
            title: title.into(),
            max_retries: 3,
        }
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.operator_id.trim().is_empty() {
            return Err("operator_id cannot be empty".to_string());
        }
        if self.title.trim().is_empty() {
            return Err("title cannot be empty".to_string());
        }
        Ok(())
    }
}

/// A persisted agent spawn owned by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetTask {
    /// Unique identifier
    pub id: Uuid,
    /// Owning operator
    pub operator_id: String,
    /// Agent type to spawn
    pub agent_type: Option<String>,
    /// Human-readable title
    pub title: String,
    /// Current status
    pub status: FleetTaskStatus,
    /// Retry count
    pub retry_count: u32,
    /// Maximum retries
    pub max_retries: u32,
    /// Version for optimistic locking
    pub version: u64,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
}

impl FleetTask {
    /// Create a fresh task from an admitted spawn request.
    pub fn from_input(input: &SpawnInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            operator_id: input.operator_id.clone(),
            agent_type: input.agent_type.clone(),
            title: input.title.clone(),
            status: FleetTaskStatus::default(),
            retry_count: 0,
            max_retries: input.max_retries,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_transition_to(&self, new_status: FleetTaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, bumping the optimistic version counter.
    pub fn transition_to(&mut self, new_status: FleetTaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        self.version += 1;
        Ok(())
    }

    pub fn can_retry(&self) -> bool {
        self.status == FleetTaskStatus::Failed && self.retry_count < self.max_retries
    }

    /// Move a failed task back through `Retrying`, counting the attempt.
    pub fn retry(&mut self) -> Result<(), String> {
        if !self.can_retry() {
            return Err("Cannot retry: either not failed or max retries reached".to_string());
        }
        self.retry_count += 1;
        self.status = FleetTaskStatus::Retrying;
        self.updated_at = Utc::now();
        self.version += 1;
        Ok(())
    }
}

/// Derived, non-canonical snapshot of one operator's fleet standing.
///
/// The database row count over the active-status set is the only canonical
/// truth; this snapshot exists for observability and the governor's
/// invariant checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetState {
    pub operator_id: String,
    pub tier: ConvictionTier,
    pub active_count: u32,
    pub tier_limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tier_limits() {
        assert_eq!(ConvictionTier::Observer.default_limit(), 0);
        assert_eq!(ConvictionTier::Participant.default_limit(), 0);
        assert_eq!(ConvictionTier::Builder.default_limit(), 1);
        assert_eq!(ConvictionTier::Architect.default_limit(), 3);
        assert_eq!(ConvictionTier::Sovereign.default_limit(), 10);
    }

    #[test]
    fn test_tier_round_trip() {
        for tier in [
            ConvictionTier::Observer,
            ConvictionTier::Participant,
            ConvictionTier::Builder,
            ConvictionTier::Architect,
            ConvictionTier::Sovereign,
        ] {
            assert_eq!(ConvictionTier::from_str(tier.as_str()), Some(tier));
        }
        assert_eq!(ConvictionTier::from_str("emperor"), None);
    }

    #[test]
    fn test_active_set_matches_is_active() {
        for status in FleetTaskStatus::active_set() {
            assert!(status.is_active());
            assert!(!status.is_terminal());
        }
        assert!(!FleetTaskStatus::Merged.is_active());
        assert!(!FleetTaskStatus::Failed.is_active());
        assert!(!FleetTaskStatus::Abandoned.is_active());
        assert!(!FleetTaskStatus::Cancelled.is_active());
    }

    #[test]
    fn test_cancelled_has_no_outgoing_transitions() {
        // Structural enforcement: a cancelled task can never re-enter the
        // active set.
        assert!(FleetTaskStatus::Cancelled.valid_transitions().is_empty());
        for status in FleetTaskStatus::active_set() {
            assert!(!FleetTaskStatus::Cancelled.can_transition_to(*status));
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let input = SpawnInput::new("op-1", "Fix the flaky test");
        let mut task = FleetTask::from_input(&input);
        assert_eq!(task.status, FleetTaskStatus::Proposed);
        assert_eq!(task.version, 1);

        for next in [
            FleetTaskStatus::Spawning,
            FleetTaskStatus::Running,
            FleetTaskStatus::PrCreated,
            FleetTaskStatus::Reviewing,
            FleetTaskStatus::Ready,
            FleetTaskStatus::Merged,
        ] {
            task.transition_to(next).unwrap();
        }
        assert!(task.status.is_terminal());
        assert_eq!(task.version, 7);
    }

    #[test]
    fn test_retry_path() {
        let mut task = FleetTask::from_input(&SpawnInput::new("op-1", "t"));
        task.transition_to(FleetTaskStatus::Spawning).unwrap();
        task.transition_to(FleetTaskStatus::Failed).unwrap();

        assert!(task.can_retry());
        task.retry().unwrap();
        assert_eq!(task.status, FleetTaskStatus::Retrying);
        assert_eq!(task.retry_count, 1);
        assert!(task.status.is_active());

        // Retrying goes back through spawning
        task.transition_to(FleetTaskStatus::Spawning).unwrap();
    }

    #[test]
    fn test_retry_exhaustion() {
        let input = SpawnInput::new("op-1", "t").with_max_retries(1);
        let mut task = FleetTask::from_input(&input);
        task.transition_to(FleetTaskStatus::Spawning).unwrap();
        task.transition_to(FleetTaskStatus::Failed).unwrap();
        task.retry().unwrap();
        task.transition_to(FleetTaskStatus::Failed).unwrap();

        assert!(!task.can_retry());
        assert!(task.retry().is_err());
        task.transition_to(FleetTaskStatus::Abandoned).unwrap();
        assert!(task.status.is_terminal());
    }

    #[test]
    fn test_cancelled_task_cannot_retry() {
        let mut task = FleetTask::from_input(&SpawnInput::new("op-1", "t"));
        task.transition_to(FleetTaskStatus::Cancelled).unwrap();
        assert!(!task.can_retry());
        assert!(task.transition_to(FleetTaskStatus::Retrying).is_err());
        assert!(task.transition_to(FleetTaskStatus::Proposed).is_err());
    }

    #[test]
    fn test_spawn_input_validation() {
        assert!(SpawnInput::new("", "title").validate().is_err());
        assert!(SpawnInput::new("op", "  ").validate().is_err());
        assert!(SpawnInput::new("op", "title").validate().is_ok());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            FleetTaskStatus::Proposed,
            FleetTaskStatus::Spawning,
            FleetTaskStatus::Running,
            FleetTaskStatus::PrCreated,
            FleetTaskStatus::Reviewing,
            FleetTaskStatus::Ready,
            FleetTaskStatus::Retrying,
            FleetTaskStatus::Merged,
            FleetTaskStatus::Failed,
            FleetTaskStatus::Abandoned,
            FleetTaskStatus::Cancelled,
        ] {
            assert_eq!(FleetTaskStatus::from_str(status.as_str()), Some(status));
        }
        // Legacy spelling
        assert_eq!(
            FleetTaskStatus::from_str("canceled"),
            Some(FleetTaskStatus::Cancelled)
        );
    }
}
