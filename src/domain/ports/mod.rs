//! Ports: async traits at the persistence seams.

pub mod fleet_task_store;
pub mod reputation_store;

pub use fleet_task_store::{AdmissionOutcome, FleetTaskStore};
pub use reputation_store::ReputationStore;
