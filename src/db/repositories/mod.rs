//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the operations for a specific entity.

pub mod activity;
pub mod message;
pub mod participant;
pub mod plan;
pub mod preference;

pub use activity::{ActivityRepository, SqlxActivityRepository};
pub use message::{MessageRepository, SqlxMessageRepository};
pub use participant::{ParticipantRepository, SqlxParticipantRepository};
pub use plan::{PlanRepository, SqlxPlanRepository};
pub use preference::{PreferenceRepository, SqlxPreferenceRepository};
