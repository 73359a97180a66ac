//! Core runtime: the turn executor and the services it leans on.
//!
//! Entry point: [`start_turn`] admits a user message and returns a
//! [`TurnHandle`] whose channel yields [`TurnEvent`]s suitable for SSE or
//! non-streaming aggregation.

pub mod commitments;
pub mod enrichment;
pub mod error;
pub mod idempotency;
pub mod moderation;
pub mod prompt;
pub mod quota;
pub mod turn;

pub use commitments::CommitmentDetector;
pub use enrichment::{EnrichmentPool, TurnSummary};
pub use error::TurnError;
pub use idempotency::{IdempotencyCheck, IdempotencyGuard};
pub use moderation::{BlocklistModerator, Moderator, Verdict};
pub use turn::{collect, start_turn, TurnEvent, TurnHandle, TurnInput, TurnMode};
