//! Tier migration: `Idle → Provisioning → Backfilling → Cutover → Idle`.
//!
//! The old target stays authoritative until the single registry swap at
//! cutover. Writes made while records are being copied are journaled and
//! replayed on the new target while the tenant's writes are held.

pub mod barrier;
pub mod coordinator;
pub mod journal;
pub mod reaper;
pub mod state;

pub use barrier::{CutoverHold, WriteBarrier, WritePermit};
pub use coordinator::MigrationCoordinator;
pub use journal::{JournalEntry, JournalLog, WriteJournal};
pub use reaper::{RetentionReaper, RetiredTarget};
pub use state::{MigrationOutcome, MigrationState, MigrationStatus};
