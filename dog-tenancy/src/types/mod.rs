pub mod events;
pub mod ids;
pub mod operation;
pub mod tier;

pub use events::GateEvent;
pub use ids::MigrationHandle;
pub use operation::{Document, Filter, OpKind, OpOutcome, Operation, ID_FIELD};
pub use tier::{PhysicalTarget, TenantTierRecord, Tier};
