pub mod calendar;
pub mod notify;
pub mod storage;
pub mod sync;

pub use calendar::{EventType, Family, FamilyMember, LocalEvent};
pub use storage::{Config, Store};
pub use sync::{SyncEngine, SyncError};
