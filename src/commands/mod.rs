pub mod areas;
pub mod events;
pub mod sync;

// Re-export command functions for convenience
pub use areas::areas;
pub use events::events;
pub use sync::{sync, SyncParams};
