//! Record storage with optimistic concurrency and change events.

mod error;
mod event;
mod memory;
mod record;
mod traits;

pub use error::{Result, StoreError};
pub use event::WatchEvent;
pub use memory::MemoryStore;
pub use record::{Metadata, Record, ResourceVersion, Versioned};
pub use traits::ResourceStore;
