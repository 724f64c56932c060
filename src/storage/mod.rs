pub mod memory;
pub mod postgrest;
pub mod traits;

pub use memory::MemoryRecordStore;
pub use postgrest::PostgrestRecordStore;
pub use traits::{ItemRecord, RecordStore, SharedRecordStore};
