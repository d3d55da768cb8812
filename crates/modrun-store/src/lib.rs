pub mod error;
pub mod memory;
pub mod records;
pub mod redb_store;
pub mod store;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use records::{AssetRecord, ModuleRecord, TaskRecord};
pub use redb_store::RedbStore;
pub use store::DocumentStore;
