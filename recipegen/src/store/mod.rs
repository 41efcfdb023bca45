//! Persistence and object storage collaborators.

mod gateway;
mod local;
mod memory;

#[cfg(test)]
pub use gateway::{MockObjectStorage, MockPersistenceGateway};
pub use gateway::{image_key, ObjectStorage, PersistenceGateway};
pub use local::LocalObjectStorage;
pub use memory::{InMemoryObjectStorage, InMemoryStore, StoreOp};
