//! Entity registry: persisted desired state of every subscription.

mod manager;
mod store;

pub use manager::{EntityRegistry, RemoveOutcome};
pub use store::{FileRegistryStore, RegistryStore};
