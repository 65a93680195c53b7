//! Persistence layer modules.

pub mod atomic;
pub mod feature_store;
pub mod lock;
pub mod session_store;

pub use feature_store::{FeatureStore, FileFeatureStore};
pub use session_store::SessionStore;
