pub mod bridge;
pub mod error;
pub mod memory;
pub mod model;
pub mod rule;
pub mod status;

pub use bridge::{Bridge, Ownership};
pub use error::{BridgeError, ResourceKind};
pub use memory::{BridgeSnapshot, InMemoryBridge};
