pub mod node;
pub mod types;

pub use types::{Node, NodeError, NodeResult};
