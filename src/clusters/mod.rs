pub mod codec;
mod directory;
mod error;
mod handle;
pub(crate) mod swims;
pub(crate) mod transport;
mod types;


pub use directory::{KnownNodes, NodeDirectory};
pub use error::{GossipError, Result};
pub use handle::{ClusterHandle, ClusterOptions};
pub use types::address::AddressFamily;
pub use types::broadcast::Broadcast;
pub use types::message::{Decoded, Message, MessageMember};
pub use types::node::{Node, NodeStatus};
pub use types::verb::MessageVerb;
pub(crate) use swims::SwimEvent;
pub(crate) use swims::swim::max_broadcast_payload;
