pub(crate) mod actor;
mod broadcast_queue;
mod gossip_buffer;
mod livenode_tracker;
mod messages;
pub(crate) mod swim;

use broadcast_queue::*;
use gossip_buffer::*;
use livenode_tracker::*;
pub(crate) use messages::*;
