/// Shared kernel for the gossip wire protocol: nodes, verbs and messages
pub(crate) mod address;
pub(crate) mod broadcast;
pub(crate) mod message;
pub(crate) mod node;
pub(crate) mod verb;
