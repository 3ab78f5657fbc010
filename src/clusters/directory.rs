use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;

use crate::clusters::{AddressFamily, GossipError, Node, NodeStatus, Result};

/// Resolves wire addresses to shared [`Node`]s.
///
/// Decoding asks for every address it sees. A miss creates a transient node
/// (status `Unknown`); whether it becomes a member is the state machine's call.
/// Concurrent callers racing on one address must all receive the same node.
pub trait NodeDirectory: Send + Sync {
    fn lookup_or_create(&self, addr: SocketAddr) -> Result<Arc<Node>>;
}

/// Every node this process has heard of, keyed by canonical address.
#[derive(Debug)]
pub struct KnownNodes {
    family: AddressFamily,
    nodes: DashMap<SocketAddr, Arc<Node>>,
}

impl KnownNodes {
    pub fn new(family: AddressFamily) -> Self {
        Self {
            family,
            nodes: DashMap::new(),
        }
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn get(&self, addr: SocketAddr) -> Option<Arc<Node>> {
        let addr = self.family.canonicalize(addr)?;
        self.nodes.get(&addr).map(|n| n.value().clone())
    }

    /// Nodes the membership layer has admitted (any status but `Unknown`).
    pub fn admitted(&self) -> Vec<Arc<Node>> {
        self.filtered(|n| n.is_admitted())
    }

    pub fn healthy(&self) -> Vec<Arc<Node>> {
        self.filtered(|n| n.status() == NodeStatus::Alive)
    }

    fn filtered(&self, keep: impl Fn(&Node) -> bool) -> Vec<Arc<Node>> {
        let mut nodes: Vec<Arc<Node>> = self
            .nodes
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        nodes.sort_by_key(|n| n.addr());
        nodes
    }
}

impl NodeDirectory for KnownNodes {
    fn lookup_or_create(&self, addr: SocketAddr) -> Result<Arc<Node>> {
        let canonical = self
            .family
            .canonicalize(addr)
            .ok_or(GossipError::UnresolvableAddress(addr))?;

        let node = self
            .nodes
            .entry(canonical)
            .or_insert_with(|| Arc::new(Node::new(canonical)));
        Ok(node.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn lookup_or_create_returns_the_same_node() {
        let dir = KnownNodes::new(AddressFamily::V4);
        let a = dir.lookup_or_create(addr("10.0.0.1:7946")).unwrap();
        let b = dir.lookup_or_create(addr("10.0.0.1:7946")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn created_nodes_are_not_admitted() {
        let dir = KnownNodes::new(AddressFamily::V4);
        dir.lookup_or_create(addr("10.0.0.1:7946")).unwrap();
        assert!(dir.admitted().is_empty());

        dir.lookup_or_create(addr("10.0.0.2:7946"))
            .unwrap()
            .set_status(NodeStatus::Suspected);
        assert_eq!(dir.admitted().len(), 1);
        assert!(dir.healthy().is_empty());
    }

    #[test]
    fn mapped_and_plain_ipv4_share_one_node() {
        let dir = KnownNodes::new(AddressFamily::V4);
        let a = dir.lookup_or_create(addr("10.0.0.1:7946")).unwrap();
        let b = dir.lookup_or_create(addr("[::ffff:10.0.0.1]:7946")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn foreign_family_is_unresolvable() {
        let dir = KnownNodes::new(AddressFamily::V4);
        let v6 = addr("[2001:db8::1]:7946");
        assert_eq!(
            dir.lookup_or_create(v6).unwrap_err(),
            GossipError::UnresolvableAddress(v6)
        );
    }

    #[test]
    fn concurrent_creation_yields_a_single_node() {
        let dir = Arc::new(KnownNodes::new(AddressFamily::V4));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dir = dir.clone();
                std::thread::spawn(move || dir.lookup_or_create(addr("10.0.0.9:1")).unwrap())
            })
            .collect();

        let nodes: Vec<Arc<Node>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(nodes.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
