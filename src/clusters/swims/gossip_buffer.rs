use crate::clusters::types::message::member_len;
use crate::clusters::{AddressFamily, MessageMember};

// UDP does not handle splitting large messages up.
// Preventing IP fragmentation is therefore necessary unless we have dedicated fragmentation handling logic.
pub(super) const MAX_GOSSIP_BYTES: usize = 900;

// a standard Vec is often faster than all of the alternatives like priority queue or hash map with entries being 64.
const MAX_ENTRIES: usize = 64;
pub(super) const LAMBDA: u32 = 3;

#[derive(Default)]
pub(super) struct GossipBuffer {
    entries: Vec<GossipEntry>,
}

#[derive(PartialEq, Eq)]
struct GossipEntry {
    member: MessageMember,
    remaining: u32,
}

impl PartialOrd for GossipEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for GossipEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // descending: the freshest update goes out first
        other.remaining.cmp(&self.remaining)
    }
}

impl GossipBuffer {
    pub(super) fn enqueue(&mut self, member: MessageMember, cluster_size: usize) {
        let remaining = dissemination_count(cluster_size);

        // 1. Remove existing entry if it's already in the buffer
        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.member.node == member.node)
        {
            self.entries.remove(pos);
        }

        if self.entries.len() >= MAX_ENTRIES {
            // Because the Vec is always sorted descending by `remaining`,
            // the least-used entry is ALWAYS at the very end.
            self.entries.pop();
        }

        // Find exact insertion point
        let insert_pos = self
            .entries
            .binary_search_by(|e| e.remaining.cmp(&remaining).reverse()) // reverse is to search in desc order
            .unwrap_or_else(|pos| pos);

        self.entries
            .insert(insert_pos, GossipEntry { member, remaining });
    }

    /// Takes up to `max_members` updates that fit the datagram budget.
    pub(super) fn collect(&mut self, family: AddressFamily, max_members: usize) -> Vec<MessageMember> {
        let fitting = (MAX_GOSSIP_BYTES / member_len(family)).min(max_members);

        let result: Vec<MessageMember> = self
            .entries
            .iter()
            .take(fitting)
            .map(|e| e.member.clone())
            .collect();

        for entry in self.entries.iter_mut().take(result.len()) {
            entry.remaining = entry.remaining.saturating_sub(1);
        }

        self.entries.retain(|e| e.remaining > 0);
        self.entries.sort();

        result
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// computes LAMBDA * ceil(log₂(N)) (LAMBDA=3, minimum 3) for O(log N) convergence
#[inline]
pub(super) fn dissemination_count(cluster_size: usize) -> u32 {
    if cluster_size <= 1 {
        return LAMBDA;
    }
    let n = cluster_size as f64;
    let count = LAMBDA * (n.log2().ceil() as u32);
    count.max(LAMBDA)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::{KnownNodes, NodeDirectory, NodeStatus};
    use std::net::SocketAddr;
    use std::sync::Arc;

    const V4: AddressFamily = AddressFamily::V4;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn member(dir: &KnownNodes, port: u16, status: NodeStatus, heartbeat: u32) -> MessageMember {
        MessageMember {
            node: dir.lookup_or_create(addr(port)).unwrap(),
            status,
            heartbeat,
            source: None,
        }
    }

    #[test]
    fn enqueue_and_collect_returns_members() {
        let dir = KnownNodes::new(V4);
        let mut buf = GossipBuffer::default();
        buf.enqueue(member(&dir, 1, NodeStatus::Alive, 0), 10);
        buf.enqueue(member(&dir, 2, NodeStatus::Dead, 5), 10);

        let result = buf.collect(V4, 62);
        assert_eq!(result.len(), 2);

        let addrs: Vec<_> = result.iter().map(|m| m.node.addr()).collect();
        assert!(addrs.contains(&addr(1)));
        assert!(addrs.contains(&addr(2)));
    }

    #[test]
    fn collect_decrements_remaining_and_eventually_drains() {
        let dir = KnownNodes::new(V4);
        let mut buf = GossipBuffer::default();
        // cluster_size=2 → dissemination_count = 3 * ceil(log2(2)) = 3
        buf.enqueue(member(&dir, 1, NodeStatus::Alive, 0), 2);

        for _ in 0..3 {
            assert_eq!(buf.collect(V4, 62).len(), 1);
        }

        // After 3 collects, remaining hit 0 and entry was removed
        assert!(buf.collect(V4, 62).is_empty());
    }

    #[test]
    fn duplicate_node_resets_remaining() {
        let dir = KnownNodes::new(V4);
        let mut buf = GossipBuffer::default();
        buf.enqueue(member(&dir, 1, NodeStatus::Alive, 0), 2);

        buf.collect(V4, 62);
        buf.collect(V4, 62);

        // Re-enqueue same node with new status
        buf.enqueue(member(&dir, 1, NodeStatus::Dead, 1), 2);
        assert_eq!(buf.len(), 1);

        let r1 = buf.collect(V4, 62);
        assert_eq!(r1[0].status, NodeStatus::Dead);
        assert_eq!(buf.collect(V4, 62).len(), 1);
        assert_eq!(buf.collect(V4, 62).len(), 1);
        assert!(buf.collect(V4, 62).is_empty());
    }

    #[test]
    fn newest_entries_prioritized_over_oldest() {
        let dir = KnownNodes::new(V4);
        let mut buf = GossipBuffer::default();

        buf.enqueue(member(&dir, 1, NodeStatus::Alive, 0), 4);
        buf.collect(V4, 62);

        // Fresh entry has a higher remaining count
        buf.enqueue(member(&dir, 2, NodeStatus::Dead, 1), 4);

        let result = buf.collect(V4, 62);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].node.addr(), addr(2));
        assert_eq!(result[1].node.addr(), addr(1));
    }

    #[test]
    fn collect_respects_member_and_byte_budget() {
        let dir = KnownNodes::new(V4);
        let mut buf = GossipBuffer::default();
        for i in 0..60 {
            buf.enqueue(member(&dir, i + 1, NodeStatus::Alive, 0), 100);
        }

        assert_eq!(buf.collect(V4, 5).len(), 5);
        // 900 / 17 = 52 IPv4 slots fit.
        assert_eq!(buf.collect(V4, 62).len(), 52);
        // 900 / 41 = 21 IPv6 slots fit.
        assert_eq!(buf.collect(AddressFamily::V6, 62).len(), 21);
    }

    #[test]
    fn evicts_lowest_remaining_when_full() {
        let dir = KnownNodes::new(V4);
        let mut buf = GossipBuffer::default();

        for i in 0..MAX_ENTRIES {
            buf.enqueue(member(&dir, i as u16 + 1, NodeStatus::Alive, 0), 10);
        }
        buf.collect(V4, 62);

        let fresh = member(&dir, 999, NodeStatus::Dead, 5);
        let fresh_node: Arc<_> = fresh.node.clone();
        buf.enqueue(fresh, 10);

        assert_eq!(buf.len(), MAX_ENTRIES);
        let result = buf.collect(V4, 62);
        assert!(result.iter().any(|m| m.node == fresh_node));
    }

    #[test]
    fn dissemination_count_scales_with_cluster_size() {
        assert_eq!(dissemination_count(1), 3);
        // ceil(log2(2)) = 1, 3*1 = 3
        assert_eq!(dissemination_count(2), 3);
        // ceil(log2(4)) = 2, 3*2 = 6
        assert_eq!(dissemination_count(4), 6);
        // ceil(log2(8)) = 3, 3*3 = 9
        assert_eq!(dissemination_count(8), 9);
        // ceil(log2(100)) = 7, 3*7 = 21
        assert_eq!(dissemination_count(100), 21);
        // ceil(log2(1000)) = 10, 3*10 = 30
        assert_eq!(dissemination_count(1000), 30);
    }
}
