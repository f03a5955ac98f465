//! Per-compartment state bookkeeping: tracked states, their cached
//! dictionaries and the arena they live in.
//!
//! Every outgoing message is tracked as a [`StateNode`] until the engine can
//! prove the peer no longer needs it. Nodes reference each other through
//! stable [`StateKey`] handles into a [`StateTable`] arena; an ordered list
//! preserves send order for the protocol's scan semantics.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use bytes::Bytes;

use crate::algorithm::CompressionStream;
use crate::types::{FullStateId, Priority, SequenceId, StateId, StateKey};

/// Locally cached representation of a state's dictionary.
#[derive(Debug, Default)]
pub enum StateCache {
    /// Nothing cached; the state cannot become the compression basis.
    #[default]
    None,
    /// Plaintext copy of the message; must be absorbed into a stream context
    /// before use.
    Plain(Bytes),
    /// Live compression context, ready to compress from.
    Stream(Box<dyn CompressionStream>),
}

impl StateCache {
    /// Whether this cache holds a live stream context.
    pub fn is_stream(&self) -> bool {
        matches!(self, StateCache::Stream(_))
    }

    /// Takes the cache out, leaving `None` behind.
    pub fn take(&mut self) -> StateCache {
        std::mem::take(self)
    }
}

/// One tracked state: a snapshot of the compression dictionary the peer holds
/// (or will hold) after decompressing a particular message.
#[derive(Debug, Default)]
pub struct StateNode {
    /// Local identity: (wrap count, priority, sequence id).
    pub fid: FullStateId,
    /// Identity of the state this one was compressed against.
    pub dfid: FullStateId,
    /// SHA-1 state id announced to the peer.
    pub sid: StateId,
    /// Peer-side footprint in bytes; 0 when the message did not ask the peer
    /// to save state.
    pub state_size: usize,
    /// Peer-message counter value when this state was sent.
    pub send_time: u32,
    /// Wall-clock second when this state was sent.
    pub send_time_sec: u32,
    /// Peer-message counter value when the acknowledgment arrived.
    pub acked_time: u32,
    /// Wall-clock second when the acknowledgment arrived.
    pub acked_time_sec: u32,
    /// Wall-clock second of the most recent message compressed against this
    /// state while no dependent node was recorded for it.
    pub last_dependent_time: u32,
    /// How many messages have carried a removal request for this state.
    pub delete_requests_sent: u32,
    /// States whose removal this message requested.
    pub remove_requests: Vec<FullStateId>,
    /// The state this one was compressed against, while unacknowledged.
    pub dad: Option<StateKey>,
    /// Head of this state's chain of unacknowledged dependents.
    pub first_dependent: Option<StateKey>,
    /// Next sibling in the dad's dependent chain.
    pub next_dependent: Option<StateKey>,
    /// Local dictionary cache.
    pub cache: StateCache,
    /// Peer confirmed it saved this state (or transport reliability implies it).
    pub acked: bool,
    /// The message asked the peer to save state.
    pub creates_state: bool,
    /// The saved state contains the UDVM bytecode, so later messages can
    /// reference it by state id instead of re-uploading code.
    pub includes_bytecode: bool,
    /// Never eligible for deletion (the bootstrap state).
    pub persistent: bool,
    /// This state has served as the compression basis at least once.
    pub served_as_active: bool,
    /// Scratch flag: current removal scan judged this state safe to delete.
    pub may_be_deleted: bool,
    /// Scratch flag: selected as a removal candidate in the current pass.
    pub marked: bool,
}

/// Arena of tracked states plus the send-ordered list and cache accounting.
#[derive(Debug)]
pub struct StateTable {
    nodes: HashMap<StateKey, StateNode>,
    /// Send order of list members. Detached nodes (the bootstrap state) live
    /// in the arena but not here.
    order: Vec<StateKey>,
    next_key: u32,
    max_states: usize,
    peak_states: usize,
    /// Bytes of cached plaintext.
    total_size: usize,
    max_total_size: usize,
    peak_total_size: usize,
    /// Live stream contexts, the bootstrap stream included.
    cached_streams: usize,
    max_cached_streams: usize,
}

impl StateTable {
    /// Creates an empty table with the given budgets.
    pub fn new(max_states: usize, max_total_size: usize, max_cached_streams: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            next_key: 0,
            max_states,
            peak_states: 0,
            total_size: 0,
            max_total_size,
            peak_total_size: 0,
            cached_streams: 0,
            max_cached_streams,
        }
    }

    fn alloc_key(&mut self) -> StateKey {
        let key = StateKey::new(self.next_key);
        self.next_key += 1;
        key
    }

    /// Inserts a node into the arena without listing it (bootstrap state).
    pub fn insert_detached(&mut self, node: StateNode) -> StateKey {
        let key = self.alloc_key();
        self.nodes.insert(key, node);
        key
    }

    /// Appends a node to the send-ordered list.
    pub fn push_back(&mut self, node: StateNode) -> StateKey {
        let key = self.alloc_key();
        self.nodes.insert(key, node);
        self.order.push(key);
        self.peak_states = self.peak_states.max(self.order.len());
        key
    }

    /// Looks up a node by key.
    pub fn get(&self, key: StateKey) -> Option<&StateNode> {
        self.nodes.get(&key)
    }

    /// Looks up a node mutably by key.
    pub fn get_mut(&mut self, key: StateKey) -> Option<&mut StateNode> {
        self.nodes.get_mut(&key)
    }

    /// Finds a listed state by the wire identity `(prio, zid)`.
    pub fn find_by_wire_fid(&self, prio: Priority, zid: SequenceId) -> Option<StateKey> {
        self.order
            .iter()
            .copied()
            .find(|k| self.nodes[k].fid.prio == prio && self.nodes[k].fid.zid == zid)
    }

    /// Finds a listed state by full identity, wrap count included.
    pub fn find_by_fid(&self, fid: FullStateId) -> Option<StateKey> {
        self.order.iter().copied().find(|k| self.nodes[k].fid == fid)
    }

    /// Removes a node from the arena and the list, maintaining the dependency
    /// links of its neighbours. The node is returned so the caller can
    /// dispose of its cache.
    pub fn remove(&mut self, key: StateKey) -> Option<StateNode> {
        if !self.nodes.contains_key(&key) {
            return None;
        }
        self.unlink_dependent(key);
        self.orphan_dependents(key);
        self.order.retain(|k| *k != key);
        self.nodes.remove(&key)
    }

    /// Records `child` as an unacknowledged dependent of `dad`.
    pub fn add_dependent(&mut self, dad: StateKey, child: StateKey) {
        let (dad_fid, dad_first) = {
            let d = &self.nodes[&dad];
            (d.fid, d.first_dependent)
        };
        if let Some(c) = self.nodes.get_mut(&child) {
            c.dfid = dad_fid;
            c.dad = Some(dad);
            c.next_dependent = dad_first;
        }
        if let Some(d) = self.nodes.get_mut(&dad) {
            d.first_dependent = Some(child);
        }
    }

    /// Splices `child` out of its dad's dependent chain, if it is in one.
    pub fn unlink_dependent(&mut self, child: StateKey) {
        let Some(dad) = self.nodes.get(&child).and_then(|c| c.dad) else {
            return;
        };
        let child_next = self.nodes[&child].next_dependent;

        if let Some(d) = self.nodes.get_mut(&dad) {
            if d.first_dependent == Some(child) {
                d.first_dependent = child_next;
            } else {
                let mut cur = d.first_dependent;
                while let Some(k) = cur {
                    let next = self.nodes[&k].next_dependent;
                    if next == Some(child) {
                        if let Some(n) = self.nodes.get_mut(&k) {
                            n.next_dependent = child_next;
                        }
                        break;
                    }
                    cur = next;
                }
            }
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.dad = None;
            c.next_dependent = None;
        }
    }

    /// Detaches all dependents of `key` (used when `key` is being removed).
    fn orphan_dependents(&mut self, key: StateKey) {
        let mut chain = Vec::new();
        let mut cur = self.nodes.get(&key).and_then(|n| n.first_dependent);
        while let Some(k) = cur {
            chain.push(k);
            cur = self.nodes.get(&k).and_then(|n| n.next_dependent);
        }
        for k in chain {
            if let Some(n) = self.nodes.get_mut(&k) {
                n.dad = None;
                n.next_dependent = None;
            }
        }
        if let Some(n) = self.nodes.get_mut(&key) {
            n.first_dependent = None;
        }
    }

    /// Send-ordered list of tracked states.
    pub fn order(&self) -> &[StateKey] {
        &self.order
    }

    /// Number of listed states.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ceiling on listed states.
    pub fn max_states(&self) -> usize {
        self.max_states
    }

    /// High-water mark of listed states.
    pub fn peak_states(&self) -> usize {
        self.peak_states
    }

    /// Bytes of plaintext currently cached.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Plaintext cache budget in bytes.
    pub fn max_total_size(&self) -> usize {
        self.max_total_size
    }

    /// High-water mark of cached plaintext bytes.
    pub fn peak_total_size(&self) -> usize {
        self.peak_total_size
    }

    /// Live stream contexts.
    pub fn cached_streams(&self) -> usize {
        self.cached_streams
    }

    /// Stream context budget.
    pub fn max_cached_streams(&self) -> usize {
        self.max_cached_streams
    }

    /// Accounts for a new cached plaintext copy.
    pub(crate) fn note_plain_cached(&mut self, len: usize) {
        self.total_size += len;
        self.peak_total_size = self.peak_total_size.max(self.total_size);
    }

    /// Accounts for a released plaintext copy.
    pub(crate) fn note_plain_released(&mut self, len: usize) {
        self.total_size = self.total_size.saturating_sub(len);
    }

    /// Accounts for a new live stream context.
    pub(crate) fn note_stream_cached(&mut self) {
        self.cached_streams += 1;
    }

    /// Accounts for a released stream context.
    pub(crate) fn note_stream_released(&mut self) {
        self.cached_streams = self.cached_streams.saturating_sub(1);
    }
}

impl Index<StateKey> for StateTable {
    type Output = StateNode;

    fn index(&self, key: StateKey) -> &StateNode {
        &self.nodes[&key]
    }
}

impl IndexMut<StateKey> for StateTable {
    fn index_mut(&mut self, key: StateKey) -> &mut StateNode {
        self.nodes.get_mut(&key).unwrap_or_else(|| {
            panic!("state {key} not in arena");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_with_fid(prio: u16, zid: u16) -> StateNode {
        StateNode {
            fid: FullStateId::new(0, prio, zid),
            ..Default::default()
        }
    }

    #[test]
    fn cache_take_leaves_none() {
        let mut cache = StateCache::Plain(Bytes::from_static(b"dict"));
        assert!(!cache.is_stream());
        assert!(matches!(cache.take(), StateCache::Plain(_)));
        assert!(matches!(cache, StateCache::None));
        assert!(!cache.is_stream());
    }

    #[test]
    fn push_and_find_by_wire_fid() {
        let mut table = StateTable::new(8, 1024, 2);
        let k1 = table.push_back(node_with_fid(1, 1));
        let k2 = table.push_back(node_with_fid(2, 2));

        assert_eq!(table.len(), 2);
        assert_eq!(table.order(), &[k1, k2]);
        assert_eq!(
            table.find_by_wire_fid(Priority::new(2), SequenceId::new(2)),
            Some(k2)
        );
        assert_eq!(
            table.find_by_wire_fid(Priority::new(2), SequenceId::new(3)),
            None
        );
    }

    #[test]
    fn detached_nodes_stay_off_the_list() {
        let mut table = StateTable::new(8, 1024, 2);
        let init = table.insert_detached(node_with_fid(0, 0));
        assert!(table.is_empty());
        assert!(table.get(init).is_some());
        assert_eq!(
            table.find_by_wire_fid(Priority::new(0), SequenceId::new(0)),
            None
        );
    }

    #[test]
    fn dependent_chain_link_and_unlink() {
        let mut table = StateTable::new(8, 1024, 2);
        let dad = table.push_back(node_with_fid(1, 1));
        let c1 = table.push_back(node_with_fid(2, 2));
        let c2 = table.push_back(node_with_fid(3, 3));
        table.add_dependent(dad, c1);
        table.add_dependent(dad, c2);

        // Chain is LIFO: newest dependent first.
        assert_eq!(table[dad].first_dependent, Some(c2));
        assert_eq!(table[c2].next_dependent, Some(c1));
        assert_eq!(table[c1].dfid, table[dad].fid);

        table.unlink_dependent(c2);
        assert_eq!(table[dad].first_dependent, Some(c1));
        assert_eq!(table[c2].dad, None);

        table.unlink_dependent(c1);
        assert_eq!(table[dad].first_dependent, None);
    }

    #[test]
    fn remove_orphans_dependents() {
        let mut table = StateTable::new(8, 1024, 2);
        let dad = table.push_back(node_with_fid(1, 1));
        let child = table.push_back(node_with_fid(2, 2));
        table.add_dependent(dad, child);

        let removed = table.remove(dad);
        assert!(removed.is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table[child].dad, None);
        assert!(table.remove(dad).is_none());
    }

    #[test]
    fn unlink_from_middle_of_chain() {
        let mut table = StateTable::new(8, 1024, 2);
        let dad = table.push_back(node_with_fid(1, 1));
        let c1 = table.push_back(node_with_fid(2, 1));
        let c2 = table.push_back(node_with_fid(3, 1));
        let c3 = table.push_back(node_with_fid(4, 1));
        table.add_dependent(dad, c1);
        table.add_dependent(dad, c2);
        table.add_dependent(dad, c3);

        // Chain: c3 -> c2 -> c1. Remove the middle link.
        table.unlink_dependent(c2);
        assert_eq!(table[dad].first_dependent, Some(c3));
        assert_eq!(table[c3].next_dependent, Some(c1));
        assert_eq!(table[c1].next_dependent, None);
    }

    #[test]
    fn cache_accounting_tracks_peaks() {
        let mut table = StateTable::new(8, 1024, 2);
        table.note_plain_cached(600);
        table.note_plain_cached(200);
        table.note_plain_released(600);
        assert_eq!(table.total_size(), 200);
        assert_eq!(table.peak_total_size(), 800);

        table.note_stream_cached();
        table.note_stream_cached();
        table.note_stream_released();
        assert_eq!(table.cached_streams(), 1);
    }
}
