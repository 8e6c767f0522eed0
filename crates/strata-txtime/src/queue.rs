//! # Pending Set
//!
//! Admitted packets waiting for release. Two shapes, chosen once at
//! construction:
//!
//! - [`TimeSortedList`] — packets owned by a slab arena, ordered through a
//!   `BTreeMap` keyed by `(txtime, insertion seq)`. The sequence number puts
//!   a newly inserted packet after every queued packet with the same
//!   `txtime`, so equal instants leave in arrival order.
//! - [`FifoList`] — plain arrival order; only the head is visible.
//!
//! Both hand out an [`EntryHandle`] from `peek` that identifies the exact
//! entry to remove afterwards.

use std::collections::{BTreeMap, VecDeque};

use slab::Slab;

use crate::packet::TxPacket;

/// Identifies one queued entry between a `peek` and the matching `remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle(usize);

// ─── Time-Sorted List ───────────────────────────────────────────────────────

struct Node {
    key: (i64, u64),
    packet: TxPacket,
}

/// Packets ordered by `txtime`, ties in insertion order.
///
/// O(log n) insert, peek and remove.
#[derive(Default)]
pub struct TimeSortedList {
    nodes: Slab<Node>,
    order: BTreeMap<(i64, u64), usize>,
    next_seq: u64,
    bytes: usize,
}

impl TimeSortedList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, packet: TxPacket) -> EntryHandle {
        let key = (packet.txtime, self.next_seq);
        self.next_seq = self.next_seq.wrapping_add(1);
        self.bytes += packet.len();
        let slot = self.nodes.insert(Node { key, packet });
        self.order.insert(key, slot);
        EntryHandle(slot)
    }

    pub fn peek(&self) -> Option<(EntryHandle, &TxPacket)> {
        let (_, &slot) = self.order.first_key_value()?;
        Some((EntryHandle(slot), &self.nodes[slot].packet))
    }

    /// Remove the entry behind `handle`, wherever it sits in the order.
    pub fn remove(&mut self, handle: EntryHandle) -> Option<TxPacket> {
        if !self.nodes.contains(handle.0) {
            debug_assert!(false, "removing entry {handle:?} that is not queued");
            return None;
        }
        let node = self.nodes.remove(handle.0);
        self.order.remove(&node.key);
        self.bytes -= node.packet.len();
        Some(node.packet)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total payload bytes queued.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn clear(&mut self) -> usize {
        let count = self.nodes.len();
        self.nodes.clear();
        self.order.clear();
        self.bytes = 0;
        count
    }

    /// Queued packets in release order.
    pub fn iter(&self) -> impl Iterator<Item = &TxPacket> + '_ {
        self.order.values().map(move |&slot| &self.nodes[slot].packet)
    }
}

// ─── FIFO List ──────────────────────────────────────────────────────────────

/// Packets in arrival order. Only the head can be peeked or removed.
#[derive(Default)]
pub struct FifoList {
    entries: VecDeque<(u64, TxPacket)>,
    next_seq: u64,
    bytes: usize,
}

impl FifoList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, packet: TxPacket) -> EntryHandle {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.bytes += packet.len();
        self.entries.push_back((seq, packet));
        EntryHandle(seq as usize)
    }

    pub fn peek(&self) -> Option<(EntryHandle, &TxPacket)> {
        self.entries
            .front()
            .map(|(seq, packet)| (EntryHandle(*seq as usize), packet))
    }

    /// Remove the head. `handle` must be the one `peek` returned.
    pub fn remove(&mut self, handle: EntryHandle) -> Option<TxPacket> {
        match self.entries.front() {
            Some((seq, _)) if *seq as usize == handle.0 => {
                let (_, packet) = self.entries.pop_front()?;
                self.bytes -= packet.len();
                Some(packet)
            }
            _ => {
                debug_assert!(false, "removing entry {handle:?} that is not the FIFO head");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.bytes = 0;
        count
    }

    pub fn iter(&self) -> impl Iterator<Item = &TxPacket> + '_ {
        self.entries.iter().map(|(_, packet)| packet)
    }
}

// ─── Pending Queue ──────────────────────────────────────────────────────────

/// The scheduler's pending set, in whichever mode was configured.
pub enum PendingQueue {
    TimeSorted(TimeSortedList),
    Fifo(FifoList),
}

impl PendingQueue {
    pub fn new(sorting: bool) -> Self {
        if sorting {
            PendingQueue::TimeSorted(TimeSortedList::new())
        } else {
            PendingQueue::Fifo(FifoList::new())
        }
    }

    pub fn is_sorted(&self) -> bool {
        matches!(self, PendingQueue::TimeSorted(_))
    }

    pub fn insert(&mut self, packet: TxPacket) -> EntryHandle {
        match self {
            PendingQueue::TimeSorted(list) => list.insert(packet),
            PendingQueue::Fifo(list) => list.insert(packet),
        }
    }

    /// The next packet in release order, without removing it.
    pub fn peek(&self) -> Option<(EntryHandle, &TxPacket)> {
        match self {
            PendingQueue::TimeSorted(list) => list.peek(),
            PendingQueue::Fifo(list) => list.peek(),
        }
    }

    pub fn remove(&mut self, handle: EntryHandle) -> Option<TxPacket> {
        match self {
            PendingQueue::TimeSorted(list) => list.remove(handle),
            PendingQueue::Fifo(list) => list.remove(handle),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PendingQueue::TimeSorted(list) => list.len(),
            PendingQueue::Fifo(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> usize {
        match self {
            PendingQueue::TimeSorted(list) => list.bytes(),
            PendingQueue::Fifo(list) => list.bytes(),
        }
    }

    /// Drop every queued packet. Returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        match self {
            PendingQueue::TimeSorted(list) => list.clear(),
            PendingQueue::Fifo(list) => list.clear(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &TxPacket> + '_> {
        match self {
            PendingQueue::TimeSorted(list) => Box::new(list.iter()),
            PendingQueue::Fifo(list) => Box::new(list.iter()),
        }
    }
}
