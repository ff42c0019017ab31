//! Fd-keyed slot tables for connections and listeners.
//!
//! Slots live in a vector that grows by [`TABLE_GROWTH`] vacant slots when
//! full. Each slot carries a generation that changes on removal, so a
//! [`SlotId`] held past a removal is detected instead of aliasing a new entry.
//! The table stores records only; closing sockets is the owner's job.

use crate::error::{Result, SessionError};
use crate::reassembly::Reassembly;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use tracing::warn;

/// Slots added whenever the table is full
pub const TABLE_GROWTH: usize = 10;

/// Index of a live slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
enum Slot<T> {
    Vacant { generation: u32 },
    Live { generation: u32, fd: RawFd, value: T },
}

/// Slot table with an fd index
#[derive(Debug)]
pub struct FdTable<T> {
    slots: Vec<Slot<T>>,
    by_fd: HashMap<RawFd, usize>,
}

impl<T> Default for FdTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FdTable<T> {
    /// Empty table
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_fd: HashMap::new(),
        }
    }

    /// Store `value` for `fd` in the first vacant slot.
    ///
    /// An fd that is already present keeps its slot and gets the new value.
    pub fn put(&mut self, fd: RawFd, value: T) -> SlotId {
        if let Some(&index) = self.by_fd.get(&fd) {
            warn!("fd {} is already registered, replacing its entry", fd);
            if let Slot::Live { generation, value: old, .. } = &mut self.slots[index] {
                *old = value;
                return SlotId {
                    index,
                    generation: *generation,
                };
            }
        }

        let index = match self
            .slots
            .iter()
            .position(|slot| matches!(slot, Slot::Vacant { .. }))
        {
            Some(index) => index,
            None => {
                let index = self.slots.len();
                self.slots
                    .extend((0..TABLE_GROWTH).map(|_| Slot::Vacant { generation: 0 }));
                index
            }
        };

        let generation = match self.slots[index] {
            Slot::Vacant { generation } => generation,
            Slot::Live { generation, .. } => generation,
        };
        self.slots[index] = Slot::Live {
            generation,
            fd,
            value,
        };
        self.by_fd.insert(fd, index);
        SlotId { index, generation }
    }

    /// Slot of `fd`, if present
    pub fn find(&self, fd: RawFd) -> Option<SlotId> {
        let index = *self.by_fd.get(&fd)?;
        match self.slots[index] {
            Slot::Live { generation, .. } => Some(SlotId { index, generation }),
            Slot::Vacant { .. } => None,
        }
    }

    /// Whether `fd` has a live slot
    pub fn contains(&self, fd: RawFd) -> bool {
        self.by_fd.contains_key(&fd)
    }

    /// Fd stored in a slot
    pub fn fd(&self, id: SlotId) -> Result<RawFd> {
        match self.slots.get(id.index) {
            Some(Slot::Live { generation, fd, .. }) if *generation == id.generation => Ok(*fd),
            _ => Err(SessionError::InvalidSlot(id)),
        }
    }

    /// Record in a slot
    pub fn get(&self, id: SlotId) -> Result<&T> {
        match self.slots.get(id.index) {
            Some(Slot::Live {
                generation, value, ..
            }) if *generation == id.generation => Ok(value),
            _ => Err(SessionError::InvalidSlot(id)),
        }
    }

    /// Mutable record in a slot
    pub fn get_mut(&mut self, id: SlotId) -> Result<&mut T> {
        match self.slots.get_mut(id.index) {
            Some(Slot::Live {
                generation, value, ..
            }) if *generation == id.generation => Ok(value),
            _ => Err(SessionError::InvalidSlot(id)),
        }
    }

    /// Vacate a slot and hand back its fd and record
    pub fn remove(&mut self, id: SlotId) -> Result<(RawFd, T)> {
        match self.slots.get(id.index) {
            Some(Slot::Live { generation, .. }) if *generation == id.generation => {}
            _ => return Err(SessionError::InvalidSlot(id)),
        }
        let next = Slot::Vacant {
            generation: id.generation.wrapping_add(1),
        };
        match std::mem::replace(&mut self.slots[id.index], next) {
            Slot::Live { fd, value, .. } => {
                self.by_fd.remove(&fd);
                Ok((fd, value))
            }
            Slot::Vacant { .. } => Err(SessionError::InvalidSlot(id)),
        }
    }

    /// Fds of all live slots, in slot order
    pub fn fds(&self) -> Vec<RawFd> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Live { fd, .. } => Some(*fd),
                Slot::Vacant { .. } => None,
            })
            .collect()
    }

    /// Live entries
    pub fn len(&self) -> usize {
        self.by_fd.len()
    }

    /// No live entries
    pub fn is_empty(&self) -> bool {
        self.by_fd.is_empty()
    }

    /// Allocated slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Per-association state
#[derive(Debug, Default)]
pub struct ConnectionRecord {
    /// Partial message state
    pub reassembly: Reassembly,
    /// A non-blocking connect has not completed yet
    pub connecting: bool,
    /// Peer address captured when the connect was issued
    pub remote: Option<SocketAddr>,
}

impl ConnectionRecord {
    /// Record for an established association
    pub fn established() -> Self {
        Self::default()
    }

    /// Record for a connect still in progress
    pub fn connecting(remote: SocketAddr) -> Self {
        Self {
            reassembly: Reassembly::default(),
            connecting: true,
            remote: Some(remote),
        }
    }
}

/// Listening socket opened by a listen request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRecord {
    /// Local address as given in the request
    pub local_address: String,
    /// Local port
    pub local_port: u16,
}
