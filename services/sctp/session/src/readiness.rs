//! Readiness registration.
//!
//! The endpoint tells an external notifier which fds it wants readable or
//! writable callbacks for. [`InterestRegistry`] is a shared map of those
//! interests that a poll loop can read back.

use bitflags::bitflags;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

bitflags! {
    /// Readiness interests of one fd
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Interest: u8 {
        /// Readable
        const READ = 1 << 0;
        /// Writable
        const WRITE = 1 << 1;
        /// Every interest
        const ALL = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// Readiness notifier registration facility
pub trait Readiness: Send {
    /// Request readable callbacks for `fd`
    fn register_read(&mut self, fd: RawFd);
    /// Request writable callbacks for `fd`
    fn register_write(&mut self, fd: RawFd);
    /// Drop the given interests for `fd`
    fn unregister(&mut self, fd: RawFd, interest: Interest);
}

/// Shared fd to interest map
#[derive(Debug, Clone, Default)]
pub struct InterestRegistry {
    inner: Arc<Mutex<HashMap<RawFd, Interest>>>,
}

impl InterestRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RawFd, Interest>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current interests of `fd`
    pub fn interest(&self, fd: RawFd) -> Interest {
        self.lock().get(&fd).copied().unwrap_or_else(Interest::empty)
    }

    /// All registered fds and their interests, ordered by fd
    pub fn snapshot(&self) -> Vec<(RawFd, Interest)> {
        let mut entries: Vec<_> = self.lock().iter().map(|(fd, i)| (*fd, *i)).collect();
        entries.sort_unstable_by_key(|(fd, _)| *fd);
        entries
    }

    fn add(&self, fd: RawFd, interest: Interest) {
        debug!("Registering {:?} interest for fd {}", interest, fd);
        *self.lock().entry(fd).or_insert_with(Interest::empty) |= interest;
    }
}

impl Readiness for InterestRegistry {
    fn register_read(&mut self, fd: RawFd) {
        self.add(fd, Interest::READ);
    }

    fn register_write(&mut self, fd: RawFd) {
        self.add(fd, Interest::WRITE);
    }

    fn unregister(&mut self, fd: RawFd, interest: Interest) {
        let mut map = self.lock();
        if let Some(current) = map.get_mut(&fd) {
            current.remove(interest);
            if current.is_empty() {
                map.remove(&fd);
            }
        }
    }
}
