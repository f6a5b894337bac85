//! Port allocation for launched instances.

use std::collections::HashSet;
use std::net::TcpListener;
use std::ops::RangeInclusive;
use std::sync::Mutex;

/// Hands out ports from a fixed range.
///
/// A port is held from [`allocate`](Self::allocate) until
/// [`release`](Self::release) and is never handed out twice while held.
/// Candidates are also probed with a bind so ports taken by unrelated
/// processes are skipped.
pub struct PortAllocator {
    bind_host: String,
    range: RangeInclusive<u16>,
    held: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(bind_host: impl Into<String>, range: RangeInclusive<u16>) -> Self {
        Self {
            bind_host: bind_host.into(),
            range,
            held: Mutex::new(HashSet::new()),
        }
    }

    /// Take the lowest free port, or `None` if the range is exhausted.
    pub fn allocate(&self) -> Option<u16> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        let port = self
            .range
            .clone()
            .filter(|p| !held.contains(p))
            .find(|&p| self.is_bindable(p))?;
        held.insert(port);
        Some(port)
    }

    /// Return a port to the pool. Releasing an unheld port is a no-op.
    pub fn release(&self, port: u16) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&port);
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn is_bindable(&self, port: u16) -> bool {
        TcpListener::bind((self.bind_host.as_str(), port)).is_ok()
    }
}
