//! Scratch buffers for primitive invocations
//!
//! Every buffer handed across the primitive boundary is allocated from the
//! engine's [`EngineHeap`]. Buffers are exclusively owned by the call that
//! allocated them, wiped on drop, and released on every exit path. The heap
//! keeps live counters so that leaks are observable.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use zeroize::Zeroizing;

#[derive(Debug, Default)]
struct Counters {
    live_buffers: AtomicUsize,
    live_bytes: AtomicUsize,
    total_allocations: AtomicUsize,
}

/// Allocation accounting shared by all buffers of one engine instance.
#[derive(Debug, Clone, Default)]
pub struct EngineHeap {
    counters: Arc<Counters>,
}

impl EngineHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zero-filled buffer of `len` bytes.
    pub fn allocate(&self, len: usize) -> HeapBuffer {
        self.track(Zeroizing::new(vec![0u8; len]))
    }

    /// Allocate a buffer holding a copy of `bytes`.
    pub fn allocate_from(&self, bytes: &[u8]) -> HeapBuffer {
        self.track(Zeroizing::new(bytes.to_vec()))
    }

    /// Number of buffers currently allocated and not yet released.
    pub fn live_buffers(&self) -> usize {
        self.counters.live_buffers.load(Ordering::SeqCst)
    }

    /// Sum of the lengths of all live buffers.
    pub fn live_bytes(&self) -> usize {
        self.counters.live_bytes.load(Ordering::SeqCst)
    }

    /// Number of buffers ever allocated from this heap.
    pub fn total_allocations(&self) -> usize {
        self.counters.total_allocations.load(Ordering::SeqCst)
    }

    fn track(&self, data: Zeroizing<Vec<u8>>) -> HeapBuffer {
        self.counters.live_buffers.fetch_add(1, Ordering::SeqCst);
        self.counters
            .live_bytes
            .fetch_add(data.len(), Ordering::SeqCst);
        self.counters
            .total_allocations
            .fetch_add(1, Ordering::SeqCst);
        HeapBuffer {
            data,
            counters: Arc::clone(&self.counters),
        }
    }
}

/// A byte buffer with explicit length, released (and wiped) on drop.
pub struct HeapBuffer {
    data: Zeroizing<Vec<u8>>,
    counters: Arc<Counters>,
}

impl HeapBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes preceding the first NUL, or the whole buffer if there is none.
    pub fn until_nul(&self) -> &[u8] {
        let end = self.data.iter().position(|&b| b == 0).unwrap_or(self.data.len());
        &self.data[..end]
    }
}

// Contents may be a password; never print them.
impl fmt::Debug for HeapBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapBuffer").field("len", &self.len()).finish()
    }
}

impl Deref for HeapBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for HeapBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for HeapBuffer {
    fn drop(&mut self) {
        self.counters.live_buffers.fetch_sub(1, Ordering::SeqCst);
        self.counters
            .live_bytes
            .fetch_sub(self.data.len(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_scope() {
        let heap = EngineHeap::new();
        {
            let a = heap.allocate(16);
            let b = heap.allocate_from(b"password");
            assert_eq!(a.len(), 16);
            assert_eq!(&*b, b"password");
            assert_eq!(heap.live_buffers(), 2);
            assert_eq!(heap.live_bytes(), 24);
        }
        assert_eq!(heap.live_buffers(), 0);
        assert_eq!(heap.live_bytes(), 0);
        assert_eq!(heap.total_allocations(), 2);
    }

    #[test]
    fn test_release_on_early_return() {
        fn fails(heap: &EngineHeap) -> Result<(), ()> {
            let _scratch = heap.allocate(8);
            Err(())
        }

        let heap = EngineHeap::new();
        assert!(fails(&heap).is_err());
        assert_eq!(heap.live_buffers(), 0);
    }

    #[test]
    fn test_clones_share_counters() {
        let heap = EngineHeap::new();
        let clone = heap.clone();
        let buf = clone.allocate(4);
        assert_eq!(heap.live_buffers(), 1);
        drop(buf);
        assert_eq!(heap.live_buffers(), 0);
    }

    #[test]
    fn test_debug_hides_contents() {
        let heap = EngineHeap::new();
        let buf = heap.allocate_from(b"hunter2");
        let printed = format!("{:?}", buf);
        assert!(!printed.contains("104"), "{}", printed);
        assert!(printed.contains("len: 7"));
    }

    #[test]
    fn test_until_nul() {
        let heap = EngineHeap::new();
        let mut buf = heap.allocate(8);
        buf[..3].copy_from_slice(b"abc");
        assert_eq!(buf.until_nul(), b"abc");

        let full = heap.allocate_from(b"xyz");
        assert_eq!(full.until_nul(), b"xyz");
    }
}
