use super::*;

/// Shape of the window: tumbling windows flush wholesale on eviction,
/// sliding windows evict incrementally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Tumbling,
    Sliding,
}

/// What happened to a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowEventKind {
    /// A tuple entered the partition's window.
    Insertion,
    /// The eviction policy fired. For a tumbling window the whole partition
    /// content flushes and its state restarts; for a sliding window tuples
    /// leave incrementally.
    Eviction,
    /// The trigger policy fired; a result was (or is about to be) emitted.
    Trigger,
    /// A sliding window reached its full size for the first time.
    InitialFull,
    /// No further events will arrive on this window.
    Final,
    /// The partition itself is being removed.
    PartitionEviction,
}

/// One window event against one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEvent<K> {
    pub kind: WindowEventKind,
    pub key: K,
}

impl<K> WindowEvent<K> {
    pub fn new(kind: WindowEventKind, key: K) -> Self {
        Self { kind, key }
    }

    pub fn insertion(key: K) -> Self {
        Self::new(WindowEventKind::Insertion, key)
    }

    pub fn eviction(key: K) -> Self {
        Self::new(WindowEventKind::Eviction, key)
    }

    pub fn trigger(key: K) -> Self {
        Self::new(WindowEventKind::Trigger, key)
    }

    pub fn initial_full(key: K) -> Self {
        Self::new(WindowEventKind::InitialFull, key)
    }

    pub fn final_mark(key: K) -> Self {
        Self::new(WindowEventKind::Final, key)
    }

    pub fn partition_eviction(key: K) -> Self {
        Self::new(WindowEventKind::PartitionEviction, key)
    }
}
