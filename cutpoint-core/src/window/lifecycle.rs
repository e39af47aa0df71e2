use super::*;

/// Per-partition bookkeeping bits. Mutated only through [`transition`], so
/// the whole lifecycle is testable without a store or any concurrency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionFlags {
    /// A tuple entered the window since the last trigger (or, for tumbling
    /// windows, since the last eviction).
    pub inserts_occurred: bool,
    /// A sliding-window eviction happened since the last trigger.
    pub evictions_occurred: bool,
    /// The sliding window reached full size at least once. Sticky until the
    /// partition is evicted.
    pub seen_initial_full: bool,
}

/// What the store must do to the partition after the listener callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    None,
    /// Tumbling eviction: the partition's state restarts from the init
    /// function, seeded with the outgoing state.
    ReinitializeState,
    /// Remove the partition and all bookkeeping for it.
    EvictPartition,
}

/// When the flag update happens relative to the listener callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOrder {
    BeforeCallback,
    AfterCallback,
}

/// Apply one event to a partition's flags.
///
/// `InitialFull` is the one event recorded *before* delegating to the
/// listener, so a callback that fails (or asks) still observes the partition
/// as having filled once. Everything else updates flags after the callback.
pub fn transition(
    flags: &mut PartitionFlags,
    kind: WindowEventKind,
    window: WindowKind,
) -> PostAction {
    match kind {
        WindowEventKind::Insertion => {
            flags.inserts_occurred = true;
            PostAction::None
        }
        WindowEventKind::Eviction => match window {
            WindowKind::Tumbling => {
                flags.inserts_occurred = false;
                PostAction::ReinitializeState
            }
            WindowKind::Sliding => {
                flags.evictions_occurred = true;
                PostAction::None
            }
        },
        WindowEventKind::Trigger => {
            flags.inserts_occurred = false;
            flags.evictions_occurred = false;
            PostAction::None
        }
        WindowEventKind::InitialFull => {
            flags.seen_initial_full = true;
            PostAction::None
        }
        WindowEventKind::Final => PostAction::None,
        WindowEventKind::PartitionEviction => PostAction::EvictPartition,
    }
}

/// Ordering rule for the event kind.
pub fn flag_order(kind: WindowEventKind) -> FlagOrder {
    match kind {
        WindowEventKind::InitialFull => FlagOrder::BeforeCallback,
        _ => FlagOrder::AfterCallback,
    }
}
