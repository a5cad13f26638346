//! Per-channel sequence number tracking.

use std::collections::HashMap;

use gamesync_types::BlockEventKind;

/// Last sequence number seen on each `(game_id, kind)` channel.
///
/// A gap between consecutive numbers means notifications were lost and the
/// handler has to reconcile against the chain instead of trusting the event.
#[derive(Debug, Default, Clone)]
pub struct SequenceTracker {
    last: HashMap<(String, BlockEventKind), u32>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `seq` for the channel and report whether it is not contiguous
    /// with the previous one. The first number on a channel is never a
    /// mismatch; `u32::MAX` followed by `0` is contiguous.
    pub fn annotate(&mut self, game_id: &str, kind: BlockEventKind, seq: u32) -> bool {
        let key = (game_id.to_string(), kind);
        let mismatch = self
            .last
            .get(&key)
            .is_some_and(|prev| prev.wrapping_add(1) != seq);

        self.last.insert(key, seq);
        mismatch
    }

    /// Last number seen on the channel.
    pub fn last(&self, game_id: &str, kind: BlockEventKind) -> Option<u32> {
        self.last.get(&(game_id.to_string(), kind)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTACH: BlockEventKind = BlockEventKind::Attach;
    const DETACH: BlockEventKind = BlockEventKind::Detach;

    #[test]
    fn test_first_observation_never_mismatches() {
        let mut tracker = SequenceTracker::new();
        assert!(!tracker.annotate("a", ATTACH, 17));
        assert!(!tracker.annotate("b", ATTACH, 0));
        assert!(!tracker.annotate("a", DETACH, 99));
    }

    #[test]
    fn test_contiguous_and_gap() {
        let mut tracker = SequenceTracker::new();
        assert!(!tracker.annotate("a", ATTACH, 5));
        assert!(!tracker.annotate("a", ATTACH, 6));
        assert!(!tracker.annotate("a", ATTACH, 7));

        assert!(tracker.annotate("a", ATTACH, 9));
        // Updated even on mismatch.
        assert!(!tracker.annotate("a", ATTACH, 10));
        assert_eq!(tracker.last("a", ATTACH), Some(10));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut tracker = SequenceTracker::new();
        tracker.annotate("a", ATTACH, 1);
        tracker.annotate("b", ATTACH, 50);
        tracker.annotate("a", DETACH, 100);

        assert!(!tracker.annotate("a", ATTACH, 2));
        assert!(!tracker.annotate("b", ATTACH, 51));
        assert!(!tracker.annotate("a", DETACH, 101));
        assert_eq!(tracker.last("b", DETACH), None);
    }

    #[test]
    fn test_wrap_around() {
        let mut tracker = SequenceTracker::new();
        tracker.annotate("a", ATTACH, u32::MAX);
        assert!(!tracker.annotate("a", ATTACH, 0));
        assert!(tracker.annotate("a", ATTACH, 0));
    }
}
