use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Access history for a single frame
#[derive(Debug)]
struct LruKNode {
    /// History of access timestamps (most recent at back), at most k entries
    history: VecDeque<Timestamp>,
    /// Whether this frame is currently evictable
    is_evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Returns the backward k-distance from the current timestamp.
    /// None means fewer than k accesses, i.e. +inf distance.
    fn k_distance(&self, current_timestamp: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(current_timestamp - self.history[self.history.len() - k])
        }
    }

    fn earliest_timestamp(&self) -> Option<Timestamp> {
        self.history.front().copied()
    }
}

struct ReplacerState {
    /// Access information for each tracked frame
    node_store: HashMap<FrameId, LruKNode>,
    /// Monotonically increasing logical clock
    current_timestamp: Timestamp,
    /// Number of evictable frames
    curr_size: usize,
}

/// LRU-K Replacement Policy
///
/// The LRU-K algorithm evicts the frame whose backward k-distance is the
/// maximum over all evictable frames, where the distance is measured from
/// the current timestamp to the k-th most recent access.
///
/// A frame with fewer than k recorded accesses has +inf backward
/// k-distance. Among multiple +inf frames, the one with the earliest
/// overall access timestamp is evicted. Among frames with equal finite
/// distances, the smallest frame id wins, so eviction is deterministic.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Maximum number of frames the replacer can track
    replacer_size: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value and capacity.
    pub fn new(k: usize, replacer_size: usize) -> Self {
        Self {
            k,
            replacer_size,
            state: Mutex::new(ReplacerState {
                node_store: HashMap::new(),
                current_timestamp: 0,
                curr_size: 0,
            }),
        }
    }

    /// Evicts the frame with the largest backward k-distance.
    /// Returns None if there are no evictable frames.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        if state.curr_size == 0 {
            return None;
        }

        let current_ts = state.current_timestamp;

        let mut victim: Option<FrameId> = None;
        let mut victim_k_dist: Option<Timestamp> = None;
        let mut victim_earliest_ts: Option<Timestamp> = None;

        for (&frame_id, node) in state.node_store.iter() {
            if !node.is_evictable {
                continue;
            }

            let k_dist = node.k_distance(current_ts, self.k);
            let earliest_ts = node.earliest_timestamp();

            let should_replace = match (victim_k_dist, k_dist) {
                // Current victim has +inf, candidate has finite -> keep victim
                (None, Some(_)) => false,
                // Current victim has finite, candidate has +inf -> replace
                (Some(_), None) => true,
                // Both +inf -> compare earliest timestamps
                (None, None) => match (victim_earliest_ts, earliest_ts) {
                    (Some(v_ts), Some(c_ts)) => c_ts < v_ts,
                    (None, Some(_)) => true,
                    _ => false,
                },
                // Both finite -> larger distance wins, ties by frame id
                (Some(v_dist), Some(c_dist)) => {
                    c_dist > v_dist
                        || (c_dist == v_dist
                            && victim.map_or(true, |v| frame_id < v))
                }
            };

            if victim.is_none() || should_replace {
                victim = Some(frame_id);
                victim_k_dist = k_dist;
                victim_earliest_ts = earliest_ts;
            }
        }

        if let Some(frame_id) = victim {
            state.node_store.remove(&frame_id);
            state.curr_size -= 1;
        }

        victim
    }

    /// Records an access to the given frame at the next timestamp.
    /// Does not change the frame's evictability.
    pub fn record_access(&self, frame_id: FrameId) {
        assert!(
            frame_id.as_usize() < self.replacer_size,
            "frame id {} out of range for replacer of size {}",
            frame_id,
            self.replacer_size
        );

        let mut state = self.state.lock();
        state.current_timestamp += 1;
        let timestamp = state.current_timestamp;
        let k = self.k;

        state
            .node_store
            .entry(frame_id)
            .or_insert_with(LruKNode::new)
            .record_access(timestamp, k);
    }

    /// Sets whether a frame is evictable. A no-op for untracked frames.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        assert!(
            frame_id.as_usize() < self.replacer_size,
            "frame id {} out of range for replacer of size {}",
            frame_id,
            self.replacer_size
        );

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(node) = state.node_store.get_mut(&frame_id) else {
            return;
        };

        if node.is_evictable != is_evictable {
            node.is_evictable = is_evictable;
            if is_evictable {
                state.curr_size += 1;
            } else {
                state.curr_size -= 1;
            }
        }
    }

    /// Removes a frame from the replacer entirely, e.g. when its page is
    /// deleted. A no-op for untracked frames; removing a tracked frame
    /// that is not evictable is a caller bug.
    pub fn remove(&self, frame_id: FrameId) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(node) = state.node_store.get(&frame_id) else {
            return;
        };
        assert!(
            node.is_evictable,
            "remove called on non-evictable frame {}",
            frame_id
        );

        state.node_store.remove(&frame_id);
        state.curr_size -= 1;
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().curr_size
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_k_replacer_new() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.k(), 2);
    }

    #[test]
    fn test_lru_k_replacer_evict_empty() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_basic() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(2));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);
        replacer.set_evictable(FrameId::new(2), true);

        assert_eq!(replacer.size(), 3);

        // All have a single access (less than k=2), so all have +inf
        // distance; the one with the earliest timestamp goes first.
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_lru_k_replacer_k_distance() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(0));

        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        // Frame 1 has only one access, so its distance is +inf and it
        // loses to frame 0 despite being accessed more recently.
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    }

    #[test]
    fn test_lru_k_replacer_not_evictable() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(1), true);

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_set_evictable_untracked() {
        let replacer = LruKReplacer::new(2, 10);

        // No recorded access, so this must be a no-op.
        replacer.set_evictable(FrameId::new(3), true);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_remove() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.set_evictable(FrameId::new(0), true);

        assert_eq!(replacer.size(), 1);

        replacer.remove(FrameId::new(0));

        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        // Removing an untracked frame is a no-op.
        replacer.remove(FrameId::new(5));
    }

    #[test]
    #[should_panic(expected = "non-evictable")]
    fn test_lru_k_replacer_remove_pinned_panics() {
        let replacer = LruKReplacer::new(2, 10);
        replacer.record_access(FrameId::new(0));
        replacer.remove(FrameId::new(0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_lru_k_replacer_record_out_of_range_panics() {
        let replacer = LruKReplacer::new(2, 4);
        replacer.record_access(FrameId::new(4));
    }

    #[test]
    fn test_lru_k_replacer_toggle_evictable() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(FrameId::new(0), false);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_lru_k_replacer_largest_k_distance() {
        let replacer = LruKReplacer::new(2, 10);

        // Frame 0: accesses at t=1, t=2
        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(0));

        // Frame 1: accesses at t=3, t=4
        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(1));

        // Frame 2: accesses at t=5, t=6
        replacer.record_access(FrameId::new(2));
        replacer.record_access(FrameId::new(2));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);
        replacer.set_evictable(FrameId::new(2), true);

        // All have k accesses; frame 0's k-th most recent is oldest.
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    }
}
