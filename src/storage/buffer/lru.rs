use super::replacer::{FrameId, Replacer};
use std::collections::{HashSet, VecDeque};

/// Strict LRU over unpinned frames: the frame unpinned longest ago is the victim.
#[derive(Debug)]
pub struct LruReplacer {
    /// Least recently unpinned at the front.
    lru_list: VecDeque<FrameId>,
    tracked: HashSet<FrameId>,
    max_size: usize,
}

impl LruReplacer {
    pub fn new(max_size: usize) -> Self {
        Self {
            lru_list: VecDeque::with_capacity(max_size),
            tracked: HashSet::with_capacity(max_size),
            max_size,
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        let frame_id = self.lru_list.pop_front()?;
        self.tracked.remove(&frame_id);
        Some(frame_id)
    }

    fn pin(&mut self, frame_id: FrameId) {
        if self.tracked.remove(&frame_id) {
            self.lru_list.retain(|&f| f != frame_id);
        }
    }

    fn unpin(&mut self, frame_id: FrameId) {
        if self.tracked.contains(&frame_id) || self.lru_list.len() >= self.max_size {
            return;
        }
        self.lru_list.push_back(frame_id);
        self.tracked.insert(frame_id);
    }

    fn size(&self) -> usize {
        self.lru_list.len()
    }
}
