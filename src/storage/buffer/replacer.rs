use std::fmt::Debug;

/// Index into the buffer pool's frame array.
pub type FrameId = usize;

/// Eviction policy over the frames that are currently unpinned.
///
/// The buffer pool only reports frames whose pin count dropped to zero through `unpin`, so a
/// replacer never sees a pinned frame.
pub trait Replacer: Send + Sync + Debug {
    /// Pick a frame to evict and stop tracking it. Returns None if nothing is evictable.
    fn victim(&mut self) -> Option<FrameId>;

    /// The frame was claimed again and must not be evicted.
    fn pin(&mut self, frame_id: FrameId);

    /// The frame's pin count reached zero.
    fn unpin(&mut self, frame_id: FrameId);

    /// Number of evictable frames.
    fn size(&self) -> usize;
}
