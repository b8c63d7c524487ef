//! Fixed-capacity signal history with a view on the current frame.

/// A contiguous buffer of `history + frame_size` samples. The current frame
/// occupies the last `frame_size` samples, everything before it is history
/// that lagged reads (pitch prediction) may reach into.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    data: Box<[f32]>,
    history: usize,
    frame_size: usize,
}

impl FrameBuffer {
    pub fn new(history: usize, frame_size: usize) -> Self {
        Self {
            data: vec![0.0; history + frame_size].into_boxed_slice(),
            history,
            frame_size,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of samples available before the start of the current frame.
    pub fn history(&self) -> usize {
        self.history
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Move everything one frame towards the past. The new current frame
    /// keeps stale samples until it is overwritten.
    pub fn shift(&mut self) {
        let n = self.frame_size.min(self.data.len());
        self.data.copy_within(n.., 0);
    }

    pub fn frame(&self) -> &[f32] {
        &self.data[self.history..]
    }

    pub fn frame_mut(&mut self) -> &mut [f32] {
        &mut self.data[self.history..]
    }

    pub fn subframe(&self, offset: usize, len: usize) -> &[f32] {
        &self.frame()[offset..offset + len]
    }

    pub fn subframe_mut(&mut self, offset: usize, len: usize) -> &mut [f32] {
        &mut self.frame_mut()[offset..offset + len]
    }

    /// The last `len` samples, ending with the current frame.
    pub fn tail(&self, len: usize) -> Option<&[f32]> {
        let start = self.data.len().checked_sub(len)?;
        Some(&self.data[start..])
    }

    /// `len` samples starting `lag` samples before frame position `offset`.
    /// `None` when the span leaves the buffer.
    pub fn lagged(&self, offset: usize, lag: usize, len: usize) -> Option<&[f32]> {
        let start = (self.history + offset).checked_sub(lag)?;
        self.data.get(start..start + len)
    }

    /// Mutable access to frame position `offset` and the `lag` samples
    /// preceding it, as (history, current).
    pub fn split_at_lag(&mut self, offset: usize, lag: usize) -> Option<(&mut [f32], &mut [f32])> {
        let pivot = self.history + offset;
        let start = pivot.checked_sub(lag)?;
        let (past, current) = self.data.split_at_mut(pivot);
        Some((&mut past[start..], current))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shift_moves_frame_to_history() {
        let mut buf = FrameBuffer::new(4, 3);
        buf.frame_mut().copy_from_slice(&[1.0, 2.0, 3.0]);
        buf.shift();
        assert_eq!(buf.lagged(0, 3, 3).unwrap(), &[1.0, 2.0, 3.0]);
        buf.frame_mut().copy_from_slice(&[4.0, 5.0, 6.0]);
        assert_eq!(buf.tail(5).unwrap(), &[2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn lagged_reads_are_bounded() {
        let buf = FrameBuffer::new(10, 8);
        assert!(buf.lagged(0, 10, 4).is_some());
        assert!(buf.lagged(0, 11, 4).is_none());
        assert!(buf.lagged(7, 1, 2).is_some());
        assert!(buf.lagged(7, 1, 3).is_none());
        assert!(buf.tail(19).is_none());
        assert_eq!(buf.capacity(), 18);
    }
}
