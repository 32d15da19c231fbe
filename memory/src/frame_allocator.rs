/// Bitmap of physical frames, one bit per frame, set while the frame is on
/// loan to somebody.
#[derive(Debug)]
pub struct FrameAllocator {
    bitmap: Vec<u8>,
    frames: usize,
    allocated: usize,
}

impl FrameAllocator {
    /// How many bytes are required to store the bitmap
    pub fn bitmap_size(frames: usize) -> usize {
        frames / 8 + if frames % 8 == 0 { 0 } else { 1 }
    }

    pub fn init(frames: usize) -> Self {
        Self {
            bitmap: vec![0u8; Self::bitmap_size(frames)],
            frames,
            allocated: 0,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub fn allocate_frame(&mut self) -> Option<u32> {
        for i in 0..self.bitmap.len() {
            if self.bitmap[i] == u8::MAX {
                continue;
            }
            for j in 0..8 {
                let frame = i * 8 + j;
                if frame >= self.frames {
                    break;
                }
                if self.bitmap[i] & (1 << j) == 0 {
                    self.bitmap[i] |= 1 << j;
                    self.allocated += 1;
                    return Some(frame as u32);
                }
            }
        }
        log::debug!("No free frames");
        None
    }

    /// Returns `false` if the frame was not allocated.
    pub fn deallocate_frame(&mut self, frame: u32) -> bool {
        let frame = frame as usize;
        if !self.is_allocated(frame as u32) {
            return false;
        }
        self.bitmap[frame / 8] &= !(1 << (frame % 8));
        self.allocated -= 1;
        true
    }

    pub fn is_allocated(&self, frame: u32) -> bool {
        let frame = frame as usize;
        frame < self.frames && self.bitmap[frame / 8] & (1 << (frame % 8)) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_size() {
        assert_eq!(FrameAllocator::bitmap_size(8), 1);
        assert_eq!(FrameAllocator::bitmap_size(9), 2);
        assert_eq!(FrameAllocator::bitmap_size(64), 8);
    }

    #[test]
    fn test_allocate_frame() {
        let mut allocator = FrameAllocator::init(4);
        assert_eq!(allocator.allocate_frame(), Some(0));
        assert_eq!(allocator.allocate_frame(), Some(1));
        assert_eq!(allocator.allocated(), 2);
    }

    #[test]
    fn test_allocate_frame_full() {
        let mut allocator = FrameAllocator::init(3);
        for i in 0..3 {
            assert_eq!(allocator.allocate_frame(), Some(i));
        }
        assert_eq!(allocator.allocate_frame(), None);
        assert!(allocator.deallocate_frame(1));
        assert_eq!(allocator.allocate_frame(), Some(1));
    }

    #[test]
    fn test_double_deallocate() {
        let mut allocator = FrameAllocator::init(16);
        let frame = allocator.allocate_frame().unwrap();
        assert!(allocator.deallocate_frame(frame));
        assert!(!allocator.deallocate_frame(frame));
        assert!(!allocator.deallocate_frame(99));
        assert_eq!(allocator.allocated(), 0);
    }
}
