mod frame_allocator;

use std::{
    fmt,
    sync::{Arc, Mutex},
};

pub use frame_allocator::FrameAllocator;

pub const PAGE_SIZE: usize = 4096;

#[derive(Debug, PartialEq)]
pub enum MemoryError {
    OverCapacity,
    Misaligned,
    NotAllocated,
}

/// A physical frame, identified by its index in physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Frame(pub u32);

impl Frame {
    pub fn number(&self) -> u32 {
        self.0
    }

    pub fn address(&self) -> usize {
        self.0 as usize * PAGE_SIZE
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}({:#x})", self.0, self.address())
    }
}

/// Simulated physical memory together with the raw pool of its frames.
///
/// Cloning gives another handle onto the same memory.
#[derive(Clone)]
pub struct PhysicalMemory<const CAPACITY: usize> {
    buffer: Arc<Mutex<Vec<u8>>>,
    allocator: Arc<Mutex<FrameAllocator>>,
}

impl<const CAPACITY: usize> PhysicalMemory<CAPACITY> {
    pub fn init() -> Self {
        assert!(
            CAPACITY % PAGE_SIZE == 0 && CAPACITY > 0,
            "Capacity {} is not a multiply of the page size",
            CAPACITY
        );
        log::info!(
            "Physical memory initialized with {} frames",
            Self::frame_count()
        );
        Self {
            buffer: Arc::new(Mutex::new(vec![0; CAPACITY])),
            allocator: Arc::new(Mutex::new(FrameAllocator::init(Self::frame_count()))),
        }
    }

    pub const fn frame_count() -> usize {
        CAPACITY / PAGE_SIZE
    }

    pub fn free_frames(&self) -> usize {
        let allocator = self.allocator.lock().unwrap();
        allocator.frames() - allocator.allocated()
    }

    pub fn try_get_frame(&self) -> Option<Frame> {
        self.allocator.lock().unwrap().allocate_frame().map(Frame)
    }

    pub fn free_frame(&self, frame: Frame) -> Result<(), MemoryError> {
        self.check_frame(frame)?;
        if self.allocator.lock().unwrap().deallocate_frame(frame.0) {
            Ok(())
        } else {
            Err(MemoryError::NotAllocated)
        }
    }

    pub fn is_allocated(&self, frame: Frame) -> bool {
        self.allocator.lock().unwrap().is_allocated(frame.0)
    }

    fn check_frame(&self, frame: Frame) -> Result<(), MemoryError> {
        if frame.0 as usize >= Self::frame_count() {
            return Err(MemoryError::OverCapacity);
        }
        Ok(())
    }

    fn check_range(&self, frame: Frame, offset: usize, len: usize) -> Result<(), MemoryError> {
        self.check_frame(frame)?;
        if offset + len > PAGE_SIZE {
            return Err(MemoryError::OverCapacity);
        }
        Ok(())
    }

    /// Copies `buf.len()` bytes starting at `offset` within the frame.
    pub fn read_at(&self, frame: Frame, offset: usize, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.check_range(frame, offset, buf.len())?;
        let buffer = self.buffer.lock().unwrap();
        let start = frame.address() + offset;
        buf.copy_from_slice(&buffer[start..start + buf.len()]);
        Ok(())
    }

    pub fn write_at(&self, frame: Frame, offset: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        self.check_range(frame, offset, bytes.len())?;
        let mut buffer = self.buffer.lock().unwrap();
        let start = frame.address() + offset;
        buffer[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_frame(&self, frame: Frame, buf: &mut [u8]) -> Result<(), MemoryError> {
        if buf.len() != PAGE_SIZE {
            return Err(MemoryError::Misaligned);
        }
        self.read_at(frame, 0, buf)
    }

    pub fn write_frame(&self, frame: Frame, bytes: &[u8]) -> Result<(), MemoryError> {
        if bytes.len() != PAGE_SIZE {
            return Err(MemoryError::Misaligned);
        }
        self.write_at(frame, 0, bytes)
    }

    pub fn zero_frame(&self, frame: Frame) -> Result<(), MemoryError> {
        self.check_frame(frame)?;
        let mut buffer = self.buffer.lock().unwrap();
        buffer[frame.address()..frame.address() + PAGE_SIZE].fill(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_init() {
        let mem = PhysicalMemory::<{ PAGE_SIZE * 4 }>::init();
        assert_eq!(PhysicalMemory::<{ PAGE_SIZE * 4 }>::frame_count(), 4);
        assert_eq!(mem.free_frames(), 4);
    }

    #[test]
    #[should_panic]
    fn test_init_unaligned_capacity() {
        let _ = PhysicalMemory::<1000>::init();
    }

    #[test]
    fn test_exhaust_pool() {
        let mem = PhysicalMemory::<{ PAGE_SIZE * 2 }>::init();
        let a = mem.try_get_frame().unwrap();
        let b = mem.try_get_frame().unwrap();
        assert_ne!(a, b);
        assert!(mem.try_get_frame().is_none());
        mem.free_frame(a).unwrap();
        assert_eq!(mem.try_get_frame(), Some(a));
    }

    #[test]
    fn test_double_free() {
        let mem = PhysicalMemory::<{ PAGE_SIZE * 2 }>::init();
        let frame = mem.try_get_frame().unwrap();
        mem.free_frame(frame).unwrap();
        assert_eq!(mem.free_frame(frame), Err(MemoryError::NotAllocated));
        assert_eq!(mem.free_frame(Frame(7)), Err(MemoryError::OverCapacity));
    }

    #[test]
    fn test_read_write_frame() {
        let mem = PhysicalMemory::<{ PAGE_SIZE * 4 }>::init();
        let frame = mem.try_get_frame().unwrap();
        let mut rng = rand::thread_rng();
        let data: Vec<u8> = (0..PAGE_SIZE).map(|_| rng.gen()).collect();
        mem.write_frame(frame, &data).unwrap();
        let mut back = vec![0; PAGE_SIZE];
        mem.read_frame(frame, &mut back).unwrap();
        assert_eq!(data, back);

        mem.zero_frame(frame).unwrap();
        mem.read_frame(frame, &mut back).unwrap();
        assert!(back.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_partial_access() {
        let mem = PhysicalMemory::<{ PAGE_SIZE * 2 }>::init();
        let frame = Frame(1);
        mem.write_at(frame, 100, &[1, 2, 3]).unwrap();
        let mut buf = [0; 3];
        mem.read_at(frame, 100, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(
            mem.write_at(frame, PAGE_SIZE - 1, &[1, 2]),
            Err(MemoryError::OverCapacity)
        );
        assert_eq!(
            mem.write_frame(frame, &[0; 10]),
            Err(MemoryError::Misaligned)
        );
    }

    #[test]
    fn test_frames_do_not_overlap() {
        let mem = PhysicalMemory::<{ PAGE_SIZE * 2 }>::init();
        mem.write_frame(Frame(0), &[0xaa; PAGE_SIZE]).unwrap();
        mem.write_frame(Frame(1), &[0xbb; PAGE_SIZE]).unwrap();
        let mut buf = [0; PAGE_SIZE];
        mem.read_frame(Frame(0), &mut buf).unwrap();
        assert!(buf.iter().all(|b| *b == 0xaa));
    }
}
