//! Sample ring buffer shared between the producer and the timer interrupt
//!
//! A ring buffer (circular buffer) lets two contexts operate concurrently:
//! - Producer (caller's stack): pushes sample bytes as space frees up
//! - Consumer (timer interrupt): pops one frame per tick and sends it to the DAC
//!
//! Memory consumption is fixed at `capacity` bytes for the whole session. No locks are
//! taken on either side: each cursor has exactly one writer, and the byte cells are
//! atomics so the buffer is shareable without `unsafe`.

use crate::config::MAX_FRAME_BYTES;
use crate::{DacError, Result};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// One stride's worth of bytes, stored inline so the interrupt path never allocates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; MAX_FRAME_BYTES],
    len: usize,
}

impl Frame {
    /// Bytes of the frame in ring order
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Fixed-capacity circular byte buffer with a fixed frame stride
///
/// # Cursor discipline
/// - `write_cursor` is only stored by the producer ([`push`](Self::push)), after the data
///   byte it covers, with release ordering
/// - `read_cursor` is only stored by the consumer ([`pop_frame`](Self::pop_frame)), after
///   the frame is copied out, with release ordering
/// - Each side loads the other's cursor with acquire ordering
///
/// One slot always stays empty so that `write == read` unambiguously means empty.
#[derive(Debug)]
pub struct SampleRing {
    /// Byte storage
    buffer: Box<[AtomicU8]>,
    /// Offset of the next byte to be filled (producer)
    write_cursor: AtomicUsize,
    /// Offset of the next byte to be output (consumer)
    read_cursor: AtomicUsize,
    /// Bytes consumed per output frame
    stride: usize,
}

impl SampleRing {
    /// Create an empty ring of `capacity` bytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `capacity` is 0 or `stride` is not in `1..=MAX_FRAME_BYTES`
    /// - the storage cannot be allocated
    pub fn with_capacity(capacity: usize, stride: usize) -> Result<Self> {
        if capacity == 0 {
            return Err("Ring buffer capacity must be greater than 0".into());
        }
        if stride == 0 || stride > MAX_FRAME_BYTES {
            return Err(format!(
                "Frame stride {stride} outside 1..={MAX_FRAME_BYTES}"
            )
            .into());
        }

        let mut cells: Vec<AtomicU8> = Vec::new();
        cells
            .try_reserve_exact(capacity)
            .map_err(|_| DacError::Allocation { bytes: capacity })?;
        cells.extend((0..capacity).map(|_| AtomicU8::new(0)));

        Ok(SampleRing {
            buffer: cells.into_boxed_slice(),
            write_cursor: AtomicUsize::new(0),
            read_cursor: AtomicUsize::new(0),
            stride,
        })
    }

    /// Create a ring already holding `data`
    ///
    /// Capacity is `data.len() + 1` so the whole slice fits without violating the
    /// one-empty-slot rule.
    pub fn from_bytes(data: &[u8], stride: usize) -> Result<Self> {
        let ring = Self::with_capacity(data.len() + 1, stride)?;
        for (cell, &byte) in ring.buffer.iter().zip(data) {
            cell.store(byte, Ordering::Relaxed);
        }
        ring.write_cursor.store(data.len(), Ordering::Release);
        Ok(ring)
    }

    /// Total byte storage
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes consumed per frame
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes available to read (never blocks)
    #[inline]
    pub fn occupancy(&self) -> usize {
        let write = self.write_cursor.load(Ordering::Acquire);
        let read = self.read_cursor.load(Ordering::Acquire);
        self.distance(read, write)
    }

    /// Bytes that can be pushed before the ring is full (never blocks)
    #[inline]
    pub fn free_space(&self) -> usize {
        self.capacity() - self.occupancy() - 1
    }

    /// Check if the ring has no bytes to read
    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    /// Write one byte at the write cursor (producer only)
    ///
    /// The caller must have observed `free_space() >= 1`; the ring does not check.
    #[inline]
    pub fn push(&self, byte: u8) {
        debug_assert!(self.free_space() >= 1, "push into a full ring");
        let write = self.write_cursor.load(Ordering::Relaxed);
        self.buffer[write].store(byte, Ordering::Relaxed);
        self.write_cursor
            .store(self.advance(write, 1), Ordering::Release);
    }

    /// Push `bytes` in order (producer only), same precondition as [`push`](Self::push)
    pub fn push_slice(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    /// Read one frame (consumer only). Returns `None` if fewer than `stride` bytes are ready.
    #[inline]
    pub fn pop_frame(&self) -> Option<Frame> {
        let read = self.read_cursor.load(Ordering::Relaxed);
        let write = self.write_cursor.load(Ordering::Acquire);
        if self.distance(read, write) < self.stride {
            return None;
        }

        let mut frame = Frame {
            bytes: [0; MAX_FRAME_BYTES],
            len: self.stride,
        };
        let mut pos = read;
        for slot in &mut frame.bytes[..self.stride] {
            *slot = self.buffer[pos].load(Ordering::Relaxed);
            pos = self.advance(pos, 1);
        }

        self.read_cursor.store(pos, Ordering::Release);
        Some(frame)
    }

    #[inline]
    fn distance(&self, from: usize, to: usize) -> usize {
        if to >= from {
            to - from
        } else {
            self.capacity() - (from - to)
        }
    }

    #[inline]
    fn advance(&self, pos: usize, by: usize) -> usize {
        let next = pos + by;
        if next >= self.capacity() {
            next - self.capacity()
        } else {
            next
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_accounting(ring: &SampleRing) {
        assert_eq!(ring.occupancy() + ring.free_space(), ring.capacity() - 1);
    }

    #[test]
    fn test_ring_creation() {
        let ring = SampleRing::with_capacity(16, 1).unwrap();
        assert_eq!(ring.capacity(), 16);
        assert_eq!(ring.stride(), 1);
        assert!(ring.is_empty());
        assert_eq!(ring.free_space(), 15);
    }

    #[test]
    fn test_zero_capacity_error() {
        let result = SampleRing::with_capacity(0, 1);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("greater than 0"));
    }

    #[test]
    fn test_stride_out_of_range() {
        assert!(SampleRing::with_capacity(64, 0).is_err());
        assert!(SampleRing::with_capacity(64, MAX_FRAME_BYTES + 1).is_err());
    }

    #[test]
    fn test_holds_at_most_capacity_minus_one() {
        let ring = SampleRing::with_capacity(8, 1).unwrap();
        let mut pushed = 0;
        while ring.free_space() > 0 {
            ring.push(pushed as u8);
            pushed += 1;
        }
        assert_eq!(pushed, 7);
        assert_eq!(ring.occupancy(), 7);
        assert_accounting(&ring);
    }

    #[test]
    fn test_pop_requires_full_stride() {
        let ring = SampleRing::with_capacity(8, 2).unwrap();
        ring.push(0x34);
        assert!(ring.pop_frame().is_none());
        assert_eq!(ring.occupancy(), 1);

        ring.push(0x12);
        let frame = ring.pop_frame().unwrap();
        assert_eq!(frame.as_bytes(), &[0x34, 0x12]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let ring = SampleRing::with_capacity(5, 1).unwrap();
        let mut next_in = 0u8;
        let mut next_out = 0u8;

        for _ in 0..20 {
            while ring.free_space() > 0 {
                ring.push(next_in);
                next_in = next_in.wrapping_add(1);
                assert_accounting(&ring);
            }
            for _ in 0..3 {
                let frame = ring.pop_frame().unwrap();
                assert_eq!(frame.as_bytes(), &[next_out]);
                next_out = next_out.wrapping_add(1);
                assert_accounting(&ring);
            }
        }
    }

    #[test]
    fn test_frame_split_across_wrap() {
        let ring = SampleRing::with_capacity(5, 2).unwrap();
        ring.push_slice(&[1, 2, 3]);
        assert_eq!(ring.pop_frame().unwrap().as_bytes(), &[1, 2]);
        // write cursor 3 -> wraps to 0 after two more bytes
        ring.push_slice(&[4, 5, 6]);
        assert_eq!(ring.pop_frame().unwrap().as_bytes(), &[3, 4]);
        assert_eq!(ring.pop_frame().unwrap().as_bytes(), &[5, 6]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_from_bytes_is_full() {
        let ring = SampleRing::from_bytes(b"ABC", 1).unwrap();
        assert_eq!(ring.capacity(), 4);
        assert_eq!(ring.occupancy(), 3);
        assert_eq!(ring.free_space(), 0);

        let drained: Vec<u8> = std::iter::from_fn(|| ring.pop_frame())
            .map(|f| f.as_bytes()[0])
            .collect();
        assert_eq!(drained, b"ABC");
    }

    #[test]
    fn test_starved_pops_leave_cursors_alone() {
        let ring = SampleRing::with_capacity(8, 2).unwrap();
        ring.push(7);
        for _ in 0..10 {
            assert!(ring.pop_frame().is_none());
        }
        assert_eq!(ring.occupancy(), 1);
        ring.push(9);
        assert_eq!(ring.pop_frame().unwrap().as_bytes(), &[7, 9]);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        use std::sync::Arc;

        let ring = Arc::new(SampleRing::with_capacity(7, 1).unwrap());
        let consumer_ring = Arc::clone(&ring);
        let consumer = std::thread::spawn(move || {
            let mut seen = Vec::with_capacity(1000);
            while seen.len() < 1000 {
                match consumer_ring.pop_frame() {
                    Some(frame) => seen.push(frame.as_bytes()[0]),
                    None => std::thread::yield_now(),
                }
            }
            seen
        });

        for i in 0..1000u32 {
            while ring.free_space() == 0 {
                std::thread::yield_now();
            }
            ring.push(i as u8);
        }

        let seen = consumer.join().unwrap();
        let expected: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        assert_eq!(seen, expected);
    }
}
