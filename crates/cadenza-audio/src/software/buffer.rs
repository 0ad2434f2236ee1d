//! Single-producer, single-consumer sample ring between the engine worker
//! and the output callback.
//!
//! Slots are `AtomicU32` holding `f32` bits, so the ring is `Sync` without
//! any unsafe code. Only the worker writes and only the output callback
//! reads.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

pub struct RingBuffer {
    slots: Box<[AtomicU32]>,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
    capacity: usize,
    mask: usize,
}

impl RingBuffer {
    /// Capacity is rounded up to the next power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let slots = (0..capacity).map(|_| AtomicU32::new(0)).collect();

        Self {
            slots,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples ready to read.
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    pub fn free(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Write as many samples as fit. Producer side only.
    pub fn write(&self, samples: &[f32]) -> usize {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let space = self.capacity - write_pos.wrapping_sub(read_pos);
        let count = samples.len().min(space);

        for (offset, sample) in samples[..count].iter().enumerate() {
            let idx = write_pos.wrapping_add(offset) & self.mask;
            self.slots[idx].store(sample.to_bits(), Ordering::Relaxed);
        }

        self.write_pos
            .store(write_pos.wrapping_add(count), Ordering::Release);
        count
    }

    /// Read up to `output.len()` samples. Consumer side only.
    pub fn read(&self, output: &mut [f32]) -> usize {
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let write_pos = self.write_pos.load(Ordering::Acquire);
        let count = output.len().min(write_pos.wrapping_sub(read_pos));

        for (offset, sample) in output[..count].iter_mut().enumerate() {
            let idx = read_pos.wrapping_add(offset) & self.mask;
            *sample = f32::from_bits(self.slots[idx].load(Ordering::Relaxed));
        }

        self.read_pos
            .store(read_pos.wrapping_add(count), Ordering::Release);
        count
    }

    /// Drop everything buffered.
    ///
    /// Producer side. A read racing with this can replay at most one
    /// callback's worth of stale samples; the cursors stay consistent.
    pub fn clear(&self) {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write_pos, Ordering::Release);
    }
}

pub type SharedRingBuffer = Arc<RingBuffer>;

pub fn shared_ring_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}
