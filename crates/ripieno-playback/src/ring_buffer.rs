//! Single-producer/single-consumer sample handoff across the real-time
//! boundary.
//!
//! The fill thread is the only writer and the real-time callback the only
//! reader. Space is tracked with a pair of monotonic counters so both sides
//! can query it without touching the other side's lock.

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use ripieno_core::AtomicFlag;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed-capacity circular buffer for one channel.
pub struct RingBuffer {
    producer: Mutex<HeapProd<f32>>,
    consumer: Mutex<HeapCons<f32>>,
    capacity: usize,
    written: AtomicU64,
    read: AtomicU64,
    underruns: AtomicU64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            capacity,
            written: AtomicU64::new(0),
            read: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples available to the reader.
    #[inline]
    pub fn read_space(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let written = self.written.load(Ordering::Acquire);
        written.saturating_sub(read) as usize
    }

    /// Samples the writer may append without overrunning.
    #[inline]
    pub fn write_space(&self) -> usize {
        self.capacity.saturating_sub(self.read_space())
    }

    /// Append as much of `data` as fits; the excess is dropped.
    ///
    /// Writer side only.
    pub fn write(&self, data: &[f32]) -> usize {
        let count = data.len().min(self.write_space());
        if count == 0 {
            return 0;
        }
        let pushed = self.producer.lock().push_slice(&data[..count]);
        self.written.fetch_add(pushed as u64, Ordering::Release);
        pushed
    }

    /// Fill `out`, zeroing whatever the buffer cannot supply.
    ///
    /// Reader side only. Never blocks: if the consumer is momentarily held
    /// elsewhere the whole block reads as silence. Returns the number of
    /// samples that carried data.
    pub fn read(&self, out: &mut [f32]) -> usize {
        let wanted = out.len().min(self.read_space());
        let got = match self.consumer.try_lock() {
            Some(mut consumer) if wanted > 0 => consumer.pop_slice(&mut out[..wanted]),
            _ => 0,
        };
        self.read.fetch_add(got as u64, Ordering::Release);

        if got < out.len() {
            out[got..].fill(0.0);
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
        got
    }

    /// Discard up to `count` samples from the read side. Never blocks.
    pub fn skip(&self, count: usize) -> usize {
        let count = count.min(self.read_space());
        if count == 0 {
            return 0;
        }
        let Some(mut consumer) = self.consumer.try_lock() else {
            return 0;
        };
        let skipped = consumer.skip(count);
        self.read.fetch_add(skipped as u64, Ordering::Release);
        skipped
    }

    /// Number of reads that came up short.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("read_space", &self.read_space())
            .field("underruns", &self.underruns())
            .finish()
    }
}

/// One ring buffer per output channel, advanced in lock-step.
///
/// A set is created for a single playback run from `start_frame` and is
/// replaced wholesale, never resized. `write_fill` is the source frame just
/// after the last audio written into it, and `step` is the number of source
/// frames each buffered frame stands for. Positions are not wrapped when
/// looping.
#[derive(Debug)]
pub struct RingBufferSet {
    channels: Vec<RingBuffer>,
    generation: u64,
    start_frame: u64,
    step: f64,
    write_fill: AtomicU64,
    finished: AtomicFlag,
}

impl RingBufferSet {
    pub fn new(
        channel_count: usize,
        capacity: usize,
        start_frame: u64,
        step: f64,
        generation: u64,
    ) -> Self {
        Self {
            channels: (0..channel_count.max(1))
                .map(|_| RingBuffer::new(capacity))
                .collect(),
            generation,
            start_frame,
            step,
            write_fill: AtomicU64::new(start_frame),
            finished: AtomicFlag::new(false),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &RingBuffer {
        &self.channels[index]
    }

    pub fn capacity(&self) -> usize {
        self.channels[0].capacity()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Source frame of the next frame the reader will receive.
    pub fn frame_at_read_head(&self) -> f64 {
        self.write_fill() as f64 - self.read_space() as f64 * self.step
    }

    pub fn write_fill(&self) -> u64 {
        self.write_fill.load(Ordering::Acquire)
    }

    pub fn set_write_fill(&self, frame: u64) {
        self.write_fill.store(frame, Ordering::Release);
    }

    /// Frames readable on every channel.
    #[inline]
    pub fn read_space(&self) -> usize {
        self.channels
            .iter()
            .map(RingBuffer::read_space)
            .min()
            .unwrap_or(0)
    }

    /// Frames writable on every channel.
    #[inline]
    pub fn write_space(&self) -> usize {
        self.channels
            .iter()
            .map(RingBuffer::write_space)
            .min()
            .unwrap_or(0)
    }

    /// Write the same number of frames to every channel.
    ///
    /// Channels missing from `data` receive silence.
    pub fn write(&self, data: &[Vec<f32>], frames: usize) -> usize {
        let count = frames.min(self.write_space());
        if count == 0 {
            return 0;
        }
        for (ch, ring) in self.channels.iter().enumerate() {
            match data.get(ch) {
                Some(samples) => {
                    ring.write(&samples[..count]);
                }
                None => {
                    // Rare: only when a mixer block is narrower than the set.
                    let silence = vec![0.0; count];
                    ring.write(&silence);
                }
            }
        }
        count
    }

    /// Read `count` frames into each buffer. All channels advance by the
    /// same amount; the shortfall is zero-filled. Returns frames read.
    pub fn read(&self, buffers: &mut [Vec<f32>], count: usize) -> usize {
        let available = count.min(self.read_space());
        for (ch, buffer) in buffers.iter_mut().enumerate() {
            let out = &mut buffer[..count];
            match self.channels.get(ch) {
                Some(ring) => {
                    ring.read(&mut out[..available]);
                    out[available..].fill(0.0);
                }
                None => out.fill(0.0),
            }
        }
        // Channels the caller has no buffer for still advance in lock-step.
        for ring in self.channels.iter().skip(buffers.len()) {
            ring.skip(available);
        }
        available
    }

    /// Drop `count` frames from every channel.
    pub fn skip(&self, count: usize) -> usize {
        let count = count.min(self.read_space());
        for ring in &self.channels {
            ring.skip(count);
        }
        count
    }

    /// No more audio will be written to this set.
    pub fn mark_finished(&self) {
        self.finished.raise();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }

    /// Finished and fully consumed.
    pub fn is_drained(&self) -> bool {
        self.is_finished() && self.read_space() == 0
    }
}
