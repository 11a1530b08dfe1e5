//! Bounded PCM exchange buffer between the processing loop and the caller.
//!
//! The buffer is the single hand-off point for sample data. The backend's
//! real-time loop pushes captured bytes in (or drains playback bytes out)
//! while the caller blocks on the opposite side, synchronized by two
//! condition variables. Occupancy is bounded by a high-water mark derived
//! from the configured latency; the capture side enforces it by discarding
//! the oldest bytes.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Longest time a blocking read or write waits before giving up.
///
/// A timeout is not an error: reads return no data and writes report the
/// data as not accepted.
pub const WAIT_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Default)]
struct BufferState {
    data: Vec<u8>,
    high_water: usize,
}

/// Condvar-synchronized byte buffer with a high-water mark.
#[derive(Default)]
pub struct ExchangeBuffer {
    state: Mutex<BufferState>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl ExchangeBuffer {
    /// Creates an empty buffer with a high-water mark of zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the high-water mark in bytes.
    pub fn set_high_water(&self, high_water: usize) {
        self.lock().high_water = high_water;
    }

    /// Current high-water mark in bytes.
    pub fn high_water(&self) -> usize {
        self.lock().high_water
    }

    /// Current occupancy in bytes.
    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    /// Returns `true` if the buffer holds no data.
    pub fn is_empty(&self) -> bool {
        self.lock().data.is_empty()
    }

    /// Discards all buffered data and wakes blocked writers.
    pub fn clear(&self) {
        self.lock().data.clear();
        self.not_full.notify_all();
    }

    /// Pushes a captured chunk, enforcing the high-water mark.
    ///
    /// A chunk at least as large as the mark replaces the entire contents;
    /// a smaller chunk is appended and the oldest bytes are dropped until
    /// occupancy is back at the mark. With a zero mark (no format
    /// negotiated yet) every chunk replaces the contents, so occupancy
    /// stays bounded by the newest chunk. Wakes blocked readers.
    pub fn push_captured(&self, chunk: &[u8]) {
        {
            let mut state = self.lock();

            if chunk.len() >= state.high_water {
                state.data.clear();
                state.data.extend_from_slice(chunk);
            } else {
                state.data.extend_from_slice(chunk);
                if state.data.len() > state.high_water {
                    let excess = state.data.len() - state.high_water;
                    state.data.drain(..excess);
                }
            }
        }
        self.not_empty.notify_all();
    }

    /// Copies up to `out.len()` bytes from the head into `out` and drops
    /// the copied prefix. Returns the number of bytes copied.
    ///
    /// Wakes blocked writers once occupancy falls below the mark.
    pub fn drain_into(&self, out: &mut [u8]) -> usize {
        let below_mark;
        let copied;
        {
            let mut state = self.lock();
            copied = out.len().min(state.data.len());
            out[..copied].copy_from_slice(&state.data[..copied]);
            state.data.drain(..copied);
            below_mark = state.data.len() < state.high_water;
        }
        if below_mark {
            self.not_full.notify_all();
        }
        copied
    }

    /// Takes the full contents, waiting up to [`WAIT_TIMEOUT`] for data.
    ///
    /// Returns an empty vector when no data arrived in time.
    pub fn take_all(&self) -> Vec<u8> {
        let mut state = self.lock();

        if state.data.is_empty() {
            let (guard, _timeout) = self
                .not_empty
                .wait_timeout(state, WAIT_TIMEOUT)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }

        std::mem::take(&mut state.data)
    }

    /// Waits up to [`WAIT_TIMEOUT`] for occupancy to drop below the mark.
    ///
    /// Returns `false` if the buffer is still at or above the mark after
    /// the wait, meaning the caller's data should be dropped. A zero mark
    /// can never be dropped below, so writes always fail until a format
    /// has been negotiated.
    pub fn wait_writable(&self) -> bool {
        let mut state = self.lock();

        if state.data.len() >= state.high_water {
            let (guard, _timeout) = self
                .not_full
                .wait_timeout(state, WAIT_TIMEOUT)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }

        state.data.len() < state.high_water
    }

    /// Appends playback bytes without waking anyone.
    ///
    /// Admission control happens in [`Self::wait_writable`]; the append
    /// itself is unconditional.
    pub fn append(&self, bytes: &[u8]) {
        self.lock().data.extend_from_slice(bytes);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_small_chunks_append_fifo() {
        let buffer = ExchangeBuffer::new();
        buffer.set_high_water(16);

        buffer.push_captured(&[1, 2, 3]);
        buffer.push_captured(&[4, 5]);

        let mut out = [0u8; 8];
        let copied = buffer.drain_into(&mut out);
        assert_eq!(copied, 5);
        assert_eq!(&out[..5], &[1, 2, 3, 4, 5]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_high_water_trims_oldest() {
        let buffer = ExchangeBuffer::new();
        buffer.set_high_water(4);

        buffer.push_captured(&[1, 2, 3]);
        buffer.push_captured(&[4, 5]);
        assert_eq!(buffer.len(), 4);

        let mut out = [0u8; 4];
        buffer.drain_into(&mut out);
        // Byte 1 was the oldest and is gone.
        assert_eq!(out, [2, 3, 4, 5]);
    }

    #[test]
    fn test_oversized_chunk_replaces_contents() {
        let buffer = ExchangeBuffer::new();
        buffer.set_high_water(4);

        buffer.push_captured(&[1, 2, 3]);
        buffer.push_captured(&[9, 9, 9, 9, 9]);

        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.take_all(), vec![9, 9, 9, 9, 9]);
    }

    #[test]
    fn test_zero_mark_keeps_newest_chunk_only() {
        let buffer = ExchangeBuffer::new();
        buffer.push_captured(&[1; 100]);
        buffer.push_captured(&[2; 60]);
        assert_eq!(buffer.take_all(), vec![2; 60]);
    }

    #[test]
    fn test_partial_drain_keeps_tail() {
        let buffer = ExchangeBuffer::new();
        buffer.set_high_water(16);
        buffer.push_captured(&[1, 2, 3, 4, 5, 6]);

        let mut out = [0u8; 4];
        assert_eq!(buffer.drain_into(&mut out), 4);
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(buffer.take_all(), vec![5, 6]);
    }

    #[test]
    fn test_take_all_times_out_empty() {
        let buffer = ExchangeBuffer::new();
        let start = Instant::now();
        let data = buffer.take_all();
        assert!(data.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[test]
    fn test_take_all_wakes_on_capture() {
        let buffer = Arc::new(ExchangeBuffer::new());
        buffer.set_high_water(64);

        let writer = buffer.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            writer.push_captured(&[7, 8, 9]);
        });

        let start = Instant::now();
        let data = buffer.take_all();
        handle.join().unwrap();

        assert_eq!(data, vec![7, 8, 9]);
        assert!(start.elapsed() < Duration::from_millis(900));
    }

    #[test]
    fn test_wait_writable_times_out_at_mark() {
        let buffer = ExchangeBuffer::new();
        buffer.set_high_water(2);
        buffer.append(&[0, 0]);

        let start = Instant::now();
        assert!(!buffer.wait_writable());
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[test]
    fn test_wait_writable_wakes_on_drain() {
        let buffer = Arc::new(ExchangeBuffer::new());
        buffer.set_high_water(4);
        buffer.append(&[0; 4]);

        let reader = buffer.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut out = [0u8; 4];
            reader.drain_into(&mut out);
        });

        let start = Instant::now();
        assert!(buffer.wait_writable());
        handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_millis(900));
    }

    #[test]
    fn test_clear_wakes_writer() {
        let buffer = Arc::new(ExchangeBuffer::new());
        buffer.set_high_water(2);
        buffer.append(&[0, 0]);

        let clearer = buffer.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            clearer.clear();
        });

        assert!(buffer.wait_writable());
        handle.join().unwrap();
    }
}
