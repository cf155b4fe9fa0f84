//! Gapless playback scheduling
//!
//! Chunks are placed on the output device's own clock instead of being
//! queued behind timers: each chunk starts at `max(clock, device_now)` and
//! pushes the clock forward by its duration. Back-to-back chunks therefore
//! play in enqueue order with no overlap and no gap, and interruption is a
//! matter of stopping every active handle and zeroing the clock.

use std::collections::BTreeSet;
use std::fmt;

use crate::Result;
use crate::voice::AudioChunk;

/// One scheduled chunk on the output device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaybackHandle(u64);

impl PlaybackHandle {
    /// Wrap a raw handle id
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Raw handle id
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An output device context that plays chunks at absolute times
///
/// Natural completion of a scheduled chunk is reported out of band (the
/// device sends the handle on a completion channel); stopped chunks are
/// never reported.
pub trait PlaybackSink {
    /// Current device clock in seconds
    fn current_time(&self) -> f64;

    /// Play `chunk` starting at device time `start_at`
    ///
    /// Returns the device time the chunk will actually start, which is
    /// later than `start_at` if the device has already moved past it.
    ///
    /// # Errors
    ///
    /// Returns error if the device rejects the chunk
    fn schedule(&mut self, handle: PlaybackHandle, chunk: AudioChunk, start_at: f64) -> Result<f64>;

    /// Stop a scheduled or playing chunk immediately
    fn stop(&mut self, handle: PlaybackHandle);

    /// Release the device
    fn close(&mut self);
}

/// Owns the active-handle set and the schedule clock for one call
pub struct PlaybackScheduler<S> {
    sink: S,
    active: BTreeSet<PlaybackHandle>,
    next_start: f64,
    next_id: u64,
}

impl<S: PlaybackSink> PlaybackScheduler<S> {
    /// Create a scheduler over an opened output device
    pub const fn new(sink: S) -> Self {
        Self {
            sink,
            active: BTreeSet::new(),
            next_start: 0.0,
            next_id: 0,
        }
    }

    /// Schedule a chunk right after everything already enqueued
    ///
    /// # Errors
    ///
    /// Returns error if the device rejects the chunk; the clock and the
    /// active set are left untouched
    pub fn enqueue(&mut self, chunk: AudioChunk) -> Result<PlaybackHandle> {
        let start_at = self.next_start.max(self.sink.current_time());
        let duration = chunk.duration_secs();

        self.next_id += 1;
        let handle = PlaybackHandle(self.next_id);

        let started = self.sink.schedule(handle, chunk, start_at)?;
        self.next_start = started.max(start_at) + duration;
        self.active.insert(handle);

        tracing::trace!(%handle, start_at = started, duration, "chunk scheduled");
        Ok(handle)
    }

    /// Record natural completion of a handle
    ///
    /// Returns true if this emptied the active set. Unknown handles (already
    /// cancelled) are ignored.
    pub fn complete(&mut self, handle: PlaybackHandle) -> bool {
        self.active.remove(&handle) && self.active.is_empty()
    }

    /// Stop everything and reset the clock
    ///
    /// Returns how many handles were stopped.
    pub fn cancel_all(&mut self) -> usize {
        let stopped = self.active.len();
        for handle in std::mem::take(&mut self.active) {
            self.sink.stop(handle);
        }
        self.next_start = 0.0;

        if stopped > 0 {
            tracing::debug!(stopped, "playback cancelled");
        }
        stopped
    }

    /// Whether any chunk is scheduled or playing
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    /// Number of scheduled or playing chunks
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Start time the next chunk would get if the device clock were zero
    #[must_use]
    pub const fn schedule_clock(&self) -> f64 {
        self.next_start
    }

    /// Access the underlying device
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the underlying device
    pub const fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Cancel playback and release the device
    pub fn close(mut self) {
        self.cancel_all();
        self.sink.close();
    }
}
