//! Resources held by one call
//!
//! Every slot is filled during setup and emptied during teardown. Slots are
//! independent, so a call that failed halfway releases exactly what it got.

use crate::live::LiveSession;
use crate::voice::{AudioBackend, AudioInput, PlaybackScheduler};

/// Capture stream handle type for a backend
type CaptureOf<B> = <<B as AudioBackend>::Input as AudioInput>::Handle;

/// Owned device contexts, capture stream and remote session
pub struct CallResources<B: AudioBackend> {
    pub live: Option<LiveSession>,
    pub scheduler: Option<PlaybackScheduler<B::Output>>,
    pub input: Option<B::Input>,
    pub capture: Option<CaptureOf<B>>,
}

impl<B: AudioBackend> Default for CallResources<B> {
    fn default() -> Self {
        Self {
            live: None,
            scheduler: None,
            input: None,
            capture: None,
        }
    }
}

impl<B: AudioBackend> CallResources<B> {
    /// Whether every slot is empty
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.live.is_none()
            && self.scheduler.is_none()
            && self.input.is_none()
            && self.capture.is_none()
    }

    /// Release everything in teardown order
    ///
    /// Remote session first, then playback, then both device contexts, then
    /// the capture stream. Errors are logged and never stop later steps.
    /// Safe to call repeatedly.
    #[allow(clippy::future_not_send)]
    pub async fn release(&mut self) {
        if let Some(mut live) = self.live.take() {
            if let Err(e) = live.close().await {
                tracing::warn!(error = %e, "failed to close live session");
            }
        }

        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.cancel_all();
        }

        if let Some(scheduler) = self.scheduler.take() {
            scheduler.close();
        }
        if let Some(input) = self.input.as_mut() {
            input.close();
        }

        match (self.capture.take(), self.input.as_mut()) {
            (Some(handle), Some(input)) => input.stop(handle),
            (Some(_), None) => tracing::debug!("capture stream dropped without its device"),
            _ => {}
        }
        self.input = None;

        tracing::debug!("call resources released");
    }
}
