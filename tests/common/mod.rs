//! Shared test utilities
//!
//! In-memory audio devices with a manual clock and a live connector backed
//! by channels, so calls run without audio hardware or network.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use character_call::live::{self, LiveChannels};
use character_call::voice::{AudioInput, FrameCallback, PlaybackSink, encode_outbound};
use character_call::{
    AudioBackend, AudioChunk, CallController, Config, Error, LiveConnector, LiveEvent,
    LiveSession, LiveSetup, PlaybackHandle, Result,
};

/// Everything the fake devices saw
#[derive(Default)]
pub struct DeviceLog {
    /// Lifecycle calls in order (`input.open`, `output.close`, ...)
    pub calls: Vec<&'static str>,
    /// Callback of the running capture stream
    pub on_frame: Option<FrameCallback>,
    /// `(handle, start_at, frames)` per scheduled chunk
    pub scheduled: Vec<(PlaybackHandle, f64, usize)>,
    pub stopped: Vec<PlaybackHandle>,
    /// Output device clock in seconds
    pub now: f64,
    pub fail_input: bool,
    pub fail_output: bool,
    pub fail_capture: bool,
}

/// Audio backend whose devices record into a shared [`DeviceLog`]
#[derive(Clone, Default)]
pub struct FakeBackend {
    log: Arc<Mutex<DeviceLog>>,
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MutexGuard<'_, DeviceLog> {
        self.log.lock().expect("device log poisoned")
    }

    /// Deliver a frame as the capture thread would; false if not capturing
    pub fn push_frame(&self, frame: Vec<f32>) -> bool {
        let mut log = self.log();
        match log.on_frame.as_mut() {
            Some(on_frame) => {
                on_frame(frame);
                true
            }
            None => false,
        }
    }

    pub fn set_time(&self, now: f64) {
        self.log().now = now;
    }

    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.log().calls.clone()
    }

    #[must_use]
    pub fn scheduled(&self) -> Vec<(PlaybackHandle, f64, usize)> {
        self.log().scheduled.clone()
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.log().on_frame.is_some()
    }
}

pub struct FakeCapture;

pub struct FakeInput {
    log: Arc<Mutex<DeviceLog>>,
}

impl AudioInput for FakeInput {
    type Handle = FakeCapture;

    fn start(&mut self, on_frame: FrameCallback) -> Result<FakeCapture> {
        let mut log = self.log.lock().expect("device log poisoned");
        if log.fail_capture {
            return Err(Error::MediaAccess("permission denied".to_string()));
        }
        log.calls.push("capture.start");
        log.on_frame = Some(on_frame);
        Ok(FakeCapture)
    }

    fn stop(&mut self, _handle: FakeCapture) {
        let mut log = self.log.lock().expect("device log poisoned");
        log.calls.push("capture.stop");
        log.on_frame = None;
    }

    fn close(&mut self) {
        self.log
            .lock()
            .expect("device log poisoned")
            .calls
            .push("input.close");
    }
}

pub struct FakeOutput {
    log: Arc<Mutex<DeviceLog>>,
}

impl PlaybackSink for FakeOutput {
    fn current_time(&self) -> f64 {
        self.log.lock().expect("device log poisoned").now
    }

    fn schedule(&mut self, handle: PlaybackHandle, chunk: AudioChunk, start_at: f64) -> Result<f64> {
        let mut log = self.log.lock().expect("device log poisoned");
        let started = start_at.max(log.now);
        log.scheduled.push((handle, started, chunk.frames()));
        Ok(started)
    }

    fn stop(&mut self, handle: PlaybackHandle) {
        self.log
            .lock()
            .expect("device log poisoned")
            .stopped
            .push(handle);
    }

    fn close(&mut self) {
        self.log
            .lock()
            .expect("device log poisoned")
            .calls
            .push("output.close");
    }
}

impl AudioBackend for FakeBackend {
    type Input = FakeInput;
    type Output = FakeOutput;

    fn open_input(&self, _sample_rate: u32, _frame_len: usize) -> Result<FakeInput> {
        let mut log = self.log();
        if log.fail_input {
            return Err(Error::MediaAccess("microphone busy".to_string()));
        }
        log.calls.push("input.open");
        Ok(FakeInput {
            log: Arc::clone(&self.log),
        })
    }

    fn open_output(
        &self,
        _sample_rate: u32,
        _completions: mpsc::UnboundedSender<PlaybackHandle>,
    ) -> Result<FakeOutput> {
        let mut log = self.log();
        if log.fail_output {
            return Err(Error::Audio("no output device".to_string()));
        }
        log.calls.push("output.open");
        Ok(FakeOutput {
            log: Arc::clone(&self.log),
        })
    }
}

/// How the fake connector answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectMode {
    #[default]
    Accept,
    Reject,
    Hang,
}

/// Live connector that hands the transport side of each session to the test
#[derive(Default)]
pub struct FakeConnector {
    mode: Mutex<ConnectMode>,
    transport: Mutex<Option<LiveChannels>>,
    setups: Mutex<Vec<LiveSetup>>,
}

impl FakeConnector {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_mode(&self, mode: ConnectMode) {
        *self.mode.lock().expect("mode poisoned") = mode;
    }

    /// Transport side of the most recent session
    pub fn take_transport(&self) -> LiveChannels {
        self.transport
            .lock()
            .expect("transport poisoned")
            .take()
            .expect("no session was opened")
    }

    #[must_use]
    pub fn setups(&self) -> Vec<LiveSetup> {
        self.setups.lock().expect("setups poisoned").clone()
    }
}

#[async_trait]
impl LiveConnector for FakeConnector {
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveSession> {
        self.setups
            .lock()
            .expect("setups poisoned")
            .push(setup.clone());

        let mode = *self.mode.lock().expect("mode poisoned");
        match mode {
            ConnectMode::Accept => {
                let (session, transport) = live::channel(Duration::from_millis(50));
                *self.transport.lock().expect("transport poisoned") = Some(transport);
                Ok(session)
            }
            ConnectMode::Reject => Err(Error::Connection("handshake refused".to_string())),
            ConnectMode::Hang => std::future::pending().await,
        }
    }
}

/// Configuration with short timeouts
#[must_use]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.live.connect_timeout = Duration::from_millis(100);
    config.live.close_timeout = Duration::from_millis(50);
    config
}

/// Controller wired to fresh fakes
#[must_use]
pub fn controller() -> (CallController<FakeBackend>, FakeBackend, Arc<FakeConnector>) {
    let backend = FakeBackend::new();
    let connector = FakeConnector::new();
    let controller = CallController::new(backend.clone(), connector.clone(), test_config());
    (controller, backend, connector)
}

/// Server content event from the JSON body of `serverContent`
#[must_use]
pub fn content(body: serde_json::Value) -> LiveEvent {
    let message = serde_json::from_value(serde_json::json!({ "serverContent": body }))
        .expect("invalid server content");
    LiveEvent::Message(message)
}

/// Base64 PCM payload of `frames` samples
#[must_use]
pub fn audio_payload(frames: usize) -> String {
    encode_outbound(&vec![0.25; frames]).data
}
