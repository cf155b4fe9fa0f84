//! Call session controller
//!
//! Owns everything one conversation needs and serializes every input
//! (microphone frames, protocol events, playback completions, user
//! commands) through a single task. Device streams are not `Send`, so the
//! controller lives on the task that created it.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use super::session::CallResources;
use super::state::{CallCommand, CallNotice, CallSnapshot, CallStats, CallStatus};
use super::transcript::{Speaker, TranscriptAggregator, TranscriptTurn};
use crate::live::{LiveConnector, LiveEvent, LiveSession, LiveSetup, ServerContent};
use crate::story::CharacterProfile;
use crate::voice::{
    AudioBackend, AudioInput, FrameCallback, PlaybackHandle, PlaybackScheduler, decode_inbound,
    encode_outbound,
};
use crate::{Config, Error, Result};

const NOTICE_CAPACITY: usize = 16;

/// Why [`CallController::run`] returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallExit {
    /// Call is over
    Ended,
    /// The user moved to another character; the old call is already torn down
    SwitchTo(String),
}

enum Input {
    Command(Option<CallCommand>),
    Event(Option<LiveEvent>),
    Frame(Vec<f32>),
    Completed(PlaybackHandle),
    SetupTimedOut,
}

/// Drives one call at a time against an audio backend and a live connector
pub struct CallController<B: AudioBackend> {
    backend: B,
    connector: Arc<dyn LiveConnector>,
    config: Config,

    status: CallStatus,
    character_id: Option<String>,
    mic_muted: bool,
    transcript: TranscriptAggregator,
    stats: CallStats,
    resources: CallResources<B>,
    /// Remote must acknowledge the setup before this instant
    setup_deadline: Option<Instant>,

    frames_tx: mpsc::UnboundedSender<Vec<f32>>,
    frames_rx: mpsc::UnboundedReceiver<Vec<f32>>,
    completions_rx: mpsc::UnboundedReceiver<PlaybackHandle>,

    state_tx: watch::Sender<CallSnapshot>,
    notice_tx: broadcast::Sender<CallNotice>,
}

impl<B: AudioBackend> CallController<B> {
    /// Create an idle controller
    #[must_use]
    pub fn new(backend: B, connector: Arc<dyn LiveConnector>, config: Config) -> Self {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (_, completions_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(CallSnapshot::default());
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);

        Self {
            backend,
            connector,
            config,
            status: CallStatus::Idle,
            character_id: None,
            mic_muted: false,
            transcript: TranscriptAggregator::new(),
            stats: CallStats::default(),
            resources: CallResources::default(),
            setup_deadline: None,
            frames_tx,
            frames_rx,
            completions_rx,
            state_tx,
            notice_tx,
        }
    }

    /// Watch the observable call state
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.state_tx.subscribe()
    }

    /// Receive one-shot notices (failures, call ended)
    #[must_use]
    pub fn notices(&self) -> broadcast::Receiver<CallNotice> {
        self.notice_tx.subscribe()
    }

    #[must_use]
    pub const fn status(&self) -> CallStatus {
        self.status
    }

    #[must_use]
    pub fn character_id(&self) -> Option<&str> {
        self.character_id.as_deref()
    }

    #[must_use]
    pub const fn is_mic_muted(&self) -> bool {
        self.mic_muted
    }

    /// Whether any synthesized speech is scheduled or playing
    #[must_use]
    pub fn is_ai_speaking(&self) -> bool {
        self.resources
            .scheduler
            .as_ref()
            .is_some_and(PlaybackScheduler::is_speaking)
    }

    #[must_use]
    pub fn transcript(&self) -> &[TranscriptTurn] {
        self.transcript.turns()
    }

    #[must_use]
    pub const fn stats(&self) -> CallStats {
        self.stats
    }

    /// Whether any device, stream or session is still held
    #[must_use]
    pub const fn holds_resources(&self) -> bool {
        !self.resources.is_released()
    }

    /// Playback scheduler of the active call
    #[must_use]
    pub const fn scheduler(&self) -> Option<&PlaybackScheduler<B::Output>> {
        self.resources.scheduler.as_ref()
    }

    /// Current observable state
    #[must_use]
    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            status: self.status,
            character_id: self.character_id.clone(),
            mic_muted: self.mic_muted,
            ai_speaking: self.is_ai_speaking(),
            transcripts: self.transcript.turns().to_vec(),
            stats: self.stats,
        }
    }

    /// Start a call with `character`
    ///
    /// Any active call is ended first. On failure every partially acquired
    /// resource is released, the status becomes `Ended` and a notice is
    /// sent.
    ///
    /// # Errors
    ///
    /// Returns `MediaAccess` if the microphone cannot be acquired, `Audio`
    /// if the speaker cannot be opened, or `Connection` if the live session
    /// cannot be established
    #[allow(clippy::future_not_send)]
    pub async fn start(&mut self, character: &CharacterProfile) -> Result<()> {
        if self.status.is_active() {
            self.finish("new call started").await;
        }

        self.transcript.reset();
        self.mic_muted = false;
        self.stats = CallStats::default();
        self.character_id = Some(character.id.clone());
        self.status = CallStatus::Connecting;
        self.publish();

        tracing::info!(character = %character.id, name = %character.name, "starting call");

        match self.acquire(character).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, character = %character.id, "call setup failed");
                self.resources.release().await;
                self.status = CallStatus::Ended;
                self.publish();

                let notice = if e.is_media_access() {
                    CallNotice::MediaAccessDenied(e.to_string())
                } else {
                    CallNotice::ConnectionFailed(e.to_string())
                };
                self.notify(notice);
                Err(e)
            }
        }
    }

    #[allow(clippy::future_not_send)]
    async fn acquire(&mut self, character: &CharacterProfile) -> Result<()> {
        let audio = self.config.audio;
        let deadline = Instant::now() + self.config.live.connect_timeout;

        // Fresh channels so nothing from a previous call leaks in
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        self.frames_tx = frames_tx;
        self.frames_rx = frames_rx;
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        self.completions_rx = completions_rx;

        let input = self
            .resources
            .input
            .insert(self.backend.open_input(audio.input_sample_rate, audio.frame_size)?);

        // Frames flow from here on; they are dropped until the remote opens
        let frames = self.frames_tx.clone();
        let on_frame: FrameCallback = Box::new(move |frame| {
            let _ = frames.send(frame);
        });
        self.resources.capture = Some(input.start(on_frame)?);

        let output = self
            .backend
            .open_output(audio.output_sample_rate, completions_tx)?;
        self.resources.scheduler = Some(PlaybackScheduler::new(output));

        let setup = LiveSetup {
            model: self.config.live.model.clone(),
            voice: self.config.live.voice.clone(),
            system_prompt: character.system_prompt(),
            transcribe_input: true,
            transcribe_output: true,
        };

        let session = tokio::time::timeout_at(deadline, self.connector.connect(&setup))
            .await
            .map_err(|_| Error::Connection("timed out connecting to live model".to_string()))??;

        self.resources.live = Some(session);
        self.setup_deadline = Some(deadline);
        tracing::debug!(model = %setup.model, "live session connecting");
        Ok(())
    }

    /// Apply one inbound session event
    #[allow(clippy::future_not_send)]
    pub async fn handle_event(&mut self, event: LiveEvent) {
        if !self.status.is_active() {
            tracing::trace!(?event, "ignoring event outside a call");
            return;
        }

        match event {
            LiveEvent::Opened => self.on_opened(),
            LiveEvent::Message(message) => {
                if let Some(content) = message.server_content {
                    self.on_content(&content);
                    self.publish();
                }
            }
            LiveEvent::Closed { reason } => {
                let reason = reason.unwrap_or_else(|| "remote closed the session".to_string());
                tracing::info!(%reason, "live session closed");
                self.finish(&reason).await;
            }
            LiveEvent::Error(e) => {
                tracing::warn!(error = %e, "live session failed");
                self.notify(CallNotice::ConnectionFailed(e.clone()));
                self.finish(&e).await;
            }
        }
    }

    fn on_opened(&mut self) {
        if self.status != CallStatus::Connecting {
            return;
        }

        self.setup_deadline = None;
        self.status = CallStatus::Connected;
        tracing::info!(character = ?self.character_id, "call connected");
        self.publish();
    }

    /// Give up on a remote that accepted the connection but never opened
    #[allow(clippy::future_not_send)]
    async fn on_setup_timeout(&mut self) {
        self.setup_deadline = None;
        if self.status != CallStatus::Connecting {
            return;
        }

        let reason = "timed out waiting for the live session to open";
        tracing::warn!(timeout = ?self.config.live.connect_timeout, "{reason}");
        self.notify(CallNotice::ConnectionFailed(reason.to_string()));
        self.finish(reason).await;
    }

    /// Interruption first, then transcripts, then audio
    fn on_content(&mut self, content: &ServerContent) {
        if content.interrupted {
            if let Some(scheduler) = self.resources.scheduler.as_mut() {
                scheduler.cancel_all();
            }
            tracing::debug!("model interrupted");
        }

        if let Some(text) = content.input_text() {
            self.transcript.append(Speaker::User, text);
        }
        if let Some(text) = content.output_text() {
            self.transcript.append(Speaker::Character, text);
        }

        let sample_rate = self.config.audio.output_sample_rate;
        for payload in content.audio_payloads() {
            if content.interrupted {
                self.stats.chunks_dropped += 1;
                continue;
            }

            let Some(scheduler) = self.resources.scheduler.as_mut() else {
                self.stats.chunks_dropped += 1;
                continue;
            };

            let queued = decode_inbound(payload, sample_rate, 1)
                .and_then(|chunk| scheduler.enqueue(chunk));
            match queued {
                Ok(_) => self.stats.chunks_scheduled += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping inbound audio chunk");
                    self.stats.chunks_dropped += 1;
                }
            }
        }
    }

    /// Forward one captured frame unless muted
    pub fn on_frame(&mut self, frame: &[f32]) {
        self.stats.frames_captured += 1;

        if self.mic_muted || self.status != CallStatus::Connected {
            return;
        }
        let Some(live) = self.resources.live.as_ref() else {
            return;
        };

        match live.send_audio(encode_outbound(frame)) {
            Ok(()) => self.stats.frames_sent += 1,
            Err(e) => tracing::debug!(error = %e, "dropping outbound frame"),
        }
    }

    /// Record natural completion of a playback handle
    pub fn on_playback_complete(&mut self, handle: PlaybackHandle) {
        let emptied = self
            .resources
            .scheduler
            .as_mut()
            .is_some_and(|scheduler| scheduler.complete(handle));

        if emptied {
            tracing::trace!(%handle, "character finished speaking");
            self.publish();
        }
    }

    /// Mute or unmute outbound audio; the microphone keeps running
    pub fn set_muted(&mut self, muted: bool) {
        if self.mic_muted != muted {
            self.mic_muted = muted;
            tracing::debug!(muted, "microphone mute changed");
            self.publish();
        }
    }

    /// Flip the mute flag and return the new value
    pub fn toggle_mute(&mut self) -> bool {
        self.set_muted(!self.mic_muted);
        self.mic_muted
    }

    /// Hang up
    ///
    /// Safe to call in any state and more than once.
    #[allow(clippy::future_not_send)]
    pub async fn end(&mut self) {
        self.finish("call ended").await;
    }

    /// End the active call because the displayed character changed
    #[allow(clippy::future_not_send)]
    pub async fn switch_character(&mut self, id: &str) {
        if self.status.is_active() {
            tracing::info!(to = id, "switching character, ending call");
        }
        self.finish("switched character").await;
    }

    #[allow(clippy::future_not_send)]
    async fn finish(&mut self, reason: &str) {
        let was_active = self.status.is_active();

        self.resources.release().await;
        self.setup_deadline = None;

        if self.status != CallStatus::Idle {
            self.status = CallStatus::Ended;
        }
        self.publish();

        if was_active {
            tracing::info!(
                reason,
                frames_sent = self.stats.frames_sent,
                chunks_scheduled = self.stats.chunks_scheduled,
                "call ended"
            );
            self.notify(CallNotice::Ended {
                reason: reason.to_string(),
            });
        }
    }

    /// Wait for and apply the next input
    ///
    /// Breaks once the call is over.
    #[allow(clippy::future_not_send)]
    pub async fn step(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<CallCommand>,
    ) -> ControlFlow<CallExit> {
        let input = tokio::select! {
            command = commands.recv() => Input::Command(command),
            event = next_event(&mut self.resources.live) => Input::Event(event),
            Some(frame) = self.frames_rx.recv() => Input::Frame(frame),
            Some(handle) = self.completions_rx.recv() => Input::Completed(handle),
            () = wait_until(self.setup_deadline) => Input::SetupTimedOut,
        };

        match input {
            Input::Command(None | Some(CallCommand::End)) => self.end().await,
            Input::Command(Some(CallCommand::SetMuted(muted))) => self.set_muted(muted),
            Input::Command(Some(CallCommand::ToggleMute)) => {
                self.toggle_mute();
            }
            Input::Command(Some(CallCommand::SwitchCharacter(id))) => {
                self.switch_character(&id).await;
                return ControlFlow::Break(CallExit::SwitchTo(id));
            }
            Input::Event(Some(event)) => self.handle_event(event).await,
            Input::Event(None) => {
                self.handle_event(LiveEvent::Closed { reason: None })
                    .await;
            }
            Input::Frame(frame) => self.on_frame(&frame),
            Input::Completed(handle) => self.on_playback_complete(handle),
            Input::SetupTimedOut => self.on_setup_timeout().await,
        }

        if self.status.is_active() {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(CallExit::Ended)
        }
    }

    /// Process inputs until the call ends
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self, commands: &mut mpsc::UnboundedReceiver<CallCommand>) -> CallExit {
        loop {
            if let ControlFlow::Break(exit) = self.step(commands).await {
                return exit;
            }
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot());
    }

    fn notify(&self, notice: CallNotice) {
        // No subscribers is fine
        let _ = self.notice_tx.send(notice);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_event(live: &mut Option<LiveSession>) -> Option<LiveEvent> {
    match live {
        Some(session) => session.recv().await,
        None => std::future::pending().await,
    }
}
