//! The playback controller: one cooperative loop owning the playback
//! cursor.
//!
//! Commands arrive on an mpsc channel and engine notifications on another.
//! Directory scans, probing and ffmpeg runs happen in spawned tasks whose
//! results come back into the loop, so the loop itself never waits on a
//! collaborator. Everything observable is published on the [`EventBus`].

use std::sync::Arc;
use std::time::Duration;

use cv_core::config::{LiveConfig, SeekConfig};
use cv_core::events::{EventBus, EventPayload, PlaybackMode, TransportMode};
use cv_core::{Clip, RequestId, Segment, TimeRange};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::assembler::ClipAssembler;
use crate::engine::{EngineEvent, PlaybackEngine, PlaybackUri};
use crate::live::LiveTailSelector;
use crate::reconciler::{LiveReconciler, LiveUpdate};
use crate::resolver::TimeRangeResolver;
use crate::scrub::{ProgressThrottle, SeekGate, Transport};
use crate::supersede::RequestSlot;

/// Requests accepted by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    EnterLive,
    PlayRange(TimeRange),
    /// Seek to a normalised position.
    Seek(f64),
    /// `true` engages, `false` releases.
    FastForward(bool),
    Rewind(bool),
    Stop,
}

/// Cloneable sender side of a controller's command channel.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControlCommand>,
}

impl ControllerHandle {
    pub async fn send(&self, command: ControlCommand) -> cv_core::Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| cv_core::Error::Internal("playback controller has stopped".into()))
    }

    pub async fn enter_live(&self) -> cv_core::Result<()> {
        self.send(ControlCommand::EnterLive).await
    }

    pub async fn play_range(&self, range: TimeRange) -> cv_core::Result<()> {
        self.send(ControlCommand::PlayRange(range)).await
    }

    pub async fn seek(&self, position: f64) -> cv_core::Result<()> {
        self.send(ControlCommand::Seek(position)).await
    }

    pub async fn fast_forward(&self, engage: bool) -> cv_core::Result<()> {
        self.send(ControlCommand::FastForward(engage)).await
    }

    pub async fn rewind(&self, engage: bool) -> cv_core::Result<()> {
        self.send(ControlCommand::Rewind(engage)).await
    }

    pub async fn stop(&self) -> cv_core::Result<()> {
        self.send(ControlCommand::Stop).await
    }
}

/// Create a command channel for [`PlaybackController::run`].
pub fn command_channel(capacity: usize) -> (ControllerHandle, mpsc::Receiver<ControlCommand>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ControllerHandle { tx }, rx)
}

/// Timing knobs, usually taken from [`LiveConfig`] and [`SeekConfig`].
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub poll_interval: Duration,
    pub near_live_lookback: Option<Duration>,
    pub seek_tolerance: f64,
    pub seek_timeout: Duration,
    pub progress_interval: Duration,
    pub fast_forward_rate: f32,
    pub rewind_tick: Duration,
    pub rewind_step: Duration,
}

impl ControllerSettings {
    pub fn from_config(live: &LiveConfig, seek: &SeekConfig) -> Self {
        Self {
            poll_interval: live.poll_interval(),
            near_live_lookback: live.near_live_lookback(),
            seek_tolerance: seek.tolerance,
            seek_timeout: seek.timeout(),
            progress_interval: seek.progress_interval(),
            fast_forward_rate: live.fast_forward_rate,
            rewind_tick: live.rewind_tick(),
            rewind_step: live.rewind_step(),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&LiveConfig::default(), &SeekConfig::default())
    }
}

/// The timeline services the controller dispatches work to.
#[derive(Clone)]
pub struct PlaybackServices {
    pub resolver: Arc<TimeRangeResolver>,
    pub assembler: Arc<ClipAssembler>,
    pub selector: Arc<LiveTailSelector>,
}

/// Result of background work, delivered back into the loop.
enum Completion {
    Clip {
        request_id: RequestId,
        result: cv_core::Result<Clip>,
    },
    Live {
        request_id: RequestId,
        result: cv_core::Result<Segment>,
    },
}

/// What the controller knows about the loaded media.
#[derive(Debug, Default)]
struct MediaState {
    length_ms: Option<u64>,
    position: f64,
    playing: bool,
}

/// An engine together with its notification channel.
///
/// Resetting through the link also drops notifications already queued for
/// the old media.
struct EngineLink<E> {
    engine: E,
    events: mpsc::UnboundedReceiver<EngineEvent>,
}

impl<E: PlaybackEngine> PlaybackEngine for EngineLink<E> {
    fn reset(&mut self) {
        self.engine.reset();
        let mut stale = 0usize;
        while self.events.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            tracing::trace!("Dropped {stale} stale engine event(s)");
        }
    }

    fn load(&mut self, uri: &PlaybackUri) -> cv_core::Result<()> {
        tracing::debug!("Loading {uri}");
        self.engine.load(uri)
    }

    fn play(&mut self) {
        self.engine.play();
    }

    fn seek(&mut self, position: f64) {
        self.engine.seek(position);
    }

    fn set_rate(&mut self, rate: f32) {
        self.engine.set_rate(rate);
    }

    fn stop(&mut self) {
        self.engine.stop();
    }
}

/// Owns the playback cursor: mode, live state, pending seek, transport.
pub struct PlaybackController<E> {
    link: EngineLink<E>,
    resolver: Arc<TimeRangeResolver>,
    assembler: Arc<ClipAssembler>,
    live: LiveReconciler,
    bus: Arc<EventBus>,
    settings: ControllerSettings,
    mode: PlaybackMode,
    gate: SeekGate,
    throttle: ProgressThrottle,
    transport: Transport,
    media: MediaState,
    clip: Option<Clip>,
    clip_slot: RequestSlot,
    live_slot: RequestSlot,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
    next_poll: Option<Instant>,
    next_rewind: Option<Instant>,
}

impl<E: PlaybackEngine> PlaybackController<E> {
    pub fn new(
        engine: E,
        engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        services: PlaybackServices,
        settings: ControllerSettings,
        bus: Arc<EventBus>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            link: EngineLink {
                engine,
                events: engine_events,
            },
            resolver: services.resolver,
            assembler: services.assembler,
            live: LiveReconciler::new(services.selector, settings.near_live_lookback),
            bus,
            mode: PlaybackMode::Idle,
            gate: SeekGate::new(settings.seek_tolerance, settings.seek_timeout),
            throttle: ProgressThrottle::new(settings.progress_interval),
            transport: Transport::new(settings.fast_forward_rate, settings.rewind_step),
            settings,
            media: MediaState::default(),
            clip: None,
            clip_slot: RequestSlot::new(),
            live_slot: RequestSlot::new(),
            done_tx,
            done_rx,
            next_poll: None,
            next_rewind: None,
        }
    }

    /// Run until `shutdown` fires or every [`ControllerHandle`] is dropped.
    /// The session is stopped (and any held clip discarded) on the way out.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<ControlCommand>,
        shutdown: CancellationToken,
    ) {
        tracing::info!("Playback controller started");

        loop {
            let next_poll = self.next_poll;
            let next_rewind = self.next_rewind;

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(event) = self.link.events.recv() => self.on_engine_event(event).await,
                Some(done) = self.done_rx.recv() => self.on_completion(done).await,
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                () = wait_until(next_poll) => {
                    self.next_poll = None;
                    self.spawn_selection();
                }
                () = wait_until(next_rewind) => self.rewind_tick(),
            }
        }

        self.stop().await;
        tracing::info!("Playback controller stopped");
    }

    // -- Commands ----------------------------------------------------------

    async fn on_command(&mut self, command: ControlCommand) {
        tracing::debug!("Command {command:?}");
        match command {
            ControlCommand::EnterLive => self.enter_live().await,
            ControlCommand::PlayRange(range) => self.play_range(range),
            ControlCommand::Seek(position) => self.seek(position),
            ControlCommand::FastForward(true) => self.engage_fast_forward(),
            ControlCommand::FastForward(false) => {
                if self.transport.mode() == TransportMode::FastForward {
                    self.release_transport();
                }
            }
            ControlCommand::Rewind(true) => self.engage_rewind(),
            ControlCommand::Rewind(false) => {
                if self.transport.mode() == TransportMode::Rewind {
                    self.release_transport();
                }
            }
            ControlCommand::Stop => self.stop().await,
        }
    }

    async fn enter_live(&mut self) {
        self.clip_slot.cancel();
        self.release_transport();
        self.link.stop();
        self.drop_clip().await;
        self.live.stop();
        self.next_poll = None;

        self.set_mode(PlaybackMode::LiveFollow);
        self.spawn_selection();
    }

    fn play_range(&mut self, range: TimeRange) {
        if self.mode == PlaybackMode::LiveFollow {
            self.leave_live();
            self.link.stop();
        }
        self.release_transport();

        let ticket = self.clip_slot.begin();
        self.set_mode(PlaybackMode::ClipPlayback);
        self.bus.broadcast(EventPayload::ClipRequested {
            request_id: ticket.id,
            range,
        });

        let resolver = self.resolver.clone();
        let assembler = self.assembler.clone();
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let token = ticket.token.clone();
            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = async {
                    let span = resolver.resolve(range).await?;
                    assembler.assemble(&span, &token).await
                } => result,
            };
            let _ = done.send(Completion::Clip {
                request_id: ticket.id,
                result,
            });
        });
    }

    fn seek(&mut self, position: f64) {
        if self.mode == PlaybackMode::Idle {
            tracing::debug!("Ignoring seek while idle");
            return;
        }
        let target = self.gate.request(position, Instant::now());
        self.link.seek(target);
    }

    fn engage_fast_forward(&mut self) {
        if self.mode == PlaybackMode::Idle {
            return;
        }
        if self.transport.fast_forward(self.media.playing, &mut self.link) {
            self.gate.clear();
            self.next_rewind = None;
            self.publish_transport();
        }
    }

    fn engage_rewind(&mut self) {
        if self.mode == PlaybackMode::Idle {
            return;
        }
        if self.transport.rewind(&mut self.link) {
            self.gate.clear();
            self.publish_transport();
            self.rewind_tick();
        }
    }

    /// Stop everything and go idle.
    async fn stop(&mut self) {
        self.clip_slot.cancel();
        if self.mode == PlaybackMode::LiveFollow {
            self.leave_live();
            self.bus.broadcast(EventPayload::LiveEnded {
                reason: "stopped".into(),
            });
        }
        self.release_transport();
        self.link.stop();
        self.media.playing = false;
        self.drop_clip().await;
        self.set_mode(PlaybackMode::Idle);
    }

    // -- Background work ---------------------------------------------------

    fn spawn_selection(&mut self) {
        let ticket = self.live_slot.begin();
        let selector = self.live.selector().clone();
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = ticket.token.cancelled() => return,
                result = selector.select() => result,
            };
            let _ = done.send(Completion::Live {
                request_id: ticket.id,
                result,
            });
        });
    }

    async fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Clip { request_id, result } => self.on_clip(request_id, result).await,
            Completion::Live { request_id, result } => {
                if !self.live_slot.finish(request_id) || self.mode != PlaybackMode::LiveFollow {
                    tracing::trace!("Dropping stale live selection {request_id}");
                    return;
                }
                let update = if self.live.is_active() {
                    self.live.on_selection(result, &mut self.link)
                } else {
                    match self.live.start(result, &mut self.link) {
                        Ok(update) => Some(update),
                        Err(e) => {
                            report_failure("Could not enter live mode", &e);
                            Some(LiveUpdate::Ended(e.to_string()))
                        }
                    }
                };
                if let Some(update) = update {
                    self.apply_live_update(update);
                }
            }
        }
    }

    async fn on_clip(&mut self, request_id: RequestId, result: cv_core::Result<Clip>) {
        if !self.clip_slot.finish(request_id) {
            tracing::debug!("Dropping superseded clip request {request_id}");
            if let Ok(clip) = result {
                discard(&clip).await;
            }
            return;
        }

        let clip = match result {
            Ok(clip) => clip,
            Err(e) => {
                report_failure(&format!("Clip request {request_id} failed"), &e);
                self.bus.broadcast(EventPayload::ClipFailed {
                    request_id,
                    error: e.to_string(),
                });
                if self.clip.is_none() {
                    self.set_mode(PlaybackMode::Idle);
                }
                return;
            }
        };

        self.link.reset();
        self.reset_media();
        self.drop_clip().await;

        if let Err(e) = self.link.load(&PlaybackUri::from_path(clip.path())) {
            tracing::warn!("Engine could not open clip {}: {e}", clip.path().display());
            self.bus.broadcast(EventPayload::ClipFailed {
                request_id,
                error: e.to_string(),
            });
            discard(&clip).await;
            self.set_mode(PlaybackMode::Idle);
            return;
        }
        self.link.play();

        tracing::info!(clip_id = %clip.id, "Playing clip {}", clip.path().display());
        self.bus.broadcast(EventPayload::ClipReady {
            request_id,
            clip_id: clip.id,
            path: clip.path.clone(),
        });
        self.clip = Some(clip);
    }

    // -- Engine notifications ---------------------------------------------

    async fn on_engine_event(&mut self, event: EngineEvent) {
        match &event {
            EngineEvent::LengthKnown { length_ms } => {
                self.media.length_ms = Some(*length_ms);
                self.bus.broadcast(EventPayload::LengthKnown {
                    length_ms: *length_ms,
                });
            }
            EngineEvent::PositionChanged { position, time_ms } => {
                self.on_position(*position, *time_ms);
            }
            EngineEvent::PlaybackStarted => self.media.playing = true,
            EngineEvent::EndOfStream => {
                self.media.playing = false;
                self.release_transport();
            }
            EngineEvent::EngineError(message) => {
                tracing::error!("Playback engine error: {message}");
                self.media.playing = false;
                self.release_transport();
                self.bus.broadcast(EventPayload::EngineFault {
                    message: message.clone(),
                });
            }
        }

        match self.mode {
            PlaybackMode::LiveFollow => {
                if let Some(update) = self.live.on_engine_event(&event, &mut self.link) {
                    self.apply_live_update(update);
                }
            }
            PlaybackMode::ClipPlayback => {
                if matches!(event, EngineEvent::EngineError(_)) {
                    self.drop_clip().await;
                    self.set_mode(PlaybackMode::Idle);
                }
            }
            PlaybackMode::Idle => {}
        }
    }

    fn on_position(&mut self, position: f64, time_ms: u64) {
        self.media.position = position;
        let now = Instant::now();

        // Scrubbing: the UI follows every step.
        if !self.transport.is_active() {
            if !self.gate.admit(position, now) {
                tracing::trace!("Holding back stale position {position:.3}");
                return;
            }
            if !self.throttle.ready(now) {
                return;
            }
        }
        self.bus
            .broadcast(EventPayload::Position { position, time_ms });
    }

    fn apply_live_update(&mut self, update: LiveUpdate) {
        let now = Instant::now();
        match update {
            LiveUpdate::Loading(segment) => {
                self.reset_media();
                self.bus.broadcast(EventPayload::LiveLoading {
                    segment: segment.path,
                });
            }
            LiveUpdate::Following { segment, seek } => {
                if let Some(target) = seek {
                    self.gate.request(target, now);
                }
                self.bus.broadcast(EventPayload::LiveFollowing {
                    segment: segment.path,
                });
            }
            LiveUpdate::NearLiveSeek(target) => {
                self.gate.request(target, now);
            }
            LiveUpdate::AwaitingNext(segment) => {
                self.next_poll = Some(now + self.settings.poll_interval);
                self.bus.broadcast(EventPayload::LiveAwaitingNext {
                    segment: segment.path,
                });
            }
            LiveUpdate::Unchanged(segment) => {
                self.next_poll = Some(now + self.settings.poll_interval);
                self.bus.broadcast(EventPayload::LiveUnchanged {
                    segment: segment.path,
                });
            }
            LiveUpdate::Ended(reason) => {
                tracing::warn!("Live follow ended: {reason}");
                self.leave_live();
                self.bus.broadcast(EventPayload::LiveEnded { reason });
                self.set_mode(PlaybackMode::Idle);
            }
        }
    }

    // -- Helpers -----------------------------------------------------------

    fn rewind_tick(&mut self) {
        if self.transport.mode() != TransportMode::Rewind {
            self.next_rewind = None;
            return;
        }
        if let Some(target) = self
            .transport
            .rewind_target(self.media.position, self.media.length_ms)
        {
            self.link.seek(target);
            self.media.position = target;
            let time_ms = self
                .media
                .length_ms
                .map(|l| (l as f64 * target) as u64)
                .unwrap_or_default();
            self.bus.broadcast(EventPayload::Position {
                position: target,
                time_ms,
            });
        }
        self.next_rewind = Some(Instant::now() + self.settings.rewind_tick);
    }

    fn release_transport(&mut self) {
        self.next_rewind = None;
        if self.transport.release(&mut self.link) {
            self.publish_transport();
        }
    }

    fn publish_transport(&self) {
        tracing::debug!("Transport {:?}", self.transport.mode());
        self.bus.broadcast(EventPayload::TransportChanged {
            transport: self.transport.mode(),
        });
    }

    fn leave_live(&mut self) {
        self.live_slot.cancel();
        self.live.stop();
        self.next_poll = None;
    }

    /// Forget everything about the previous media after an engine reset.
    fn reset_media(&mut self) {
        self.media = MediaState::default();
        self.gate.clear();
        self.throttle.reset();
        if self.transport.is_active() {
            self.transport.clear();
            self.next_rewind = None;
            self.publish_transport();
        }
    }

    async fn drop_clip(&mut self) {
        if let Some(clip) = self.clip.take() {
            discard(&clip).await;
        }
    }

    fn set_mode(&mut self, mode: PlaybackMode) {
        if self.mode != mode {
            tracing::info!("Playback mode {:?} -> {mode:?}", self.mode);
            self.mode = mode;
            self.bus.broadcast(EventPayload::ModeChanged { mode });
        }
    }
}

/// Log a failed request; only faults the loop cannot move past are errors.
fn report_failure(what: &str, e: &cv_core::Error) {
    if e.is_recoverable() {
        tracing::warn!("{what}: {e}");
    } else {
        tracing::error!("{what}: {e}");
    }
}

async fn discard(clip: &Clip) {
    if let Err(e) = clip.discard().await {
        tracing::warn!("Could not discard clip {}: {e}", clip.path().display());
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
