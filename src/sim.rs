//! A headless [`PlaybackEngine`] that plays media on wall-clock timers.
//!
//! Nothing is decoded. The media length comes from a [`DurationProbe`], and
//! the position advances by `tick * rate` on every tick until the end of
//! the stream. This lets `camvault live --follow` exercise the whole
//! controller without a display.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cv_core::DurationProbe;
use cv_timeline::{EngineEvent, PlaybackEngine, PlaybackUri};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// State shared between the engine handle and its clock task.
///
/// Every event is sent while this lock is held and only if `generation`
/// still matches the task's, so nothing leaks out after a reset.
#[derive(Debug)]
struct Clock {
    generation: u64,
    playing: bool,
    rate: f32,
    position_ms: u64,
    length_ms: u64,
    /// Seek requested before the length was known.
    pending_seek: Option<f64>,
}

impl Default for Clock {
    fn default() -> Self {
        Self {
            generation: 0,
            playing: false,
            rate: 1.0,
            position_ms: 0,
            length_ms: 0,
            pending_seek: None,
        }
    }
}

pub struct SimulatedEngine {
    probe: Arc<dyn DurationProbe>,
    events: mpsc::UnboundedSender<EngineEvent>,
    tick: Duration,
    clock: Arc<Mutex<Clock>>,
    loaded: Option<PathBuf>,
    task: Option<JoinHandle<()>>,
}

impl SimulatedEngine {
    /// Create an engine and the receiver its events arrive on.
    pub fn new(
        probe: Arc<dyn DurationProbe>,
        tick: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            probe,
            events,
            tick,
            clock: Arc::new(Mutex::new(Clock::default())),
            loaded: None,
            task: None,
        };
        (engine, rx)
    }

    /// Invalidate the running clock task, if any.
    fn halt(&mut self) {
        let mut clock = self.clock.lock();
        clock.generation += 1;
        clock.playing = false;
        drop(clock);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn fault(&self, message: String) {
        tracing::error!("Simulated engine fault: {message}");
        let _ = self.events.send(EngineEvent::EngineError(message));
    }

    fn spawn_clock(&mut self, path: PathBuf) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.fault("no async runtime to drive playback".into());
                return;
            }
        };

        let generation = {
            let mut clock = self.clock.lock();
            clock.playing = true;
            clock.generation
        };
        let probe = Arc::clone(&self.probe);
        let events = self.events.clone();
        let shared = Arc::clone(&self.clock);
        let tick = self.tick;

        self.task = Some(handle.spawn(async move {
            run_clock(probe, path, events, shared, generation, tick).await;
        }));
    }
}

async fn run_clock(
    probe: Arc<dyn DurationProbe>,
    path: PathBuf,
    events: mpsc::UnboundedSender<EngineEvent>,
    shared: Arc<Mutex<Clock>>,
    generation: u64,
    tick: Duration,
) {
    let length = match probe.duration(&path).await {
        Ok(d) if !d.is_zero() => d,
        Ok(_) => {
            emit(&shared, generation, &events, |_| {
                Some(EngineEvent::EngineError(format!(
                    "{} has no playable length yet",
                    path.display()
                )))
            });
            return;
        }
        Err(e) => {
            emit(&shared, generation, &events, |_| {
                Some(EngineEvent::EngineError(e.to_string()))
            });
            return;
        }
    };

    let length_ms = u64::try_from(length.as_millis()).unwrap_or(u64::MAX);
    let live = emit(&shared, generation, &events, |clock| {
        clock.length_ms = length_ms;
        if let Some(target) = clock.pending_seek.take() {
            clock.position_ms = scale(target, length_ms);
        }
        Some(EngineEvent::LengthKnown { length_ms })
    });
    if !live {
        return;
    }
    emit(&shared, generation, &events, |_| Some(EngineEvent::PlaybackStarted));

    let tick_ms = tick.as_millis() as f64;
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let mut finished = false;
        let live = emit(&shared, generation, &events, |clock| {
            if !clock.playing {
                return None;
            }
            let step = (tick_ms * f64::from(clock.rate.max(0.0))) as u64;
            clock.position_ms = clock.position_ms.saturating_add(step).min(clock.length_ms);
            let position = clock.position_ms as f64 / clock.length_ms as f64;
            Some(EngineEvent::PositionChanged {
                position,
                time_ms: clock.position_ms,
            })
        });
        if !live {
            return;
        }
        emit(&shared, generation, &events, |clock| {
            if clock.playing && clock.position_ms >= clock.length_ms {
                clock.playing = false;
                finished = true;
                return Some(EngineEvent::EndOfStream);
            }
            None
        });
        if finished {
            tracing::debug!("Simulated playback of {} finished", path.display());
            return;
        }
    }
}

/// Apply `update` and send its event, unless the clock has moved on to a
/// newer generation. Returns whether the generation is still current.
fn emit(
    shared: &Mutex<Clock>,
    generation: u64,
    events: &mpsc::UnboundedSender<EngineEvent>,
    update: impl FnOnce(&mut Clock) -> Option<EngineEvent>,
) -> bool {
    let mut clock = shared.lock();
    if clock.generation != generation {
        return false;
    }
    if let Some(event) = update(&mut clock) {
        if events.send(event).is_err() {
            return false;
        }
    }
    true
}

fn scale(position: f64, length_ms: u64) -> u64 {
    (position.clamp(0.0, 1.0) * length_ms as f64) as u64
}

impl PlaybackEngine for SimulatedEngine {
    fn reset(&mut self) {
        self.halt();
        let mut clock = self.clock.lock();
        let generation = clock.generation;
        *clock = Clock {
            generation,
            ..Clock::default()
        };
        self.loaded = None;
    }

    fn load(&mut self, uri: &PlaybackUri) -> cv_core::Result<()> {
        if !uri.path().is_file() {
            return Err(cv_core::Error::not_found("media file", uri));
        }
        tracing::debug!("Simulated engine loaded {uri}");
        self.loaded = Some(uri.path().to_path_buf());
        Ok(())
    }

    fn play(&mut self) {
        let Some(path) = self.loaded.clone() else {
            self.fault("play requested with nothing loaded".into());
            return;
        };
        if self.task.as_ref().is_some_and(|t| !t.is_finished()) {
            self.clock.lock().playing = true;
            return;
        }
        self.spawn_clock(path);
    }

    fn seek(&mut self, position: f64) {
        let mut clock = self.clock.lock();
        if clock.length_ms == 0 {
            clock.pending_seek = Some(position);
        } else {
            clock.position_ms = scale(position, clock.length_ms);
        }
    }

    fn set_rate(&mut self, rate: f32) {
        self.clock.lock().rate = rate;
    }

    fn stop(&mut self) {
        self.halt();
        self.clock.lock().position_ms = 0;
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::path::Path;

    struct FixedProbe(Option<Duration>);

    #[async_trait]
    impl DurationProbe for FixedProbe {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn duration(&self, path: &Path) -> cv_core::Result<Duration> {
            self.0
                .ok_or_else(|| cv_core::Error::Probe(format!("no index in {}", path.display())))
        }
    }

    fn engine(length: Option<Duration>) -> (SimulatedEngine, mpsc::UnboundedReceiver<EngineEvent>) {
        SimulatedEngine::new(Arc::new(FixedProbe(length)), Duration::from_millis(250))
    }

    fn media() -> (tempfile::TempDir, PlaybackUri) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CAM_USB-20251104-143000.mp4");
        std::fs::write(&path, b"").unwrap();
        (dir, PlaybackUri::from_path(path))
    }

    #[tokio::test(start_paused = true)]
    async fn plays_to_the_end() {
        let (_dir, uri) = media();
        let (mut engine, mut rx) = engine(Some(Duration::from_secs(1)));
        engine.load(&uri).unwrap();
        engine.play();

        assert_eq!(rx.recv().await, Some(EngineEvent::LengthKnown { length_ms: 1000 }));
        assert_eq!(rx.recv().await, Some(EngineEvent::PlaybackStarted));
        let mut times = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                EngineEvent::PositionChanged { time_ms, .. } => times.push(time_ms),
                EngineEvent::EndOfStream => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(times, vec![250, 500, 750, 1000]);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_silences_old_media() {
        let (_dir, uri) = media();
        let (mut engine, mut rx) = engine(Some(Duration::from_secs(10)));
        engine.load(&uri).unwrap();
        engine.play();
        assert_matches!(rx.recv().await, Some(EngineEvent::LengthKnown { .. }));

        engine.reset();
        tokio::time::sleep(Duration::from_secs(2)).await;
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event, EngineEvent::PlaybackStarted);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn seek_and_rate_move_the_position() {
        let (_dir, uri) = media();
        let (mut engine, mut rx) = engine(Some(Duration::from_secs(10)));
        engine.load(&uri).unwrap();
        engine.seek(0.5);
        engine.set_rate(2.0);
        engine.play();

        assert_matches!(rx.recv().await, Some(EngineEvent::LengthKnown { .. }));
        assert_matches!(rx.recv().await, Some(EngineEvent::PlaybackStarted));
        assert_matches!(
            rx.recv().await,
            Some(EngineEvent::PositionChanged { time_ms: 5500, .. })
        );

        engine.seek(0.9);
        engine.set_rate(1.0);
        assert_matches!(
            rx.recv().await,
            Some(EngineEvent::PositionChanged { time_ms: 9250, .. })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unprobeable_media_is_an_engine_error() {
        let (_dir, uri) = media();
        let (mut engine, mut rx) = engine(None);
        engine.load(&uri).unwrap();
        engine.play();
        assert_matches!(rx.recv().await, Some(EngineEvent::EngineError(msg)) if msg.contains("no index"));
    }

    #[test]
    fn missing_file_fails_to_load() {
        let (mut engine, _rx) = engine(Some(Duration::from_secs(1)));
        let err = engine
            .load(&PlaybackUri::from_path("/no/such/camvault.mp4"))
            .unwrap_err();
        assert!(err.is_recoverable());
        assert_matches!(
            err,
            cv_core::Error::NotFound { entity, id } if entity == "media file" && id.ends_with("camvault.mp4")
        );
    }

    #[test]
    fn play_without_runtime_reports_a_fault() {
        let (_dir, uri) = media();
        let (mut engine, mut rx) = engine(Some(Duration::from_secs(1)));
        engine.load(&uri).unwrap();
        engine.play();
        assert_matches!(rx.try_recv(), Ok(EngineEvent::EngineError(_)));
    }
}
