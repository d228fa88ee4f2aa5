//! Fakes and fixtures shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use cv_core::{DurationProbe, MediaCutter, TrimRequest};
use parking_lot::Mutex;

use crate::engine::{PlaybackEngine, PlaybackUri};
use crate::live::LockProbe;

/// 2025-11-04 at the given wall-clock time.
pub fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 11, 4)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

/// Create an empty file named `name` in `dir`.
pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"").unwrap();
    path
}

fn name_of(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().to_string()
}

// ---------------------------------------------------------------------------
// Duration probe
// ---------------------------------------------------------------------------

/// Durations keyed by file name; unknown files fail to probe.
#[derive(Default)]
pub struct MapProbe {
    durations: Mutex<HashMap<String, Duration>>,
    pub calls: Mutex<Vec<String>>,
}

impl MapProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, name: &str, secs: u64) {
        self.durations
            .lock()
            .insert(name.to_string(), Duration::from_secs(secs));
    }
}

#[async_trait]
impl DurationProbe for MapProbe {
    fn name(&self) -> &'static str {
        "map"
    }

    async fn duration(&self, path: &Path) -> cv_core::Result<Duration> {
        let name = name_of(path);
        self.calls.lock().push(name.clone());
        self.durations
            .lock()
            .get(&name)
            .copied()
            .ok_or_else(|| cv_core::Error::Probe(format!("moov atom not found in {name}")))
    }
}

// ---------------------------------------------------------------------------
// Lock probe
// ---------------------------------------------------------------------------

/// Reports the named files as locked.
#[derive(Default)]
pub struct SetLocks {
    locked: Mutex<HashSet<String>>,
}

impl SetLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lock(&self, name: &str) {
        self.locked.lock().insert(name.to_string());
    }

    pub fn unlock(&self, name: &str) {
        self.locked.lock().remove(name);
    }
}

impl LockProbe for SetLocks {
    fn is_locked(&self, path: &Path) -> bool {
        self.locked.lock().contains(&name_of(path))
    }
}

// ---------------------------------------------------------------------------
// Cutter
// ---------------------------------------------------------------------------

/// Writes placeholder outputs and records every call; can be scripted to
/// fail a given trim (0-based) or the concat, or to hang forever.
#[derive(Default)]
pub struct ScriptedCutter {
    pub fail_trim_at: Option<usize>,
    pub fail_concat: bool,
    pub hang: bool,
    pub trims: Mutex<Vec<TrimRequest>>,
    pub concats: Mutex<Vec<(Vec<PathBuf>, PathBuf)>>,
}

#[async_trait]
impl MediaCutter for ScriptedCutter {
    async fn trim(&self, request: &TrimRequest) -> cv_core::Result<()> {
        let index = {
            let mut trims = self.trims.lock();
            trims.push(request.clone());
            trims.len() - 1
        };
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail_trim_at == Some(index) {
            // Leave a partial fragment behind, as a crashed ffmpeg would.
            std::fs::write(&request.output, b"partial")?;
            return Err(cv_core::Error::tool("ffmpeg", "exited with status 1: Invalid data"));
        }
        std::fs::write(&request.output, b"fragment")?;
        Ok(())
    }

    async fn concat(&self, fragments: &[PathBuf], output: &Path) -> cv_core::Result<()> {
        self.concats
            .lock()
            .push((fragments.to_vec(), output.to_path_buf()));
        if self.fail_concat {
            return Err(cv_core::Error::tool("ffmpeg", "concat failed"));
        }
        std::fs::write(output, b"merged")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Playback engine
// ---------------------------------------------------------------------------

/// One recorded engine command.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Reset,
    Load(PathBuf),
    Play,
    Seek(f64),
    SetRate(f32),
    Stop,
}

/// Records commands; shares its log so tests can inspect it after the
/// engine has been moved into a controller.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    pub calls: Arc<Mutex<Vec<EngineCall>>>,
    pub fail_load: Arc<Mutex<bool>>,
}

impl RecordingEngine {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn loads(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                EngineCall::Load(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                EngineCall::Seek(p) => Some(*p),
                _ => None,
            })
            .collect()
    }
}

impl PlaybackEngine for RecordingEngine {
    fn reset(&mut self) {
        self.calls.lock().push(EngineCall::Reset);
    }

    fn load(&mut self, uri: &PlaybackUri) -> cv_core::Result<()> {
        if *self.fail_load.lock() {
            return Err(cv_core::Error::Engine("cannot open media".into()));
        }
        self.calls.lock().push(EngineCall::Load(uri.path().to_path_buf()));
        Ok(())
    }

    fn play(&mut self) {
        self.calls.lock().push(EngineCall::Play);
    }

    fn seek(&mut self, position: f64) {
        self.calls.lock().push(EngineCall::Seek(position));
    }

    fn set_rate(&mut self, rate: f32) {
        self.calls.lock().push(EngineCall::SetRate(rate));
    }

    fn stop(&mut self) {
        self.calls.lock().push(EngineCall::Stop);
    }
}
