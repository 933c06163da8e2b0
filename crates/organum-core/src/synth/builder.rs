//! Rank build service
//!
//! Divisions and ranks are built on a background thread and handed to the
//! audio thread fully formed, through the engine's message queue.
//!
//! ```text
//! ┌──────────┐  BuildRequest   ┌─────────────┐  EngineMessage   ┌─────────────┐
//! │  Player  │ ──────────────► │ RankBuilder │ ───────────────► │ OrganEngine │
//! └──────────┘   (crossbeam)   └─────────────┘      (rtrb)      └─────────────┘
//!                                     │
//!                                     ▼
//!                               .orw cache
//! ```

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use basedrop::Owned;
use crossbeam::channel::{self, Receiver, SendError, Sender};

use crate::engine::command::{EngineMessage, MessageSender};
use crate::engine::division::Division;
use crate::engine::gc::gc_handle;

use super::cache::{self, CacheError};
use super::rankwave::Rankwave;
use super::scales::Tuning;
use super::stop::StopDefinition;

/// Pause between attempts to post into a full message queue
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Attempts before a message is given up
const RETRY_LIMIT: usize = 500;

/// Work for the build thread
pub enum BuildRequest {
    /// Create a division sounding into `section`
    NewDivision {
        section: usize,
        /// Keyboard assigned on linkage 0
        keyboard: Option<u8>,
        swell: f32,
        tfreq: f32,
        tmodd: f32,
    },
    /// Build (or load) a rank and install it
    Rank {
        division: u8,
        rank: u8,
        stop: Box<StopDefinition>,
        tuning: Tuning,
    },
    Shutdown,
}

/// Handle to the build thread
pub struct RankBuilder {
    command_tx: Sender<BuildRequest>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl RankBuilder {
    /// Spawn the build thread
    ///
    /// Ranks are cached in `cache_dir` when one is given.
    pub fn spawn(sample_rate: f32, cache_dir: Option<PathBuf>, messages: MessageSender) -> std::io::Result<Self> {
        let (command_tx, command_rx) = channel::unbounded();

        let thread_handle = thread::Builder::new()
            .name("organum-builder".to_string())
            .spawn(move || {
                let worker = Worker {
                    sample_rate,
                    cache_dir,
                    messages,
                };
                worker.run(command_rx);
            })?;

        Ok(Self {
            command_tx,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn send(&self, request: BuildRequest) -> Result<(), SendError<BuildRequest>> {
        self.command_tx.send(request)
    }

    /// Check if the service is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Finish queued work and join the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.command_tx.send(BuildRequest::Shutdown);
            if handle.join().is_err() {
                log::error!("Rank builder thread panicked");
            }
        }
    }
}

impl Drop for RankBuilder {
    fn drop(&mut self) {
        self.stop();
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// 64-bit FNV-1a
fn fnv1a(hash: u64, bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(hash, |h, &b| (h ^ b as u64).wrapping_mul(FNV_PRIME))
}

/// Seed for a stop's random detune
///
/// Fixed for a given name and file name on every build, so a cached rank
/// and a freshly synthesized one agree.
fn stop_seed(stop: &StopDefinition) -> u64 {
    let h = fnv1a(FNV_OFFSET, stop.name.as_bytes());
    let h = fnv1a(h, &[0]);
    fnv1a(h, stop.filename.as_bytes())
}

struct Worker {
    sample_rate: f32,
    cache_dir: Option<PathBuf>,
    messages: MessageSender,
}

impl Worker {
    fn run(mut self, command_rx: Receiver<BuildRequest>) {
        log::info!("Rank builder started ({} Hz)", self.sample_rate);

        while let Ok(request) = command_rx.recv() {
            match request {
                BuildRequest::NewDivision {
                    section,
                    keyboard,
                    swell,
                    tfreq,
                    tmodd,
                } => {
                    let mut division = Division::new(section, self.sample_rate);
                    if let Some(k) = keyboard {
                        division.set_div_mask(k as usize, 0);
                    }
                    division.set_swell(swell);
                    division.set_tfreq(tfreq);
                    division.set_tmodd(tmodd);
                    log::info!("Created division on section {} (keyboard {:?})", section, keyboard);
                    self.post(EngineMessage::NewDivision(Owned::new(&gc_handle(), division)));
                }
                BuildRequest::Rank {
                    division,
                    rank,
                    stop,
                    tuning,
                } => {
                    let rankwave = self.build_rank(&stop, &tuning);
                    self.post(EngineMessage::SetRank {
                        division,
                        rank,
                        rankwave: Owned::new(&gc_handle(), rankwave),
                        delay_ms: stop.delay_ms,
                        pan: stop.pan,
                    });
                }
                BuildRequest::Shutdown => break,
            }
        }

        log::info!("Rank builder stopped");
    }

    /// Load a rank from the cache, or synthesize and cache it
    fn build_rank(&self, stop: &StopDefinition, tuning: &Tuning) -> Rankwave {
        let path = self.cache_dir.as_ref().map(|dir| cache::cache_path(dir, stop));

        if let Some(path) = &path {
            match cache::load(path, stop, self.sample_rate, tuning) {
                Ok(rank) => {
                    log::info!("Loaded '{}' from {}", stop.name, path.display());
                    return rank;
                }
                Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::debug!("No cached waves for '{}'", stop.name);
                }
                Err(e) => log::warn!("Ignoring cache for '{}': {}", stop.name, e),
            }
        }

        let start = Instant::now();
        let rank = Rankwave::gen_waves(stop, self.sample_rate, tuning, stop_seed(stop));
        log::info!("Synthesized '{}' in {:?}", stop.name, start.elapsed());

        if let Some(path) = &path {
            match cache::save(path, &rank, self.sample_rate, tuning) {
                Ok(()) => log::info!("Cached '{}' to {}", stop.name, path.display()),
                Err(e) => log::warn!("Failed to cache '{}': {}", stop.name, e),
            }
        }
        rank
    }

    /// Post to the audio thread, waiting while its queue is full
    fn post(&mut self, mut message: EngineMessage) {
        for _ in 0..RETRY_LIMIT {
            match self.messages.push(message) {
                Ok(()) => return,
                Err(rtrb::PushError::Full(m)) => {
                    message = m;
                    thread::sleep(RETRY_INTERVAL);
                }
            }
        }
        log::warn!("Engine message queue stayed full, dropping message");
    }
}
