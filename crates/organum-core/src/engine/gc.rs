//! Deferred deallocation for audio-thread data
//!
//! Ranks are handed to the audio thread as `basedrop::Owned<Rankwave>`. When a
//! rank is replaced, the old one is dropped on the audio thread, but the drop
//! only enqueues the pointer: the collector thread started here frees the
//! wavetables later, where the time spent in the allocator does not matter.
//!
//! ```ignore
//! use basedrop::Owned;
//! use crate::engine::gc::gc_handle;
//!
//! let rank = Owned::new(&gc_handle(), Rankwave::new(36, 96));
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Process-wide collector handle
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector thread frees queued allocations
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("organum-gc".to_string())
        .spawn(move || {
            // Collector is !Sync and stays on this thread
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }
            log::info!("Rank collector thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn rank collector thread");

    rx.recv().expect("Failed to receive collector handle")
}

/// Handle for wrapping values in `basedrop::Owned`
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
