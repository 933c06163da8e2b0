//! Additive pipe synthesis
//!
//! Stop definitions describe a rank of pipes; they are synthesized into
//! looped wavetables (`Pipewave`), one per note, grouped into a `Rankwave`.
//! Synthesis is slow, so finished ranks are cached on disk and built on a
//! dedicated thread.

pub mod builder;
pub mod cache;
pub mod pipewave;
pub mod rankwave;
pub mod scales;
pub mod stop;

pub use builder::{BuildRequest, RankBuilder};
pub use cache::CacheError;
pub use pipewave::Pipewave;
pub use rankwave::Rankwave;
pub use scales::{Temperament, Tuning};
pub use stop::{Footage, HarmonicDefinition, NoteCurve, Pan, StopDefinition};
