//! On-disk waveform cache
//!
//! Synthesizing a rank takes long enough to be noticeable at startup, so
//! finished ranks are stored next to each other in a cache directory, one
//! `.orw` file per stop. A file is only reused when it was generated for the
//! same note range, sample rate and tuning; anything else is rejected whole.
//!
//! Layout (native endian):
//!
//! ```text
//! header    16 bytes  "orw\0", version, padding
//! metadata  64 bytes  n0, n1, sample rate, base frequency, 12 scale ratios
//! per note  32 bytes  pipe record, then l0 + l1 + k_s * (PERIOD + 4) samples
//! ```

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use super::pipewave::Pipewave;
use super::rankwave::Rankwave;
use super::scales::Tuning;
use super::stop::StopDefinition;
use crate::types::PERIOD;

pub const CACHE_MAGIC: [u8; 4] = *b"orw\0";
pub const CACHE_VERSION: u8 = 2;

/// Sample rate and base frequency tolerance
const FREQ_TOLERANCE: f32 = 0.1;

/// Scale ratio tolerance
const SCALE_TOLERANCE: f32 = 6e-5;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a waveform cache file")]
    BadMagic,

    #[error("Unsupported cache version {0}")]
    Version(u8),

    #[error("Cached note range {found:?} differs from {expected:?}")]
    NoteRange { expected: (u8, u8), found: (u8, u8) },

    #[error("Cached sample rate {found}Hz differs from {expected}Hz")]
    SampleRate { expected: f32, found: f32 },

    #[error("Cached tuning differs")]
    Tuning,

    #[error("Cache file is truncated")]
    Truncated,

    #[error("Pipe record {0} is invalid")]
    BadRecord(usize),
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FileHeader {
    magic: [u8; 4],
    version: u8,
    _pad: [u8; 11],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Metadata {
    _reserved: [u8; 4],
    n0: u8,
    n1: u8,
    _pad: [u8; 2],
    fsamp: f32,
    fbase: f32,
    scale: [f32; 12],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PipeRecord {
    l0: i32,
    l1: i32,
    k_s: i16,
    k_r: i16,
    m_r: f32,
    d_r: f32,
    d_a: f32,
    d_w: f32,
    _reserved: i32,
}

impl PipeRecord {
    /// Whether playback stays inside the sample buffer
    ///
    /// A sounding pipe reads `k_s` samples per frame, so the loop must hold at
    /// least one period of steps or the read position outruns the wrap tail.
    fn is_playable(&self) -> bool {
        if self.l0 < 0 || self.l1 < 0 || self.k_s < 0 || self.k_r < 0 {
            return false;
        }
        if self.l1 == 0 {
            return true;
        }
        let k_s = self.k_s as i32;
        (1..=3).contains(&k_s)
            && self.l0 % PERIOD as i32 == 0
            && self.l1 >= k_s * PERIOD as i32
            && self.k_r >= 1
            && [self.m_r, self.d_r, self.d_a, self.d_w].iter().all(|v| v.is_finite())
    }
}

/// Cache file for a stop: its file name with the extension replaced
pub fn cache_path(dir: &Path, stop: &StopDefinition) -> PathBuf {
    dir.join(Path::new(&stop.filename).with_extension("orw").file_name().unwrap_or_default())
}

/// Write a synthesized rank
pub fn save(path: &Path, rank: &Rankwave, fsamp: f32, tuning: &Tuning) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);

    let header = FileHeader {
        magic: CACHE_MAGIC,
        version: CACHE_VERSION,
        _pad: [0; 11],
    };
    let metadata = Metadata {
        _reserved: [0; 4],
        n0: rank.n0(),
        n1: rank.n1(),
        _pad: [0; 2],
        fsamp,
        fbase: tuning.base_frequency,
        scale: *tuning.scale(),
    };
    out.write_all(bytemuck::bytes_of(&header))?;
    out.write_all(bytemuck::bytes_of(&metadata))?;

    for pipe in rank.pipes() {
        let record = PipeRecord {
            l0: pipe.l0 as i32,
            l1: pipe.l1 as i32,
            k_s: pipe.k_s as i16,
            k_r: pipe.k_r as i16,
            m_r: pipe.m_r,
            d_r: pipe.d_r,
            d_a: pipe.d_a,
            d_w: pipe.d_w,
            _reserved: 0,
        };
        out.write_all(bytemuck::bytes_of(&record))?;
        out.write_all(bytemuck::cast_slice(pipe.samples()))?;
    }
    out.flush()?;
    Ok(())
}

/// Read a rank, validating it against the stop and the current setup
pub fn load(path: &Path, stop: &StopDefinition, fsamp: f32, tuning: &Tuning) -> Result<Rankwave, CacheError> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    let mut reader = ByteReader::new(&bytes);

    let header: FileHeader = reader.read()?;
    if header.magic != CACHE_MAGIC {
        return Err(CacheError::BadMagic);
    }
    if header.version != CACHE_VERSION {
        return Err(CacheError::Version(header.version));
    }

    let metadata: Metadata = reader.read()?;
    if (metadata.n0, metadata.n1) != (stop.n0, stop.n1) {
        return Err(CacheError::NoteRange {
            expected: (stop.n0, stop.n1),
            found: (metadata.n0, metadata.n1),
        });
    }
    if (metadata.fsamp - fsamp).abs() > FREQ_TOLERANCE {
        return Err(CacheError::SampleRate {
            expected: fsamp,
            found: metadata.fsamp,
        });
    }
    if (metadata.fbase - tuning.base_frequency).abs() > FREQ_TOLERANCE {
        return Err(CacheError::Tuning);
    }
    let scale = tuning.scale();
    if metadata
        .scale
        .iter()
        .zip(scale.iter())
        .any(|(cached, current)| (cached / current - 1.0).abs() > SCALE_TOLERANCE)
    {
        return Err(CacheError::Tuning);
    }

    let count = (stop.n1 as usize + 1).saturating_sub(stop.n0 as usize);
    let mut pipes = Vec::with_capacity(count);
    for i in 0..count {
        let record: PipeRecord = reader.read()?;
        if !record.is_playable() {
            return Err(CacheError::BadRecord(i));
        }
        let (l0, l1, k_s) = (record.l0 as usize, record.l1 as usize, record.k_s as usize);
        let len = Pipewave::buffer_len(l0, l1, k_s);
        let wave: Vec<f32> = bytemuck::pod_collect_to_vec(reader.take(len * std::mem::size_of::<f32>())?);
        pipes.push(Pipewave::from_parts(
            wave,
            l0,
            l1,
            k_s,
            record.k_r as u32,
            record.m_r,
            record.d_r,
            record.d_a,
            record.d_w,
        ));
    }
    Ok(Rankwave::from_pipes(stop.n0, stop.n1, pipes))
}

/// Sequential reader over the file contents
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CacheError> {
        let end = self.pos.checked_add(len).ok_or(CacheError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(CacheError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn read<T: Pod>(&mut self) -> Result<T, CacheError> {
        let slice = self.take(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(slice))
    }
}
