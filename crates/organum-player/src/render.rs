//! Offline rendering to a WAV file
//!
//! Runs the engine without an audio backend: the build thread installs the
//! demo organ, then a short score is played and written as 32-bit float WAV.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};

use organum_core::engine::{engine_queues, AudioParam, CombReverb, Command, OrganEngine, OutputLayout};
use organum_core::synth::RankBuilder;

use crate::config::OrganConfig;
use crate::organ::{demo_organ, request_build, Registration};

/// Frames rendered per engine call
const BLOCK: usize = 256;

/// Longest wait for the build thread
const BUILD_TIMEOUT: Duration = Duration::from_secs(300);

/// Seconds of audio after the last score event
const TAIL: f64 = 2.5;

/// Timed commands: a chord on the Great, then a phrase on the Swell
fn demo_score() -> Vec<(f64, Command)> {
    let mut score = Vec::new();
    for note in [24, 28, 31] {
        score.push((0.0, Command::KeyOn { note, keyboard: 0 }));
        score.push((2.0, Command::KeyOff { note, keyboard: 0 }));
    }
    for (i, note) in [36, 38, 40, 43, 48].into_iter().enumerate() {
        let t = 2.5 + 0.4 * i as f64;
        score.push((t, Command::KeyOn { note, keyboard: 1 }));
        score.push((t + 0.38, Command::KeyOff { note, keyboard: 1 }));
    }
    score.sort_by(|a, b| a.0.total_cmp(&b.0));
    score
}

/// Render the demo organ to `path`
pub fn render_demo(path: &Path, config: &OrganConfig, sample_rate: u32, layout: OutputLayout) -> Result<()> {
    let fsamp = sample_rate as f32;
    let (channels, queues) = engine_queues();
    let mut engine = OrganEngine::new(fsamp, layout, queues, Box::new(CombReverb::new(fsamp)));
    let mut notes = channels.notes;
    let mut controls = channels.controls;
    let mut events = channels.events;

    controls.send(Command::AudioParam {
        param: AudioParam::ReverbSize,
        value: config.reverb.size,
    })?;
    controls.send(Command::AudioParam {
        param: AudioParam::ReverbTime,
        value: config.reverb.time,
    })?;

    let builder = RankBuilder::spawn(fsamp, config.cache_dir.clone(), channels.messages)
        .context("Failed to start rank builder")?;
    let plans = demo_organ();
    let mut registration = Registration::new(request_build(&builder, &plans, config.tuning)?);

    let nchan = layout.channels();
    let mut block = vec![0.0f32; BLOCK * nchan];

    // Run the engine idle until every rank is engaged
    let start = Instant::now();
    while !registration.is_complete() {
        if start.elapsed() > BUILD_TIMEOUT {
            bail!("Timed out waiting for the organ to build");
        }
        engine.process_interleaved(&mut block, nchan);
        while let Ok(event) = events.pop() {
            registration.handle(event, &mut controls);
        }
        thread::sleep(Duration::from_millis(2));
    }
    builder.shutdown();
    // Apply the final engage commands before the score starts
    engine.process_interleaved(&mut block, nchan);
    log::info!("Organ ready after {:?}", start.elapsed());

    let spec = WavSpec {
        channels: nchan as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer =
        WavWriter::create(path, spec).with_context(|| format!("Failed to create {}", path.display()))?;

    let score = demo_score();
    let end = score.last().map_or(0.0, |e| e.0) + TAIL;
    let total = (end * sample_rate as f64) as usize;
    let mut next = 0;
    let mut frame = 0;
    while frame < total {
        while let Some(&(t, command)) = score.get(next) {
            if (t * sample_rate as f64) as usize > frame {
                break;
            }
            notes.send(command)?;
            next += 1;
        }
        let n = BLOCK.min(total - frame);
        let out = &mut block[..n * nchan];
        engine.process_interleaved(out, nchan);
        for &sample in out.iter() {
            writer.write_sample(sample)?;
        }
        frame += n;
    }
    writer.finalize()?;

    log::info!(
        "Rendered {:.1}s of {:?} audio to {}",
        end,
        layout,
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_ordered_and_balanced() {
        let score = demo_score();
        assert!(score.windows(2).all(|w| w[0].0 <= w[1].0));
        let ons = score.iter().filter(|e| matches!(e.1, Command::KeyOn { .. })).count();
        let offs = score.iter().filter(|e| matches!(e.1, Command::KeyOff { .. })).count();
        assert_eq!(ons, offs);
    }
}
