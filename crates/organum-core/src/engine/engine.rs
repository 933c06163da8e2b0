//! Organ engine - the real-time orchestrator
//!
//! Owns every division and acoustic section and runs the period loop:
//!
//! 1. Install objects built off-thread (new divisions, ranks)
//! 2. Drain the note queue, then the control queue
//! 3. Push keymap changes into the divisions
//! 4. Resize the room if the reverb size or time moved
//! 5. Per period: divisions → sections → reverb → output encoding
//!
//! Audio callbacks of any length are served from a one-period carry buffer.

use basedrop::Owned;

use crate::types::{FParam, NASECT, NCHANN, NDIVIS, NNOTES, NRANKS, PERIOD};

use super::asection::{Asection, SectionParam, SECTION_PARAMS};
use super::command::{
    command_channel, event_channel, message_channel, Command, CommandReceiver, CommandSender, EngineEvent,
    EngineMessage, EventReceiver, EventSender, MessageReceiver, MessageSender,
};
use super::division::{Division, DivisionParam, DIVISION_PARAMS};
use super::keymap::Keymap;
use super::output::{stereo_gains, AudioParam, Buses, OutputLayout, AUDIO_PARAMS};
use super::reverb::ReverbNetwork;

/// Reverb size change that triggers a room resize
const REVSIZE_HYSTERESIS: f32 = 0.001;

/// Reverb time change that triggers new decay times
const REVTIME_HYSTERESIS: f32 = 0.1;

/// Engine configuration reported to non-real-time observers
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInfo {
    pub sample_rate: f32,
    pub period: usize,
    pub channels: usize,
    pub layout: OutputLayout,
    pub sections: usize,
    pub audio_params: [FParam; AudioParam::COUNT],
    pub section_params: [FParam; SectionParam::COUNT],
    pub division_params: [FParam; DivisionParam::COUNT],
}

/// Audio-thread ends of the engine queues
pub struct EngineQueues {
    pub notes: CommandReceiver,
    pub controls: CommandReceiver,
    pub messages: MessageReceiver,
    pub events: EventSender,
}

/// Control-side ends of the engine queues
pub struct EngineChannels {
    /// Key and hold commands, fed by the MIDI thread
    pub notes: CommandSender,
    /// Stop, tremulant and parameter commands
    pub controls: CommandSender,
    pub messages: MessageSender,
    pub events: EventReceiver,
}

/// Create every engine queue
pub fn engine_queues() -> (EngineChannels, EngineQueues) {
    let (notes_tx, notes_rx) = command_channel();
    let (controls_tx, controls_rx) = command_channel();
    let (messages_tx, messages_rx) = message_channel();
    let (events_tx, events_rx) = event_channel();
    (
        EngineChannels {
            notes: notes_tx,
            controls: controls_tx,
            messages: messages_tx,
            events: events_rx,
        },
        EngineQueues {
            notes: notes_rx,
            controls: controls_rx,
            messages: messages_rx,
            events: events_tx,
        },
    )
}

/// Synthesis state mutated by commands
struct Instrument {
    fsamp: f32,
    layout: OutputLayout,
    divisions: Vec<Owned<Division>>,
    sections: Vec<Asection>,
    keymap: Keymap,
    params: [FParam; AudioParam::COUNT],
    reverb: Box<dyn ReverbNetwork>,
    buses: Buses,
    revsize: f32,
    revtime: f32,
}

impl Instrument {
    fn apply(&mut self, command: Command) {
        match command {
            Command::KeyOn { note, keyboard } => self.keymap.key_on(note as usize, keyboard as usize),
            Command::KeyOff { note, keyboard } => self.keymap.key_off(note as usize, keyboard as usize),
            Command::AllNotesOff { keyboard } => self.keymap.all_off(keyboard as usize),
            Command::HoldOn { keyboard } => self.keymap.hold_on(keyboard as usize),
            Command::HoldOff { keyboard } => self.keymap.hold_off(keyboard as usize),
            Command::SetDivMask { division, linkage, keyboard } => {
                if let Some(d) = self.divisions.get_mut(division as usize) {
                    d.set_div_mask(keyboard as usize, linkage as usize);
                }
            }
            Command::ClrDivMask { division, linkage, keyboard } => {
                if let Some(d) = self.divisions.get_mut(division as usize) {
                    d.clr_div_mask(keyboard as usize, linkage as usize);
                }
            }
            Command::SetRankMask { division, rank, linkage, bit } => {
                if let Some(d) = self.divisions.get_mut(division as usize) {
                    d.set_rank_mask(rank as usize, linkage as usize, bit as usize);
                }
            }
            Command::ClrRankMask { division, rank, linkage, bit } => {
                if let Some(d) = self.divisions.get_mut(division as usize) {
                    d.clr_rank_mask(rank as usize, linkage as usize, bit as usize);
                }
            }
            Command::Tremulant { division, on, sources } => {
                if let Some(d) = self.divisions.get_mut(division as usize) {
                    if on {
                        d.trem_on(sources);
                    } else {
                        d.trem_off(sources);
                    }
                }
            }
            Command::DivisionParam { division, param, value } => {
                if let Some(d) = self.divisions.get_mut(division as usize) {
                    d.set_param(param, value);
                }
            }
            Command::AudioParam { param, value } => self.params[param as usize].set(value),
            Command::SectionParam { section, param, value } => {
                if let Some(s) = self.sections.get_mut(section as usize) {
                    s.set_param(param, value);
                }
            }
        }
    }

    fn param(&self, p: AudioParam) -> f32 {
        self.params[p as usize].value
    }

    /// Push dirty notes, then dirty ranks, into every division
    fn update_keys(&mut self) {
        for note in 0..NNOTES {
            if let Some(keys) = self.keymap.take_dirty(note) {
                for d in self.divisions.iter_mut() {
                    d.update_note(note, keys);
                }
            }
        }
        for d in self.divisions.iter_mut() {
            d.update_keymap(&self.keymap);
        }
    }

    /// Resize the room when the reverb parameters moved past their hysteresis
    fn update_reverb(&mut self) {
        let size = self.param(AudioParam::ReverbSize);
        if (size - self.revsize).abs() > REVSIZE_HYSTERESIS {
            self.revsize = size;
            self.reverb.set_delay(size);
            for s in self.sections.iter_mut() {
                s.set_size(size);
            }
        }
        let time = self.param(AudioParam::ReverbTime);
        if (time - self.revtime).abs() > REVTIME_HYSTERESIS {
            self.revtime = time;
            self.reverb.set_t60mf(time);
            self.reverb.set_t60lo(1.5 * time, 250.0);
            self.reverb.set_t60hi(0.5 * time, 3e3);
        }
    }

    /// Render one period into `out`, one plane per layout channel
    fn render(&mut self, out: &mut [[f32; PERIOD]; NCHANN]) {
        self.buses.clear();
        let vol = self.param(AudioParam::Volume);

        for d in self.divisions.iter_mut() {
            if let Some(section) = self.sections.get_mut(d.section()) {
                d.process(section);
            }
        }
        let Buses { w, x, y, z, r } = &mut self.buses;
        for s in self.sections.iter_mut() {
            s.process(vol, w, x, y, r);
        }
        self.reverb.process(vol, r, w, x, y, z);

        let stereo = stereo_gains(self.param(AudioParam::StagePosition));
        let channels = self.layout.channels();
        let mut frame = [0.0f32; NCHANN];
        for i in 0..PERIOD {
            self.buses.encode(self.layout, stereo, i, &mut frame);
            for c in 0..channels {
                out[c][i] = frame[c];
            }
        }
    }
}

/// The real-time organ engine
///
/// Lives on the audio thread. Everything reaches it through its queues; it
/// never blocks, allocates or logs while processing.
pub struct OrganEngine {
    notes: CommandReceiver,
    controls: CommandReceiver,
    messages: MessageReceiver,
    events: EventSender,
    instrument: Instrument,
    /// Last rendered period, per output channel
    carry: [[f32; PERIOD]; NCHANN],
    /// Next unread frame of `carry`, `PERIOD` when empty
    carry_pos: usize,
}

impl OrganEngine {
    pub fn new(sample_rate: f32, layout: OutputLayout, queues: EngineQueues, reverb: Box<dyn ReverbNetwork>) -> Self {
        let mut instrument = Instrument {
            fsamp: sample_rate,
            layout,
            divisions: Vec::with_capacity(NDIVIS),
            sections: (0..NASECT).map(|_| Asection::new(sample_rate)).collect(),
            keymap: Keymap::new(),
            params: AUDIO_PARAMS,
            reverb,
            buses: Buses::default(),
            revsize: 0.0,
            revtime: 0.0,
        };
        instrument.update_reverb();

        Self {
            notes: queues.notes,
            controls: queues.controls,
            messages: queues.messages,
            events: queues.events,
            instrument,
            carry: [[0.0; PERIOD]; NCHANN],
            carry_pos: PERIOD,
        }
    }

    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            sample_rate: self.instrument.fsamp,
            period: PERIOD,
            channels: self.instrument.layout.channels(),
            layout: self.instrument.layout,
            sections: self.instrument.sections.len(),
            audio_params: self.instrument.params,
            section_params: SECTION_PARAMS,
            division_params: DIVISION_PARAMS,
        }
    }

    pub fn layout(&self) -> OutputLayout {
        self.instrument.layout
    }

    pub fn channels(&self) -> usize {
        self.instrument.layout.channels()
    }

    pub fn division(&self, index: usize) -> Option<&Division> {
        self.instrument.divisions.get(index).map(|d| &**d)
    }

    pub fn division_count(&self) -> usize {
        self.instrument.divisions.len()
    }

    pub fn section(&self, index: usize) -> Option<&Asection> {
        self.instrument.sections.get(index)
    }

    pub fn audio_param(&self, p: AudioParam) -> f32 {
        self.instrument.param(p)
    }

    pub fn keymap(&self) -> &Keymap {
        &self.instrument.keymap
    }

    fn install_messages(&mut self) {
        while let Ok(message) = self.messages.pop() {
            match message {
                EngineMessage::NewDivision(division) => {
                    let instrument = &mut self.instrument;
                    let event = if instrument.divisions.len() < NDIVIS && division.section() < instrument.sections.len() {
                        let index = instrument.divisions.len() as u8;
                        instrument.divisions.push(division);
                        EngineEvent::DivisionCreated { division: index }
                    } else {
                        // Dropping hands the division to the collector
                        EngineEvent::DivisionRejected {
                            section: division.section() as u8,
                        }
                    };
                    let _ = self.events.push(event);
                }
                EngineMessage::SetRank {
                    division,
                    rank,
                    rankwave,
                    delay_ms,
                    pan,
                } => {
                    let slot = self
                        .instrument
                        .divisions
                        .get_mut(division as usize)
                        .filter(|_| (rank as usize) < NRANKS);
                    let event = match slot {
                        Some(d) => {
                            // A replaced rank drops through the collector
                            drop(d.set_rank(rank as usize, rankwave, delay_ms, pan));
                            EngineEvent::RankInstalled { division, rank }
                        }
                        None => EngineEvent::RankRejected { division, rank },
                    };
                    let _ = self.events.push(event);
                }
            }
        }
    }

    /// Apply everything queued since the last callback
    fn update(&mut self) {
        self.install_messages();
        let instrument = &mut self.instrument;
        self.notes.drain(|c| instrument.apply(c));
        self.controls.drain(|c| instrument.apply(c));
        instrument.update_keys();
        instrument.update_reverb();
    }

    /// Fill per-channel output buffers
    ///
    /// Channels beyond the layout are silenced. The frame count is the
    /// length of the shortest buffer.
    pub fn process(&mut self, outputs: &mut [&mut [f32]]) {
        self.update();
        let channels = self.channels();
        let frames = outputs.iter().map(|o| o.len()).min().unwrap_or(0);
        let mut done = 0;
        while done < frames {
            if self.carry_pos == PERIOD {
                self.instrument.render(&mut self.carry);
                self.carry_pos = 0;
            }
            let n = (PERIOD - self.carry_pos).min(frames - done);
            for (c, out) in outputs.iter_mut().enumerate() {
                let dst = &mut out[done..done + n];
                if c < channels {
                    dst.copy_from_slice(&self.carry[c][self.carry_pos..self.carry_pos + n]);
                } else {
                    dst.fill(0.0);
                }
            }
            self.carry_pos += n;
            done += n;
        }
    }

    /// Fill an interleaved buffer of `channels` channels
    pub fn process_interleaved(&mut self, data: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        self.update();
        let used = self.channels().min(channels);
        let frames = data.len() / channels;
        let mut done = 0;
        while done < frames {
            if self.carry_pos == PERIOD {
                self.instrument.render(&mut self.carry);
                self.carry_pos = 0;
            }
            let n = (PERIOD - self.carry_pos).min(frames - done);
            for (j, frame) in data[done * channels..(done + n) * channels].chunks_exact_mut(channels).enumerate() {
                let i = self.carry_pos + j;
                for (c, sample) in frame.iter_mut().enumerate() {
                    *sample = if c < used { self.carry[c][i] } else { 0.0 };
                }
            }
            self.carry_pos += n;
            done += n;
        }
    }
}
