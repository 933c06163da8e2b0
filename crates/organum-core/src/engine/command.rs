//! Lock-free command queues between control threads and the audio thread
//!
//! Notes, stop changes and performance controls travel as 32-bit command
//! words through `rtrb` ring buffers:
//!
//! ```text
//! [31:24] command  [23:16] key/rank/parameter  [15:8] division  [7:0] keyboard
//! ```
//!
//! Parameter commands are followed by a second word holding the `f32` value.
//! Both words are written with a single chunk commit, so the audio thread
//! never sees half a command.
//!
//! Built divisions and ranks are too large for a word; they travel as
//! [`EngineMessage`]s through their own queue. Status flows back to the
//! control side as [`EngineEvent`]s.

use basedrop::Owned;
use thiserror::Error;

use crate::synth::rankwave::Rankwave;
use crate::synth::stop::Pan;
use crate::types::NKEYBD;

use super::asection::SectionParam;
use super::division::{Division, DivisionParam};
use super::output::AudioParam;

// ============================================================================
// Command words
// ============================================================================

/// Command codes of the high byte
pub mod code {
    pub const KEY_OFF: u8 = 0;
    pub const KEY_ON: u8 = 1;
    pub const MIDI_OFF: u8 = 2;
    pub const RESERVED: u8 = 3;
    pub const CLR_DIV_MASK: u8 = 4;
    pub const SET_DIV_MASK: u8 = 5;
    pub const CLR_RANK_MASK: u8 = 6;
    pub const SET_RANK_MASK: u8 = 7;
    pub const HOLD_OFF: u8 = 8;
    pub const HOLD_ON: u8 = 9;
    pub const SET_TREMULANT: u8 = 16;
    pub const SET_DIVISION_PARAM: u8 = 17;
    pub const SET_AUDIO_PARAM: u8 = 18;
    pub const SET_SECTION_PARAM: u8 = 19;
}

/// A raw command word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandWord(pub u32);

impl CommandWord {
    pub const fn new(command: u8, index: u8, division: u8, keyboard: u8) -> Self {
        Self((command as u32) << 24 | (index as u32) << 16 | (division as u32) << 8 | keyboard as u32)
    }

    pub const fn command(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub const fn index(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn division(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn keyboard(&self) -> u8 {
        self.0 as u8
    }

    /// Whether a float payload word follows
    pub const fn is_two_word(&self) -> bool {
        matches!(
            self.command(),
            code::SET_DIVISION_PARAM | code::SET_AUDIO_PARAM | code::SET_SECTION_PARAM
        )
    }
}

/// Decoded engine command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// `note` is a keymap index, 0 = MIDI note 36
    KeyOn { note: u8, keyboard: u8 },
    KeyOff { note: u8, keyboard: u8 },
    /// Release held keys of one keyboard; `NKEYBD` silences every keyboard
    AllNotesOff { keyboard: u8 },
    SetDivMask { division: u8, linkage: u8, keyboard: u8 },
    ClrDivMask { division: u8, linkage: u8, keyboard: u8 },
    /// `bit == NKEYBD` makes the linkage follow the division
    SetRankMask { division: u8, rank: u8, linkage: u8, bit: u8 },
    ClrRankMask { division: u8, rank: u8, linkage: u8, bit: u8 },
    HoldOn { keyboard: u8 },
    HoldOff { keyboard: u8 },
    Tremulant { division: u8, on: bool, sources: u8 },
    DivisionParam { division: u8, param: DivisionParam, value: f32 },
    AudioParam { param: AudioParam, value: f32 },
    SectionParam { section: u8, param: SectionParam, value: f32 },
}

/// Nibble-packed keyboard byte
#[inline]
const fn pack(low: u8, high: u8) -> u8 {
    (low & 0x0f) | (high << 4)
}

impl Command {
    /// All notes off on every keyboard
    pub const fn all_sound_off() -> Self {
        Command::AllNotesOff { keyboard: NKEYBD as u8 }
    }

    /// Encode into one or two words, returning the word count
    pub fn encode(&self) -> ([u32; 2], usize) {
        use code::*;
        let one = |w: CommandWord| ([w.0, 0], 1);
        let two = |w: CommandWord, v: f32| ([w.0, v.to_bits()], 2);
        match *self {
            Command::KeyOff { note, keyboard } => one(CommandWord::new(KEY_OFF, note, 0, keyboard)),
            Command::KeyOn { note, keyboard } => one(CommandWord::new(KEY_ON, note, 0, keyboard)),
            Command::AllNotesOff { keyboard } => one(CommandWord::new(MIDI_OFF, 0, 0, keyboard)),
            Command::ClrDivMask { division, linkage, keyboard } => {
                one(CommandWord::new(CLR_DIV_MASK, 0, division, pack(keyboard, linkage)))
            }
            Command::SetDivMask { division, linkage, keyboard } => {
                one(CommandWord::new(SET_DIV_MASK, 0, division, pack(keyboard, linkage)))
            }
            Command::ClrRankMask { division, rank, linkage, bit } => {
                one(CommandWord::new(CLR_RANK_MASK, rank, division, pack(linkage, bit)))
            }
            Command::SetRankMask { division, rank, linkage, bit } => {
                one(CommandWord::new(SET_RANK_MASK, rank, division, pack(linkage, bit)))
            }
            Command::HoldOff { keyboard } => one(CommandWord::new(HOLD_OFF, 0, 0, keyboard)),
            Command::HoldOn { keyboard } => one(CommandWord::new(HOLD_ON, 0, 0, keyboard)),
            Command::Tremulant { division, on, sources } => {
                one(CommandWord::new(SET_TREMULANT, 0, division, pack(on as u8, sources)))
            }
            Command::DivisionParam { division, param, value } => {
                two(CommandWord::new(SET_DIVISION_PARAM, param as u8, division, 0), value)
            }
            Command::AudioParam { param, value } => two(CommandWord::new(SET_AUDIO_PARAM, param as u8, 0, 0), value),
            Command::SectionParam { section, param, value } => {
                two(CommandWord::new(SET_SECTION_PARAM, param as u8, section, 0), value)
            }
        }
    }

    /// Decode a command word and, for parameter commands, its payload
    ///
    /// Returns `None` for reserved or unknown codes and unknown parameters.
    pub fn decode(word: CommandWord, payload: Option<u32>) -> Option<Self> {
        use code::*;
        let (i, j, k) = (word.index(), word.division(), word.keyboard());
        let value = || payload.map(f32::from_bits);
        Some(match word.command() {
            KEY_OFF => Command::KeyOff { note: i, keyboard: k },
            KEY_ON => Command::KeyOn { note: i, keyboard: k },
            MIDI_OFF => Command::AllNotesOff { keyboard: k },
            CLR_DIV_MASK => Command::ClrDivMask {
                division: j,
                linkage: k >> 4,
                keyboard: k & 0x0f,
            },
            SET_DIV_MASK => Command::SetDivMask {
                division: j,
                linkage: k >> 4,
                keyboard: k & 0x0f,
            },
            CLR_RANK_MASK => Command::ClrRankMask {
                division: j,
                rank: i,
                linkage: k & 0x0f,
                bit: k >> 4,
            },
            SET_RANK_MASK => Command::SetRankMask {
                division: j,
                rank: i,
                linkage: k & 0x0f,
                bit: k >> 4,
            },
            HOLD_OFF => Command::HoldOff { keyboard: k },
            HOLD_ON => Command::HoldOn { keyboard: k },
            SET_TREMULANT => Command::Tremulant {
                division: j,
                on: k & 0x0f != 0,
                sources: k >> 4,
            },
            SET_DIVISION_PARAM => Command::DivisionParam {
                division: j,
                param: DivisionParam::from_index(i)?,
                value: value()?,
            },
            SET_AUDIO_PARAM => Command::AudioParam {
                param: AudioParam::from_index(i)?,
                value: value()?,
            },
            SET_SECTION_PARAM => Command::SectionParam {
                section: j,
                param: SectionParam::from_index(i)?,
                value: value()?,
            },
            _ => return None,
        })
    }
}

// ============================================================================
// Word queues
// ============================================================================

/// Words per command queue
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// The queue had no room; the command was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("command queue full")]
pub struct QueueFull;

/// Producer side of a command queue
pub struct CommandSender {
    producer: rtrb::Producer<u32>,
}

impl CommandSender {
    /// Enqueue a command without blocking
    ///
    /// A command that does not fit is rejected whole and the queue is left
    /// untouched.
    pub fn send(&mut self, command: Command) -> Result<(), QueueFull> {
        let (words, len) = command.encode();
        self.send_words(&words[..len])
    }

    /// Enqueue raw words as one atomic commit
    pub fn send_words(&mut self, words: &[u32]) -> Result<(), QueueFull> {
        if self.producer.slots() < words.len() {
            return Err(QueueFull);
        }
        let mut chunk = self.producer.write_chunk(words.len()).map_err(|_| QueueFull)?;
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&words[..split]);
        second.copy_from_slice(&words[split..]);
        chunk.commit_all();
        Ok(())
    }

    /// Free word slots
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Consumer side of a command queue, owned by the audio thread
pub struct CommandReceiver {
    consumer: rtrb::Consumer<u32>,
}

impl CommandReceiver {
    /// Decode and apply every command that was readable on entry
    ///
    /// Unknown commands are consumed and dropped. A parameter command whose
    /// payload is not yet readable stays queued for the next call.
    pub fn drain(&mut self, mut apply: impl FnMut(Command)) {
        let mut avail = self.consumer.slots();
        while avail > 0 {
            let Ok(&first) = self.consumer.peek() else { break };
            let word = CommandWord(first);
            if word.is_two_word() {
                if avail < 2 {
                    break;
                }
                let Ok(chunk) = self.consumer.read_chunk(2) else { break };
                let (a, b) = chunk.as_slices();
                let payload = a.iter().chain(b).nth(1).copied();
                chunk.commit_all();
                avail -= 2;
                if let Some(command) = Command::decode(word, payload) {
                    apply(command);
                }
            } else {
                let _ = self.consumer.pop();
                avail -= 1;
                if let Some(command) = Command::decode(word, None) {
                    apply(command);
                }
            }
        }
    }

    /// Readable words
    pub fn slots(&self) -> usize {
        self.consumer.slots()
    }
}

/// Create a command queue holding [`COMMAND_QUEUE_CAPACITY`] words
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    command_channel_with_capacity(COMMAND_QUEUE_CAPACITY)
}

pub fn command_channel_with_capacity(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity);
    (CommandSender { producer }, CommandReceiver { consumer })
}

// ============================================================================
// Messages and events
// ============================================================================

/// Objects built off the audio thread
pub enum EngineMessage {
    /// Append a division
    ///
    /// A division the engine has no room for drops through the collector.
    NewDivision(Owned<Division>),
    /// Install or replace a rank
    SetRank {
        division: u8,
        rank: u8,
        rankwave: Owned<Rankwave>,
        delay_ms: u32,
        pan: Pan,
    },
}

/// Status reports from the audio thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    DivisionCreated { division: u8 },
    RankInstalled { division: u8, rank: u8 },
    /// All divisions are taken, or `section` does not exist
    DivisionRejected { section: u8 },
    /// No such division or rank slot
    RankRejected { division: u8, rank: u8 },
}

pub const MESSAGE_QUEUE_CAPACITY: usize = 64;
pub const EVENT_QUEUE_CAPACITY: usize = 256;

pub type MessageSender = rtrb::Producer<EngineMessage>;
pub type MessageReceiver = rtrb::Consumer<EngineMessage>;
pub type EventSender = rtrb::Producer<EngineEvent>;
pub type EventReceiver = rtrb::Consumer<EngineEvent>;

pub fn message_channel() -> (MessageSender, MessageReceiver) {
    rtrb::RingBuffer::new(MESSAGE_QUEUE_CAPACITY)
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    rtrb::RingBuffer::new(EVENT_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_all(rx: &mut CommandReceiver) -> Vec<Command> {
        let mut out = Vec::new();
        rx.drain(|c| out.push(c));
        out
    }

    #[test]
    fn test_word_layout() {
        let w = CommandWord::new(code::KEY_ON, 12, 3, 1);
        assert_eq!(w.0, 0x010c_0301);
        assert_eq!((w.command(), w.index(), w.division(), w.keyboard()), (1, 12, 3, 1));
    }

    #[test]
    fn test_mask_field_order() {
        let (w, _) = Command::SetDivMask { division: 1, linkage: 2, keyboard: 5 }.encode();
        assert_eq!(CommandWord(w[0]).keyboard(), 0x25);
        let (w, _) = Command::SetRankMask { division: 1, rank: 4, linkage: 2, bit: 8 }.encode();
        assert_eq!(CommandWord(w[0]).keyboard(), 0x82);
        assert_eq!(CommandWord(w[0]).index(), 4);
    }

    #[test]
    fn test_encode_decode() {
        let commands = [
            Command::KeyOn { note: 60, keyboard: 2 },
            Command::KeyOff { note: 0, keyboard: 7 },
            Command::all_sound_off(),
            Command::ClrDivMask { division: 3, linkage: 1, keyboard: 4 },
            Command::SetRankMask { division: 0, rank: 31, linkage: 2, bit: 8 },
            Command::HoldOn { keyboard: 1 },
            Command::Tremulant { division: 2, on: true, sources: 3 },
            Command::Tremulant { division: 2, on: false, sources: 1 },
            Command::DivisionParam { division: 1, param: DivisionParam::Swell, value: 0.25 },
            Command::AudioParam { param: AudioParam::ReverbTime, value: 5.5 },
            Command::SectionParam { section: 2, param: SectionParam::Azimuth, value: -0.125 },
        ];
        for c in commands {
            let (w, n) = c.encode();
            let payload = (n == 2).then_some(w[1]);
            assert_eq!(Command::decode(CommandWord(w[0]), payload), Some(c));
        }
    }

    #[test]
    fn test_reserved_and_unknown_decode_to_none() {
        assert_eq!(Command::decode(CommandWord::new(code::RESERVED, 0, 0, 0), None), None);
        assert_eq!(Command::decode(CommandWord::new(42, 0, 0, 0), None), None);
        assert_eq!(Command::decode(CommandWord::new(code::SET_AUDIO_PARAM, 9, 0, 0), Some(0)), None);
    }

    #[test]
    fn test_fifo_order() {
        let (mut tx, mut rx) = command_channel_with_capacity(16);
        let sent: Vec<Command> = (0..16).map(|n| Command::KeyOn { note: n, keyboard: 0 }).collect();
        for c in &sent {
            tx.send(*c).unwrap();
        }
        assert_eq!(drain_all(&mut rx), sent);
        assert_eq!(rx.slots(), 0);
    }

    #[test]
    fn test_overflow_rejected_without_change() {
        let (mut tx, mut rx) = command_channel_with_capacity(4);
        for n in 0..4 {
            tx.send(Command::KeyOn { note: n, keyboard: 0 }).unwrap();
        }
        assert_eq!(tx.send(Command::KeyOn { note: 9, keyboard: 0 }), Err(QueueFull));
        let got = drain_all(&mut rx);
        assert_eq!(got.len(), 4);
        assert_eq!(got[3], Command::KeyOn { note: 3, keyboard: 0 });
    }

    #[test]
    fn test_two_word_command_rejected_whole() {
        let (mut tx, mut rx) = command_channel_with_capacity(3);
        tx.send(Command::KeyOn { note: 1, keyboard: 0 }).unwrap();
        tx.send(Command::KeyOn { note: 2, keyboard: 0 }).unwrap();
        let param = Command::AudioParam { param: AudioParam::Volume, value: 0.5 };
        assert_eq!(tx.send(param), Err(QueueFull));
        assert_eq!(tx.slots(), 1);
        assert_eq!(drain_all(&mut rx).len(), 2);

        // wraps around the ring end
        tx.send(param).unwrap();
        assert_eq!(drain_all(&mut rx), vec![param]);
    }

    #[test]
    fn test_incomplete_payload_waits() {
        let (mut tx, mut rx) = command_channel_with_capacity(8);
        let word = CommandWord::new(code::SET_AUDIO_PARAM, AudioParam::Volume as u8, 0, 0);
        tx.send_words(&[word.0]).unwrap();
        assert!(drain_all(&mut rx).is_empty());
        assert_eq!(rx.slots(), 1);
        tx.send_words(&[0.5f32.to_bits()]).unwrap();
        assert_eq!(
            drain_all(&mut rx),
            vec![Command::AudioParam { param: AudioParam::Volume, value: 0.5 }]
        );
    }

    #[test]
    fn test_unknown_commands_are_consumed() {
        let (mut tx, mut rx) = command_channel_with_capacity(8);
        tx.send_words(&[CommandWord::new(code::RESERVED, 0, 0, 0).0]).unwrap();
        tx.send_words(&[CommandWord::new(200, 0, 0, 0).0]).unwrap();
        tx.send(Command::HoldOff { keyboard: 0 }).unwrap();
        assert_eq!(drain_all(&mut rx), vec![Command::HoldOff { keyboard: 0 }]);
        assert_eq!(rx.slots(), 0);
    }

    #[test]
    fn test_event_channel() {
        let (mut tx, mut rx) = event_channel();
        tx.push(EngineEvent::RankInstalled { division: 0, rank: 2 }).unwrap();
        assert_eq!(rx.pop(), Ok(EngineEvent::RankInstalled { division: 0, rank: 2 }));
    }
}
