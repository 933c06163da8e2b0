//! MIDI channel roles
//!
//! Each of the 16 MIDI channels may play one keyboard, drive the
//! performance controls of one division, and carry instrument-wide
//! controls. A channel with no role is ignored.

use serde::{Deserialize, Serialize};

/// Number of MIDI channels
pub const MIDI_CHANNELS: usize = 16;

/// What one MIDI channel is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelRole {
    /// Keyboard played by notes, hold and all-notes-off
    pub keyboard: Option<u8>,
    /// Division receiving swell and tremulant controllers
    pub division: Option<u8>,
    /// Accepts volume and all-sound-off
    pub control: bool,
}

impl ChannelRole {
    pub fn keyboard(k: u8) -> Self {
        Self {
            keyboard: Some(k),
            ..Self::default()
        }
    }

    pub fn with_division(mut self, d: u8) -> Self {
        self.division = Some(d);
        self
    }

    pub fn with_control(mut self) -> Self {
        self.control = true;
        self
    }
}

/// Role of every MIDI channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MidiMap {
    channels: [ChannelRole; MIDI_CHANNELS],
}

impl Default for MidiMap {
    /// Channel 1 plays keyboard 0 and division 0 and carries the controls,
    /// channel 2 plays keyboard 1 and division 1
    fn default() -> Self {
        let mut map = Self::empty();
        map.set(0, ChannelRole::keyboard(0).with_division(0).with_control());
        map.set(1, ChannelRole::keyboard(1).with_division(1));
        map
    }
}

impl MidiMap {
    /// A map where every channel is ignored
    pub fn empty() -> Self {
        Self {
            channels: [ChannelRole::default(); MIDI_CHANNELS],
        }
    }

    /// Role of `channel` (0-based); out-of-range channels have none
    pub fn role(&self, channel: u8) -> ChannelRole {
        self.channels
            .get(channel as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn set(&mut self, channel: u8, role: ChannelRole) {
        if let Some(slot) = self.channels.get_mut(channel as usize) {
            *slot = role;
        }
    }
}

/// MIDI section of the application configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiSettings {
    /// Case-insensitive substring of the input port name; None disables MIDI
    pub port: Option<String>,
    pub channels: MidiMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_map() {
        let map = MidiMap::default();
        assert_eq!(map.role(0), ChannelRole::keyboard(0).with_division(0).with_control());
        assert_eq!(map.role(1).keyboard, Some(1));
        assert!(!map.role(1).control);
        assert_eq!(map.role(2), ChannelRole::default());
        assert_eq!(map.role(200), ChannelRole::default());
    }

    #[test]
    fn test_set_ignores_out_of_range() {
        let mut map = MidiMap::empty();
        map.set(16, ChannelRole::keyboard(3));
        assert_eq!(map, MidiMap::empty());
        map.set(15, ChannelRole::keyboard(3));
        assert_eq!(map.role(15).keyboard, Some(3));
    }

    #[test]
    fn test_settings_yaml() {
        let settings = MidiSettings {
            port: Some("keystation".to_string()),
            channels: MidiMap::default(),
        };
        let yaml = serde_yaml::to_string(&settings).unwrap();
        let parsed: MidiSettings = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, settings);

        let partial: MidiSettings = serde_yaml::from_str("port: oxygen\n").unwrap();
        assert_eq!(partial.port.as_deref(), Some("oxygen"));
        assert_eq!(partial.channels, MidiMap::default());
    }
}
