//! Finding the keyboard's MIDI input port

use midir::{MidiInput, MidiInputPort};

/// Client name registered with the MIDI system
const CLIENT_NAME: &str = "organum";

#[derive(Debug, thiserror::Error)]
pub enum MidiConnectionError {
    #[error("MIDI input unavailable: {0}")]
    Init(String),

    #[error("No MIDI input ports available")]
    NoInputPorts,

    #[error("No MIDI input port matches '{0}'")]
    PortNotFound(String),

    #[error("Could not open MIDI port {port}: {reason}")]
    Connect { port: String, reason: String },
}

fn open_input() -> Result<MidiInput, MidiConnectionError> {
    MidiInput::new(CLIENT_NAME).map_err(|e| MidiConnectionError::Init(e.to_string()))
}

/// Every input port with its name; ports whose name cannot be read are skipped
fn named_ports(midi_in: &MidiInput) -> Vec<(MidiInputPort, String)> {
    midi_in
        .ports()
        .into_iter()
        .filter_map(|port| midi_in.port_name(&port).ok().map(|name| (port, name)))
        .collect()
}

/// Index of the first name containing `pattern`, ignoring case
fn match_port<'a>(names: impl IntoIterator<Item = &'a str>, pattern: &str) -> Option<usize> {
    let pattern = pattern.to_lowercase();
    names.into_iter().position(|name| name.to_lowercase().contains(&pattern))
}

/// Names of every MIDI input port
pub fn list_input_ports() -> Result<Vec<String>, MidiConnectionError> {
    let midi_in = open_input()?;
    Ok(named_ports(&midi_in).into_iter().map(|(_, name)| name).collect())
}

/// Find the input port for `pattern`
///
/// The `MidiInput` is returned with it because midir consumes it on connect.
pub(crate) fn find_input_port(pattern: &str) -> Result<(MidiInput, MidiInputPort, String), MidiConnectionError> {
    let midi_in = open_input()?;
    let mut ports = named_ports(&midi_in);
    if ports.is_empty() {
        return Err(MidiConnectionError::NoInputPorts);
    }

    let index = match_port(ports.iter().map(|(_, name)| name.as_str()), pattern)
        .ok_or_else(|| MidiConnectionError::PortNotFound(pattern.to_string()))?;
    let (port, name) = ports.swap_remove(index);
    log::info!("MIDI input port: {}", name);
    Ok((midi_in, port, name))
}
