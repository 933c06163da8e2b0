//! Native JACK audio backend for Linux
//!
//! Used on Linux when the `jack-backend` feature is enabled. The client
//! registers one output port per layout channel and, when configured,
//! connects them to the physical playback ports in order.

use jack::{AudioOut, Client, ClientOptions, Control, Port, ProcessScope};

use super::backend::{create_engine, AudioHandle, AudioSystemResult, StopFlag};
use super::config::AudioConfig;
use super::error::{AudioError, AudioResult};
use crate::engine::OrganEngine;

/// JACK-specific audio handle
///
/// Keeps the JACK client active. Drop this to disconnect from JACK.
pub struct JackAudioHandle {
    _async_client: jack::AsyncClient<JackNotifications, JackProcessor>,
    pub(crate) stop: StopFlag,
    sample_rate: u32,
    buffer_size: u32,
}

impl JackAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }
}

/// JACK process handler
///
/// Owns the OrganEngine exclusively.
pub struct JackProcessor {
    ports: Vec<Port<AudioOut>>,
    engine: OrganEngine,
    stop: StopFlag,
}

impl jack::ProcessHandler for JackProcessor {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        if self.stop.is_raised() {
            for port in self.ports.iter_mut() {
                port.as_mut_slice(ps).fill(0.0);
            }
            return Control::Quit;
        }

        // At most four ports, no allocation
        let mut outputs: [&mut [f32]; 4] = [&mut [], &mut [], &mut [], &mut []];
        let n = self.ports.len().min(outputs.len());
        for (slot, port) in outputs.iter_mut().zip(self.ports.iter_mut()) {
            *slot = port.as_mut_slice(ps);
        }
        self.engine.process(&mut outputs[..n]);

        Control::Continue
    }
}

/// JACK notification handler
pub struct JackNotifications {
    stop: StopFlag,
}

impl jack::NotificationHandler for JackNotifications {
    fn shutdown(&mut self, _status: jack::ClientStatus, reason: &str) {
        log::warn!("JACK server shut down: {}", reason);
        self.stop.raise();
    }

    fn sample_rate(&mut self, _client: &Client, srate: jack::Frames) -> Control {
        log::info!("JACK sample rate changed to: {}", srate);
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("JACK xrun detected");
        Control::Continue
    }
}

/// Start the JACK audio system
///
/// Creates a JACK client, registers ports, and starts processing.
pub fn start_audio_system(config: &AudioConfig) -> AudioResult<AudioSystemResult> {
    // JACK may rename the client if the name is taken
    let (client, _status) = Client::new(&config.client_name, ClientOptions::NO_START_SERVER)
        .map_err(|e| AudioError::Jack(format!("Failed to create client: {}", e)))?;
    let client_name = client.name().to_string();

    let sample_rate = client.sample_rate() as u32;
    let buffer_size = client.buffer_size();

    log::info!(
        "JACK client '{}' created (sample rate: {}Hz, buffer: {} frames, latency: {:.1}ms)",
        client_name,
        sample_rate,
        buffer_size,
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    );

    let mut ports = Vec::with_capacity(config.layout.channels());
    for name in config.layout.port_names() {
        let port = client
            .register_port(name, AudioOut::default())
            .map_err(|e| AudioError::Jack(format!("Failed to register port '{}': {}", name, e)))?;
        ports.push(port);
    }

    let (engine, channels) = create_engine(sample_rate, config);
    let info = engine.info();
    let stop = StopFlag::default();

    let processor = JackProcessor {
        ports,
        engine,
        stop: stop.clone(),
    };
    let notifications = JackNotifications { stop: stop.clone() };

    let async_client = client
        .activate_async(notifications, processor)
        .map_err(|e| AudioError::Jack(format!("Failed to activate client: {}", e)))?;

    log::info!("JACK client activated ({:?} layout)", config.layout);

    if config.autoconnect {
        connect_playback(async_client.as_client(), &client_name, config.layout.port_names());
    }

    let handle = JackAudioHandle {
        _async_client: async_client,
        stop,
        sample_rate,
        buffer_size,
    };

    Ok(AudioSystemResult::new(AudioHandle::Jack(handle), channels, info, buffer_size))
}

/// Connect our outputs to the physical playback ports in order
///
/// Failures are logged; the engine keeps running unconnected.
fn connect_playback(client: &Client, client_name: &str, port_names: &[&str]) {
    let playback = client.ports(
        None,
        Some("32 bit float mono audio"),
        jack::PortFlags::IS_INPUT | jack::PortFlags::IS_PHYSICAL,
    );
    if playback.len() < port_names.len() {
        log::warn!(
            "Only {} physical playback ports for {} outputs",
            playback.len(),
            port_names.len()
        );
    }

    for (name, dest) in port_names.iter().zip(playback.iter()) {
        let source = format!("{}:{}", client_name, name);
        match client.connect_ports_by_name(&source, dest) {
            Ok(()) => log::info!("Connected {} -> {}", source, dest),
            Err(e) => log::warn!("Failed to connect {} -> {}: {}", source, dest, e),
        }
    }
}
