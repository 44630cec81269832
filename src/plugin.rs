// KiwiRay core as seen by the host.
//
// The host calls into [`Plugin`] (init, tick, connection changes, inbound
// text, glitch and shutdown) and provides [`Host`] for everything flowing
// back: control samples, client replies, speech and capability toggles.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::comm::CommHandle;
use crate::config::{DriverConfig, MAX_TEXT_LEN};
use crate::emoticon::EmoticonState;
use crate::messages::ControlSample;
use crate::motion::MotionController;
use crate::serial::{LinkOpener, PortOpener};
use crate::shared::SharedState;

/// Voice index meaning "whatever is selected now"
pub const VOICE_CURRENT: i32 = -1;

/// Host capability toggled by `/MIRROR`
pub const CAP_MIRROR: u32 = 1;

const VOICE_PREFIX: &str = "LANGUAGE/VOICE: ";
const UNKNOWN_PREFIX: &str = "UNKNOWN COMMAND: ";

/// Errors reported back to the host; none of them are fatal
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Inbound text too long: {len} bytes (max {max})")]
    TextTooLong { len: usize, max: usize },

    #[error("Failed to start serial loop: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Services the host offers to the core
pub trait Host {
    /// Latest control-input sample; only meaningful while connected
    fn control_sample(&self) -> ControlSample;
    /// Send bytes back to the remote client
    fn client_send(&mut self, data: &[u8]);
    /// Queue text for speech
    fn speak_text(&mut self, text: &str);
    /// Select a voice (or query with `VOICE_CURRENT`) and return its name
    fn speak_voice(&mut self, index: i32) -> String;
    /// Toggle a host capability flag
    fn toggle_capability(&mut self, cap: u32);
}

/// Callbacks the host invokes on the core
pub trait Plugin {
    fn init(&mut self, config: DriverConfig) -> Result<(), PluginError>;
    fn tick(&mut self);
    fn connection_status(&mut self, connected: bool);
    fn receive(&mut self, data: &[u8]) -> Result<(), PluginError>;
    fn still(&mut self);
    fn close(&mut self);
}

/// Inbound `/` commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Mirror,
    Voice,
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Classify text; `None` means it is speech, not a command
    pub fn parse(text: &'a str) -> Option<Self> {
        if !text.starts_with('/') {
            return None;
        }
        Some(match text {
            "/MIRROR" => Command::Mirror,
            "/VOICE" => Command::Voice,
            other => Command::Unknown(other),
        })
    }
}

pub struct KiwiRay<H: Host> {
    host: H,
    shared: Arc<SharedState>,
    motion: MotionController,
    emoticon: EmoticonState,
    comm: Option<CommHandle>,
    connected: bool,
}

impl<H: Host> KiwiRay<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            shared: Arc::new(SharedState::new()),
            motion: MotionController::new(),
            emoticon: EmoticonState::new(DriverConfig::default().emoticon_timeout),
            comm: None,
            connected: false,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// State read by the serial loop
    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn emoticon(&self) -> &EmoticonState {
        &self.emoticon
    }

    pub fn is_serial_running(&self) -> bool {
        self.comm.as_ref().is_some_and(|c| !c.is_finished())
    }

    /// Init with a custom link opener
    pub fn init_with<O>(&mut self, opener: O, config: DriverConfig) -> Result<(), PluginError>
    where
        O: LinkOpener + 'static,
    {
        self.emoticon = EmoticonState::new(config.emoticon_timeout);
        self.publish();

        match config.device {
            Some(device) => {
                info!("Starting serial loop on {}", device);
                self.comm = Some(CommHandle::spawn(opener, device, self.shared.clone())?);
            }
            None => warn!("Configuration: device missing, disabling serial"),
        }
        Ok(())
    }

    fn publish(&self) {
        self.shared.publish_actuator(&self.motion.state());
        self.shared.publish_emoticon(self.emoticon.icon());
    }

    fn announce_voice(&mut self, index: i32) {
        let voice = self.host.speak_voice(index);
        let reply = format!("{VOICE_PREFIX}{voice}");
        self.host.client_send(reply.as_bytes());
    }

    fn run_command(&mut self, command: Command<'_>) {
        match command {
            Command::Mirror => self.host.toggle_capability(CAP_MIRROR),
            Command::Voice => self.announce_voice(VOICE_CURRENT),
            Command::Unknown(text) => {
                let reply = format!("{UNKNOWN_PREFIX}{text}");
                self.host.client_send(reply.as_bytes());
            }
        }
    }
}

impl<H: Host> Plugin for KiwiRay<H> {
    fn init(&mut self, config: DriverConfig) -> Result<(), PluginError> {
        self.init_with(PortOpener, config)
    }

    fn tick(&mut self) {
        // The control sample is undefined while disconnected
        if !self.connected {
            return;
        }

        self.emoticon.tick();
        let sample = self.host.control_sample();
        self.motion.update(&sample);
        self.publish();
    }

    fn connection_status(&mut self, connected: bool) {
        // Edge-triggered: repeats must not re-announce or reset the icon
        if connected == self.connected {
            debug!("Connection already {}, ignoring", connected);
            return;
        }
        info!("Connection {}", if connected { "up" } else { "down" });
        self.connected = connected;
        self.shared.set_connected(connected);
        self.emoticon.set_connected(connected);
        if connected {
            self.announce_voice(VOICE_CURRENT);
        } else {
            self.motion.park();
        }
        self.publish();
    }

    fn receive(&mut self, data: &[u8]) -> Result<(), PluginError> {
        if data.len() > MAX_TEXT_LEN {
            warn!("Dropping {} byte message (max {})", data.len(), MAX_TEXT_LEN);
            return Err(PluginError::TextTooLong {
                len: data.len(),
                max: MAX_TEXT_LEN,
            });
        }

        let decoded = String::from_utf8_lossy(data);
        let text = decoded.trim_end_matches('\0');

        if let Some(command) = Command::parse(text) {
            info!("Command: {}", text);
            self.run_command(command);
        } else {
            let spoken = self.emoticon.apply_text(text);
            self.publish();
            info!("Speaking: {}", spoken);
            self.host.speak_text(&spoken);
        }
        Ok(())
    }

    fn still(&mut self) {
        debug!("Connection glitch, parking");
        self.motion.park();
        self.publish();
    }

    fn close(&mut self) {
        if let Some(mut comm) = self.comm.take() {
            comm.stop();
        }
    }
}
