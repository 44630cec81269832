// Tuning constants, timing, topics and the parsed driver configuration
use serde::Deserialize;
use std::time::Duration;

// Host tick frequency used by the bridge
pub const LOOP_HZ: u64 = 50;

// Control sample watchdog for the bridge
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Serial loop pacing: roughly 50 iterations per second
pub const COMM_PERIOD: Duration = Duration::from_millis(20);

// Delay before every reopen attempt after a write failure
pub const REOPEN_BACKOFF: Duration = Duration::from_millis(5000);

// Serial format understood by the KiwiRay firmware
pub const SERIAL_FORMAT: &str = "115200,n,8,1";

// Rotation control law
pub const ROT_DZN: i64 = 3; // dead-zone
pub const ROT_ACC: i64 = 6; // acceleration
pub const ROT_DMP: i64 = 6; // damping divisor
pub const ROT_SEN: f64 = 0.5; // integrator decay per unit of output
pub const ROT_MAX: i64 = 1000; // integrator bound

// Translation smoothing
pub const MOV_ACC: i32 = 2; // acceleration step
pub const MOV_BRK: i32 = 5; // braking step

// Camera pitch sensitivity (pitch units to wire byte)
pub const CAM_SEN: f64 = 0.3;
pub const PITCH_MAX: u16 = (255.0 / CAM_SEN) as u16;
pub const PITCH_PARKED: u16 = (165.0 / CAM_SEN) as u16;

// Ticks an emoticon stays on screen before reverting
pub const TIMEOUT_EMOTICON: u32 = 100;

// Longest inbound text accepted from the client
pub const MAX_TEXT_LEN: usize = 255;

// Zenoh topics
pub const TOPIC_CONTROL: &str = "kiwiray/host/control"; // control samples
pub const TOPIC_TEXT: &str = "kiwiray/host/text"; // commands and speech
pub const TOPIC_CONNECTED: &str = "kiwiray/host/connected"; // link status
pub const TOPIC_STILL: &str = "kiwiray/host/still"; // connection glitch
pub const TOPIC_CAP: &str = "kiwiray/host/cap"; // capability requests
pub const TOPIC_REPLY: &str = "kiwiray/client/reply"; // replies to the client
pub const TOPIC_SAY: &str = "kiwiray/speech/say"; // text to speak
pub const TOPIC_VOICE: &str = "kiwiray/speech/voice"; // voice selection
pub const TOPIC_HEALTH: &str = "kiwiray/state/health"; // bridge health

/// Values handed to the core at init, already parsed by the host
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Serial device path; `None` leaves the hardware link disabled
    pub device: Option<String>,
    /// Ticks before a happy/angry face reverts
    pub emoticon_timeout: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device: None,
            emoticon_timeout: TIMEOUT_EMOTICON,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_limits() {
        assert_eq!(PITCH_MAX, 850);
        assert_eq!(PITCH_PARKED, 550);
    }

    #[test]
    fn test_config_defaults() {
        let cfg: DriverConfig = serde_json::from_str(r#"{"device":"/dev/ttyUSB0"}"#).unwrap();
        assert_eq!(cfg.device.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cfg.emoticon_timeout, TIMEOUT_EMOTICON);
        assert_eq!(DriverConfig::default().device, None);
    }
}
