// Value types exchanged between the host, the core and the serial loop

use serde::{Deserialize, Serialize};

use crate::config::PITCH_PARKED;

/// Keyboard direction bits as delivered by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyMask(pub u8);

impl KeyMask {
    pub const NONE: KeyMask = KeyMask(0);
    pub const UP: KeyMask = KeyMask(0x01);
    pub const DOWN: KeyMask = KeyMask(0x02);
    pub const LEFT: KeyMask = KeyMask(0x04);
    pub const RIGHT: KeyMask = KeyMask(0x08);

    pub fn contains(self, other: KeyMask) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl std::ops::BitOr for KeyMask {
    type Output = KeyMask;

    fn bitor(self, rhs: KeyMask) -> KeyMask {
        KeyMask(self.0 | rhs.0)
    }
}

/// One control-input sample: joystick axes, mouse-style look deltas and keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSample {
    pub dx: i32,
    pub dy: i32,
    pub mx: i32,
    pub my: i32,
    pub keys: KeyMask,
}

/// Smoothed output sent to the hardware
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub strafe: i8,
    /// Move axis (forward/back)
    #[serde(rename = "move")]
    pub forward: i8,
    pub rotate: i8,
    pub pitch: u16,
}

impl ActuatorState {
    /// All-stop pose with the camera tilted to its resting angle
    pub const fn parked() -> Self {
        Self {
            strafe: 0,
            forward: 0,
            rotate: 0,
            pitch: PITCH_PARKED,
        }
    }
}

/// Health status published by the bridge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BridgeHealth {
    Ok,
    CmdStale,
    Disconnected,
}
