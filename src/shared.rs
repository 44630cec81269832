// State shared between the host tick path and the serial loop.
//
// The tick path is the only writer; the serial loop only reads. Each value
// is a single atomic, so a frame is always built from one consistent
// actuator snapshot and neither side ever waits on the other.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crate::emoticon::Emoticon;
use crate::messages::ActuatorState;

#[derive(Debug)]
pub struct SharedState {
    /// Packed `ActuatorState`
    actuator: AtomicU64,
    /// Active emoticon id
    emoticon: AtomicU8,
    /// Host control link established
    connected: AtomicBool,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            actuator: AtomicU64::new(pack(&ActuatorState::default())),
            emoticon: AtomicU8::new(Emoticon::Idle.id()),
            connected: AtomicBool::new(false),
        }
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_actuator(&self, state: &ActuatorState) {
        self.actuator.store(pack(state), Ordering::Release);
    }

    pub fn actuator(&self) -> ActuatorState {
        unpack(self.actuator.load(Ordering::Acquire))
    }

    pub fn publish_emoticon(&self, icon: Emoticon) {
        self.emoticon.store(icon.id(), Ordering::Release);
    }

    pub fn emoticon(&self) -> Emoticon {
        Emoticon::from_id(self.emoticon.load(Ordering::Acquire)).unwrap_or(Emoticon::Idle)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

fn pack(state: &ActuatorState) -> u64 {
    u64::from(state.strafe as u8)
        | u64::from(state.forward as u8) << 8
        | u64::from(state.rotate as u8) << 16
        | u64::from(state.pitch) << 32
}

fn unpack(raw: u64) -> ActuatorState {
    ActuatorState {
        strafe: raw as u8 as i8,
        forward: (raw >> 8) as u8 as i8,
        rotate: (raw >> 16) as u8 as i8,
        pitch: (raw >> 32) as u16,
    }
}
