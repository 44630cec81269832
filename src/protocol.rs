// KiwiRay firmware serial protocol
//
// Every frame starts with the sentinel 0xFF followed by a command byte:
//   Motion:  [0xFF, 0x00, -strafe, -move, rotate, pitch*CAM_SEN, stepsize]
//   Display: [0xFF, 0x33, 23, bitmap[24]]
// There is no length field or checksum; the firmware knows each size.

use crate::config::CAM_SEN;
use crate::emoticon::{Emoticon, BITMAP_LEN};
use crate::messages::ActuatorState;

/// Leading byte of every frame
pub const SENTINEL: u8 = 0xFF;

pub const MOTION_FRAME_LEN: usize = 7;
pub const DISPLAY_FRAME_LEN: usize = 3 + BITMAP_LEN;

/// Step size sent with every motion frame (1:2^6 microstepping)
const STEP_SIZE: u8 = 3;

/// Display payload descriptor: 8x8x3 bits, minus one
const DISPLAY_SIZE: u8 = (BITMAP_LEN - 1) as u8;

/// Command bytes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Drive = 0x00,
    Display = 0x33,
}

/// Neutral frame written after every open, before the loop starts
pub const PREAMBLE: [u8; MOTION_FRAME_LEN] = [SENTINEL, Command::Drive as u8, 0, 0, 0, 0, 0];

/// Encode the current actuator state as a motion frame
pub fn motion_frame(state: &ActuatorState) -> [u8; MOTION_FRAME_LEN] {
    [
        SENTINEL,
        Command::Drive as u8,
        state.strafe.wrapping_neg() as u8,
        state.forward.wrapping_neg() as u8,
        state.rotate as u8,
        pitch_byte(state.pitch),
        STEP_SIZE,
    ]
}

/// Encode the bitmap for an icon as a display frame
pub fn display_frame(icon: Emoticon) -> [u8; DISPLAY_FRAME_LEN] {
    let mut frame = [0u8; DISPLAY_FRAME_LEN];
    frame[0] = SENTINEL;
    frame[1] = Command::Display as u8;
    frame[2] = DISPLAY_SIZE;
    frame[3..].copy_from_slice(icon.bitmap());
    frame
}

/// Scale pitch to the wire byte, truncating
fn pitch_byte(pitch: u16) -> u8 {
    (f64::from(pitch) * CAM_SEN) as u8
}
