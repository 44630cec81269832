// Motion control: turns raw control deltas into smoothed actuator values
//
// Translation: target = joystick + 127 per pressed key, clamped, then stepped
// toward with a gentle acceleration and a harder braking step.
// Rotation: bounded integrator with dead-zone, ramp and damping ceiling.
// Pitch: plain bounded accumulator.

use crate::config::{MOV_ACC, MOV_BRK, PITCH_MAX, ROT_ACC, ROT_DMP, ROT_DZN, ROT_MAX, ROT_SEN};
use crate::messages::{ActuatorState, ControlSample, KeyMask};

const AXIS_MAX: i32 = 127;

/// Per-tick motion state owned by the tick path
#[derive(Debug, Clone, Default)]
pub struct MotionController {
    state: ActuatorState,
    integrator: i64,
}

impl MotionController {
    /// Start at rest with a zeroed pose
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn integrator(&self) -> i64 {
        self.integrator
    }

    /// Advance one tick using a valid control sample
    ///
    /// Only call this while the link to the host's control system is up;
    /// the sample is meaningless otherwise.
    pub fn update(&mut self, sample: &ControlSample) -> ActuatorState {
        let tgt_x = translation_target(sample.dx, sample.keys, KeyMask::LEFT, KeyMask::RIGHT);
        let tgt_y = translation_target(sample.dy, sample.keys, KeyMask::UP, KeyMask::DOWN);

        self.state.strafe = smooth_axis(self.state.strafe, tgt_x);
        self.state.forward = smooth_axis(self.state.forward, tgt_y);
        self.update_rotation(sample.mx);
        self.update_pitch(sample.my);

        self.state
    }

    /// Stop all motion and return the camera to its resting angle
    pub fn park(&mut self) -> ActuatorState {
        self.state = ActuatorState::parked();
        self.integrator = 0;
        self.state
    }

    fn update_rotation(&mut self, mx: i32) {
        let rotate = i64::from(self.state.rotate);

        // Decay truncates toward zero before the new delta is added
        let decayed = (self.integrator as f64 - rotate as f64 * ROT_SEN) as i64;
        self.integrator = decayed
            .saturating_add(i64::from(mx))
            .clamp(-ROT_MAX, ROT_MAX);

        let i = self.integrator;
        let next = if i > ROT_DZN {
            let ramped = if rotate < 127 - ROT_ACC {
                rotate + ROT_ACC
            } else {
                127
            };
            ramped.min(i / ROT_DMP + ROT_DZN)
        } else if i < -ROT_DZN {
            let ramped = if rotate > -(127 - ROT_ACC) {
                rotate - ROT_ACC
            } else {
                -127
            };
            ramped.max(i / ROT_DMP - ROT_DZN)
        } else {
            0
        };

        self.state.rotate = next as i8;
    }

    fn update_pitch(&mut self, my: i32) {
        let pitch = i64::from(self.state.pitch) + i64::from(my);
        self.state.pitch = pitch.clamp(0, i64::from(PITCH_MAX)) as u16;
    }
}

/// Joystick delta plus a full deflection per pressed key, clamped to the axis range
fn translation_target(axis: i32, keys: KeyMask, negative: KeyMask, positive: KeyMask) -> i32 {
    let mut target = axis;
    if keys.contains(negative) {
        target = target.saturating_sub(AXIS_MAX);
    }
    if keys.contains(positive) {
        target = target.saturating_add(AXIS_MAX);
    }
    target.clamp(-AXIS_MAX, AXIS_MAX)
}

/// Step the output toward the target; braking is chosen by the sign of the output
fn smooth_axis(current: i8, target: i32) -> i8 {
    let current = i32::from(current);
    let next = if current >= 0 {
        if current > target {
            (current - MOV_BRK).max(target)
        } else {
            (current + MOV_ACC).min(target)
        }
    } else if current < target {
        (current + MOV_BRK).min(target)
    } else {
        (current - MOV_ACC).max(target)
    };
    next as i8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PITCH_PARKED;
    use proptest::prelude::*;

    fn sample(dx: i32, dy: i32, mx: i32, my: i32) -> ControlSample {
        ControlSample {
            dx,
            dy,
            mx,
            my,
            keys: KeyMask::NONE,
        }
    }

    #[test]
    fn test_joystick_accelerates_then_converges() {
        let mut ctrl = MotionController::new();
        let input = sample(100, 0, 0, 0);

        let first = ctrl.update(&input);
        assert_eq!(first.strafe, 2, "first tick should only step by the acceleration");

        for _ in 0..100 {
            ctrl.update(&input);
        }
        assert_eq!(ctrl.state().strafe, 100);

        // Holding the input keeps it there
        for _ in 0..10 {
            assert_eq!(ctrl.update(&input).strafe, 100);
        }
    }

    #[test]
    fn test_release_brakes_faster_than_acceleration() {
        let mut ctrl = MotionController::new();
        for _ in 0..60 {
            ctrl.update(&sample(0, 100, 0, 0));
        }
        assert_eq!(ctrl.state().forward, 100);

        let after = ctrl.update(&sample(0, 0, 0, 0));
        assert_eq!(after.forward, 95);

        for _ in 0..30 {
            ctrl.update(&sample(0, 0, 0, 0));
        }
        assert_eq!(ctrl.state().forward, 0);
    }

    #[test]
    fn test_negative_output_steps() {
        let mut ctrl = MotionController::new();
        // From rest, a negative target is approached with the braking step
        assert_eq!(ctrl.update(&sample(-100, 0, 0, 0)).strafe, -5);
        // Once negative, growing magnitude uses the acceleration step
        assert_eq!(ctrl.update(&sample(-100, 0, 0, 0)).strafe, -7);
        // Heading back toward zero brakes
        assert_eq!(ctrl.update(&sample(0, 0, 0, 0)).strafe, -2);
        assert_eq!(ctrl.update(&sample(0, 0, 0, 0)).strafe, 0);
    }

    #[test]
    fn test_keys_add_full_deflection_and_clamp() {
        assert_eq!(translation_target(0, KeyMask::RIGHT, KeyMask::LEFT, KeyMask::RIGHT), 127);
        assert_eq!(translation_target(50, KeyMask::LEFT, KeyMask::LEFT, KeyMask::RIGHT), -77);
        assert_eq!(translation_target(90, KeyMask::DOWN, KeyMask::UP, KeyMask::DOWN), 127);
        assert_eq!(
            translation_target(10, KeyMask::UP | KeyMask::DOWN, KeyMask::UP, KeyMask::DOWN),
            10
        );
    }

    #[test]
    fn test_rotation_dead_zone() {
        let mut ctrl = MotionController::new();
        assert_eq!(ctrl.update(&sample(0, 0, 3, 0)).rotate, 0);
        assert_eq!(ctrl.integrator(), 3);
        assert_eq!(ctrl.update(&sample(0, 0, -6, 0)).rotate, 0);
        assert_eq!(ctrl.integrator(), -3);
    }

    #[test]
    fn test_rotation_ramp_and_damping_cap() {
        let mut ctrl = MotionController::new();

        // Integrator 10: ramp to 6 then cap at 10/6 + 3 = 4
        assert_eq!(ctrl.update(&sample(0, 0, 10, 0)).rotate, 4);

        // Large error ramps by the acceleration step
        let mut ctrl = MotionController::new();
        assert_eq!(ctrl.update(&sample(0, 0, 600, 0)).rotate, 6);
        assert_eq!(ctrl.update(&sample(0, 0, 0, 0)).rotate, 12);
        assert_eq!(ctrl.integrator(), 597);
    }

    #[test]
    fn test_rotation_negative_cap() {
        let mut ctrl = MotionController::new();
        // Integrator -10: ramp to -6 then cap at -10/6 - 3 = -4
        assert_eq!(ctrl.update(&sample(0, 0, -10, 0)).rotate, -4);
    }

    #[test]
    fn test_rotation_decays_to_zero() {
        let mut ctrl = MotionController::new();
        ctrl.update(&sample(0, 0, 200, 0));
        for _ in 0..200 {
            ctrl.update(&sample(0, 0, 0, 0));
        }
        assert_eq!(ctrl.state().rotate, 0);
        assert!(ctrl.integrator().abs() <= ROT_DZN);
    }

    #[test]
    fn test_integrator_clamped() {
        let mut ctrl = MotionController::new();
        ctrl.update(&sample(0, 0, i32::MAX, 0));
        assert_eq!(ctrl.integrator(), ROT_MAX);
        ctrl.park();
        ctrl.update(&sample(0, 0, i32::MIN, 0));
        assert_eq!(ctrl.integrator(), -ROT_MAX);
    }

    #[test]
    fn test_pitch_accumulates_within_bounds() {
        let mut ctrl = MotionController::new();
        assert_eq!(ctrl.update(&sample(0, 0, 0, 40)).pitch, 40);
        assert_eq!(ctrl.update(&sample(0, 0, 0, -100)).pitch, 0);
        assert_eq!(ctrl.update(&sample(0, 0, 0, 5000)).pitch, PITCH_MAX);
    }

    #[test]
    fn test_park_is_idempotent() {
        let mut ctrl = MotionController::new();
        for _ in 0..20 {
            ctrl.update(&sample(80, -60, 50, 30));
        }
        let once = ctrl.park();
        let twice = ctrl.park();
        assert_eq!(once, twice);
        assert_eq!(once, ActuatorState::parked());
        assert_eq!(once.pitch, PITCH_PARKED);
        assert_eq!(ctrl.integrator(), 0);
    }

    fn arb_sample() -> impl Strategy<Value = ControlSample> {
        (
            -400i32..400,
            -400i32..400,
            -2000i32..2000,
            -1000i32..1000,
            0u8..16,
        )
            .prop_map(|(dx, dy, mx, my, keys)| ControlSample {
                dx,
                dy,
                mx,
                my,
                keys: KeyMask(keys),
            })
    }

    proptest! {
        #[test]
        fn prop_outputs_stay_in_range(samples in prop::collection::vec(arb_sample(), 1..200)) {
            let mut ctrl = MotionController::new();
            for s in &samples {
                let out = ctrl.update(s);
                prop_assert!((-127..=127).contains(&out.strafe));
                prop_assert!((-127..=127).contains(&out.forward));
                prop_assert!((-127..=127).contains(&out.rotate));
                prop_assert!(out.pitch <= PITCH_MAX);
                prop_assert!((-ROT_MAX..=ROT_MAX).contains(&ctrl.integrator()));
            }
        }

        #[test]
        fn prop_rotation_law(samples in prop::collection::vec(arb_sample(), 1..200)) {
            let mut ctrl = MotionController::new();
            for s in &samples {
                let out = ctrl.update(s);
                let i = ctrl.integrator();
                let r = i64::from(out.rotate);
                if i.abs() <= ROT_DZN {
                    prop_assert_eq!(r, 0);
                } else if i > ROT_DZN {
                    prop_assert!(r <= i / ROT_DMP + ROT_DZN);
                } else {
                    prop_assert!(r >= i / ROT_DMP - ROT_DZN);
                }
            }
        }
    }
}
