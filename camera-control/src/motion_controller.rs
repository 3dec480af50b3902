//! Keyboard state to continuous PTZ motion.
//!
//! Each axis keeps its own pressed keys and one active direction (last press
//! wins). Pan, tilt and zoom follow the active direction; focus follows the
//! raw pressed state of its keys. Commands are only emitted when the scaled
//! vector actually changes.

use crate::ptz_actuator::{PtzCommand, Velocity};
use crate::ptz_keys::{normalize_key, Axis, Direction, KeyAxis, KeyBindings};
use serde::Deserialize;
use std::collections::HashMap;

const MIN_SPEED_TENTHS: u8 = 1;
const MAX_SPEED_TENTHS: u8 = 10;
const DEFAULT_SPEED_TENTHS: u8 = 5;

const KEY_SPEED_UP: &str = "m";
const KEY_SPEED_DOWN: &str = "n";
const KEY_ESCAPE: &str = "escape";

/// Receives the commands the controller decides to send.
pub trait CommandSink {
    fn submit(&mut self, command: PtzCommand);
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub bindings: KeyBindings,
    /// Key name to preset token.
    pub presets: HashMap<String, String>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        let presets = (1..=9)
            .map(|n| (n.to_string(), format!("PresetToken{n}")))
            .collect();
        Self {
            bindings: KeyBindings::default(),
            presets,
        }
    }
}

/// Per-axis direction in {-1, 0, 1}.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Movement {
    pub pan: i8,
    pub tilt: i8,
    pub zoom: i8,
}

impl Movement {
    pub fn scaled(self, speed: f32) -> Velocity {
        Velocity::new(
            scale(self.pan, speed),
            scale(self.tilt, speed),
            scale(self.zoom, speed),
        )
    }
}

fn scale(value: i8, speed: f32) -> f32 {
    if value == 0 {
        0.0
    } else {
        f32::from(value) * speed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpeedChange {
    Increase,
    Decrease,
}

#[derive(Clone, Debug, PartialEq)]
pub enum KeyOutcome {
    Motion,
    Speed(f32),
    Preset(String),
    Quit,
    Ignored,
}

pub struct MotionController<S> {
    axes: Vec<KeyAxis>,
    presets: HashMap<String, String>,
    speed_tenths: u8,
    last_velocity: Velocity,
    last_focus: f32,
    sink: S,
}

impl<S: CommandSink> MotionController<S> {
    pub fn new(config: MotionConfig, sink: S) -> Self {
        let presets = config
            .presets
            .into_iter()
            .map(|(key, token)| (normalize_key(&key), token))
            .collect();
        Self {
            axes: config.bindings.axes(),
            presets,
            speed_tenths: DEFAULT_SPEED_TENTHS,
            last_velocity: Velocity::ZERO,
            last_focus: 0.0,
            sink,
        }
    }

    pub fn speed(&self) -> f32 {
        f32::from(self.speed_tenths) / 10.0
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn last_velocity(&self) -> Velocity {
        self.last_velocity
    }

    pub fn last_focus(&self) -> f32 {
        self.last_focus
    }

    /// Routes a raw key press: speed hotkeys, presets, escape, then motion keys.
    pub fn handle_key_press(&mut self, raw: &str) -> KeyOutcome {
        let key = normalize_key(raw);
        if key == KEY_SPEED_UP {
            return KeyOutcome::Speed(self.adjust_speed(SpeedChange::Increase));
        }
        if key == KEY_SPEED_DOWN {
            return KeyOutcome::Speed(self.adjust_speed(SpeedChange::Decrease));
        }
        if let Some(token) = self.presets.get(&key).cloned() {
            self.goto_preset(&token);
            return KeyOutcome::Preset(token);
        }
        if key == KEY_ESCAPE {
            self.escape();
            return KeyOutcome::Quit;
        }
        let matched = self.on_key_press(&key);
        self.update();
        if matched {
            KeyOutcome::Motion
        } else {
            KeyOutcome::Ignored
        }
    }

    pub fn handle_key_release(&mut self, raw: &str) -> bool {
        let matched = self.on_key_release(raw);
        self.update();
        matched
    }

    /// Returns whether the key is bound on any axis.
    pub fn on_key_press(&mut self, raw: &str) -> bool {
        let key = normalize_key(raw);
        let mut matched = false;
        for axis in &mut self.axes {
            matched |= axis.press(&key);
        }
        matched
    }

    pub fn on_key_release(&mut self, raw: &str) -> bool {
        let key = normalize_key(raw);
        let mut matched = false;
        for axis in &mut self.axes {
            matched |= axis.release(&key);
        }
        matched
    }

    pub fn compute_movement(&self) -> Movement {
        Movement {
            pan: self.axis_value(Axis::Horizontal),
            tilt: self.axis_value(Axis::Vertical),
            zoom: self.axis_value(Axis::Zoom),
        }
    }

    /// Focus reads the held keys directly instead of the active direction:
    /// `in` wins whenever it is held.
    pub fn compute_focus(&self) -> i8 {
        let Some(focus) = self.key_axis(Axis::Focus) else {
            return 0;
        };
        if focus.is_pressed(Direction::In) {
            1
        } else if focus.is_pressed(Direction::Out) {
            -1
        } else {
            0
        }
    }

    /// Sends only what changed since the last dispatch. Local state is
    /// updated before the remote call completes, whatever its outcome.
    pub fn dispatch(&mut self, movement: Movement, focus: i8) {
        let speed = self.speed();
        let velocity = movement.scaled(speed);
        if velocity.is_zero() {
            if !self.last_velocity.is_zero() {
                self.last_velocity = Velocity::ZERO;
                self.sink.submit(PtzCommand::Stop);
            }
        } else if velocity != self.last_velocity {
            self.last_velocity = velocity;
            self.sink.submit(PtzCommand::Continuous(velocity));
        }

        let focus_speed = scale(focus, speed);
        if focus_speed != 0.0 {
            if focus_speed != self.last_focus {
                self.last_focus = focus_speed;
                self.sink.submit(PtzCommand::StartFocus(focus_speed));
            }
        } else if self.last_focus != 0.0 {
            self.last_focus = 0.0;
            self.sink.submit(PtzCommand::StopFocus);
        }
    }

    /// Recomputes the target from key state and dispatches it.
    pub fn update(&mut self) {
        let movement = self.compute_movement();
        let focus = self.compute_focus();
        self.dispatch(movement, focus);
    }

    /// Steps the speed by 0.1 within [0.1, 1.0]; motion in progress picks up
    /// the new rate immediately.
    pub fn adjust_speed(&mut self, change: SpeedChange) -> f32 {
        self.speed_tenths = match change {
            SpeedChange::Increase => (self.speed_tenths + 1).min(MAX_SPEED_TENTHS),
            SpeedChange::Decrease => self.speed_tenths.saturating_sub(1).max(MIN_SPEED_TENTHS),
        };
        log::info!("PTZ speed {:.1}", self.speed());
        self.update();
        self.speed()
    }

    pub fn goto_preset(&mut self, token: &str) {
        log::info!("PTZ preset {token}");
        self.sink.submit(PtzCommand::GotoPreset(token.to_string()));
    }

    /// Stops any motion and focus in progress.
    pub fn escape(&mut self) {
        if !self.last_velocity.is_zero() {
            self.last_velocity = Velocity::ZERO;
            self.sink.submit(PtzCommand::Stop);
        }
        if self.last_focus != 0.0 {
            self.last_focus = 0.0;
            self.sink.submit(PtzCommand::StopFocus);
        }
    }

    fn key_axis(&self, axis: Axis) -> Option<&KeyAxis> {
        self.axes.iter().find(|key_axis| key_axis.axis() == axis)
    }

    fn axis_value(&self, axis: Axis) -> i8 {
        self.key_axis(axis).map_or(0, KeyAxis::value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl CommandSink for Vec<PtzCommand> {
        fn submit(&mut self, command: PtzCommand) {
            self.push(command);
        }
    }

    fn controller() -> MotionController<Vec<PtzCommand>> {
        MotionController::new(MotionConfig::default(), Vec::new())
    }

    fn take(controller: &mut MotionController<Vec<PtzCommand>>) -> Vec<PtzCommand> {
        std::mem::take(controller.sink_mut())
    }

    #[test]
    fn movement_follows_active_direction() {
        let mut controller = controller();
        controller.on_key_press("a");
        controller.on_key_press("Up");
        controller.on_key_press("Shift_L");
        assert_eq!(
            controller.compute_movement(),
            Movement {
                pan: -1,
                tilt: 1,
                zoom: 1
            }
        );

        controller.on_key_press("Control_R");
        assert_eq!(controller.compute_movement().zoom, -1);
        controller.on_key_release("Control_R");
        assert_eq!(controller.compute_movement().zoom, 1);
    }

    #[test]
    fn horizontal_press_release_sequence() {
        let mut controller = controller();
        controller.on_key_press("a");
        controller.on_key_press("d");
        assert_eq!(controller.compute_movement().pan, 1);
        controller.on_key_release("d");
        assert_eq!(controller.compute_movement().pan, -1);
        controller.on_key_release("a");
        assert_eq!(controller.compute_movement().pan, 0);
    }

    #[test]
    fn focus_uses_raw_pressed_state() {
        let mut controller = controller();
        controller.on_key_press("e");
        controller.on_key_press("q");
        assert_eq!(controller.compute_focus(), 1);

        let mut controller = self::controller();
        controller.on_key_press("q");
        controller.on_key_press("e");
        assert_eq!(controller.compute_focus(), 1);

        controller.on_key_release("q");
        assert_eq!(controller.compute_focus(), -1);
        assert_eq!(controller.compute_movement(), Movement::default());
    }

    #[test]
    fn dispatch_suppresses_duplicates_and_stops_once() {
        let mut controller = controller();
        let right = Movement {
            pan: 1,
            ..Movement::default()
        };
        controller.dispatch(right, 0);
        controller.dispatch(right, 0);
        controller.dispatch(Movement::default(), 0);
        controller.dispatch(Movement::default(), 0);
        assert_eq!(
            take(&mut controller),
            vec![
                PtzCommand::Continuous(Velocity::new(0.5, 0.0, 0.0)),
                PtzCommand::Stop,
            ]
        );
    }

    #[test]
    fn nothing_sent_while_idle() {
        let mut controller = controller();
        controller.update();
        controller.handle_key_release("a");
        assert!(take(&mut controller).is_empty());
    }

    #[test]
    fn focus_start_and_stop_are_paired() {
        let mut controller = controller();
        controller.handle_key_press("q");
        controller.handle_key_press("q");
        controller.handle_key_release("q");
        assert_eq!(
            take(&mut controller),
            vec![PtzCommand::StartFocus(0.5), PtzCommand::StopFocus]
        );
    }

    #[test]
    fn speed_is_clamped() {
        let mut controller = controller();
        for _ in 0..20 {
            controller.adjust_speed(SpeedChange::Increase);
        }
        assert_eq!(controller.speed(), 1.0);
        for _ in 0..20 {
            controller.adjust_speed(SpeedChange::Decrease);
        }
        assert_eq!(controller.speed(), 0.1);
        controller.adjust_speed(SpeedChange::Increase);
        controller.adjust_speed(SpeedChange::Increase);
        assert_eq!(controller.speed(), 0.3);
    }

    #[test]
    fn speed_change_updates_motion_in_progress() {
        let mut controller = controller();
        assert_eq!(controller.handle_key_press("w"), KeyOutcome::Motion);
        assert_eq!(controller.handle_key_press("m"), KeyOutcome::Speed(0.6));
        assert_eq!(
            take(&mut controller),
            vec![
                PtzCommand::Continuous(Velocity::new(0.0, 0.5, 0.0)),
                PtzCommand::Continuous(Velocity::new(0.0, 0.6, 0.0)),
            ]
        );
    }

    #[test]
    fn hotkeys_route_presets_and_escape() {
        let mut controller = controller();
        assert_eq!(
            controller.handle_key_press("3"),
            KeyOutcome::Preset("PresetToken3".to_string())
        );
        controller.handle_key_press("Right");
        controller.handle_key_press("e");
        assert_eq!(controller.handle_key_press("Escape"), KeyOutcome::Quit);
        assert_eq!(
            take(&mut controller),
            vec![
                PtzCommand::GotoPreset("PresetToken3".to_string()),
                PtzCommand::Continuous(Velocity::new(0.5, 0.0, 0.0)),
                PtzCommand::StartFocus(-0.5),
                PtzCommand::Stop,
                PtzCommand::StopFocus,
            ]
        );
    }

    #[test]
    fn unbound_key_is_ignored() {
        let mut controller = controller();
        assert_eq!(controller.handle_key_press("x"), KeyOutcome::Ignored);
        assert!(!controller.handle_key_release("x"));
        assert!(take(&mut controller).is_empty());
    }
}
