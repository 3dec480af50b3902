use serde::Deserialize;
use strum::{Display, EnumIter, IntoEnumIterator};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Axis {
    Horizontal,
    Vertical,
    Zoom,
    Focus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
    In,
    Out,
}

impl Direction {
    pub fn sign(self) -> i8 {
        match self {
            Direction::Left | Direction::Down | Direction::Out => -1,
            Direction::Right | Direction::Up | Direction::In => 1,
        }
    }
}

/// Maps a platform key name onto the name used in bindings.
pub fn normalize_key(raw: &str) -> String {
    let key = raw.trim().to_lowercase();
    match key.as_str() {
        "control_l" | "control_r" | "control" | "ctrl_l" | "ctrl_r" => "ctrl".to_string(),
        "shift_l" | "shift_r" => "shift".to_string(),
        _ => key,
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DirectionBinding {
    pub direction: Direction,
    pub keys: Vec<String>,
}

/// Key state of one axis.
///
/// Directions are kept in binding order; that order breaks ties when the
/// active direction is released while others are still held.
#[derive(Clone, Debug)]
pub struct KeyAxis {
    axis: Axis,
    bindings: Vec<DirectionBinding>,
    pressed: Vec<bool>,
    active: Option<usize>,
}

impl KeyAxis {
    pub fn new(axis: Axis, bindings: Vec<DirectionBinding>) -> Self {
        let bindings: Vec<DirectionBinding> = bindings
            .into_iter()
            .map(|binding| DirectionBinding {
                direction: binding.direction,
                keys: binding.keys.iter().map(|key| normalize_key(key)).collect(),
            })
            .collect();
        let pressed = vec![false; bindings.len()];
        Self {
            axis,
            bindings,
            pressed,
            active: None,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Marks the bound direction held and makes it the active one.
    pub fn press(&mut self, key: &str) -> bool {
        let Some(index) = self.binding_index(key) else {
            return false;
        };
        self.pressed[index] = true;
        self.active = Some(index);
        true
    }

    pub fn release(&mut self, key: &str) -> bool {
        let Some(index) = self.binding_index(key) else {
            return false;
        };
        self.pressed[index] = false;
        if self.active == Some(index) || !self.pressed.iter().any(|held| *held) {
            self.active = self.pressed.iter().position(|held| *held);
        }
        true
    }

    pub fn active_direction(&self) -> Option<Direction> {
        self.active.map(|index| self.bindings[index].direction)
    }

    pub fn is_pressed(&self, direction: Direction) -> bool {
        self.bindings
            .iter()
            .zip(&self.pressed)
            .any(|(binding, held)| binding.direction == direction && *held)
    }

    /// -1, 0 or 1 from the active direction.
    pub fn value(&self) -> i8 {
        self.active_direction().map_or(0, Direction::sign)
    }

    fn binding_index(&self, key: &str) -> Option<usize> {
        self.bindings
            .iter()
            .position(|binding| binding.keys.iter().any(|bound| bound == key))
    }
}

/// Key layout for all four axes. Axes missing from a key map keep their
/// default keys.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub horizontal: Vec<DirectionBinding>,
    pub vertical: Vec<DirectionBinding>,
    pub zoom: Vec<DirectionBinding>,
    pub focus: Vec<DirectionBinding>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            horizontal: vec![
                binding(Direction::Left, &["a", "left"]),
                binding(Direction::Right, &["d", "right"]),
            ],
            vertical: vec![
                binding(Direction::Up, &["w", "up"]),
                binding(Direction::Down, &["s", "down"]),
            ],
            zoom: vec![
                binding(Direction::In, &["shift"]),
                binding(Direction::Out, &["ctrl"]),
            ],
            focus: vec![
                binding(Direction::In, &["q"]),
                binding(Direction::Out, &["e"]),
            ],
        }
    }
}

impl KeyBindings {
    pub fn axes(&self) -> Vec<KeyAxis> {
        Axis::iter()
            .map(|axis| KeyAxis::new(axis, self.for_axis(axis).to_vec()))
            .collect()
    }

    fn for_axis(&self, axis: Axis) -> &[DirectionBinding] {
        match axis {
            Axis::Horizontal => &self.horizontal,
            Axis::Vertical => &self.vertical,
            Axis::Zoom => &self.zoom,
            Axis::Focus => &self.focus,
        }
    }
}

fn binding(direction: Direction, keys: &[&str]) -> DirectionBinding {
    DirectionBinding {
        direction,
        keys: keys.iter().map(|key| key.to_string()).collect(),
    }
}
