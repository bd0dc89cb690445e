//! Broadcast Key Codes
//!
//! Logical remote-control keys, their key groups and the host keyboard
//! mapping.

/// Logical key codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AribKey {
    Up = 1,
    Down = 2,
    Left = 3,
    Right = 4,
    Digit0 = 5,
    Digit1 = 6,
    Digit2 = 7,
    Digit3 = 8,
    Digit4 = 9,
    Digit5 = 10,
    Digit6 = 11,
    Digit7 = 12,
    Digit8 = 13,
    Digit9 = 14,
    Digit10 = 15,
    Digit11 = 16,
    Digit12 = 17,
    Enter = 18,
    Back = 19,
    DataButton = 20,
    BlueButton = 21,
    RedButton = 22,
    GreenButton = 23,
    YellowButton = 24,
    DataButton1 = 25,
    DataButton2 = 26,
    Bookmark = 100,
}

/// Key groups a focused element may accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyGroup {
    Basic,
    DataButton,
    NumericTuning,
    OtherTuning,
}

impl KeyGroup {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(Self::Basic),
            "data-button" => Some(Self::DataButton),
            "numeric-tuning" => Some(Self::NumericTuning),
            "other-tuning" => Some(Self::OtherTuning),
            _ => None,
        }
    }
}

/// Navigation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl AribKey {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Key group of this key, if it belongs to one
    pub fn group(self) -> Option<KeyGroup> {
        use AribKey::*;
        match self {
            Up | Down | Left | Right | Enter | Back => Some(KeyGroup::Basic),
            BlueButton | RedButton | GreenButton | YellowButton | Bookmark => {
                Some(KeyGroup::DataButton)
            }
            Digit0 | Digit1 | Digit2 | Digit3 | Digit4 | Digit5 | Digit6 | Digit7 | Digit8
            | Digit9 | Digit10 | Digit11 | Digit12 => Some(KeyGroup::NumericTuning),
            DataButton | DataButton1 | DataButton2 => None,
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            AribKey::Up => Some(Direction::Up),
            AribKey::Down => Some(Direction::Down),
            AribKey::Left => Some(Direction::Left),
            AribKey::Right => Some(Direction::Right),
            _ => None,
        }
    }
}

/// Key modifiers held with a host key press
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyModifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyModifiers {
    /// Presses with any of these held are left to the host
    pub fn is_command(&self) -> bool {
        self.ctrl || self.alt || self.meta
    }
}

/// Translate a host key name into a logical key
pub fn translate_key(key: &str, modifiers: KeyModifiers) -> Option<AribKey> {
    if modifiers.is_command() {
        return None;
    }
    let key = match key {
        "ArrowUp" => AribKey::Up,
        "ArrowDown" => AribKey::Down,
        "ArrowLeft" => AribKey::Left,
        "ArrowRight" => AribKey::Right,
        "0" => AribKey::Digit0,
        "1" => AribKey::Digit1,
        "2" => AribKey::Digit2,
        "3" => AribKey::Digit3,
        "4" => AribKey::Digit4,
        "5" => AribKey::Digit5,
        "6" => AribKey::Digit6,
        "7" => AribKey::Digit7,
        "8" => AribKey::Digit8,
        "9" => AribKey::Digit9,
        "Enter" | "Space" | " " => AribKey::Enter,
        "Backspace" | "X" | "x" => AribKey::Back,
        "D" | "d" => AribKey::DataButton,
        "B" | "b" => AribKey::BlueButton,
        "R" | "r" => AribKey::RedButton,
        "G" | "g" => AribKey::GreenButton,
        "Y" | "y" => AribKey::YellowButton,
        "E" | "e" => AribKey::DataButton1,
        "F" | "f" => AribKey::DataButton2,
        _ => return None,
    };
    Some(key)
}
