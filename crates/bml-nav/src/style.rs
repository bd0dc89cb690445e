//! Navigation Style
//!
//! The computed presentation properties the router reads from an
//! element: `nav-index`, `nav-up/down/left/right`, `used-key-list` and
//! `visibility`.

use crate::keys::{AribKey, Direction, KeyGroup};

/// Largest valid navigation index
pub const MAX_NAV_INDEX: u16 = 32767;

/// Permitted key groups of a focused element
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UsedKeyList {
    /// Empty list: basic and data-button keys only
    #[default]
    Default,
    /// `none`: no key is delivered
    None,
    Groups(Vec<KeyGroup>),
}

impl UsedKeyList {
    pub fn parse(value: &str) -> Self {
        match value.split_whitespace().next() {
            None => Self::Default,
            Some("none") => Self::None,
            Some(_) => Self::Groups(value.split_whitespace().filter_map(KeyGroup::parse).collect()),
        }
    }

    /// Whether `key` passes this filter
    pub fn permits(&self, key: AribKey) -> bool {
        let Some(group) = key.group() else {
            return false;
        };
        match self {
            Self::None => false,
            Self::Default => matches!(group, KeyGroup::Basic | KeyGroup::DataButton),
            Self::Groups(groups) => groups.contains(&group),
        }
    }
}

/// Visibility of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Directional navigation links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavLinks {
    pub up: Option<u16>,
    pub down: Option<u16>,
    pub left: Option<u16>,
    pub right: Option<u16>,
}

impl NavLinks {
    pub fn get(&self, direction: Direction) -> Option<u16> {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }
}

/// Navigation-relevant computed style of an element
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NavStyle {
    pub nav_index: Option<u16>,
    pub links: NavLinks,
    pub used_keys: UsedKeyList,
    pub visibility: Visibility,
}

impl NavStyle {
    /// Parse a `style` attribute, ignoring unrelated declarations
    pub fn parse_inline(declarations: &str) -> Self {
        let mut style = Self::default();
        for decl in declarations.split(';') {
            if let Some((property, value)) = decl.split_once(':') {
                style.apply(property.trim(), value.trim());
            }
        }
        style
    }

    /// Apply one declaration
    pub fn apply(&mut self, property: &str, value: &str) {
        match property {
            "nav-index" => self.nav_index = parse_nav_index(value),
            "nav-up" => self.links.up = parse_nav_index(value),
            "nav-down" => self.links.down = parse_nav_index(value),
            "nav-left" => self.links.left = parse_nav_index(value),
            "nav-right" => self.links.right = parse_nav_index(value),
            "used-key-list" => self.used_keys = UsedKeyList::parse(value),
            "visibility" => {
                self.visibility = if value == "hidden" {
                    Visibility::Hidden
                } else {
                    Visibility::Visible
                }
            }
            _ => {}
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.visibility == Visibility::Hidden
    }
}

fn parse_nav_index(value: &str) -> Option<u16> {
    value
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|index| *index <= MAX_NAV_INDEX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_key_list() {
        assert_eq!(UsedKeyList::parse(""), UsedKeyList::Default);
        assert_eq!(UsedKeyList::parse("none"), UsedKeyList::None);
        assert_eq!(
            UsedKeyList::parse("basic numeric-tuning"),
            UsedKeyList::Groups(vec![KeyGroup::Basic, KeyGroup::NumericTuning])
        );
    }

    #[test]
    fn test_permits() {
        let default = UsedKeyList::Default;
        assert!(default.permits(AribKey::Up));
        assert!(default.permits(AribKey::RedButton));
        assert!(!default.permits(AribKey::Digit1));

        let numeric = UsedKeyList::parse("numeric-tuning");
        assert!(numeric.permits(AribKey::Digit1));
        assert!(!numeric.permits(AribKey::Up));

        assert!(!UsedKeyList::None.permits(AribKey::Enter));
    }

    #[test]
    fn test_parse_inline() {
        let style = NavStyle::parse_inline(
            "left: 10px; nav-index: 2; nav-down:3; nav-up: 40000; visibility: hidden; used-key-list: basic",
        );
        assert_eq!(style.nav_index, Some(2));
        assert_eq!(style.links.down, Some(3));
        assert_eq!(style.links.up, None);
        assert!(style.is_hidden());
        assert_eq!(style.used_keys, UsedKeyList::Groups(vec![KeyGroup::Basic]));
    }
}
