//! BML Navigation
//!
//! Host key translation, the navigation properties of focusable elements
//! and the router that turns key presses into focus moves and queued
//! handlers.

mod keys;
mod router;
mod style;

pub use keys::{translate_key, AribKey, Direction, KeyGroup, KeyModifiers};
pub use router::{
    focus_initial, key_down, key_up, resolve_direction, FocusGraph, FocusState, KeyDispatch,
    KeyIgnored,
};
pub use style::{NavLinks, NavStyle, UsedKeyList, Visibility, MAX_NAV_INDEX};
