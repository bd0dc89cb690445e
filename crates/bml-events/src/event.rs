//! Event Payloads
//!
//! Intrinsic events (key, click, focus) and broadcast events (beitem).

use std::fmt;

/// Element identity within the active document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Intrinsic event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrinsicEventType {
    KeyDown,
    KeyUp,
    Click,
    Focus,
    Blur,
}

impl IntrinsicEventType {
    /// Event type name as seen by scripts
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeyDown => "keydown",
            Self::KeyUp => "keyup",
            Self::Click => "click",
            Self::Focus => "focus",
            Self::Blur => "blur",
        }
    }

    /// Handler attribute on the target element
    pub fn handler_attribute(self) -> &'static str {
        match self {
            Self::KeyDown => "onkeydown",
            Self::KeyUp => "onkeyup",
            Self::Click => "onclick",
            Self::Focus => "onfocus",
            Self::Blur => "onblur",
        }
    }
}

/// Intrinsic event payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrinsicEvent {
    pub event_type: IntrinsicEventType,
    /// Logical key code for key events, 0 otherwise
    pub key_code: u16,
    pub target: ElementId,
}

impl IntrinsicEvent {
    pub fn new(event_type: IntrinsicEventType, target: ElementId) -> Self {
        Self { event_type, key_code: 0, target }
    }

    pub fn key(event_type: IntrinsicEventType, key_code: u16, target: ElementId) -> Self {
        Self { event_type, key_code, target }
    }
}

/// Broadcast event types delivered through `beitem` elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeventType {
    ModuleUpdated,
    ModuleLocked,
    EventMessageFired,
    DataButtonPressed,
}

impl BeventType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ModuleUpdated" => Some(Self::ModuleUpdated),
            "ModuleLocked" => Some(Self::ModuleLocked),
            "EventMessageFired" => Some(Self::EventMessageFired),
            "DataButtonPressed" => Some(Self::DataButtonPressed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModuleUpdated => "ModuleUpdated",
            Self::ModuleLocked => "ModuleLocked",
            Self::EventMessageFired => "EventMessageFired",
            Self::DataButtonPressed => "DataButtonPressed",
        }
    }
}

/// Broadcast event payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeventEvent {
    pub event_type: BeventType,
    pub target: ElementId,
    pub status: i32,
    /// ModuleLocked: the lock was an extended one
    pub extended: bool,
    pub module_ref: String,
    pub es_ref: String,
    pub message_id: u16,
    pub message_version: u16,
    pub message_group_id: u16,
    pub private_data: String,
}

impl BeventEvent {
    pub fn new(event_type: BeventType, target: ElementId) -> Self {
        Self {
            event_type,
            target,
            status: 0,
            extended: false,
            module_ref: String::new(),
            es_ref: String::new(),
            message_id: 0,
            message_version: 0,
            message_group_id: 0,
            private_data: String::new(),
        }
    }

    pub fn with_status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    pub fn with_extended(mut self, extended: bool) -> Self {
        self.extended = extended;
        self
    }

    pub fn with_module_ref(mut self, module_ref: &str) -> Self {
        self.module_ref = module_ref.to_string();
        self
    }
}

/// Event visible to the running handler (`document.currentEvent`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentEvent {
    Intrinsic(IntrinsicEvent),
    Bevent(BeventEvent),
}

impl CurrentEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Intrinsic(e) => e.event_type.as_str(),
            Self::Bevent(e) => e.event_type.as_str(),
        }
    }

    pub fn target(&self) -> ElementId {
        match self {
            Self::Intrinsic(e) => e.target,
            Self::Bevent(e) => e.target,
        }
    }
}
