//! Document Tree
//!
//! The rendered form of a BML document as the runtime sees it: elements in
//! document order with attributes, text and resolved navigation style.

use bml_events::{BeventType, ElementId, IntrinsicEventType};
use bml_nav::{FocusGraph, NavStyle};
use std::collections::BTreeMap;

/// A rendered element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    /// Concatenated text content of direct text children
    pub text: String,
    pub style: NavStyle,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// Set an attribute. A `style` attribute is also resolved into the
    /// element's navigation style.
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if name == "style" {
            self.style = NavStyle::parse_inline(value);
        }
        self.attributes.insert(name, value.to_string());
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Handler attribute, ignoring empty values
    pub fn handler(&self, name: &str) -> Option<&str> {
        self.attribute(name).filter(|source| !source.trim().is_empty())
    }
}

/// A `<script>` block in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptBlock {
    Inline(String),
    External(String),
}

/// A subscribed `<beitem>`
#[derive(Debug, Clone, Copy)]
pub struct Beitem<'a> {
    pub id: ElementId,
    pub element: &'a Element,
    pub onoccur: &'a str,
}

impl Beitem<'_> {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.element.attribute(name)
    }
}

/// Element arena in document order
#[derive(Debug, Clone, Default)]
pub struct DocumentTree {
    elements: Vec<Element>,
}

impl DocumentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element
    pub fn push(&mut self, element: Element) -> ElementId {
        let id = ElementId(self.elements.len() as u32);
        self.elements.push(element);
        id
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| (ElementId(i as u32), e))
    }

    /// First element with the given tag
    pub fn find_tag(&self, tag: &str) -> Option<(ElementId, &Element)> {
        self.iter().find(|(_, e)| e.tag == tag)
    }

    /// `onload` / `onunload` of the body
    pub fn body_handler(&self, name: &str) -> Option<&str> {
        self.find_tag("body").and_then(|(_, body)| body.handler(name))
    }

    pub fn scripts(&self) -> Vec<ScriptBlock> {
        self.elements
            .iter()
            .filter(|e| e.tag == "script")
            .map(|e| match e.attribute("src") {
                Some(src) => ScriptBlock::External(src.to_string()),
                None => ScriptBlock::Inline(e.text.clone()),
            })
            .collect()
    }

    /// Subscribed beitems of a type that carry an `onoccur` handler
    pub fn beitems(&self, event_type: BeventType) -> impl Iterator<Item = Beitem<'_>> {
        self.iter().filter_map(move |(id, element)| {
            if element.tag != "beitem"
                || element.attribute("type").and_then(BeventType::parse) != Some(event_type)
                || element.attribute("subscribe") != Some("subscribe")
            {
                return None;
            }
            let onoccur = element.handler("onoccur")?;
            Some(Beitem { id, element, onoccur })
        })
    }
}

impl FocusGraph for DocumentTree {
    fn nav_style(&self, id: ElementId) -> Option<&NavStyle> {
        self.get(id).map(|e| &e.style)
    }

    fn find_nav_index(&self, index: u16) -> Option<ElementId> {
        self.iter()
            .find(|(_, e)| e.style.nav_index == Some(index))
            .map(|(id, _)| id)
    }

    fn handler(&self, id: ElementId, event: IntrinsicEventType) -> Option<&str> {
        self.get(id)?.handler(event.handler_attribute())
    }
}
