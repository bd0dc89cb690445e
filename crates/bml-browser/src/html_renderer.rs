//! Markup Renderer
//!
//! Parses BML markup with html5ever and flattens the RcDom into the
//! engine's document-order element arena.

use bml_engine::bml_resource::ResourcePath;
use bml_engine::{DocumentTree, Element, RenderError, Renderer};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Renderer that keeps no visual state; `present` only counts frames
#[derive(Debug, Default)]
pub struct HtmlRenderer {
    frames: usize,
}

impl HtmlRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames presented so far
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Parse markup into a document tree
    pub fn parse(&self, markup: &str, path: &ResourcePath) -> Result<DocumentTree, RenderError> {
        tracing::debug!("Parsing BML document: {}", path);

        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut markup.as_bytes())
            .map_err(|e| RenderError::Parse {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        let mut tree = DocumentTree::new();
        convert_node(&dom.document, &mut tree);

        tracing::debug!("Parsed {} elements", tree.len());
        Ok(tree)
    }
}

impl Renderer for HtmlRenderer {
    fn transpile(&mut self, source: &[u8], path: &ResourcePath) -> Result<DocumentTree, RenderError> {
        let markup = std::str::from_utf8(source).map_err(|e| RenderError::Encoding(e.to_string()))?;
        self.parse(markup, path)
    }

    fn present(&mut self) {
        self.frames += 1;
        tracing::trace!("Frame {} presented", self.frames);
    }
}

/// Append `handle` and its descendants in document order
fn convert_node(handle: &Handle, tree: &mut DocumentTree) {
    match &handle.data {
        NodeData::Element { name, attrs, .. } => {
            let mut element = Element::new(&name.local);
            for attr in attrs.borrow().iter() {
                element.set_attribute(&attr.name.local, &attr.value);
            }
            let text = direct_text(handle);
            let text = if element.tag == "script" { strip_cdata(&text) } else { text.trim() };
            element.text = text.to_string();
            tree.push(element);

            for child in handle.children.borrow().iter() {
                convert_node(child, tree);
            }
        }
        NodeData::Document => {
            for child in handle.children.borrow().iter() {
                convert_node(child, tree);
            }
        }
        _ => {}
    }
}

/// Concatenated text of the immediate text children
fn direct_text(handle: &Handle) -> String {
    let mut text = String::new();
    for child in handle.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            text.push_str(&contents.borrow());
        }
    }
    text
}

/// Script bodies are commonly wrapped in a CDATA section
fn strip_cdata(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
        .unwrap_or(trimmed)
}
