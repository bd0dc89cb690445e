//! Resource References
//!
//! Parsing and normalization of `/component/module[/filename]` references.

use std::fmt;
use url::Url;

/// Scheme used for carousel references carrying an explicit service triplet
pub const DATA_CAROUSEL_SCHEME: &str = "arib-dc";

/// Base used to resolve references that name no service
const CURRENT_SERVICE_BASE: &str = "arib-dc://-1.-1.-1";

/// Component tag of a data stream in the program map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u8);

/// Module id within a component's carousel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u16);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl ComponentId {
    /// Parse a hexadecimal component segment
    pub fn parse(segment: &str) -> Option<Self> {
        parse_hex(segment).and_then(|v| u8::try_from(v).ok()).map(Self)
    }
}

impl ModuleId {
    /// Parse a hexadecimal module segment
    pub fn parse(segment: &str) -> Option<Self> {
        parse_hex(segment).and_then(|v| u16::try_from(v).ok()).map(Self)
    }
}

fn parse_hex(segment: &str) -> Option<u32> {
    if segment.is_empty() || segment.len() > 8 {
        return None;
    }
    u32::from_str_radix(segment, 16).ok()
}

/// Registry key of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    pub component: ComponentId,
    pub module: ModuleId,
}

impl ModuleKey {
    pub fn new(component: u8, module: u16) -> Self {
        Self {
            component: ComponentId(component),
            module: ModuleId(module),
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.component, self.module)
    }
}

/// Reference parse error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("Malformed reference: {0}")]
    Malformed(String),

    #[error("Invalid component id in {0}")]
    InvalidComponent(String),

    #[error("Invalid module id in {0}")]
    InvalidModule(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
}

/// Resolve a reference to its non-empty path segments
fn resolve_segments(reference: &str, base: Option<&ResourcePath>) -> Result<Vec<String>, ReferenceError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(ReferenceError::Malformed(reference.to_string()));
    }

    let url = if reference.contains("://") {
        let url = Url::parse(reference).map_err(|_| ReferenceError::Malformed(reference.to_string()))?;
        if url.scheme() != DATA_CAROUSEL_SCHEME {
            return Err(ReferenceError::UnsupportedScheme(url.scheme().to_string()));
        }
        url
    } else {
        let base_path = base.map(|b| b.to_string()).unwrap_or_else(|| "/".to_string());
        let base_url = Url::parse(&format!("{CURRENT_SERVICE_BASE}{base_path}"))
            .map_err(|_| ReferenceError::Malformed(base_path.clone()))?;
        base_url
            .join(reference)
            .map_err(|_| ReferenceError::Malformed(reference.to_string()))?
    };

    Ok(url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).map(str::to_string).collect())
        .unwrap_or_default())
}

/// Parse a component reference such as `/0d`, ignoring any module part
pub fn parse_component_ref(reference: &str, base: Option<&ResourcePath>) -> Result<ComponentId, ReferenceError> {
    let segments = resolve_segments(reference, base)?;
    let first = segments
        .first()
        .ok_or_else(|| ReferenceError::Malformed(reference.to_string()))?;
    ComponentId::parse(first).ok_or_else(|| ReferenceError::InvalidComponent(reference.to_string()))
}

/// A normalized resource path: module key plus optional filename
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    pub key: ModuleKey,
    pub filename: Option<String>,
}

impl ResourcePath {
    pub fn new(key: ModuleKey, filename: Option<&str>) -> Self {
        Self {
            key,
            filename: filename.map(str::to_string),
        }
    }

    /// Parse a reference, resolving relative forms against `base`.
    ///
    /// Accepted forms:
    /// - `/cc/mmmm` and `/cc/mmmm/file`
    /// - `arib-dc://<service>/cc/mmmm/file`
    /// - relative references such as `file.bml` or `../0001/file.bml`
    pub fn parse(reference: &str, base: Option<&ResourcePath>) -> Result<Self, ReferenceError> {
        let segments = resolve_segments(reference, base)?;

        let (component, module, filename) = match segments.as_slice() {
            [c, m] => (c.as_str(), m.as_str(), None),
            [c, m, f] => (c.as_str(), m.as_str(), Some(f.as_str())),
            _ => return Err(ReferenceError::Malformed(reference.to_string())),
        };

        let component = ComponentId::parse(component)
            .ok_or_else(|| ReferenceError::InvalidComponent(reference.to_string()))?;
        let module = ModuleId::parse(module)
            .ok_or_else(|| ReferenceError::InvalidModule(reference.to_string()))?;

        Ok(Self::new(ModuleKey { component, module }, filename))
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filename {
            Some(name) => write!(f, "{}/{}", self.key, name),
            None => write!(f, "{}", self.key),
        }
    }
}
