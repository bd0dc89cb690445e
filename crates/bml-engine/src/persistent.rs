//! Persistent Arrays
//!
//! Structured arrays written by documents and kept across document
//! transitions. Each array is described by a structure string such as
//! `S:16B,U:2B,Z:4B,B:1B`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Structure string error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Invalid field descriptor: {0}")]
    InvalidField(String),

    #[error("Expected {expected} values, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Value {index} does not fit field {field}")]
    Mismatch { index: usize, field: String },
}

/// Storage backend error
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store: {0}")]
    Format(String),
}

/// Field type of one array slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `S:nB` fixed-size or `S:nV` variable string; `max == 0` is unbounded
    Str { max: usize, variable: bool },
    /// `U:nB`
    Unsigned(u8),
    /// `Z:nB`
    Signed(u8),
    /// `B:1B`
    Bool,
}

impl FieldType {
    fn parse(descriptor: &str) -> Result<Self, SchemaError> {
        let invalid = || SchemaError::InvalidField(descriptor.to_string());
        let (kind, size) = descriptor.trim().split_once(':').ok_or_else(invalid)?;
        let (digits, variable) = match size.strip_suffix('B') {
            Some(digits) => (digits, false),
            None => (size.strip_suffix('V').ok_or_else(invalid)?, true),
        };
        let n: usize = digits.parse().map_err(|_| invalid())?;

        match (kind, variable) {
            ("S", _) if variable || n > 0 => Ok(Self::Str { max: n, variable }),
            ("U", false) if (1..=4).contains(&n) => Ok(Self::Unsigned(n as u8)),
            ("Z", false) if (1..=4).contains(&n) => Ok(Self::Signed(n as u8)),
            ("B", false) if n == 1 => Ok(Self::Bool),
            _ => Err(invalid()),
        }
    }

    fn accepts(&self, value: &PersistentValue) -> Option<PersistentValue> {
        match (self, value) {
            (Self::Str { max, .. }, PersistentValue::Text(s)) => {
                (*max == 0 || s.len() <= *max).then(|| value.clone())
            }
            (Self::Unsigned(bytes), PersistentValue::Number(n)) => {
                let limit = 2f64.powi(8 * *bytes as i32);
                (n.fract() == 0.0 && *n >= 0.0 && *n < limit).then(|| value.clone())
            }
            (Self::Signed(bytes), PersistentValue::Number(n)) => {
                let limit = 2f64.powi(8 * *bytes as i32 - 1);
                (n.fract() == 0.0 && *n >= -limit && *n < limit).then(|| value.clone())
            }
            (Self::Bool, PersistentValue::Bool(_)) => Some(value.clone()),
            (Self::Bool, PersistentValue::Number(n)) if *n == 0.0 || *n == 1.0 => {
                Some(PersistentValue::Bool(*n == 1.0))
            }
            _ => None,
        }
    }
}

/// Parsed structure string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArraySchema {
    source: String,
    fields: Vec<FieldType>,
}

impl ArraySchema {
    pub fn parse(structure: &str) -> Result<Self, SchemaError> {
        let fields = structure
            .split(',')
            .map(FieldType::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: structure.split(',').map(str::trim).collect::<Vec<_>>().join(","),
            fields,
        })
    }

    pub fn fields(&self) -> &[FieldType] {
        &self.fields
    }

    /// Normalized structure string
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check values against the fields, normalizing numeric booleans
    pub fn check(&self, values: &[PersistentValue]) -> Result<Vec<PersistentValue>, SchemaError> {
        if values.len() != self.fields.len() {
            return Err(SchemaError::Length {
                expected: self.fields.len(),
                actual: values.len(),
            });
        }
        self.fields
            .iter()
            .zip(values)
            .enumerate()
            .map(|(index, (field, value))| {
                field.accepts(value).ok_or_else(|| SchemaError::Mismatch {
                    index,
                    field: format!("{:?}", field),
                })
            })
            .collect()
    }
}

/// One slot of a persistent array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PersistentValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// A stored array with its structure and expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArray {
    pub structure: String,
    pub values: Vec<PersistentValue>,
    /// Unix seconds after which the array reads as absent
    #[serde(default)]
    pub expires_at: Option<u64>,
}

impl StoredArray {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }
}

/// Backend for persistent arrays
pub trait PersistentStore {
    fn load(&self, name: &str) -> Result<Option<StoredArray>, StorageError>;

    fn save(&mut self, name: &str, array: StoredArray) -> Result<(), StorageError>;

    fn remove(&mut self, name: &str) -> Result<(), StorageError>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    arrays: HashMap<String, StoredArray>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentStore for MemoryStore {
    fn load(&self, name: &str) -> Result<Option<StoredArray>, StorageError> {
        Ok(self.arrays.get(name).cloned())
    }

    fn save(&mut self, name: &str, array: StoredArray) -> Result<(), StorageError> {
        self.arrays.insert(name.to_string(), array);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        self.arrays.remove(name);
        Ok(())
    }
}

/// Current time in Unix seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
