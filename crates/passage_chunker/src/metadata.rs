// src/metadata.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Caller-supplied metadata attached to every passage of a call.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A primitive metadata value.
///
/// Vector indexes only accept scalar metadata, so this is a closed set
/// rather than arbitrary JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetaValue::Null)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<u32> for MetaValue {
    fn from(value: u32) -> Self {
        MetaValue::Int(i64::from(value))
    }
}

impl From<usize> for MetaValue {
    fn from(value: usize) -> Self {
        MetaValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl<T: Into<MetaValue>> From<Option<T>> for MetaValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(MetaValue::Null, Into::into)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    pub chunk_index: usize,
    /// Title of the nearest enclosing section, if any
    pub section_title: Option<String>,
    /// Level of the owning section (0 = untitled leading text)
    pub section_level: Option<usize>,
    /// 1-based page the passage was attributed to
    pub page: Option<u32>,
    /// Caller-supplied fields (document_id, filename, folder, ...)
    #[serde(flatten)]
    pub extra: Metadata,
}

/// A bounded span of document text prepared for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub index: usize,
    pub text: String,
    pub metadata: PassageMetadata,
}

impl Passage {
    pub(crate) fn new(index: usize, text: String, extra: &Metadata) -> Self {
        Self {
            index,
            text,
            metadata: PassageMetadata {
                chunk_index: index,
                extra: extra.clone(),
                ..Default::default()
            },
        }
    }

    /// Length in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
        self.metadata.chunk_index = index;
    }

    /// Flattened scalar metadata for storage.
    ///
    /// Null values are dropped; typed fields override caller fields of the
    /// same name.
    pub fn storable_metadata(&self) -> BTreeMap<String, MetaValue> {
        let mut out: BTreeMap<String, MetaValue> = self
            .metadata
            .extra
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        out.insert("chunk_index".to_string(), self.metadata.chunk_index.into());
        if let Some(title) = &self.metadata.section_title {
            out.insert("section_title".to_string(), title.clone().into());
        }
        if let Some(level) = self.metadata.section_level {
            out.insert("section_level".to_string(), level.into());
        }
        if let Some(page) = self.metadata.page {
            out.insert("page".to_string(), page.into());
        }
        out
    }
}
