//! DICOM JSON types used across the proxy
//!
//! Attribute documents follow the DICOM JSON model (PS3.18 Annex F): a
//! JSON object keyed by 8-digit hexadecimal tags, where every entry is an
//! attribute node of the form `{"vr": "UI", "Value": [...]}`. Documents are
//! kept as `serde_json` maps so that nodes this proxy does not understand
//! survive a round trip untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Key of the value representation field in an attribute node
pub const VR: &str = "vr";

/// Key of the value sequence in an attribute node
pub const VALUE: &str = "Value";

/// Key of a bulk data locator in an attribute node
pub const BULK_DATA_URI: &str = "BulkDataURI";

/// Protocol attribute tag, `(gggg,eeee)`
///
/// Rendered and parsed as 8 upper-case hexadecimal digits, which is the key
/// format used by DICOM JSON documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributeTag(u32);

impl AttributeTag {
    /// Create a tag from its group and element numbers
    pub const fn new(group: u16, element: u16) -> Self {
        Self(((group as u32) << 16) | element as u32)
    }

    /// Group number
    pub fn group(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Element number
    pub fn element(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// The document key for this tag
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AttributeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

impl FromStr for AttributeTag {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.len() != 8 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid_tag(s));
        }
        u32::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| Error::invalid_tag(s))
    }
}

impl TryFrom<String> for AttributeTag {
    type Error = Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AttributeTag> for String {
    fn from(tag: AttributeTag) -> Self {
        tag.to_string()
    }
}

/// Well-known attribute tags
pub mod tags {
    use super::AttributeTag;

    /// SOP Class UID
    pub const SOP_CLASS_UID: AttributeTag = AttributeTag::new(0x0008, 0x0016);
    /// SOP Instance UID
    pub const SOP_INSTANCE_UID: AttributeTag = AttributeTag::new(0x0008, 0x0018);
    /// Modality
    pub const MODALITY: AttributeTag = AttributeTag::new(0x0008, 0x0060);
    /// Study Instance UID
    pub const STUDY_INSTANCE_UID: AttributeTag = AttributeTag::new(0x0020, 0x000D);
    /// Series Instance UID
    pub const SERIES_INSTANCE_UID: AttributeTag = AttributeTag::new(0x0020, 0x000E);
    /// Series Number
    pub const SERIES_NUMBER: AttributeTag = AttributeTag::new(0x0020, 0x0011);
    /// Instance Number
    pub const INSTANCE_NUMBER: AttributeTag = AttributeTag::new(0x0020, 0x0013);
    /// Number of Frames
    pub const NUMBER_OF_FRAMES: AttributeTag = AttributeTag::new(0x0028, 0x0008);
    /// Pixel Data
    pub const PIXEL_DATA: AttributeTag = AttributeTag::new(0x7FE0, 0x0010);
}

/// Metadata of one series or one instance
///
/// A mapping from tag key to attribute node. Key uniqueness is enforced by
/// the map; key order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeDocument(Map<String, Value>);

impl AttributeDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap an existing JSON object
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Number of attributes in the document
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document has no attributes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the document carries an attribute under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Whether the document carries `tag`
    pub fn contains(&self, tag: AttributeTag) -> bool {
        self.0.contains_key(&tag.key())
    }

    /// The attribute node for `tag`
    pub fn get(&self, tag: AttributeTag) -> Option<&Value> {
        self.0.get(&tag.key())
    }

    /// Insert a raw attribute node, returning the node it replaced
    pub fn insert(&mut self, tag: AttributeTag, node: Value) -> Option<Value> {
        self.0.insert(tag.key(), node)
    }

    /// Insert a `{vr, Value}` node built from the given values
    pub fn insert_values(&mut self, tag: AttributeTag, vr: &str, values: Vec<Value>) {
        let mut node = Map::new();
        node.insert(VR.to_string(), Value::String(vr.to_string()));
        node.insert(VALUE.to_string(), Value::Array(values));
        self.0.insert(tag.key(), Value::Object(node));
    }

    /// Builder form of [`insert_values`](Self::insert_values) for a single value
    pub fn with_value(mut self, tag: AttributeTag, vr: &str, value: impl Into<Value>) -> Self {
        self.insert_values(tag, vr, vec![value.into()]);
        self
    }

    /// Iterate over `(key, node)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrow the underlying JSON object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutably borrow the underlying JSON object
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Unwrap into the underlying JSON object
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// First value of `tag` rendered as a string
    pub fn string(&self, tag: AttributeTag) -> Option<String> {
        first_value(self, tag).and_then(String::from_attribute)
    }

    /// Series Instance UID, if present
    pub fn series_instance_uid(&self) -> Option<String> {
        self.string(tags::SERIES_INSTANCE_UID)
    }

    /// SOP Instance UID, if present
    pub fn sop_instance_uid(&self) -> Option<String> {
        self.string(tags::SOP_INSTANCE_UID)
    }

    /// Number of Frames, if present and numeric
    pub fn number_of_frames(&self) -> Option<u32> {
        first_value(self, tags::NUMBER_OF_FRAMES).and_then(u32::from_attribute)
    }

    /// Whether the instance carries more than one frame
    pub fn is_multiframe(&self) -> bool {
        self.number_of_frames().map(|n| n > 1).unwrap_or(false)
    }
}

impl TryFrom<Value> for AttributeDocument {
    type Error = Error;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::invalid_document(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }
}

impl From<AttributeDocument> for Value {
    fn from(doc: AttributeDocument) -> Self {
        Value::Object(doc.0)
    }
}

/// Short name of a JSON value's kind, for diagnostics
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Conversion from a single element of an attribute's value sequence
pub trait AttributeValue: Sized {
    /// Convert, returning `None` when the element has an incompatible shape
    fn from_attribute(value: &Value) -> Option<Self>;
}

impl AttributeValue for String {
    fn from_attribute(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl AttributeValue for i64 {
    fn from_attribute(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            }),
            // IS and DS values may arrive as strings
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl AttributeValue for u32 {
    fn from_attribute(value: &Value) -> Option<Self> {
        i64::from_attribute(value).and_then(|n| u32::try_from(n).ok())
    }
}

/// First element of `tag`'s value sequence
///
/// Returns `None` when the tag is absent, has no `Value` field, or its value
/// sequence is empty. Absence is an ordinary outcome.
pub fn first_value(doc: &AttributeDocument, tag: AttributeTag) -> Option<&Value> {
    doc.get(tag)?.get(VALUE)?.as_array()?.first()
}

/// First element of `tag`'s value sequence converted to `T`, or `default`
pub fn extract_value<T: AttributeValue>(doc: &AttributeDocument, tag: AttributeTag, default: T) -> T {
    first_value(doc, tag)
        .and_then(T::from_attribute)
        .unwrap_or(default)
}
