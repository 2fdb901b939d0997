//! Wire-facing data types.
//!
//! Everything here is plain data: no live node, closure, or other
//! non-serializable value crosses this boundary. That contract is what
//! the serializer exists to enforce.

use serde::ser::SerializeMap;
use serde::Serialize;

use host::node::NodeKind;

/// Why a value was elided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    Depth,
    Budget,
}

impl Truncation {
    pub fn as_str(self) -> &'static str {
        match self {
            Truncation::Depth => "depth",
            Truncation::Budget => "budget",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Map,
    Set,
}

impl CollectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Map => "map",
            CollectionKind::Set => "set",
        }
    }
}

/// Bounded serialized value tree.
///
/// Containers hold at most their budgeted entry counts; elided content
/// is represented in-band by the token variants, never silently
/// dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Seq(Vec<Document>),
    Record(Vec<(String, Document)>),
    /// Map/set wrapper; map entries are two-element `Seq` pairs.
    Entries {
        kind: CollectionKind,
        size: usize,
        entries: Vec<Document>,
    },
    /// Function token: name only, never the body.
    Function { name: String },
    /// Back-pointer to an earlier container in the same pass.
    Circular { ref_id: u32 },
    /// Placeholder for a value whose expansion was skipped.
    Dehydrated {
        type_name: String,
        size: Option<usize>,
        preview: String,
        reason: Truncation,
    },
    /// Trailing note for truncated containers.
    Overflow { omitted: usize },
}

impl Serialize for Document {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Document::Null => serializer.serialize_unit(),
            Document::Bool(b) => serializer.serialize_bool(*b),
            Document::Num(n) => serializer.serialize_f64(*n),
            Document::Str(s) => serializer.serialize_str(s),
            Document::Seq(items) => serializer.collect_seq(items),
            Document::Record(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Document::Entries {
                kind,
                size,
                entries,
            } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("@collection", kind.as_str())?;
                map.serialize_entry("size", size)?;
                map.serialize_entry("entries", entries)?;
                map.end()
            }
            Document::Function { name } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("@function", name)?;
                map.end()
            }
            Document::Circular { ref_id } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("@circular", ref_id)?;
                map.end()
            }
            Document::Dehydrated {
                type_name,
                size,
                preview,
                reason,
            } => {
                let mut map = serializer.serialize_map(Some(5))?;
                map.serialize_entry("@dehydrated", &true)?;
                map.serialize_entry("type", type_name)?;
                map.serialize_entry("size", size)?;
                map.serialize_entry("preview", preview)?;
                map.serialize_entry("reason", reason.as_str())?;
                map.end()
            }
            Document::Overflow { omitted } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("@overflow", omitted)?;
                map.end()
            }
        }
    }
}

/// Inspector-visible kind of a composite node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KindTag {
    Function,
    Class,
    ForwardRef,
    Memo,
    SimpleMemo,
}

impl KindTag {
    pub fn of(kind: NodeKind) -> Option<Self> {
        match kind {
            NodeKind::FunctionComponent => Some(KindTag::Function),
            NodeKind::ClassComponent => Some(KindTag::Class),
            NodeKind::ForwardRef => Some(KindTag::ForwardRef),
            NodeKind::MemoComponent => Some(KindTag::Memo),
            NodeKind::SimpleMemoComponent => Some(KindTag::SimpleMemo),
            _ => None,
        }
    }
}

/// One serialized local-state cell, with hook provenance when the
/// replay recovered it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateEntry {
    /// Primitive display name (`State`, `Effect`, ...).
    pub name: String,
    /// Deepest custom hook that produced this cell, if any.
    pub group: Option<String>,
    /// Outermost-to-innermost custom hook chain.
    pub path: Vec<String>,
    pub value: Option<Document>,
}

/// One enumerated component. Fresh per enumeration call, never mutated
/// after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentSummary {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub kind: KindTag,
    pub depth: usize,
    pub props: Option<Document>,
    pub state: Option<Vec<StateEntry>>,
    pub state_count: usize,
    pub state_serialized: bool,
    pub selector: Option<String>,
    pub dom_path: Option<String>,
    pub tag: Option<String>,
    pub contains_target: bool,
    pub target_distance: Option<u32>,
}

/// Summary of the resolved request target element.
#[derive(Debug, Clone, Serialize)]
pub struct ElementSummary {
    pub selector: String,
    pub path: String,
    pub tag: String,
}

/// Result of [`crate::api::enumerate_components`].
#[derive(Debug, Clone, Serialize)]
pub struct ComponentList {
    pub components: Vec<ComponentSummary>,
    /// Index of the component whose surrogate best contains the target.
    pub selected_index: Option<usize>,
    pub source_element: Option<ElementSummary>,
}

/// Where to look for a target element.
#[derive(Debug, Clone, Default)]
pub struct Locator {
    pub selector: Option<String>,
    pub point: Option<(f64, f64)>,
}

impl Locator {
    pub fn is_empty(&self) -> bool {
        self.selector.is_none() && self.point.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Props,
    State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Serialize,
    DescribeFunction,
}

/// One drill-down path segment. Keyed collections are addressable only
/// by entry index, hence the dedicated variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSeg {
    Key(String),
    Index(usize),
    MapEntry(usize),
    MapKey(usize),
    MapValue(usize),
    SetEntry(usize),
}

impl PathSeg {
    /// Parse one raw request segment. `@@entry:n` / `@@key:n` /
    /// `@@value:n` address the n-th map entry/key/value, `@@set:n` the
    /// n-th set entry, a bare decimal is a sequence index, anything
    /// else is a record key. Malformed special tokens degrade to plain
    /// keys rather than failing the request.
    pub fn parse(raw: &str) -> PathSeg {
        if let Some(rest) = raw.strip_prefix("@@") {
            if let Some((tag, index)) = rest.split_once(':') {
                if let Ok(index) = index.parse::<usize>() {
                    match tag {
                        "entry" => return PathSeg::MapEntry(index),
                        "key" => return PathSeg::MapKey(index),
                        "value" => return PathSeg::MapValue(index),
                        "set" => return PathSeg::SetEntry(index),
                        _ => {}
                    }
                }
            }
            return PathSeg::Key(raw.to_string());
        }
        match raw.parse::<usize>() {
            Ok(index) => PathSeg::Index(index),
            Err(_) => PathSeg::Key(raw.to_string()),
        }
    }
}

/// Result of [`crate::api::resolve_value_at_path`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PathValue {
    Serialized { value: Document },
    Function { name: String, function_ref: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_seg_parsing() {
        assert_eq!(PathSeg::parse("user"), PathSeg::Key("user".to_string()));
        assert_eq!(PathSeg::parse("3"), PathSeg::Index(3));
        assert_eq!(PathSeg::parse("@@entry:0"), PathSeg::MapEntry(0));
        assert_eq!(PathSeg::parse("@@key:2"), PathSeg::MapKey(2));
        assert_eq!(PathSeg::parse("@@value:2"), PathSeg::MapValue(2));
        assert_eq!(PathSeg::parse("@@set:1"), PathSeg::SetEntry(1));
        // malformed specials degrade to keys
        assert_eq!(
            PathSeg::parse("@@entry:x"),
            PathSeg::Key("@@entry:x".to_string())
        );
        assert_eq!(PathSeg::parse("@@bogus:1"), PathSeg::Key("@@bogus:1".to_string()));
    }

    #[test]
    fn test_document_wire_shape() {
        let doc = Document::Record(vec![
            ("count".to_string(), Document::Num(3.0)),
            (
                "items".to_string(),
                Document::Seq(vec![Document::Str("a".to_string()), Document::Overflow { omitted: 5 }]),
            ),
            ("handler".to_string(), Document::Function { name: "on_click".to_string() }),
        ]);
        let json = serde_json::to_string(&doc).expect("serializes");
        assert!(json.contains("\"count\":3.0"));
        assert!(json.contains("\"@overflow\":5"));
        assert!(json.contains("\"@function\":\"on_click\""));
    }

    #[test]
    fn test_kind_tag_covers_inspectable_kinds() {
        assert_eq!(KindTag::of(NodeKind::FunctionComponent), Some(KindTag::Function));
        assert_eq!(KindTag::of(NodeKind::ClassComponent), Some(KindTag::Class));
        assert_eq!(KindTag::of(NodeKind::HostElement), None);
    }
}
