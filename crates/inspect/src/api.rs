//! Synchronous inspection entry points.
//!
//! Pure functions of (current live tree state, request arguments) into
//! plain serde-serializable data. Malformed arguments parse to safe
//! defaults, resolution failures come back as typed errors, and
//! everything else degrades in-band; nothing here throws past the
//! boundary.

use std::rc::Rc;

use host::document::{self, Document as HostDocument};
use host::node::{NodeKind, TreeNode};
use host::value::Value;
use serde::Serialize;
use tracing::debug;

use crate::error::{InspectError, Result};
use crate::resolve;
use crate::serialize::{Budgets, Serializer};
use crate::store::{self, FunctionRegistry, KEY_FUNCTIONS};
use crate::types::{ComponentList, ElementSummary, Locator, Mode, PathSeg, PathValue, Section};
use crate::walk::{self, WalkRequest};
use crate::{identity, provenance};

/// Traversal steps spent locating a component by id.
const MAX_FIND_STEPS: usize = 50_000;

/// The primary listing request: resolve the locator, walk the tree,
/// and return the component list with target-selection metadata.
pub fn enumerate_components(
    document: &HostDocument,
    locator: &Locator,
    selected_id: Option<&str>,
    include_all_state: bool,
) -> Result<ComponentList> {
    let resolved = match selected_id {
        // a bare id means the caller is reusing a stale locator; verify
        // the id still lives under the resolved root
        Some(id) if locator.is_empty() => resolve::resolve_for_id(document, locator, id)?,
        _ => resolve::resolve(document, locator)?,
    };

    let request = WalkRequest {
        target: resolved.target.as_ref(),
        selected_id,
        include_all_state,
        ..WalkRequest::default()
    };
    let outcome = walk::enumerate(&resolved.root, &request);
    debug!(
        components = outcome.components.len(),
        selected = ?outcome.best_index,
        "enumerated components"
    );

    let source_element = resolved.target.as_ref().map(|element| ElementSummary {
        selector: element.selector(),
        path: document::path_for(element),
        tag: element.tag.clone(),
    });
    Ok(ComponentList {
        components: outcome.components,
        selected_index: outcome.best_index,
        source_element,
    })
}

/// On-demand drill-down into one previously listed component.
pub fn resolve_value_at_path(
    document: &HostDocument,
    component_id: &str,
    section: Section,
    path: &[String],
    mode: Mode,
    limit: Option<usize>,
) -> Result<PathValue> {
    let resolved = resolve::resolve_for_id(document, &Locator::default(), component_id)?;
    let node = find_node_by_id(&resolved.root, component_id)
        .ok_or_else(|| InspectError::UnknownComponent(component_id.to_string()))?;

    let segments: Vec<PathSeg> = path.iter().map(|raw| PathSeg::parse(raw)).collect();
    let value = section_value(&node, section, &segments)?;

    match mode {
        Mode::Serialize => {
            let budgets = match limit {
                // drill-down pages through big containers: the limit
                // widens the per-container windows
                Some(limit) => Budgets {
                    max_seq_len: limit,
                    max_keys: limit,
                    max_entries: limit,
                    ..Budgets::default()
                },
                None => Budgets::default(),
            };
            let serializer = Serializer::new(budgets);
            Ok(PathValue::Serialized {
                value: serializer.serialize(&value, 0),
            })
        }
        Mode::DescribeFunction => match value {
            Value::Func(function) => {
                let function_ref = store::with_slot::<FunctionRegistry, _>(KEY_FUNCTIONS, |reg| {
                    reg.register(function.clone())
                });
                Ok(PathValue::Function {
                    name: function.name.clone(),
                    function_ref,
                })
            }
            _ => Err(InspectError::NotAFunction),
        },
    }
}

/// Serialize a result for the wire. Errors become
/// `{ "error": reason, "message": text }` objects.
pub fn to_wire<T: Serialize>(result: &Result<T>) -> serde_json::Value {
    match result {
        Ok(value) => serde_json::to_value(value).unwrap_or_else(|err| {
            serde_json::json!({ "error": "unserializable", "message": err.to_string() })
        }),
        Err(err) => serde_json::json!({ "error": err.reason(), "message": err.to_string() }),
    }
}

fn find_node_by_id(root: &Rc<TreeNode>, id: &str) -> Option<Rc<TreeNode>> {
    let mut steps = 0usize;
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        steps += 1;
        if steps > MAX_FIND_STEPS {
            return None;
        }
        if identity::peek(&node).as_deref() == Some(id) {
            return Some(node);
        }
        for child in node.children().into_iter().rev() {
            stack.push(child);
        }
    }
    None
}

/// The value a drill-down path starts from, then each segment applied.
fn section_value(node: &Rc<TreeNode>, section: Section, path: &[PathSeg]) -> Result<Value> {
    let (mut value, rest) = match section {
        Section::Props => (node.props.borrow().clone(), path),
        Section::State => {
            let Some((first, rest)) = path.split_first() else {
                return Err(InspectError::BadPath(
                    "state paths start with a cell index".to_string(),
                ));
            };
            let PathSeg::Index(index) = first else {
                return Err(InspectError::BadPath(
                    "state paths start with a cell index".to_string(),
                ));
            };
            let value = state_cell_value(node, *index)?;
            (value, rest)
        }
    };
    for segment in rest {
        value = step(&value, segment)?;
    }
    Ok(value)
}

fn state_cell_value(node: &Rc<TreeNode>, index: usize) -> Result<Value> {
    if node.kind == NodeKind::ClassComponent {
        if index == 0 {
            return Ok(node.class_state.borrow().clone());
        }
        return Err(InspectError::BadPath(format!(
            "class state has one cell, asked for {index}"
        )));
    }
    let cells = node.state_cells(provenance::MAX_STATE_CELLS);
    let cell = cells
        .get(index)
        .ok_or_else(|| InspectError::BadPath(format!("no state cell {index}")))?;
    let value = cell.hook.borrow().value().unwrap_or(Value::Null);
    Ok(value)
}

/// Apply one path segment. Lazy values resolve on the way through; a
/// failing getter surfaces as its thrown-marker string rather than an
/// error, matching how full serialization treats it.
fn step(value: &Value, segment: &PathSeg) -> Result<Value> {
    let value = match value {
        Value::Lazy(prop) => match prop.get() {
            Ok(inner) => inner,
            Err(err) => return Ok(Value::Str(format!("[Thrown: {err}]"))),
        },
        other => other.clone(),
    };
    match (&value, segment) {
        (Value::Record(entries), PathSeg::Key(key)) => entries
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| InspectError::BadPath(format!("no key {key:?}"))),
        (Value::Seq(items), PathSeg::Index(index)) => items
            .borrow()
            .get(*index)
            .cloned()
            .ok_or_else(|| InspectError::BadPath(format!("no element {index}"))),
        (Value::Map(entries), PathSeg::MapEntry(index)) => entries
            .borrow()
            .get(*index)
            .map(|(key, val)| Value::seq(vec![key.clone(), val.clone()]))
            .ok_or_else(|| InspectError::BadPath(format!("no map entry {index}"))),
        (Value::Map(entries), PathSeg::MapKey(index)) => entries
            .borrow()
            .get(*index)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| InspectError::BadPath(format!("no map entry {index}"))),
        (Value::Map(entries), PathSeg::MapValue(index)) => entries
            .borrow()
            .get(*index)
            .map(|(_, val)| val.clone())
            .ok_or_else(|| InspectError::BadPath(format!("no map entry {index}"))),
        (Value::Set(items), PathSeg::SetEntry(index)) => items
            .borrow()
            .get(*index)
            .cloned()
            .ok_or_else(|| InspectError::BadPath(format!("no set entry {index}"))),
        (_, segment) => Err(InspectError::BadPath(format!(
            "segment {segment:?} does not apply to {}",
            value.kind_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Document;
    use host::document::Rect;
    use host::hooks;
    use host::mount::{ElementSpec, Mounted, TreeBuilder};
    use host::node::Component;

    struct Fixture {
        doc: HostDocument,
        _mounted: Mounted,
    }

    fn fixture() -> Fixture {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let doc = HostDocument::new();
        let b = TreeBuilder::new(&doc);
        let root = b.root();
        let app = b.component(
            &root,
            &Component::with_render("App", "app.rs", 1, 1, |_| {
                hooks::use_state(Value::map(vec![(
                    Value::from("theme"),
                    Value::from("dark"),
                )]));
            }),
            Value::record(vec![
                (
                    "user".to_string(),
                    Value::record(vec![("name".to_string(), Value::from("sam"))]),
                ),
                ("on_save".to_string(), Value::func("save_profile")),
                (
                    "tags".to_string(),
                    Value::set(vec![Value::from("a"), Value::from("b")]),
                ),
            ]),
        );
        b.element(
            &app,
            ElementSpec::new("main")
                .id("app")
                .bounds(Rect::new(0.0, 0.0, 640.0, 480.0)),
        );
        let mounted = b.mount(root);
        Fixture {
            doc,
            _mounted: mounted,
        }
    }

    fn app_id(fx: &Fixture) -> String {
        let list = enumerate_components(&fx.doc, &Locator::default(), None, false)
            .expect("enumerates");
        list.components[0].id.clone()
    }

    #[test]
    fn test_enumerate_selects_component_under_point() {
        let fx = fixture();
        let list = enumerate_components(
            &fx.doc,
            &Locator {
                point: Some((10.0, 10.0)),
                selector: None,
            },
            None,
            false,
        )
        .expect("enumerates");

        assert_eq!(list.components.len(), 1);
        assert_eq!(list.components[0].name, "App");
        assert_eq!(list.selected_index, Some(0));
        let source = list.source_element.expect("source element");
        assert_eq!(source.selector, "main#app");
        assert_eq!(source.tag, "main");
    }

    #[test]
    fn test_enumerate_with_stale_everything_errors_typed() {
        let doc = HostDocument::new();
        let err = enumerate_components(&doc, &Locator::default(), None, false)
            .expect_err("empty document");
        assert_eq!(err, InspectError::MissingNearest);
    }

    #[test]
    fn test_props_drill_down_by_key() {
        let fx = fixture();
        let id = app_id(&fx);
        let result = resolve_value_at_path(
            &fx.doc,
            &id,
            Section::Props,
            &["user".to_string(), "name".to_string()],
            Mode::Serialize,
            None,
        )
        .expect("resolves");
        match result {
            PathValue::Serialized { value } => assert_eq!(value, Document::Str("sam".to_string())),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_state_drill_down_through_map_entry() {
        let fx = fixture();
        let id = app_id(&fx);
        let result = resolve_value_at_path(
            &fx.doc,
            &id,
            Section::State,
            &["0".to_string(), "@@value:0".to_string()],
            Mode::Serialize,
            None,
        )
        .expect("resolves");
        match result {
            PathValue::Serialized { value } => {
                assert_eq!(value, Document::Str("dark".to_string()));
            }
            other => panic!("unexpected {other:?}"),
        }

        let entry = resolve_value_at_path(
            &fx.doc,
            &id,
            Section::State,
            &["0".to_string(), "@@entry:0".to_string()],
            Mode::Serialize,
            None,
        )
        .expect("resolves");
        match entry {
            PathValue::Serialized {
                value: Document::Seq(pair),
            } => {
                assert_eq!(pair[0], Document::Str("theme".to_string()));
                assert_eq!(pair[1], Document::Str("dark".to_string()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_set_entry_drill_down() {
        let fx = fixture();
        let id = app_id(&fx);
        let result = resolve_value_at_path(
            &fx.doc,
            &id,
            Section::Props,
            &["tags".to_string(), "@@set:1".to_string()],
            Mode::Serialize,
            None,
        )
        .expect("resolves");
        match result {
            PathValue::Serialized { value } => assert_eq!(value, Document::Str("b".to_string())),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_describe_function_registers_in_ring() {
        let fx = fixture();
        let id = app_id(&fx);
        let result = resolve_value_at_path(
            &fx.doc,
            &id,
            Section::Props,
            &["on_save".to_string()],
            Mode::DescribeFunction,
            None,
        )
        .expect("resolves");
        match result {
            PathValue::Function { name, function_ref } => {
                assert_eq!(name, "save_profile");
                let held = store::with_slot::<FunctionRegistry, _>(KEY_FUNCTIONS, |reg| {
                    reg.get(function_ref)
                });
                assert!(held.is_some_and(|f| f.name == "save_profile"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let not_fn = resolve_value_at_path(
            &fx.doc,
            &id,
            Section::Props,
            &["user".to_string()],
            Mode::DescribeFunction,
            None,
        );
        assert_eq!(not_fn, Err(InspectError::NotAFunction));
    }

    #[test]
    fn test_bad_paths_are_typed_errors() {
        let fx = fixture();
        let id = app_id(&fx);
        let missing_key = resolve_value_at_path(
            &fx.doc,
            &id,
            Section::Props,
            &["nope".to_string()],
            Mode::Serialize,
            None,
        );
        assert!(matches!(missing_key, Err(InspectError::BadPath(_))));

        let bad_state_start = resolve_value_at_path(
            &fx.doc,
            &id,
            Section::State,
            &["theme".to_string()],
            Mode::Serialize,
            None,
        );
        assert!(matches!(bad_state_start, Err(InspectError::BadPath(_))));

        let unknown = resolve_value_at_path(
            &fx.doc,
            "n999999",
            Section::Props,
            &[],
            Mode::Serialize,
            None,
        );
        assert!(matches!(unknown, Err(InspectError::UnknownComponent(_))));
    }

    #[test]
    fn test_full_detail_includes_state_groups_and_wire_shape() {
        let fx = fixture();
        let list = enumerate_components(&fx.doc, &Locator::default(), None, true)
            .expect("enumerates");
        let app = &list.components[0];
        assert!(app.state_serialized);
        let state = app.state.as_ref().expect("state entries");
        assert_eq!(state.len(), 1);
        assert_eq!(state[0].name, "State");

        let wire = to_wire(&Ok::<_, InspectError>(list.clone()));
        assert!(wire.get("components").is_some());

        let err_wire = to_wire::<ComponentList>(&Err(InspectError::MissingNearest));
        assert_eq!(err_wire["error"], "missing-nearest");
    }
}
