//! Component enumeration over the live tree.
//!
//! Explicit-stack pre-order traversal: very deep or wide trees must
//! not exhaust the call stack, and both the step count and the result
//! size are budgeted. Only inspectable composite nodes are emitted;
//! structural and leaf layers pass their inherited parent id through,
//! flattening them out of the emitted tree. Truncation by budget is
//! silent.

use std::rc::Rc;

use host::document::{self, Element};
use host::node::{NodeKind, TreeNode};
use host::value::Value;
use tracing::{debug, trace};

use crate::identity;
use crate::provenance::{self, MAX_STATE_CELLS};
use crate::serialize::{Budgets, Serializer};
use crate::types::{ComponentSummary, KindTag, StateEntry};

/// Pre-order probe limit while deriving a node's DOM surrogate.
const LEAF_PROBE_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct WalkBudgets {
    pub max_steps: usize,
    pub max_components: usize,
}

impl Default for WalkBudgets {
    fn default() -> Self {
        Self {
            max_steps: 50_000,
            max_components: 2_000,
        }
    }
}

pub struct WalkRequest<'a> {
    pub target: Option<&'a Rc<Element>>,
    pub selected_id: Option<&'a str>,
    pub include_all_state: bool,
    pub budgets: WalkBudgets,
    pub serialize_budgets: Budgets,
}

impl Default for WalkRequest<'_> {
    fn default() -> Self {
        Self {
            target: None,
            selected_id: None,
            include_all_state: false,
            budgets: WalkBudgets::default(),
            serialize_budgets: Budgets::default(),
        }
    }
}

pub struct WalkOutcome {
    pub components: Vec<ComponentSummary>,
    /// Index of the best target container, tracked across the walk.
    pub best_index: Option<usize>,
}

struct WorkItem {
    node: Rc<TreeNode>,
    parent_id: Option<String>,
    depth: usize,
}

/// Pre-order enumeration from `root`.
///
/// Best-container selection is a total order: smallest containment
/// distance first, then greatest emitted depth, then earliest
/// encounter. The last leg makes duplicate-surrogate trees
/// deterministic.
pub fn enumerate(root: &Rc<TreeNode>, request: &WalkRequest) -> WalkOutcome {
    let mut components: Vec<ComponentSummary> = Vec::new();
    let mut best: Option<(u32, usize, usize)> = None;
    let mut steps = 0usize;
    let mut stack = vec![WorkItem {
        node: root.clone(),
        parent_id: None,
        depth: 0,
    }];

    while let Some(item) = stack.pop() {
        if steps >= request.budgets.max_steps
            || components.len() >= request.budgets.max_components
        {
            debug!(
                steps,
                emitted = components.len(),
                "enumeration budget reached"
            );
            break;
        }
        steps += 1;

        let WorkItem {
            node,
            parent_id,
            depth,
        } = item;

        let (next_parent, next_depth) = if node.kind.is_inspectable() {
            let summary = summarize(&node, parent_id, depth, request);
            if let Some(distance) = summary.target_distance {
                let index = components.len();
                let replace = match best {
                    None => true,
                    Some((best_distance, best_depth, _)) => {
                        distance < best_distance
                            || (distance == best_distance && depth > best_depth)
                    }
                };
                if replace {
                    best = Some((distance, depth, index));
                }
            }
            let id = summary.id.clone();
            components.push(summary);
            (Some(id), depth + 1)
        } else {
            // skipped layers hand their inherited parent id through
            (parent_id, depth)
        };

        let children = node.children();
        for child in children.into_iter().rev() {
            stack.push(WorkItem {
                node: child,
                parent_id: next_parent.clone(),
                depth: next_depth,
            });
        }
    }

    trace!(emitted = components.len(), steps, "enumeration complete");
    WalkOutcome {
        components,
        best_index: best.map(|(_, _, index)| index),
    }
}

fn summarize(
    node: &Rc<TreeNode>,
    parent_id: Option<String>,
    depth: usize,
    request: &WalkRequest,
) -> ComponentSummary {
    let id = identity::id_for(node);
    let kind = KindTag::of(node.kind).unwrap_or(KindTag::Function);

    let surrogate = nearest_leaf_element(node);
    let (selector, dom_path, tag) = match &surrogate {
        Some(element) => (
            Some(element.selector()),
            Some(document::path_for(element)),
            Some(element.tag.clone()),
        ),
        None => (None, None, None),
    };
    let target_distance = match (&surrogate, request.target) {
        (Some(element), Some(target)) => document::containment_distance(element, target),
        _ => None,
    };

    let full = request.include_all_state || request.selected_id.is_some_and(|sel| sel == id);
    let (props, state, state_count) = if full {
        let serializer = Serializer::new(request.serialize_budgets);
        let props_doc = serializer.serialize_props(&node.props.borrow().clone());
        let entries = collect_state(node, &serializer);
        let count = entries.len();
        (Some(props_doc), Some(entries), count)
    } else {
        (None, None, cheap_state_count(node))
    };
    let state_serialized = state.is_some();

    ComponentSummary {
        id,
        parent_id,
        name: node.display_name(),
        kind,
        depth,
        props,
        state,
        state_count,
        state_serialized,
        selector,
        dom_path,
        tag,
        contains_target: target_distance.is_some(),
        target_distance,
    }
}

fn collect_state(node: &Rc<TreeNode>, serializer: &Serializer) -> Vec<StateEntry> {
    if node.kind == NodeKind::ClassComponent {
        // class state is an opaque blob with no dispatcher provenance
        let blob = node.class_state.borrow().clone();
        return match blob {
            Value::Null => Vec::new(),
            value => vec![StateEntry {
                name: "State".to_string(),
                group: None,
                path: Vec::new(),
                value: Some(serializer.serialize(&value, 0)),
            }],
        };
    }
    provenance::state_entries(node, serializer)
}

fn cheap_state_count(node: &Rc<TreeNode>) -> usize {
    if node.kind == NodeKind::ClassComponent {
        return match &*node.class_state.borrow() {
            Value::Null => 0,
            _ => 1,
        };
    }
    node.state_cells(MAX_STATE_CELLS).len()
}

/// First host-leaf descendant in pre-order; its element stands in for
/// the component in DOM terms.
fn nearest_leaf_element(node: &Rc<TreeNode>) -> Option<Rc<Element>> {
    let mut stack: Vec<Rc<TreeNode>> = node.children().into_iter().rev().collect();
    let mut probed = 0usize;
    while let Some(current) = stack.pop() {
        probed += 1;
        if probed > LEAF_PROBE_LIMIT {
            break;
        }
        if current.kind.is_host_leaf() {
            if let Some(element) = &current.element {
                return Some(element.clone());
            }
        }
        for child in current.children().into_iter().rev() {
            stack.push(child);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use host::document::{Document, Rect};
    use host::hooks;
    use host::mount::{ElementSpec, Mounted, TreeBuilder};
    use host::node::Component;

    struct Fixture {
        doc: Document,
        root: Rc<TreeNode>,
        _mounted: Mounted,
    }

    /// App > div#app > (Sidebar > nav, Content > div#body > Button > button)
    fn fixture() -> Fixture {
        let doc = Document::new();
        let b = TreeBuilder::new(&doc);
        let root = b.root();

        let app = b.component(
            &root,
            &Component::with_render("App", "app.rs", 1, 1, |_| {
                hooks::use_state(Value::from(0));
            }),
            Value::record(vec![("title".to_string(), Value::from("demo"))]),
        );
        let app_el = b.element(
            &app,
            ElementSpec::new("div")
                .id("app")
                .bounds(Rect::new(0.0, 0.0, 800.0, 600.0)),
        );

        let sidebar = b.component(
            &app_el,
            &Component::with_render("Sidebar", "sidebar.rs", 1, 1, |_| {}),
            Value::Null,
        );
        b.element(
            &sidebar,
            ElementSpec::new("nav").bounds(Rect::new(0.0, 0.0, 200.0, 600.0)),
        );

        // a non-inspectable fragment layer between App and Content
        let frag = b.fragment(&app_el);
        let content = b.component(
            &frag,
            &Component::with_render("Content", "content.rs", 1, 1, |_| {}),
            Value::Null,
        );
        let body = b.element(
            &content,
            ElementSpec::new("div")
                .id("body")
                .bounds(Rect::new(200.0, 0.0, 600.0, 600.0)),
        );
        let button = b.component(
            &body,
            &Component::with_render("Button", "button.rs", 1, 1, |_| {}),
            Value::Null,
        );
        b.element(
            &button,
            ElementSpec::new("button").bounds(Rect::new(220.0, 20.0, 80.0, 30.0)),
        );

        let mounted = b.mount(root.clone());
        Fixture {
            doc,
            root,
            _mounted: mounted,
        }
    }

    #[test]
    fn test_preorder_and_parent_links() {
        let fx = fixture();
        let outcome = enumerate(&fx.root, &WalkRequest::default());
        let names: Vec<&str> = outcome
            .components
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["App", "Sidebar", "Content", "Button"]);

        // every parent id points at an earlier entry
        for (index, component) in outcome.components.iter().enumerate() {
            match &component.parent_id {
                None => assert_eq!(index, 0),
                Some(parent_id) => {
                    let parent_index = outcome.components[..index]
                        .iter()
                        .position(|c| &c.id == parent_id);
                    assert!(parent_index.is_some(), "parent of {} emitted earlier", component.name);
                }
            }
        }

        // the fragment layer is flattened: Content's parent is App
        let app_id = &outcome.components[0].id;
        assert_eq!(outcome.components[2].parent_id.as_ref(), Some(app_id));
        assert_eq!(outcome.components[2].depth, 1);
        assert_eq!(outcome.components[3].depth, 2);
    }

    #[test]
    fn test_state_counted_but_not_serialized_by_default() {
        let fx = fixture();
        let outcome = enumerate(&fx.root, &WalkRequest::default());
        let app = &outcome.components[0];
        assert_eq!(app.state_count, 1);
        assert!(!app.state_serialized);
        assert!(app.state.is_none());
        assert!(app.props.is_none());
    }

    #[test]
    fn test_selected_id_forces_serialization() {
        let fx = fixture();
        let first = enumerate(&fx.root, &WalkRequest::default());
        let app_id = first.components[0].id.clone();

        let outcome = enumerate(
            &fx.root,
            &WalkRequest {
                selected_id: Some(&app_id),
                ..WalkRequest::default()
            },
        );
        let app = &outcome.components[0];
        assert!(app.state_serialized);
        assert!(app.props.is_some());
        assert_eq!(app.state.as_ref().map(Vec::len), Some(1));
        // only the selected component pays the cost
        assert!(!outcome.components[1].state_serialized);
    }

    #[test]
    fn test_containment_prefers_deeper_component() {
        let fx = fixture();
        let target = fx.doc.query("button").expect("target element");
        let outcome = enumerate(
            &fx.root,
            &WalkRequest {
                target: Some(&target),
                ..WalkRequest::default()
            },
        );

        // App (distance 2), Content (distance 1), Button (distance 0)
        // all contain the target; Button is deepest and closest
        let selected = outcome.best_index.expect("selected index");
        assert_eq!(outcome.components[selected].name, "Button");
        assert_eq!(outcome.components[selected].target_distance, Some(0));

        let app = &outcome.components[0];
        assert!(app.contains_target);
        assert_eq!(app.target_distance, Some(2));
        let sidebar = &outcome.components[1];
        assert!(!sidebar.contains_target);
    }

    #[test]
    fn test_equal_distance_tie_breaks_by_depth() {
        // Outer and Inner share the same surrogate element
        let doc = Document::new();
        let b = TreeBuilder::new(&doc);
        let root = b.root();
        let outer = b.component(
            &root,
            &Component::with_render("Outer", "outer.rs", 1, 1, |_| {}),
            Value::Null,
        );
        let inner = b.component(
            &outer,
            &Component::with_render("Inner", "inner.rs", 1, 1, |_| {}),
            Value::Null,
        );
        b.element(
            &inner,
            ElementSpec::new("div")
                .id("shared")
                .bounds(Rect::new(0.0, 0.0, 100.0, 100.0)),
        );
        let _mounted = b.mount(root.clone());

        let target = doc.query("#shared").expect("target");
        let outcome = enumerate(
            &root,
            &WalkRequest {
                target: Some(&target),
                ..WalkRequest::default()
            },
        );
        let selected = outcome.best_index.expect("selected");
        assert_eq!(outcome.components[selected].name, "Inner");
    }

    #[test]
    fn test_full_detail_recovers_hook_groups() {
        fn use_custom_a() -> Value {
            let _frame = host::frame!("use_custom_a");
            hooks::use_state(Value::from(5))
        }
        let doc = Document::new();
        let b = TreeBuilder::new(&doc);
        let root = b.root();
        b.component(
            &root,
            &Component::with_render("Panel", "panel.rs", 1, 1, |_| {
                use_custom_a();
                hooks::use_state(Value::from(2));
            }),
            Value::Null,
        );
        let _mounted = b.mount(root.clone());

        let outcome = enumerate(
            &root,
            &WalkRequest {
                include_all_state: true,
                ..WalkRequest::default()
            },
        );
        let state = outcome.components[0].state.as_ref().expect("state entries");
        assert_eq!(state.len(), 2);
        assert_eq!(state[0].group.as_deref(), Some("CustomA"));
        assert_eq!(state[0].path, vec!["CustomA".to_string()]);
        assert_eq!(state[0].name, "State");
        assert_eq!(state[1].group, None);
    }

    #[test]
    fn test_budget_truncates_silently() {
        let fx = fixture();
        let outcome = enumerate(
            &fx.root,
            &WalkRequest {
                budgets: WalkBudgets {
                    max_steps: 50_000,
                    max_components: 2,
                },
                ..WalkRequest::default()
            },
        );
        assert_eq!(outcome.components.len(), 2);
    }

    #[test]
    fn test_surrogate_fields_derive_from_first_leaf() {
        let fx = fixture();
        let outcome = enumerate(&fx.root, &WalkRequest::default());
        let app = &outcome.components[0];
        assert_eq!(app.tag.as_deref(), Some("div"));
        assert_eq!(app.selector.as_deref(), Some("div#app"));
        assert_eq!(app.dom_path.as_deref(), Some("#app"));
    }
}
