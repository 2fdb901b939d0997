//! Hook provenance reconstruction.
//!
//! Nothing in the live tree records which user hook produced a state
//! cell: the cell list is unlabeled. This module recovers the labels by
//! re-running the component's render function once with an instrumented
//! dispatch table, capturing the call stack at every primitive access,
//! and diffing those stacks against two references: the primitive's own
//! baseline stack (captured with zero user frames above it) and the
//! replay's root stack. The frames between the two cut points are the
//! user's custom hook chain.
//!
//! Pure enrichment: every failure path degrades to "no provenance" and
//! the caller shows the raw cell list. The dispatcher swap is strictly
//! scoped and restored on every exit path; nested replay is unsupported
//! and refused.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use ahash::AHashMap;
use host::hooks::{self, ContextHandle, Dispatcher, Primitive, StateCell};
use host::node::TreeNode;
use host::stack::{self, Trace};
use host::value::Value;
use tracing::{debug, trace};

use crate::frames::{is_hook_named, normalize_hook_name, EngineFormat, StackFrame, StackFrameSource};
use crate::serialize::Serializer;
use crate::store::{self, KEY_ANCESTOR_OFFSET};
use crate::types::StateEntry;

/// Longest cell chain read from a node.
pub const MAX_STATE_CELLS: usize = 512;

/// Root-stack offsets probed when the cached guess misses.
const ANCESTOR_PROBES: usize = 5;

/// Hook-named wrapper frames allowed above a primitive's own frames.
const MAX_WRAPPER_FRAMES: usize = 2;

/// One recovered attribution, parallel to the node's cell list.
#[derive(Debug, Clone)]
pub struct HookAttribution {
    /// Deepest custom hook on the chain, if any.
    pub group: Option<String>,
    /// Outermost-to-innermost custom hook chain.
    pub path: Vec<String>,
    /// Normalized primitive display name.
    pub display_name: String,
    pub value: Option<Value>,
}

struct HookLogEntry {
    primitive: Primitive,
    dispatcher_name: &'static str,
    value: Option<Value>,
    trace: Trace,
}

thread_local! {
    static REPLAYING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the replay as active for its lifetime. `enter` refuses nested
/// replay instead of corrupting the outer dispatcher swap.
struct ReplayScope;

impl ReplayScope {
    fn enter() -> Option<Self> {
        REPLAYING.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(ReplayScope)
            }
        })
    }
}

impl Drop for ReplayScope {
    fn drop(&mut self) {
        REPLAYING.with(|flag| flag.set(false));
    }
}

/// Puts the previous dispatcher back on every exit path.
struct DispatcherSwap {
    previous: Option<Rc<dyn Dispatcher>>,
}

impl DispatcherSwap {
    fn install(next: Rc<dyn Dispatcher>) -> Self {
        Self {
            previous: hooks::swap_dispatcher(Some(next)),
        }
    }
}

impl Drop for DispatcherSwap {
    fn drop(&mut self) {
        let _ = hooks::swap_dispatcher(self.previous.take());
    }
}

/// Dispatcher installed during replay. In warmup mode it only records
/// per-primitive baseline stacks; in replay mode a cursor steps through
/// the target's existing cell list in lock-step so every wrapped call
/// reads real prior state rather than fresh defaults.
struct ReplayDispatcher {
    cursor: RefCell<Option<Rc<StateCell>>>,
    log: RefCell<Vec<HookLogEntry>>,
    warmup: Cell<bool>,
    baselines: RefCell<AHashMap<Primitive, Trace>>,
}

impl ReplayDispatcher {
    fn new(head: Option<Rc<StateCell>>) -> Self {
        Self {
            cursor: RefCell::new(head),
            log: RefCell::new(Vec::new()),
            warmup: Cell::new(true),
            baselines: RefCell::new(AHashMap::new()),
        }
    }

    fn advance(&self) -> Option<Rc<StateCell>> {
        let mut cursor = self.cursor.borrow_mut();
        let current = cursor.take();
        if let Some(cell) = &current {
            *cursor = cell.next.borrow().clone();
        }
        current
    }

    fn observe(
        &self,
        primitive: Primitive,
        dispatcher_name: &'static str,
        dummy: Option<Value>,
    ) -> Option<Value> {
        if self.warmup.get() {
            self.baselines
                .borrow_mut()
                .entry(primitive)
                .or_insert_with(stack::capture);
            return dummy;
        }
        let cell = self.advance();
        let value = cell.as_ref().and_then(|c| c.hook.borrow().value());
        self.log.borrow_mut().push(HookLogEntry {
            primitive,
            dispatcher_name,
            value: value.clone(),
            trace: stack::capture(),
        });
        value.or(dummy)
    }
}

impl Dispatcher for ReplayDispatcher {
    fn use_state(&self, initial: Value) -> Value {
        self.observe(Primitive::State, "use_state", Some(initial.clone()))
            .unwrap_or(initial)
    }

    fn use_reducer(&self, _reducer: Value, initial: Value) -> Value {
        self.observe(Primitive::Reducer, "use_reducer", Some(initial.clone()))
            .unwrap_or(initial)
    }

    fn use_effect(&self, _deps: Option<Vec<Value>>) {
        let _ = self.observe(Primitive::Effect, "use_effect", None);
    }

    fn use_layout_effect(&self, _deps: Option<Vec<Value>>) {
        let _ = self.observe(Primitive::LayoutEffect, "use_layout_effect", None);
    }

    fn use_memo(&self, factory: &dyn Fn() -> Value) -> Value {
        self.observe(Primitive::Memo, "use_memo", None)
            .unwrap_or_else(factory)
    }

    fn use_callback(&self, callback: Value) -> Value {
        self.observe(Primitive::Callback, "use_callback", Some(callback.clone()))
            .unwrap_or(callback)
    }

    fn use_ref(&self, initial: Value) -> Value {
        self.observe(Primitive::Ref, "use_ref", Some(initial.clone()))
            .unwrap_or(initial)
    }

    fn use_context(&self, context: &ContextHandle) -> Value {
        self.observe(Primitive::Context, "use_context", Some(context.current()))
            .unwrap_or_else(|| context.current())
    }

    fn use_transition(&self) -> bool {
        matches!(
            self.observe(Primitive::Transition, "use_transition", None),
            Some(Value::Bool(true))
        )
    }

    fn use_deferred_value(&self, value: Value) -> Value {
        self.observe(
            Primitive::DeferredValue,
            "use_deferred_value",
            Some(value.clone()),
        )
        .unwrap_or(value)
    }

    fn use_id(&self) -> String {
        match self.observe(Primitive::Id, "use_id", None) {
            Some(Value::Str(id)) => id,
            _ => String::new(),
        }
    }

    fn use_external_store(&self, get_snapshot: &dyn Fn() -> Value) -> Value {
        self.observe(Primitive::ExternalStore, "use_external_store", None)
            .unwrap_or_else(get_snapshot)
    }
}

/// Invoke every primitive once in isolation, with dummy arguments, so
/// the dispatcher records what each primitive's own frames look like
/// with zero user frames above them. Failures are swallowed; a missing
/// baseline only means that primitive falls back to whole-stack
/// scanning later.
fn capture_baselines(proxy: &Rc<ReplayDispatcher>) {
    let _anchor = stack::frame("warmup_baseline", file!(), line!(), column!());
    let _swap = DispatcherSwap::install(proxy.clone());
    let calls: Vec<Box<dyn Fn()>> = vec![
        Box::new(|| {
            hooks::use_state(Value::Null);
        }),
        Box::new(|| {
            hooks::use_reducer(Value::Null, Value::Null);
        }),
        Box::new(|| hooks::use_effect(None)),
        Box::new(|| hooks::use_layout_effect(None)),
        Box::new(|| {
            hooks::use_memo(&|| Value::Null);
        }),
        Box::new(|| {
            hooks::use_callback(Value::Null);
        }),
        Box::new(|| {
            hooks::use_ref(Value::Null);
        }),
        Box::new(|| {
            let context = ContextHandle::new("warmup", Value::Null);
            hooks::use_context(&context);
        }),
        Box::new(|| {
            hooks::use_transition();
        }),
        Box::new(|| {
            hooks::use_deferred_value(Value::Null);
        }),
        Box::new(|| {
            hooks::use_id();
        }),
        Box::new(|| {
            hooks::use_external_store(&|| Value::Null);
        }),
    ];
    for call in calls {
        let _ = panic::catch_unwind(AssertUnwindSafe(call));
    }
}

/// Index in `entry` where its tail rejoins `root` (frames compared by
/// call site). Consecutive log entries usually share the same ancestor
/// depth, so the previous answer's root offset is tried first, then
/// the first few offsets are probed.
fn root_join_index(entry: &[StackFrame], root: &[StackFrame], cached: &mut usize) -> Option<usize> {
    if let Some(index) = shared_index(entry, root, *cached) {
        return Some(index);
    }
    for offset in 0..root.len().min(ANCESTOR_PROBES) {
        if offset == *cached {
            continue;
        }
        if let Some(index) = shared_index(entry, root, offset) {
            *cached = offset;
            return Some(index);
        }
    }
    None
}

fn shared_index(entry: &[StackFrame], root: &[StackFrame], root_start: usize) -> Option<usize> {
    let anchor = root.get(root_start)?;
    'candidates: for i in 0..entry.len() {
        if !entry[i].same_source(anchor) {
            continue;
        }
        let mut a = root_start + 1;
        let mut b = i + 1;
        while a < root.len() && b < entry.len() {
            if !entry[b].same_source(&root[a]) {
                continue 'candidates;
            }
            a += 1;
            b += 1;
        }
        return Some(i);
    }
    None
}

fn is_wrapper_frame(frame_name: &str, dispatcher_name: &str) -> bool {
    let normalized = normalize_hook_name(frame_name);
    normalized == normalize_hook_name(dispatcher_name) || normalized == "Resource"
}

/// Index in `entry` where the primitive's own frames end and user code
/// begins. A known wrapper accessor may consume up to two extra frames
/// above the primitive's baseline.
fn primitive_boundary(
    entry: &[StackFrame],
    baseline: &[StackFrame],
    dispatcher_name: &str,
) -> Option<usize> {
    let shared = baseline.len().min(entry.len());
    for i in 0..shared {
        if entry[i].same_source(&baseline[i]) {
            continue;
        }
        let mut boundary = i;
        for _ in 0..MAX_WRAPPER_FRAMES {
            if boundary + 1 < entry.len() && is_wrapper_frame(&entry[boundary].name, dispatcher_name)
            {
                boundary += 1;
            }
        }
        return Some(boundary);
    }
    None
}

/// Keep candidate frames that look like user-defined accessors and
/// normalize them. Innermost-first in, so the returned chain is
/// deepest-first.
fn kept_hook_names(scan: &[StackFrame], component_name: &str) -> Vec<String> {
    let primitive_names: Vec<&str> = Primitive::ALL.iter().map(|p| p.display_name()).collect();
    let mut kept: Vec<String> = Vec::new();
    for frame in scan {
        let name = frame.name.as_str();
        let base = name.rsplit("::").next().unwrap_or(name);
        let looks_user = is_hook_named(base) || base.starts_with(char::is_uppercase);
        if !looks_user {
            continue;
        }
        if base == component_name {
            continue;
        }
        let normalized = normalize_hook_name(base);
        if primitive_names.contains(&normalized.as_str()) {
            continue;
        }
        if kept.last() == Some(&normalized) {
            continue;
        }
        kept.push(normalized);
    }
    kept
}

/// Replay `node`'s render with an instrumented dispatcher and attribute
/// each logged primitive access to the custom hook chain that made it.
/// `None` when any precondition fails.
pub fn hook_provenance(node: &Rc<TreeNode>) -> Option<Vec<HookAttribution>> {
    if !node.kind.uses_dispatcher() {
        return None;
    }
    let component = node.component.clone()?;
    let render = component.render_fn()?;
    let Some(_scope) = ReplayScope::enter() else {
        debug!(component = %component.name, "nested replay refused");
        return None;
    };

    let proxy = Rc::new(ReplayDispatcher::new(node.state_head.borrow().clone()));
    capture_baselines(&proxy);
    proxy.warmup.set(false);

    let props = node.props.borrow().clone();
    let root_trace;
    {
        let _swap = DispatcherSwap::install(proxy.clone());
        let _anchor = stack::frame("replay_render", file!(), line!(), column!());
        root_trace = stack::capture();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _frame = stack::frame(
                &component.name,
                &component.file,
                component.line,
                component.column,
            );
            (*render)(&props);
        }));
        if result.is_err() {
            // renders may throw control-flow signals; the partial log
            // is still usable
            debug!(component = %component.name, "render replay raised");
        }
    }

    let source = EngineFormat;
    let root = source.frames(&root_trace);
    let baselines: AHashMap<Primitive, Vec<StackFrame>> = proxy
        .baselines
        .borrow()
        .iter()
        .map(|(primitive, trace)| (*primitive, source.frames(trace)))
        .collect();

    let mut cached_offset = store::with_slot::<usize, _>(KEY_ANCESTOR_OFFSET, |offset| *offset);
    let log = proxy.log.borrow();
    let mut attributions = Vec::with_capacity(log.len());
    for entry in log.iter() {
        let frames = source.frames(&entry.trace);
        let join = root_join_index(&frames, &root, &mut cached_offset);
        let boundary = baselines
            .get(&entry.primitive)
            .and_then(|baseline| primitive_boundary(&frames, baseline, entry.dispatcher_name));

        // the slice strictly between the two cut points, excluding the
        // component's own frame; when either cut is missing, scan the
        // whole stack and let the name filter sort it out
        let scan: &[StackFrame] = match (boundary, join) {
            (Some(p), Some(r)) if r >= p + 2 => &frames[p..r - 1],
            _ => &frames,
        };
        let kept = kept_hook_names(scan, &component.name);
        let path: Vec<String> = kept.iter().rev().cloned().collect();
        let group = kept.first().cloned();
        trace!(
            primitive = entry.primitive.display_name(),
            group = group.as_deref().unwrap_or("-"),
            "attributed hook"
        );
        attributions.push(HookAttribution {
            group,
            path,
            display_name: entry.primitive.display_name().to_string(),
            value: entry.value.clone(),
        });
    }
    store::with_slot::<usize, _>(KEY_ANCESTOR_OFFSET, |offset| *offset = cached_offset);
    debug!(
        component = %component.name,
        entries = attributions.len(),
        "hook provenance reconstructed"
    );
    Some(attributions)
}

/// Serialize the node's cell list, enriched with provenance when the
/// replay produced it. Attribution metadata shorter than the real cell
/// count pads out with fallbacks derived from the cells themselves.
pub fn state_entries(node: &Rc<TreeNode>, serializer: &Serializer) -> Vec<StateEntry> {
    let cells = node.state_cells(MAX_STATE_CELLS);
    let attributions = hook_provenance(node).unwrap_or_default();
    cells
        .iter()
        .enumerate()
        .map(|(index, cell)| match attributions.get(index) {
            Some(attribution) => StateEntry {
                name: attribution.display_name.clone(),
                group: attribution.group.clone(),
                path: attribution.path.clone(),
                value: attribution
                    .value
                    .as_ref()
                    .map(|value| serializer.serialize(value, 0)),
            },
            None => {
                let hook = cell.hook.borrow();
                StateEntry {
                    name: hook.display_name().to_string(),
                    group: None,
                    path: Vec::new(),
                    value: hook.value().map(|value| serializer.serialize(&value, 0)),
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use host::document::Document;
    use host::mount::TreeBuilder;
    use host::node::{Component, NodeKind};
    use host::value::Value;
    use crate::serialize::Budgets;

    fn use_custom_a() -> Value {
        let _frame = host::frame!("use_custom_a");
        hooks::use_state(Value::from(5))
    }

    fn use_inner() -> Value {
        let _frame = host::frame!("use_inner");
        hooks::use_state(Value::from(1))
    }

    fn use_outer() -> Value {
        let _frame = host::frame!("use_outer");
        use_inner()
    }

    fn mounted_component(
        render: impl Fn(&Value) + 'static,
    ) -> (Rc<TreeNode>, host::mount::Mounted) {
        let doc = Document::new();
        let builder = TreeBuilder::new(&doc);
        let root = builder.root();
        let component = Component::with_render("App", "app.rs", 3, 1, render);
        let node = builder.component(&root, &component, Value::Null);
        let mounted = builder.mount(root);
        (node, mounted)
    }

    #[test]
    fn test_custom_hook_and_direct_use_are_distinguished() {
        let (node, _mounted) = mounted_component(|_props| {
            use_custom_a();
            hooks::use_state(Value::from(2));
        });

        let attributions = hook_provenance(&node).expect("provenance");
        assert_eq!(attributions.len(), 2);

        assert_eq!(attributions[0].group.as_deref(), Some("CustomA"));
        assert_eq!(attributions[0].path, vec!["CustomA".to_string()]);
        assert_eq!(attributions[0].display_name, "State");
        match &attributions[0].value {
            Some(Value::Num(n)) => assert_eq!(*n, 5.0),
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(attributions[1].group, None);
        assert!(attributions[1].path.is_empty());
    }

    #[test]
    fn test_nested_custom_hooks_produce_full_path() {
        let (node, _mounted) = mounted_component(|_props| {
            use_outer();
        });

        let attributions = hook_provenance(&node).expect("provenance");
        assert_eq!(attributions.len(), 1);
        assert_eq!(
            attributions[0].path,
            vec!["Outer".to_string(), "Inner".to_string()]
        );
        assert_eq!(attributions[0].group.as_deref(), Some("Inner"));
    }

    #[test]
    fn test_wrapper_accessor_still_attributes_through_context() {
        fn use_settings(context: &Rc<ContextHandle>) -> Value {
            let _frame = host::frame!("use_settings");
            hooks::use_resource(context)
        }
        let context = ContextHandle::new("settings", Value::from("compact"));
        let ctx = context.clone();
        let (node, _mounted) = mounted_component(move |_props| {
            use_settings(&ctx);
        });

        let attributions = hook_provenance(&node).expect("provenance");
        assert_eq!(attributions.len(), 1);
        assert_eq!(attributions[0].display_name, "Context");
        assert_eq!(attributions[0].group.as_deref(), Some("Settings"));
    }

    #[test]
    fn test_class_nodes_are_skipped() {
        let doc = Document::new();
        let builder = TreeBuilder::new(&doc);
        let root = builder.root();
        let component = Component::new("Legacy", "legacy.rs", 1, 1);
        let node = builder.composite(&root, NodeKind::ClassComponent, &component, Value::Null);
        assert!(hook_provenance(&node).is_none());
    }

    #[test]
    fn test_replay_reads_real_prior_state() {
        let (node, _mounted) = mounted_component(|_props| {
            hooks::use_state(Value::from(0));
        });
        // mutate the mounted cell the way an event handler would
        if let Some(cell) = node.state_cells(4).first() {
            *cell.hook.borrow_mut() = hooks::HookState::State {
                value: Value::from(99),
            };
        }
        let attributions = hook_provenance(&node).expect("provenance");
        match &attributions[0].value {
            Some(Value::Num(n)) => assert_eq!(*n, 99.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_dispatcher_restored_after_panicking_render() {
        let previous_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));

        let (node, _mounted) = mounted_component(|_props| {
            hooks::use_state(Value::from(1));
        });
        // swap in a render that throws after its first hook
        if let Some(component) = &node.component {
            *component.render.borrow_mut() = Some(Rc::new(|_props: &Value| {
                hooks::use_state(Value::from(1));
                panic!("suspend");
            }));
        }

        assert!(!hooks::has_dispatcher());
        let attributions = hook_provenance(&node).expect("partial log survives");
        assert_eq!(attributions.len(), 1);
        assert!(!hooks::has_dispatcher(), "dispatcher restored after panic");

        panic::set_hook(previous_hook);
    }

    #[test]
    fn test_state_entries_pad_when_log_is_short() {
        let (node, _mounted) = mounted_component(|_props| {
            hooks::use_state(Value::from(1));
            hooks::use_ref(Value::from(2));
        });
        // render shorter than the real cell list
        if let Some(component) = &node.component {
            *component.render.borrow_mut() = Some(Rc::new(|_props: &Value| {
                hooks::use_state(Value::from(1));
            }));
        }

        let serializer = Serializer::new(Budgets::default());
        let entries = state_entries(&node, &serializer);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "State");
        // padded fallback keeps the cell's own shape
        assert_eq!(entries[1].name, "Ref");
        assert_eq!(entries[1].group, None);
    }
}
