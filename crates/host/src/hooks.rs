//! Hook state cells and the dispatch table.
//!
//! Composite function nodes keep local state as a singly linked list of
//! tagged cells. Hook calls go through free functions that delegate to
//! the currently installed dispatcher. The dispatcher slot is
//! process-wide state for the single execution context; rendering
//! installs the mount dispatcher, and an inspector may temporarily
//! install its own (swap, replay, restore).
//!
//! Every free function pushes its own call frames before delegating, so
//! traces captured inside a dispatcher carry the primitive's internal
//! frames above whatever user code called it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::stack;
use crate::value::Value;

/// One local-state cell. `next` forms the per-node list.
pub struct StateCell {
    pub hook: RefCell<HookState>,
    pub next: RefCell<Option<Rc<StateCell>>>,
}

impl StateCell {
    pub fn new(hook: HookState) -> Rc<Self> {
        Rc::new(Self {
            hook: RefCell::new(hook),
            next: RefCell::new(None),
        })
    }
}

/// Tagged local-state variants. Closed set; use sites match
/// exhaustively instead of sniffing shapes.
#[derive(Debug, Clone)]
pub enum HookState {
    State { value: Value },
    Reducer { value: Value },
    Effect { deps: Option<Vec<Value>> },
    LayoutEffect { deps: Option<Vec<Value>> },
    Memo { value: Value },
    Callback { value: Value },
    Ref { value: Value },
    Context { value: Value },
    Transition { pending: bool },
    DeferredValue { value: Value },
    Id { value: String },
    ExternalStore { value: Value },
}

impl HookState {
    pub fn display_name(&self) -> &'static str {
        match self {
            HookState::State { .. } => "State",
            HookState::Reducer { .. } => "Reducer",
            HookState::Effect { .. } => "Effect",
            HookState::LayoutEffect { .. } => "LayoutEffect",
            HookState::Memo { .. } => "Memo",
            HookState::Callback { .. } => "Callback",
            HookState::Ref { .. } => "Ref",
            HookState::Context { .. } => "Context",
            HookState::Transition { .. } => "Transition",
            HookState::DeferredValue { .. } => "DeferredValue",
            HookState::Id { .. } => "Id",
            HookState::ExternalStore { .. } => "ExternalStore",
        }
    }

    /// Observable value of the cell, when the variant carries one.
    pub fn value(&self) -> Option<Value> {
        match self {
            HookState::State { value }
            | HookState::Reducer { value }
            | HookState::Memo { value }
            | HookState::Callback { value }
            | HookState::Ref { value }
            | HookState::Context { value }
            | HookState::DeferredValue { value }
            | HookState::ExternalStore { value } => Some(value.clone()),
            HookState::Transition { pending } => Some(Value::Bool(*pending)),
            HookState::Id { value } => Some(Value::Str(value.clone())),
            HookState::Effect { .. } | HookState::LayoutEffect { .. } => None,
        }
    }
}

/// The fixed set of primitive state operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    State,
    Reducer,
    Effect,
    LayoutEffect,
    Memo,
    Callback,
    Ref,
    Context,
    Transition,
    DeferredValue,
    Id,
    ExternalStore,
}

impl Primitive {
    pub const ALL: [Primitive; 12] = [
        Primitive::State,
        Primitive::Reducer,
        Primitive::Effect,
        Primitive::LayoutEffect,
        Primitive::Memo,
        Primitive::Callback,
        Primitive::Ref,
        Primitive::Context,
        Primitive::Transition,
        Primitive::DeferredValue,
        Primitive::Id,
        Primitive::ExternalStore,
    ];

    /// Public accessor name.
    pub fn fn_name(self) -> &'static str {
        match self {
            Primitive::State => "use_state",
            Primitive::Reducer => "use_reducer",
            Primitive::Effect => "use_effect",
            Primitive::LayoutEffect => "use_layout_effect",
            Primitive::Memo => "use_memo",
            Primitive::Callback => "use_callback",
            Primitive::Ref => "use_ref",
            Primitive::Context => "use_context",
            Primitive::Transition => "use_transition",
            Primitive::DeferredValue => "use_deferred_value",
            Primitive::Id => "use_id",
            Primitive::ExternalStore => "use_external_store",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Primitive::State => "State",
            Primitive::Reducer => "Reducer",
            Primitive::Effect => "Effect",
            Primitive::LayoutEffect => "LayoutEffect",
            Primitive::Memo => "Memo",
            Primitive::Callback => "Callback",
            Primitive::Ref => "Ref",
            Primitive::Context => "Context",
            Primitive::Transition => "Transition",
            Primitive::DeferredValue => "DeferredValue",
            Primitive::Id => "Id",
            Primitive::ExternalStore => "ExternalStore",
        }
    }
}

/// Shared context value read by `use_context`.
pub struct ContextHandle {
    pub name: String,
    pub value: RefCell<Value>,
}

impl ContextHandle {
    pub fn new(name: &str, value: Value) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            value: RefCell::new(value),
        })
    }

    pub fn current(&self) -> Value {
        self.value.borrow().clone()
    }
}

/// Host dispatch table. One method per primitive.
pub trait Dispatcher {
    fn use_state(&self, initial: Value) -> Value;
    fn use_reducer(&self, reducer: Value, initial: Value) -> Value;
    fn use_effect(&self, deps: Option<Vec<Value>>);
    fn use_layout_effect(&self, deps: Option<Vec<Value>>);
    fn use_memo(&self, factory: &dyn Fn() -> Value) -> Value;
    fn use_callback(&self, callback: Value) -> Value;
    fn use_ref(&self, initial: Value) -> Value;
    fn use_context(&self, context: &ContextHandle) -> Value;
    fn use_transition(&self) -> bool;
    fn use_deferred_value(&self, value: Value) -> Value;
    fn use_id(&self) -> String;
    fn use_external_store(&self, get_snapshot: &dyn Fn() -> Value) -> Value;
}

thread_local! {
    static DISPATCHER: RefCell<Option<Rc<dyn Dispatcher>>> = const { RefCell::new(None) };
}

/// Install `next`, returning whatever was installed before. The caller
/// owns putting the previous dispatcher back.
pub fn swap_dispatcher(next: Option<Rc<dyn Dispatcher>>) -> Option<Rc<dyn Dispatcher>> {
    DISPATCHER.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), next))
}

pub fn has_dispatcher() -> bool {
    DISPATCHER.with(|slot| slot.borrow().is_some())
}

fn with_dispatcher<T>(f: impl FnOnce(&Rc<dyn Dispatcher>) -> T) -> Option<T> {
    let _frame = stack::frame("dispatch", file!(), line!(), column!());
    let current = DISPATCHER.with(|slot| slot.borrow().clone());
    current.as_ref().map(f)
}

pub fn use_state(initial: Value) -> Value {
    let _frame = stack::frame("use_state", file!(), line!(), column!());
    with_dispatcher(|d| d.use_state(initial.clone())).unwrap_or(initial)
}

pub fn use_reducer(reducer: Value, initial: Value) -> Value {
    let _frame = stack::frame("use_reducer", file!(), line!(), column!());
    with_dispatcher(|d| d.use_reducer(reducer.clone(), initial.clone())).unwrap_or(initial)
}

pub fn use_effect(deps: Option<Vec<Value>>) {
    let _frame = stack::frame("use_effect", file!(), line!(), column!());
    let _ = with_dispatcher(|d| d.use_effect(deps.clone()));
}

pub fn use_layout_effect(deps: Option<Vec<Value>>) {
    let _frame = stack::frame("use_layout_effect", file!(), line!(), column!());
    let _ = with_dispatcher(|d| d.use_layout_effect(deps.clone()));
}

pub fn use_memo(factory: &dyn Fn() -> Value) -> Value {
    let _frame = stack::frame("use_memo", file!(), line!(), column!());
    with_dispatcher(|d| d.use_memo(factory)).unwrap_or_else(|| factory())
}

pub fn use_callback(callback: Value) -> Value {
    let _frame = stack::frame("use_callback", file!(), line!(), column!());
    with_dispatcher(|d| d.use_callback(callback.clone())).unwrap_or(callback)
}

pub fn use_ref(initial: Value) -> Value {
    let _frame = stack::frame("use_ref", file!(), line!(), column!());
    with_dispatcher(|d| d.use_ref(initial.clone())).unwrap_or(initial)
}

pub fn use_context(context: &ContextHandle) -> Value {
    let _frame = stack::frame("use_context", file!(), line!(), column!());
    with_dispatcher(|d| d.use_context(context)).unwrap_or_else(|| context.current())
}

pub fn use_transition() -> bool {
    let _frame = stack::frame("use_transition", file!(), line!(), column!());
    with_dispatcher(|d| d.use_transition()).unwrap_or(false)
}

pub fn use_deferred_value(value: Value) -> Value {
    let _frame = stack::frame("use_deferred_value", file!(), line!(), column!());
    with_dispatcher(|d| d.use_deferred_value(value.clone())).unwrap_or(value)
}

pub fn use_id() -> String {
    let _frame = stack::frame("use_id", file!(), line!(), column!());
    with_dispatcher(|d| d.use_id()).unwrap_or_default()
}

pub fn use_external_store(get_snapshot: &dyn Fn() -> Value) -> Value {
    let _frame = stack::frame("use_external_store", file!(), line!(), column!());
    with_dispatcher(|d| d.use_external_store(get_snapshot)).unwrap_or_else(|| get_snapshot())
}

/// Generic resource accessor. Routes through [`use_context`], so its
/// frame sits above the primitive's own frames in captured traces.
pub fn use_resource(context: &ContextHandle) -> Value {
    let _frame = stack::frame("use_resource", file!(), line!(), column!());
    use_context(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingDispatcher {
        calls: Cell<usize>,
    }

    impl Dispatcher for CountingDispatcher {
        fn use_state(&self, initial: Value) -> Value {
            self.calls.set(self.calls.get() + 1);
            initial
        }
        fn use_reducer(&self, _reducer: Value, initial: Value) -> Value {
            initial
        }
        fn use_effect(&self, _deps: Option<Vec<Value>>) {}
        fn use_layout_effect(&self, _deps: Option<Vec<Value>>) {}
        fn use_memo(&self, factory: &dyn Fn() -> Value) -> Value {
            factory()
        }
        fn use_callback(&self, callback: Value) -> Value {
            callback
        }
        fn use_ref(&self, initial: Value) -> Value {
            initial
        }
        fn use_context(&self, context: &ContextHandle) -> Value {
            self.calls.set(self.calls.get() + 1);
            context.current()
        }
        fn use_transition(&self) -> bool {
            false
        }
        fn use_deferred_value(&self, value: Value) -> Value {
            value
        }
        fn use_id(&self) -> String {
            "uid-test".to_string()
        }
        fn use_external_store(&self, get_snapshot: &dyn Fn() -> Value) -> Value {
            get_snapshot()
        }
    }

    #[test]
    fn test_swap_returns_previous() {
        let first: Rc<dyn Dispatcher> = Rc::new(CountingDispatcher {
            calls: Cell::new(0),
        });
        let second: Rc<dyn Dispatcher> = Rc::new(CountingDispatcher {
            calls: Cell::new(0),
        });

        assert!(swap_dispatcher(Some(first)).is_none());
        assert!(has_dispatcher());
        let prev = swap_dispatcher(Some(second));
        assert!(prev.is_some());
        let _ = swap_dispatcher(None);
        assert!(!has_dispatcher());
    }

    #[test]
    fn test_free_functions_delegate() {
        let dispatcher = Rc::new(CountingDispatcher {
            calls: Cell::new(0),
        });
        let installed: Rc<dyn Dispatcher> = dispatcher.clone();
        let _ = swap_dispatcher(Some(installed));

        use_state(Value::from(1));
        let ctx = ContextHandle::new("theme", Value::from("dark"));
        use_resource(&ctx);
        assert_eq!(dispatcher.calls.get(), 2);

        let _ = swap_dispatcher(None);
    }

    #[test]
    fn test_fallback_without_dispatcher() {
        let _ = swap_dispatcher(None);
        match use_state(Value::from(7)) {
            Value::Num(n) => assert_eq!(n, 7.0),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!use_transition());
    }

    #[test]
    fn test_hook_value_variants() {
        assert_eq!(
            HookState::State {
                value: Value::from(1)
            }
            .display_name(),
            "State"
        );
        assert!(HookState::Effect { deps: None }.value().is_none());
        match (HookState::Transition { pending: true }).value() {
            Some(Value::Bool(true)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}
