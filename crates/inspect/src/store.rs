//! Process-wide shared state, keyed by fixed names.
//!
//! The inspector's cross-call state (identity table, id sequence,
//! function registry, provenance offset cache) lives in named slots of
//! a single thread-local store: one execution context, no locks. Slots
//! default-initialize on first access.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use ahash::AHashMap;
use host::value::FuncVal;

pub const KEY_IDENTITY: &str = "inspect.identity";
pub const KEY_SEQUENCE: &str = "inspect.sequence";
pub const KEY_FUNCTIONS: &str = "inspect.functions";
pub const KEY_ANCESTOR_OFFSET: &str = "inspect.ancestor-offset";

thread_local! {
    static STORE: RefCell<AHashMap<&'static str, Box<dyn Any>>> =
        RefCell::new(AHashMap::new());
}

/// Run `f` with mutable access to the named slot.
pub fn with_slot<T: Default + 'static, R>(name: &'static str, f: impl FnOnce(&mut T) -> R) -> R {
    STORE.with(|store| {
        let mut store = store.borrow_mut();
        let slot = store
            .entry(name)
            .or_insert_with(|| Box::<T>::default());
        if !slot.is::<T>() {
            *slot = Box::<T>::default();
        }
        let value = slot
            .downcast_mut::<T>()
            .expect("slot type is fixed by its key");
        f(value)
    })
}

/// Most-recently-described functions, bounded ring.
///
/// Each registration mints a monotonic reference id; when the ring is
/// full the oldest entry is silently evicted, so the size never
/// exceeds the cap after any single registration.
pub struct FunctionRegistry {
    cap: usize,
    next_ref: u32,
    entries: VecDeque<(u32, Rc<FuncVal>)>,
}

pub const DEFAULT_FUNCTION_CAP: usize = 64;

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_cap(DEFAULT_FUNCTION_CAP)
    }
}

impl FunctionRegistry {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            next_ref: 1,
            entries: VecDeque::new(),
        }
    }

    pub fn register(&mut self, function: Rc<FuncVal>) -> u32 {
        let ref_id = self.next_ref;
        self.next_ref += 1;
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back((ref_id, function));
        ref_id
    }

    pub fn get(&self, ref_id: u32) -> Option<Rc<FuncVal>> {
        self.entries
            .iter()
            .find(|(id, _)| *id == ref_id)
            .map(|(_, function)| function.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
