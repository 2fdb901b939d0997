//! Dynamic runtime values.
//!
//! Props and hook state are dynamically typed. Containers are shared
//! through `Rc` so values can alias and form cycles; object identity is
//! the container pointer. `Lazy` models property getters that can fail
//! on access.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::document::Element;
use crate::error::Result;

/// A function reference. Only the display name ever crosses the
/// inspection boundary; the body does not.
pub struct FuncVal {
    pub name: String,
}

impl fmt::Debug for FuncVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}()", self.name)
    }
}

/// Deferred property read.
pub struct LazyProp {
    read: Box<dyn Fn() -> Result<Value>>,
}

impl LazyProp {
    pub fn new(read: impl Fn() -> Result<Value> + 'static) -> Self {
        Self {
            read: Box::new(read),
        }
    }

    pub fn get(&self) -> Result<Value> {
        (self.read)()
    }
}

/// The host runtime's dynamic value type.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Func(Rc<FuncVal>),
    Seq(Rc<RefCell<Vec<Value>>>),
    Record(Rc<RefCell<Vec<(String, Value)>>>),
    Map(Rc<RefCell<Vec<(Value, Value)>>>),
    Set(Rc<RefCell<Vec<Value>>>),
    Lazy(Rc<LazyProp>),
    /// Live UI leaf handle.
    Element(Rc<Element>),
    /// The host's top-level surface handle.
    Window,
}

impl Value {
    pub fn func(name: impl Into<String>) -> Self {
        Value::Func(Rc::new(FuncVal { name: name.into() }))
    }

    pub fn seq(items: Vec<Value>) -> Self {
        Value::Seq(Rc::new(RefCell::new(items)))
    }

    pub fn record(entries: Vec<(String, Value)>) -> Self {
        Value::Record(Rc::new(RefCell::new(entries)))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn set(items: Vec<Value>) -> Self {
        Value::Set(Rc::new(RefCell::new(items)))
    }

    pub fn lazy(read: impl Fn() -> Result<Value> + 'static) -> Self {
        Value::Lazy(Rc::new(LazyProp::new(read)))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Num(_) | Value::Str(_)
        )
    }

    /// Pointer identity of the backing container, if the value has one.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Seq(items) => Some(Rc::as_ptr(items) as usize),
            Value::Record(entries) => Some(Rc::as_ptr(entries) as usize),
            Value::Map(entries) => Some(Rc::as_ptr(entries) as usize),
            Value::Set(items) => Some(Rc::as_ptr(items) as usize),
            _ => None,
        }
    }

    /// Host-level type name, used in dehydration markers.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Func(_) => "function",
            Value::Seq(_) => "array",
            Value::Record(_) => "object",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Lazy(_) => "getter",
            Value::Element(_) => "element",
            Value::Window => "window",
        }
    }

    /// Current entry count for container values.
    pub fn size(&self) -> Option<usize> {
        match self {
            Value::Seq(items) => Some(items.borrow().len()),
            Value::Record(entries) => Some(entries.borrow().len()),
            Value::Map(entries) => Some(entries.borrow().len()),
            Value::Set(items) => Some(items.borrow().len()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Num(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Num(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

// Shallow by intent: values can be cyclic.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Num(n) => write!(f, "Num({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Func(v) => write!(f, "Func({})", v.name),
            Value::Seq(items) => match items.try_borrow() {
                Ok(items) => write!(f, "Seq(len={})", items.len()),
                Err(_) => write!(f, "Seq(<borrowed>)"),
            },
            Value::Record(entries) => match entries.try_borrow() {
                Ok(entries) => write!(f, "Record(keys={})", entries.len()),
                Err(_) => write!(f, "Record(<borrowed>)"),
            },
            Value::Map(entries) => match entries.try_borrow() {
                Ok(entries) => write!(f, "Map(entries={})", entries.len()),
                Err(_) => write!(f, "Map(<borrowed>)"),
            },
            Value::Set(items) => match items.try_borrow() {
                Ok(items) => write!(f, "Set(len={})", items.len()),
                Err(_) => write!(f, "Set(<borrowed>)"),
            },
            Value::Lazy(_) => write!(f, "Lazy"),
            Value::Element(el) => write!(f, "Element(<{}>)", el.tag),
            Value::Window => write!(f, "Window"),
        }
    }
}
