//! Tree nodes.
//!
//! One `TreeNode` per rendered unit. The runtime double-buffers: each
//! render pass builds a fresh generation of nodes, twinned to the
//! previous generation through the `alternate` link. Both generations
//! stay alive while mounted (the [`Mounted`](crate::mount::Mounted)
//! container owns them); the links themselves are weak so nothing else
//! can keep a discarded tree around.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::document::Element;
use crate::hooks::StateCell;
use crate::value::Value;

/// Longest sibling/state chain the accessors will follow. A corrupt
/// link cycle stops here instead of hanging the reader.
pub const MAX_CHAIN: usize = 4096;

/// Kind tag for a rendered unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    FunctionComponent,
    ClassComponent,
    ForwardRef,
    MemoComponent,
    SimpleMemoComponent,
    HostRoot,
    HostElement,
    HostText,
    Fragment,
    ContextProvider,
}

impl NodeKind {
    /// Composite kinds that surface in the inspector.
    pub fn is_inspectable(self) -> bool {
        matches!(
            self,
            NodeKind::FunctionComponent
                | NodeKind::ClassComponent
                | NodeKind::ForwardRef
                | NodeKind::MemoComponent
                | NodeKind::SimpleMemoComponent
        )
    }

    /// Kinds whose local state comes from dispatcher calls.
    pub fn uses_dispatcher(self) -> bool {
        matches!(
            self,
            NodeKind::FunctionComponent
                | NodeKind::ForwardRef
                | NodeKind::MemoComponent
                | NodeKind::SimpleMemoComponent
        )
    }

    pub fn is_host_leaf(self) -> bool {
        matches!(self, NodeKind::HostElement | NodeKind::HostText)
    }
}

/// Render function of a composite component. Children are declared
/// structurally; the closure only runs hooks against the current
/// dispatcher.
pub type RenderFn = Rc<dyn Fn(&Value)>;

/// Type reference for a composite node: display name, definition site,
/// and the render function when one is registered.
pub struct Component {
    pub name: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub render: RefCell<Option<RenderFn>>,
}

impl Component {
    pub fn new(name: &str, file: &str, line: u32, column: u32) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            file: file.to_string(),
            line,
            column,
            render: RefCell::new(None),
        })
    }

    pub fn with_render(
        name: &str,
        file: &str,
        line: u32,
        column: u32,
        render: impl Fn(&Value) + 'static,
    ) -> Rc<Self> {
        let component = Self::new(name, file, line, column);
        *component.render.borrow_mut() = Some(Rc::new(render));
        component
    }

    pub fn render_fn(&self) -> Option<RenderFn> {
        self.render.borrow().clone()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({} @ {}:{})", self.name, self.file, self.line)
    }
}

/// One element of the live tree. All fields are runtime-owned and may
/// change between reads; readers tolerate whatever they find.
pub struct TreeNode {
    pub kind: NodeKind,
    pub component: Option<Rc<Component>>,
    pub element: Option<Rc<Element>>,
    pub props: RefCell<Value>,
    /// Singly linked state-cell list, composite function nodes.
    pub state_head: RefCell<Option<Rc<StateCell>>>,
    /// Opaque state blob, class nodes.
    pub class_state: RefCell<Value>,
    pub parent: RefCell<Weak<TreeNode>>,
    pub child: RefCell<Option<Rc<TreeNode>>>,
    pub sibling: RefCell<Option<Rc<TreeNode>>>,
    /// Twin from the previous render pass.
    pub alternate: RefCell<Weak<TreeNode>>,
}

impl TreeNode {
    pub fn new(
        kind: NodeKind,
        component: Option<Rc<Component>>,
        element: Option<Rc<Element>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            kind,
            component,
            element,
            props: RefCell::new(Value::Null),
            state_head: RefCell::new(None),
            class_state: RefCell::new(Value::Null),
            parent: RefCell::new(Weak::new()),
            child: RefCell::new(None),
            sibling: RefCell::new(None),
            alternate: RefCell::new(Weak::new()),
        })
    }

    pub fn display_name(&self) -> String {
        if let Some(component) = &self.component {
            return component.name.clone();
        }
        match self.kind {
            NodeKind::HostElement => self
                .element
                .as_ref()
                .map(|el| el.tag.clone())
                .unwrap_or_else(|| "#element".to_string()),
            NodeKind::HostText => "#text".to_string(),
            NodeKind::HostRoot => "#root".to_string(),
            NodeKind::Fragment => "#fragment".to_string(),
            NodeKind::ContextProvider => "Context.Provider".to_string(),
            _ => "Anonymous".to_string(),
        }
    }

    pub fn parent(&self) -> Option<Rc<TreeNode>> {
        self.parent.borrow().upgrade()
    }

    pub fn alternate(&self) -> Option<Rc<TreeNode>> {
        self.alternate.borrow().upgrade()
    }

    /// Children in sibling order, chain-bounded.
    pub fn children(&self) -> Vec<Rc<TreeNode>> {
        let mut out = Vec::new();
        let mut current = self.child.borrow().clone();
        while let Some(node) = current {
            if out.len() >= MAX_CHAIN {
                break;
            }
            current = node.sibling.borrow().clone();
            out.push(node);
        }
        out
    }

    /// State cells in list order, capped at `cap`.
    pub fn state_cells(&self, cap: usize) -> Vec<Rc<StateCell>> {
        let mut out = Vec::new();
        let mut current = self.state_head.borrow().clone();
        while let Some(cell) = current {
            if out.len() >= cap {
                break;
            }
            current = cell.next.borrow().clone();
            out.push(cell);
        }
        out
    }

    /// Append `child` to `parent`'s child/sibling chain.
    pub fn attach_child(parent: &Rc<TreeNode>, child: &Rc<TreeNode>) {
        *child.parent.borrow_mut() = Rc::downgrade(parent);
        let first = parent.child.borrow().clone();
        match first {
            None => {
                *parent.child.borrow_mut() = Some(child.clone());
            }
            Some(first) => {
                let mut last = first;
                for _ in 0..MAX_CHAIN {
                    let next = last.sibling.borrow().clone();
                    match next {
                        Some(node) => last = node,
                        None => break,
                    }
                }
                *last.sibling.borrow_mut() = Some(child.clone());
            }
        }
    }

    /// Twin two nodes representing the same logical unit across
    /// adjacent render passes.
    pub fn link_alternates(previous: &Rc<TreeNode>, next: &Rc<TreeNode>) {
        *previous.alternate.borrow_mut() = Rc::downgrade(next);
        *next.alternate.borrow_mut() = Rc::downgrade(previous);
    }
}

impl fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeNode({:?}, {})", self.kind, self.display_name())
    }
}
