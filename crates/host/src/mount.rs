//! Mount machinery.
//!
//! Builds live trees the way the runtime does: composite nodes run
//! their render functions against the mount dispatcher, which appends
//! state cells in call order. `rerender` produces the next generation,
//! twinned to the previous one through the alternate links; the
//! `Mounted` container keeps both buffers alive.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use smallvec::SmallVec;

use crate::document::{Document, Element, Rect};
use crate::hooks::{self, ContextHandle, Dispatcher, HookState, StateCell};
use crate::node::{Component, NodeKind, TreeNode};
use crate::stack;
use crate::value::Value;

/// A mounted tree: the current buffer plus the previous render pass.
pub struct Mounted {
    pub root: Rc<TreeNode>,
    pub previous: Option<Rc<TreeNode>>,
}

/// Dispatcher installed while a component renders. Reuses the twin's
/// cell values so state survives across passes.
struct MountDispatcher {
    prev_cursor: RefCell<Option<Rc<StateCell>>>,
    cells: RefCell<Vec<Rc<StateCell>>>,
    next_id: Cell<u32>,
}

impl MountDispatcher {
    fn new(prev_head: Option<Rc<StateCell>>) -> Self {
        Self {
            prev_cursor: RefCell::new(prev_head),
            cells: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    fn take_prev(&self) -> Option<HookState> {
        let mut cursor = self.prev_cursor.borrow_mut();
        let current = cursor.take();
        if let Some(cell) = &current {
            *cursor = cell.next.borrow().clone();
        }
        current.map(|cell| cell.hook.borrow().clone())
    }

    fn push(&self, hook: HookState) {
        self.cells.borrow_mut().push(StateCell::new(hook));
    }

    fn into_list(&self) -> Option<Rc<StateCell>> {
        let cells = self.cells.borrow();
        for pair in cells.windows(2) {
            *pair[0].next.borrow_mut() = Some(pair[1].clone());
        }
        cells.first().cloned()
    }
}

impl Dispatcher for MountDispatcher {
    fn use_state(&self, initial: Value) -> Value {
        let value = match self.take_prev() {
            Some(HookState::State { value }) => value,
            _ => initial,
        };
        self.push(HookState::State {
            value: value.clone(),
        });
        value
    }

    fn use_reducer(&self, _reducer: Value, initial: Value) -> Value {
        let value = match self.take_prev() {
            Some(HookState::Reducer { value }) => value,
            _ => initial,
        };
        self.push(HookState::Reducer {
            value: value.clone(),
        });
        value
    }

    fn use_effect(&self, deps: Option<Vec<Value>>) {
        self.take_prev();
        self.push(HookState::Effect { deps });
    }

    fn use_layout_effect(&self, deps: Option<Vec<Value>>) {
        self.take_prev();
        self.push(HookState::LayoutEffect { deps });
    }

    fn use_memo(&self, factory: &dyn Fn() -> Value) -> Value {
        self.take_prev();
        let value = factory();
        self.push(HookState::Memo {
            value: value.clone(),
        });
        value
    }

    fn use_callback(&self, callback: Value) -> Value {
        self.take_prev();
        self.push(HookState::Callback {
            value: callback.clone(),
        });
        callback
    }

    fn use_ref(&self, initial: Value) -> Value {
        let value = match self.take_prev() {
            Some(HookState::Ref { value }) => value,
            _ => initial,
        };
        self.push(HookState::Ref {
            value: value.clone(),
        });
        value
    }

    fn use_context(&self, context: &ContextHandle) -> Value {
        self.take_prev();
        let value = context.current();
        self.push(HookState::Context {
            value: value.clone(),
        });
        value
    }

    fn use_transition(&self) -> bool {
        let pending = match self.take_prev() {
            Some(HookState::Transition { pending }) => pending,
            _ => false,
        };
        self.push(HookState::Transition { pending });
        pending
    }

    fn use_deferred_value(&self, value: Value) -> Value {
        self.take_prev();
        self.push(HookState::DeferredValue {
            value: value.clone(),
        });
        value
    }

    fn use_id(&self) -> String {
        let value = match self.take_prev() {
            Some(HookState::Id { value }) => value,
            _ => {
                let id = self.next_id.replace(self.next_id.get() + 1);
                format!("uid-{id}")
            }
        };
        self.push(HookState::Id {
            value: value.clone(),
        });
        value
    }

    fn use_external_store(&self, get_snapshot: &dyn Fn() -> Value) -> Value {
        self.take_prev();
        let value = get_snapshot();
        self.push(HookState::ExternalStore {
            value: value.clone(),
        });
        value
    }
}

/// Run one composite node's render function, rebuilding its cell list.
fn render_node(node: &Rc<TreeNode>) {
    if !node.kind.uses_dispatcher() {
        return;
    }
    let Some(component) = node.component.clone() else {
        return;
    };
    let Some(render) = component.render_fn() else {
        return;
    };
    let prev_head = node
        .alternate()
        .and_then(|twin| twin.state_head.borrow().clone());

    let dispatcher = Rc::new(MountDispatcher::new(prev_head));
    let installed: Rc<dyn Dispatcher> = dispatcher.clone();
    let previous = hooks::swap_dispatcher(Some(installed));
    {
        let _frame = stack::frame(&component.name, &component.file, component.line, component.column);
        let props = node.props.borrow().clone();
        (*render)(&props);
    }
    let _ = hooks::swap_dispatcher(previous);
    *node.state_head.borrow_mut() = dispatcher.into_list();
}

fn render_tree(node: &Rc<TreeNode>) {
    render_node(node);
    for child in node.children() {
        render_tree(&child);
    }
}

/// Mount a built tree: run every render function top-down.
pub fn mount(root: Rc<TreeNode>) -> Mounted {
    render_tree(&root);
    Mounted {
        root,
        previous: None,
    }
}

fn clone_generation(node: &Rc<TreeNode>) -> Rc<TreeNode> {
    let next = TreeNode::new(node.kind, node.component.clone(), node.element.clone());
    *next.props.borrow_mut() = node.props.borrow().clone();
    *next.class_state.borrow_mut() = node.class_state.borrow().clone();
    TreeNode::link_alternates(node, &next);
    if let Some(element) = &node.element {
        element.set_tree_node(&next);
    }
    for child in node.children() {
        let next_child = clone_generation(&child);
        TreeNode::attach_child(&next, &next_child);
    }
    next
}

/// Produce the next render generation. The old buffer becomes
/// `previous`; every new node is twinned to its predecessor and element
/// backlinks point at the new generation.
pub fn rerender(mounted: &mut Mounted) {
    let next = clone_generation(&mounted.root);
    render_tree(&next);
    mounted.previous = Some(std::mem::replace(&mut mounted.root, next));
}

/// Element description for [`TreeBuilder::element`].
pub struct ElementSpec {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attributes: SmallVec<[(String, String); 4]>,
    bounds: Rect,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            id: None,
            classes: Vec::new(),
            attributes: SmallVec::new(),
            bounds: Rect::default(),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }

    fn build(self) -> Rc<Element> {
        Element::build(&self.tag, self.id, self.classes, self.attributes, self.bounds)
    }
}

/// Assembles tree shapes against a document.
pub struct TreeBuilder<'a> {
    document: &'a Document,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn root(&self) -> Rc<TreeNode> {
        TreeNode::new(NodeKind::HostRoot, None, None)
    }

    pub fn component(
        &self,
        parent: &Rc<TreeNode>,
        component: &Rc<Component>,
        props: Value,
    ) -> Rc<TreeNode> {
        self.composite(parent, NodeKind::FunctionComponent, component, props)
    }

    pub fn composite(
        &self,
        parent: &Rc<TreeNode>,
        kind: NodeKind,
        component: &Rc<Component>,
        props: Value,
    ) -> Rc<TreeNode> {
        let node = TreeNode::new(kind, Some(component.clone()), None);
        *node.props.borrow_mut() = props;
        TreeNode::attach_child(parent, &node);
        node
    }

    pub fn fragment(&self, parent: &Rc<TreeNode>) -> Rc<TreeNode> {
        let node = TreeNode::new(NodeKind::Fragment, None, None);
        TreeNode::attach_child(parent, &node);
        node
    }

    pub fn element(&self, parent: &Rc<TreeNode>, spec: ElementSpec) -> Rc<TreeNode> {
        let element = spec.build();
        match nearest_ancestor_element(parent) {
            Some(parent_el) => Element::append(&parent_el, &element),
            // secondary mounts land under the existing document root
            None => match self.document.root() {
                Some(existing) => Element::append(&existing, &element),
                None => self.document.set_root(&element),
            },
        }
        self.document.register(&element);

        let node = TreeNode::new(NodeKind::HostElement, None, Some(element.clone()));
        TreeNode::attach_child(parent, &node);
        element.set_tree_node(&node);
        node
    }

    pub fn text(&self, parent: &Rc<TreeNode>, value: &str) -> Rc<TreeNode> {
        let node = TreeNode::new(NodeKind::HostText, None, None);
        *node.props.borrow_mut() = Value::from(value);
        TreeNode::attach_child(parent, &node);
        node
    }

    pub fn mount(&self, root: Rc<TreeNode>) -> Mounted {
        mount(root)
    }
}

fn nearest_ancestor_element(node: &Rc<TreeNode>) -> Option<Rc<Element>> {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if let Some(element) = &n.element {
            return Some(element.clone());
        }
        current = n.parent();
    }
    None
}
