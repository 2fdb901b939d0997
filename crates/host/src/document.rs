//! Host document: the leaf element tree the composite tree renders
//! into.
//!
//! Elements are what the inspector's callers can actually point at
//! (screen coordinates, selectors). Each element keeps a weak backlink
//! to the tree node that rendered it; the backlink is repointed on
//! every render pass, so it always refers to the current generation.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::node::TreeNode;

/// Deepest element chain the walkers will follow.
const MAX_ELEMENT_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// One leaf element.
pub struct Element {
    pub tag: String,
    pub id_attr: Option<String>,
    pub class_list: Vec<String>,
    pub attributes: SmallVec<[(String, String); 4]>,
    pub bounds: RefCell<Rect>,
    pub parent: RefCell<Weak<Element>>,
    pub children: RefCell<Vec<Rc<Element>>>,
    node: RefCell<Weak<TreeNode>>,
}

impl Element {
    pub fn new(tag: &str) -> Rc<Self> {
        Rc::new(Self {
            tag: tag.to_string(),
            id_attr: None,
            class_list: Vec::new(),
            attributes: SmallVec::new(),
            bounds: RefCell::new(Rect::default()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            node: RefCell::new(Weak::new()),
        })
    }

    pub fn build(
        tag: &str,
        id_attr: Option<String>,
        class_list: Vec<String>,
        attributes: SmallVec<[(String, String); 4]>,
        bounds: Rect,
    ) -> Rc<Self> {
        Rc::new(Self {
            tag: tag.to_string(),
            id_attr,
            class_list,
            attributes,
            bounds: RefCell::new(bounds),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            node: RefCell::new(Weak::new()),
        })
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn parent(&self) -> Option<Rc<Element>> {
        self.parent.borrow().upgrade()
    }

    /// Current-generation tree node that rendered this element.
    pub fn tree_node(&self) -> Option<Rc<TreeNode>> {
        self.node.borrow().upgrade()
    }

    pub fn set_tree_node(&self, node: &Rc<TreeNode>) {
        *self.node.borrow_mut() = Rc::downgrade(node);
    }

    pub fn append(parent: &Rc<Element>, child: &Rc<Element>) {
        *child.parent.borrow_mut() = Rc::downgrade(parent);
        parent.children.borrow_mut().push(child.clone());
    }

    /// Selector for this element alone: `tag#id.class`.
    pub fn selector(&self) -> String {
        let mut selector = self.tag.clone();
        if let Some(id) = &self.id_attr {
            selector.push('#');
            selector.push_str(id);
        }
        for class in &self.class_list {
            selector.push('.');
            selector.push_str(class);
        }
        selector
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Element(<{}>)", self.selector())
    }
}

/// `a > b > c` path from the document root. Elements with an id
/// collapse to `#id`, which is already unique enough for navigation.
pub fn path_for(element: &Rc<Element>) -> String {
    let mut path = Vec::new();
    let mut current = Some(element.clone());
    for _ in 0..MAX_ELEMENT_DEPTH {
        let Some(el) = current else { break };
        match &el.id_attr {
            Some(id) => path.push(format!("#{id}")),
            None => path.push(el.tag.to_lowercase()),
        }
        current = el.parent();
    }
    path.reverse();
    path.join(" > ")
}

/// Hop count from `target` up to `ancestor`. `Some(0)` when they are
/// the same element, `None` when `target` is not in `ancestor`'s
/// subtree.
pub fn containment_distance(ancestor: &Rc<Element>, target: &Rc<Element>) -> Option<u32> {
    let mut current = Some(target.clone());
    for hops in 0..MAX_ELEMENT_DEPTH as u32 {
        let el = current?;
        if Rc::ptr_eq(&el, ancestor) {
            return Some(hops);
        }
        current = el.parent();
    }
    None
}

struct SelectorParts {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl SelectorParts {
    fn parse(selector: &str) -> Option<Self> {
        let selector = selector.trim();
        if selector.is_empty() {
            return None;
        }
        let mut parts = Self {
            tag: None,
            id: None,
            classes: Vec::new(),
        };
        let mut rest = selector;
        if !rest.starts_with(['#', '.']) {
            let end = rest.find(['#', '.']).unwrap_or(rest.len());
            parts.tag = Some(rest[..end].to_lowercase());
            rest = &rest[end..];
        }
        while !rest.is_empty() {
            let (marker, tail) = rest.split_at(1);
            let end = tail.find(['#', '.']).unwrap_or(tail.len());
            let name = &tail[..end];
            if name.is_empty() {
                return None;
            }
            match marker {
                "#" => parts.id = Some(name.to_string()),
                "." => parts.classes.push(name.to_string()),
                _ => return None,
            }
            rest = &tail[end..];
        }
        Some(parts)
    }

    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id_attr.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes
            .iter()
            .all(|class| element.class_list.iter().any(|c| c == class))
    }
}

/// The element tree plus the lookups request resolution needs.
#[derive(Default)]
pub struct Document {
    root: RefCell<Option<Rc<Element>>>,
    by_id: RefCell<AHashMap<String, Weak<Element>>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_root(&self, element: &Rc<Element>) {
        *self.root.borrow_mut() = Some(element.clone());
    }

    pub fn root(&self) -> Option<Rc<Element>> {
        self.root.borrow().clone()
    }

    /// Index an element for id lookups.
    pub fn register(&self, element: &Rc<Element>) {
        if let Some(id) = &element.id_attr {
            self.by_id
                .borrow_mut()
                .insert(id.clone(), Rc::downgrade(element));
        }
    }

    /// Every element in the document, pre-order.
    pub fn all_elements(&self) -> Vec<Rc<Element>> {
        let mut out = Vec::new();
        let mut stack: Vec<Rc<Element>> = self.root().into_iter().collect();
        while let Some(element) = stack.pop() {
            let children = element.children.borrow().clone();
            out.push(element);
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Deepest element whose bounds contain the point. Later siblings
    /// win ties, matching paint order.
    pub fn element_at(&self, x: f64, y: f64) -> Option<Rc<Element>> {
        let mut best: Option<(usize, Rc<Element>)> = None;
        let mut stack: Vec<(Rc<Element>, usize)> =
            self.root().into_iter().map(|el| (el, 0)).collect();
        while let Some((element, depth)) = stack.pop() {
            if element.bounds.borrow().contains_point(x, y) {
                let replace = best.as_ref().is_none_or(|(d, _)| depth >= *d);
                if replace {
                    best = Some((depth, element.clone()));
                }
            }
            let children = element.children.borrow().clone();
            for child in children.into_iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        best.map(|(_, element)| element)
    }

    /// First element matching a `tag#id.class` compound selector, in
    /// pre-order. `#id` alone goes through the id index.
    pub fn query(&self, selector: &str) -> Option<Rc<Element>> {
        let parts = SelectorParts::parse(selector)?;
        if parts.tag.is_none() && parts.classes.is_empty() {
            if let Some(id) = &parts.id {
                if let Some(element) = self.by_id.borrow().get(id).and_then(Weak::upgrade) {
                    return Some(element);
                }
                return None;
            }
        }
        self.all_elements()
            .into_iter()
            .find(|el| parts.matches(el))
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Document(root={:?})", self.root.borrow())
    }
}
