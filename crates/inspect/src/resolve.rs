//! Root and target resolution.
//!
//! Turns a caller's locator (screen point, selector, or a previously
//! known stable id) into a live tree node and the root above it. Stale
//! locators are expected: resolution prefers the direct route but falls
//! back to scanning the whole document before giving up, so the tool
//! stays usable after the page has moved on.

use std::rc::Rc;

use host::document::{Document, Element};
use host::node::{NodeKind, TreeNode};
use tracing::{debug, warn};

use crate::error::{InspectError, Result};
use crate::identity;
use crate::types::Locator;

/// Element-ancestor hops tried before the document-wide scan.
const MAX_ELEMENT_HOPS: usize = 64;

/// Parent-link hops tried while walking to a root.
const MAX_ROOT_HOPS: usize = 512;

/// Traversal steps spent checking one tree for an id.
const MAX_SCAN_STEPS: usize = 50_000;

#[derive(Debug)]
pub struct Resolved {
    pub target: Option<Rc<Element>>,
    pub nearest: Rc<TreeNode>,
    pub root: Rc<TreeNode>,
}

/// Resolve a locator to a live node and its root.
pub fn resolve(document: &Document, locator: &Locator) -> Result<Resolved> {
    let target = locate_element(document, locator);
    let nearest = match &target {
        Some(element) => node_near(element).or_else(|| scan_for_any_node(document)),
        None => scan_for_any_node(document),
    }
    .ok_or(InspectError::MissingNearest)?;
    let root = root_of(&nearest)?;
    Ok(Resolved {
        target,
        nearest,
        root,
    })
}

/// Resolution for a caller that only knows a stable id. The resolved
/// root is a heuristic: ids are unique per logical root, so when the
/// current guess does not contain the id, every distinct root in the
/// document is checked and the matching one substituted.
pub fn resolve_for_id(document: &Document, locator: &Locator, id: &str) -> Result<Resolved> {
    let resolved = resolve(document, locator)?;
    if tree_contains_id(&resolved.root, id) {
        return Ok(resolved);
    }
    for root in distinct_roots(document) {
        if tree_contains_id(&root, id) {
            debug!(id, "substituted the root containing the requested id");
            return Ok(Resolved {
                target: resolved.target,
                nearest: root.clone(),
                root,
            });
        }
    }
    // no root owns the id; the caller reports it as unknown
    Ok(resolved)
}

fn locate_element(document: &Document, locator: &Locator) -> Option<Rc<Element>> {
    if let Some((x, y)) = locator.point {
        if let Some(element) = document.element_at(x, y) {
            return Some(element);
        }
    }
    locator
        .selector
        .as_deref()
        .and_then(|selector| document.query(selector))
}

/// Walk outward from an element to any node reachable from it.
fn node_near(element: &Rc<Element>) -> Option<Rc<TreeNode>> {
    let mut current = Some(element.clone());
    for _ in 0..MAX_ELEMENT_HOPS {
        let el = current?;
        if let Some(node) = el.tree_node() {
            return Some(node);
        }
        current = el.parent();
    }
    None
}

/// Last resort: any live node anywhere in the document.
fn scan_for_any_node(document: &Document) -> Option<Rc<TreeNode>> {
    warn!("no node near the requested target; scanning the whole document");
    document
        .all_elements()
        .into_iter()
        .find_map(|element| element.tree_node())
}

/// Walk parent links to the root-tagged ancestor. A tree without a
/// root tag roots at its topmost node; exhausting the hop bound means
/// the parent chain is corrupt.
fn root_of(node: &Rc<TreeNode>) -> Result<Rc<TreeNode>> {
    let mut current = node.clone();
    for _ in 0..MAX_ROOT_HOPS {
        if current.kind == NodeKind::HostRoot {
            return Ok(current);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return Ok(current),
        }
    }
    Err(InspectError::MissingRoot)
}

fn tree_contains_id(root: &Rc<TreeNode>, id: &str) -> bool {
    let mut steps = 0usize;
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        steps += 1;
        if steps > MAX_SCAN_STEPS {
            return false;
        }
        if identity::peek(&node).as_deref() == Some(id) {
            return true;
        }
        for child in node.children().into_iter().rev() {
            stack.push(child);
        }
    }
    false
}

/// Every distinct root reachable from the document's elements.
fn distinct_roots(document: &Document) -> Vec<Rc<TreeNode>> {
    let mut roots: Vec<Rc<TreeNode>> = Vec::new();
    for element in document.all_elements() {
        let Some(node) = element.tree_node() else {
            continue;
        };
        let Ok(root) = root_of(&node) else {
            continue;
        };
        if !roots.iter().any(|known| Rc::ptr_eq(known, &root)) {
            roots.push(root);
        }
    }
    roots
}
