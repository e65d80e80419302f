use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Shared handle to a DOM node. Parents hold strong references to children;
/// the back-reference is weak so the tree never cycles.
pub type NodeRef = Rc<RefCell<HtmlNode>>;

#[derive(Debug, Clone)]
pub struct ElementData {
    pub tag: String,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum HtmlNodeType {
    Text(String),
    Element(ElementData),
}

/// A node in the DOM tree, plus the per-node state the rest of the pipeline
/// hangs off it: computed style, focus, and the edit cursor for inputs.
#[derive(Debug)]
pub struct HtmlNode {
    pub node_type: HtmlNodeType,
    pub parent: Option<Weak<RefCell<HtmlNode>>>,
    pub children: Vec<NodeRef>,
    pub style: HashMap<String, String>,
    pub is_focused: bool,
    pub cursor: Option<usize>,
    pub selection_start: Option<usize>,
    pub selection_end: Option<usize>,
}

impl HtmlNode {
    pub fn new_text(text: String, parent: Option<&NodeRef>) -> NodeRef {
        Self::wrap(HtmlNodeType::Text(text), parent)
    }

    pub fn new_element(
        tag: String,
        attributes: HashMap<String, String>,
        parent: Option<&NodeRef>,
    ) -> NodeRef {
        Self::wrap(HtmlNodeType::Element(ElementData { tag, attributes }), parent)
    }

    fn wrap(node_type: HtmlNodeType, parent: Option<&NodeRef>) -> NodeRef {
        Rc::new(RefCell::new(HtmlNode {
            node_type,
            parent: parent.map(Rc::downgrade),
            children: Vec::new(),
            style: HashMap::new(),
            is_focused: false,
            cursor: None,
            selection_start: None,
            selection_end: None,
        }))
    }

    pub fn parent_node(&self) -> Option<NodeRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// The element tag, or `None` for text nodes.
    pub fn tag(&self) -> Option<&str> {
        match &self.node_type {
            HtmlNodeType::Element(element) => Some(&element.tag),
            HtmlNodeType::Text(_) => None,
        }
    }

    pub fn is_element(&self, tag: &str) -> bool {
        self.tag() == Some(tag)
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        match &self.node_type {
            HtmlNodeType::Element(element) => element.attributes.get(name).cloned(),
            HtmlNodeType::Text(_) => None,
        }
    }

    pub fn set_attribute(&mut self, name: &str, value: String) {
        if let HtmlNodeType::Element(element) = &mut self.node_type {
            element.attributes.insert(name.to_string(), value);
        }
    }

    /// Flattens the subtree rooted at `node` in document order.
    pub fn tree_to_vec(node: &NodeRef, out: &mut Vec<NodeRef>) {
        out.push(node.clone());
        let children = node.borrow().children.clone();
        for child in &children {
            Self::tree_to_vec(child, out);
        }
    }
}

impl fmt::Display for HtmlNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_type {
            HtmlNodeType::Text(text) => write!(f, "{:?}", text),
            HtmlNodeType::Element(element) => write!(f, "<{}>", element.tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_back_reference_is_weak() {
        let root = HtmlNode::new_element("html".to_string(), HashMap::new(), None);
        let child = HtmlNode::new_text("hi".to_string(), Some(&root));
        root.borrow_mut().children.push(child.clone());

        assert!(Rc::ptr_eq(&child.borrow().parent_node().unwrap(), &root));
        // Dropping the only strong handle to the root must free it even
        // though the child still points back at it.
        drop(root);
        assert!(child.borrow().parent_node().is_none());
    }

    #[test]
    fn tree_to_vec_is_document_order() {
        let root = HtmlNode::new_element("html".to_string(), HashMap::new(), None);
        let body = HtmlNode::new_element("body".to_string(), HashMap::new(), Some(&root));
        let text = HtmlNode::new_text("x".to_string(), Some(&body));
        body.borrow_mut().children.push(text.clone());
        root.borrow_mut().children.push(body.clone());

        let mut flat = Vec::new();
        HtmlNode::tree_to_vec(&root, &mut flat);
        assert_eq!(flat.len(), 3);
        assert!(Rc::ptr_eq(&flat[0], &root));
        assert!(Rc::ptr_eq(&flat[1], &body));
        assert!(Rc::ptr_eq(&flat[2], &text));
    }
}
