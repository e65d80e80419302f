use crate::node::NodeRef;

/// A CSS selector: a bare tag, or a descendant chain nested to the left.
/// Priority is the number of tag components, so longer chains cascade over
/// shorter ones.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Tag(String),
    Descendant {
        ancestor: Box<Selector>,
        descendant: Box<Selector>,
    },
}

impl Selector {
    pub fn tag(tag: String) -> Selector {
        Selector::Tag(tag)
    }

    pub fn descendant(ancestor: Selector, descendant: Selector) -> Selector {
        Selector::Descendant {
            ancestor: Box::new(ancestor),
            descendant: Box::new(descendant),
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            Selector::Tag(_) => 1,
            Selector::Descendant { ancestor, descendant } => {
                ancestor.priority() + descendant.priority()
            }
        }
    }

    pub fn matches(&self, node: &NodeRef) -> bool {
        match self {
            Selector::Tag(tag) => node.borrow().is_element(tag),
            Selector::Descendant { ancestor, descendant } => {
                if !descendant.matches(node) {
                    return false;
                }
                let mut current = node.borrow().parent_node();
                while let Some(candidate) = current {
                    if ancestor.matches(&candidate) {
                        return true;
                    }
                    current = candidate.borrow().parent_node();
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html_parser::HtmlParser;
    use crate::node::HtmlNode;

    fn find(root: &NodeRef, tag: &str) -> NodeRef {
        let mut flat = Vec::new();
        HtmlNode::tree_to_vec(root, &mut flat);
        flat.into_iter()
            .find(|node| node.borrow().is_element(tag))
            .expect("tag present")
    }

    #[test]
    fn tag_selector_matches_elements_only() {
        let root = HtmlParser::new("<p>hi</p>").parse();
        let p = find(&root, "p");
        assert!(Selector::tag("p".to_string()).matches(&p));
        assert!(!Selector::tag("b".to_string()).matches(&p));
        let text = p.borrow().children[0].clone();
        assert!(!Selector::tag("p".to_string()).matches(&text));
    }

    #[test]
    fn descendant_selector_requires_an_ancestor() {
        let root = HtmlParser::new("<ul><li><b>x</b></li></ul><b>y</b>").parse();
        let selector = Selector::descendant(
            Selector::tag("ul".to_string()),
            Selector::tag("b".to_string()),
        );
        let mut flat = Vec::new();
        HtmlNode::tree_to_vec(&root, &mut flat);
        let matches: Vec<NodeRef> = flat
            .into_iter()
            .filter(|node| node.borrow().is_element("b"))
            .collect();
        assert_eq!(matches.len(), 2);
        assert!(selector.matches(&matches[0]));
        assert!(!selector.matches(&matches[1]));
    }

    #[test]
    fn priority_counts_tag_components() {
        assert_eq!(Selector::tag("p".to_string()).priority(), 1);
        let chain = Selector::descendant(
            Selector::descendant(
                Selector::tag("ul".to_string()),
                Selector::tag("li".to_string()),
            ),
            Selector::tag("b".to_string()),
        );
        assert_eq!(chain.priority(), 3);
    }
}
