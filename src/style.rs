use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::css_parser::{CssParser, Rule};
use crate::node::NodeRef;

lazy_static! {
    /// The inherited properties and their root defaults. Everything else is
    /// per-element only.
    pub static ref INHERITED_PROPERTIES: HashMap<&'static str, &'static str> = HashMap::from([
        ("font-size", "16px"),
        ("font-style", "normal"),
        ("font-weight", "normal"),
        ("color", "black"),
        ("text-align", "left"),
    ]);
}

/// Sort key for the cascade: rules are applied in ascending priority, with
/// document order breaking ties via a stable sort.
pub fn cascade_priority(rule: &Rule) -> i32 {
    rule.0.priority()
}

/// Computes styles for `node` and its subtree in document order. `rules`
/// must already be sorted by `cascade_priority`; the inline `style`
/// attribute is applied last and wins over any rule.
pub fn style(node: &NodeRef, rules: &[Rule]) {
    let parent = node.borrow().parent_node();
    let mut computed = HashMap::new();

    for (&property, &default) in INHERITED_PROPERTIES.iter() {
        let value = parent
            .as_ref()
            .and_then(|p| p.borrow().style.get(property).cloned())
            .unwrap_or_else(|| default.to_string());
        computed.insert(property.to_string(), value);
    }

    for (selector, declarations) in rules {
        if selector.matches(node) {
            for (property, value) in declarations {
                computed.insert(property.clone(), value.clone());
            }
        }
    }

    if let Some(inline) = node.borrow().attribute("style") {
        for (property, value) in CssParser::new(&inline).body() {
            computed.insert(property, value);
        }
    }

    // Percentage font sizes resolve against the parent's computed pixels.
    if let Some(percent) = computed
        .get("font-size")
        .and_then(|size| size.strip_suffix('%'))
        .and_then(|digits| digits.parse::<f32>().ok())
    {
        let parent_px = parent
            .as_ref()
            .and_then(|p| p.borrow().style.get("font-size").cloned())
            .unwrap_or_else(|| INHERITED_PROPERTIES["font-size"].to_string());
        let parent_px = parent_px.trim_end_matches("px").parse::<f32>().unwrap_or(16.0);
        computed.insert(
            "font-size".to_string(),
            format!("{}px", parent_px * percent / 100.0),
        );
    }

    node.borrow_mut().style = computed;

    let children = node.borrow().children.clone();
    for child in &children {
        style(child, rules);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html_parser::HtmlParser;
    use crate::node::HtmlNode;
    use pretty_assertions::assert_eq;

    fn styled(html: &str, css: &str) -> NodeRef {
        let root = HtmlParser::new(html).parse();
        let mut rules = CssParser::new(css).parse();
        rules.sort_by_key(cascade_priority);
        style(&root, &rules);
        root
    }

    fn find(root: &NodeRef, tag: &str) -> NodeRef {
        let mut flat = Vec::new();
        HtmlNode::tree_to_vec(root, &mut flat);
        flat.into_iter()
            .find(|node| node.borrow().is_element(tag))
            .expect("tag present")
    }

    fn value(node: &NodeRef, property: &str) -> String {
        node.borrow().style.get(property).cloned().unwrap_or_default()
    }

    #[test]
    fn every_node_has_all_inherited_properties() {
        let root = styled("<p>hi<b>x</b></p>", "");
        let mut flat = Vec::new();
        HtmlNode::tree_to_vec(&root, &mut flat);
        for node in &flat {
            for property in INHERITED_PROPERTIES.keys() {
                assert!(
                    node.borrow().style.contains_key(*property),
                    "{} missing on {}",
                    property,
                    &*node.borrow()
                );
            }
        }
    }

    #[test]
    fn inherited_properties_flow_to_text_children() {
        let root = styled("<p>hi</p>", "p { color: red; }");
        let p = find(&root, "p");
        let text = p.borrow().children[0].clone();
        assert_eq!(value(&text, "color"), "red");
    }

    #[test]
    fn non_inherited_properties_do_not_flow() {
        let root = styled("<div><p>x</p></div>", "div { background-color: yellow; }");
        assert_eq!(value(&find(&root, "div"), "background-color"), "yellow");
        assert!(!find(&root, "p").borrow().style.contains_key("background-color"));
    }

    #[test]
    fn higher_priority_selector_wins() {
        let root = styled(
            "<div><p>x</p></div>",
            "div p { color: green; } p { color: red; }",
        );
        assert_eq!(value(&find(&root, "p"), "color"), "green");
    }

    #[test]
    fn document_order_breaks_priority_ties() {
        let root = styled("<p>x</p>", "p { color: red; } p { color: blue; }");
        assert_eq!(value(&find(&root, "p"), "color"), "blue");
    }

    #[test]
    fn inline_style_wins_over_rules() {
        let root = styled(
            "<p style=\"color:purple\">x</p>",
            "body p { color: green; }",
        );
        assert_eq!(value(&find(&root, "p"), "color"), "purple");
    }

    #[test]
    fn percentage_font_size_resolves_against_parent() {
        let root = styled(
            "<div><small>x</small></div>",
            "div { font-size: 20px; } small { font-size: 90%; }",
        );
        assert_eq!(value(&find(&root, "small"), "font-size"), "18px");
    }
}
