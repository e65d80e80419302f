use std::collections::HashMap;

use crate::node::{HtmlNode, NodeRef};

/// Tags that never take children and are emitted as leaf elements.
const SELF_CLOSING_TAGS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input",
    "link", "meta", "param", "source", "track", "wbr",
];

/// Tags that belong in `<head>`; anything else seen at the top of the
/// document forces an implicit `<body>`.
const HEAD_TAGS: [&str; 9] = [
    "base", "basefont", "bgsound", "noscript", "link", "meta",
    "title", "style", "script",
];

/// A tolerant single-pass HTML parser. Whatever the input, `parse` returns
/// a well-formed tree rooted at `<html>`.
pub struct HtmlParser {
    body: String,
    unfinished: Vec<NodeRef>,
}

impl HtmlParser {
    pub fn new(body: &str) -> Self {
        HtmlParser {
            body: body.to_string(),
            unfinished: Vec::new(),
        }
    }

    pub fn parse(mut self) -> NodeRef {
        let body = std::mem::take(&mut self.body);
        let mut buffer = String::new();
        let mut in_tag = false;
        for c in body.chars() {
            match c {
                '<' => {
                    in_tag = true;
                    if !buffer.is_empty() {
                        self.add_text(&buffer);
                    }
                    buffer.clear();
                }
                '>' => {
                    in_tag = false;
                    self.add_tag(&buffer);
                    buffer.clear();
                }
                _ => buffer.push(c),
            }
        }
        if !in_tag && !buffer.is_empty() {
            self.add_text(&buffer);
        }
        self.finish()
    }

    fn add_text(&mut self, text: &str) {
        if text.chars().all(char::is_whitespace) {
            return;
        }
        self.implicit_tags(None);
        if let Some(parent) = self.unfinished.last() {
            let node = HtmlNode::new_text(text.to_string(), Some(parent));
            parent.borrow_mut().children.push(node);
        }
    }

    fn add_tag(&mut self, tag_body: &str) {
        let (tag, attributes) = get_attributes(tag_body);
        if tag.starts_with('!') {
            // Doctypes and comments are dropped.
            return;
        }
        self.implicit_tags(Some(&tag));

        if tag.starts_with('/') {
            // The root never closes.
            if self.unfinished.len() <= 1 {
                return;
            }
            let node = self.unfinished.pop().expect("checked non-empty");
            if let Some(parent) = self.unfinished.last() {
                parent.borrow_mut().children.push(node);
            }
        } else if SELF_CLOSING_TAGS.contains(&tag.as_str()) {
            if let Some(parent) = self.unfinished.last() {
                let node = HtmlNode::new_element(tag, attributes, Some(parent));
                parent.borrow_mut().children.push(node);
            }
        } else {
            let parent = self.unfinished.last().cloned();
            let node = HtmlNode::new_element(tag, attributes, parent.as_ref());
            self.unfinished.push(node);
        }
    }

    /// Inserts the tags the source omitted, so the open-tag stack always
    /// starts `html`, then `head` or `body`. Runs until no rule applies.
    fn implicit_tags(&mut self, tag: Option<&str>) {
        loop {
            let open: Vec<String> = self
                .unfinished
                .iter()
                .filter_map(|node| node.borrow().tag().map(str::to_string))
                .collect();
            let open: Vec<&str> = open.iter().map(String::as_str).collect();

            if open.is_empty() && tag != Some("html") {
                self.add_tag("html");
            } else if open == ["html"]
                && !matches!(tag, Some("head") | Some("body") | Some("/html"))
            {
                if tag.is_some_and(|t| HEAD_TAGS.contains(&t)) {
                    self.add_tag("head");
                } else {
                    self.add_tag("body");
                }
            } else if open == ["html", "head"]
                && !tag.is_some_and(|t| t == "/head" || HEAD_TAGS.contains(&t))
            {
                self.add_tag("/head");
            } else {
                break;
            }
        }
    }

    fn finish(mut self) -> NodeRef {
        if self.unfinished.is_empty() {
            self.implicit_tags(None);
        }
        while self.unfinished.len() > 1 {
            let node = self.unfinished.pop().expect("checked non-empty");
            if let Some(parent) = self.unfinished.last() {
                parent.borrow_mut().children.push(node);
            }
        }
        self.unfinished.pop().expect("implicit root always present")
    }
}

/// Lexes a tag body into a case-folded tag plus attribute map. Values may
/// be quoted with matching `'` or `"`; bare attributes map to the empty
/// string.
fn get_attributes(tag_body: &str) -> (String, HashMap<String, String>) {
    let mut parts = tag_body.split_whitespace();
    let tag = parts.next().unwrap_or_default().to_ascii_lowercase();
    let mut attributes = HashMap::new();
    for pair in parts {
        if let Some((key, value)) = pair.split_once('=') {
            let value = strip_quotes(value);
            attributes.insert(key.to_ascii_lowercase(), value.to_string());
        } else {
            attributes.insert(pair.to_ascii_lowercase(), String::new());
        }
    }
    (tag, attributes)
}

fn strip_quotes(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::HtmlNodeType;
    use pretty_assertions::assert_eq;

    /// Renders the tree as nested tags for compact structural assertions.
    fn outline(node: &NodeRef) -> String {
        let node = node.borrow();
        match &node.node_type {
            HtmlNodeType::Text(text) => format!("{:?}", text),
            HtmlNodeType::Element(element) => {
                let children: Vec<String> = node.children.iter().map(outline).collect();
                if children.is_empty() {
                    format!("<{}>", element.tag)
                } else {
                    format!("<{}>[{}]", element.tag, children.join(" "))
                }
            }
        }
    }

    #[test]
    fn inserts_implicit_html_and_body() {
        let root = HtmlParser::new("<p>hi<b>x").parse();
        assert_eq!(outline(&root), "<html>[<body>[<p>[\"hi\" <b>[\"x\"]]]]");
    }

    #[test]
    fn head_tags_open_an_implicit_head() {
        let root = HtmlParser::new("<title>T</title><p>x</p>").parse();
        assert_eq!(
            outline(&root),
            "<html>[<head>[<title>[\"T\"]] <body>[<p>[\"x\"]]]"
        );
    }

    #[test]
    fn doctype_and_comments_are_dropped() {
        let root = HtmlParser::new("<!doctype html><!-- note --><p>x</p>").parse();
        assert_eq!(outline(&root), "<html>[<body>[<p>[\"x\"]]]");
    }

    #[test]
    fn self_closing_tags_are_leaves() {
        let root = HtmlParser::new("<p>a<br>b</p>").parse();
        assert_eq!(outline(&root), "<html>[<body>[<p>[\"a\" <br> \"b\"]]]");
    }

    #[test]
    fn attributes_are_lexed_and_case_folded() {
        let root = HtmlParser::new("<INPUT Name=guest VALUE=\"a\" disabled>").parse();
        let mut flat = Vec::new();
        HtmlNode::tree_to_vec(&root, &mut flat);
        let input = flat
            .iter()
            .find(|node| node.borrow().is_element("input"))
            .cloned()
            .unwrap();
        assert_eq!(input.borrow().attribute("name").as_deref(), Some("guest"));
        assert_eq!(input.borrow().attribute("value").as_deref(), Some("a"));
        assert_eq!(input.borrow().attribute("disabled").as_deref(), Some(""));
    }

    #[test]
    fn single_quoted_values_lose_their_quotes() {
        let root = HtmlParser::new("<a href='/x'>go</a>").parse();
        let mut flat = Vec::new();
        HtmlNode::tree_to_vec(&root, &mut flat);
        let a = flat.iter().find(|node| node.borrow().is_element("a")).cloned().unwrap();
        assert_eq!(a.borrow().attribute("href").as_deref(), Some("/x"));
    }

    #[test]
    fn whitespace_only_runs_are_skipped() {
        let root = HtmlParser::new("<p>\n   \n</p>").parse();
        assert_eq!(outline(&root), "<html>[<body>[<p>]]");
    }

    #[test]
    fn stray_close_tag_pops_the_implicit_body() {
        // "</p>" forces implicit <html><body>, then pops the body; the
        // following text reopens a fresh one.
        let root = HtmlParser::new("</p>x").parse();
        assert_eq!(outline(&root), "<html>[<body> <body>[\"x\"]]");
    }

    #[test]
    fn any_input_yields_a_tree() {
        for input in ["", "<", ">", "<<<>>>", "<b><i>mis</b>nested</i>"] {
            let root = HtmlParser::new(input).parse();
            assert!(root.borrow().is_element("html"), "input {:?}", input);
        }
    }
}
