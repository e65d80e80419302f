use std::collections::HashMap;
use std::rc::Rc;

use egui::{Color32, Painter, Pos2, Rect};
use lazy_static::lazy_static;
use log::{info, warn};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::css_parser::{CssParser, Rule};
use crate::display::DrawCommand;
use crate::html_parser::HtmlParser;
use crate::layout::{LayoutNode, LayoutRef, VSTEP};
use crate::node::{HtmlNode, HtmlNodeType, NodeRef};
use crate::script::{origin_allowed, JsContext};
use crate::style::{cascade_priority, style};
use crate::url::{Origin, RequestError, Url};

pub const SCROLL_STEP: f32 = 100.0;
const SCROLLBAR_WIDTH: f32 = 12.0;

lazy_static! {
    static ref DEFAULT_STYLE_SHEET: Vec<Rule> =
        CssParser::new(include_str!("../assets/browser.css")).parse();
}

/// One document pipeline: fetch, parse, style, layout, paint, plus the
/// navigation history and interaction state for that document.
pub struct Tab {
    pub url: Option<Rc<Url>>,
    pub history: Vec<Rc<Url>>,
    pub forward_history: Vec<Rc<Url>>,
    pub nodes: Option<NodeRef>,
    rules: Vec<Rule>,
    pub document: Option<LayoutRef>,
    display_list: Vec<DrawCommand>,
    pub scroll: f32,
    pub focus: Option<NodeRef>,
    allowed_origins: Option<Vec<Origin>>,
    js: Option<JsContext>,
    width: f32,
    pub tab_height: f32,
}

impl Tab {
    pub fn new(width: f32, tab_height: f32) -> Tab {
        Tab {
            url: None,
            history: Vec::new(),
            forward_history: Vec::new(),
            nodes: None,
            rules: Vec::new(),
            document: None,
            display_list: Vec::new(),
            scroll: 0.0,
            focus: None,
            allowed_origins: None,
            js: None,
            width,
            tab_height,
        }
    }

    /// Loads `url` into this tab. Subresource failures are skipped; a
    /// failed fetch of the document itself is returned to the caller.
    pub fn load(
        &mut self,
        ctx: &egui::Context,
        url: Url,
        payload: Option<&str>,
        from_navigation: bool,
    ) -> Result<(), RequestError> {
        if !from_navigation {
            self.forward_history.clear();
        }

        let referrer = self.url.clone();
        let (headers, body) = url.request(referrer.as_deref(), payload)?;
        info!("loaded {}", url);

        let url = Rc::new(url);
        self.history.push(url.clone());
        self.url = Some(url.clone());
        self.focus = None;
        self.scroll = 0.0;

        let nodes = HtmlParser::new(&body).parse();
        self.nodes = Some(nodes.clone());

        // The CSP allow-list gates every subresource below, so it is read
        // before stylesheets and scripts are fetched.
        self.allowed_origins = parse_csp(&headers, &url);

        let mut rules = DEFAULT_STYLE_SHEET.clone();
        let mut flat = Vec::new();
        HtmlNode::tree_to_vec(&nodes, &mut flat);

        for node in &flat {
            let (is_link, is_style) = {
                let borrow = node.borrow();
                (
                    borrow.is_element("link")
                        && borrow.attribute("rel").as_deref() == Some("stylesheet")
                        && borrow.attribute("href").is_some(),
                    borrow.is_element("style"),
                )
            };
            if is_link {
                let href = node.borrow().attribute("href").unwrap_or_default();
                let style_url = url.resolve(&href);
                if !origin_allowed(&self.allowed_origins, &style_url) {
                    info!("blocked stylesheet {} due to CSP", style_url);
                    continue;
                }
                match style_url.request(Some(&url), None) {
                    Ok((_, css)) => rules.append(&mut CssParser::new(&css).parse()),
                    Err(err) => warn!("skipping stylesheet {}: {}", style_url, err),
                }
            } else if is_style {
                let css = text_content(node);
                if !css.is_empty() {
                    rules.append(&mut CssParser::new(&css).parse());
                }
            }
        }

        // Scripts run in document order on one fresh engine.
        let js = match JsContext::new((*url).clone(), self.allowed_origins.clone()) {
            Ok(js) => {
                js.set_document(nodes.clone());
                Some(js)
            }
            Err(err) => {
                warn!("script engine unavailable: {}", err);
                None
            }
        };
        self.js = js;
        if let Some(js) = &self.js {
            for node in &flat {
                if !node.borrow().is_element("script") {
                    continue;
                }
                if let Some(src) = node.borrow().attribute("src") {
                    let script_url = url.resolve(&src);
                    if !origin_allowed(&self.allowed_origins, &script_url) {
                        info!("blocked script {} due to CSP", script_url);
                        continue;
                    }
                    match script_url.request(Some(&url), None) {
                        Ok((_, code)) => js.run(&script_url.to_string(), &code),
                        Err(err) => warn!("skipping script {}: {}", script_url, err),
                    }
                } else {
                    let code = text_content(node);
                    if !code.is_empty() {
                        js.run("inline", &code);
                    }
                }
            }
        }

        // A textarea's initial value comes from its text children. Scripts
        // may have rewritten the tree, so it is flattened again.
        if let Some(js) = &self.js {
            let _ = js.take_needs_render();
        }
        let mut flat = Vec::new();
        HtmlNode::tree_to_vec(&nodes, &mut flat);
        for node in &flat {
            let is_fresh_textarea = {
                let borrow = node.borrow();
                borrow.is_element("textarea") && borrow.attribute("value").is_none()
            };
            if is_fresh_textarea {
                let value = text_content(node);
                let mut borrow = node.borrow_mut();
                borrow.set_attribute("value", value);
                borrow.children.clear();
            }
        }

        self.rules = rules;
        self.render(ctx);
        self.scroll_to_fragment(&url.fragment.clone());
        Ok(())
    }

    /// Re-resolves style, rebuilds layout, and repaints the display list.
    /// A pure function of the DOM, rules, and width.
    pub fn render(&mut self, ctx: &egui::Context) {
        let Some(nodes) = self.nodes.clone() else {
            return;
        };
        let mut sorted = self.rules.clone();
        sorted.sort_by_key(cascade_priority);
        style(&nodes, &sorted);

        let document = LayoutNode::new_document(nodes, self.width);
        LayoutNode::layout(&document, ctx);
        self.display_list.clear();
        LayoutNode::paint_tree(&document, &mut self.display_list);
        self.document = Some(document);
    }

    pub fn draw(&self, painter: &Painter, offset: f32) {
        for command in &self.display_list {
            if command.top() > self.scroll + self.tab_height {
                continue;
            }
            if command.bottom() < self.scroll {
                continue;
            }
            command.execute(self.scroll - offset, painter, 1.0);
        }
        self.draw_scrollbar(painter, offset);
    }

    fn draw_scrollbar(&self, painter: &Painter, offset: f32) {
        let Some(last) = self.display_list.last() else {
            return;
        };
        let content_height = last.bottom() + VSTEP;
        if content_height <= self.tab_height {
            return;
        }
        let bar_height = self.tab_height / content_height * self.tab_height;
        let bar_y = self.scroll / content_height * self.tab_height + offset;
        painter.rect_filled(
            Rect::from_min_max(
                Pos2::new(self.width - SCROLLBAR_WIDTH, bar_y),
                Pos2::new(self.width, bar_y + bar_height),
            ),
            0,
            Color32::BLUE,
        );
    }

    pub fn get_title(&self) -> Option<String> {
        let nodes = self.nodes.as_ref()?;
        let mut flat = Vec::new();
        HtmlNode::tree_to_vec(nodes, &mut flat);
        flat.iter().find_map(|node| {
            if node.borrow().is_element("title") {
                let text = text_content(node);
                (!text.is_empty()).then_some(text)
            } else {
                None
            }
        })
    }

    pub fn go_back(&mut self, ctx: &egui::Context) {
        if self.history.len() > 1 {
            if let Some(current) = self.history.pop() {
                self.forward_history.push(current);
            }
            if let Some(back) = self.history.pop() {
                self.load_or_warn(ctx, (*back).clone(), None, true);
            }
        }
    }

    pub fn go_forward(&mut self, ctx: &egui::Context) {
        if let Some(forward) = self.forward_history.pop() {
            self.load_or_warn(ctx, (*forward).clone(), None, true);
        }
    }

    /// Reloads the current page. The top history entry is removed first,
    /// but only when it is the very same entry this tab points at, so a
    /// reload never rewrites unrelated history.
    pub fn reload(&mut self, ctx: &egui::Context) {
        let Some(url) = self.url.clone() else {
            return;
        };
        if self.history.last().is_some_and(|last| Rc::ptr_eq(last, &url)) {
            self.history.pop();
        }
        self.load_or_warn(ctx, (*url).clone(), None, true);
    }

    fn load_or_warn(
        &mut self,
        ctx: &egui::Context,
        url: Url,
        payload: Option<&str>,
        from_navigation: bool,
    ) {
        if let Err(err) = self.load(ctx, url, payload, from_navigation) {
            warn!("navigation failed: {}", err);
        }
    }

    pub fn scrolldown(&mut self) {
        let document_height = self
            .document
            .as_ref()
            .map(|document| document.borrow().height)
            .unwrap_or(0.0);
        let max_y = (document_height + 2.0 * VSTEP - self.tab_height).max(0.0);
        self.scroll = (self.scroll + SCROLL_STEP).min(max_y);
    }

    pub fn scrollup(&mut self) {
        self.scroll = (self.scroll - SCROLL_STEP).max(0.0);
    }

    pub fn mousewheel(&mut self, delta_y: f32) {
        if delta_y > 0.0 {
            self.scrollup();
        } else if delta_y < 0.0 {
            self.scrolldown();
        }
    }

    pub fn resize(&mut self, ctx: &egui::Context, width: f32, height: f32) {
        self.width = width;
        self.tab_height = height;
        if self.nodes.is_some() {
            self.render(ctx);
        }
    }

    fn scroll_to_fragment(&mut self, fragment: &Option<String>) {
        let Some(fragment) = fragment else {
            return;
        };
        let Some(nodes) = &self.nodes else {
            return;
        };
        let mut flat = Vec::new();
        HtmlNode::tree_to_vec(nodes, &mut flat);
        let Some(target) = flat
            .into_iter()
            .find(|node| node.borrow().attribute("id").as_deref() == Some(fragment))
        else {
            return;
        };
        let Some(document) = &self.document else {
            return;
        };
        let mut layouts = Vec::new();
        LayoutNode::tree_to_vec(document, &mut layouts);
        if let Some(layout) = layouts
            .iter()
            .find(|layout| Rc::ptr_eq(&layout.borrow().node, &target))
        {
            self.scroll = layout.borrow().y;
        }
    }

    /// Hit-tests a click at tab-relative coordinates and walks the DOM up
    /// from the deepest hit, handling links, focusables, and buttons.
    pub fn click(&mut self, ctx: &egui::Context, x: f32, y: f32) {
        if let Some(focus) = self.focus.take() {
            focus.borrow_mut().is_focused = false;
        }
        let point = Pos2::new(x, y + self.scroll);

        let Some(document) = self.document.clone() else {
            return;
        };
        let mut layouts = Vec::new();
        LayoutNode::tree_to_vec(&document, &mut layouts);
        let Some(deepest) = layouts
            .iter()
            .filter(|layout| layout.borrow().contains(point))
            .next_back()
        else {
            return;
        };

        let mut current = Some(deepest.borrow().node.clone());
        while let Some(node) = current {
            let (tag, href, parent) = {
                let borrow = node.borrow();
                (
                    borrow.tag().map(str::to_string),
                    borrow.attribute("href"),
                    borrow.parent_node(),
                )
            };
            match tag.as_deref() {
                Some("a") if href.is_some() => {
                    if self.dispatch_event(ctx, "click", &node) {
                        return;
                    }
                    let href = href.unwrap_or_default();
                    if let Some(fragment) = href.strip_prefix('#') {
                        if let Some(url) = &self.url {
                            let mut with_fragment = (**url).clone();
                            with_fragment.fragment = Some(fragment.to_string());
                            self.url = Some(Rc::new(with_fragment));
                        }
                        self.scroll_to_fragment(&Some(fragment.to_string()));
                        return;
                    }
                    let destination = match &self.url {
                        Some(url) => url.resolve(&href),
                        None => Url::parse(&href),
                    };
                    self.load_or_warn(ctx, destination, None, false);
                    return;
                }
                Some("input") | Some("textarea") => {
                    if self.dispatch_event(ctx, "click", &node) {
                        return;
                    }
                    {
                        let mut borrow = node.borrow_mut();
                        borrow.is_focused = true;
                        if borrow.cursor.is_none() {
                            let end = borrow
                                .attribute("value")
                                .map(|value| value.chars().count())
                                .unwrap_or(0);
                            borrow.cursor = Some(end);
                        }
                        borrow.selection_start = None;
                        borrow.selection_end = None;
                    }
                    self.focus = Some(node);
                    self.render(ctx);
                    return;
                }
                Some("button") => {
                    if self.dispatch_event(ctx, "click", &node) {
                        return;
                    }
                    let mut form = Some(node.clone());
                    while let Some(candidate) = form {
                        let (is_form, parent) = {
                            let borrow = candidate.borrow();
                            (
                                borrow.is_element("form") && borrow.attribute("action").is_some(),
                                borrow.parent_node(),
                            )
                        };
                        if is_form {
                            self.submit_form(ctx, &candidate);
                            return;
                        }
                        form = parent;
                    }
                }
                _ => {}
            }
            current = parent;
        }
        self.render(ctx);
    }

    fn submit_form(&mut self, ctx: &egui::Context, form: &NodeRef) {
        if self.dispatch_event(ctx, "submit", form) {
            return;
        }
        let body = form_body(form);
        let Some(action) = form.borrow().attribute("action") else {
            return;
        };
        let Some(url) = &self.url else {
            return;
        };
        let destination = url.resolve(&action);
        self.load_or_warn(ctx, destination, Some(&body), false);
    }

    pub fn key_press(&mut self, ctx: &egui::Context, ch: char) {
        let Some(focus) = self.focus.clone() else {
            return;
        };
        if self.dispatch_event(ctx, "keydown", &focus) {
            return;
        }
        delete_selection(&focus);
        {
            let mut borrow = focus.borrow_mut();
            let value = borrow.attribute("value").unwrap_or_default();
            let mut chars: Vec<char> = value.chars().collect();
            let cursor = borrow.cursor.unwrap_or(chars.len()).min(chars.len());
            chars.insert(cursor, ch);
            borrow.set_attribute("value", chars.into_iter().collect());
            borrow.cursor = Some(cursor + 1);
        }
        self.render(ctx);
    }

    pub fn backspace(&mut self, ctx: &egui::Context) {
        let Some(focus) = self.focus.clone() else {
            return;
        };
        if delete_selection(&focus) {
            self.render(ctx);
            return;
        }
        let mut changed = false;
        {
            let mut borrow = focus.borrow_mut();
            let value = borrow.attribute("value").unwrap_or_default();
            let mut chars: Vec<char> = value.chars().collect();
            let cursor = borrow.cursor.unwrap_or(chars.len()).min(chars.len());
            if cursor > 0 {
                chars.remove(cursor - 1);
                borrow.set_attribute("value", chars.into_iter().collect());
                borrow.cursor = Some(cursor - 1);
                changed = true;
            }
        }
        if changed {
            self.render(ctx);
        }
    }

    pub fn arrow_left(&mut self, ctx: &egui::Context, shift: bool) {
        let Some(focus) = self.focus.clone() else {
            return;
        };
        let mut moved = false;
        {
            let mut borrow = focus.borrow_mut();
            let len = borrow
                .attribute("value")
                .map(|value| value.chars().count())
                .unwrap_or(0);
            let cursor = borrow.cursor.unwrap_or(len);
            if cursor > 0 {
                borrow.cursor = Some(cursor - 1);
                if shift {
                    if borrow.selection_start.is_none() {
                        borrow.selection_start = Some(cursor);
                    }
                    borrow.selection_end = Some(cursor - 1);
                } else {
                    borrow.selection_start = None;
                    borrow.selection_end = None;
                }
                moved = true;
            }
        }
        if moved {
            self.render(ctx);
        }
    }

    pub fn arrow_right(&mut self, ctx: &egui::Context, shift: bool) {
        let Some(focus) = self.focus.clone() else {
            return;
        };
        let mut moved = false;
        {
            let mut borrow = focus.borrow_mut();
            let len = borrow
                .attribute("value")
                .map(|value| value.chars().count())
                .unwrap_or(0);
            let cursor = borrow.cursor.unwrap_or(len);
            if cursor < len {
                borrow.cursor = Some(cursor + 1);
                if shift {
                    if borrow.selection_start.is_none() {
                        borrow.selection_start = Some(cursor);
                    }
                    borrow.selection_end = Some(cursor + 1);
                } else {
                    borrow.selection_start = None;
                    borrow.selection_end = None;
                }
                moved = true;
            }
        }
        if moved {
            self.render(ctx);
        }
    }

    pub fn enter(&mut self, _ctx: &egui::Context) {
        // Text inputs have no default enter action.
    }

    /// Returns the selected text for the shell to place on the clipboard.
    pub fn copy(&self) -> Option<String> {
        let focus = self.focus.as_ref()?;
        let borrow = focus.borrow();
        let (start, end) = match (borrow.selection_start, borrow.selection_end) {
            (Some(a), Some(b)) => (a.min(b), a.max(b)),
            _ => return None,
        };
        let value = borrow.attribute("value")?;
        let selected: String = value.chars().skip(start).take(end - start).collect();
        Some(selected)
    }

    pub fn paste(&mut self, ctx: &egui::Context, text: &str) {
        let Some(focus) = self.focus.clone() else {
            return;
        };
        delete_selection(&focus);
        {
            let mut borrow = focus.borrow_mut();
            let value = borrow.attribute("value").unwrap_or_default();
            let mut chars: Vec<char> = value.chars().collect();
            let cursor = borrow.cursor.unwrap_or(chars.len()).min(chars.len());
            let inserted: Vec<char> = text.chars().collect();
            for (offset, ch) in inserted.iter().enumerate() {
                chars.insert(cursor + offset, *ch);
            }
            borrow.set_attribute("value", chars.into_iter().collect());
            borrow.cursor = Some(cursor + inserted.len());
        }
        self.render(ctx);
    }

    pub fn cut(&mut self, ctx: &egui::Context) -> Option<String> {
        let text = self.copy()?;
        if let Some(focus) = self.focus.clone() {
            delete_selection(&focus);
            self.render(ctx);
        }
        Some(text)
    }

    /// Dispatches an event and re-renders if a handler mutated the DOM.
    /// Returns true when the default action was cancelled.
    fn dispatch_event(&mut self, ctx: &egui::Context, event_type: &str, node: &NodeRef) -> bool {
        let Some(js) = &self.js else {
            return false;
        };
        let cancelled = js.dispatch_event(event_type, node);
        if self
            .js
            .as_ref()
            .is_some_and(|js| js.take_needs_render())
        {
            self.render(ctx);
        }
        cancelled
    }
}

/// Concatenated text children of a node.
fn text_content(node: &NodeRef) -> String {
    let mut out = String::new();
    for child in &node.borrow().children {
        if let HtmlNodeType::Text(text) = &child.borrow().node_type {
            out.push_str(text);
        }
    }
    out
}

/// URL-encodes the named inputs of a form into a POST body.
pub fn form_body(form: &NodeRef) -> String {
    let mut flat = Vec::new();
    HtmlNode::tree_to_vec(form, &mut flat);
    let mut pairs = Vec::new();
    for node in &flat {
        let borrow = node.borrow();
        if !matches!(borrow.tag(), Some("input") | Some("textarea")) {
            continue;
        }
        let Some(name) = borrow.attribute("name") else {
            continue;
        };
        let value = borrow.attribute("value").unwrap_or_default();
        pairs.push(format!(
            "{}={}",
            utf8_percent_encode(&name, NON_ALPHANUMERIC),
            utf8_percent_encode(&value, NON_ALPHANUMERIC),
        ));
    }
    pairs.join("&")
}

fn delete_selection(node: &NodeRef) -> bool {
    let mut borrow = node.borrow_mut();
    let (start, end) = match (borrow.selection_start, borrow.selection_end) {
        (Some(a), Some(b)) => (a.min(b), a.max(b)),
        _ => return false,
    };
    let value = borrow.attribute("value").unwrap_or_default();
    let chars: Vec<char> = value.chars().collect();
    let kept: String = chars[..start.min(chars.len())]
        .iter()
        .chain(chars[end.min(chars.len())..].iter())
        .collect();
    borrow.set_attribute("value", kept);
    borrow.cursor = Some(start);
    borrow.selection_start = None;
    borrow.selection_end = None;
    true
}

/// Parses a `Content-Security-Policy: default-src …` header into the
/// allow-list; `'self'` maps to the document's own origin. No header (or a
/// different directive) means everything is allowed.
fn parse_csp(headers: &HashMap<String, String>, url: &Url) -> Option<Vec<Origin>> {
    let value = headers.get("content-security-policy")?;
    let mut tokens = value.split_whitespace();
    if tokens.next() != Some("default-src") {
        return None;
    }
    let mut origins = Vec::new();
    for token in tokens {
        if token == "'self'" {
            if let Some(origin) = url.origin() {
                origins.push(origin);
            }
        } else if let Some(origin) = Url::parse(token).origin() {
            origins.push(origin);
        }
    }
    Some(origins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutKind;
    use pretty_assertions::assert_eq;

    fn with_ctx(body: impl FnOnce(&egui::Context)) {
        let ctx = egui::Context::default();
        crate::fonts::install(&ctx);
        let mut body = Some(body);
        let _ = ctx.run(Default::default(), |ctx| {
            if let Some(body) = body.take() {
                body(ctx);
            }
        });
    }

    fn data_url(html: &str) -> Url {
        Url::parse(&format!("data:text/html,{}", html))
    }

    fn loaded(ctx: &egui::Context, html: &str) -> Tab {
        let mut tab = Tab::new(800.0, 520.0);
        tab.load(ctx, data_url(html), None, false).expect("load");
        tab
    }

    #[test]
    fn load_builds_dom_and_display_list() {
        with_ctx(|ctx| {
            let tab = loaded(ctx, "<p>hello</p>");
            assert!(tab.nodes.is_some());
            assert!(tab.document.is_some());
            assert!(!tab.display_list.is_empty());
        });
    }

    #[test]
    fn style_blocks_apply_to_the_document() {
        with_ctx(|ctx| {
            let tab = loaded(ctx, "<style>p { color: red; }</style><p>x</p>");
            let nodes = tab.nodes.clone().unwrap();
            let mut flat = Vec::new();
            HtmlNode::tree_to_vec(&nodes, &mut flat);
            let p = flat
                .iter()
                .find(|node| node.borrow().is_element("p"))
                .cloned()
                .unwrap();
            assert_eq!(p.borrow().style.get("color").map(String::as_str), Some("red"));
        });
    }

    #[test]
    fn inline_scripts_mutate_the_dom_before_first_render() {
        with_ctx(|ctx| {
            let tab = loaded(
                ctx,
                "<script>document.querySelectorAll(\"p\")[0].innerHTML = \"<b>X</b>\"</script><p>y</p>",
            );
            let nodes = tab.nodes.clone().unwrap();
            let mut flat = Vec::new();
            HtmlNode::tree_to_vec(&nodes, &mut flat);
            let p = flat
                .iter()
                .find(|node| node.borrow().is_element("p"))
                .cloned()
                .unwrap();
            assert_eq!(p.borrow().children.len(), 1);
            assert!(p.borrow().children[0].borrow().is_element("b"));

            // Layout reflects the new text.
            let document = tab.document.clone().unwrap();
            let mut layouts = Vec::new();
            LayoutNode::tree_to_vec(&document, &mut layouts);
            let words: Vec<String> = layouts
                .iter()
                .filter_map(|layout| match &layout.borrow().kind {
                    LayoutKind::Text(fragment) => Some(fragment.galley.text().to_string()),
                    _ => None,
                })
                .collect();
            assert_eq!(words, ["X"]);
        });
    }

    #[test]
    fn textarea_value_is_seeded_from_text_children() {
        with_ctx(|ctx| {
            let tab = loaded(ctx, "<textarea name=t>seed text</textarea>");
            let nodes = tab.nodes.clone().unwrap();
            let mut flat = Vec::new();
            HtmlNode::tree_to_vec(&nodes, &mut flat);
            let textarea = flat
                .iter()
                .find(|node| node.borrow().is_element("textarea"))
                .cloned()
                .unwrap();
            assert_eq!(
                textarea.borrow().attribute("value").as_deref(),
                Some("seed text")
            );
            assert!(textarea.borrow().children.is_empty());
        });
    }

    #[test]
    fn back_and_forward_are_inverse() {
        with_ctx(|ctx| {
            let mut tab = Tab::new(800.0, 520.0);
            tab.load(ctx, data_url("<p>a</p>"), None, false).expect("load a");
            tab.load(ctx, data_url("<p>b</p>"), None, false).expect("load b");
            let at_b = tab.url.clone().unwrap();

            tab.go_back(ctx);
            assert_eq!(tab.url.clone().unwrap().path, data_url("<p>a</p>").path);
            assert_eq!(tab.forward_history.len(), 1);

            tab.go_forward(ctx);
            assert_eq!(tab.url.clone().unwrap().path, at_b.path);
            assert!(tab.forward_history.is_empty());
        });
    }

    #[test]
    fn plain_load_clears_forward_history() {
        with_ctx(|ctx| {
            let mut tab = Tab::new(800.0, 520.0);
            tab.load(ctx, data_url("<p>a</p>"), None, false).expect("load a");
            tab.load(ctx, data_url("<p>b</p>"), None, false).expect("load b");
            tab.go_back(ctx);
            assert_eq!(tab.forward_history.len(), 1);
            tab.load(ctx, data_url("<p>c</p>"), None, false).expect("load c");
            assert!(tab.forward_history.is_empty());
        });
    }

    #[test]
    fn reload_does_not_grow_history() {
        with_ctx(|ctx| {
            let mut tab = Tab::new(800.0, 520.0);
            tab.load(ctx, data_url("<p>a</p>"), None, false).expect("load");
            let depth = tab.history.len();
            tab.reload(ctx);
            assert_eq!(tab.history.len(), depth);
        });
    }

    #[test]
    fn click_focuses_inputs_and_sets_cursor_to_end() {
        with_ctx(|ctx| {
            let mut tab = loaded(ctx, "<p><input name=guest value=hi></p>");
            let document = tab.document.clone().unwrap();
            let mut layouts = Vec::new();
            LayoutNode::tree_to_vec(&document, &mut layouts);
            let input = layouts
                .iter()
                .find(|layout| matches!(layout.borrow().kind, LayoutKind::Input(_)))
                .cloned()
                .unwrap();
            let (x, y) = {
                let borrow = input.borrow();
                (borrow.x + 2.0, borrow.y + 2.0)
            };
            tab.click(ctx, x, y);
            let focus = tab.focus.clone().expect("input focused");
            assert!(focus.borrow().is_focused);
            assert_eq!(focus.borrow().cursor, Some(2));
        });
    }

    #[test]
    fn typing_edits_the_focused_value() {
        with_ctx(|ctx| {
            let mut tab = loaded(ctx, "<p><input name=guest value=hi></p>");
            let document = tab.document.clone().unwrap();
            let mut layouts = Vec::new();
            LayoutNode::tree_to_vec(&document, &mut layouts);
            let input = layouts
                .iter()
                .find(|layout| matches!(layout.borrow().kind, LayoutKind::Input(_)))
                .cloned()
                .unwrap();
            let (x, y) = {
                let borrow = input.borrow();
                (borrow.x + 2.0, borrow.y + 2.0)
            };
            tab.click(ctx, x, y);
            tab.key_press(ctx, '!');
            tab.backspace(ctx);
            tab.key_press(ctx, '?');
            let focus = tab.focus.clone().unwrap();
            assert_eq!(focus.borrow().attribute("value").as_deref(), Some("hi?"));
        });
    }

    #[test]
    fn selection_copy_and_cut() {
        with_ctx(|ctx| {
            let mut tab = loaded(ctx, "<p><input name=guest value=abcd></p>");
            let document = tab.document.clone().unwrap();
            let mut layouts = Vec::new();
            LayoutNode::tree_to_vec(&document, &mut layouts);
            let input = layouts
                .iter()
                .find(|layout| matches!(layout.borrow().kind, LayoutKind::Input(_)))
                .cloned()
                .unwrap();
            let (x, y) = {
                let borrow = input.borrow();
                (borrow.x + 2.0, borrow.y + 2.0)
            };
            tab.click(ctx, x, y);
            // Select the last two characters with shift-left twice.
            tab.arrow_left(ctx, true);
            tab.arrow_left(ctx, true);
            assert_eq!(tab.copy().as_deref(), Some("cd"));
            assert_eq!(tab.cut(ctx).as_deref(), Some("cd"));
            let focus = tab.focus.clone().unwrap();
            assert_eq!(focus.borrow().attribute("value").as_deref(), Some("ab"));
        });
    }

    #[test]
    fn form_bodies_are_url_encoded() {
        let root = HtmlParser::new(
            "<form action=/add><input name=guest value=hi><input name=note value=\"a b\"><input value=anon></form>",
        )
        .parse();
        let mut flat = Vec::new();
        HtmlNode::tree_to_vec(&root, &mut flat);
        let form = flat
            .iter()
            .find(|node| node.borrow().is_element("form"))
            .cloned()
            .unwrap();
        assert_eq!(form_body(&form), "guest=hi&note=a%20b");
    }

    #[test]
    fn csp_header_parses_self_and_absolute_origins() {
        let url = Url::parse("https://a.example/");
        let headers = HashMap::from([(
            "content-security-policy".to_string(),
            "default-src 'self' https://cdn.example".to_string(),
        )]);
        let origins = parse_csp(&headers, &url).expect("allow-list");
        assert_eq!(origins.len(), 2);
        assert!(origins.contains(&url.origin().unwrap()));
        assert!(origins.contains(&Url::parse("https://cdn.example/").origin().unwrap()));

        assert!(parse_csp(&HashMap::new(), &url).is_none());
        let other = HashMap::from([(
            "content-security-policy".to_string(),
            "script-src 'self'".to_string(),
        )]);
        assert!(parse_csp(&other, &url).is_none());
    }

    #[test]
    fn fragment_click_scrolls_without_navigating() {
        with_ctx(|ctx| {
            // A "#" inside a data: URL would be taken for its fragment, so
            // this page comes from a file.
            let long = "<p>filler</p>".repeat(40);
            let html = format!(
                "<p><a href=\"#target\">jump</a></p>{}<p id=target>here</p>",
                long
            );
            let dir = tempfile::tempdir().expect("tempdir");
            let page = dir.path().join("page.html");
            std::fs::write(&page, html).expect("write page");
            let mut tab = Tab::new(800.0, 520.0);
            tab.load(ctx, Url::parse(&format!("file://{}", page.display())), None, false)
                .expect("load");
            let history_depth = tab.history.len();
            let document = tab.document.clone().unwrap();
            let mut layouts = Vec::new();
            LayoutNode::tree_to_vec(&document, &mut layouts);
            let link_text = layouts
                .iter()
                .find(|layout| matches!(layout.borrow().kind, LayoutKind::Text(_)))
                .cloned()
                .unwrap();
            let (x, y) = {
                let borrow = link_text.borrow();
                (borrow.x + 1.0, borrow.y + 1.0)
            };
            tab.click(ctx, x, y);
            assert_eq!(tab.history.len(), history_depth);
            assert!(tab.scroll > 0.0);
            assert_eq!(
                tab.url.clone().unwrap().fragment.as_deref(),
                Some("target")
            );
        });
    }
}
