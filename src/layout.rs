use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use egui::text::Galley;
use egui::{Color32, Context, FontId, Pos2, Rect, Vec2};

use crate::display::{self, DrawCommand, DrawLine, DrawOutline, DrawRect, DrawText};
use crate::fonts::{self, FontSpec};
use crate::node::{HtmlNodeType, NodeRef};

pub const HSTEP: f32 = 13.0;
pub const VSTEP: f32 = 18.0;
pub const INPUT_WIDTH_PX: f32 = 200.0;

const BLOCK_ELEMENTS: [&str; 37] = [
    "html", "body", "article", "section", "nav", "aside",
    "h1", "h2", "h3", "h4", "h5", "h6", "hgroup", "header",
    "footer", "address", "p", "hr", "pre", "blockquote",
    "ol", "ul", "menu", "li", "dl", "dt", "dd", "figure",
    "figcaption", "main", "div", "table", "form", "fieldset",
    "legend", "details", "summary",
];

/// Elements that produce no boxes at all.
const INVISIBLE_TAGS: [&str; 5] = ["head", "script", "style", "title", "meta"];

pub type LayoutRef = Rc<RefCell<LayoutNode>>;

/// A node in the layout tree. The tree is rebuilt from scratch on every
/// render and never outlives one.
pub struct LayoutNode {
    pub node: NodeRef,
    parent: Option<Weak<RefCell<LayoutNode>>>,
    previous: Option<LayoutRef>,
    pub children: Vec<LayoutRef>,
    pub kind: LayoutKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

pub enum LayoutKind {
    Document { viewport_width: f32 },
    Block,
    Line,
    Text(TextFragment),
    Input(InputFragment),
}

/// One laid-out word (or literal `pre` segment).
pub struct TextFragment {
    pub galley: Arc<Galley>,
    pub color: Color32,
    pub ascent: f32,
    pub descent: f32,
    pub linespace: f32,
    /// Gap inserted between this fragment and the next; zero inside `pre`.
    pub space_width: f32,
}

/// A fixed-width input, button, or textarea box.
pub struct InputFragment {
    pub galley: Arc<Galley>,
    pub color: Color32,
    pub ascent: f32,
    pub descent: f32,
    pub linespace: f32,
    pub space_width: f32,
    /// Cursor x-offset within the box, present while the node is focused.
    pub cursor_offset: Option<f32>,
    /// Selection highlight as (start, end) x-offsets.
    pub selection: Option<(f32, f32)>,
}

enum LayoutMode {
    Block,
    Inline,
}

impl LayoutNode {
    pub fn new_document(node: NodeRef, viewport_width: f32) -> LayoutRef {
        Rc::new(RefCell::new(LayoutNode {
            node,
            parent: None,
            previous: None,
            children: Vec::new(),
            kind: LayoutKind::Document { viewport_width },
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        }))
    }

    fn new_child(
        node: NodeRef,
        parent: &LayoutRef,
        previous: Option<LayoutRef>,
        kind: LayoutKind,
    ) -> LayoutRef {
        Rc::new(RefCell::new(LayoutNode {
            node,
            parent: Some(Rc::downgrade(parent)),
            previous,
            children: Vec::new(),
            kind,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        }))
    }

    pub fn self_rect(&self) -> Rect {
        Rect::from_min_size(Pos2::new(self.x, self.y), Vec2::new(self.width, self.height))
    }

    pub fn contains(&self, point: Pos2) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }

    /// Flattens the layout tree in paint order.
    pub fn tree_to_vec(this: &LayoutRef, out: &mut Vec<LayoutRef>) {
        out.push(this.clone());
        let children = this.borrow().children.clone();
        for child in &children {
            Self::tree_to_vec(child, out);
        }
    }

    /// Computes geometry for this node and its subtree. Idempotent: laying
    /// out the same tree twice yields the same geometry.
    pub fn layout(this: &LayoutRef, ctx: &Context) {
        enum Step {
            Document(f32),
            Block,
            Line,
            Fragment,
        }
        let step = match &this.borrow().kind {
            LayoutKind::Document { viewport_width } => Step::Document(*viewport_width),
            LayoutKind::Block => Step::Block,
            LayoutKind::Line => Step::Line,
            LayoutKind::Text(_) | LayoutKind::Input(_) => Step::Fragment,
        };
        match step {
            Step::Document(viewport_width) => Self::layout_document(this, ctx, viewport_width),
            Step::Block => Self::layout_block(this, ctx),
            Step::Line => Self::layout_line(this, ctx),
            // Text and input fragments are positioned by their line.
            Step::Fragment => {}
        }
    }

    fn layout_document(this: &LayoutRef, ctx: &Context, viewport_width: f32) {
        let node = {
            let mut borrow = this.borrow_mut();
            borrow.x = HSTEP;
            borrow.y = VSTEP;
            borrow.width = viewport_width - 2.0 * HSTEP;
            borrow.children.clear();
            borrow.node.clone()
        };
        let child = Self::new_child(node, this, None, LayoutKind::Block);
        this.borrow_mut().children.push(child.clone());
        Self::layout(&child, ctx);
        this.borrow_mut().height = child.borrow().height;
    }

    fn layout_block(this: &LayoutRef, ctx: &Context) {
        let (node, parent, previous) = {
            let borrow = this.borrow();
            (
                borrow.node.clone(),
                borrow.parent.as_ref().and_then(Weak::upgrade),
                borrow.previous.clone(),
            )
        };
        let Some(parent) = parent else { return };

        {
            let mut borrow = this.borrow_mut();
            borrow.x = parent.borrow().x;
            borrow.width = parent.borrow().width;
            borrow.y = match &previous {
                Some(prev) => prev.borrow().y + prev.borrow().height,
                None => parent.borrow().y,
            };
            borrow.children.clear();
        }

        match layout_mode(&node) {
            LayoutMode::Block => {
                let mut previous: Option<LayoutRef> = None;
                let dom_children = node.borrow().children.clone();
                for child in dom_children {
                    let skip = child
                        .borrow()
                        .tag()
                        .is_some_and(|tag| INVISIBLE_TAGS.contains(&tag));
                    if skip {
                        continue;
                    }
                    let block = Self::new_child(child, this, previous.clone(), LayoutKind::Block);
                    this.borrow_mut().children.push(block.clone());
                    previous = Some(block);
                }
            }
            LayoutMode::Inline => {
                InlineComposer::compose(this, ctx);
            }
        }

        let children = this.borrow().children.clone();
        for child in &children {
            Self::layout(child, ctx);
        }
        let height: f32 = children.iter().map(|child| child.borrow().height).sum();
        this.borrow_mut().height = height;
    }

    fn layout_line(this: &LayoutRef, _ctx: &Context) {
        let (parent, previous, children) = {
            let borrow = this.borrow();
            (
                borrow.parent.as_ref().and_then(Weak::upgrade),
                borrow.previous.clone(),
                borrow.children.clone(),
            )
        };
        let Some(parent) = parent else { return };

        {
            let mut borrow = this.borrow_mut();
            borrow.x = parent.borrow().x;
            borrow.width = parent.borrow().width;
            borrow.y = match &previous {
                Some(prev) => prev.borrow().y + prev.borrow().height,
                None => parent.borrow().y,
            };
        }

        // First place fragments horizontally, then align them to a common
        // baseline.
        for child in &children {
            Self::layout_fragment(child);
        }

        if children.is_empty() {
            this.borrow_mut().height = 0.0;
            return;
        }

        let metrics = |child: &LayoutRef| -> (f32, f32) {
            match &child.borrow().kind {
                LayoutKind::Text(fragment) => (fragment.ascent, fragment.descent),
                LayoutKind::Input(fragment) => (fragment.ascent, fragment.descent),
                _ => (0.0, 0.0),
            }
        };
        let max_ascent = children
            .iter()
            .map(|child| metrics(child).0)
            .fold(0.0_f32, f32::max);
        let max_descent = children
            .iter()
            .map(|child| metrics(child).1)
            .fold(0.0_f32, f32::max);

        let baseline = this.borrow().y + 1.25 * max_ascent;
        for child in &children {
            let ascent = metrics(child).0;
            child.borrow_mut().y = baseline - ascent;
        }
        this.borrow_mut().height = 1.25 * (max_ascent + max_descent);

        // text-align shifts the whole line's fragments.
        let (line_x, line_width) = {
            let borrow = this.borrow();
            (borrow.x, borrow.width)
        };
        let last = children.last().cloned();
        if let Some(last) = last {
            let content_width = last.borrow().x + last.borrow().width - line_x;
            let align = this
                .borrow()
                .node
                .borrow()
                .style
                .get("text-align")
                .cloned()
                .unwrap_or_default();
            let offset = match align.as_str() {
                "center" => (line_width - content_width) / 2.0,
                "right" => line_width - content_width,
                _ => 0.0,
            };
            if offset != 0.0 {
                for child in &children {
                    child.borrow_mut().x += offset;
                }
            }
        }
    }

    fn layout_fragment(this: &LayoutRef) {
        let (parent, previous) = {
            let borrow = this.borrow();
            (
                borrow.parent.as_ref().and_then(Weak::upgrade),
                borrow.previous.clone(),
            )
        };
        let mut borrow = this.borrow_mut();
        let (width, linespace) = match &borrow.kind {
            LayoutKind::Text(fragment) => (fragment.galley.size().x, fragment.linespace),
            LayoutKind::Input(fragment) => (INPUT_WIDTH_PX, fragment.linespace),
            _ => return,
        };
        borrow.width = width;
        borrow.height = linespace;
        borrow.x = match &previous {
            Some(prev) => {
                let prev = prev.borrow();
                let space = match &prev.kind {
                    LayoutKind::Text(fragment) => fragment.space_width,
                    LayoutKind::Input(fragment) => fragment.space_width,
                    _ => 0.0,
                };
                prev.x + prev.width + space
            }
            None => parent.map(|p| p.borrow().x).unwrap_or(0.0),
        };
    }

    /// Collects paint commands for the subtree in paint order, wrapping
    /// each block's accumulated commands in its visual effects.
    pub fn paint_tree(this: &LayoutRef, display_list: &mut Vec<DrawCommand>) {
        let mut commands = if this.borrow().should_paint() {
            this.borrow().paint()
        } else {
            Vec::new()
        };
        let children = this.borrow().children.clone();
        for child in &children {
            Self::paint_tree(child, &mut commands);
        }
        let wraps = matches!(
            this.borrow().kind,
            LayoutKind::Block | LayoutKind::Input(_)
        );
        let mut commands = if wraps {
            let node = this.borrow().node.clone();
            let rect = this.borrow().self_rect();
            display::paint_visual_effects(&node, commands, rect)
        } else {
            commands
        };
        display_list.append(&mut commands);
    }

    /// Whether this node contributes its own paint commands. Blocks for
    /// input-like elements defer entirely to their input fragment.
    pub fn should_paint(&self) -> bool {
        match self.kind {
            LayoutKind::Block => !matches!(
                self.node.borrow().tag(),
                Some("input") | Some("button") | Some("textarea")
            ),
            _ => true,
        }
    }

    pub fn paint(&self) -> Vec<DrawCommand> {
        match &self.kind {
            LayoutKind::Document { .. } | LayoutKind::Line => Vec::new(),
            LayoutKind::Block => self.paint_block(),
            LayoutKind::Text(fragment) => {
                vec![DrawText::new(
                    Pos2::new(self.x, self.y),
                    fragment.galley.clone(),
                    fragment.color,
                )]
            }
            LayoutKind::Input(fragment) => self.paint_input(fragment),
        }
    }

    fn paint_block(&self) -> Vec<DrawCommand> {
        let mut commands = Vec::new();
        if self.node.borrow().is_element("pre") {
            commands.push(DrawRect::new(self.self_rect(), 0.0, Color32::GRAY));
        }
        let node = self.node.borrow();
        if let Some(background) = node.style.get("background-color") {
            if let Some(color) = display::parse_color(background) {
                if color.a() > 0 {
                    let radius = node
                        .style
                        .get("border-radius")
                        .map(|value| display::parse_px(value))
                        .unwrap_or(0.0);
                    commands.push(DrawRect::new(self.self_rect(), radius, color));
                }
            }
        }
        commands
    }

    fn paint_input(&self, fragment: &InputFragment) -> Vec<DrawCommand> {
        let rect = self.self_rect();
        let mut commands = vec![DrawOutline::new(rect, Color32::BLACK, 1.0)];

        let node = self.node.borrow();
        if let Some(color) = node.style.get("background-color").and_then(|bg| display::parse_color(bg)) {
            if color.a() > 0 {
                commands.push(DrawRect::new(rect, 0.0, color));
            }
        }

        if node.is_focused {
            if let Some((start, end)) = fragment.selection {
                let highlight = Rect::from_min_max(
                    Pos2::new(self.x + start, self.y),
                    Pos2::new(self.x + end, self.y + self.height),
                );
                commands.push(DrawRect::new(highlight, 0.0, Color32::LIGHT_BLUE));
            }
            if let Some(offset) = fragment.cursor_offset {
                commands.push(DrawLine::new(
                    Pos2::new(self.x + offset, self.y),
                    Pos2::new(self.x + offset, self.y + self.height),
                    Color32::BLACK,
                    1.0,
                ));
            }
        }

        commands.push(DrawText::new(
            Pos2::new(self.x, self.y),
            fragment.galley.clone(),
            fragment.color,
        ));
        commands
    }
}

fn layout_mode(node: &NodeRef) -> LayoutMode {
    let borrow = node.borrow();
    match &borrow.node_type {
        HtmlNodeType::Text(_) => LayoutMode::Inline,
        HtmlNodeType::Element(element) => {
            let has_block_child = borrow.children.iter().any(|child| {
                child
                    .borrow()
                    .tag()
                    .is_some_and(|tag| BLOCK_ELEMENTS.contains(&tag))
            });
            if has_block_child {
                LayoutMode::Block
            } else if !borrow.children.is_empty()
                || element.tag == "input"
                || element.tag == "textarea"
            {
                LayoutMode::Inline
            } else {
                LayoutMode::Block
            }
        }
    }
}

/// Builds the line/fragment children of an inline-mode block by walking
/// its DOM subtree.
struct InlineComposer<'a> {
    ctx: &'a Context,
    block: LayoutRef,
    width: f32,
    cursor_x: f32,
    in_pre: bool,
}

impl InlineComposer<'_> {
    fn compose(block: &LayoutRef, ctx: &Context) {
        let node = block.borrow().node.clone();
        let width = block.borrow().width;
        let mut composer = InlineComposer {
            ctx,
            block: block.clone(),
            width,
            cursor_x: 0.0,
            in_pre: false,
        };
        composer.new_line();
        composer.recurse(&node);
    }

    fn new_line(&mut self) {
        self.cursor_x = 0.0;
        let previous = self.block.borrow().children.last().cloned();
        let node = self.block.borrow().node.clone();
        let line = LayoutNode::new_child(node, &self.block, previous, LayoutKind::Line);
        self.block.borrow_mut().children.push(line);
    }

    fn recurse(&mut self, node: &NodeRef) {
        enum Walk {
            Text(String),
            Element(String, Vec<NodeRef>),
        }
        let walk = {
            let borrow = node.borrow();
            match &borrow.node_type {
                HtmlNodeType::Text(text) => Walk::Text(text.clone()),
                HtmlNodeType::Element(element) => {
                    Walk::Element(element.tag.clone(), borrow.children.clone())
                }
            }
        };
        match walk {
            Walk::Text(text) => {
                if self.in_pre {
                    // Lines are preserved literally inside pre.
                    for (index, segment) in text.split('\n').enumerate() {
                        if index > 0 {
                            self.new_line();
                        }
                        if !segment.is_empty() {
                            self.text(node, segment);
                        }
                    }
                } else {
                    for word in text.split_whitespace() {
                        self.text(node, word);
                    }
                }
            }
            Walk::Element(tag, children) => {
                if INVISIBLE_TAGS.contains(&tag.as_str()) {
                    return;
                }
                match tag.as_str() {
                    "br" => self.new_line(),
                    "input" | "button" | "textarea" => {
                        if tag == "input"
                            && node.borrow().attribute("type").as_deref() == Some("hidden")
                        {
                            return;
                        }
                        self.input(node);
                    }
                    "pre" => {
                        let was_pre = self.in_pre;
                        self.in_pre = true;
                        for child in &children {
                            self.recurse(child);
                        }
                        self.in_pre = was_pre;
                    }
                    _ => {
                        for child in &children {
                            self.recurse(child);
                        }
                    }
                }
            }
        }
    }

    fn text(&mut self, node: &NodeRef, word: &str) {
        let (font_id, color) = resolve_font(node, self.in_pre);
        let galley = fonts::layout_text(self.ctx, word, &font_id);
        let word_width = galley.size().x;
        if self.cursor_x + word_width > self.width && !self.in_pre {
            self.new_line();
        }
        let space_width = if self.in_pre {
            0.0
        } else {
            fonts::measure(self.ctx, " ", &font_id)
        };
        let (ascent, descent) = fonts::galley_metrics(&galley);
        let linespace = fonts::linespace(&galley);
        self.push_fragment(
            node,
            LayoutKind::Text(TextFragment {
                galley,
                color,
                ascent,
                descent,
                linespace,
                space_width,
            }),
        );
        self.cursor_x += word_width + space_width;
    }

    fn input(&mut self, node: &NodeRef) {
        let (font_id, color) = resolve_font(node, false);
        if self.cursor_x + INPUT_WIDTH_PX > self.width {
            self.new_line();
        }

        let text = input_text(node);
        let galley = fonts::layout_text(self.ctx, &text, &font_id);
        let metrics_galley = if text.is_empty() {
            fonts::layout_text(self.ctx, " ", &font_id)
        } else {
            galley.clone()
        };
        let (ascent, descent) = fonts::galley_metrics(&metrics_galley);
        let linespace = fonts::linespace(&metrics_galley);
        let space_width = fonts::measure(self.ctx, " ", &font_id);

        let (cursor_offset, selection) = {
            let borrow = node.borrow();
            if borrow.is_focused {
                let chars: Vec<char> = text.chars().collect();
                let prefix = |count: usize| -> f32 {
                    let prefix: String = chars.iter().take(count).collect();
                    fonts::measure(self.ctx, &prefix, &font_id)
                };
                let cursor = borrow.cursor.unwrap_or(chars.len());
                let selection = match (borrow.selection_start, borrow.selection_end) {
                    (Some(a), Some(b)) => Some((prefix(a.min(b)), prefix(a.max(b)))),
                    _ => None,
                };
                (Some(prefix(cursor)), selection)
            } else {
                (None, None)
            }
        };

        self.push_fragment(
            node,
            LayoutKind::Input(InputFragment {
                galley,
                color,
                ascent,
                descent,
                linespace,
                space_width,
                cursor_offset,
                selection,
            }),
        );
        self.cursor_x += INPUT_WIDTH_PX + space_width;
    }

    fn push_fragment(&mut self, node: &NodeRef, kind: LayoutKind) {
        let line = match self.block.borrow().children.last().cloned() {
            Some(line) => line,
            None => return,
        };
        let previous = line.borrow().children.last().cloned();
        let fragment = LayoutNode::new_child(node.clone(), &line, previous, kind);
        line.borrow_mut().children.push(fragment);
    }
}

fn resolve_font(node: &NodeRef, mono: bool) -> (FontId, Color32) {
    let borrow = node.borrow();
    let spec = FontSpec::from_style(&borrow.style, mono);
    let color = borrow
        .style
        .get("color")
        .and_then(|value| display::parse_color(value))
        .unwrap_or(Color32::BLACK);
    (spec.font_id(), color)
}

/// The text an input-like element displays: its `value` for inputs and
/// textareas, the single text child for buttons.
fn input_text(node: &NodeRef) -> String {
    let borrow = node.borrow();
    match borrow.tag() {
        Some("button") => {
            if borrow.children.len() == 1 {
                if let HtmlNodeType::Text(text) = &borrow.children[0].borrow().node_type {
                    return text.clone();
                }
            }
            String::new()
        }
        _ => borrow.attribute("value").unwrap_or_default(),
    }
}
