use std::sync::Arc;

use egui::text::Galley;
use egui::{Color32, CornerRadius, Painter, Pos2, Rect, Stroke, StrokeKind, Vec2};

use crate::node::NodeRef;

/// An ordered drawing command. Commands carry geometry only, never DOM
/// pointers, so a display list can be discarded and rebuilt freely.
pub enum DrawCommand {
    Text(DrawText),
    Rect(DrawRect),
    Outline(DrawOutline),
    Line(DrawLine),
    Blend(Blend),
    Opacity(OpacityGroup),
}

pub struct DrawText {
    pub rect: Rect,
    pub galley: Arc<Galley>,
    pub color: Color32,
}

impl DrawText {
    pub fn new(pos: Pos2, galley: Arc<Galley>, color: Color32) -> DrawCommand {
        let rect = Rect::from_min_size(pos, galley.size());
        DrawCommand::Text(DrawText { rect, galley, color })
    }
}

/// A filled, optionally rounded rectangle.
pub struct DrawRect {
    pub rect: Rect,
    pub radius: f32,
    pub color: Color32,
}

impl DrawRect {
    pub fn new(rect: Rect, radius: f32, color: Color32) -> DrawCommand {
        DrawCommand::Rect(DrawRect { rect, radius, color })
    }
}

pub struct DrawOutline {
    pub rect: Rect,
    pub color: Color32,
    pub thickness: f32,
}

impl DrawOutline {
    pub fn new(rect: Rect, color: Color32, thickness: f32) -> DrawCommand {
        DrawCommand::Outline(DrawOutline { rect, color, thickness })
    }
}

/// A line segment from the rect's min corner to its max corner.
pub struct DrawLine {
    pub rect: Rect,
    pub color: Color32,
    pub thickness: f32,
}

impl DrawLine {
    pub fn new(from: Pos2, to: Pos2, color: Color32, thickness: f32) -> DrawCommand {
        DrawCommand::Line(DrawLine {
            rect: Rect::from_two_pos(from, to),
            color,
            thickness,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    SourceOver,
    Multiply,
    Difference,
    DestinationIn,
}

impl BlendMode {
    pub fn parse(mode: &str) -> BlendMode {
        match mode {
            "multiply" => BlendMode::Multiply,
            "difference" => BlendMode::Difference,
            "destination-in" => BlendMode::DestinationIn,
            _ => BlendMode::SourceOver,
        }
    }
}

/// Rounded rect used as a destination-in mask for `overflow: clip`.
pub struct RRect {
    pub rect: Rect,
    pub radius: f32,
}

pub struct Blend {
    pub opacity: f32,
    pub mode: BlendMode,
    pub mask: Option<RRect>,
    pub children: Vec<DrawCommand>,
}

pub struct OpacityGroup {
    pub opacity: f32,
    pub children: Vec<DrawCommand>,
}

impl DrawCommand {
    /// Bounding rect for scroll culling.
    pub fn rect(&self) -> Rect {
        match self {
            DrawCommand::Text(cmd) => cmd.rect,
            DrawCommand::Rect(cmd) => cmd.rect,
            DrawCommand::Outline(cmd) => cmd.rect,
            DrawCommand::Line(cmd) => cmd.rect,
            DrawCommand::Blend(cmd) => union_rect(&cmd.children),
            DrawCommand::Opacity(cmd) => union_rect(&cmd.children),
        }
    }

    pub fn top(&self) -> f32 {
        self.rect().top()
    }

    pub fn bottom(&self) -> f32 {
        self.rect().bottom()
    }

    /// Replays the command onto the painter, shifted up by `scroll`.
    /// `opacity` accumulates from enclosing groups.
    pub fn execute(&self, scroll: f32, painter: &Painter, opacity: f32) {
        let shift = Vec2::new(0.0, -scroll);
        match self {
            DrawCommand::Text(cmd) => {
                painter.galley(
                    cmd.rect.min + shift,
                    cmd.galley.clone(),
                    cmd.color.gamma_multiply(opacity),
                );
            }
            DrawCommand::Rect(cmd) => {
                painter.rect_filled(
                    cmd.rect.translate(shift),
                    CornerRadius::same(cmd.radius as u8),
                    cmd.color.gamma_multiply(opacity),
                );
            }
            DrawCommand::Outline(cmd) => {
                painter.rect_stroke(
                    cmd.rect.translate(shift),
                    CornerRadius::ZERO,
                    Stroke::new(cmd.thickness, cmd.color.gamma_multiply(opacity)),
                    StrokeKind::Middle,
                );
            }
            DrawCommand::Line(cmd) => {
                painter.line_segment(
                    [cmd.rect.min + shift, cmd.rect.max + shift],
                    Stroke::new(cmd.thickness, cmd.color.gamma_multiply(opacity)),
                );
            }
            DrawCommand::Blend(cmd) => {
                let opacity = opacity * cmd.opacity;
                // The surface has no blend-mode support; a destination-in
                // mask becomes a clip, other modes draw source-over.
                match &cmd.mask {
                    Some(mask) => {
                        let clipped = painter.with_clip_rect(mask.rect.translate(shift));
                        for child in &cmd.children {
                            child.execute(scroll, &clipped, opacity);
                        }
                    }
                    None => {
                        for child in &cmd.children {
                            child.execute(scroll, painter, opacity);
                        }
                    }
                }
            }
            DrawCommand::Opacity(cmd) => {
                for child in &cmd.children {
                    child.execute(scroll, painter, opacity * cmd.opacity);
                }
            }
        }
    }
}

fn union_rect(commands: &[DrawCommand]) -> Rect {
    let mut rect = Rect::NOTHING;
    for command in commands {
        rect = rect.union(command.rect());
    }
    rect
}

/// Wraps a node's accumulated paint commands in the visual-effect groups
/// its style asks for. Returns the commands unchanged when there are none.
pub fn paint_visual_effects(node: &NodeRef, commands: Vec<DrawCommand>, rect: Rect) -> Vec<DrawCommand> {
    let node = node.borrow();
    let opacity = node
        .style
        .get("opacity")
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(1.0);
    let blend_mode = node.style.get("mix-blend-mode").cloned();
    let radius = node
        .style
        .get("border-radius")
        .map(|value| parse_px(value))
        .unwrap_or(0.0);
    let clips = node.style.get("overflow").map(String::as_str) == Some("clip") && radius > 0.0;

    let mut commands = commands;
    if clips {
        commands = vec![DrawCommand::Blend(Blend {
            opacity: 1.0,
            mode: BlendMode::DestinationIn,
            mask: Some(RRect { rect, radius }),
            children: commands,
        })];
    }
    if let Some(mode) = blend_mode {
        commands = vec![DrawCommand::Blend(Blend {
            opacity: 1.0,
            mode: BlendMode::parse(&mode),
            mask: None,
            children: commands,
        })];
    }
    if opacity < 1.0 {
        commands = vec![DrawCommand::Opacity(OpacityGroup {
            opacity,
            children: commands,
        })];
    }
    commands
}

/// Parses a CSS color name or hex value into a surface color.
pub fn parse_color(value: &str) -> Option<Color32> {
    let color = csscolorparser::parse(value).ok()?;
    let [r, g, b, a] = color.to_rgba8();
    Some(Color32::from_rgba_unmultiplied(r, g, b, a))
}

pub fn parse_px(value: &str) -> f32 {
    value.trim_end_matches("px").parse::<f32>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_mode_parsing() {
        assert_eq!(BlendMode::parse("multiply"), BlendMode::Multiply);
        assert_eq!(BlendMode::parse("difference"), BlendMode::Difference);
        assert_eq!(BlendMode::parse("screen"), BlendMode::SourceOver);
    }

    #[test]
    fn colors_parse_to_surface_colors() {
        assert_eq!(parse_color("red"), Some(Color32::from_rgba_unmultiplied(255, 0, 0, 255)));
        assert_eq!(parse_color("#00ff00"), Some(Color32::from_rgba_unmultiplied(0, 255, 0, 255)));
        assert_eq!(parse_color("transparent").map(|c| c.a()), Some(0));
        assert_eq!(parse_color("no-such-color"), None);
    }

    #[test]
    fn group_rect_is_the_union_of_children() {
        let a = DrawRect::new(Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(10.0, 10.0)), 0.0, Color32::RED);
        let b = DrawRect::new(Rect::from_min_max(Pos2::new(5.0, 20.0), Pos2::new(15.0, 30.0)), 0.0, Color32::BLUE);
        let group = DrawCommand::Opacity(OpacityGroup { opacity: 0.5, children: vec![a, b] });
        assert_eq!(group.rect(), Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(15.0, 30.0)));
        assert_eq!(group.top(), 0.0);
        assert_eq!(group.bottom(), 30.0);
    }
}
