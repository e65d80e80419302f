use egui::{Color32, Context, FontFamily, FontId, Pos2, Rect};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::display::{DrawCommand, DrawLine, DrawOutline, DrawRect, DrawText};
use crate::fonts;
use crate::url::Url;

const CHROME_FONT_SIZE: f32 = 20.0;
const PADDING: f32 = 5.0;
const SEARCH_URL: &str = "https://www.google.com/search?q=";

/// Something the shell must do in response to a chrome click.
#[derive(Debug, PartialEq, Eq)]
pub enum ChromeAction {
    NewTab,
    Back,
    Forward,
    Reload,
    SelectTab(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromeFocus {
    AddressBar,
}

/// Per-frame chrome geometry; everything hangs off the font height.
struct ChromeRects {
    bottom: f32,
    tabbar_bottom: f32,
    urlbar_top: f32,
    newtab: Rect,
    back: Rect,
    forward: Rect,
    reload: Rect,
    address: Rect,
    tab_width: f32,
}

/// The browser UI above the page: tab strip, navigation buttons, and the
/// editable address bar.
pub struct Chrome {
    pub focus: Option<ChromeFocus>,
    pub address_bar: String,
    pub cursor: usize,
    pub selection_start: Option<usize>,
    pub selection_end: Option<usize>,
    width: f32,
    font_id: FontId,
}

impl Chrome {
    pub fn new(width: f32) -> Chrome {
        Chrome {
            focus: None,
            address_bar: String::new(),
            cursor: 0,
            selection_start: None,
            selection_end: None,
            width,
            font_id: FontId::new(CHROME_FONT_SIZE, FontFamily::Proportional),
        }
    }

    pub fn resize(&mut self, width: f32) {
        self.width = width;
    }

    pub fn blur(&mut self) {
        self.focus = None;
    }

    /// Chrome height; pointer events below this go to the page.
    pub fn bottom(&self, ctx: &Context) -> f32 {
        self.rects(ctx).bottom
    }

    fn font_height(&self, ctx: &Context) -> f32 {
        fonts::linespace(&fonts::layout_text(ctx, "Tab", &self.font_id))
    }

    fn measure(&self, ctx: &Context, text: &str) -> f32 {
        fonts::measure(ctx, text, &self.font_id)
    }

    fn rects(&self, ctx: &Context) -> ChromeRects {
        let font_height = self.font_height(ctx);
        let tabbar_bottom = font_height + 2.0 * PADDING;
        let urlbar_top = tabbar_bottom;
        let urlbar_bottom = urlbar_top + font_height + 2.0 * PADDING;

        let newtab = Rect::from_min_max(
            Pos2::new(PADDING, PADDING),
            Pos2::new(PADDING + self.measure(ctx, "+") + 2.0 * PADDING, PADDING + font_height),
        );
        let back_width = self.measure(ctx, "<") + 2.0 * PADDING;
        let back = Rect::from_min_max(
            Pos2::new(PADDING, urlbar_top + PADDING),
            Pos2::new(PADDING + back_width, urlbar_bottom - PADDING),
        );
        let forward_width = self.measure(ctx, ">") + 2.0 * PADDING;
        let forward = Rect::from_min_max(
            Pos2::new(back.right() + PADDING, urlbar_top + PADDING),
            Pos2::new(back.right() + PADDING + forward_width, urlbar_bottom - PADDING),
        );
        let reload_width = self.measure(ctx, "R") + 2.0 * PADDING;
        let reload = Rect::from_min_max(
            Pos2::new(forward.right() + PADDING, urlbar_top + PADDING),
            Pos2::new(forward.right() + PADDING + reload_width, urlbar_bottom - PADDING),
        );
        let address = Rect::from_min_max(
            Pos2::new(reload.right() + PADDING, urlbar_top + PADDING),
            Pos2::new(self.width - PADDING, urlbar_bottom - PADDING),
        );
        ChromeRects {
            bottom: urlbar_bottom,
            tabbar_bottom,
            urlbar_top,
            newtab,
            back,
            forward,
            reload,
            address,
            tab_width: self.measure(ctx, "Tab X") + 2.0 * PADDING,
        }
    }

    fn tab_rect(&self, rects: &ChromeRects, index: usize) -> Rect {
        let tabs_start = rects.newtab.right() + PADDING;
        Rect::from_min_max(
            Pos2::new(tabs_start + rects.tab_width * index as f32, 0.0),
            Pos2::new(tabs_start + rects.tab_width * (index + 1) as f32, rects.tabbar_bottom),
        )
    }

    /// Routes a click inside the chrome. Address-bar clicks focus it and
    /// place the cursor; button and tab clicks come back as actions.
    pub fn click(
        &mut self,
        ctx: &Context,
        pos: Pos2,
        tab_count: usize,
        active_url: String,
    ) -> Option<ChromeAction> {
        let was_focused = self.focus == Some(ChromeFocus::AddressBar);
        self.focus = None;
        let rects = self.rects(ctx);

        if rects.newtab.contains(pos) {
            return Some(ChromeAction::NewTab);
        }
        if rects.back.contains(pos) {
            return Some(ChromeAction::Back);
        }
        if rects.forward.contains(pos) {
            return Some(ChromeAction::Forward);
        }
        if rects.reload.contains(pos) {
            return Some(ChromeAction::Reload);
        }
        if rects.address.contains(pos) {
            self.focus = Some(ChromeFocus::AddressBar);
            if !was_focused {
                self.address_bar = active_url;
            }
            let chars: Vec<char> = self.address_bar.chars().collect();
            self.cursor = chars.len();
            for i in 0..chars.len() {
                let prefix: String = chars[..=i].iter().collect();
                if rects.address.left() + PADDING + self.measure(ctx, &prefix) > pos.x {
                    self.cursor = i;
                    break;
                }
            }
            self.selection_start = None;
            self.selection_end = None;
            return None;
        }
        for index in 0..tab_count {
            if self.tab_rect(&rects, index).contains(pos) {
                return Some(ChromeAction::SelectTab(index));
            }
        }
        None
    }

    pub fn key_press(&mut self, ch: char) -> bool {
        if self.focus != Some(ChromeFocus::AddressBar) {
            return false;
        }
        self.delete_selection();
        let mut chars: Vec<char> = self.address_bar.chars().collect();
        let cursor = self.cursor.min(chars.len());
        chars.insert(cursor, ch);
        self.address_bar = chars.into_iter().collect();
        self.cursor = cursor + 1;
        true
    }

    pub fn backspace(&mut self) -> bool {
        if self.focus != Some(ChromeFocus::AddressBar) {
            return false;
        }
        if self.delete_selection() {
            return true;
        }
        if self.cursor > 0 {
            let mut chars: Vec<char> = self.address_bar.chars().collect();
            chars.remove(self.cursor - 1);
            self.address_bar = chars.into_iter().collect();
            self.cursor -= 1;
            return true;
        }
        false
    }

    pub fn arrow_left(&mut self, shift: bool) -> bool {
        if self.focus != Some(ChromeFocus::AddressBar) {
            return false;
        }
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        if shift {
            if self.selection_start.is_none() {
                self.selection_start = Some(self.cursor + 1);
            }
            self.selection_end = Some(self.cursor);
        } else {
            self.selection_start = None;
            self.selection_end = None;
        }
        true
    }

    pub fn arrow_right(&mut self, shift: bool) -> bool {
        if self.focus != Some(ChromeFocus::AddressBar) {
            return false;
        }
        if self.cursor >= self.address_bar.chars().count() {
            return false;
        }
        self.cursor += 1;
        if shift {
            if self.selection_start.is_none() {
                self.selection_start = Some(self.cursor - 1);
            }
            self.selection_end = Some(self.cursor);
        } else {
            self.selection_start = None;
            self.selection_end = None;
        }
        true
    }

    fn delete_selection(&mut self) -> bool {
        let (Some(a), Some(b)) = (self.selection_start, self.selection_end) else {
            return false;
        };
        let (start, end) = (a.min(b), a.max(b));
        let chars: Vec<char> = self.address_bar.chars().collect();
        self.address_bar = chars[..start.min(chars.len())]
            .iter()
            .chain(chars[end.min(chars.len())..].iter())
            .collect();
        self.cursor = start;
        self.selection_start = None;
        self.selection_end = None;
        true
    }

    pub fn copy(&self) -> Option<String> {
        let (Some(a), Some(b)) = (self.selection_start, self.selection_end) else {
            return None;
        };
        let (start, end) = (a.min(b), a.max(b));
        let selected: String = self.address_bar.chars().skip(start).take(end - start).collect();
        Some(selected)
    }

    pub fn paste(&mut self, text: &str) -> bool {
        if self.focus != Some(ChromeFocus::AddressBar) {
            return false;
        }
        self.delete_selection();
        let mut chars: Vec<char> = self.address_bar.chars().collect();
        let cursor = self.cursor.min(chars.len());
        for (offset, ch) in text.chars().enumerate() {
            chars.insert(cursor + offset, ch);
        }
        self.address_bar = chars.into_iter().collect();
        self.cursor = cursor + text.chars().count();
        true
    }

    pub fn cut(&mut self) -> Option<String> {
        if self.focus != Some(ChromeFocus::AddressBar) {
            return None;
        }
        let text = self.copy()?;
        self.delete_selection();
        Some(text)
    }

    /// Enter in the address bar: returns the URL to navigate to, either the
    /// text itself, an `https://` completion, or a web search.
    pub fn enter(&mut self) -> Option<Url> {
        if self.focus != Some(ChromeFocus::AddressBar) {
            return None;
        }
        let text = self.address_bar.trim().to_string();
        self.focus = None;
        if text.is_empty() {
            return None;
        }
        if is_url(&text) {
            let full = if text.contains("://") || text.starts_with("data:") {
                text
            } else {
                format!("https://{}", text)
            };
            Some(Url::parse(&full))
        } else {
            let query = utf8_percent_encode(&text, NON_ALPHANUMERIC).to_string();
            Some(Url::parse(&format!("{}{}", SEARCH_URL, query)))
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn paint(
        &self,
        ctx: &Context,
        tab_count: usize,
        active_tab: usize,
        can_go_back: bool,
        can_go_forward: bool,
        active_url: &str,
    ) -> Vec<DrawCommand> {
        let rects = self.rects(ctx);
        let mut cmds = Vec::new();

        // URL bar background and the line separating chrome from content.
        cmds.push(DrawRect::new(
            Rect::from_min_max(Pos2::new(0.0, rects.urlbar_top), Pos2::new(self.width, rects.bottom)),
            0.0,
            Color32::WHITE,
        ));
        cmds.push(DrawLine::new(
            Pos2::new(0.0, rects.bottom),
            Pos2::new(self.width, rects.bottom),
            Color32::BLACK,
            1.0,
        ));

        cmds.push(DrawOutline::new(rects.newtab, Color32::BLACK, 1.0));
        cmds.push(DrawText::new(
            Pos2::new(rects.newtab.left() + PADDING, rects.newtab.top()),
            fonts::layout_text(ctx, "+", &self.font_id),
            Color32::BLACK,
        ));

        for index in 0..tab_count {
            let bounds = self.tab_rect(&rects, index);
            cmds.push(DrawLine::new(
                Pos2::new(bounds.left(), 0.0),
                Pos2::new(bounds.left(), bounds.bottom()),
                Color32::BLACK,
                1.0,
            ));
            cmds.push(DrawLine::new(
                Pos2::new(bounds.right(), 0.0),
                Pos2::new(bounds.right(), bounds.bottom()),
                Color32::BLACK,
                1.0,
            ));
            cmds.push(DrawText::new(
                Pos2::new(bounds.left() + PADDING, bounds.top() + PADDING),
                fonts::layout_text(ctx, &format!("Tab {}", index), &self.font_id),
                Color32::BLACK,
            ));
            if index == active_tab {
                cmds.push(DrawLine::new(
                    Pos2::new(0.0, bounds.bottom()),
                    Pos2::new(bounds.left(), bounds.bottom()),
                    Color32::BLACK,
                    1.0,
                ));
                cmds.push(DrawLine::new(
                    Pos2::new(bounds.right(), bounds.bottom()),
                    Pos2::new(self.width, bounds.bottom()),
                    Color32::BLACK,
                    1.0,
                ));
            }
        }

        let back_color = if can_go_back { Color32::BLACK } else { Color32::GRAY };
        cmds.push(DrawOutline::new(rects.back, back_color, 1.0));
        cmds.push(DrawText::new(
            Pos2::new(rects.back.left() + PADDING, rects.back.top()),
            fonts::layout_text(ctx, "<", &self.font_id),
            back_color,
        ));

        let forward_color = if can_go_forward { Color32::BLACK } else { Color32::GRAY };
        cmds.push(DrawOutline::new(rects.forward, forward_color, 1.0));
        cmds.push(DrawText::new(
            Pos2::new(rects.forward.left() + PADDING, rects.forward.top()),
            fonts::layout_text(ctx, ">", &self.font_id),
            forward_color,
        ));

        cmds.push(DrawOutline::new(rects.reload, Color32::BLACK, 1.0));
        cmds.push(DrawText::new(
            Pos2::new(rects.reload.left() + PADDING, rects.reload.top()),
            fonts::layout_text(ctx, "R", &self.font_id),
            Color32::BLACK,
        ));

        cmds.push(DrawOutline::new(rects.address, Color32::BLACK, 1.0));
        if self.focus == Some(ChromeFocus::AddressBar) {
            let chars: Vec<char> = self.address_bar.chars().collect();
            if let (Some(a), Some(b)) = (self.selection_start, self.selection_end) {
                let (start, end) = (a.min(b), a.max(b));
                let start_prefix: String = chars[..start.min(chars.len())].iter().collect();
                let end_prefix: String = chars[..end.min(chars.len())].iter().collect();
                let start_x = rects.address.left() + PADDING + self.measure(ctx, &start_prefix);
                let end_x = rects.address.left() + PADDING + self.measure(ctx, &end_prefix);
                cmds.push(DrawRect::new(
                    Rect::from_min_max(
                        Pos2::new(start_x, rects.address.top() + PADDING),
                        Pos2::new(end_x, rects.address.bottom() - PADDING),
                    ),
                    0.0,
                    Color32::LIGHT_BLUE,
                ));
            }
            cmds.push(DrawText::new(
                Pos2::new(rects.address.left() + PADDING, rects.address.top()),
                fonts::layout_text(ctx, &self.address_bar, &self.font_id),
                Color32::BLACK,
            ));
            let prefix: String = chars[..self.cursor.min(chars.len())].iter().collect();
            let cursor_x = rects.address.left() + PADDING + self.measure(ctx, &prefix);
            cmds.push(DrawLine::new(
                Pos2::new(cursor_x, rects.address.top()),
                Pos2::new(cursor_x, rects.address.bottom()),
                Color32::RED,
                1.0,
            ));
        } else {
            cmds.push(DrawText::new(
                Pos2::new(rects.address.left() + PADDING, rects.address.top()),
                fonts::layout_text(ctx, active_url, &self.font_id),
                Color32::BLACK,
            ));
        }

        cmds
    }
}

/// Address-bar heuristic: URLs have a scheme, a `data:` prefix, or a dot
/// and no spaces; anything else is a search.
fn is_url(text: &str) -> bool {
    if text.starts_with("http://") || text.starts_with("https://") {
        return true;
    }
    if text.contains("://") || text.starts_with("data:") {
        return true;
    }
    text.contains('.') && !text.contains(' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::Scheme;
    use pretty_assertions::assert_eq;

    fn focused_chrome(text: &str) -> Chrome {
        let mut chrome = Chrome::new(800.0);
        chrome.focus = Some(ChromeFocus::AddressBar);
        chrome.address_bar = text.to_string();
        chrome.cursor = text.chars().count();
        chrome
    }

    #[test]
    fn url_heuristic() {
        assert!(is_url("http://example.org/"));
        assert!(is_url("example.org"));
        assert!(is_url("data:text/html,hi"));
        assert!(is_url("file:///home/"));
        assert!(!is_url("two words"));
        assert!(!is_url("plainword"));
    }

    #[test]
    fn enter_completes_bare_domains_with_https() {
        let mut chrome = focused_chrome("example.org");
        let url = chrome.enter().expect("navigates");
        assert_eq!(url.scheme, Scheme::Https);
        assert_eq!(url.host.as_deref(), Some("example.org"));
        assert_eq!(chrome.focus, None);
    }

    #[test]
    fn enter_searches_non_urls() {
        let mut chrome = focused_chrome("hello world");
        let url = chrome.enter().expect("navigates");
        assert_eq!(url.host.as_deref(), Some("www.google.com"));
        assert!(url.path.contains("hello%20world"));
    }

    #[test]
    fn editing_mirrors_an_input_field() {
        let mut chrome = focused_chrome("abc");
        assert!(chrome.key_press('d'));
        assert_eq!(chrome.address_bar, "abcd");
        assert!(chrome.backspace());
        assert!(chrome.backspace());
        assert_eq!(chrome.address_bar, "ab");
        assert_eq!(chrome.cursor, 2);

        // Shift-left twice selects "ab" backwards, cut removes it.
        assert!(chrome.arrow_left(true));
        assert!(chrome.arrow_left(true));
        assert_eq!(chrome.copy().as_deref(), Some("ab"));
        assert_eq!(chrome.cut().as_deref(), Some("ab"));
        assert_eq!(chrome.address_bar, "");
    }

    #[test]
    fn unfocused_chrome_ignores_keys() {
        let mut chrome = Chrome::new(800.0);
        assert!(!chrome.key_press('x'));
        assert!(!chrome.backspace());
        assert!(!chrome.arrow_left(false));
        assert!(chrome.enter().is_none());
    }

    #[test]
    fn paste_inserts_at_the_cursor() {
        let mut chrome = focused_chrome("ac");
        chrome.cursor = 1;
        assert!(chrome.paste("b"));
        assert_eq!(chrome.address_bar, "abc");
        assert_eq!(chrome.cursor, 2);
    }
}
