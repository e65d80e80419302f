use eframe::egui;
use egui::{Color32, Context, Event, Key, PointerButton, Pos2, ViewportCommand};
use log::warn;

use crate::chrome::{Chrome, ChromeAction, ChromeFocus};
use crate::fonts;
use crate::tab::Tab;
use crate::url::Url;

pub const WIDTH: f32 = 800.0;
pub const HEIGHT: f32 = 600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFocus {
    Content,
}

/// The shell: the tab set, the chrome, and the event loop. Each frame
/// drains the input events, applies them synchronously, then repaints.
pub struct Browser {
    tabs: Vec<Tab>,
    active_tab: usize,
    chrome: Chrome,
    focus: Option<BrowserFocus>,
    width: f32,
    height: f32,
    start_url: Option<Url>,
    last_title: String,
}

impl Browser {
    pub fn new(cc: &eframe::CreationContext<'_>, start_url: Url) -> Browser {
        cc.egui_ctx.set_visuals(egui::Visuals::light());
        fonts::install(&cc.egui_ctx);
        Browser {
            tabs: Vec::new(),
            active_tab: 0,
            chrome: Chrome::new(WIDTH),
            focus: None,
            width: WIDTH,
            height: HEIGHT,
            start_url: Some(start_url),
            last_title: String::new(),
        }
    }

    pub fn new_tab(&mut self, ctx: &Context, url: Url) {
        let content_height = self.height - self.chrome.bottom(ctx);
        let mut tab = Tab::new(self.width, content_height);
        if let Err(err) = tab.load(ctx, url, None, false) {
            warn!("error loading page: {}", err);
        }
        self.tabs.push(tab);
        self.active_tab = self.tabs.len() - 1;
    }

    fn active_tab_mut(&mut self) -> Option<&mut Tab> {
        self.tabs.get_mut(self.active_tab)
    }

    fn active_url_string(&self) -> String {
        self.tabs
            .get(self.active_tab)
            .and_then(|tab| tab.url.as_ref())
            .map(|url| url.to_string())
            .unwrap_or_default()
    }

    fn handle_event(&mut self, ctx: &Context, event: Event) {
        match event {
            Event::PointerButton {
                pos,
                button: PointerButton::Primary,
                pressed: true,
                ..
            } => self.handle_click(ctx, pos),
            Event::Text(text) => {
                for ch in text.chars() {
                    if (' '..='~').contains(&ch) {
                        self.handle_key(ctx, ch);
                    }
                }
            }
            Event::Key {
                key,
                pressed: true,
                modifiers,
                ..
            } => match key {
                Key::ArrowDown => {
                    if let Some(tab) = self.active_tab_mut() {
                        tab.scrolldown();
                    }
                }
                Key::ArrowUp => {
                    if let Some(tab) = self.active_tab_mut() {
                        tab.scrollup();
                    }
                }
                Key::ArrowLeft => self.handle_arrow_left(ctx, modifiers.shift),
                Key::ArrowRight => self.handle_arrow_right(ctx, modifiers.shift),
                Key::Enter => self.handle_enter(ctx),
                Key::Backspace => self.handle_backspace(ctx),
                _ => {}
            },
            Event::MouseWheel { delta, .. } => {
                if let Some(tab) = self.active_tab_mut() {
                    tab.mousewheel(delta.y);
                }
            }
            Event::Copy => self.handle_copy(ctx),
            Event::Cut => self.handle_cut(ctx),
            Event::Paste(text) => self.handle_paste(ctx, &text),
            _ => {}
        }
    }

    /// Pointer events above the chrome line go to the chrome, everything
    /// else to the active tab with the y-axis shifted into page space.
    fn handle_click(&mut self, ctx: &Context, pos: Pos2) {
        let chrome_bottom = self.chrome.bottom(ctx);
        if pos.y < chrome_bottom {
            self.focus = None;
            let active_url = self.active_url_string();
            let action = self.chrome.click(ctx, pos, self.tabs.len(), active_url);
            match action {
                Some(ChromeAction::NewTab) => self.new_tab(ctx, Url::parse("about:blank")),
                Some(ChromeAction::Back) => {
                    if let Some(tab) = self.active_tab_mut() {
                        tab.go_back(ctx);
                    }
                }
                Some(ChromeAction::Forward) => {
                    if let Some(tab) = self.active_tab_mut() {
                        tab.go_forward(ctx);
                    }
                }
                Some(ChromeAction::Reload) => {
                    if let Some(tab) = self.active_tab_mut() {
                        tab.reload(ctx);
                    }
                }
                Some(ChromeAction::SelectTab(index)) => self.active_tab = index,
                None => {}
            }
        } else {
            self.focus = Some(BrowserFocus::Content);
            self.chrome.blur();
            let tab_y = pos.y - chrome_bottom;
            if let Some(tab) = self.tabs.get_mut(self.active_tab) {
                tab.click(ctx, pos.x, tab_y);
            }
        }
    }

    fn handle_key(&mut self, ctx: &Context, ch: char) {
        if self.chrome.key_press(ch) {
            return;
        }
        if self.focus == Some(BrowserFocus::Content) {
            if let Some(tab) = self.active_tab_mut() {
                tab.key_press(ctx, ch);
            }
        }
    }

    fn handle_enter(&mut self, ctx: &Context) {
        if self.chrome.focus == Some(ChromeFocus::AddressBar) {
            if let Some(url) = self.chrome.enter() {
                if let Some(tab) = self.active_tab_mut() {
                    if let Err(err) = tab.load(ctx, url, None, false) {
                        warn!("error loading page: {}", err);
                    }
                }
            }
        } else if self.focus == Some(BrowserFocus::Content) {
            if let Some(tab) = self.active_tab_mut() {
                tab.enter(ctx);
            }
        }
    }

    fn handle_backspace(&mut self, ctx: &Context) {
        if self.chrome.backspace() {
            return;
        }
        if self.focus == Some(BrowserFocus::Content) {
            if let Some(tab) = self.active_tab_mut() {
                tab.backspace(ctx);
            }
        }
    }

    fn handle_arrow_left(&mut self, ctx: &Context, shift: bool) {
        if self.chrome.arrow_left(shift) {
            return;
        }
        if self.focus == Some(BrowserFocus::Content) {
            if let Some(tab) = self.active_tab_mut() {
                tab.arrow_left(ctx, shift);
            }
        }
    }

    fn handle_arrow_right(&mut self, ctx: &Context, shift: bool) {
        if self.chrome.arrow_right(shift) {
            return;
        }
        if self.focus == Some(BrowserFocus::Content) {
            if let Some(tab) = self.active_tab_mut() {
                tab.arrow_right(ctx, shift);
            }
        }
    }

    fn handle_copy(&mut self, ctx: &Context) {
        let text = if self.chrome.focus == Some(ChromeFocus::AddressBar) {
            self.chrome.copy()
        } else if self.focus == Some(BrowserFocus::Content) {
            self.tabs.get(self.active_tab).and_then(Tab::copy)
        } else {
            None
        };
        if let Some(text) = text {
            ctx.copy_text(text);
        }
    }

    fn handle_cut(&mut self, ctx: &Context) {
        let text = if self.chrome.focus == Some(ChromeFocus::AddressBar) {
            self.chrome.cut()
        } else if self.focus == Some(BrowserFocus::Content) {
            self.active_tab_mut().and_then(|tab| tab.cut(ctx))
        } else {
            None
        };
        if let Some(text) = text {
            ctx.copy_text(text);
        }
    }

    fn handle_paste(&mut self, ctx: &Context, text: &str) {
        if self.chrome.paste(text) {
            return;
        }
        if self.focus == Some(BrowserFocus::Content) {
            if let Some(tab) = self.active_tab_mut() {
                tab.paste(ctx, text);
            }
        }
    }

    fn handle_resize(&mut self, ctx: &Context) {
        let screen = ctx.screen_rect();
        if screen.width() == self.width && screen.height() == self.height {
            return;
        }
        self.width = screen.width();
        self.height = screen.height();
        self.chrome.resize(self.width);
        let content_height = self.height - self.chrome.bottom(ctx);
        let width = self.width;
        if let Some(tab) = self.active_tab_mut() {
            tab.resize(ctx, width, content_height);
        }
    }

    fn draw(&mut self, ctx: &Context) {
        let chrome_bottom = self.chrome.bottom(ctx);
        let can_go_back = self
            .tabs
            .get(self.active_tab)
            .map(|tab| tab.history.len() > 1)
            .unwrap_or(false);
        let can_go_forward = self
            .tabs
            .get(self.active_tab)
            .map(|tab| !tab.forward_history.is_empty())
            .unwrap_or(false);
        let url_string = self.active_url_string();
        let chrome_cmds = self.chrome.paint(
            ctx,
            self.tabs.len(),
            self.active_tab,
            can_go_back,
            can_go_forward,
            &url_string,
        );

        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(Color32::WHITE))
            .show(ctx, |ui| {
                let painter = ui.painter();
                if let Some(tab) = self.tabs.get(self.active_tab) {
                    tab.draw(painter, chrome_bottom);
                }
                for command in &chrome_cmds {
                    command.execute(0.0, painter, 1.0);
                }
            });

        let title = self
            .tabs
            .get(self.active_tab)
            .and_then(Tab::get_title)
            .unwrap_or(url_string);
        if title != self.last_title {
            ctx.send_viewport_cmd(ViewportCommand::Title(title.clone()));
            self.last_title = title;
        }
    }
}

impl eframe::App for Browser {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.handle_resize(ctx);
        if self.tabs.is_empty() {
            if let Some(url) = self.start_url.take() {
                self.new_tab(ctx, url);
            }
        }
        let events = ctx.input(|input| input.events.clone());
        for event in events {
            self.handle_event(ctx, event);
        }
        self.draw(ctx);
    }
}
