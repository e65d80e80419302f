mod browser;
mod chrome;
mod css_parser;
mod display;
mod fonts;
mod html_parser;
mod layout;
mod node;
mod script;
mod selector;
mod style;
mod tab;
mod url;

use browser::{Browser, HEIGHT, WIDTH};
use url::Url;

const DEFAULT_URL: &str = "file:///home/";

fn main() -> eframe::Result<()> {
    env_logger::init();

    let start = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    let start_url = Url::parse(&start);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([WIDTH, HEIGHT]),
        ..Default::default()
    };
    eframe::run_native(
        "Skiff",
        options,
        Box::new(move |cc| Ok(Box::new(Browser::new(cc, start_url)))),
    )
}
