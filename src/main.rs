use anyhow::Result;
use tracing::info;

mod app;
mod error;
mod handler;
mod logging;
mod openai;
mod state;
mod storage;
mod store;
mod tui;
mod ui;

use app::App;
use storage::KvStore;
use tui::EventHandler;

#[tokio::main]
async fn main() -> Result<()> {
    let storage = KvStore::open_default()?;
    let _log_guard = logging::init(storage.dir())?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting chatwrap");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut app = App::new(storage);
    let mut events = EventHandler::new();

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    info!("exiting");
    Ok(())
}
