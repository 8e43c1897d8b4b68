mod app;
mod config;
mod logging;
mod theme;
mod transport;
mod ui;

use anyhow::Result;
use app::{App, HeaderInfo, TerminalView};
use clap::Parser;
use crossterm::{
    event::{DisableFocusChange, EnableFocusChange, EventStream},
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
    },
};
use futures_util::StreamExt;
use ltail_core::Client;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};
use transport::{TransportEvent, WsTransport};

type Term = Terminal<CrosstermBackend<io::Stdout>>;
type TailClient = Client<WsTransport, TerminalView>;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config(config::Args::parse())?;
    let log_guard = logging::init_logging(&config);
    if let Some(path) = log_guard.as_ref().and_then(|guard| guard.path()) {
        info!(event = "log_file", path = %path.display());
    }
    info!(
        event = "startup",
        url = %config.server_url,
        location = %config.initial,
        keepalive_ms = config.client.keepalive.as_millis() as u64
    );

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let transport = WsTransport::new(config.server_url.clone(), event_tx);
    let mut client = Client::new(
        config.client.clone(),
        config.initial.clone(),
        transport,
        TerminalView::new(config.max_lines),
    );
    let mut app = App::default();

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut client, &mut app, &mut event_rx).await;
    restore_terminal(&mut terminal)?;

    if let Err(err) = &result {
        warn!(event = "exit_error", error = %err);
        eprintln!("ltail: {err}");
    }
    Ok(())
}

fn setup_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app(
    terminal: &mut Term,
    client: &mut TailClient,
    app: &mut App,
    socket_rx: &mut mpsc::Receiver<TransportEvent>,
) -> Result<()> {
    let mut events = EventStream::new();
    client.start(Instant::now());

    loop {
        if let Some(title) = client.view_mut().take_title() {
            execute!(terminal.backend_mut(), SetTitle(title))?;
        }
        let header = HeaderInfo::from_client(client);
        terminal.draw(|f| ui::render(f, &header, app, client.view_mut()))?;

        let deadline = client.next_deadline();
        tokio::select! {
            Some(TransportEvent { id, event }) = socket_rx.recv() => {
                client.handle_socket(Instant::now(), id, event);
            }
            maybe_event = events.next() => match maybe_event {
                Some(Ok(event)) => app.handle_event(client, event, Instant::now()),
                Some(Err(err)) => return Err(err.into()),
                None => break,
            },
            _ = sleep_until(deadline) => {
                client.poll_timers(Instant::now());
            }
        }

        if app.should_quit() {
            break;
        }
    }
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
