/// Ratatui-based TUI for chatterm.
///
/// Architecture:
///   main task:    event loop, the only owner of [`session::Session`]
///   background:   tokio::spawn'd operations, the push feed and the startup
///                 driver; each reports back through one `UiEvent` channel
///
/// Layout (connected):
///   ┌──────────────┬─────────────────────────────────┐
///   │ conversations│  messages (Min(0))              │
///   │  (1/4, ≥20)  ├─────────────────────────────────┤
///   │              │  compose (3 lines)              │
///   ├──────────────┴─────────────────────────────────┤
///   │  status bar (1 line)                           │
///   └────────────────────────────────────────────────┘
pub mod bridge;
pub mod compose;
pub mod detail;
pub mod editor;
pub mod list;
pub mod panels;
pub mod render;
pub mod session;

use std::io;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use crossterm::{
    event::{Event, EventStream, KeyEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{ChatService, ClientEvent, Pairing};
use crate::config::ConfigFile;
use crate::store::SessionStore;
use bridge::{OpResult, StartupEvent};
use compose::EditorOutcome;
use session::{Command, Session};

// ── UiEvent: everything the loop reacts to ───────────────────────────────────

#[derive(Debug, Clone)]
pub enum UiEvent {
    Key(KeyEvent),
    Resize(u16, u16),
    /// Animation / timeout tick
    Tick,
    /// A dispatched operation finished
    Op(OpResult),
    /// Pushed by the chat service
    Client(ClientEvent),
    Startup(StartupEvent),
    /// The external editor exited
    Editor(EditorOutcome),
}

// ── Terminal setup / teardown ─────────────────────────────────────────────────

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) {
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
}

// ── Main TUI run loop ─────────────────────────────────────────────────────────

pub async fn run(
    cfg: ConfigFile,
    chat: Arc<dyn ChatService>,
    pairing: Arc<dyn Pairing>,
    store: SessionStore,
    cancel: CancellationToken,
) -> Result<()> {
    // Bad keybindings should fail before the screen is taken over
    let session = Session::new(&cfg)?;

    let mut terminal = setup_terminal()?;

    // Panic hook: restore terminal before printing panic
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        orig_hook(info);
    }));

    let result = event_loop(&mut terminal, &cfg, session, chat, pairing, store, cancel.clone()).await;

    // Stop the push feed and stop waiting on anything in flight
    cancel.cancel();
    restore_terminal(&mut terminal);
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    cfg: &ConfigFile,
    mut session: Session,
    chat: Arc<dyn ChatService>,
    pairing: Arc<dyn Pairing>,
    store: SessionStore,
    cancel: CancellationToken,
) -> Result<()> {
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (editor_program, editor_args) = cfg.editor_command();

    bridge::start_session(chat.clone(), pairing, store, ui_tx.clone(), cancel.clone());

    let size = terminal.size()?;
    session.handle(UiEvent::Resize(size.width, size.height), Instant::now());
    terminal.draw(|f| render::draw(f, &session))?;

    let mut crossterm_events = EventStream::new();
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_millis(120));

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancelled, leaving event loop");
                break;
            }

            // ── Animation tick ────────────────────────────────────────────────
            _ = ticker.tick() => UiEvent::Tick,

            // ── Background results and pushed events ──────────────────────────
            Some(ev) = ui_rx.recv() => ev,

            // ── Keyboard/resize events ────────────────────────────────────────
            Some(Ok(ev)) = crossterm_events.next() => match ev {
                Event::Key(key) => UiEvent::Key(key),
                Event::Resize(w, h) => UiEvent::Resize(w, h),
                _ => continue,
            },
        };

        let redraw = !matches!(event, UiEvent::Tick) || session.is_animating();
        let mut quit = false;
        let mut editor_seed = None;

        for cmd in session.handle(event, Instant::now()) {
            match cmd {
                Command::Op(op) => {
                    bridge::dispatch(chat.clone(), op, ui_tx.clone(), cancel.clone());
                }
                Command::OpenEditor { initial } => editor_seed = Some(initial),
                Command::Quit => quit = true,
            }
        }
        if quit {
            debug!("quit requested");
            break;
        }

        if let Some(initial) = editor_seed {
            // The editor owns stdin until it exits; no reader may compete for it
            drop(crossterm_events);
            let outcome =
                compose::compose_in_terminal(terminal, &editor_program, &editor_args, &initial).await;
            crossterm_events = EventStream::new();
            let _ = ui_tx.send(UiEvent::Editor(outcome));
            terminal.draw(|f| render::draw(f, &session))?;
            continue;
        }

        if redraw {
            terminal.draw(|f| render::draw(f, &session))?;
        }
    }

    Ok(())
}
