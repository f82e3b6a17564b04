use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::Duration;

use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};

pub mod dnd;
pub mod error;
pub mod events;
pub mod ids;
pub mod logging;
pub mod nav;
pub mod persistence;
pub mod render;
pub mod search;
pub mod separator;
pub mod settings;
pub mod store;
pub mod sync;
pub mod view;

mod app;
mod theme;
mod types;
mod ui;
mod util;

use app::App;
use persistence::{JsonFileKv, default_store_path, log_dir, state_dir, state_file_path};
use settings::Settings;
use store::{JsonFileStore, StoreClient, ThreadedTransport};
use sync::TreeSynchronizer;
use ui::draw;

const IDLE_POLL_MS: u64 = 100;
const BUSY_POLL_MS: u64 = 20;

pub fn run() -> io::Result<()> {
    if std::env::args().any(|a| a == "--help" || a == "-h") {
        println!("Usage: marktree [OPTIONS] [FILE]");
        println!();
        println!("Arguments:");
        println!(
            "  [FILE]    Bookmark file to edit (default: {})",
            default_store_path().display()
        );
        println!();
        println!("Options:");
        println!("  --help    Show this help message");
        println!();
        println!("Logs are written to {} (RUST_LOG sets the level)", log_dir().display());
        return Ok(());
    }

    let store_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_store_path);
    if store_path.is_dir() {
        eprintln!("Bookmark path is a directory: {}", store_path.display());
        return Ok(());
    }

    let _log_guard = logging::init(&log_dir());

    let store = match JsonFileStore::open(&store_path) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Cannot open bookmark file {}: {err}", store_path.display());
            return Ok(());
        }
    };
    let kv = JsonFileKv::open(state_file_path().unwrap_or_else(|| state_dir().join("state.json")));
    let settings = Settings::load(&kv);
    let client = StoreClient::new(ThreadedTransport::spawn(store));
    let sync = TreeSynchronizer::new(client, Box::new(kv), &settings);
    let theme = theme::load_theme(&state_dir().join("theme.json"));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;

    let enhanced_keys =
        ratatui::crossterm::terminal::supports_keyboard_enhancement().unwrap_or(false);
    if enhanced_keys {
        let _ = execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        );
    }

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(info);
    }));

    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;

    let app = App::new(sync, settings, theme, store_path);
    let result = run_app(terminal, app);

    disable_raw_mode()?;
    let mut stdout = io::stdout();
    if enhanced_keys {
        let _ = execute!(stdout, PopKeyboardEnhancementFlags);
    }
    execute!(stdout, LeaveAlternateScreen, DisableMouseCapture)?;

    result
}

fn run_app(mut terminal: Terminal<CrosstermBackend<Stdout>>, mut app: App) -> io::Result<()> {
    loop {
        app.poll_store();
        app.poll_store_changes();
        app.tick_drag();
        terminal.draw(|f| draw(&mut app, f))?;
        if app.quit {
            break;
        }
        // Replies and auto-scroll ticks need a quicker turnaround than keyboard input.
        let timeout = if app.drag.is_auto_scrolling() || app.sync.has_pending() {
            BUSY_POLL_MS
        } else {
            IDLE_POLL_MS
        };
        if event::poll(Duration::from_millis(timeout))? {
            loop {
                match event::read()? {
                    Event::Key(key) if key.kind != KeyEventKind::Release => {
                        if let Err(err) = app.handle_key(key) {
                            app.set_status(format!("Action failed: {err}"));
                        }
                    }
                    Event::Mouse(mouse) => {
                        if let Err(err) = app.handle_mouse(mouse) {
                            app.set_status(format!("Action failed: {err}"));
                        }
                    }
                    _ => {}
                }
                if app.quit || !event::poll(Duration::ZERO)? {
                    break;
                }
            }
        }
        if app.quit {
            break;
        }
    }
    app.persist_state();
    Ok(())
}
