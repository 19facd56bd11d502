use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{error, info, warn};
use zeroize::Zeroize;

use crate::backend::Backend;
use crate::card::{copy_to_clipboard, open_service_url};
use crate::controller::Controller;
use crate::dialog::{DialogAction, KeyDialog, SubmitOutcome};
use crate::grid::KeyStats;
use crate::header::HeaderState;
use crate::logging;
use crate::models::{new_user_id, ApiKey, User};
use crate::notify::ToastVariant;
use crate::storage::{
    ensure_dir, lock_remaining, resolve_data_dir, save_config, LocalBackend, LocalOptions, LOG_FILE,
};
use crate::ui::{
    draw, draw_loading, draw_sign_in, grid_columns, prompt_line, prompt_new_master_password,
    SignInState, ViewState,
};

const IDLE_TIMEOUT_SECS: u64 = 300;
const TICK: Duration = Duration::from_millis(150);
const DASHBOARD_HINT: &str =
    "/ search | Tab category | ←↑↓→ move | n add | e edit | v reveal | c copy | o open | t toggle | d delete | u account | q quit";
const SIGN_IN_HINT: &str = "Enter passphrase to sign in (Ctrl+h show/hide, Esc quit)";

#[derive(Parser, Debug)]
#[command(name = "keyledger", version, about = "Keep track of your API keys from the terminal")]
pub struct Cli {
    /// Directory holding the sealed store, lock file and log.
    #[arg(long, env = "KEYLEDGER_DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Create a new store, prompting for profile and passphrase.
    #[arg(long)]
    pub init: bool,

    /// Log filter directive, e.g. `debug` or `keyledger=trace`.
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = resolve_data_dir(cli.data_dir.as_deref())?;
    ensure_dir(&data_dir)?;
    logging::init(
        &data_dir.join(LOG_FILE),
        &logging::directive(cli.log_level.as_deref()),
    )?;
    info!(version = env!("CARGO_PKG_VERSION"), data_dir = %data_dir.display(), "starting");

    let local = Arc::new(LocalBackend::open(&data_dir, LocalOptions::default()));
    if needs_initialization(cli.init, &local)? {
        initialize_store(&local)?;
        if cli.data_dir.is_some() {
            remember_data_dir(&data_dir);
        }
    }

    let lock_file = local.lock_path();
    let mut controller = Controller::new(Backend::from_shared(local));
    let result = run_tui(&mut controller, &lock_file);
    controller.shutdown();
    if let Err(e) = &result {
        error!(error = %e, "terminal session ended with an error");
    }
    info!("exiting");
    result
}

/// `--init` against an existing store is refused before any prompt.
fn needs_initialization(requested: bool, backend: &LocalBackend) -> Result<bool> {
    if backend.is_initialized() {
        if requested {
            bail!(
                "A key store already exists at {}",
                backend.vault_path().display()
            );
        }
        return Ok(false);
    }
    Ok(true)
}

fn remember_data_dir(dir: &Path) {
    match save_config(dir) {
        Ok(saved) => info!(data_dir = %saved.display(), "data directory saved as default"),
        Err(e) => {
            warn!(error = %e, "data directory not saved as default");
            println!("Note: {e}. Pass --data-dir again on the next run.");
        }
    }
}

fn initialize_store(backend: &LocalBackend) -> Result<()> {
    println!("Welcome to KeyLedger! Let's create your local key store.");
    let email = loop {
        let email = prompt_line("Email: ")?;
        if email.contains('@') {
            break email;
        }
        println!("Please enter a valid email address.");
    };
    let display_name = prompt_line("Display name (optional): ")?;
    let mut passphrase = prompt_new_master_password()?;

    let profile = User {
        id: new_user_id(),
        email,
        display_name: (!display_name.is_empty()).then_some(display_name),
    };
    let result = backend.initialize(profile, &passphrase);
    passphrase.zeroize();
    result?;
    println!("Store created in {}", backend.dir().display());
    Ok(())
}

enum Flow {
    Continue,
    Quit,
}

/// Front-end state that does not belong to the controller.
struct Session {
    header: HeaderState,
    selected: usize,
    columns: usize,
    revealed: Option<String>,
    add_dialog: KeyDialog,
    edit_dialog: Option<KeyDialog>,
    quit_overlay: bool,
    passphrase: String,
    show_passphrase: bool,
    anim_frame: usize,
    last_activity: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            header: HeaderState::default(),
            selected: 0,
            columns: 1,
            revealed: None,
            add_dialog: KeyDialog::new(),
            edit_dialog: None,
            quit_overlay: false,
            passphrase: String::new(),
            show_passphrase: false,
            anim_frame: 0,
            last_activity: Instant::now(),
        }
    }

    /// Forgets everything tied to the signed-in user.
    fn clear_signed_in_state(&mut self) {
        self.header = HeaderState::default();
        self.selected = 0;
        self.revealed = None;
        self.add_dialog = KeyDialog::new();
        self.edit_dialog = None;
    }

    fn visible<'a>(&self, controller: &'a Controller) -> Vec<&'a ApiKey> {
        controller.filtered(&self.header.query, self.header.category)
    }

    fn selected_key(&self, controller: &Controller) -> Option<ApiKey> {
        self.visible(controller).get(self.selected).map(|k| (*k).clone())
    }

    fn clamp_selection(&mut self, controller: &Controller) {
        let len = self.visible(controller).len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.passphrase.zeroize();
    }
}

fn run_tui(controller: &mut Controller, lock_file: &Path) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, crossterm::cursor::Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut session = Session::new();
    let mut last_tick = Instant::now();

    let result = (|| -> Result<()> {
        loop {
            controller.pump_auth_events();
            controller.toaster_mut().expire(Instant::now());
            if last_tick.elapsed() >= TICK {
                session.anim_frame = session.anim_frame.wrapping_add(1);
                last_tick = Instant::now();
            }

            if controller.user().is_some()
                && session.last_activity.elapsed() >= Duration::from_secs(IDLE_TIMEOUT_SECS)
            {
                info!("idle timeout reached, signing out");
                controller.sign_out();
                session.clear_signed_in_state();
                controller
                    .toaster_mut()
                    .push("Signed out", "Signed out after inactivity", ToastVariant::Default);
            }

            terminal.draw(|f| render(f, controller, &mut session, lock_file))?;

            if !event::poll(Duration::from_millis(200))? {
                continue;
            }
            if let Event::Key(key) = event::read()? {
                session.last_activity = Instant::now();
                let flow = if controller.is_loading() {
                    match key.code {
                        KeyCode::Esc => Flow::Quit,
                        _ => Flow::Continue,
                    }
                } else if controller.user().is_none() {
                    handle_sign_in_key(controller, &mut session, key, lock_file)
                } else {
                    handle_dashboard_key(controller, &mut session, key)
                };
                if let Flow::Quit = flow {
                    break;
                }
            }
        }
        Ok(())
    })();

    teardown_terminal(&mut terminal);
    result
}

fn render(
    f: &mut ratatui::Frame<'_>,
    controller: &Controller,
    session: &mut Session,
    lock_file: &Path,
) {
    if controller.is_loading() {
        draw_loading(f, session.anim_frame);
        return;
    }

    let Some(user) = controller.user() else {
        let input_display = if session.show_passphrase {
            session.passphrase.clone()
        } else {
            "•".repeat(session.passphrase.chars().count())
        };
        let status = controller
            .toaster()
            .current()
            .map(|t| t.description.as_str())
            .unwrap_or(SIGN_IN_HINT);
        let view = SignInState {
            status,
            input_display: &input_display,
            input_visible: session.show_passphrase,
            anim_frame: session.anim_frame,
            locked_for: lock_remaining(lock_file).ok().flatten(),
        };
        draw_sign_in(f, &view);
        return;
    };

    session.columns = grid_columns(f.size().width);
    let visible = session.visible(controller);
    let view = ViewState {
        user,
        header: &session.header,
        keys: &visible,
        stats: KeyStats::collect(visible.iter().copied(), Utc::now()),
        has_records: !controller.keys().is_empty(),
        selected: session.selected,
        revealed: session.revealed.as_deref(),
        now: Utc::now(),
        dialog: session
            .edit_dialog
            .as_ref()
            .or(controller.is_add_dialog_open().then_some(&session.add_dialog)),
        quit_overlay: session.quit_overlay,
        toast: controller.toaster().current(),
        status: DASHBOARD_HINT,
    };
    draw(f, &view);
}

fn handle_sign_in_key(
    controller: &mut Controller,
    session: &mut Session,
    key: KeyEvent,
    lock_file: &Path,
) -> Flow {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('h') | KeyCode::Char('H') if ctrl => {
            session.show_passphrase = !session.show_passphrase;
        }
        KeyCode::Esc => return Flow::Quit,
        KeyCode::Enter => {
            if let Ok(Some(secs)) = lock_remaining(lock_file) {
                warn!(remaining = secs, "sign-in attempted while locked");
                session.passphrase.zeroize();
                return Flow::Continue;
            }
            if controller.sign_in(&session.passphrase) {
                session.clear_signed_in_state();
                session.show_passphrase = false;
            }
            session.passphrase.zeroize();
        }
        KeyCode::Backspace => {
            session.passphrase.pop();
        }
        KeyCode::Char(c) if !ctrl => session.passphrase.push(c),
        _ => {}
    }
    Flow::Continue
}

fn handle_dialog_outcome(controller: &mut Controller, outcome: SubmitOutcome) -> bool {
    match outcome {
        SubmitOutcome::Saved | SubmitOutcome::Unchanged => true,
        SubmitOutcome::Blocked(message) => {
            controller.toaster_mut().error(message);
            false
        }
        SubmitOutcome::Failed => false,
    }
}

fn handle_dashboard_key(controller: &mut Controller, session: &mut Session, key: KeyEvent) -> Flow {
    if session.quit_overlay {
        match key.code {
            KeyCode::Char('y') => return Flow::Quit,
            KeyCode::Char('n') | KeyCode::Esc => session.quit_overlay = false,
            _ => {}
        }
        return Flow::Continue;
    }

    if let Some(dialog) = session.edit_dialog.as_mut() {
        match dialog.handle_key(key) {
            DialogAction::Cancel => session.edit_dialog = None,
            DialogAction::Submit => {
                let outcome = dialog.submit(controller);
                if handle_dialog_outcome(controller, outcome) {
                    session.edit_dialog = None;
                }
            }
            DialogAction::None => {}
        }
        return Flow::Continue;
    }

    if controller.is_add_dialog_open() {
        match session.add_dialog.handle_key(key) {
            // the draft survives closing and reopening
            DialogAction::Cancel => controller.close_add_dialog(),
            DialogAction::Submit => {
                let outcome = session.add_dialog.submit(controller);
                if handle_dialog_outcome(controller, outcome) {
                    session.selected = 0;
                }
            }
            DialogAction::None => {}
        }
        return Flow::Continue;
    }

    if session.header.user_menu_open {
        match key.code {
            KeyCode::Char('l') => sign_out(controller, session),
            KeyCode::Esc | KeyCode::Char('u') => session.header.user_menu_open = false,
            _ => {}
        }
        return Flow::Continue;
    }

    if session.header.search_focused {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc | KeyCode::Enter => session.header.search_focused = false,
            KeyCode::Backspace => session.header.pop_char(),
            KeyCode::Char('u') if ctrl => session.header.clear_query(),
            KeyCode::Char(c) if !ctrl => session.header.push_char(c),
            _ => {}
        }
        session.selected = 0;
        return Flow::Continue;
    }

    let count = session.visible(controller).len();
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => session.quit_overlay = true,
        KeyCode::Char('/') => session.header.search_focused = true,
        KeyCode::Tab => {
            session.header.next_category();
            session.selected = 0;
        }
        KeyCode::BackTab => {
            session.header.prev_category();
            session.selected = 0;
        }
        KeyCode::Left => session.selected = session.selected.saturating_sub(1),
        KeyCode::Right => session.selected = (session.selected + 1).min(count.saturating_sub(1)),
        KeyCode::Up => session.selected = session.selected.saturating_sub(session.columns),
        KeyCode::Down => {
            let next = session.selected + session.columns;
            if next < count {
                session.selected = next;
            }
        }
        KeyCode::Char('n') => controller.open_add_dialog(),
        KeyCode::Char('e') => {
            if let Some(selected) = session.selected_key(controller) {
                session.edit_dialog = Some(KeyDialog::edit(&selected));
            }
        }
        KeyCode::Char('v') => {
            if let Some(selected) = session.selected_key(controller) {
                session.revealed = match session.revealed.take() {
                    Some(id) if id == selected.id => None,
                    _ => Some(selected.id),
                };
            }
        }
        KeyCode::Enter | KeyCode::Char('c') => {
            if let Some(selected) = session.selected_key(controller) {
                match copy_to_clipboard(&selected.api_key) {
                    Ok(()) => controller.toaster_mut().push(
                        "Copied!",
                        "API key copied to clipboard",
                        ToastVariant::Default,
                    ),
                    Err(e) => {
                        error!(error = %e, "clipboard copy failed");
                        controller.toaster_mut().error("Failed to copy API key");
                    }
                }
            }
        }
        KeyCode::Char('o') => {
            if let Some(selected) = session.selected_key(controller) {
                match selected.service_url.as_deref() {
                    Some(url) => {
                        if let Err(e) = open_service_url(url) {
                            error!(error = %e, "failed to open service URL");
                            controller.toaster_mut().error("Failed to open service URL");
                        }
                    }
                    None => controller.toaster_mut().error("No service URL set"),
                }
            }
        }
        KeyCode::Char('t') => {
            if let Some(selected) = session.selected_key(controller) {
                controller.toggle_active(&selected.id);
            }
        }
        KeyCode::Char('d') => {
            if let Some(selected) = session.selected_key(controller) {
                if controller.delete_key(&selected.id) {
                    session.clamp_selection(controller);
                }
            }
        }
        KeyCode::Char('r') => {
            controller.load_keys();
            session.clamp_selection(controller);
        }
        KeyCode::Char('u') => session.header.user_menu_open = true,
        KeyCode::Char('l') => sign_out(controller, session),
        KeyCode::Char('x') => controller.toaster_mut().dismiss(),
        _ => {}
    }
    Flow::Continue
}

fn sign_out(controller: &mut Controller, session: &mut Session) {
    controller.sign_out();
    session.clear_signed_in_state();
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) {
    disable_raw_mode().ok();
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        crossterm::cursor::Show
    )
    .ok();
    terminal.show_cursor().ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::models::{Category, CategoryFilter, KeyDraft};
    use std::sync::Arc;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn signed_in() -> (Arc<MemoryBackend>, Controller, Session) {
        let memory = MemoryBackend::new(User {
            id: "user_1".into(),
            email: "ada@example.com".into(),
            display_name: None,
        });
        let mut controller = Controller::new(Backend::from_shared(memory.clone()));
        controller.pump_auth_events();
        assert!(controller.sign_in("letmein"));
        (memory, controller, Session::new())
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "keyledger",
            "--data-dir",
            "/tmp/kl",
            "--init",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.data_dir.as_deref(), Some(Path::new("/tmp/kl")));
        assert!(cli.init);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn sign_in_screen_submits_typed_passphrase() {
        let memory = MemoryBackend::new(User {
            id: "user_1".into(),
            email: "ada@example.com".into(),
            display_name: None,
        });
        let mut controller = Controller::new(Backend::from_shared(memory));
        controller.pump_auth_events();
        let mut session = Session::new();
        let lock_file = Path::new("/nonexistent/keyledger/lock.json");
        for c in "letmein".chars() {
            handle_sign_in_key(&mut controller, &mut session, press(KeyCode::Char(c)), lock_file);
        }
        handle_sign_in_key(&mut controller, &mut session, press(KeyCode::Enter), lock_file);
        assert!(controller.user().is_some());
        assert!(session.passphrase.is_empty());
    }

    #[test]
    fn add_dialog_flow_from_dashboard() {
        let (_memory, mut controller, mut session) = signed_in();
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('n')));
        assert!(controller.is_add_dialog_open());
        session.add_dialog.name = "OpenAI".into();
        session.add_dialog.api_key = "sk-abc123xyz789".into();
        handle_dashboard_key(
            &mut controller,
            &mut session,
            KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL),
        );
        assert!(!controller.is_add_dialog_open());
        assert_eq!(controller.keys().len(), 1);
        assert!(session.add_dialog.name.is_empty());
    }

    #[test]
    fn closing_the_add_dialog_keeps_the_draft() {
        let (_memory, mut controller, mut session) = signed_in();
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('n')));
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('S')));
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Esc));
        assert!(!controller.is_add_dialog_open());
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('n')));
        assert_eq!(session.add_dialog.name, "S");
    }

    #[test]
    fn toggle_and_delete_act_on_the_selected_card() {
        let (_memory, mut controller, mut session) = signed_in();
        controller.add_key(KeyDraft::new("A", "secret-a-123"));

        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('t')));
        assert!(!controller.keys()[0].is_active);

        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('d')));
        assert!(controller.keys().is_empty());
        assert_eq!(session.selected, 0);
    }

    #[test]
    fn search_and_category_narrow_the_selection_scope() {
        let (_memory, mut controller, mut session) = signed_in();
        let mut ai = KeyDraft::new("OpenAI", "sk-abc123xyz789");
        ai.category = Category::Ai;
        controller.add_key(ai);
        controller.add_key(KeyDraft::new("Misc", "misc-secret-1"));

        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Tab));
        assert_eq!(session.header.category, CategoryFilter::Only(Category::Ai));
        assert_eq!(session.visible(&controller).len(), 1);

        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::BackTab));
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('/')));
        for c in "misc".chars() {
            handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char(c)));
        }
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Enter));
        assert!(!session.header.search_focused);
        let visible = session.visible(&controller);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Misc");
    }

    #[test]
    fn control_chords_do_not_type_into_search() {
        let (_memory, mut controller, mut session) = signed_in();
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('/')));
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('a')));
        handle_dashboard_key(
            &mut controller,
            &mut session,
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
        );
        assert_eq!(session.header.query, "a");
        handle_dashboard_key(
            &mut controller,
            &mut session,
            KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL),
        );
        assert!(session.header.query.is_empty());
        assert!(session.header.search_focused);
    }

    #[test]
    fn init_is_refused_for_an_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let options = LocalOptions {
            kdf: crate::crypto::KdfParams {
                m_cost: 1024,
                t_cost: 1,
                p_cost: 1,
            },
            track_revisions: false,
        };
        let local = LocalBackend::open(dir.path(), options);
        assert!(needs_initialization(false, &local).unwrap());
        assert!(needs_initialization(true, &local).unwrap());

        let profile = User {
            id: "user_1".into(),
            email: "ada@example.com".into(),
            display_name: None,
        };
        local.initialize(profile, "Sup3r-secret!").unwrap();
        assert!(!needs_initialization(false, &local).unwrap());
        let err = needs_initialization(true, &local).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn reveal_toggles_for_the_selected_card() {
        let (_memory, mut controller, mut session) = signed_in();
        controller.add_key(KeyDraft::new("A", "secret-a-123"));
        let id = controller.keys()[0].id.clone();
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('v')));
        assert_eq!(session.revealed.as_deref(), Some(id.as_str()));
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('v')));
        assert_eq!(session.revealed, None);
    }

    #[test]
    fn signing_out_from_the_menu_clears_session_state() {
        let (_memory, mut controller, mut session) = signed_in();
        controller.add_key(KeyDraft::new("A", "secret-a-123"));
        session.header.query = "a".into();
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('u')));
        assert!(session.header.user_menu_open);
        handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('l')));
        assert!(controller.user().is_none());
        assert!(controller.keys().is_empty());
        assert!(session.header.query.is_empty());
        assert!(!session.header.user_menu_open);
    }

    #[test]
    fn quit_needs_confirmation() {
        let (_memory, mut controller, mut session) = signed_in();
        assert!(matches!(
            handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('q'))),
            Flow::Continue
        ));
        assert!(session.quit_overlay);
        assert!(matches!(
            handle_dashboard_key(&mut controller, &mut session, press(KeyCode::Char('y'))),
            Flow::Quit
        ));
    }
}
