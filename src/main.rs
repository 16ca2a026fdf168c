use clap::{error::ErrorKind, Args, CommandFactory, Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use lockedin::{
    alerts::{AlertBridge, BellSink, TerminalAlerts},
    app::{App, ExitType},
    app_dirs::AppDirs,
    config::{FilePreferenceStore, PreferenceStore, Preferences},
    history::{default_export_name, HistoryDb},
    platform::TerminalPlatform,
    runtime::{AppEvent, CrosstermEventSource, EventSource, FixedTicker, Runner, Ticker},
    session::{Session, SessionConfig, SessionDeps, SessionError},
    setup::{BreakPlan, SetupForm},
    ui,
    util::SystemClock,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    cell::RefCell,
    error::Error,
    fs::{self, File, OpenOptions},
    io::{self, stdin},
    path::PathBuf,
    rc::Rc,
    sync::Mutex,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// full-screen focus sessions with scheduled breaks and a PIN-gated exit
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Run a full-screen focus countdown with head-rest and stand-up breaks, break quotes, sound alerts, and an exit that asks for your PIN. Every session is logged to a local history you can export as CSV."
)]
pub struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// set up and start a focus session
    Start(StartArgs),
    /// list, export or clear past sessions
    History(HistoryArgs),
    /// change the saved sound preferences
    Sound(SoundArgs),
}

#[derive(Args, Debug, Clone)]
struct StartArgs {
    /// focus duration in minutes
    #[clap(short = 'm', long)]
    minutes: Option<u32>,

    /// PIN required to pause, end or leave the session (4+ digits)
    #[clap(short = 'p', long)]
    pin: Option<String>,

    /// allow ending without a PIN
    #[clap(long)]
    open_exit: bool,

    /// break cadence preset
    #[clap(long, value_enum, default_value_t = BreakPlan::Pomodoro)]
    plan: BreakPlan,

    /// head/eye rest interval in minutes for the custom plan (0 = off)
    #[clap(long, default_value_t = 0)]
    micro_every: u32,

    /// stand break interval in minutes for the custom plan (0 = off)
    #[clap(long, default_value_t = 0)]
    stand_every: u32,

    /// stand break length in minutes for the custom plan
    #[clap(long, default_value_t = 3)]
    stand_len: u32,

    /// turn off head/eye rest breaks
    #[clap(long)]
    no_headrest: bool,

    /// turn off stand breaks
    #[clap(long)]
    no_stand: bool,

    /// do not show quotes while paused
    #[clap(long)]
    no_quotes: bool,

    /// emergency contact number, up to three
    #[clap(short = 'e', long = "emergency")]
    emergency: Vec<String>,

    /// what this session is for
    #[clap(short = 'd', long)]
    description: Option<String>,

    /// silence alert sounds for this session
    #[clap(long)]
    mute: bool,

    /// alert volume for this session, 0.0 to 1.0
    #[clap(long)]
    volume: Option<f32>,

    /// read the whole session setup from a JSON file instead of flags
    #[clap(long, conflicts_with_all = ["minutes", "pin", "emergency"])]
    config: Option<PathBuf>,
}

impl StartArgs {
    fn form(&self) -> SetupForm {
        SetupForm {
            minutes: self.minutes.unwrap_or(0),
            pin: self.pin.clone().unwrap_or_default(),
            open_exit: self.open_exit,
            plan: self.plan,
            enable_headrest: !self.no_headrest,
            enable_stand: !self.no_stand,
            micro_every: self.micro_every,
            stand_every: self.stand_every,
            stand_len: self.stand_len,
            quotes: !self.no_quotes,
            emergency: self.emergency.clone(),
            description: self.description.clone().unwrap_or_default(),
        }
    }

    fn preferences(&self, mut prefs: Preferences) -> Preferences {
        if self.mute {
            prefs.sound_enabled = false;
        }
        if let Some(volume) = self.volume {
            prefs.set_volume(volume);
        }
        prefs
    }
}

#[derive(Args, Debug, Clone)]
struct HistoryArgs {
    /// write all sessions as CSV
    #[clap(long, num_args = 0..=1, default_missing_value = default_export_name())]
    export: Option<PathBuf>,

    /// delete all sessions
    #[clap(long, conflicts_with = "export")]
    clear: bool,
}

#[derive(Args, Debug, Clone)]
struct SoundArgs {
    /// enable alert sounds
    #[clap(long, conflicts_with = "off")]
    on: bool,

    /// disable alert sounds
    #[clap(long)]
    off: bool,

    /// alert volume, 0.0 to 1.0
    #[clap(long)]
    volume: Option<f32>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::Start(args) => start(args),
        Command::History(args) => history(args),
        Command::Sound(args) => sound(args),
    }
}

/// Log to a file; the terminal belongs to the UI.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lockedin=info"));
    let file = AppDirs::log_path().and_then(|path| {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        OpenOptions::new().create(true).append(true).open(path).ok()
    });
    match file {
        Some(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }
}

/// Exit with the validation problems, the way clap reports bad arguments.
fn setup_error(msg: String) -> ! {
    let mut cmd = Cli::command();
    cmd.error(ErrorKind::ValueValidation, msg).exit()
}

fn open_history() -> Result<HistoryDb, Box<dyn Error>> {
    match AppDirs::history_db_path() {
        Some(path) => Ok(HistoryDb::open(path)?),
        None => {
            warn!("no state directory; history kept in memory only");
            Ok(HistoryDb::open_in_memory()?)
        }
    }
}

fn start(args: StartArgs) -> Result<(), Box<dyn Error>> {
    let config: SessionConfig = match &args.config {
        Some(path) => serde_json::from_slice(&fs::read(path)?)?,
        None => match args.form().submit() {
            Ok(config) => config,
            Err(err) => setup_error(err.to_string()),
        },
    };

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let prefs = args.preferences(FilePreferenceStore::new().load());
    let history = Rc::new(RefCell::new(open_history()?));
    let platform = Rc::new(RefCell::new(TerminalPlatform::new()));
    let bridge: Box<dyn AlertBridge> = Box::new(TerminalAlerts::new(BellSink::stdout(true), &prefs));

    let deps = SessionDeps {
        clock: Box::new(SystemClock),
        platform: Box::new(platform.clone()),
        history: Box::new(history.clone()),
        bridge: Some(bridge),
    };
    let session = match Session::boot(config, deps) {
        Ok(session) => session,
        Err(err @ SessionError::InvalidHandoff(_)) => setup_error(err.to_string()),
        Err(err) => return Err(err.into()),
    };

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session, history, platform);
    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::default());
    let result = run_app(&mut terminal, &mut app, &runner);
    if result.is_err() {
        app.session.abandon();
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    if result? == ExitType::Setup {
        println!("Session closed. Start the next one with `lockedin start`.");
    }
    Ok(())
}

fn run_app<B: Backend, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
) -> Result<ExitType, Box<dyn Error>> {
    loop {
        terminal.draw(|f| ui::draw(app, f))?;

        match runner.step() {
            AppEvent::Tick | AppEvent::Resize => app.on_tick(),
            AppEvent::Key(key) => {
                app.handle_key(key);
                app.on_tick();
            }
            AppEvent::Hangup => app.on_hangup(),
        }

        if let Some(exit) = app.exit {
            info!(?exit, "leaving the timer");
            return Ok(exit);
        }
    }
}

fn history(args: HistoryArgs) -> Result<(), Box<dyn Error>> {
    let db = open_history()?;

    if args.clear {
        db.clear()?;
        println!("History cleared.");
        return Ok(());
    }

    if let Some(path) = args.export {
        db.export_csv(File::create(&path)?)?;
        println!("Exported {} sessions to {}", db.len()?, path.display());
        return Ok(());
    }

    let entries = db.recent()?;
    if entries.is_empty() {
        println!("No sessions yet.");
    }
    for entry in entries {
        if entry.description.is_empty() {
            println!("{}", entry);
        } else {
            println!("{}  {}", entry, entry.description);
        }
    }
    Ok(())
}

fn sound(args: SoundArgs) -> Result<(), Box<dyn Error>> {
    let store = FilePreferenceStore::new();
    let mut prefs = store.load();
    if args.on {
        prefs.sound_enabled = true;
    }
    if args.off {
        prefs.sound_enabled = false;
    }
    if let Some(volume) = args.volume {
        prefs.set_volume(volume);
    }
    store.save(&prefs)?;
    println!(
        "Sound: {}, volume {:.0}%",
        if prefs.sound_enabled { "On" } else { "Off" },
        prefs.volume() * 100.0
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use lockedin::runtime::TestEventSource;
    use lockedin::util::ManualClock;
    use ratatui::backend::TestBackend;
    use std::sync::mpsc;
    use std::time::Duration;

    fn start_args(args: &[&str]) -> StartArgs {
        let mut argv = vec!["lockedin", "start"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Start(args) => args,
            other => panic!("expected start, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_start_defaults() {
        let args = start_args(&[]);
        assert_eq!(args.minutes, None);
        assert_eq!(args.plan, BreakPlan::Pomodoro);
        assert_eq!(args.stand_len, 3);
        assert!(!args.open_exit);
        assert!(args.emergency.is_empty());
    }

    #[test]
    fn test_cli_start_builds_valid_config() {
        let args = start_args(&[
            "-m", "50", "--pin", "2468", "--plan", "fifty-ten", "-e", "555 0100", "-e", "555 0101",
            "-d", "deep work",
        ]);
        let config = args.form().submit().unwrap();
        assert_eq!(config.duration_ms, 50 * 60_000);
        assert_eq!(config.stand_every_min, 50);
        assert_eq!(config.stand_len_min, 10);
        assert_eq!(config.emergency.len(), 2);
        assert_eq!(config.description, "deep work");
        assert!(config.quotes_enabled);
    }

    #[test]
    fn test_cli_start_missing_emergency_is_rejected() {
        let args = start_args(&["-m", "25", "--pin", "1234"]);
        let err = args.form().submit().unwrap_err().to_string();
        assert!(err.contains("Enter at least one emergency contact."));
    }

    #[test]
    fn test_cli_custom_plan_flags() {
        let args = start_args(&[
            "-m", "90", "--open-exit", "--plan", "custom", "--micro-every", "15", "--stand-every",
            "45", "--stand-len", "4", "--no-quotes", "-e", "911",
        ]);
        let config = args.form().submit().unwrap();
        assert!(config.open_exit);
        assert!(config.pin.is_empty());
        assert_eq!(
            (config.micro_every_min, config.stand_every_min, config.stand_len_min),
            (15, 45, 4)
        );
        assert!(!config.quotes_enabled);
    }

    #[test]
    fn test_cli_config_conflicts_with_flags() {
        let res = Cli::try_parse_from(["lockedin", "start", "--config", "s.json", "-m", "5"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_cli_session_preferences() {
        let args = start_args(&["--mute", "--volume", "3.0"]);
        let prefs = args.preferences(Preferences::default());
        assert!(!prefs.sound_enabled);
        assert_eq!(prefs.volume(), 1.0);
    }

    #[test]
    fn test_cli_history_export_default_name() {
        let cli = Cli::try_parse_from(["lockedin", "history", "--export"]).unwrap();
        match cli.command {
            Command::History(args) => {
                assert_eq!(args.export, Some(PathBuf::from("lockedin_history.csv")));
                assert!(!args.clear);
            }
            other => panic!("expected history, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_sound_on_off_conflict() {
        assert!(Cli::try_parse_from(["lockedin", "sound", "--on", "--off"]).is_err());
        assert!(Cli::try_parse_from(["lockedin", "sound", "--volume", "0.4"]).is_ok());
    }

    #[test]
    fn test_run_app_ends_via_pin() {
        let clock = ManualClock::new(1_700_000_000_000);
        let history = Rc::new(RefCell::new(HistoryDb::open_in_memory().unwrap()));
        let platform = Rc::new(RefCell::new(TerminalPlatform::new()));
        let config = start_args(&["-m", "25", "--pin", "1234", "-e", "911"])
            .form()
            .submit()
            .unwrap();
        let deps = SessionDeps {
            clock: Box::new(clock.clone()),
            platform: Box::new(platform.clone()),
            history: Box::new(history.clone()),
            bridge: None,
        };
        let session = Session::boot(config, deps).unwrap();
        assert!(platform.borrow().exit_guarded());
        let mut app = App::new(session, history.clone(), platform.clone());

        let (tx, rx) = mpsc::channel();
        for code in [
            KeyCode::Char('x'),
            KeyCode::Char('e'),
            KeyCode::Char('1'),
            KeyCode::Char('2'),
            KeyCode::Char('3'),
            KeyCode::Char('4'),
            KeyCode::Enter,
        ] {
            tx.send(AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)))
                .unwrap();
        }
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(1)));
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();

        let exit = run_app(&mut terminal, &mut app, &runner).unwrap();
        assert_eq!(exit, ExitType::Setup);
        assert_eq!(history.borrow().len().unwrap(), 1);
        assert!(!platform.borrow().exit_guarded());
    }
}
