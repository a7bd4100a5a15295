use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use taskpad::config::TaskpadConfig;
use taskpad::core::draft::Draft;
use taskpad::core::mirror::{Mirror, TaskTab};
use taskpad::core::note::Note;
use taskpad::core::record::Record;
use taskpad::core::task::{Task, TaskStatus};
use taskpad::notice::{Notice, NoticeLevel, Operation};
use taskpad::session::Session;
use taskpad::store::RestStore;
use taskpad::sync::SyncManager;
use taskpad::{Error, keyring};

/// Personal tasks and notes, kept in a hosted store
#[derive(Parser)]
#[command(name = "taskpad")]
#[command(about = "Manage your tasks and notes", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report missing store settings and the current session
    Check,

    /// Remember an already-issued user id and access token
    Login {
        #[arg(long)]
        user_id: Uuid,
        #[arg(long, env = "TASKPAD_ACCESS_TOKEN")]
        token: String,
    },

    /// Forget the stored session
    Logout,

    /// List tasks
    Tasks {
        /// all, not-started, in-progress, completed or kanban
        #[arg(long, default_value = "all")]
        tab: String,
        #[arg(long)]
        search: Option<String>,
    },

    /// Create, edit or delete a task
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// List notes
    Notes {
        #[arg(long)]
        search: Option<String>,
    },

    /// Create, edit or delete a note
    Note {
        #[command(subcommand)]
        command: NoteCommand,
    },
}

#[derive(Subcommand)]
enum TaskCommand {
    Add {
        title: String,
        #[command(flatten)]
        fields: TaskFields,
    },
    Edit {
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// Set the status directly
    Status { id: Uuid, status: String },
    /// Advance the status the way the tab's toggle does
    Toggle {
        id: Uuid,
        #[arg(long, default_value = "all")]
        tab: String,
    },
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum NoteCommand {
    Add {
        title: String,
        #[arg(long)]
        content: Option<String>,
    },
    Edit {
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    Delete { id: Uuid },
}

/// Optional task columns. An empty value clears the column.
#[derive(Args, Debug)]
struct TaskFields {
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    priority: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    due: Option<String>,
    #[arg(long = "type")]
    task_type: Option<String>,
    /// Small, Medium or Large
    #[arg(long)]
    effort: Option<String>,
    #[arg(long)]
    assignee: Option<String>,
}

impl TaskFields {
    fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("description", &self.description),
            ("status", &self.status),
            ("priority", &self.priority),
            ("due_date", &self.due),
            ("task_type", &self.task_type),
            ("effort_level", &self.effort),
            ("assignee", &self.assignee),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }
}

fn init_logging(debug: bool) {
    // Journal logging (`journalctl --user -t taskpad -f`): taskpad targets at
    // info/debug, everything else at warn.
    struct FilteredJournal {
        inner: systemd_journal_logger::JournalLog,
    }

    impl log::Log for FilteredJournal {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            if metadata.target().starts_with("taskpad") {
                let max = if taskpad::debug_logging() { log::LevelFilter::Debug } else { log::LevelFilter::Info };
                metadata.level() <= max
            } else {
                metadata.level() <= log::LevelFilter::Warn
            }
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.inner.log(record);
            }
        }
        fn flush(&self) {
            self.inner.flush();
        }
    }

    taskpad::set_debug_logging(debug);

    let journal = match systemd_journal_logger::JournalLog::new() {
        Ok(j) => j.with_syslog_identifier("taskpad".to_string()),
        // No journal (containers, non-systemd hosts): run without a logger.
        Err(_) => return,
    };
    if log::set_boxed_logger(Box::new(FilteredJournal { inner: journal })).is_ok() {
        // Global max must be Debug so taskpad debug logs can pass through when toggled
        log::set_max_level(log::LevelFilter::Debug);
    }
}

/// Print a notice and report whether the operation succeeded.
fn report<R: Record, T>(op: Operation, result: &taskpad::Result<T>) -> bool {
    if let Some(notice) = Notice::for_result::<R, T>(op, result) {
        match notice.level {
            NoticeLevel::Success => println!("{}", notice),
            NoticeLevel::Error => eprintln!("{}", notice),
        }
    }
    result.is_ok()
}

fn fail(notice: Notice) -> ExitCode {
    eprintln!("{}", notice);
    ExitCode::FAILURE
}

fn status_glyph(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "[x]",
        TaskStatus::InProgress => "[~]",
        TaskStatus::NotStarted => "[ ]",
    }
}

fn print_task(task: &Task) {
    let mut line = format!(
        "{} {}  ({})",
        status_glyph(task.status),
        task.title,
        task.priority.as_label()
    );
    if let Some(due) = task.due_date {
        line.push_str(&format!("  due {}", due.format("%b %d")));
    }
    if let Some(ref kind) = task.task_type {
        line.push_str(&format!("  {}", kind));
    }
    if let Some(effort) = task.effort_level {
        line.push_str(&format!("  {}", effort.as_label()));
    }
    if let Some(ref assignee) = task.assignee {
        line.push_str(&format!("  @{}", assignee));
    }
    println!("{}  {}", line, task.id);
    if let Some(ref description) = task.description {
        if !description.trim().is_empty() {
            println!("      {}", description);
        }
    }
}

fn print_tasks<'a>(tasks: impl Iterator<Item = &'a Task>) {
    let mut any = false;
    for task in tasks {
        any = true;
        print_task(task);
    }
    if !any {
        println!("No tasks found. Create your first task to get started.");
    }
}

fn print_kanban(mirror: &Mirror<Task>) {
    for column in mirror.kanban() {
        println!("== {} ({}) ==  {}", column.status.as_label(), column.count(), column.blurb());
        if column.tasks.is_empty() {
            println!("  No tasks in this column");
        }
        for task in column.tasks {
            println!("  {} ({})  {}", task.title, task.priority.as_label(), task.id);
        }
        println!();
    }
}

fn print_notes<'a>(notes: impl Iterator<Item = &'a Note>) {
    let mut any = false;
    for note in notes {
        any = true;
        println!("# {}  {}  {}", note.title, note.created_at.format("%b %d, %Y"), note.id);
        if let Some(ref content) = note.content {
            for line in content.lines() {
                println!("  {}", line);
            }
        }
    }
    if !any {
        println!("No notes found.");
    }
}

async fn open_session(config: &TaskpadConfig) -> Session {
    let keyring_token = if config.access_token.is_none() && !config.store_url.trim().is_empty() {
        keyring::load_token(&config.store_url).await.unwrap_or_else(|e| {
            log::warn!("{}", e);
            None
        })
    } else {
        None
    };
    Session::from_config(config, keyring_token)
}

/// Build a mounted manager: connect, then read the owner's rows.
async fn mount<R: Record>(config: &TaskpadConfig) -> Result<SyncManager<R, RestStore>, Notice> {
    let session = open_session(config).await;
    let store = RestStore::from_config(config, &session).map_err(|e| match e {
        Error::Unauthenticated => Notice::error("Not signed in. Run `taskpad login` first."),
        Error::RemoteUnavailable(_) => Notice::error("Database connection not available"),
        other => Notice::error(other.to_string()),
    })?;
    let manager = SyncManager::for_session(Arc::new(store), &session)
        .map_err(|e| Notice::error(e.to_string()))?
        .with_policy(config.overlap_policy);
    if let Err(e) = manager.refresh().await {
        eprintln!("warning: could not read {}s: {}", R::KIND, e);
    }
    Ok(manager)
}

fn parse_tab(s: &str) -> Result<TaskTab, Notice> {
    TaskTab::from_label(s).ok_or_else(|| Notice::error(format!("Unknown tab: {}", s)))
}

async fn run_tasks(config: &TaskpadConfig, tab: &str, search: Option<&str>) -> ExitCode {
    let manager = match mount::<Task>(config).await {
        Ok(m) => m,
        Err(n) => return fail(n),
    };
    if tab.eq_ignore_ascii_case("kanban") {
        manager.with_mirror(print_kanban);
        return ExitCode::SUCCESS;
    }
    let tab = match parse_tab(tab) {
        Ok(t) => t,
        Err(n) => return fail(n),
    };
    manager.with_mirror(|mirror| match search {
        Some(q) => print_tasks(mirror.search(q).filter(|t| tab.includes(t))),
        None => print_tasks(mirror.tab(tab)),
    });
    ExitCode::SUCCESS
}

async fn run_task(config: &TaskpadConfig, command: TaskCommand) -> ExitCode {
    let manager = match mount::<Task>(config).await {
        Ok(m) => m,
        Err(n) => return fail(n),
    };

    let ok = match command {
        TaskCommand::Add { title, fields } => {
            let mut draft = Draft::<Task>::begin(None);
            let mut staged = draft.set_field("title", &title);
            for (name, value) in fields.pairs() {
                staged = staged.and_then(|_| draft.set_field(name, value));
            }
            let result = match staged {
                Ok(()) => manager.submit(&mut draft).await,
                Err(e) => Err(e),
            };
            if let Ok(id) = result {
                println!("{}", id);
            }
            report::<Task, _>(Operation::Create, &result)
        }
        TaskCommand::Edit { id, title, fields } => {
            let Some(existing) = manager.get(id) else {
                return fail(Notice::error(format!("Task {} not found", id)));
            };
            let mut draft = Draft::begin(Some(&existing));
            let mut staged = Ok(());
            if let Some(ref title) = title {
                staged = draft.set_field("title", title);
            }
            for (name, value) in fields.pairs() {
                staged = staged.and_then(|_| draft.set_field(name, value));
            }
            let result = match staged {
                Ok(()) => manager.submit(&mut draft).await,
                Err(e) => Err(e),
            };
            report::<Task, _>(Operation::Update, &result)
        }
        TaskCommand::Status { id, status } => {
            let result = match TaskStatus::from_label(&status) {
                Some(status) => manager.set_status(id, status).await,
                None => Err(Error::Validation(format!("Invalid status: {}", status))),
            };
            report::<Task, _>(Operation::StatusChange, &result)
        }
        TaskCommand::Toggle { id, tab } => {
            let result = match parse_tab(&tab) {
                Ok(tab) => manager.toggle_status(id, tab).await,
                Err(n) => return fail(n),
            };
            if let Ok(status) = result {
                println!("{}", status.as_label());
            }
            report::<Task, _>(Operation::StatusChange, &result)
        }
        TaskCommand::Delete { id } => {
            let result = manager.delete(id).await;
            report::<Task, _>(Operation::Delete, &result)
        }
    };

    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

async fn run_notes(config: &TaskpadConfig, search: Option<&str>) -> ExitCode {
    let manager = match mount::<Note>(config).await {
        Ok(m) => m,
        Err(n) => return fail(n),
    };
    manager.with_mirror(|mirror| print_notes(mirror.search(search.unwrap_or(""))));
    ExitCode::SUCCESS
}

async fn run_note(config: &TaskpadConfig, command: NoteCommand) -> ExitCode {
    let manager = match mount::<Note>(config).await {
        Ok(m) => m,
        Err(n) => return fail(n),
    };

    let ok = match command {
        NoteCommand::Add { title, content } => {
            let mut draft = Draft::<Note>::begin(None);
            let mut staged = draft.set_field("title", &title);
            if let Some(ref content) = content {
                staged = staged.and_then(|_| draft.set_field("content", content));
            }
            let result = match staged {
                Ok(()) => manager.submit(&mut draft).await,
                Err(e) => Err(e),
            };
            if let Ok(id) = result {
                println!("{}", id);
            }
            report::<Note, _>(Operation::Create, &result)
        }
        NoteCommand::Edit { id, title, content } => {
            let Some(existing) = manager.get(id) else {
                return fail(Notice::error(format!("Note {} not found", id)));
            };
            let mut draft = Draft::begin(Some(&existing));
            let mut staged = Ok(());
            if let Some(ref title) = title {
                staged = draft.set_field("title", title);
            }
            if let Some(ref content) = content {
                staged = staged.and_then(|_| draft.set_field("content", content));
            }
            let result = match staged {
                Ok(()) => manager.submit(&mut draft).await,
                Err(e) => Err(e),
            };
            report::<Note, _>(Operation::Update, &result)
        }
        NoteCommand::Delete { id } => {
            let result = manager.delete(id).await;
            report::<Note, _>(Operation::Delete, &result)
        }
    };

    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

async fn run_check(config: &TaskpadConfig) -> ExitCode {
    let missing = config.missing_store_settings();
    if missing.is_empty() {
        println!("Store: {}", config.store_url);
    } else {
        println!("Missing environment variables: {}", missing.join(", "));
    }
    let session = open_session(config).await;
    match session.user_id() {
        Some(id) => println!("Signed in as {}", id),
        None => println!("Not signed in"),
    }
    if missing.is_empty() && session.is_authenticated() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// `file` is what gets written back; `config` (file plus environment) only
/// supplies the store URL the token is filed under.
async fn run_login(config: &TaskpadConfig, mut file: TaskpadConfig, path: &Path, user_id: Uuid, token: String) -> ExitCode {
    if config.store_url.trim().is_empty() {
        return fail(Notice::error("Set TASKPAD_URL before logging in"));
    }
    let file_token = match keyring::store_token(&config.store_url, &token).await {
        Ok(()) => None,
        Err(e) => {
            log::warn!("{}; keeping the token in the config file", e);
            Some(token)
        }
    };
    file.record_login(user_id, file_token);
    match file.save(path) {
        Ok(()) => {
            println!("Signed in as {}", user_id);
            ExitCode::SUCCESS
        }
        Err(e) => fail(Notice::error(e.to_string())),
    }
}

async fn run_logout(config: &TaskpadConfig, mut file: TaskpadConfig, path: &Path) -> ExitCode {
    if !config.store_url.trim().is_empty() {
        if let Err(e) = keyring::delete_token(&config.store_url).await {
            log::warn!("{}", e);
        }
    }
    file.record_logout();
    match file.save(path) {
        Ok(()) => {
            println!("Signed out");
            ExitCode::SUCCESS
        }
        Err(e) => fail(Notice::error(e.to_string())),
    }
}

fn load_file_or_report(path: &Path) -> Result<TaskpadConfig, ExitCode> {
    TaskpadConfig::load_file(path).map_err(|e| {
        eprintln!("Failed to load {}: {}", path.display(), e);
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(TaskpadConfig::default_path);

    let config = match TaskpadConfig::load(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(config.debug_logging);

    match cli.command {
        Commands::Check => run_check(&config).await,
        Commands::Login { user_id, token } => match load_file_or_report(&path) {
            Ok(file) => run_login(&config, file, &path, user_id, token).await,
            Err(code) => code,
        },
        Commands::Logout => match load_file_or_report(&path) {
            Ok(file) => run_logout(&config, file, &path).await,
            Err(code) => code,
        },
        Commands::Tasks { tab, search } => run_tasks(&config, &tab, search.as_deref()).await,
        Commands::Task { command } => run_task(&config, command).await,
        Commands::Notes { search } => run_notes(&config, search.as_deref()).await,
        Commands::Note { command } => run_note(&config, command).await,
    }
}
