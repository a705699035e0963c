use anyhow::Result;
use clap::{CommandFactory, Parser};
use lesson_voice::cli::{Cli, Commands, ConfigAction};
use lesson_voice::commands::{CommandMatcher, MatchPolicy};
use lesson_voice::config::Config;
use lesson_voice::daemon::run_daemon;
use lesson_voice::ipc::client::send_command;
use lesson_voice::ipc::protocol::{Command, Response};
use lesson_voice::ipc::server::IpcServer;
use lesson_voice::recognition::CommandOutcome;
use lesson_voice::session::SessionSnapshot;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Daemon { listen } => {
            let config = load_config(cli.config.as_deref())?;
            run_daemon(config, cli.socket, cli.quiet, listen).await?;
        }
        Commands::Start => handle_ipc_command(cli.socket, Command::Start).await?,
        Commands::Stop => handle_ipc_command(cli.socket, Command::Stop).await?,
        Commands::Toggle => handle_ipc_command(cli.socket, Command::Toggle).await?,
        Commands::Status => handle_ipc_command(cli.socket, Command::Status).await?,
        Commands::Say { text } => {
            let text = text.join(" ");
            handle_ipc_command(cli.socket, Command::Say { text }).await?
        }
        Commands::Exec { command } => {
            handle_ipc_command(cli.socket, Command::Execute { command }).await?
        }
        Commands::Pause => handle_ipc_command(cli.socket, Command::Pause).await?,
        Commands::Resume => handle_ipc_command(cli.socket, Command::Resume).await?,
        Commands::Repeat => handle_ipc_command(cli.socket, Command::Repeat).await?,
        Commands::Cancel => handle_ipc_command(cli.socket, Command::Cancel).await?,
        Commands::Volume { value } => {
            handle_ipc_command(cli.socket, Command::SetVolume { volume: value }).await?
        }
        Commands::Rate { value } => {
            handle_ipc_command(cli.socket, Command::SetRate { rate: value }).await?
        }
        Commands::Commands => handle_ipc_command(cli.socket, Command::Commands).await?,
        Commands::Export => handle_ipc_command(cli.socket, Command::ExportSession).await?,
        Commands::Shutdown => handle_ipc_command(cli.socket, Command::Shutdown).await?,
        Commands::Match { phrase, best } => {
            let config = load_config(cli.config.as_deref())?;
            handle_match(&config, &phrase.join(" "), best);
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "lesson-voice",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` wins over the flags.
fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/lesson-voice/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Get { key } => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            match config.get(&key) {
                Some(value) => println!("{}", value),
                None => {
                    eprintln!("Error: unknown configuration key '{}'", key);
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Path => println!("{}", config_path.display()),
        ConfigAction::Dump => print!("{}", Config::dump_template()?),
    }
    Ok(())
}

/// Offline detection: which command would this phrase trigger?
fn handle_match(config: &Config, phrase: &str, best: bool) {
    let policy = if best {
        MatchPolicy::BestMatch
    } else {
        config.voice.match_policy
    };
    let matcher = CommandMatcher::new(config.command_patterns(), policy);
    match matcher.find(phrase) {
        Some(found) => println!(
            "{} {} (phrase \"{}\")",
            found.command_type.green(),
            format!("{:.2}", found.confidence).dimmed(),
            found.phrase
        ),
        None => {
            println!("{}", "no command".yellow());
            std::process::exit(1);
        }
    }
}

async fn handle_ipc_command(socket: Option<PathBuf>, command: Command) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);

    match send_command(&socket_path, command).await {
        Ok(response) => match response {
            Response::Ok => println!("{}", "OK".green()),
            Response::Status {
                session_id,
                snapshot,
            } => print_status(&session_id, &snapshot),
            Response::Outcome { outcome } => println!("{}", describe_outcome(&outcome)),
            Response::Level { value } => println!("{:.2}", value),
            Response::Commands { commands } => {
                println!("You can say:");
                for phrase in commands {
                    println!("  {}", phrase);
                }
            }
            Response::Export { json } => println!("{}", json),
            Response::Error { code, message } => {
                eprintln!("{} {:?}: {}", "Error".red(), code, message);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Failed to communicate with daemon: {}", e);
            eprintln!("Is the daemon running? Start it with: lesson-voice daemon");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_status(session_id: &str, snapshot: &SessionSnapshot) {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let speech = &snapshot.speech_state;

    println!("Status:");
    println!("  {}    {}", "Version:".dimmed(), lesson_voice::version_string());
    println!("  {}    {}", "Session:".dimmed(), session_id);
    println!("  {}  {}", "Supported:".dimmed(), yes_no(snapshot.is_supported));
    println!(
        "  {}  {}",
        "Listening:".dimmed(),
        snapshot.recognition_state
    );
    println!("  {}  {:?}", "Narration:".dimmed(), speech.status());
    if let Some(text) = &speech.current_text {
        println!("  {}    {}", "Current:".dimmed(), text);
    }
    println!(
        "  {}     volume {:.2}, rate {:.2}, {} queued",
        "Voice:".dimmed(),
        speech.volume,
        speech.rate,
        speech.queue_length
    );
    if let Some(paused_for) = &snapshot.paused_for {
        println!("  {} {}", "Paused for:".dimmed(), paused_for.yellow());
    }
    if let Some(command) = &snapshot.last_command {
        println!(
            "  {}  {} ({:.2})",
            "Last cmd:".dimmed(),
            command.command_type,
            command.confidence
        );
    }
}

fn describe_outcome(outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Repeated { restarted, .. } => {
            if *restarted {
                "Repeating".to_string()
            } else {
                "Nothing to repeat".to_string()
            }
        }
        CommandOutcome::Paused => "Paused".to_string(),
        CommandOutcome::Resumed => "Resumed".to_string(),
        CommandOutcome::Stopped { .. } => "Stopped".to_string(),
        CommandOutcome::VolumeChanged { volume } => format!("Volume {:.2}", volume),
        CommandOutcome::RateChanged { rate } => format!("Rate {:.2}", rate),
        CommandOutcome::HelpAnnounced { .. } => "Help announced".to_string(),
        CommandOutcome::Forwarded => "Forwarded to the lesson".to_string(),
        CommandOutcome::Ignored => "Ignored".to_string(),
    }
}
