//! REPL – interactive shell for the DepthLink streamer.
//!
//! Supported slash-commands:
//!   /help          – show this list
//!   /start         – begin streaming (no-op when already streaming)
//!   /stop          – stop streaming (no-op when idle)
//!   /toggle        – flip streaming on or off
//!   /host <addr>   – set the host used by the next activation
//!   /status        – show the streaming status and endpoint
//!   /save          – write the current settings to the config file
//!   /quit | /exit  – exit the CLI

use colored::Colorize;
use depthlink_middleware::ControlSender;
use depthlink_types::{ControlMessage, StreamingStatus};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

use crate::config::{self, Config};

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Start,
    Stop,
    Toggle,
    Host(String),
    Status,
    Save,
    Quit,
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (line, ""),
        };
        Some(match cmd {
            "/help" => ReplCommand::Help,
            "/start" => ReplCommand::Start,
            "/stop" => ReplCommand::Stop,
            "/toggle" => ReplCommand::Toggle,
            "/host" if !arg.is_empty() => ReplCommand::Host(arg.to_string()),
            "/status" => ReplCommand::Status,
            "/save" => ReplCommand::Save,
            "/quit" | "/exit" => ReplCommand::Quit,
            _ => ReplCommand::Unknown(line.to_string()),
        })
    }
}

/// Map a command onto the control message it posts.  The pipeline decides
/// whether a start or stop changes anything.
fn control_for(cmd: &ReplCommand) -> Option<ControlMessage> {
    match cmd {
        ReplCommand::Start => Some(ControlMessage::StartStreaming),
        ReplCommand::Stop => Some(ControlMessage::StopStreaming),
        ReplCommand::Toggle => Some(ControlMessage::ToggleStreaming),
        ReplCommand::Host(host) => Some(ControlMessage::SetEndpointHost(host.clone())),
        _ => None,
    }
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(
    shutdown: Arc<AtomicBool>,
    commands: ControlSender,
    status: watch::Receiver<StreamingStatus>,
    mut cfg: Config,
) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "depthlink>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let Some(cmd) = ReplCommand::parse(&line) else {
            continue;
        };

        if let Some(message) = control_for(&cmd)
            && !commands.post(message)
        {
            println!("{}", "Streaming pipeline is no longer running.".red());
            break;
        }

        match cmd {
            ReplCommand::Help => cmd_help(),
            ReplCommand::Start | ReplCommand::Stop | ReplCommand::Toggle => {
                println!("  {}", "✓ Request sent.".green());
            }
            ReplCommand::Host(host) => {
                println!("  {} {}", "✓ Next session will stream to".green(), host.bold());
                cfg.host = host;
            }
            ReplCommand::Status => cmd_status(&status.borrow(), &cfg),
            ReplCommand::Save => cmd_save(&cfg),
            ReplCommand::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            ReplCommand::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "DepthLink Commands".bold().underline());
    println!("  {}         – begin streaming", "/start".bold().cyan());
    println!("  {}          – stop streaming", "/stop".bold().cyan());
    println!("  {}        – flip streaming on or off", "/toggle".bold().cyan());
    println!("  {}   – set the receiver host", "/host <addr>".bold().cyan());
    println!("  {}        – show streaming status", "/status".bold().cyan());
    println!("  {}          – save settings to ~/.depthlink/config.toml", "/save".bold().cyan());
    println!("  {}  – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(status: &StreamingStatus, cfg: &Config) {
    let label = if status.active {
        status.label.green().bold()
    } else {
        status.label.yellow()
    };
    println!("  Status   : {}", label);
    println!("  Endpoint : {}", cfg.endpoint().to_string().bold());
}

fn cmd_save(cfg: &Config) {
    match config::save(cfg) {
        Ok(()) => println!(
            "{} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_commands() {
        assert_eq!(ReplCommand::parse("/start\n"), Some(ReplCommand::Start));
        assert_eq!(ReplCommand::parse("  /stop "), Some(ReplCommand::Stop));
        assert_eq!(ReplCommand::parse("/exit"), Some(ReplCommand::Quit));
        assert_eq!(ReplCommand::parse("   "), None);
    }

    #[test]
    fn host_requires_argument() {
        assert_eq!(
            ReplCommand::parse("/host  192.168.1.20 "),
            Some(ReplCommand::Host("192.168.1.20".into()))
        );
        assert_eq!(
            ReplCommand::parse("/host"),
            Some(ReplCommand::Unknown("/host".into()))
        );
    }

    #[test]
    fn start_and_stop_post_idempotent_messages() {
        assert_eq!(
            control_for(&ReplCommand::Start),
            Some(ControlMessage::StartStreaming)
        );
        assert_eq!(
            control_for(&ReplCommand::Stop),
            Some(ControlMessage::StopStreaming)
        );
        assert_eq!(
            control_for(&ReplCommand::Toggle),
            Some(ControlMessage::ToggleStreaming)
        );
    }

    #[test]
    fn repeated_start_posts_start_each_time() {
        use depthlink_middleware::control_channel;

        let (tx, mut inbox) = control_channel();
        for line in ["/start", "/start"] {
            let cmd = ReplCommand::parse(line).unwrap();
            assert!(tx.post(control_for(&cmd).unwrap()));
        }
        let posted: Vec<_> = std::iter::from_fn(|| inbox.try_recv()).collect();
        assert_eq!(
            posted,
            vec![ControlMessage::StartStreaming, ControlMessage::StartStreaming]
        );
    }

    #[test]
    fn host_posts_endpoint_change() {
        assert_eq!(
            control_for(&ReplCommand::Host("10.0.0.2".into())),
            Some(ControlMessage::SetEndpointHost("10.0.0.2".into()))
        );
        assert_eq!(control_for(&ReplCommand::Status), None);
    }
}
