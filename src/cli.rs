use anyhow::{Context, Result, anyhow};

use famcal_sync::{
    notify::{DisabledSender, NotificationDispatcher, NotificationKind},
    storage::{Config, Store},
    sync::{CallbackParams, ConnectionStatus, GoogleCalendarClient, SyncEngine},
};

pub const USAGE: &str = "Usage: famcal-sync <command> [options]

Commands:
  auth-url   --member <id>                  Print the Google authorization URL
  callback   --member <id> [--code <c>] [--state <s>] [--error <e>]
                                            Complete authorization
  export     --member <id> <event-id>       Push one event to Google Calendar
  import     --member <id>                  Import the next 30 days from Google Calendar
  disconnect --member <id>                  Forget stored Google tokens
  status     --member <id>                  Show connection status
  logs       --member <id>                  Show sync history
  notify     <event-id> <reminder|invite|update>
                                            Notify event participants";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AuthUrl { member: String },
    Callback { member: String, params: CallbackParams },
    Export { member: String, event_id: String },
    Import { member: String },
    Disconnect { member: String },
    Status { member: String },
    Logs { member: String },
    Notify { event_id: String, kind: NotificationKind },
    Help,
}

#[derive(Default)]
struct ParsedArgs {
    member: Option<String>,
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    positional: Vec<String>,
}

impl ParsedArgs {
    fn member(&mut self) -> Result<String, String> {
        self.member.take().ok_or_else(|| "Missing --member <id>".to_string())
    }

    fn positional(&self, index: usize, name: &str) -> Result<String, String> {
        self.positional
            .get(index)
            .cloned()
            .ok_or_else(|| format!("Missing <{}>", name))
    }
}

fn parse_args<I>(args: I) -> Result<ParsedArgs, String>
where
    I: Iterator<Item = String>,
{
    let mut parsed = ParsedArgs::default();
    let mut args = args;

    while let Some(arg) = args.next() {
        let slot = match arg.as_str() {
            "--member" => &mut parsed.member,
            "--code" => &mut parsed.code,
            "--state" => &mut parsed.state,
            "--error" => &mut parsed.error,
            flag if flag.starts_with("--") => return Err(format!("Unknown argument: {}", flag)),
            _ => {
                parsed.positional.push(arg.clone());
                continue;
            }
        };
        let value = args
            .next()
            .ok_or_else(|| format!("Missing value for {}", arg))?;
        *slot = Some(value);
    }

    Ok(parsed)
}

pub fn parse_command<I>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(name) = args.next() else {
        return Ok(Command::Help);
    };
    let mut parsed = parse_args(args)?;

    match name.as_str() {
        "auth-url" => Ok(Command::AuthUrl { member: parsed.member()? }),
        "callback" => Ok(Command::Callback {
            member: parsed.member()?,
            params: CallbackParams {
                code: parsed.code.take(),
                state: parsed.state.take(),
                error: parsed.error.take(),
            },
        }),
        "export" => Ok(Command::Export {
            member: parsed.member()?,
            event_id: parsed.positional(0, "event-id")?,
        }),
        "import" => Ok(Command::Import { member: parsed.member()? }),
        "disconnect" => Ok(Command::Disconnect { member: parsed.member()? }),
        "status" => Ok(Command::Status { member: parsed.member()? }),
        "logs" => Ok(Command::Logs { member: parsed.member()? }),
        "notify" => {
            let event_id = parsed.positional(0, "event-id")?;
            let kind = parsed.positional(1, "kind")?;
            let kind = NotificationKind::parse(&kind)
                .ok_or_else(|| format!("Unknown notification kind '{}'", kind))?;
            Ok(Command::Notify { event_id, kind })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(format!("Unknown command: {}", other)),
    }
}

fn open_engine() -> Result<SyncEngine<GoogleCalendarClient>> {
    let config = Config::load_or_create().context("loading configuration")?;
    let store = Store::open(&config.storage.database)
        .with_context(|| format!("opening database {}", config.storage.database.display()))?;
    let client = GoogleCalendarClient::new(config.google.clone());
    Ok(SyncEngine::new(config, client, store))
}

pub async fn run_command(command: Command) -> Result<()> {
    match command {
        Command::Help => println!("{USAGE}"),
        Command::AuthUrl { member } => {
            let url = open_engine()?.begin_authorization(&member).map_err(|e| {
                anyhow!(
                    "{}. Set google.client_id, google.client_secret and google.redirect_uri in {}",
                    e,
                    Config::config_path().display()
                )
            })?;
            println!("Open this URL to connect Google Calendar:\n\n{url}\n");
        }
        Command::Callback { member, params } => {
            open_engine()?.complete_authorization(&member, &params).await?;
            println!("Google Calendar connected.");
        }
        Command::Export { member, event_id } => {
            let remote_id = open_engine()?.export_event(&member, &event_id).await?;
            println!("Event synced to Google Calendar ({remote_id}).");
        }
        Command::Import { member } => {
            let report = open_engine()?.import_events(&member).await?;
            if report.errors.is_empty() {
                println!(
                    "Successfully imported {} events from Google Calendar.",
                    report.imported_count
                );
            } else {
                println!(
                    "Imported {} events with {} errors:",
                    report.imported_count,
                    report.errors.len()
                );
                for error in &report.errors {
                    println!("  - {error}");
                }
            }
        }
        Command::Disconnect { member } => {
            open_engine()?.disconnect(&member)?;
            println!("Google Calendar disconnected.");
        }
        Command::Status { member } => match open_engine()?.status(&member)? {
            ConnectionStatus::Disconnected => println!("Not connected."),
            ConnectionStatus::Connected { last_sync: Some(at) } => {
                println!("Connected. Last sync: {}", at.format("%Y-%m-%d %H:%M UTC"))
            }
            ConnectionStatus::Connected { last_sync: None } => println!("Connected. Never synced."),
        },
        Command::Logs { member } => {
            for entry in open_engine()?.sync_logs(&member)? {
                println!(
                    "{}  {:<6} {:<7} processed={} errors={}",
                    entry.completed_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.sync_type.as_str(),
                    entry.status.as_str(),
                    entry.events_processed,
                    entry.errors_count
                );
            }
        }
        Command::Notify { event_id, kind } => {
            let engine = open_engine()?;
            let results = NotificationDispatcher::new(engine.store(), &DisabledSender)
                .send_event_notifications(&event_id, kind)
                .await?;
            for result in results {
                let outcome = if result.sent { "sent" } else { "failed" };
                println!("{}: {} ({})", result.member_name, result.message, outcome);
            }
        }
    }

    Ok(())
}
