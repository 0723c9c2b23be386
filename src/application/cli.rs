#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use std::io;
use std::io::Write;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use yansi::Paint;

use crate::configuration::cache_dir;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendName;
use crate::domain::models::SessionRecord;
use crate::domain::services::actions::help_text;
use crate::domain::services::Orchestrator;
use crate::infrastructure::backends::BackendManager;
use crate::infrastructure::store::SessionStore;

/// Everything the chat UI needs once the CLI decided to open it.
pub struct Launch {
    pub config: Config,
    pub orchestrator: Orchestrator,
}

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

fn format_session(session: &SessionRecord) -> String {
    let mut res = format!(
        "- (ID: {}) {}, Messages: {}",
        session.id,
        session.created_at.format("%Y-%m-%d %H:%M:%S"),
        session.message_count
    );

    if let Some(first_user_message) = &session.first_user_message {
        let mut line = first_user_message
            .trim()
            .split('\n')
            .next()
            .unwrap_or_default()
            .to_string();

        if line.chars().count() >= 70 {
            line = format!("{}...", line.chars().take(67).collect::<String>());
        }
        res = format!("{res}, {line}");
    }

    return res;
}

async fn connect_store(config: &Config) -> Result<SessionStore> {
    let store = SessionStore::connect(
        &config.get(ConfigKey::DatabaseURL),
        config.database_pool_size()?,
    )
    .await?;
    store.ensure_schema().await?;

    return Ok(store);
}

async fn print_sessions_list(config: &Config) -> Result<()> {
    let mut sessions = connect_store(config)
        .await?
        .list_sessions()
        .await?
        .iter()
        .map(|session| {
            return format_session(session);
        })
        .collect::<Vec<String>>();

    sessions.reverse();

    if sessions.is_empty() {
        println!("There are no sessions available. You should start your first one!");
    } else {
        println!("{}", sessions.join("\n"));
    }

    return Ok(());
}

async fn print_session_transcript(config: &Config, session_id: &str) -> Result<()> {
    let store = connect_store(config).await?;
    let id = store.get_or_create_session(Some(session_id)).await?;
    let messages = store.list_messages(&id).await?;

    if messages.is_empty() {
        println!("Session {id} has no messages yet.");
        return Ok(());
    }

    let transcript = messages
        .iter()
        .map(|message| {
            return format!(
                "{}\n{}",
                Paint::new(message.role.to_string()).bold(),
                message.content
            );
        })
        .collect::<Vec<String>>()
        .join("\n\n");
    println!("{transcript}");

    return Ok(());
}

async fn create_config_file(config_file_path_str: &str) -> Result<()> {
    let config_file_path = path::PathBuf::from(config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

async fn select_session_interactive(config: &Config) -> Result<Option<String>> {
    let mut sessions = connect_store(config).await?.list_sessions().await?;
    sessions.reverse();

    if sessions.is_empty() {
        println!("There are no sessions available. You should start your first one!");
        return Ok(None);
    }

    let session_options = sessions
        .iter()
        .map(|session| {
            return format_session(session);
        })
        .collect::<Vec<String>>();

    let idx = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Which session would you like to open?")
        .default(0)
        .items(&session_options)
        .interact_opt()?;

    return Ok(idx.map(|idx| return sessions[idx].id.to_string()));
}

/// Connects the store and backend, then fills the working set. `session_id`
/// picks the session to open first.
async fn bootstrap(config: &Config, session_id: Option<&str>) -> Result<Orchestrator> {
    let store = connect_store(config).await?;
    let backend = BackendManager::get(config.backend()?, config)?;

    let mut orchestrator = Orchestrator::new(store, backend, config.max_context_messages()?);
    orchestrator.load(session_id).await?;

    return Ok(orchestrator);
}

/// Writes the part of `reply` past `printed`. `printed` moves once the bytes
/// are handed to `out`, even when the following flush fails.
fn write_reply<W: Write>(out: &mut W, reply: &str, printed: &mut usize) {
    if let Err(err) = out.write_all(reply[*printed..].as_bytes()) {
        tracing::warn!(error = ?err, "Failed to write reply to stdout");
        return;
    }
    *printed = reply.len();

    if let Err(err) = out.flush() {
        tracing::warn!(error = ?err, "Failed to flush stdout");
    }
}

/// Runs one turn against a session and streams the reply to stdout. Without
/// a session id a fresh session is started.
async fn ask(config: &Config, text: &str) -> Result<()> {
    let mut session_id = config.get(ConfigKey::SessionID);
    if session_id.is_empty() {
        session_id = connect_store(config).await?.create_session().await?;
    }

    let mut orchestrator = bootstrap(config, Some(session_id.as_str())).await?;

    let mut stdout = io::stdout();
    let mut printed = 0;
    orchestrator
        .submit(text, |reply| {
            write_reply(&mut stdout, reply, &mut printed);
        })
        .await?;

    println!();
    eprintln!(
        "{}",
        Paint::default(format!("Session: {session_id}")).dimmed()
    );

    return Ok(());
}

fn subcommand_ask() -> Command {
    return Command::new("ask")
        .about("Sends a single message and streams the reply to stdout.")
        .arg(
            Arg::new("text")
                .help("The message to send.")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new(ConfigKey::SessionID.to_string())
                .short('i')
                .long(ConfigKey::SessionID.to_string())
                .env(ConfigKey::SessionID.env_var())
                .help("Continue an existing session instead of starting a new one.")
                .num_args(1),
        );
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_debug() -> Command {
    return Command::new("debug")
        .about("Debug helpers for Parley")
        .hide(true)
        .subcommand(
            Command::new("log-path").about("Output path to debug log file generated when running Parley with environment variable RUST_LOG=parley")
        )
        .subcommand(
            Command::new("enum-config").about("List all config keys as strings.")
        );
}

fn arg_session_id(help: &'static str) -> Arg {
    return Arg::new(ConfigKey::SessionID.to_string())
        .short('i')
        .long("id")
        .help(help)
        .num_args(1);
}

fn subcommand_sessions() -> Command {
    return Command::new("sessions")
        .about("Manage stored chat sessions.")
        .arg_required_else_help(true)
        .subcommand(Command::new("list").about("List all open sessions with their ids and first message."))
        .subcommand(
            Command::new("open")
                .about("Open a session by ID, including closed ones. Omit passing any session ID to load an interactive selection.")
                .arg(arg_session_id("Session ID")),
        )
        .subcommand(
            Command::new("show")
                .about("Print the full transcript of a session.")
                .arg(arg_session_id("Session ID").required(true)),
        )
        .subcommand(
            Command::new("delete")
                .about("Close a session. Its messages are kept and it can be reopened with `sessions open --id`.")
                .arg(arg_session_id("Session ID").required(true)),
        );
}

fn config_arg(key: ConfigKey, help: &str) -> Arg {
    let mut help = help.to_string();
    let default = Config::default(key);
    if !default.is_empty() && key != ConfigKey::Username {
        help = format!("{help} [default: {default}]");
    }

    return Arg::new(key.to_string())
        .long(key.to_string())
        .env(key.env_var())
        .num_args(1)
        .help(help)
        .global(true);
}

pub fn build() -> Command {
    let commands_text = help_text()
        .split('\n')
        .map(|line| {
            if line.starts_with('-') {
                return format!("  {line}");
            }
            if line.starts_with("COMMANDS:") || line.starts_with("HOTKEYS:") {
                return Paint::new(format!("CHAT {line}"))
                    .underline()
                    .bold()
                    .to_string();
            }
            return line.to_string();
        })
        .collect::<Vec<String>>()
        .join("\n");

    let about = format!(
        "{}\n\nVersion: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    );

    return Command::new("parley")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(commands_text)
        .arg_required_else_help(false)
        .subcommand(Command::new("chat").about("Open the chat UI on the most recent session."))
        .subcommand(subcommand_ask())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(subcommand_debug())
        .subcommand(Command::new("manpages").about("Generates manpages and outputs to stdout."))
        .subcommand(subcommand_sessions())
        .arg(
            config_arg(ConfigKey::Backend, "The backend hosting a model to connect to.")
                .short('b')
                .value_parser(PossibleValuesParser::new(BackendName::VARIANTS)),
        )
        .arg(config_arg(
            ConfigKey::BackendHealthCheckTimeout,
            "Time to wait in milliseconds before timing out when doing a healthcheck for a backend.",
        ))
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env(ConfigKey::ConfigFile.env_var())
                .num_args(1)
                .help(format!("Path to configuration file [default: {}]", Config::default(ConfigKey::ConfigFile)))
                .global(true)
        )
        .arg(config_arg(
            ConfigKey::DatabaseURL,
            "SQLite database URL where sessions and messages are stored.",
        ))
        .arg(config_arg(
            ConfigKey::DatabasePoolSize,
            "Maximum number of connections to the database.",
        ))
        .arg(config_arg(
            ConfigKey::MaxContextMessages,
            "Number of most recent messages sent with each request. 0 sends the whole transcript.",
        ))
        .arg(config_arg(ConfigKey::Model, "The model on a backend to consume.").short('m'))
        .arg(config_arg(
            ConfigKey::OllamaURL,
            "Ollama API URL when using the Ollama backend.",
        ))
        .arg(config_arg(
            ConfigKey::OpenaiToken,
            "OpenAI API token when using the OpenAI backend.",
        ))
        .arg(config_arg(
            ConfigKey::OpenaiURL,
            "OpenAI API URL when using the OpenAI backend. Can be swapped to a compatible proxy.",
        ))
        .arg(config_arg(
            ConfigKey::SystemPrompt,
            "Instructions sent as the system message ahead of every transcript.",
        ))
        .arg(config_arg(
            ConfigKey::Temperature,
            "Sampling temperature between 0.0 and 2.0.",
        ))
        .arg(config_arg(
            ConfigKey::Username,
            "Your user name displayed above your messages. Defaults to $USER.",
        ));
}

async fn load_config(cmd_matches: Vec<&ArgMatches>) -> Result<Config> {
    return Ok(Config::load(build(), cmd_matches).await?);
}

/// Handles the CLI. Returns `None` when the command completed on its own and
/// the chat UI shouldn't open.
pub async fn parse() -> Result<Option<Launch>> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("debug", debug_matches)) => {
            match debug_matches.subcommand() {
                Some(("log-path", _)) => {
                    let log_path = cache_dir().join("debug.log");
                    println!("{}", log_path.to_string_lossy());
                }
                Some(("enum-config", _)) => {
                    let res = ConfigKey::VARIANTS.join("\n");
                    println!("{}", res);
                }
                _ => {
                    subcommand_debug().print_long_help()?;
                }
            }

            return Ok(None);
        }
        Some(("ask", ask_matches)) => {
            let config = load_config(vec![&matches, ask_matches]).await?;
            let text = ask_matches
                .get_one::<String>("text")
                .map(|text| return text.to_string())
                .unwrap_or_default();
            ask(&config, &text).await?;
            return Ok(None);
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
            return Ok(None);
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                let config_file = matches
                    .get_one::<String>(&ConfigKey::ConfigFile.to_string())
                    .map(|path| return path.to_string())
                    .unwrap_or_else(|| return Config::default(ConfigKey::ConfigFile));
                create_config_file(&config_file).await?;
                return Ok(None);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(None);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(None);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(None);
            }
        },
        Some(("manpages", _)) => {
            clap_mangen::Man::new(build()).render(&mut io::stdout())?;
            return Ok(None);
        }
        Some(("sessions", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("list", list_matches)) => {
                let config = load_config(vec![&matches, subcmd_matches, list_matches]).await?;
                print_sessions_list(&config).await?;
                return Ok(None);
            }
            Some(("open", open_matches)) => {
                let config = load_config(vec![&matches, subcmd_matches, open_matches]).await?;
                let mut session_id = config.get(ConfigKey::SessionID);
                if session_id.is_empty() {
                    match select_session_interactive(&config).await? {
                        Some(id) => session_id = id,
                        None => return Ok(None),
                    }
                }

                let orchestrator = bootstrap(&config, Some(session_id.as_str())).await?;
                return Ok(Some(Launch {
                    config,
                    orchestrator,
                }));
            }
            Some(("show", show_matches)) => {
                let config = load_config(vec![&matches, subcmd_matches, show_matches]).await?;
                print_session_transcript(&config, &config.get(ConfigKey::SessionID)).await?;
                return Ok(None);
            }
            Some(("delete", delete_matches)) => {
                let config =
                    load_config(vec![&matches, subcmd_matches, delete_matches]).await?;
                let session_id = config.get(ConfigKey::SessionID);
                connect_store(&config)
                    .await?
                    .archive_session(&session_id)
                    .await?;
                println!("Closed session {session_id}. Reopen it with `parley sessions open --id {session_id}`.");
                return Ok(None);
            }
            _ => {
                subcommand_sessions().print_long_help()?;
                return Ok(None);
            }
        },
        Some(("chat", chat_matches)) => {
            let config = load_config(vec![&matches, chat_matches]).await?;
            let orchestrator = bootstrap(&config, None).await?;
            return Ok(Some(Launch {
                config,
                orchestrator,
            }));
        }
        _ => {
            let config = load_config(vec![&matches]).await?;
            let orchestrator = bootstrap(&config, None).await?;
            return Ok(Some(Launch {
                config,
                orchestrator,
            }));
        }
    }
}
