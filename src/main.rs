mod api;
mod auth;
mod config;
mod memberships;
mod messages;
mod output;
mod people;
mod rooms;

use std::error::Error;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::api::{ApiClient, ApiError};
use crate::auth::{AuthError, Authorized};
use crate::config::Config;

const LOG_ENV: &str = "SPARKCLI_LOG";

#[derive(Parser)]
#[command(
    name = "sparkcli",
    version,
    about = "Command line client for the Cisco Spark REST API",
    after_help = "Examples:\n  sparkcli login --code <code>\n  sparkcli rooms list\n  sparkcli rooms default <room-id>\n  sparkcli messages create - \"hello from the shell\"\n  sparkcli messages create - --file ./report.pdf\n  sparkcli people get\n  sparkcli memberships create --room - --email someone@example.com\n  sparkcli --json messages list"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, help = "Output JSON instead of a table")]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    #[command(visible_alias = "l", about = "Obtain or verify an access token")]
    Login(LoginArgs),
    #[command(visible_alias = "r", about = "List and manage rooms")]
    Rooms {
        #[command(subcommand)]
        command: RoomsCommand,
    },
    #[command(visible_alias = "m", about = "Read and post messages")]
    Messages {
        #[command(subcommand)]
        command: MessagesCommand,
    },
    #[command(visible_alias = "p", about = "Look up people")]
    People {
        #[command(subcommand)]
        command: PeopleCommand,
    },
    #[command(visible_alias = "ms", about = "List and manage room memberships")]
    Memberships {
        #[command(subcommand)]
        command: MembershipsCommand,
    },
    #[command(about = "Show the configuration file in use")]
    Config,
}

#[derive(Args)]
struct LoginArgs {
    #[arg(long, help = "Authorization code to store before logging in")]
    code: Option<String>,
}

#[derive(Subcommand)]
enum RoomsCommand {
    #[command(visible_alias = "l", about = "List rooms")]
    List,
    #[command(visible_alias = "c", about = "Create a room")]
    Create {
        #[arg(help = "Room title")]
        title: String,
    },
    #[command(visible_alias = "g", about = "Show a room (default room when omitted)")]
    Get {
        #[arg(help = "Room id or - for the default room")]
        id: Option<String>,
    },
    #[command(visible_alias = "u", about = "Rename a room")]
    Update {
        #[arg(help = "Room id")]
        id: String,
        #[arg(help = "New title")]
        title: String,
    },
    #[command(visible_alias = "d", about = "Delete a room")]
    Delete {
        #[arg(help = "Room id")]
        id: String,
    },
    #[command(about = "Show or set the default room")]
    Default {
        #[arg(help = "Room id to store as default")]
        id: Option<String>,
    },
}

#[derive(Subcommand)]
enum MessagesCommand {
    #[command(visible_alias = "l", about = "List messages in a room")]
    List {
        #[arg(default_value = "-", help = "Room id or - for the default room")]
        room: String,
    },
    #[command(visible_alias = "c", about = "Post a message to a room")]
    Create(MessagesCreateArgs),
    #[command(visible_alias = "g", about = "Show a message")]
    Get {
        #[arg(help = "Message id")]
        id: String,
    },
    #[command(visible_alias = "d", about = "Delete a message")]
    Delete {
        #[arg(help = "Message id")]
        id: String,
    },
}

#[derive(Args)]
struct MessagesCreateArgs {
    #[arg(help = "Room id or - for the default room")]
    room: String,

    #[arg(required_unless_present = "file", help = "Message text")]
    text: Vec<String>,

    #[arg(long, help = "Attach a file to the message")]
    file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum PeopleCommand {
    #[command(visible_alias = "g", about = "Show a person (yourself when omitted)")]
    Get {
        #[arg(default_value = "me", help = "Person id or me")]
        id: String,
    },
    #[command(visible_alias = "l", about = "Search people by email or name")]
    List {
        #[arg(long, help = "Email address")]
        email: Option<String>,
        #[arg(long, help = "Display name, prefix match")]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum MembershipsCommand {
    #[command(visible_alias = "l", about = "List memberships")]
    List {
        #[arg(long, help = "Room id or - for the default room")]
        room: Option<String>,
        #[arg(long, help = "Person id")]
        person_id: Option<String>,
        #[arg(long, help = "Person email")]
        email: Option<String>,
    },
    #[command(visible_alias = "c", about = "Add a person to a room")]
    Create {
        #[arg(long, help = "Room id or - for the default room")]
        room: String,
        #[arg(long, help = "Person id")]
        person_id: Option<String>,
        #[arg(long, help = "Person email")]
        email: Option<String>,
    },
    #[command(visible_alias = "g", about = "Show a membership")]
    Get {
        #[arg(help = "Membership id")]
        id: String,
    },
    #[command(visible_alias = "u", about = "Grant or revoke moderator rights")]
    Update {
        #[arg(help = "Membership id")]
        id: String,
        #[arg(long, action = ArgAction::Set, help = "true or false")]
        moderator: bool,
    },
    #[command(visible_alias = "d", about = "Remove a membership")]
    Delete {
        #[arg(help = "Membership id")]
        id: String,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(error) = run().await {
        eprintln!("{error}");
        std::process::exit(exit_code(error.as_ref()));
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 2 when the user has to obtain a new authorization code, 1 otherwise.
fn exit_code(error: &(dyn Error + 'static)) -> i32 {
    let auth = match error.downcast_ref::<ApiError>() {
        Some(ApiError::Auth(auth)) => Some(auth),
        Some(_) => None,
        None => error.downcast_ref::<AuthError>(),
    };
    match auth {
        Some(auth) if auth.needs_user_action() => 2,
        _ => 1,
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let path = Config::locate();
    debug!(path = %path.display(), "loading config");
    let config = Config::load(path)?;
    let mut client = ApiClient::new(config);

    match cli.command {
        Command::Login(args) => {
            if let Some(code) = args.code {
                client.config_mut().auth_code = code;
                client.config().save()?;
            }
            let outcome = auth::authorize(&mut client).await?;
            if cli.json {
                let status = match outcome {
                    Authorized::AlreadyValid => "valid",
                    Authorized::Exchanged => "exchanged",
                };
                output::print_json(&json!({ "status": status }))?;
            } else {
                match outcome {
                    Authorized::AlreadyValid => println!("Access token is valid."),
                    Authorized::Exchanged => {
                        println!("Logged in. Tokens saved to {}", client.config().path().display())
                    }
                }
            }
        }
        Command::Rooms { command } => match command {
            RoomsCommand::List => {
                let rooms = client.list_rooms().await?;
                output::print_rooms(&rooms, cli.json)?;
            }
            RoomsCommand::Create { title } => {
                let room = client.create_room(&title).await?;
                output::print_created(&room, room.id.as_deref(), cli.json)?;
            }
            RoomsCommand::Get { id } => {
                let id = client.config().resolve_room(id.as_deref())?;
                let room = client.get_room(&id).await?;
                output::print_room(&room, cli.json)?;
            }
            RoomsCommand::Update { id, title } => {
                let room = client.update_room(&id, &title).await?;
                output::print_room(&room, cli.json)?;
            }
            RoomsCommand::Delete { id } => {
                client.delete_room(&id).await?;
                print_deleted("room", &id, cli.json)?;
            }
            RoomsCommand::Default { id: Some(id) } => {
                client.config_mut().set_default_room(&id)?;
                if cli.json {
                    output::print_json(&json!({ "defaultRoomId": id }))?;
                } else {
                    println!("Default room set to {id}");
                }
            }
            RoomsCommand::Default { id: None } => {
                let id = client.config().resolve_room(None)?;
                if cli.json {
                    output::print_json(&json!({ "defaultRoomId": id }))?;
                } else {
                    println!("{id}");
                }
            }
        },
        Command::Messages { command } => match command {
            MessagesCommand::List { room } => {
                let messages = client.list_messages(&room).await?;
                output::print_messages(&messages, cli.json)?;
            }
            MessagesCommand::Create(args) => {
                let text = args.text.join(" ");
                let message = match args.file {
                    Some(file) => client.upload_message(&args.room, Some(text.as_str()), &file).await?,
                    None => client.create_message(&args.room, &text).await?,
                };
                output::print_created(&message, message.id.as_deref(), cli.json)?;
            }
            MessagesCommand::Get { id } => {
                let message = client.get_message(&id).await?;
                output::print_message(&message, cli.json)?;
            }
            MessagesCommand::Delete { id } => {
                client.delete_message(&id).await?;
                print_deleted("message", &id, cli.json)?;
            }
        },
        Command::People { command } => match command {
            PeopleCommand::Get { id } => {
                let person = client.get_person(&id).await?;
                output::print_person(&person, cli.json)?;
            }
            PeopleCommand::List { email, name } => {
                let people = client.list_people(email.as_deref(), name.as_deref()).await?;
                output::print_people(&people, cli.json)?;
            }
        },
        Command::Memberships { command } => match command {
            MembershipsCommand::List {
                room,
                person_id,
                email,
            } => {
                let room = match room {
                    Some(room) => Some(client.config().resolve_room(Some(room.as_str()))?),
                    None => None,
                };
                let memberships = client
                    .list_memberships(room.as_deref(), person_id.as_deref(), email.as_deref())
                    .await?;
                output::print_memberships(&memberships, cli.json)?;
            }
            MembershipsCommand::Create {
                room,
                person_id,
                email,
            } => {
                let membership = client
                    .create_membership(&room, person_id.as_deref(), email.as_deref())
                    .await?;
                output::print_created(&membership, membership.id.as_deref(), cli.json)?;
            }
            MembershipsCommand::Get { id } => {
                let membership = client.get_membership(&id).await?;
                output::print_membership(&membership, cli.json)?;
            }
            MembershipsCommand::Update { id, moderator } => {
                let membership = client.update_membership(&id, moderator).await?;
                output::print_membership(&membership, cli.json)?;
            }
            MembershipsCommand::Delete { id } => {
                client.delete_membership(&id).await?;
                print_deleted("membership", &id, cli.json)?;
            }
        },
        Command::Config => print_config(client.config(), cli.json)?,
    }

    Ok(())
}

fn print_deleted(kind: &str, id: &str, json: bool) -> Result<(), output::OutputError> {
    if json {
        return output::print_json(&json!({ "deleted": id }));
    }
    println!("Deleted {kind} {id}");
    Ok(())
}

fn print_config(config: &Config, json: bool) -> Result<(), output::OutputError> {
    let path = config.path().display().to_string();
    if json {
        return output::print_json(&json!({
            "path": path,
            "baseUrl": config.base_url,
            "clientId": config.client_id,
            "redirectUri": config.redirect_uri,
            "scope": config.scope,
            "defaultRoomId": config.default_room_id,
            "hasAccessToken": config.has_access_token(),
            "hasRefreshToken": !config.refresh_token.is_empty(),
        }));
    }
    println!("path: {path}");
    println!("base url: {}", config.base_url);
    println!("client id: {}", dash_if_empty(&config.client_id));
    println!("redirect uri: {}", config.redirect_uri);
    println!("scope: {}", config.scope);
    println!("default room: {}", dash_if_empty(&config.default_room_id));
    println!("access token: {}", if config.has_access_token() { "set" } else { "-" });
    println!("refresh token: {}", if config.refresh_token.is_empty() { "-" } else { "set" });
    Ok(())
}

fn dash_if_empty(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}
