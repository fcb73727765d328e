use std::error::Error;

use clap::Parser;
use tms_auth::ApiClient;
use tms_auth::commands::login::LoginCommand;
use tms_auth::commands::logout::LogoutCommand;
use tms_auth::commands::request::RequestCommand;
use tms_auth::commands::status::StatusCommand;
use tms_auth::credential::FileCredentialStore;
use tms_auth::http::client::HttpClient;
use tms_auth::parameters::{Commands, ConnectionArgs};
use tms_auth::session::{InMemorySessionSink, SessionSink};

#[derive(Parser, Debug)]
#[command(name = "tms-auth-cli", about = "Signs in to the TMS API and sends authenticated requests")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.connection.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .init();

    let config = cli
        .connection
        .client_config()
        .map_err(|e| format!("invalid connection settings: {e}"))?;
    let http_client =
        HttpClient::new(&config.http).map_err(|e| format!("error creating http client: {e}"))?;
    let client = ApiClient::new(
        http_client,
        FileCredentialStore::new(&cli.connection.store_dir),
        InMemorySessionSink::default(),
        config,
    );

    let result = match cli.command {
        Commands::Login { username, password } => LoginCommand::new(client.clone())
            .login(&username, &password)
            .await
            .map(|user| println!("signed in as {}", user.username().unwrap_or(&username))),
        Commands::Logout => LogoutCommand::new(client.clone())
            .logout()
            .map(|_| println!("signed out")),
        Commands::Status => StatusCommand::new(client.clone())
            .status()
            .map(|status| println!("{status}")),
        Commands::Request { method, path, body } => RequestCommand::new(client.clone())
            .request(method.into(), &path, body.as_deref())
            .await
            .and_then(|value| {
                serde_json::to_string_pretty(&value)
                    .map(|output| println!("{output}"))
                    .map_err(|e| tms_auth::ApiError::Decode(e.to_string()).into())
            }),
    };

    // The session ended while handling the command.
    if let Some(route) = client.sink().current_route() {
        match client.sink().disabled_reason() {
            Some(reason) => eprintln!("account disabled: {reason}"),
            None => eprintln!("session ended ({route}), sign in again with `tms-auth-cli login`"),
        }
    }

    Ok(result?)
}
