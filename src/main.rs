use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use messengerflow_mcp::{
    config::{
        parse_host_list, ApiConfig, RemoteConfig, DEFAULT_BASE_URL, DEFAULT_CLIENT_ID, DEFAULT_PORT,
        DEFAULT_REALM_URL,
    },
    remote, service, Error,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "MessengerFlow MCP server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// MessengerFlow API key (starts with "mf_")
    #[arg(long, global = true, env = "MESSENGERFLOW_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Base URL of the MessengerFlow REST API
    #[arg(long, global = true, env = "MESSENGERFLOW_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve a single client over stdin/stdout (default)
    Stdio,
    /// Serve many clients over authenticated streamable HTTP
    Remote(RemoteArgs),
}

#[derive(Args, Debug)]
struct RemoteArgs {
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Public URL of this server; defaults to http://localhost:{port}
    #[arg(long, env = "MCP_ISSUER_URL")]
    issuer_url: Option<String>,

    #[arg(long, env = "KEYCLOAK_REALM_URL", default_value = DEFAULT_REALM_URL)]
    realm_url: String,

    #[arg(long, env = "KEYCLOAK_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    client_id: String,

    /// Accepted Host header values, comma separated
    #[arg(long, env = "MCP_ALLOWED_HOSTS")]
    allowed_hosts: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries the protocol on stdio; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let api = ApiConfig::new(cli.api_key, cli.base_url);
    api.validate()?;

    match cli.command.unwrap_or(Command::Stdio) {
        Command::Stdio => service::serve_stdio(&api).await,
        Command::Remote(args) => {
            let mut config = RemoteConfig::new(args.port, args.issuer_url)
                .with_realm_url(args.realm_url)
                .with_client_id(args.client_id);
            if let Some(hosts) = args.allowed_hosts.as_deref().map(parse_host_list) {
                if !hosts.is_empty() {
                    config = config.with_allowed_hosts(hosts);
                }
            }
            config.validate()?;
            remote::serve(api, config).await
        }
    }
}
