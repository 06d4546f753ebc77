//! Command-line front end for the FCM test console.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use fcm_console::config::{Endpoints, RawCredentials};
use fcm_console::{Console, DispatchOutcome, InboundRequest, NotificationRequest, Target, TargetType};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fcm-console", version, about = "Send test notifications through Firebase Cloud Messaging")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a notification described by command-line flags.
    Send(SendArgs),
    /// Send a notification described by a JSON request document.
    Request(RequestArgs),
    /// Normalize credentials and report whether they are usable.
    CheckKey(CredentialArgs),
}

#[derive(Debug, Args)]
struct SendArgs {
    #[arg(long)]
    title: String,

    #[arg(long)]
    body: String,

    /// One of token, multitoken or topic.
    #[arg(long = "target-type", value_name = "TYPE", default_value = "token")]
    target_type: TargetType,

    /// Token, topic name, or (for multitoken) one or more tokens.
    #[arg(long = "target", value_name = "TARGET", required = true)]
    targets: Vec<String>,

    /// Custom data payload as a JSON object.
    #[arg(long, value_name = "JSON")]
    payload: Option<String>,

    #[arg(long, value_name = "URL")]
    image: Option<String>,

    /// Validate the message with FCM without delivering it.
    #[arg(long = "dry-run")]
    dry_run: bool,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    credentials: CredentialArgs,
}

#[derive(Debug, Args)]
struct RequestArgs {
    /// Path to the request JSON, or `-` for stdin.
    #[arg(value_name = "PATH")]
    path: PathBuf,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    credentials: CredentialArgs,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Output formatted JSON.
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Args)]
struct CredentialArgs {
    #[arg(long = "project-id")]
    project_id: Option<String>,

    #[arg(long = "client-email")]
    client_email: Option<String>,

    #[arg(long = "private-key")]
    private_key: Option<String>,

    /// Service account JSON file used for fields not given explicitly.
    #[arg(long = "service-account", value_name = "PATH")]
    service_account: Option<PathBuf>,

    /// Base URL of the FCM API.
    #[arg(long, env = "FCM_ENDPOINT", value_name = "URL")]
    endpoint: Option<String>,

    /// OAuth2 token endpoint used to mint access tokens.
    #[arg(long = "token-uri", env = "GOOGLE_TOKEN_URI", value_name = "URL")]
    token_uri: Option<String>,
}

impl CredentialArgs {
    /// Explicit flags, then the service account file, then the environment.
    fn fallback(&self) -> anyhow::Result<RawCredentials> {
        let explicit = RawCredentials {
            project_id: self.project_id.clone(),
            client_email: self.client_email.clone(),
            private_key: self.private_key.clone(),
        };

        let file = match &self.service_account {
            Some(path) => RawCredentials::from_service_account_file(path)
                .with_context(|| format!("loading service account {:?}", path))?,
            None => RawCredentials::default(),
        };

        Ok(explicit.or(file).or(RawCredentials::from_env()))
    }

    fn endpoints(&self) -> anyhow::Result<Endpoints> {
        let endpoints = match &self.endpoint {
            Some(url) => Endpoints::new(url)?,
            None => Endpoints::default(),
        };
        match &self.token_uri {
            Some(uri) => Ok(endpoints.with_token_uri(uri)?),
            None => Ok(endpoints),
        }
    }

    fn console(&self) -> anyhow::Result<Console> {
        Ok(Console::new(self.endpoints()?, self.fallback()?))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Command::Send(args) => {
            let console = args.credentials.console()?;
            let mut request = NotificationRequest::new(
                args.title,
                args.body,
                Target::from_parts(args.target_type, &args.targets)?,
            )
            .dry_run(args.dry_run);
            request.payload = args.payload;
            request.image = args.image;

            let outcome = console.send(&request, RawCredentials::default()).await;
            print_outcome(&outcome, args.output.pretty)
        }
        Command::Request(args) => {
            let console = args.credentials.console()?;
            let text = read_input(&args.path)?;
            let request: InboundRequest = serde_json::from_str(&text).context("parsing request JSON")?;

            let outcome = console.handle(&request).await;
            print_outcome(&outcome, args.output.pretty)
        }
        Command::CheckKey(args) => match args.fallback()?.normalize() {
            Ok(credential) => {
                println!(
                    "ok: project {} as {} ({} key lines)",
                    credential.project_id(),
                    credential.client_email(),
                    credential.private_key().lines().count()
                );
                Ok(true)
            }
            Err(e) => {
                println!("invalid: {}", e);
                Ok(false)
            }
        },
    }
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("reading request from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading request {:?}", path))
}

fn print_outcome(outcome: &DispatchOutcome, pretty: bool) -> anyhow::Result<bool> {
    let json = if pretty {
        serde_json::to_string_pretty(outcome)?
    } else {
        serde_json::to_string(outcome)?
    };
    println!("{}", json);
    Ok(outcome.success)
}
