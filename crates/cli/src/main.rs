mod auth_commands;
mod chat_commands;
mod context;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::context::AppContext;

#[derive(Parser)]
#[command(name = "tidings", about = "Tidings, a session-aware chat client", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Read config and the token file from this directory only.
    #[arg(long, global = true, env = "TIDINGS_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TIDINGS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and log in.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "TIDINGS_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        password_confirmation: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show the current user, roles and permissions.
    Whoami,
    /// Check a permission.
    Can { permission: String },
    /// Show where navigating to a path would lead.
    Route { path: String },
    /// Fetch and print the message list.
    Messages,
    /// Send a message.
    Send { text: String },
    /// Mark all messages as seen.
    Seen,
    /// Publish the typing indicator.
    Typing {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
    /// Follow the realtime topic and print incoming messages.
    Watch,
    /// Send an authenticated request to the API and print the JSON reply.
    Api {
        method: String,
        path: String,
        #[arg(long)]
        body: Option<String>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(ctx: &AppContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Login { email, password } => auth_commands::login(ctx, &email, password).await,
        Commands::Register {
            name,
            email,
            password,
            password_confirmation,
        } => auth_commands::register(ctx, &name, &email, password, password_confirmation).await,
        Commands::Logout => {
            auth_commands::logout(ctx);
            Ok(())
        },
        Commands::Whoami => {
            auth_commands::whoami(ctx);
            Ok(())
        },
        Commands::Can { permission } => {
            if auth_commands::can(ctx, &permission) {
                Ok(())
            } else {
                anyhow::bail!("permission {permission} not granted")
            }
        },
        Commands::Route { path } => {
            auth_commands::route(ctx, &path);
            Ok(())
        },
        Commands::Messages => chat_commands::messages(ctx).await,
        Commands::Send { text } => chat_commands::send(ctx, &text).await,
        Commands::Seen => chat_commands::seen(ctx).await,
        Commands::Typing { state } => chat_commands::typing(ctx, &state).await,
        Commands::Watch => chat_commands::watch(ctx).await,
        Commands::Api { method, path, body } => {
            chat_commands::api(ctx, &method, &path, body.as_deref()).await
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "tidings starting");

    if let Some(dir) = &cli.config_dir {
        tidings_config::set_config_dir(dir.clone());
    }

    let ctx = AppContext::start().await?;
    let result = run(&ctx, cli.command).await;
    ctx.shutdown();
    result
}
