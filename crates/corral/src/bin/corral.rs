//! Corral CLI - deploy compose stacks onto a Rancher-style control plane
//!
//! Usage:
//!   corral up                          # Create and start every service
//!   corral up -u web                   # Upgrade the web service if it changed
//!   corral up --confirm-upgrade        # Finish a pending upgrade
//!   corral create                      # Create services without starting them
//!   corral pull --cached               # Refresh images on hosts that have them
//!   corral events                      # Handle control plane events from stdin
//!   corral export -o out               # Write the deployed stack as compose files

use anyhow::Result;
use argh::FromArgs;
use corral::cli::{
    CreateCommand, EventsCommand, ExportCommand, ProjectOptions, PullCommand, UpCommand,
};
use tokio_util::sync::CancellationToken;

/// Corral - deploy compose stacks onto a Rancher-style control plane
#[derive(FromArgs)]
struct Args {
    /// enable debug logging
    #[argh(switch)]
    verbose: bool,

    /// compose file to load, repeatable (env: COMPOSE_FILE)
    #[argh(option, short = 'f')]
    file: Vec<String>,

    /// project name (env: COMPOSE_PROJECT_NAME, default: current directory)
    #[argh(option, short = 'p')]
    project_name: Option<String>,

    /// control plane API URL (env: RANCHER_URL)
    #[argh(option)]
    url: Option<String>,

    /// API access key (env: RANCHER_ACCESS_KEY)
    #[argh(option)]
    access_key: Option<String>,

    /// API secret key (env: RANCHER_SECRET_KEY)
    #[argh(option)]
    secret_key: Option<String>,

    /// rancher-compose file (default: rancher-compose.yml next to the compose file)
    #[argh(option, short = 'r')]
    rancher_file: Option<String>,

    /// file of KEY=VALUE variables for interpolation
    #[argh(option, short = 'e')]
    env_file: Option<String>,

    /// JSON file of per-service label and port bindings
    #[argh(option, short = 'b')]
    bindings_file: Option<String>,

    /// show version information
    #[argh(switch, short = 'V')]
    version: bool,

    #[argh(subcommand)]
    command: Option<Command>,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Create(CreateCommand),
    Up(UpCommand),
    Pull(PullCommand),
    Events(EventsCommand),
    Export(ExportCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = argh::from_env();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();

    if args.version {
        println!("corral {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("Interrupted, cancelling pending operations");
        on_signal.cancel();
    })?;

    let project = ProjectOptions {
        files: args.file,
        project_name: args.project_name,
        url: args.url,
        access_key: args.access_key,
        secret_key: args.secret_key,
        rancher_file: args.rancher_file,
        env_file: args.env_file,
        bindings_file: args.bindings_file,
    };

    match args.command {
        None => {
            eprintln!("Corral - deploy compose stacks onto a Rancher-style control plane\n");
            eprintln!("Usage: corral [options] <command>\n");
            eprintln!("Commands:");
            eprintln!("  create    Create all services but do not start them");
            eprintln!("  up        Bring all services up:");
            eprintln!("              -u, --upgrade: Upgrade changed services");
            eprintln!("              --force-upgrade: Upgrade regardless of changes");
            eprintln!("              -c, --confirm-upgrade: Finish a pending upgrade");
            eprintln!("              -r, --rollback: Roll back to the previous version");
            eprintln!("  pull      Pull service images onto the hosts");
            eprintln!("  events    Handle control plane events read from stdin");
            eprintln!("  export    Write the deployed stack out as compose files:");
            eprintln!("              --format split|combined: Output layout");
            eprintln!("              -o, --output: Directory to write into");
            eprintln!("\nRun 'corral <command> --help' for more information.");
        }
        Some(Command::Create(cmd)) => cmd.run(&project, &cancel).await?,
        Some(Command::Up(cmd)) => cmd.run(&project, &cancel).await?,
        Some(Command::Pull(cmd)) => cmd.run(&project, &cancel).await?,
        Some(Command::Events(cmd)) => cmd.run(&project, &cancel).await?,
        Some(Command::Export(cmd)) => cmd.run(&project, &cancel).await?,
    }

    Ok(())
}
