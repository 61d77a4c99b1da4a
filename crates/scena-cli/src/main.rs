use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod headless;

#[derive(Parser)]
#[command(name = "scena")]
#[command(about = "SCENA CLI - inspect and edit saved scenes", long_about = None)]
struct Cli {
    /// Data directory (defaults to the platform config dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved scenes, newest first
    List,
    /// Print a saved scene as JSON
    Show { id: String },
    /// Create and save an empty scene
    New { name: String },
    /// Rename a saved scene
    Rename { id: String, name: String },
    /// Delete a saved scene
    Delete {
        id: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Replace the human roster
    Roster { names: Vec<String> },
    /// Run the pane layout walkthrough on a scratch scene
    Demo,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SCENA_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let context = commands::Context::open(cli.data_dir).await?;

    match cli.command {
        Commands::List => commands::scenes::list(&context).await?,
        Commands::Show { id } => commands::scenes::show(&context, &id).await?,
        Commands::New { name } => commands::scenes::create(&context, &name).await?,
        Commands::Rename { id, name } => commands::scenes::rename(&context, &id, &name).await?,
        Commands::Delete { id, yes } => commands::scenes::delete(&context, &id, yes).await?,
        Commands::Roster { names } => commands::roster::set(&context, names).await?,
        Commands::Demo => commands::demo::run(&context).await?,
    }

    context.usecase.shutdown().await;
    Ok(())
}
