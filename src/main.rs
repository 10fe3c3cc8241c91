use clap::{Parser, Subcommand};
use database::{connect, run_migrations, DbRepository};
use portfolio::LegacyMigrator;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// The main entry point for the Summit portfolio application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = configuration::load_config()?;
            web_server::run_server(config).await?;
        }
        Commands::MigrateLegacy(args) => {
            handle_migrate_legacy(args).await?;
        }
    }

    Ok(())
}

/// Holdings tracking and exit-strategy planning for a crypto portfolio.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server.
    Serve,
    /// Migrate an account's legacy journal rows into the trade ledger.
    MigrateLegacy(MigrateLegacyArgs),
}

#[derive(Parser)]
struct MigrateLegacyArgs {
    /// The account to migrate.
    #[arg(long)]
    account: Uuid,
}

async fn handle_migrate_legacy(args: MigrateLegacyArgs) -> anyhow::Result<()> {
    let db_pool = connect().await?;
    run_migrations(&db_pool).await?;

    let repo = DbRepository::new(db_pool);
    let migrator = LegacyMigrator::new(repo);

    let migrated = migrator.migrate(args.account).await?;
    tracing::info!(account = %args.account, migrated, "legacy migration complete");
    println!("Migrated {} legacy entries for {}", migrated, args.account);

    Ok(())
}
