use clap::{Parser, Subcommand};

mod commands;
mod util;

use commands::assistant::AssistantCommands;
use util::exit_error;

#[derive(Parser)]
#[command(
    name = "opsdesk",
    version,
    about = "Opsdesk CLI — drive the assistant action broker from the terminal"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "OPSDESK_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Actor ID (temporary header-based identity, will be replaced by auth)
    #[arg(long, env = "OPSDESK_ACTOR_ID")]
    actor_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Assistant broker operations
    Assistant {
        #[command(subcommand)]
        command: AssistantCommands,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Health => commands::health::run(&cli.api_url).await,
        Commands::Assistant { command } => {
            let actor_id = cli.actor_id.unwrap_or_else(|| {
                exit_error(
                    "actor_id is required for assistant operations",
                    Some("Set --actor-id or the OPSDESK_ACTOR_ID env var"),
                )
            });
            if uuid::Uuid::parse_str(&actor_id).is_err() {
                exit_error(
                    "actor_id must be a UUID",
                    Some("Use the id column from the users table"),
                );
            }
            commands::assistant::run(&cli.api_url, &actor_id, command).await
        }
    };

    std::process::exit(exit_code);
}
