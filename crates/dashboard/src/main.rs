//! `wfm` -- terminal dashboard for installed workflows.
//!
//! # Environment variables
//!
//! | Variable       | Default                 | Description              |
//! |----------------|-------------------------|--------------------------|
//! | `WFM_BASE_URL` | `http://127.0.0.1:3000` | Workflow API base URL    |

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wfm_core::launch::{LaunchRequest, DEFAULT_LAUNCH_TIMEOUT_MS};
use wfm_dashboard::client::WorkflowsClient;
use wfm_dashboard::render::{CardView, PageView};
use wfm_dashboard::view::{Dashboard, LaunchState, ListState};

#[derive(Parser)]
#[command(name = "wfm")]
#[command(author, version, about = "Browse and launch workflows", long_about = None)]
struct Cli {
    /// Base URL of the workflow API.
    #[arg(long, env = "WFM_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List workflows, one card each.
    List {
        /// Print an HTML fragment instead of text.
        #[arg(long)]
        html: bool,
    },
    /// Launch a workflow and print its card with the run's address.
    Launch {
        /// Workflow id as shown on its card.
        id: String,

        /// Advisory timeout sent with the launch request.
        #[arg(long, default_value_t = DEFAULT_LAUNCH_TIMEOUT_MS)]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wfm_dashboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let client = WorkflowsClient::new(cli.base_url);

    match cli.command {
        Commands::List { html } => {
            let mut dashboard = Dashboard::new(client);
            let page = PageView::from_state(dashboard.mount().await);
            if html {
                println!("{}", page.to_html());
            } else {
                print!("{page}");
            }
            if matches!(dashboard.state(), ListState::Failed { .. }) {
                std::process::exit(1);
            }
        }
        Commands::Launch { id, timeout_ms } => {
            let mut dashboard =
                Dashboard::with_launch_request(client, LaunchRequest::with_timeout_ms(timeout_ms));

            if let ListState::Failed { message } = dashboard.mount().await {
                bail!("failed to load workflows: {message}");
            }

            let card = dashboard
                .launch(&id)
                .await
                .with_context(|| format!("cannot launch workflow {id}"))?;
            print!("{}", CardView::from_card(card));

            if let LaunchState::Failed { message } = &card.launch {
                bail!("launch failed: {message}");
            }
        }
    }

    Ok(())
}
