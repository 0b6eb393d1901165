use approval::SlackNotifier;
use clap::{Parser, Subcommand, ValueEnum};
use deploy::Promoter;
use lambda_runtime::{service_fn, LambdaEvent};
use pipeline::{
    handle_approval, handle_deploy, init_tracing, ApprovalEvent, DeployEvent, LogFormat,
};
use tracing::{info, warn};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "pipeline")]
#[command(about = "Approval and promotion steps of the model release pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Post the approval request to the Slack webhook
    Notify {
        /// Task token of the paused workflow
        #[arg(short, long)]
        token: String,
    },
    /// Print the approval payload without sending it
    Render {
        /// Task token of the paused workflow
        #[arg(short, long)]
        token: String,
    },
    /// Publish a model image and move the live alias
    Promote {
        /// Target environment (stage or prod)
        #[arg(short, long)]
        env: String,
        /// Model version, used as the image tag
        #[arg(short, long)]
        commit: String,
    },
    /// Serve a handler on the Lambda runtime
    Lambda {
        #[arg(value_enum)]
        handler: HandlerKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum HandlerKind {
    Approve,
    Deploy,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let format = match cli.command {
        Commands::Lambda { .. } => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    init_tracing(format);

    match cli.command {
        Commands::Notify { token } => {
            let notifier = SlackNotifier::from_env()?;
            let report = notifier.notify(&token).await?;
            if !report.is_delivered() {
                warn!("Webhook answered {}", report.status);
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Render { token } => {
            let notifier = SlackNotifier::from_env()?;
            let message = notifier.build_message(&token)?;
            println!("{}", serde_json::to_string_pretty(&message.to_slack())?);
        }
        Commands::Promote { env, commit } => {
            let promoter = Promoter::from_env().await?;
            let report = promoter.promote_str(&env, &commit).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Lambda { handler } => match handler {
            HandlerKind::Approve => serve_approval().await?,
            HandlerKind::Deploy => serve_deploy().await?,
        },
    }

    Ok(())
}

async fn serve_approval() -> CliResult<()> {
    let notifier = SlackNotifier::from_env()?;
    let notifier = &notifier;
    info!(
        "Serving approval requests for {}",
        notifier.config().feature_name
    );

    lambda_runtime::run(service_fn(
        move |event: LambdaEvent<ApprovalEvent>| async move {
            handle_approval(notifier, event.payload)
                .await
                .map_err(lambda_runtime::Error::from)
        },
    ))
    .await
}

async fn serve_deploy() -> CliResult<()> {
    let promoter = Promoter::from_env().await?;
    let promoter = &promoter;
    info!(
        "Serving promotions for {} alias {}",
        promoter.config().function_name,
        promoter.config().alias_name
    );

    lambda_runtime::run(service_fn(
        move |event: LambdaEvent<DeployEvent>| async move {
            handle_deploy(promoter, event.payload)
                .await
                .map_err(lambda_runtime::Error::from)
        },
    ))
    .await
}
