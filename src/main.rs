use anyhow::Result;
use background_remover::models::{
    Config, OutputFormat, RemovalOptions, RequestState, Resolution, SourceImage,
};
use background_remover::orchestrator::UploadOrchestrator;
use background_remover::removal::RemoveBgClient;
use background_remover::session;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "background-remover")]
#[command(about = "Remove the background from an image")]
struct CliArgs {
    /// Image to process. GIF images are not supported by the service.
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Output format requested from the service: auto, png, jpg or zip.
    #[arg(long, value_parser = parse_format_arg)]
    format: Option<OutputFormat>,

    /// Output resolution requested from the service: preview, full or 50MP.
    #[arg(long, value_parser = parse_resolution_arg)]
    resolution: Option<Resolution>,

    /// Directory the processed image is saved into.
    #[arg(long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Comparison slider position, 0-100.
    #[arg(long, allow_hyphen_values = true)]
    slider: Option<String>,

    /// Print the final presentation state as JSON.
    #[arg(long)]
    json: bool,

    /// Read configuration from this env file instead of ./.env.
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,
}

fn parse_format_arg(input: &str) -> std::result::Result<OutputFormat, String> {
    input.parse().map_err(|e| format!("{}", e))
}

fn parse_resolution_arg(input: &str) -> std::result::Result<Resolution, String> {
    input.parse().map_err(|e| format!("{}", e))
}

fn resolve_options(config: &Config, args: &CliArgs) -> RemovalOptions {
    RemovalOptions {
        format: args.format.unwrap_or(config.options.format),
        resolution: args.resolution.unwrap_or(config.options.resolution),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "background_remover=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let loaded = match &args.env_file {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    let options = resolve_options(&config, &args);

    let client = RemoveBgClient::from_config(&config)?;
    let orchestrator = UploadOrchestrator::new(Arc::new(client)).with_options(options);
    let session = session::spawn(orchestrator);

    let image = SourceImage::from_path(&args.image)?;
    info!(
        "Removing background from {} (format {}, resolution {})",
        args.image.display(),
        options.format,
        options.resolution
    );

    let generation = session.pick_file(image).await?;
    if let Some(raw) = &args.slider {
        session.move_slider(raw).await?;
    }
    let mut snapshot = session.wait_until_settled(generation).await?;

    let succeeded = snapshot.state == RequestState::Succeeded;
    if succeeded {
        let path = session.download(args.output_dir.clone()).await?;
        info!("Saved processed image to {}", path.display());
        snapshot = session.snapshot();
    } else if let Some(message) = &snapshot.error {
        error!("{}", message);
    } else {
        warn!("Request ended in state {:?}", snapshot.state);
    }

    if args.json {
        println!("{}", snapshot.to_json()?);
    }

    session.shutdown().await?;

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
