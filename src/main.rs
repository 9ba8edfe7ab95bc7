use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use voxpipe::cli::Cli;
use voxpipe::config::Config;
use voxpipe::emit::OutputEvent;
use voxpipe::engine::{NullRecognizer, Recognizer, WhisperConfig, WhisperRecognizer};
use voxpipe::error::VoxpipeError;
use voxpipe::pipeline::PipelineController;
use voxpipe::stats::StatsSnapshot;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let quiet = cli.quiet;

    match run(cli).await {
        Ok(snapshot) => {
            if !quiet {
                eprintln!("voxpipe: {snapshot}");
            }
        }
        Err(e) => {
            // Startup failures are reported on both channels: a JSON error
            // event for the machine consumer, a readable line for humans.
            let event = OutputEvent::Error {
                error: e.to_string(),
            };
            if let Ok(json) = serde_json::to_string(&event) {
                println!("{json}");
            }
            eprintln!("voxpipe: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<StatsSnapshot> {
    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load_or_default().context("failed to load config")?,
    };
    let config = cli.apply_to(config.with_env_overrides());
    config.validate()?;

    let recognizer = build_recognizer(&config)?;
    if cli.verbose {
        eprintln!(
            "voxpipe: engine {} ({})",
            recognizer.engine_name(),
            config.engine.backend
        );
    }

    let controller = PipelineController::new(config.pipeline_settings(), recognizer);
    let handle = controller
        .start(std::io::stdin(), std::io::stdout())
        .context("pipeline startup failed")?;

    let trigger = handle.shutdown_trigger();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("voxpipe: interrupt received, draining");
            trigger.shutdown();
        }
    });

    let snapshot = tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("pipeline thread panicked")?;
    Ok(snapshot)
}

fn build_recognizer(config: &Config) -> anyhow::Result<Arc<dyn Recognizer>> {
    match config.engine.backend.as_str() {
        "null" => Ok(Arc::new(NullRecognizer)),
        "whisper" => {
            let model_path = config.engine.model.clone().ok_or_else(|| {
                VoxpipeError::Startup {
                    message: "the whisper engine needs a model path (positional argument \
                              MODEL or VOXPIPE_MODEL)"
                        .to_string(),
                }
            })?;
            let engine = WhisperRecognizer::new(WhisperConfig {
                model_path,
                language: config.engine.language.clone(),
                threads: config.engine.threads,
            })?;
            Ok(Arc::new(engine))
        }
        other => Err(VoxpipeError::Startup {
            message: format!("unknown engine backend '{other}' (expected whisper or null)"),
        }
        .into()),
    }
}
