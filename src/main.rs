use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use omni_serve::config::{Cli, Command, Config, ServerConfig};
use omni_serve::patcher::{patch_config, PatchOutcome};
use omni_serve::server::{openai_api, tts_api};
use omni_serve::smoke::run_smoke_test;

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        "omni_serve=debug,tower_http=debug"
    } else {
        "omni_serve=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(server: &ServerConfig, app: axum::Router) -> anyhow::Result<()> {
    let listen_addr = server.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    info!("omni-serve v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Text(args) => {
            config.text.apply(&args);
            info!(
                model = %config.text.model_path.display(),
                device = config.text.device,
                max_model_len = config.text.max_model_len,
                "Starting chat service"
            );

            let state = Arc::new(openai_api::AppState::new(config.text.clone()));
            state.start_default_loader();
            serve(&config.text.server, openai_api::build_router(state)).await?;
        }
        Command::Tts(args) => {
            config.tts.apply(&args);
            info!(
                model = %config.tts.model_path.display(),
                device = config.tts.device,
                reference = %config.tts.reference_audio.display(),
                "Starting speech service"
            );

            let state = Arc::new(tts_api::AppState::new(config.tts.clone()));
            state.start_default_loader();
            serve(&config.tts.server, tts_api::build_router(state)).await?;
        }
        Command::PatchConfig(args) => match patch_config(&args.path)? {
            PatchOutcome::NotApplicable => info!("Nothing to patch"),
            PatchOutcome::AlreadyPatched => info!("Already patched"),
            PatchOutcome::Patched {
                added,
                backup_created,
            } => info!(?added, backup_created, "Patched"),
        },
        Command::Smoke(args) => {
            config.text.apply(&args.model);
            let text = config.text.clone();
            let prompt = args.prompt.clone();
            let max_tokens = args.max_tokens;
            let report =
                tokio::task::spawn_blocking(move || run_smoke_test(&text, &prompt, max_tokens))
                    .await?;

            match report {
                Ok(report) => {
                    println!("Model:      {} on {}", report.model, report.device);
                    println!("Prompt:     {}", args.prompt);
                    println!("Response:   {}", report.completion.text);
                    println!(
                        "Tokens:     {} prompt, {} completion, {} total",
                        report.completion.prompt_tokens,
                        report.completion.completion_tokens,
                        report.completion.total_tokens
                    );
                    println!(
                        "Time:       load {:.2}s, generate {:.2}s",
                        report.load_time.as_secs_f64(),
                        report.generation_time.as_secs_f64()
                    );
                }
                Err(e) => {
                    error!(error = ?e, "Smoke test failed");
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
