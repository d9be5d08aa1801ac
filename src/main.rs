use blurmark::bot::{self, BotState, Event};
use blurmark::config::{self, BotConfig};
use blurmark::imaging::{LabelRenderer, RustEngine, TransformEngine};
use blurmark::platform::LocalPlatform;
use blurmark::pool::WorkerPool;
use blurmark::{liveness, output};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "blurmark")]
#[command(about = "Blurred public previews, watermarked private reveals")]
#[command(long_about = "\
Blurred public previews, watermarked private reveals

Images posted to a channel are re-posted blurred, with a button. Whoever
presses the button privately receives the originals with their ID stamped
into the bottom-right corner.

`serve` reads platform events as JSON lines on stdin and writes deliveries
under --root:

  {\"type\":\"submission\",\"id\":\"m1\",\"channel\":\"general\",\"author\":\"u1\",\"attachments\":[\"cat.png\"]}
  {\"type\":\"activation\",\"id\":\"a1\",\"channel\":\"general\",\"custom_id\":\"reveal:...\",\"requester\":\"u2\"}

Run 'blurmark gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Configuration file (stock defaults when absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot: liveness endpoint plus the event loop over stdin
    Serve {
        /// Directory for stored originals and delivered messages
        #[arg(long, default_value = "blurmark-data")]
        root: PathBuf,
    },
    /// Write the blurred preview of one image
    Blur { input: PathBuf, output: PathBuf },
    /// Write one image stamped with an identity
    Stamp {
        input: PathBuf,
        output: PathBuf,
        /// Text placed after the label prefix
        #[arg(long)]
        identity: String,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
    /// Load and validate the configuration without starting
    CheckConfig,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Serve { root } => {
            let config = config::load_config(cli.config.as_deref())?;
            serve(config, root).await?;
            // A pending blocking stdin read would otherwise hold runtime shutdown.
            std::process::exit(0);
        }
        Command::Blur { input, output } => {
            let config = config::load_config(cli.config.as_deref())?;
            let engine = engine_for(&config);
            transform_file("blur", &input, &output, move |bytes| engine.blur(&bytes)).await?;
        }
        Command::Stamp {
            input,
            output,
            identity,
        } => {
            let config = config::load_config(cli.config.as_deref())?;
            let engine = engine_for(&config);
            transform_file("stamp", &input, &output, move |bytes| {
                engine.stamp(&bytes, &identity)
            })
            .await?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::CheckConfig => {
            let config = config::load_config(cli.config.as_deref())?;
            let labels = LabelRenderer::load(&config.watermark.font_paths);
            output::print_config_check(&config, font_name(&labels).as_deref());
        }
    }

    Ok(())
}

/// Structured logging to stderr. `RUST_LOG` overrides the default `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn engine_for(config: &BotConfig) -> Arc<RustEngine> {
    Arc::new(RustEngine::new(
        config.blur_params(),
        config.watermark_params(),
        config.whitelist(),
        LabelRenderer::load(&config.watermark.font_paths),
    ))
}

fn font_name(labels: &LabelRenderer) -> Option<String> {
    labels
        .source()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
}

/// Run one transform off the main thread and write the result.
async fn transform_file<F>(
    op: &str,
    input: &Path,
    output: &Path,
    transform: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(Vec<u8>) -> Result<Vec<u8>, blurmark::imaging::TransformError> + Send + 'static,
{
    let bytes = tokio::fs::read(input).await?;
    let pool = WorkerPool::new(1)?;
    let result = pool.submit(move || transform(bytes)).await??;
    tokio::fs::write(output, &result).await?;
    output::print_transform_result(
        op,
        &input.display().to_string(),
        &output.display().to_string(),
        result.len(),
    );
    Ok(())
}

async fn serve(config: BotConfig, root: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    // Missing credentials stop the process before anything is bound.
    let credential = config.credential()?;

    let engine = engine_for(&config);
    let font = font_name(engine.labels());
    let platform = Arc::new(LocalPlatform::new(
        root,
        &credential,
        config.deadlines.acknowledge(),
    ));

    let port = if config.liveness.enabled {
        let port = config
            .liveness
            .effective_port(std::env::var("PORT").ok().as_deref());
        let listener = liveness::bind(port).await?;
        tokio::spawn(async move {
            if let Err(e) = liveness::serve(listener).await {
                tracing::error!(error = %e, "liveness endpoint stopped");
            }
        });
        Some(port)
    } else {
        None
    };

    let state = Arc::new(BotState::new(
        config,
        engine,
        platform.clone(),
        platform.clone(),
    )?);
    output::print_startup(state.pool.size(), font.as_deref(), port);

    let (tx, rx) = mpsc::channel(64);
    let reader = tokio::spawn(read_events(platform, tx));
    let handled = bot::run(state, rx).await;
    reader.await?;
    tracing::info!(events = handled, "event loop finished");
    Ok(())
}

/// Feed stdin lines into the event channel until EOF or Ctrl-C.
async fn read_events(platform: Arc<LocalPlatform>, events: mpsc::Sender<Event>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = &mut shutdown => {
                tracing::info!("interrupted, finishing in-flight events");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "reading events failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match platform.parse_event(&line).await {
            Ok(event) => {
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable event"),
        }
    }
}
