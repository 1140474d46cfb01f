use anyhow::{Context, Result, bail};
use clap::Parser;
use owo_colors::OwoColorize;
use std::io::{IsTerminal, Read};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxtalk::audio::voice::{VoicePool, VoiceSink};
use voxtalk::cli::{Cli, Commands, ConfigAction};
use voxtalk::config::Config;
use voxtalk::output::render_event;
use voxtalk::stream::controller::{SessionController, SessionState};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match &cli.command {
        None => {
            let config = apply_overrides(load_config(&cli)?, &cli);
            let endpoint = resolve_endpoint(&cli, &config)?;
            let body = build_body(&cli)?;
            let code = run_session(config, &endpoint, body, cli.quiet, cli.verbose).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        #[cfg(feature = "cpal-audio")]
        Some(Commands::Devices) => {
            list_output_devices()?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, &cli)?;
        }
    }

    Ok(())
}

/// Route tracing through stderr, filtered by verbosity.
///
/// `RUST_LOG` wins when set; otherwise quiet shows errors only and each `-v`
/// step widens the crate's own filter.
fn init_tracing(quiet: bool, verbose: u8) {
    let default_filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "voxtalk=warn",
            1 => "voxtalk=info",
            2 => "voxtalk=debug",
            _ => "trace",
        }
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/voxtalk/config.toml)
/// 3. Built-in defaults
fn load_config(cli: &Cli) -> Result<Config> {
    if let Some(path) = &cli.config {
        Config::load(path).with_context(|| format!("loading config {}", path.display()))
    } else {
        Ok(Config::load_or_default(&Config::default_path()))
    }
}

/// Fold CLI flags into the loaded configuration.
fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(endpoint) = &cli.endpoint {
        config.stream.endpoint = Some(endpoint.clone());
    }
    if let Some(timeout) = cli.timeout {
        config.stream.request_timeout_secs = timeout.as_secs().max(1);
    }
    if let Some(voices) = cli.voices {
        config.playback.voices = voices.max(1);
    }
    if let Some(capacity) = cli.capacity {
        config.buffer.capacity = capacity.max(1);
    }
    if let Some(device) = &cli.device {
        config.playback.device = Some(device.clone());
    }
    if let Some(dir) = &cli.dump_dir {
        config.playback.dump_dir = Some(dir.clone());
    }
    config
}

fn resolve_endpoint(cli: &Cli, config: &Config) -> Result<String> {
    cli.endpoint
        .clone()
        .or_else(|| config.stream.endpoint.clone())
        .context("no endpoint configured: pass --endpoint or set stream.endpoint in the config")
}

/// Build the JSON request body: an explicit --body file wins, then positional
/// text, then piped stdin.
fn build_body(cli: &Cli) -> Result<String> {
    if let Some(path) = &cli.body {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("reading body file {}", path.display()))?;
        return Ok(body);
    }

    let prompt = if !cli.text.is_empty() {
        cli.text.join(" ")
    } else if !std::io::stdin().is_terminal() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading prompt from stdin")?;
        buf.trim().to_string()
    } else {
        String::new()
    };
    if prompt.is_empty() {
        bail!("no prompt given: pass TEXT, pipe stdin, or use --body");
    }
    Ok(serde_json::json!({ "text": prompt }).to_string())
}

#[cfg(feature = "cpal-audio")]
fn build_pool(config: &Config) -> Result<Arc<VoicePool<voxtalk::audio::playback::CpalVoice>>> {
    let device = config.playback.device.as_deref();
    let voices = (0..config.playback.voices)
        .map(|_| voxtalk::audio::playback::CpalVoice::open(device).map(Arc::new))
        .collect::<voxtalk::Result<Vec<_>>>()?;
    Ok(Arc::new(VoicePool::new(voices)))
}

#[cfg(not(feature = "cpal-audio"))]
fn build_pool(config: &Config) -> Result<Arc<VoicePool<voxtalk::audio::voice::MockVoice>>> {
    tracing::info!("built without audio output, playback is simulated");
    Ok(Arc::new(voxtalk::audio::voice::mock_pool(
        config.playback.voices,
    )))
}

/// Run one streaming session to completion and return the process exit code.
async fn run_session(
    config: Config,
    endpoint: &str,
    body: String,
    quiet: bool,
    verbose: u8,
) -> Result<i32> {
    let pool = build_pool(&config)?;
    run_session_with(config, pool, endpoint, body, quiet, verbose).await
}

async fn run_session_with<V: VoiceSink + 'static>(
    config: Config,
    pool: Arc<VoicePool<V>>,
    endpoint: &str,
    body: String,
    quiet: bool,
    verbose: u8,
) -> Result<i32> {
    let mut controller = SessionController::new(config, pool);
    let (mut events, mut handle) = controller.start(endpoint, body).await?;

    // Ctrl-C cancels the session; teardown finishes before the state flips.
    let interrupt_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt_handle.cancel();
        }
    });

    while let Some(event) = events.recv().await {
        render_event(&event, quiet, verbose);
    }

    match handle.wait_terminal().await {
        SessionState::Failed => Ok(1),
        SessionState::Cancelled => {
            if !quiet {
                eprintln!("{}", "cancelled".yellow());
            }
            Ok(130)
        }
        _ => Ok(0),
    }
}

#[cfg(feature = "cpal-audio")]
fn list_output_devices() -> Result<()> {
    let devices = voxtalk::audio::playback::CpalVoice::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio output devices found");
        std::process::exit(1);
    }

    println!("Available audio output devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

fn handle_config_command(action: &ConfigAction, cli: &Cli) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = apply_overrides(load_config(cli)?, cli);
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
            if !path.exists() {
                eprintln!("{}", "(not created yet, defaults in effect)".dimmed());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The subcommand arm borrows out of `cli.command` and the handler still
    // needs the rest of `cli` for global flags; both must coexist.
    #[test]
    fn test_config_subcommand_leaves_cli_usable() {
        let cli = Cli::parse_from(["voxtalk", "config", "show"]);
        let Some(Commands::Config { action }) = &cli.command else {
            panic!("expected config subcommand");
        };
        handle_config_command(action, &cli).expect("config show");
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_build_body_wraps_positional_text() {
        let cli = Cli::parse_from(["voxtalk", "hello", "there"]);
        let body = build_body(&cli).expect("body");
        assert_eq!(body, r#"{"text":"hello there"}"#);
    }
}
