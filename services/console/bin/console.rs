//! Main Entrypoint for the Bedside console
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and the command line.
//! 2. Initializing logging on stderr.
//! 3. Loading the scenario catalog.
//! 4. Wiring the agent client, audio output and terminal into an `App`.
//! 5. Running the session until `/quit` or end of input.

use anyhow::Context;
use bedside_console::{
    app::{App, AppOptions},
    audio_sink::ClipDirectoryPlayer,
    config::{Config, ScenarioLocation},
    terminal::Console,
};
use bedside_core::{
    AudioPlayer, HttpAgentClient, InteractionMode, RecognitionSettings, ScenarioCatalog,
    ScenarioSource, SilentPlayer,
    scenario::{HttpScenarioSource, JsonFileScenarioSource},
};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

/// Practise breaking bad news with a simulated patient.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Scenario file path or http(s) URL (overrides SCENARIOS_PATH / SCENARIOS_URL).
    #[arg(long)]
    scenarios: Option<String>,

    /// Base URL of the agent (overrides AGENT_URL).
    #[arg(long)]
    agent_url: Option<String>,

    /// Initial interaction mode: text or voice (overrides INTERACTION_MODE).
    #[arg(long)]
    mode: Option<InteractionMode>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(scenarios) = self.scenarios {
            config.scenarios =
                if scenarios.starts_with("http://") || scenarios.starts_with("https://") {
                    ScenarioLocation::Url(scenarios)
                } else {
                    ScenarioLocation::Path(scenarios.into())
                };
        }
        if let Some(agent_url) = self.agent_url {
            config.agent_url = agent_url;
        }
        if let Some(mode) = self.mode {
            config.initial_mode = mode;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let args = Args::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    args.apply(&mut config);

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(
        agent_url = %config.agent_url,
        scenarios = ?config.scenarios,
        mode = %config.initial_mode,
        "Configuration loaded"
    );

    // --- 3. Load Scenarios ---
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let source: Box<dyn ScenarioSource> = match &config.scenarios {
        ScenarioLocation::Url(url) => Box::new(HttpScenarioSource::new(http.clone(), url.clone())),
        ScenarioLocation::Path(path) => Box::new(JsonFileScenarioSource::new(path.clone())),
    };
    let catalog = ScenarioCatalog::load(source.as_ref()).await;

    // --- 4. Wire the Application ---
    let agent = Arc::new(HttpAgentClient::with_client(http, &config.agent_url));
    let player: Arc<dyn AudioPlayer> = match &config.audio_output_dir {
        Some(dir) => Arc::new(ClipDirectoryPlayer::new(dir.clone())),
        None => Arc::new(SilentPlayer),
    };
    let options = AppOptions {
        initial_mode: config.initial_mode,
        speech_enabled: config.speech_enabled,
        speech: RecognitionSettings {
            language: config.speech_language.clone(),
            ..RecognitionSettings::default()
        },
    };
    let mut app = App::new(Console::stdout(), catalog, agent, player, options);

    // --- 5. Run ---
    app.greet();
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    app.run(stdin).await.context("Failed to read input")?;

    Ok(())
}
