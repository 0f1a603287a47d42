use anyhow::Result;
use colored::Colorize;
use tracing::debug;

use crate::{
    app::{load_config, AppState, Config},
    cli::{handle_command, Cli, Commands},
};

/// Main runtime orchestrator
pub struct Orchestrator {
    cli: Cli,
    state: AppState,
}

impl Orchestrator {
    /// Create a new orchestrator from CLI args
    pub fn new(cli: Cli) -> Result<Self> {
        let mut config = match load_config(cli.config.as_deref()) {
            Ok(cfg) => cfg,
            // An explicitly named file must load
            Err(e) if cli.config.is_some() => return Err(e),
            Err(e) => {
                eprintln!("{} Failed to load config: {}. Using defaults.", "[WARNING]".yellow(), e);
                Config::default()
            }
        };

        if let Some(api_url) = &cli.api_url {
            config.api.base_url = api_url.clone();
        }

        let state = AppState::new(config, cli.ephemeral)?;
        Ok(Self { cli, state })
    }

    /// Run the orchestrator. Returns whether the command succeeded.
    pub async fn run(self) -> Result<bool> {
        // Session state is irrelevant to these
        if matches!(self.cli.command, Commands::Init | Commands::Version) {
            return handle_command(&self.cli.command, &self.state, self.cli.output_format).await;
        }

        let phase = self.state.session.bootstrap();
        debug!(?phase, api = %self.state.config.api.base_url, "Session bootstrapped");

        let result = handle_command(&self.cli.command, &self.state, self.cli.output_format).await;

        // Cleanup
        self.state.session.shutdown();
        result
    }
}
