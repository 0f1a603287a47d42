use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use crate::api::{Gateway, HttpGateway};
use crate::app::Config;
use crate::auth::{Clock, FileSessionStore, MemorySessionStore, SessionManager, SessionStore, SystemClock};
use crate::follow::RelationshipController;
use crate::profile::ProfileService;
use crate::routing::{FlashSlot, RouteGuard};

/// Global application state
///
/// Holds the single session manager and everything that depends on it.
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Persisted session slots
    pub store: Arc<dyn SessionStore>,
    /// Remote API
    pub gateway: Arc<dyn Gateway>,
    /// The one session of this process
    pub session: Arc<SessionManager>,
    pub profiles: ProfileService,
    pub guard: RouteGuard,
    /// Message for the next login view
    pub flash: FlashSlot,
}

impl AppState {
    /// Build the state from configuration. `ephemeral` keeps the session in
    /// memory only.
    pub fn new(config: Config, ephemeral: bool) -> Result<Self> {
        let store: Arc<dyn SessionStore> = if ephemeral {
            Arc::new(MemorySessionStore::new())
        } else {
            let path = config.session.store_path()?;
            debug!(path = %path.display(), "Opening session store");
            Arc::new(FileSessionStore::open(&path).context("Failed to open session store")?)
        };

        let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(
            &config.api.base_url,
            config.api.timeout(),
            Arc::clone(&store),
        )?);

        Ok(Self::with_parts(config, store, gateway, Arc::new(SystemClock)))
    }

    /// Assemble the state from ready-made parts
    pub fn with_parts(
        config: Config,
        store: Arc<dyn SessionStore>,
        gateway: Arc<dyn Gateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session = Arc::new(SessionManager::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            clock,
            config.session.sweep_interval(),
        ));

        Self {
            profiles: ProfileService::new(Arc::clone(&gateway), Arc::clone(&session)),
            guard: RouteGuard::new(Arc::clone(&session)),
            flash: FlashSlot::new(),
            config,
            store,
            gateway,
            session,
        }
    }

    /// A relationship controller for one profile view
    pub fn relationship(&self) -> RelationshipController {
        RelationshipController::new(Arc::clone(&self.gateway), Arc::clone(&self.session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockGateway;
    use crate::auth::SessionPhase;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_backed_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.session.store_path = Some(temp_dir.path().join("session.json"));

        let state = AppState::new(config, false).unwrap();
        assert_eq!(state.session.bootstrap(), SessionPhase::Anonymous);
        assert!(!state.session.is_token_valid());
    }

    #[tokio::test]
    async fn test_rejects_bad_base_url() {
        let mut config = Config::default();
        config.api.base_url = "not a url".to_string();
        assert!(AppState::new(config, true).is_err());
    }

    #[test]
    fn test_parts_share_one_session() {
        let state = AppState::with_parts(
            Config::default(),
            Arc::new(MemorySessionStore::new()),
            Arc::new(MockGateway::new()),
            Arc::new(SystemClock),
        );
        state.session.bootstrap();
        assert!(!state.relationship().can_follow());
        assert_eq!(state.session.phase(), SessionPhase::Anonymous);
    }
}
