use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::config::{AppPaths, ConfigService, GuideSettings};
use crate::guide::Guide;

pub mod error;

use error::InitializationError;

/// Application state shared across all routes and chat connections.
///
/// Sessions are not stored here; each WebSocket connection owns its own.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: GuideSettings,
    pub guide: Arc<Guide>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Loads configuration, then brings up the guide.
    ///
    /// A missing or malformed corpus does not fail this call; the guide
    /// reports itself unavailable instead.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(InitializationError::Config)?;
        tracing::info!("Loaded configuration from {}", config.config_path().display());

        let guide = Guide::initialize(&settings, &paths)
            .await
            .map_err(InitializationError::Guide)?;

        Ok(Arc::new(Self::from_parts(paths, config, settings, Arc::new(guide))))
    }

    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: GuideSettings,
        guide: Arc<Guide>,
    ) -> Self {
        Self {
            paths,
            config,
            settings,
            guide,
            started_at: Utc::now(),
        }
    }
}
