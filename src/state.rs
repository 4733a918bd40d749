use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::config::{AppPaths, ConfigService};
use crate::embedding::HttpEmbedder;
use crate::index::IndexService;
use crate::llm::ProviderCache;
use crate::session::SessionController;

#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub index: Arc<IndexService>,
    pub session: Arc<SessionController>,
    pub providers: Arc<ProviderCache>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire up services and build the vector index. A missing corpus or
    /// an unreachable embedding backend fails here, before any query is
    /// accepted.
    pub async fn initialize(paths: Arc<AppPaths>) -> anyhow::Result<Arc<Self>> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .settings()
            .context("Failed to load configuration")?;

        let index = Arc::new(IndexService::new());
        let embedder = Arc::new(HttpEmbedder::from_settings(&settings.embedding));
        let documents_dir = settings.rag.resolve_documents_dir(&paths);
        index
            .get_or_build(
                embedder,
                &documents_dir,
                settings.rag.chunk_size,
                settings.rag.chunk_overlap,
            )
            .await
            .with_context(|| {
                format!(
                    "Failed to build the document index from {}",
                    documents_dir.display()
                )
            })?;

        let session = Arc::new(SessionController::new(index.clone()));
        let providers = Arc::new(ProviderCache::new());

        Ok(Arc::new(AppState {
            paths,
            config,
            index,
            session,
            providers,
            started_at: Utc::now(),
        }))
    }
}
