use axum::extract::FromRef;

use crate::{
    config::Config,
    db::{DBService, PoolConfig},
    error::Result,
    password::PasswordHasher,
    storage::{LocalStorage, UploadPolicy},
    token::TokenManager,
};

/// Process-scoped resources, built once at startup and handed to every
/// handler through axum's state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: DBService,
    pub storage: LocalStorage,
    pub tokens: TokenManager,
    pub hasher: PasswordHasher,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Self> {
        let hasher = PasswordHasher::new(config.scrypt_log_n)?;

        tracing::info!("Local fs for storage at {:?}", config.storage_path);
        let storage = LocalStorage::init(
            &config.storage_path,
            UploadPolicy {
                sanitize_filenames: config.sanitize_filenames,
                overwrite: config.overwrite_uploads,
                max_upload_bytes: config.max_upload_bytes,
            },
        )
        .await?;

        let db = DBService::new(
            &config.database_url,
            PoolConfig {
                max_connections: config.db_max_connections,
                acquire_timeout: config.db_acquire_timeout(),
            },
        )
        .await?;
        db.migrate().await?;

        if config.uses_default_secret() {
            tracing::warn!("JWT_SECRET is not set, tokens are signed with the default key");
        }
        let tokens = TokenManager::new(&config.jwt_secret, config.token_ttl());

        Ok(Self {
            db,
            storage,
            tokens,
            hasher,
        })
    }
}

impl FromRef<AppState> for DBService {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for LocalStorage {
    fn from_ref(state: &AppState) -> Self {
        state.storage.clone()
    }
}

impl FromRef<AppState> for TokenManager {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}
