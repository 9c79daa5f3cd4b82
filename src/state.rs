use crate::{
    assistant::{providers_from_config, AssistantConfig, RecordAnalysisProvider, TextCompletionProvider},
    auth::{AuthService, RefreshTokenRepository},
    conversation::ConversationAdapter,
    db::DbPool,
    directory::{DirectoryService, ProfileRepository},
    store::{LocalObjectStore, MessageStore, ObjectStore, PgMessageStore},
    websocket::PresenceRegistry,
};
use anyhow::Context;
use std::{path::PathBuf, str::FromStr, sync::Arc};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub message_store: Arc<dyn MessageStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub presence: PresenceRegistry,
    pub auth_service: AuthService,
    pub directory_service: DirectoryService,
    pub completion: Arc<dyn TextCompletionProvider>,
    pub analysis: Arc<dyn RecordAnalysisProvider>,
}

impl AppState {
    pub fn new(db: DbPool, config: Arc<Config>) -> Self {
        let profile_repository = ProfileRepository::new(db.clone());
        let refresh_token_repository = RefreshTokenRepository::new(db.clone());
        let presence = PresenceRegistry::new();
        let (completion, analysis) = providers_from_config(&config.assistant);

        Self {
            message_store: Arc::new(PgMessageStore::new(
                db.clone(),
                config.message_channel_capacity.max(1),
            )),
            object_store: Arc::new(LocalObjectStore::new(config.storage_root.clone())),
            auth_service: AuthService::new(
                db.clone(),
                profile_repository.clone(),
                refresh_token_repository,
                config.jwt_secret.clone(),
                config.access_token_minutes,
            ),
            directory_service: DirectoryService::new(profile_repository, presence.clone()),
            presence,
            completion,
            analysis,
            db,
            config,
        }
    }

    /// A fresh adapter for one view of `viewer`'s conversations.
    pub fn conversation(&self, viewer: Uuid) -> ConversationAdapter {
        ConversationAdapter::new(viewer, self.message_store.clone(), self.object_store.clone())
            .with_attachment_limit(self.config.max_attachment_bytes)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub storage_root: PathBuf,
    pub max_attachment_bytes: usize,
    pub message_channel_capacity: usize,
    pub assistant: AssistantConfig,
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{} must be a valid value, got {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            jwt_secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            access_token_minutes: var_or("ACCESS_TOKEN_MINUTES", 15)?,
            storage_root: var_or("STORAGE_ROOT", PathBuf::from("./storage"))?,
            max_attachment_bytes: var_or("MAX_ATTACHMENT_BYTES", 10 * 1024 * 1024)?,
            message_channel_capacity: var_or("MESSAGE_CHANNEL_CAPACITY", 100)?,
            assistant: AssistantConfig {
                openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
                model: var_or("OPENAI_MODEL", "gpt-3.5-turbo".to_string())?,
                base_url: var_or("OPENAI_BASE_URL", "https://api.openai.com/v1".to_string())?,
                mock_delay_ms: var_or("ASSISTANT_MOCK_DELAY_MS", 1000)?,
            },
        })
    }
}
