use std::sync::Arc;

use enquete_domain::ports::activity::ActivityLogger;
use enquete_domain::ports::directory::{AuthAdmin, DirectoryRepository};
use enquete_domain::ports::surveys::{SurveyChangeFeed, SurveyGateway};
use enquete_domain::surveys::SurveyStore;
use enquete_domain::users::UserDirectoryService;
use enquete_infra::activity::{SurrealActivityLogger, TracingActivityLogger};
use enquete_infra::config::AppConfig;
use enquete_infra::db::{self, DbConfig};
use enquete_infra::repositories::{
    InMemoryAuthAdmin, InMemoryDirectoryRepository, InMemorySurveyRepository,
    SurrealAuthAdmin, SurrealDirectoryRepository, SurrealSurveyRepository,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub surveys: Arc<dyn SurveyGateway>,
    pub directory: Arc<dyn DirectoryRepository>,
    pub auth_admin: Arc<dyn AuthAdmin>,
    pub activity: Arc<dyn ActivityLogger>,
    pub store: Arc<SurveyStore>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        if config.data_backend.eq_ignore_ascii_case("surreal") {
            let db = db::connect(&DbConfig::from_app_config(&config)).await?;
            let repo = Arc::new(SurrealSurveyRepository::new(db.clone()));
            let directory = Arc::new(SurrealDirectoryRepository::new(db.clone()));
            let auth_admin = Arc::new(SurrealAuthAdmin::new(db.clone()));
            let activity = Arc::new(SurrealActivityLogger::new(db));
            Self::assemble(config, repo.clone(), repo, directory, auth_admin, activity).await
        } else {
            let directory = Arc::new(InMemoryDirectoryRepository::new());
            let repo = Arc::new(InMemorySurveyRepository::new(directory.clone()));
            let auth_admin = Arc::new(InMemoryAuthAdmin::new());
            let activity = Arc::new(TracingActivityLogger);
            Self::assemble(config, repo.clone(), repo, directory, auth_admin, activity).await
        }
    }

    async fn assemble(
        config: AppConfig,
        surveys: Arc<dyn SurveyGateway>,
        feed: Arc<dyn SurveyChangeFeed>,
        directory: Arc<dyn DirectoryRepository>,
        auth_admin: Arc<dyn AuthAdmin>,
        activity: Arc<dyn ActivityLogger>,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(SurveyStore::new(surveys.clone(), activity.clone()));
        store.clone().watch_changes(feed).await?;
        Ok(Self {
            config,
            surveys,
            directory,
            auth_admin,
            activity,
            store,
        })
    }

    pub fn user_service(&self) -> UserDirectoryService {
        UserDirectoryService::new(
            self.directory.clone(),
            self.auth_admin.clone(),
            self.activity.clone(),
        )
    }
}
