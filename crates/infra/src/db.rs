use anyhow::{Context, Result};
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.surreal_endpoint.clone(),
            namespace: config.surreal_ns.clone(),
            database: config.surreal_db.clone(),
            username: config.surreal_user.clone(),
            password: config.surreal_pass.clone(),
        }
    }
}

pub async fn connect(config: &DbConfig) -> Result<Surreal<Client>> {
    let endpoint = config
        .endpoint
        .trim_start_matches("ws://")
        .trim_start_matches("wss://")
        .to_string();

    let db = Surreal::<Client>::init();
    db.connect::<Ws>(endpoint)
        .await
        .context("surreal connect failed")?;
    db.signin(Root {
        username: &config.username,
        password: &config.password,
    })
    .await
    .context("surreal signin failed")?;
    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .context("surreal use_ns/use_db failed")?;

    tracing::debug!(
        namespace = config.namespace,
        database = config.database,
        "surreal connection ready"
    );
    Ok(db)
}
