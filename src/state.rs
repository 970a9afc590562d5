use std::sync::Arc;

use anyhow::Context;

use crate::accounts::{memory::MemoryUserStore, repo::PgUserStore, repo::UserStore};
use crate::auth::jwt::TokenService;
use crate::broker::{
    ActivationNotifier, BrokerPublisher, MessageDecryptor, NotificationPublisher, Passthrough,
};
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn UserStore>,
    pub tokens: TokenService,
    pub notifier: ActivationNotifier,
    pub decryptor: Arc<dyn MessageDecryptor>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                // Run migrations if present
                if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
                    tracing::warn!(error = %e, "migration failed; continuing");
                }
                Arc::new(PgUserStore::new(db))
            }
            None => {
                tracing::warn!("DATABASE_URL is not set; using the in-memory user store");
                Arc::new(MemoryUserStore::new())
            }
        };

        let publisher = Arc::new(BrokerPublisher::new(&config.msg_queue.svc_url));
        Ok(Self::from_parts(config, store, publisher, Arc::new(Passthrough)))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn UserStore>,
        publisher: Arc<dyn NotificationPublisher>,
        decryptor: Arc<dyn MessageDecryptor>,
    ) -> Self {
        let tokens = TokenService::new(&config.jwt.secret);
        let notifier = ActivationNotifier::new(
            publisher,
            &config.msg_queue.pub_id,
            &config.msg_queue.channel,
        );
        Self {
            config,
            store,
            tokens,
            notifier,
            decryptor,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with(
            Arc::new(MemoryUserStore::new()),
            Arc::new(crate::broker::testing::RecordingPublisher::default()),
        )
    }

    #[cfg(test)]
    pub fn fake_with(store: Arc<dyn UserStore>, publisher: Arc<dyn NotificationPublisher>) -> Self {
        use crate::config::{CookieConfig, JwtConfig, MsgQueueConfig};

        let config = Arc::new(AppConfig {
            database_url: None,
            route_version: None,
            jwt: JwtConfig {
                secret: "test".into(),
                ttl_minutes: 5,
            },
            cookie: CookieConfig { path: "/".into() },
            msg_queue: MsgQueueConfig {
                user_agent: "msgbroker".into(),
                allowed_urls: vec!["10.0.0.7:4000".into()],
                url_check: false,
                svc_url: "http://fake.local".into(),
                pub_id: "test-pub".into(),
                channel: "new-user".into(),
            },
        });
        Self::from_parts(config, store, publisher, Arc::new(Passthrough))
    }
}
