use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::repo::UserStore;
use super::repo_types::{Fields, User};

/// In-process store for local runs without Postgres and for tests.
/// Enforces the same unique email constraint as the `users` table.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn health_check(&self) -> bool {
        true
    }

    async fn get(&self, filter: &Fields) -> anyhow::Result<Vec<User>> {
        let users = self.users.read().await;
        let mut found: Vec<User> = users.iter().filter(|u| u.matches(filter)).cloned().collect();
        found.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(found)
    }

    async fn insert(&self, user: &User) -> anyhow::Result<()> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == user.email || u.id == user.id) {
            anyhow::bail!("duplicate key for {}", user.email);
        }
        users.push(user.clone());
        Ok(())
    }

    async fn update(&self, set: &Fields, filter: &Fields) -> anyhow::Result<()> {
        anyhow::ensure!(!set.is_empty(), "update without fields to set");
        anyhow::ensure!(!filter.is_empty(), "update without a filter");

        let mut users = self.users.write().await;
        let now = OffsetDateTime::now_utc();
        // Stage every change first so a rejected SET leaves no row touched.
        let mut staged = Vec::new();
        for (i, user) in users.iter().enumerate().filter(|(_, u)| u.matches(filter)) {
            let mut next = user.clone();
            next.apply(set)?;
            next.updated_on = now;
            staged.push((i, next));
        }
        for (i, next) in staged {
            users[i] = next;
        }
        Ok(())
    }
}
