use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::repo_types::{FieldValue, Fields, User};

/// Persistence capability consumed by the account lifecycle.
/// Filters are conjunctive equality predicates.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn health_check(&self) -> bool;
    async fn get(&self, filter: &Fields) -> anyhow::Result<Vec<User>>;
    async fn insert(&self, user: &User) -> anyhow::Result<()>;
    async fn update(&self, set: &Fields, filter: &Fields) -> anyhow::Result<()>;
}

const SELECT_USERS: &str = r#"
    SELECT user_id, email, name, company_name, password,
           registered_on, updated_on, active, active_devices
    FROM users"#;

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Text(v) => qb.push_bind(v.clone()),
        FieldValue::Bool(v) => qb.push_bind(*v),
        FieldValue::Int(v) => qb.push_bind(*v),
    };
}

fn push_pairs(qb: &mut QueryBuilder<'_, Postgres>, fields: &Fields, separator: &str) {
    for (i, (field, value)) in fields.iter().enumerate() {
        if i > 0 {
            qb.push(separator);
        }
        qb.push(field.column()).push(" = ");
        push_value(qb, value);
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.db).await.is_ok()
    }

    async fn get(&self, filter: &Fields) -> anyhow::Result<Vec<User>> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_USERS);
        if !filter.is_empty() {
            qb.push(" WHERE ");
            push_pairs(&mut qb, filter, " AND ");
        }
        qb.push(" ORDER BY email");
        let users = qb
            .build_query_as::<User>()
            .fetch_all(&self.db)
            .await
            .context("select users")?;
        Ok(users)
    }

    async fn insert(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, name, company_name, password,
                               registered_on, active, active_devices)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.company)
        .bind(&user.password_hash)
        .bind(user.registered_on)
        .bind(user.active)
        .bind(user.active_devices)
        .execute(&self.db)
        .await
        .context("insert user")?;
        Ok(())
    }

    async fn update(&self, set: &Fields, filter: &Fields) -> anyhow::Result<()> {
        anyhow::ensure!(!set.is_empty(), "update without fields to set");
        anyhow::ensure!(!filter.is_empty(), "update without a filter");

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET ");
        push_pairs(&mut qb, set, ", ");
        qb.push(", updated_on = now() WHERE ");
        push_pairs(&mut qb, filter, " AND ");
        qb.build().execute(&self.db).await.context("update users")?;
        Ok(())
    }
}
