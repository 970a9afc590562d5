use jsonwebtoken::Algorithm;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{LoginRequest, NewAccount, UserDetails};
use super::repo_types::{Fields, User, UserField};
use crate::auth::password::{hash_password, verify_password};
use crate::error::{msg, AppError, Result};
use crate::state::AppState;

/// Result of a login whose credentials matched.
#[derive(Debug)]
pub enum LoginOutcome {
    LoggedIn { token: String },
    ActivationPending,
}

pub async fn health_check(st: &AppState) -> bool {
    st.store.health_check().await
}

/// Creates a pending account and fires the activation event.
///
/// The email uniqueness check is a plain read before the insert; two racing
/// signups for one address are settled by the store's unique constraint.
#[instrument(skip(st, account), fields(email = %account.email))]
pub async fn signup(st: &AppState, account: NewAccount) -> Result<User> {
    let existing = st
        .store
        .get(&Fields::new().with(UserField::Email, account.email.as_str()))
        .await
        .map_err(AppError::internal(msg::CREATING_ACCOUNT))?;
    if !existing.is_empty() {
        warn!("email already registered");
        return Err(AppError::EmailExists);
    }

    let now = OffsetDateTime::now_utc();
    let mut user = User {
        id: Uuid::new_v4().to_string(),
        email: account.email,
        name: account.name,
        company: String::new(),
        password_hash: String::new(),
        registered_on: account.registered_on,
        updated_on: now,
        active: false,
        active_devices: 0,
    };
    user.password_hash =
        hash_password(&account.password, &user.id).map_err(AppError::internal(msg::HASH_PASSWORD))?;

    st.store
        .insert(&user)
        .await
        .map_err(AppError::internal(msg::CREATING_ACCOUNT))?;

    st.notifier.notify(&user.id);
    info!(user_id = %user.id, "account created, activation pending");
    Ok(user)
}

/// Marks the account active. Unknown or already active ids are not distinguished.
#[instrument(skip(st))]
pub async fn activate(st: &AppState, user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(AppError::BadRequest(msg::VALIDATE));
    }
    st.store
        .update(
            &Fields::new().with(UserField::Active, true),
            &Fields::new().with(UserField::Id, user_id),
        )
        .await
        .map_err(AppError::internal(msg::ACTIVATING))?;
    info!("account activated");
    Ok(())
}

/// Verifies credentials, gates on activation and issues a session token.
///
/// The device counter is written before the token is handed back, so a
/// failed write never leaves the caller holding a session.
#[instrument(skip(st, credentials), fields(email = %credentials.email))]
pub async fn login(st: &AppState, credentials: LoginRequest) -> Result<LoginOutcome> {
    let by_email = Fields::new().with(UserField::Email, credentials.email.as_str());
    let found = st
        .store
        .get(&by_email)
        .await
        .map_err(AppError::internal(msg::FETCHING_USER))?;
    let Some(candidate) = found.first() else {
        warn!("login for unknown email");
        return Err(AppError::Unauthorized(msg::ACCOUNT_NOT_FOUND));
    };

    let hash = hash_password(&credentials.password, &candidate.id)
        .map_err(AppError::internal(msg::HASH_PASSWORD))?;
    let matched = st
        .store
        .get(&by_email.clone().with(UserField::PasswordHash, hash))
        .await
        .map_err(AppError::internal(msg::FETCHING_USER))?;
    let Some(user) = matched.into_iter().next() else {
        warn!(user_id = %candidate.id, "login invalid password");
        return Err(AppError::Unauthorized(msg::INVALID_CREDENTIALS));
    };
    if !verify_password(&credentials.password, &user.id, &user.password_hash)
        .map_err(AppError::internal(msg::FETCHING_USER))?
    {
        return Err(AppError::Unauthorized(msg::INVALID_CREDENTIALS));
    }

    if !user.active {
        info!(user_id = %user.id, "login while activation pending");
        return Ok(LoginOutcome::ActivationPending);
    }

    let token = st
        .tokens
        .generate_token(&user.id, Algorithm::HS256, st.config.jwt.ttl())
        .map_err(|e| AppError::internal(msg::GENERATE_JWT)(anyhow::Error::from(e)))?;

    st.store
        .update(
            &Fields::new().with(UserField::ActiveDevices, user.active_devices + 1),
            &by_email,
        )
        .await
        .map_err(AppError::internal(msg::LOGGING_IN))?;

    info!(user_id = %user.id, "user logged in");
    Ok(LoginOutcome::LoggedIn { token })
}

/// Profile of the authenticated subject with the email masked.
#[instrument(skip(st))]
pub async fn user_details(st: &AppState, user_id: &str) -> Result<UserDetails> {
    let users = st
        .store
        .get(&Fields::new().with(UserField::Id, user_id))
        .await
        .map_err(AppError::internal(msg::FETCHING_USER))?;
    let user = users
        .into_iter()
        .last()
        .ok_or(AppError::Unauthorized(msg::ACCOUNT_NOT_FOUND))?;

    Ok(UserDetails {
        name: user.name,
        email: mask_email(&user.email),
        company: user.company,
        last_login: user.updated_on,
    })
}

/// Replaces characters 3..7 of the local part with `****`.
pub(crate) fn mask_email(email: &str) -> String {
    let (local, domain) = email.split_once('@').unwrap_or((email, ""));
    let chars: Vec<char> = local.chars().collect();
    let start = chars.len().min(3);
    let end = chars.len().min(7);
    let mut masked: String = chars[..start].iter().collect();
    masked.push_str("****");
    masked.extend(&chars[end..]);
    if email.contains('@') {
        masked.push('@');
        masked.push_str(domain);
    }
    masked
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::accounts::memory::testing::FlakyStore;
    use crate::accounts::memory::MemoryUserStore;
    use crate::broker::testing::RecordingPublisher;
    use time::macros::datetime;

    fn account(email: &str) -> NewAccount {
        NewAccount {
            name: "Vatsal".into(),
            email: email.into(),
            password: "Abcde@123".into(),
            registered_on: datetime!(2022-11-15 00:00:00 UTC),
        }
    }

    fn credentials(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    async fn wait_for_publish(publisher: &RecordingPublisher) -> usize {
        for _ in 0..100 {
            let n = publisher.sent.lock().await.len();
            if n > 0 {
                return n;
            }
            tokio::task::yield_now().await;
        }
        0
    }

    #[tokio::test]
    async fn signup_creates_inactive_user_and_publishes() {
        let publisher = Arc::new(RecordingPublisher::default());
        let st = AppState::fake_with(Arc::new(MemoryUserStore::new()), publisher.clone());

        let user = signup(&st, account("vatsal@gmail.com")).await.unwrap();
        assert!(!user.active);
        assert_eq!(user.active_devices, 0);
        assert_ne!(user.password_hash, "Abcde@123");

        let stored = st.store.get(&Fields::new()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].email, "vatsal@gmail.com");
        assert!(!stored[0].active);

        assert_eq!(wait_for_publish(&publisher).await, 1);
        let sent = publisher.sent.lock().await;
        assert!(sent[0].0.contains(&user.id));
        assert_eq!(sent[0].1, "test-pub");
    }

    #[tokio::test]
    async fn signup_succeeds_when_publish_fails() {
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..Default::default()
        });
        let st = AppState::fake_with(Arc::new(MemoryUserStore::new()), publisher.clone());
        assert!(signup(&st, account("vatsal@gmail.com")).await.is_ok());
        assert_eq!(wait_for_publish(&publisher).await, 1);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let st = AppState::fake();
        signup(&st, account("vatsal@gmail.com")).await.unwrap();
        let err = signup(&st, account("vatsal@gmail.com")).await.unwrap_err();
        assert!(matches!(err, AppError::EmailExists));
    }

    #[tokio::test]
    async fn signup_fails_closed_on_store_errors() {
        let store = Arc::new(FlakyStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let st = AppState::fake_with(store.clone(), publisher.clone());

        store.fail_get(true);
        let err = signup(&st, account("a@b.io")).await.unwrap_err();
        assert_eq!(err.to_string(), msg::CREATING_ACCOUNT);

        store.fail_get(false);
        store.fail_insert(true);
        let err = signup(&st, account("a@b.io")).await.unwrap_err();
        assert_eq!(err.to_string(), msg::CREATING_ACCOUNT);

        tokio::task::yield_now().await;
        assert!(publisher.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn login_before_activation_is_pending() {
        let st = AppState::fake();
        signup(&st, account("vatsal@gmail.com")).await.unwrap();
        let outcome = login(&st, credentials("vatsal@gmail.com", "Abcde@123")).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::ActivationPending));
    }

    #[tokio::test]
    async fn login_unknown_email_and_wrong_password() {
        let st = AppState::fake();
        let user = signup(&st, account("vatsal@gmail.com")).await.unwrap();
        activate(&st, &user.id).await.unwrap();

        let err = login(&st, credentials("nobody@gmail.com", "Abcde@123")).await.unwrap_err();
        assert_eq!(err.to_string(), msg::ACCOUNT_NOT_FOUND);

        let err = login(&st, credentials("vatsal@gmail.com", "Wrong@123")).await.unwrap_err();
        assert_eq!(err.to_string(), msg::INVALID_CREDENTIALS);

        let stored = st.store.get(&Fields::new()).await.unwrap();
        assert_eq!(stored[0].active_devices, 0);
    }

    #[tokio::test]
    async fn activated_login_issues_token_and_counts_device() {
        let st = AppState::fake();
        let user = signup(&st, account("vatsal@gmail.com")).await.unwrap();
        activate(&st, &user.id).await.unwrap();

        let LoginOutcome::LoggedIn { token } =
            login(&st, credentials("vatsal@gmail.com", "Abcde@123")).await.unwrap()
        else {
            panic!("expected a session token");
        };
        let claims = st.tokens.validate_token(&token).unwrap();
        assert_eq!(claims.user_id.as_deref(), Some(user.id.as_str()));

        login(&st, credentials("vatsal@gmail.com", "Abcde@123")).await.unwrap();
        let stored = st.store.get(&Fields::new()).await.unwrap();
        assert_eq!(stored[0].active_devices, 2);
    }

    #[tokio::test]
    async fn login_fails_when_device_count_is_not_persisted() {
        let store = Arc::new(FlakyStore::default());
        let st = AppState::fake_with(store.clone(), Arc::new(RecordingPublisher::default()));
        let user = signup(&st, account("vatsal@gmail.com")).await.unwrap();
        activate(&st, &user.id).await.unwrap();

        store.fail_update(true);
        let err = login(&st, credentials("vatsal@gmail.com", "Abcde@123")).await.unwrap_err();
        assert_eq!(err.to_string(), msg::LOGGING_IN);
    }

    #[tokio::test]
    async fn activate_is_idempotent_and_reports_store_failure() {
        let store = Arc::new(FlakyStore::default());
        let st = AppState::fake_with(store.clone(), Arc::new(RecordingPublisher::default()));
        let user = signup(&st, account("vatsal@gmail.com")).await.unwrap();

        activate(&st, &user.id).await.unwrap();
        activate(&st, &user.id).await.unwrap();
        activate(&st, "no-such-id").await.unwrap();

        store.fail_update(true);
        let err = activate(&st, &user.id).await.unwrap_err();
        assert_eq!(err.to_string(), msg::ACTIVATING);
    }

    #[tokio::test]
    async fn user_details_masks_email() {
        let st = AppState::fake();
        let user = signup(&st, account("vatsal@gmail.com")).await.unwrap();
        let details = user_details(&st, &user.id).await.unwrap();
        assert_eq!(details.name, "Vatsal");
        assert_eq!(details.email, "vat****@gmail.com");

        let err = user_details(&st, "missing").await.unwrap_err();
        assert_eq!(err.to_string(), msg::ACCOUNT_NOT_FOUND);
    }

    #[test]
    fn mask_email_overlays_local_part() {
        assert_eq!(mask_email("ggw.chang@gmail.com"), "ggw****ng@gmail.com");
        assert_eq!(mask_email("vatsal@gmail.com"), "vat****@gmail.com");
        assert_eq!(mask_email("ab@x.io"), "ab****@x.io");
        assert_eq!(mask_email("noatsign"), "noa****n");
    }
}
