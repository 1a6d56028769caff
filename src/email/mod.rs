pub mod routes;

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    cache::{Cache, keys},
    error::{AppError, AppResult},
    mailer::Mailer,
    users::UserRepo,
    validation::Validator,
};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SendCode {
    #[serde(default)]
    pub email: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Confirm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub code: String,
}

/// Email ownership proof through short-lived six-digit codes.
pub struct EmailUsecase {
    users: UserRepo,
    cache: Cache,
    mailer: Arc<dyn Mailer>,
    code_ttl: Duration,
    limiter: DefaultKeyedRateLimiter<String>,
}

impl EmailUsecase {
    pub fn new(
        users: UserRepo,
        cache: Cache,
        mailer: Arc<dyn Mailer>,
        code_ttl: Duration,
        sends_per_minute: u32,
    ) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(sends_per_minute).unwrap_or(NonZeroU32::MIN));
        Self { users, cache, mailer, code_ttl, limiter: RateLimiter::keyed(quota) }
    }

    /// Issues a new code for an unconfirmed account, replacing any earlier one.
    pub async fn send_code(&self, req: SendCode) -> AppResult<()> {
        let email = normalize(&req.email)?;

        let user = self.users.by_email(&email).await?.ok_or(AppError::NotFound("user"))?;
        if user.verified_email {
            return Err(AppError::invalid("email", "is already confirmed"));
        }
        if self.limiter.check_key(&email).is_err() {
            return Err(AppError::RateLimited);
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.cache.put_token(&keys::email_code(&email), &code, self.code_ttl).await?;

        if let Err(err) = self.mailer.send_confirmation(&email, &code).await {
            warn!(user_id = user.id, error = %err, "confirmation mail failed");
        }
        Ok(())
    }

    /// Checks the code and marks the account confirmed. A code is consumed by the first
    /// attempt, right or wrong.
    pub async fn confirm(&self, req: Confirm) -> AppResult<()> {
        let email = normalize(&req.email)?;
        let code = req.code.trim();
        if code.is_empty() {
            return Err(AppError::invalid("code", "is a required field"));
        }

        let issued = self.cache.take_token(&keys::email_code(&email)).await?;
        if issued.as_deref() != Some(code) {
            return Err(AppError::Unauthorized("invalid confirmation code"));
        }

        let user = self.users.by_email(&email).await?.ok_or(AppError::NotFound("user"))?;
        self.users.mark_verified(user.id).await?;
        info!(user_id = user.id, "email confirmed");
        Ok(())
    }

    /// Drops limiter state for addresses whose quota has fully refilled.
    pub fn forget_idle_senders(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    #[cfg(test)]
    fn tracked_senders(&self) -> usize {
        self.limiter.len()
    }
}

fn normalize(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    let mut v = Validator::new();
    v.required("email", &email).email("email", &email);
    v.finish()?;
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestApp;

    async fn unconfirmed(app: &TestApp, email: &str) -> i32 {
        let signup = crate::auth::usecase::SignUp {
            email: email.to_string(),
            password: "password1".into(),
            login: None,
        };
        app.state.auth.sign_up(signup).await.unwrap().id
    }

    fn send(email: &str) -> SendCode {
        SendCode { email: email.to_string() }
    }

    #[tokio::test]
    async fn code_confirms_the_account_once() {
        let app = TestApp::new().await;
        let id = unconfirmed(&app, "ann@x.io").await;

        app.state.email.send_code(send("Ann@X.io")).await.unwrap();
        let code = app.mailer.last_code("ann@x.io").unwrap();
        assert_eq!(code.len(), 6);

        let confirm = Confirm { email: "ann@x.io".into(), code: code.clone() };
        app.state.email.confirm(confirm.clone()).await.unwrap();
        assert!(app.users().by_id(id).await.unwrap().unwrap().verified_email);

        let err = app.state.email.confirm(confirm).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn wrong_code_burns_the_code() {
        let app = TestApp::new().await;
        unconfirmed(&app, "ann@x.io").await;
        app.state.email.send_code(send("ann@x.io")).await.unwrap();
        let code = app.mailer.last_code("ann@x.io").unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        let err = app
            .state
            .email
            .confirm(Confirm { email: "ann@x.io".into(), code: wrong.into() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = app.state.email.confirm(Confirm { email: "ann@x.io".into(), code }).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn sends_are_rate_limited_per_address() {
        let app = TestApp::new().await;
        unconfirmed(&app, "ann@x.io").await;
        unconfirmed(&app, "bob@x.io").await;

        app.state.email.send_code(send("ann@x.io")).await.unwrap();
        assert!(matches!(app.state.email.send_code(send("ann@x.io")).await, Err(AppError::RateLimited)));
        app.state.email.send_code(send("bob@x.io")).await.unwrap();
        assert_eq!(app.mailer.count(), 2);
    }

    #[tokio::test]
    async fn idle_senders_are_forgotten() {
        let app = TestApp::new().await;
        unconfirmed(&app, "ann@x.io").await;
        unconfirmed(&app, "bob@x.io").await;
        let cache = crate::cache::memory::cache(app.cache.clone());
        let email =
            EmailUsecase::new(app.users(), cache, app.mailer.clone(), Duration::from_secs(60), u32::MAX);

        email.send_code(send("ann@x.io")).await.unwrap();
        email.send_code(send("bob@x.io")).await.unwrap();
        assert_eq!(email.tracked_senders(), 2);

        tokio::time::sleep(Duration::from_millis(10)).await;
        email.forget_idle_senders();
        assert_eq!(email.tracked_senders(), 0);
    }

    #[tokio::test]
    async fn rejects_unknown_and_confirmed_accounts() {
        let app = TestApp::new().await;
        let err = app.state.email.send_code(send("ghost@x.io")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("user")));

        app.user("ann@x.io").await;
        let err = app.state.email.send_code(send("ann@x.io")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = app.state.email.send_code(send("not-an-email")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn cache_outage_fails_the_send() {
        let app = TestApp::new().await;
        unconfirmed(&app, "ann@x.io").await;
        app.cache.set_down(true);
        let err = app.state.email.send_code(send("ann@x.io")).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable("cache")));
        assert_eq!(app.mailer.count(), 0);
    }
}
