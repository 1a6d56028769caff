use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::OAuthSettings;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthIdentity {
    pub email: String,
    pub login: Option<String>,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn authorize_url(&self, state: &str) -> String;
    async fn exchange(&self, code: &str) -> anyhow::Result<OAuthIdentity>;
}

/// Authorization-code flow against a provider's token and userinfo endpoints.
pub struct HttpOAuthProvider {
    client: reqwest::Client,
    settings: OAuthSettings,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl HttpOAuthProvider {
    pub fn new(client: reqwest::Client, settings: OAuthSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl OAuthProvider for HttpOAuthProvider {
    fn authorize_url(&self, state: &str) -> String {
        let s = &self.settings;
        let sep = if s.auth_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{sep}response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            s.auth_url,
            urlencoding::encode(&s.client_id),
            urlencoding::encode(&s.redirect_url),
            urlencoding::encode(&s.scope),
            urlencoding::encode(state),
        )
    }

    async fn exchange(&self, code: &str) -> anyhow::Result<OAuthIdentity> {
        let s = &self.settings;

        let token: TokenResponse = self
            .client
            .post(&s.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", s.redirect_url.as_str()),
                ("client_id", s.client_id.as_str()),
                ("client_secret", s.client_secret.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let info: Value = self
            .client
            .get(&s.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        identity_from_userinfo(&info)
            .ok_or_else(|| anyhow::anyhow!("{} userinfo carries no email", s.name))
    }
}

/// Providers disagree on field names; take the first one present.
fn identity_from_userinfo(info: &Value) -> Option<OAuthIdentity> {
    let pick = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| info.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Some(OAuthIdentity {
        email: pick(&["email", "default_email"])?.to_lowercase(),
        login: pick(&["login", "given_name", "first_name", "name"]),
        avatar_url: pick(&["picture", "avatar_url"]),
    })
}
