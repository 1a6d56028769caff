use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{
    cache::now_sec,
    error::{AppError, AppResult},
};

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,
    pub adm: bool,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// HS256 signing material and token lifetimes.
#[derive(Clone)]
pub struct JwtKeys {
    secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self { secret: secret.as_bytes().to_vec(), access_ttl, refresh_ttl }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue(&self, user_id: i32, is_admin: bool, kind: TokenKind) -> AppResult<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let iat = now_sec();
        let claims =
            Claims { sub: user_id, adm: is_admin, typ: kind, iat, exp: iat + ttl.as_secs() as i64 };
        self.encode(&claims)
    }

    fn encode(&self, claims: &Claims) -> AppResult<String> {
        let payload = serde_json::to_vec(claims)?;
        let signing_input =
            format!("{}.{}", URL_SAFE_NO_PAD.encode(HEADER), URL_SAFE_NO_PAD.encode(payload));
        let signature = URL_SAFE_NO_PAD.encode(self.mac(signing_input.as_bytes())?.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }

    /// Checks signature, expiry and that the token is of the expected kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> AppResult<Claims> {
        const INVALID: AppError = AppError::Unauthorized("invalid token");

        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(INVALID);
        };

        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| INVALID)?;
        let signing_input = &token[..header.len() + 1 + payload.len()];
        self.mac(signing_input.as_bytes())?.verify_slice(&signature).map_err(|_| INVALID)?;

        let header: Header = URL_SAFE_NO_PAD
            .decode(header)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or(INVALID)?;
        if header.alg != "HS256" {
            return Err(INVALID);
        }

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or(INVALID)?;

        if claims.typ != kind {
            return Err(INVALID);
        }
        if claims.exp <= now_sec() {
            return Err(AppError::Unauthorized("token expired"));
        }
        Ok(claims)
    }

    fn mac(&self, input: &[u8]) -> AppResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| anyhow::anyhow!("hmac key rejected: {err}"))?;
        mac.update(input);
        Ok(mac)
    }
}
