//! Identity resolution from bearer credentials
//!
//! Signature verification happens upstream; by the time a request reaches
//! the authorizer its token is trusted, and only its claims are read here.

use async_trait::async_trait;
use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use md5::{Digest, Md5};
use serde::Deserialize;

use crate::config::DEFAULT_SERVICE_ACCOUNT_ISSUERS;
use crate::error::{Error, Result};

/// Who a credential belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Subject name used for binding lookups
    pub subject: String,
    /// Email claim
    pub email: String,
    /// Groups claimed by the token (informational; bindings use cached groups)
    pub groups: Vec<String>,
    /// Token issuer
    pub issuer: String,
    /// Whether the token was issued to an in-cluster service account
    pub is_service_account: bool,
}

/// Turns a credential into an [`Identity`]
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve a raw bearer credential
    async fn identify(&self, credential: &str) -> Result<Identity>;
}

/// Reads identity from JWT claims
#[derive(Debug, Clone)]
pub struct ClaimsIdentityResolver {
    service_account_issuers: Vec<String>,
}

impl Default for ClaimsIdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_ACCOUNT_ISSUERS.iter().map(|s| s.to_string()))
    }
}

impl ClaimsIdentityResolver {
    /// Create a resolver treating the given issuers as service accounts
    pub fn new<I, S>(service_account_issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            service_account_issuers: service_account_issuers.into_iter().map(Into::into).collect(),
        }
    }

    fn is_service_account_issuer(&self, issuer: &str) -> bool {
        self.service_account_issuers.iter().any(|i| i == issuer)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Claims {
    iss: String,
    sub: String,
    email: String,
    groups: Vec<String>,
}

#[async_trait]
impl IdentityResolver for ClaimsIdentityResolver {
    async fn identify(&self, credential: &str) -> Result<Identity> {
        let claims = decode_claims(credential)?;
        let is_service_account = self.is_service_account_issuer(&claims.iss);

        let subject = if is_service_account {
            claims.sub
        } else if claims.email.is_empty() {
            return Err(Error::unauthenticated("token has no email claim"));
        } else {
            email_to_subject_name(&claims.email)
        };

        Ok(Identity {
            subject,
            email: claims.email,
            groups: claims.groups,
            issuer: claims.iss,
            is_service_account,
        })
    }
}

fn decode_claims(token: &str) -> Result<Claims> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::unauthenticated("token required"));
    }
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next()) {
        (Some(_), Some(payload)) => payload,
        _ => return Err(Error::unauthenticated("malformed jwt: missing payload")),
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::unauthenticated(format!("malformed jwt payload: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::unauthenticated(format!("malformed jwt claims: {e}")))
}

/// Subject name for an email: lowercase hex MD5, or empty for an empty email
pub fn email_to_subject_name(email: &str) -> String {
    if email.is_empty() {
        return String::new();
    }
    format!("{:x}", Md5::digest(email.as_bytes()))
}

/// Extract the bearer token from an Authorization header
///
/// Accepts `Bearer` and `bearer` schemes.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim();
    let rest = value
        .strip_prefix("Bearer")
        .or_else(|| value.strip_prefix("bearer"))?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim()).filter(|t| !t.is_empty())
}
