use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{
    decode, decode_header,
    jwk::{Jwk, JwkSet},
    DecodingKey, Validation,
};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Cached key sets older than this are refetched before use.
const JWKS_MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// Minimum time between refetches triggered by an unknown key id.
const JWKS_COOLDOWN: Duration = Duration::from_secs(30);

/// What a verified access token says about its bearer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub token: String,
    /// Authorized party (`azp`), empty when the token carries none
    pub client_id: String,
    pub scopes: Vec<String>,
    /// Expiry (`exp`) in seconds since epoch, as asserted by the issuer
    pub expires_at: Option<u64>,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token`, failing with [`Error::Authentication`] when it is not
    /// acceptable. Other errors mean the verifier itself could not run.
    async fn verify_access_token(&self, token: &str) -> Result<AuthInfo>;
}

#[derive(Debug, Deserialize)]
struct AccessTokenClaims {
    #[serde(default)]
    azp: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    exp: Option<u64>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifies JWT access tokens issued by a Keycloak realm against the
/// realm's published JWKS.
pub struct JwksVerifier {
    http: reqwest::Client,
    issuer: String,
    certs_url: String,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksVerifier {
    /// Verifier for tokens whose `iss` is `realm_url`.
    pub fn new(realm_url: impl Into<String>) -> Self {
        let issuer = realm_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            certs_url: format!("{issuer}/protocol/openid-connect/certs"),
            issuer,
            cache: RwLock::new(None),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn certs_url(&self) -> &str {
        &self.certs_url
    }

    async fn fetch_keys(&self) -> Result<JwkSet> {
        debug!(url = %self.certs_url, "Fetching JWKS");
        let keys = self
            .http
            .get(&self.certs_url)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;
        info!(count = keys.keys.len(), "Loaded signing keys");
        Ok(keys)
    }

    /// The decoding key for `kid`, refetching the key set when the cache is
    /// stale or does not know the key.
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                let age = cached.fetched_at.elapsed();
                if age < JWKS_MAX_AGE {
                    if let Some(jwk) = select_key(&cached.keys, kid) {
                        return key_from_jwk(jwk);
                    }
                    if age < JWKS_COOLDOWN {
                        return Err(no_matching_key(kid));
                    }
                }
            }
        }

        let keys = self.fetch_keys().await?;
        let key = select_key(&keys, kid).map(key_from_jwk);
        *self.cache.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });
        key.unwrap_or_else(|| Err(no_matching_key(kid)))
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify_access_token(&self, token: &str) -> Result<AuthInfo> {
        let header = decode_header(token)
            .map_err(|e| Error::Authentication(format!("Invalid token: {e}")))?;
        let key = self.decoding_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["iss"]);
        validation.validate_aud = false;
        validation.leeway = 0;

        let data = decode::<AccessTokenClaims>(token, &key, &validation)
            .map_err(|e| Error::Authentication(format!("Invalid token: {e}")))?;
        let claims = data.claims;

        Ok(AuthInfo {
            token: token.to_string(),
            client_id: claims.azp.unwrap_or_default(),
            scopes: claims
                .scope
                .as_deref()
                .unwrap_or_default()
                .split(' ')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            expires_at: claims.exp,
        })
    }
}

/// A key with id `kid`; without a kid, the set's only key.
fn select_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        None => match keys.keys.as_slice() {
            [only] => Some(only),
            _ => None,
        },
    }
}

fn key_from_jwk(jwk: &Jwk) -> Result<DecodingKey> {
    DecodingKey::from_jwk(jwk).map_err(|e| Error::Authentication(format!("Unusable signing key: {e}")))
}

fn no_matching_key(kid: Option<&str>) -> Error {
    match kid {
        Some(kid) => Error::Authentication(format!("No signing key found for kid {kid}")),
        None => Error::Authentication("Token has no key id".into()),
    }
}
