// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google ID token verification for user sign-in.
//!
//! The browser obtains an ID token from Google Sign-In and posts it to the
//! `/auth/google*` routes; this module turns it into a [`VerifiedIdentity`].

use crate::config::Config;
use crate::error::AppError;
use crate::models::VerifiedIdentity;
use anyhow::Context;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::{HeaderMap, CACHE_CONTROL};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

/// Google's published signing keys for Sign-In ID tokens.
const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
/// Used when the certs response carries no `max-age`.
const FALLBACK_KEY_TTL: Duration = Duration::from_secs(300);
/// An unknown `kid` triggers at most one refetch per interval.
const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(30);
const CLOCK_SKEW_SECS: u64 = 60;
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

/// OIDC verification error categories.
#[derive(Debug, Clone)]
pub enum OidcError {
    /// The token is malformed, forged, expired or for someone else.
    Rejected(String),
    /// Google's keys could not be fetched; the user may retry.
    Transient(String),
}

impl From<OidcError> for AppError {
    fn from(err: OidcError) -> Self {
        match err {
            OidcError::Rejected(reason) => {
                tracing::warn!(reason = %reason, "ID token rejected");
                AppError::InvalidToken
            }
            OidcError::Transient(reason) => AppError::BackendUnavailable(reason),
        }
    }
}

fn rejected(reason: impl Into<String>) -> OidcError {
    OidcError::Rejected(reason.into())
}

/// Where signing keys come from.
enum KeySource {
    Google {
        http_client: reqwest::Client,
        cache: RwLock<Option<KeySet>>,
        refetch: Mutex<Option<Instant>>,
    },
    Static {
        kid: String,
        algorithm: Algorithm,
        key: Arc<DecodingKey>,
    },
}

/// Google keys by `kid`, valid until `expires_at`.
struct KeySet {
    keys: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

impl KeySet {
    fn get(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        (self.expires_at > Instant::now())
            .then(|| self.keys.get(kid).cloned())
            .flatten()
    }
}

/// Verifier for Google Sign-In ID tokens.
pub struct GoogleIdentityVerifier {
    audience: String,
    source: KeySource,
}

impl GoogleIdentityVerifier {
    /// Verifier that checks signatures against Google's published keys.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building OIDC HTTP client")?;

        let verifier = Self {
            audience: config.google_client_id.trim().to_string(),
            source: KeySource::Google {
                http_client,
                cache: RwLock::new(None),
                refetch: Mutex::new(None),
            },
        };

        tracing::info!(audience = %verifier.audience, "Initialized Google sign-in verifier");
        Ok(verifier)
    }

    /// Verifier that accepts tokens signed by one fixed key.
    ///
    /// For tests; `algorithm` may be HMAC so no RSA key material is needed.
    pub fn new_with_static_key(
        config: &Config,
        kid: impl Into<String>,
        algorithm: Algorithm,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static OIDC kid must not be empty");
        }

        Ok(Self {
            audience: config.google_client_id.trim().to_string(),
            source: KeySource::Static {
                kid,
                algorithm,
                key: Arc::new(decoding_key),
            },
        })
    }

    fn algorithm(&self) -> Algorithm {
        match &self.source {
            KeySource::Google { .. } => Algorithm::RS256,
            KeySource::Static { algorithm, .. } => *algorithm,
        }
    }

    /// Verify a Google ID token and extract the signed-in identity.
    pub async fn verify_id_token(&self, token: &str) -> Result<VerifiedIdentity, OidcError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(rejected("ID token is empty"));
        }

        let header =
            decode_header(token).map_err(|e| rejected(format!("invalid JWT header: {e}")))?;
        let algorithm = self.algorithm();
        if header.alg != algorithm {
            return Err(rejected(format!("unexpected JWT alg: {:?}", header.alg)));
        }
        let kid = header.kid.ok_or_else(|| rejected("missing JWT kid"))?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_audience(&[self.audience.as_str()]);
        validation.validate_nbf = true;
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<GoogleIdTokenClaims>(token, key.as_ref(), &validation)
            .map_err(|e| rejected(format!("JWT validation failed: {e}")))?
            .claims;

        let identity = claims.into_identity(now_unix_secs())?;
        tracing::debug!(subject = %identity.subject, "Google ID token verified");
        Ok(identity)
    }

    async fn key_for(&self, kid: &str) -> Result<Arc<DecodingKey>, OidcError> {
        let (http_client, cache, refetch) = match &self.source {
            KeySource::Static {
                kid: static_kid,
                key,
                ..
            } => {
                return if kid == static_kid {
                    Ok(key.clone())
                } else {
                    Err(rejected(format!("unknown JWT kid: {kid}")))
                };
            }
            KeySource::Google {
                http_client,
                cache,
                refetch,
            } => (http_client, cache, refetch),
        };

        if let Some(key) = cache.read().await.as_ref().and_then(|set| set.get(kid)) {
            return Ok(key);
        }

        // One fetch at a time; whoever waited re-checks what the last one got.
        let mut last_fetch = refetch.lock().await;
        let cached = cache.read().await.as_ref().and_then(|set| set.get(kid));
        if let Some(key) = cached {
            return Ok(key);
        }
        let expired = cache
            .read()
            .await
            .as_ref()
            .is_none_or(|set| set.expires_at <= Instant::now());
        if !expired && last_fetch.is_some_and(|at| at.elapsed() < MIN_REFETCH_INTERVAL) {
            return Err(rejected(format!("JWT kid not in Google keys: {kid}")));
        }

        let fresh = fetch_google_keys(http_client).await?;
        *last_fetch = Some(Instant::now());
        let key = fresh.keys.get(kid).cloned();
        *cache.write().await = Some(fresh);

        key.ok_or_else(|| rejected(format!("JWT kid not in Google keys: {kid}")))
    }
}

async fn fetch_google_keys(http_client: &reqwest::Client) -> Result<KeySet, OidcError> {
    let response = http_client
        .get(GOOGLE_CERTS_URL)
        .send()
        .await
        .map_err(|e| OidcError::Transient(format!("Google certs request failed: {e}")))?;
    if !response.status().is_success() {
        return Err(OidcError::Transient(format!(
            "Google certs returned status {}",
            response.status()
        )));
    }

    let ttl = max_age(response.headers()).unwrap_or(FALLBACK_KEY_TTL);
    let jwks: Jwks = response
        .json()
        .await
        .map_err(|e| OidcError::Transient(format!("invalid JWKS JSON: {e}")))?;

    let keys: HashMap<_, _> = jwks.keys.into_iter().filter_map(usable_key).collect();
    if keys.is_empty() {
        return Err(OidcError::Transient(
            "Google certs had no usable RSA keys".to_string(),
        ));
    }

    tracing::debug!(keys = keys.len(), ttl_secs = ttl.as_secs(), "Fetched Google signing keys");
    Ok(KeySet {
        keys,
        expires_at: Instant::now() + ttl,
    })
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

/// RS256 signing keys only.
fn usable_key(jwk: Jwk) -> Option<(String, Arc<DecodingKey>)> {
    let signing = jwk.kty == "RSA"
        && !jwk.kid.trim().is_empty()
        && jwk.alg.as_deref().is_none_or(|alg| alg == "RS256")
        && jwk.use_.as_deref().is_none_or(|u| u == "sig");
    if !signing {
        return None;
    }

    match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
        Ok(key) => Some((jwk.kid, Arc::new(key))),
        Err(e) => {
            tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA key");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleIdTokenClaims {
    sub: String,
    iat: Option<u64>,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleIdTokenClaims {
    /// Checks the signature validation does not cover.
    fn into_identity(self, now: u64) -> Result<VerifiedIdentity, OidcError> {
        let iat = self.iat.ok_or_else(|| rejected("missing iat claim"))?;
        if iat > now + CLOCK_SKEW_SECS {
            return Err(rejected("iat claim is in the future"));
        }

        let email = self
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| rejected("missing email claim"))?;
        if self.email_verified != Some(true) {
            return Err(rejected("email is not verified"));
        }

        Ok(VerifiedIdentity {
            subject: self.sub,
            display_name: self.name.unwrap_or_default(),
            email,
            photo_url: self.picture,
        })
    }
}

fn max_age(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(CACHE_CONTROL)?
        .to_str()
        .ok()?
        .split(',')
        .find_map(|directive| {
            directive
                .trim()
                .strip_prefix("max-age=")?
                .trim_matches('"')
                .parse()
                .ok()
        })
        .map(Duration::from_secs)
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, value.parse().unwrap());
        headers
    }

    #[test]
    fn max_age_from_cache_control() {
        assert_eq!(
            max_age(&cache_headers("public, max-age=3600, must-revalidate")),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            max_age(&cache_headers("max-age=\"120\"")),
            Some(Duration::from_secs(120))
        );
        assert_eq!(max_age(&cache_headers("public, immutable")), None);
        assert_eq!(max_age(&cache_headers("max-age=abc")), None);
        assert_eq!(max_age(&HeaderMap::new()), None);
    }

    #[test]
    fn usable_key_skips_non_signing_keys() {
        let jwk = |kty: &str, alg: Option<&str>, use_: Option<&str>| Jwk {
            kid: "k1".to_string(),
            kty: kty.to_string(),
            alg: alg.map(str::to_string),
            n: "H0D8ktokFpR1CXnubPWC8tXX0o4YM13gWrxU0FYOD1MChgxlK_CNVgJSql50IQVG82n7u86MEs_HlXsmUv6adR9A_JLaJBaUdQl57mz1gvLV19KOGDNd4Fq8VNBWDg9TAoYMZSvwjVYCUqpedCEFRvNp-7vOjBLPx5V7JlL-mnUfQPyS2iQWlHUJee5s9YLy1dfSjhgzXeBavFTQVg4PUwKGDGUr8I1WAlKqXnQhBUbzafu7zowSz8eVeyZS_pp1H0D8ktokFpR1CXnubPWC8tXX0o4YM13gWrxU0FYOD1MChgxlK_CNVgJSql50IQVG82n7u86MEs_HlXsmUv6adQ".to_string(),
            e: "AQAB".to_string(),
            use_: use_.map(str::to_string),
        };

        assert!(usable_key(jwk("RSA", Some("RS256"), Some("sig"))).is_some());
        assert!(usable_key(jwk("RSA", None, None)).is_some());
        assert!(usable_key(jwk("EC", Some("ES256"), Some("sig"))).is_none());
        assert!(usable_key(jwk("RSA", Some("RS512"), Some("sig"))).is_none());
        assert!(usable_key(jwk("RSA", Some("RS256"), Some("enc"))).is_none());
    }

    #[test]
    fn claims_need_recent_iat_and_verified_email() {
        let claims = |iat: Option<u64>, verified: Option<bool>| GoogleIdTokenClaims {
            sub: "s".to_string(),
            iat,
            email: Some("a@uni.edu".to_string()),
            email_verified: verified,
            name: None,
            picture: None,
        };

        assert!(claims(Some(1_000), Some(true)).into_identity(1_000).is_ok());
        assert!(claims(None, Some(true)).into_identity(1_000).is_err());
        assert!(claims(Some(2_000), Some(true)).into_identity(1_000).is_err());
        assert!(claims(Some(1_000), None).into_identity(1_000).is_err());
    }

    fn static_verifier() -> GoogleIdentityVerifier {
        GoogleIdentityVerifier::new_with_static_key(
            &Config::test_default(),
            "test-kid",
            Algorithm::HS256,
            DecodingKey::from_secret(b"oidc-test-secret"),
        )
        .unwrap()
    }

    fn sign(claims: serde_json::Value) -> String {
        let mut header = jsonwebtoken::Header::new(Algorithm::HS256);
        header.kid = Some("test-kid".to_string());
        jsonwebtoken::encode(
            &header,
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"oidc-test-secret"),
        )
        .unwrap()
    }

    fn claims(aud: &str, email_verified: bool) -> serde_json::Value {
        let now = now_unix_secs();
        serde_json::json!({
            "iss": "https://accounts.google.com",
            "aud": aud,
            "sub": "google-sub-1",
            "iat": now,
            "exp": now + 600,
            "email": "ada@uni.edu",
            "email_verified": email_verified,
            "name": "Ada Lovelace",
            "picture": "https://img.example/ada.png"
        })
    }

    #[tokio::test]
    async fn verify_id_token_extracts_identity() {
        let token = sign(claims("test-client.apps.googleusercontent.com", true));
        let identity = static_verifier().verify_id_token(&token).await.unwrap();

        assert_eq!(identity.subject, "google-sub-1");
        assert_eq!(identity.display_name, "Ada Lovelace");
        assert_eq!(identity.email, "ada@uni.edu");
        assert_eq!(
            identity.photo_url.as_deref(),
            Some("https://img.example/ada.png")
        );
    }

    #[tokio::test]
    async fn verify_id_token_rejects_wrong_audience() {
        let token = sign(claims("someone-else.apps.googleusercontent.com", true));
        let result = static_verifier().verify_id_token(&token).await;
        assert!(matches!(result, Err(OidcError::Rejected(_))));
    }

    #[tokio::test]
    async fn verify_id_token_requires_verified_email() {
        let token = sign(claims("test-client.apps.googleusercontent.com", false));
        let result = static_verifier().verify_id_token(&token).await;
        assert!(matches!(result, Err(OidcError::Rejected(_))));
    }

    #[tokio::test]
    async fn verify_id_token_rejects_garbage() {
        let result = static_verifier().verify_id_token("not-a-jwt").await;
        assert!(matches!(result, Err(OidcError::Rejected(_))));
        let result = static_verifier().verify_id_token("  ").await;
        assert!(matches!(result, Err(OidcError::Rejected(_))));
    }
}
