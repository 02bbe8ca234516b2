//! HTTP Signatures for outbound ActivityPub deliveries
//!
//! Implements the draft-cavage signing profile used by Mastodon:
//! https://docs.joinmastodon.org/spec/security/
//!
//! Signed headers are always `(request-target) host date digest`, in that
//! order, for a `post` request.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};

use super::activity::CreateActivity;
use crate::data::{Actor, KeyStore};
use crate::error::AppError;

/// Header names covered by the signature, in signing order
pub const SIGNED_HEADERS: &str = "(request-target) host date digest";

/// Headers to attach verbatim to a signed delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequestHeaders {
    /// Host header value (authority of the target)
    pub host: String,
    /// Date header value (RFC 7231 IMF-fixdate)
    pub date: String,
    /// Digest header value (`SHA-256=<base64>`)
    pub digest: String,
    /// Signature header value
    pub signature: String,
}

impl SignedRequestHeaders {
    /// Header name/value pairs in the order they were signed
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("host", self.host.as_str()),
            ("date", self.date.as_str()),
            ("digest", self.digest.as_str()),
            ("signature", self.signature.as_str()),
        ]
    }

    /// Convert to an `http::HeaderMap`
    pub fn to_header_map(&self) -> Result<http::HeaderMap, AppError> {
        let mut headers = http::HeaderMap::with_capacity(4);
        for (name, value) in self.pairs() {
            let value = http::HeaderValue::from_str(value).map_err(|e| {
                AppError::Validation(format!("Invalid {} header value: {}", name, e))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// A signed delivery: the exact body bytes and the headers covering them
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub body: String,
    pub headers: SignedRequestHeaders,
}

/// Signs outbound requests on behalf of one local actor
#[derive(Clone)]
pub struct RequestSigner {
    key_id: String,
    signing_key: SigningKey<Sha256>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    /// Resolve the actor's private key and prepare a signer
    ///
    /// # Errors
    /// - `KeyNotFound` if the key store has no key for the actor
    /// - `InvalidKey` if the stored key is not an RSA PEM
    pub async fn for_actor<K: KeyStore>(keys: &K, actor: &Actor) -> Result<Self, AppError> {
        let account_id = actor.account_id();
        let private_key_pem = keys
            .lookup_private_key(&account_id)
            .await?
            .ok_or(AppError::KeyNotFound(account_id))?;

        Self::from_pem(actor, &private_key_pem)
    }

    /// Build a signer from a PKCS#8 or PKCS#1 PEM private key
    pub fn from_pem(actor: &Actor, private_key_pem: &str) -> Result<Self, AppError> {
        use rsa::pkcs1::DecodeRsaPrivateKey;
        use rsa::pkcs8::DecodePrivateKey;

        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_key_pem))
            .map_err(|e| AppError::InvalidKey(e.to_string()))?;

        Ok(Self {
            key_id: actor.uri(),
            signing_key: SigningKey::<Sha256>::new(private_key),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Serialize `activity` and sign a POST of it to `target_host`/`target_path`
    ///
    /// The returned body is the same string the digest was computed over.
    pub fn sign(
        &self,
        activity: &CreateActivity,
        target_host: &str,
        target_path: &str,
    ) -> Result<SignedRequest, AppError> {
        let body = activity.to_json()?;
        let headers = self.sign_body(body.as_bytes(), target_host, target_path, Utc::now())?;
        Ok(SignedRequest { body, headers })
    }

    /// Sign a POST of `body` at a fixed `date`
    pub fn sign_body(
        &self,
        body: &[u8],
        target_host: &str,
        target_path: &str,
        date: DateTime<Utc>,
    ) -> Result<SignedRequestHeaders, AppError> {
        let date = http_date(date);
        let digest = generate_digest(body);
        let signing_string = build_signing_string(target_path, target_host, &date, &digest);

        let signature = self
            .signing_key
            .try_sign(signing_string.as_bytes())
            .map_err(|e| AppError::InvalidKey(format!("Signing failed: {}", e)))?;
        let signature_b64 = BASE64.encode(signature.to_bytes());

        let signature_header = format!(
            "keyId=\"{}\",headers=\"{}\",signature=\"{}\"",
            self.key_id, SIGNED_HEADERS, signature_b64
        );

        Ok(SignedRequestHeaders {
            host: target_host.to_string(),
            date,
            digest,
            signature: signature_header,
        })
    }
}

/// Build the newline-joined string covered by the signature
pub fn build_signing_string(target_path: &str, host: &str, date: &str, digest: &str) -> String {
    [
        format!("(request-target): post {}", target_path),
        format!("host: {}", host),
        format!("date: {}", date),
        format!("digest: {}", digest),
    ]
    .join("\n")
}

/// Generate SHA-256 digest for body
///
/// # Returns
/// `SHA-256=base64(hash)`
pub fn generate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let hash = hasher.finalize();
    format!("SHA-256={}", BASE64.encode(hash))
}

/// Format a timestamp as an RFC 7231 HTTP-date
pub fn http_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Generate an RSA keypair as (PKCS#8 private PEM, SPKI public PEM)
pub fn generate_keypair(bits: usize) -> Result<(String, String), AppError> {
    use rand::rngs::OsRng;
    use rsa::RsaPublicKey;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    let private_key =
        RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| AppError::Internal(e.into()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| AppError::Internal(e.into()))?
        .to_string();
    let public_key_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok((private_key_pem, public_key_pem))
}
