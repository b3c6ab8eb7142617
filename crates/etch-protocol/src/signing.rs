//! Request signing
//!
//! A `signature_timestamp` is appended to the form body, the body is hashed
//! with SHA-1 and the digest is signed with RSA PKCS#1 v1.5. The signature
//! travels base64-encoded in `Authorization: EtchSignature <sig>`.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::{Digest, Sha1};
use url::form_urlencoded;

use crate::{Error, Result};

/// Scheme name used in the `Authorization` header.
pub const SIGNATURE_SCHEME: &str = "EtchSignature";

/// Signs request bodies, or passes them through unsigned when no key is loaded.
#[derive(Clone, Default)]
pub struct Signer {
    key: Option<RsaPrivateKey>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("signing", &self.key.is_some())
            .finish()
    }
}

impl Signer {
    pub fn unsigned() -> Self {
        Self { key: None }
    }

    pub fn from_key(key: RsaPrivateKey) -> Self {
        Self { key: Some(key) }
    }

    /// Load a PEM key (PKCS#1 or PKCS#8).
    pub fn load(path: &Path) -> Result<Self> {
        let pem = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let key = RsaPrivateKey::from_pkcs1_pem(&pem)
            .map_err(|e| e.to_string())
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| e.to_string()))
            .map_err(|message| Error::Key {
                path: path.to_path_buf(),
                message,
            })?;
        Ok(Self::from_key(key))
    }

    /// Load a key if one is usable, otherwise degrade to unsigned requests.
    pub fn load_or_unsigned(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            tracing::warn!("No private key configured, requests will be unsigned");
            return Self::unsigned();
        };
        match Self::load(path) {
            Ok(signer) => signer,
            Err(e) => {
                tracing::warn!(error = %e, "Private key unusable, requests will be unsigned");
                Self::unsigned()
            }
        }
    }

    pub fn is_signing(&self) -> bool {
        self.key.is_some()
    }

    /// Append the timestamp to `body` and sign the result.
    ///
    /// Returns the final body and the `Authorization` header value, if signing.
    pub fn seal(&self, body: &str, now: DateTime<Utc>) -> Result<(String, Option<String>)> {
        let body = append_timestamp(body, now);
        let header = self
            .sign(body.as_bytes())?
            .map(|signature| format!("{SIGNATURE_SCHEME} {signature}"));
        Ok((body, header))
    }

    /// Base64 signature of `body`, without newlines.
    pub fn sign(&self, body: &[u8]) -> Result<Option<String>> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        let digest = Sha1::digest(body);
        let signature = key
            .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
            .map_err(|e| Error::Signing {
                message: e.to_string(),
            })?;
        Ok(Some(STANDARD.encode(signature)))
    }
}

/// Append `signature_timestamp=<RFC3339 UTC>` to a form body.
pub fn append_timestamp(body: &str, now: DateTime<Utc>) -> String {
    let stamp = form_urlencoded::Serializer::new(String::new())
        .append_pair(
            "signature_timestamp",
            &now.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .finish();
    if body.is_empty() {
        stamp
    } else {
        format!("{body}&{stamp}")
    }
}
