//! RSA2 request signing and signature verification.
//!
//! Signatures are RSA PKCS#1 v1.5 over SHA-256 of the canonical string,
//! base64 encoded and then percent-encoded into the `Authorization` header:
//!
//! ```text
//! Authorization: algorithm=RSA2,time=<ms>,signature=<urlencoded base64>
//! X-Appid: <app id>
//! ```
//!
//! Keys are loaded on first use and cached for the life of the process.
//! A failed load is not cached, so a key file that appears later is picked up.

use std::path::PathBuf;
use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use provider_types::SignatureError;
use provider_types::domain::{SIGNATURE_ALGORITHM, SignedRequest};

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const APP_ID_HEADER: &str = "X-Appid";

/// Everything except RFC 3986 unreserved characters.
const SIGNATURE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

// ─────────────────────────────────────────────────────────────────────────────
// Key sources
// ─────────────────────────────────────────────────────────────────────────────

/// Where a PEM key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    File(PathBuf),
    Pem(String),
}

impl KeySource {
    fn read(&self) -> Result<String, SignatureError> {
        match self {
            KeySource::File(path) => std::fs::read_to_string(path).map_err(|e| {
                SignatureError::KeyUnavailable(format!("{}: {}", path.display(), e))
            }),
            KeySource::Pem(pem) => Ok(pem.clone()),
        }
    }
}

fn load_private_key(source: &KeySource) -> Result<RsaPrivateKey, SignatureError> {
    let pem = source.read()?;
    RsaPrivateKey::from_pkcs1_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
        .map_err(|e| SignatureError::InvalidKey(format!("private key: {}", e)))
}

fn load_public_key(source: &KeySource) -> Result<RsaPublicKey, SignatureError> {
    let pem = source.read()?;
    RsaPublicKey::from_pkcs1_pem(&pem)
        .or_else(|_| RsaPublicKey::from_public_key_pem(&pem))
        .map_err(|e| SignatureError::InvalidKey(format!("public key: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization header
// ─────────────────────────────────────────────────────────────────────────────

/// Parsed `Authorization: algorithm=..,time=..,signature=..` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationHeader {
    pub algorithm: String,
    pub timestamp_ms: Option<String>,
    /// Percent-encoded as sent on the wire.
    pub signature: Option<String>,
}

impl AuthorizationHeader {
    pub fn new(timestamp_ms: &str, signature_b64: &str) -> Self {
        Self {
            algorithm: SIGNATURE_ALGORITHM.to_string(),
            timestamp_ms: Some(timestamp_ms.to_string()),
            signature: Some(utf8_percent_encode(signature_b64, SIGNATURE_ENCODE_SET).to_string()),
        }
    }

    pub fn parse(value: &str) -> Result<Self, SignatureError> {
        let mut algorithm = None;
        let mut timestamp_ms = None;
        let mut signature = None;
        for part in value.split(',') {
            let Some((k, v)) = part.split_once('=') else {
                continue;
            };
            let v = v.trim();
            match k.trim() {
                "algorithm" => algorithm = Some(v.to_string()),
                "time" => timestamp_ms = Some(v.to_string()).filter(|t| !t.is_empty()),
                "signature" => signature = Some(v.to_string()).filter(|s| !s.is_empty()),
                _ => {}
            }
        }
        let algorithm = algorithm.ok_or_else(|| {
            SignatureError::MalformedAuthorization("no algorithm field".to_string())
        })?;
        Ok(Self {
            algorithm,
            timestamp_ms,
            signature,
        })
    }

    pub fn to_header_value(&self) -> String {
        format!(
            "algorithm={},time={},signature={}",
            self.algorithm,
            self.timestamp_ms.as_deref().unwrap_or_default(),
            self.signature.as_deref().unwrap_or_default()
        )
    }

    /// Decoded signature bytes.
    fn signature_bytes(&self) -> Result<Vec<u8>, SignatureError> {
        let encoded = self
            .signature
            .as_deref()
            .ok_or(SignatureError::MissingSignature)?;
        let b64 = percent_decode_str(encoded)
            .decode_utf8()
            .map_err(|e| SignatureError::Encoding(e.to_string()))?;
        STANDARD
            .decode(b64.as_bytes())
            .map_err(|e| SignatureError::Encoding(e.to_string()))
    }
}

/// Headers attached to a signed gateway request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
    pub authorization: String,
    pub app_id: String,
    pub timestamp_ms: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Signer
// ─────────────────────────────────────────────────────────────────────────────

pub struct RequestSigner {
    app_id: String,
    source: Option<KeySource>,
    key: OnceLock<SigningKey<Sha256>>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("app_id", &self.app_id)
            .field("key_loaded", &self.key.get().is_some())
            .finish()
    }
}

impl RequestSigner {
    pub fn new(app_id: impl Into<String>, source: Option<KeySource>) -> Self {
        Self {
            app_id: app_id.into(),
            source,
            key: OnceLock::new(),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    fn signing_key(&self) -> Result<&SigningKey<Sha256>, SignatureError> {
        if let Some(key) = self.key.get() {
            return Ok(key);
        }
        let source = self.source.as_ref().ok_or_else(|| {
            SignatureError::KeyUnavailable("no client private key configured".to_string())
        })?;
        let key = SigningKey::<Sha256>::new(load_private_key(source)?);
        Ok(self.key.get_or_init(|| key))
    }

    /// Signs the canonical string and returns the base64 signature.
    pub fn sign(&self, request: &SignedRequest) -> Result<String, SignatureError> {
        let key = self.signing_key()?;
        let signature = key
            .try_sign(request.canonical_string().as_bytes())
            .map_err(|e| SignatureError::Signing(e.to_string()))?;
        Ok(STANDARD.encode(signature.to_bytes()))
    }

    /// Produces `Authorization` and `X-Appid` values for a request at `timestamp_ms`.
    pub fn headers_at(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        timestamp_ms: &str,
    ) -> Result<SignatureHeaders, SignatureError> {
        let request = SignedRequest::new(method, path, &self.app_id, timestamp_ms, body);
        let signature = self.sign(&request)?;
        Ok(SignatureHeaders {
            authorization: AuthorizationHeader::new(timestamp_ms, &signature).to_header_value(),
            app_id: self.app_id.clone(),
            timestamp_ms: timestamp_ms.to_string(),
        })
    }

    /// Like [`headers_at`](Self::headers_at) with the current wall-clock time.
    pub fn headers(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> Result<SignatureHeaders, SignatureError> {
        let now = chrono::Utc::now().timestamp_millis().to_string();
        self.headers_at(method, path, body, &now)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Verifier
// ─────────────────────────────────────────────────────────────────────────────

/// Verifies gateway responses and inbound webhooks. Every failure is a rejection.
pub struct SignatureVerifier {
    source: Option<KeySource>,
    key: OnceLock<VerifyingKey<Sha256>>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("key_loaded", &self.key.get().is_some())
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(source: Option<KeySource>) -> Self {
        Self {
            source,
            key: OnceLock::new(),
        }
    }

    fn verifying_key(&self) -> Result<&VerifyingKey<Sha256>, SignatureError> {
        if let Some(key) = self.key.get() {
            return Ok(key);
        }
        let source = self.source.as_ref().ok_or_else(|| {
            SignatureError::KeyUnavailable("no server public key configured".to_string())
        })?;
        let key = VerifyingKey::<Sha256>::new(load_public_key(source)?);
        Ok(self.key.get_or_init(|| key))
    }

    /// Recomputes the canonical string from what was actually received and checks it.
    pub fn verify(
        &self,
        method: &str,
        path: &str,
        authorization: Option<&str>,
        app_id: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        let header = AuthorizationHeader::parse(
            authorization
                .filter(|a| !a.trim().is_empty())
                .ok_or(SignatureError::MissingAuthorization)?,
        )?;
        if header.algorithm != SIGNATURE_ALGORITHM {
            return Err(SignatureError::UnsupportedAlgorithm(header.algorithm));
        }
        if header.signature.is_none() {
            return Err(SignatureError::MissingSignature);
        }
        let app_id = app_id
            .filter(|a| !a.is_empty())
            .ok_or(SignatureError::MissingAppId)?;
        let key = self.verifying_key()?;
        let timestamp = header
            .timestamp_ms
            .as_deref()
            .ok_or(SignatureError::MissingTimestamp)?;

        let raw = header.signature_bytes()?;
        let signature = Signature::try_from(raw.as_slice())
            .map_err(|e| SignatureError::Encoding(e.to_string()))?;
        let canonical = SignedRequest::new(method, path, app_id, timestamp, body).canonical_string();
        key.verify(canonical.as_bytes(), &signature)
            .map_err(|_| SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_PRIVATE: &str = include_str!("../tests/fixtures/client_private.pem");
    const CLIENT_PUBLIC: &str = include_str!("../tests/fixtures/client_public.pem");
    const SERVER_PRIVATE: &str = include_str!("../tests/fixtures/server_private.pem");
    const SERVER_PUBLIC_SPKI: &str = include_str!("../tests/fixtures/server_public_spki.pem");
    const ROGUE_PRIVATE: &str = include_str!("../tests/fixtures/rogue_private.pem");

    fn signer(pem: &str) -> RequestSigner {
        RequestSigner::new("APPID", Some(KeySource::Pem(pem.to_string())))
    }

    fn verifier(pem: &str) -> SignatureVerifier {
        SignatureVerifier::new(Some(KeySource::Pem(pem.to_string())))
    }

    #[test]
    fn test_fixed_canonical_string_round_trips() {
        let request = SignedRequest::new("POST", "/v1/pay", "APPID", "1700000000000", b"");
        assert_eq!(
            request.canonical_string(),
            "POST /v1/pay\nAPPID\n1700000000000\n47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=\n"
        );

        let headers = signer(CLIENT_PRIVATE)
            .headers_at("POST", "/v1/pay", b"", "1700000000000")
            .unwrap();
        verifier(CLIENT_PUBLIC)
            .verify(
                "POST",
                "/v1/pay",
                Some(&headers.authorization),
                Some("APPID"),
                b"",
            )
            .unwrap();
    }

    #[test]
    fn test_foreign_key_is_rejected() {
        let headers = signer(ROGUE_PRIVATE)
            .headers_at("POST", "/v1/pay", b"", "1700000000000")
            .unwrap();
        let result = verifier(CLIENT_PUBLIC).verify(
            "POST",
            "/v1/pay",
            Some(&headers.authorization),
            Some("APPID"),
            b"",
        );
        assert_eq!(result, Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_any_flipped_field_fails() {
        let body = br#"{"orderId":"O1","amount":9.99}"#;
        let headers = signer(CLIENT_PRIVATE)
            .headers_at("POST", "/v1/pay", body, "1700000000000")
            .unwrap();
        let v = verifier(CLIENT_PUBLIC);
        let auth = Some(headers.authorization.as_str());

        assert!(v.verify("POST", "/v1/pay", auth, Some("APPID"), body).is_ok());
        assert!(
            v.verify("POST", "/v1/pay", auth, Some("APPID"), br#"{"orderId":"O1","amount":9.98}"#)
                .is_err()
        );
        assert!(v.verify("POST", "/v1/pax", auth, Some("APPID"), body).is_err());
        assert!(v.verify("GET", "/v1/pay", auth, Some("APPID"), body).is_err());
        assert!(v.verify("POST", "/v1/pay", auth, Some("OTHER"), body).is_err());

        let shifted = headers.authorization.replace("1700000000000", "1700000000001");
        assert!(
            v.verify("POST", "/v1/pay", Some(&shifted), Some("APPID"), body)
                .is_err()
        );
    }

    #[test]
    fn test_signature_is_percent_encoded() {
        let headers = signer(CLIENT_PRIVATE)
            .headers_at("GET", "/v1/x", b"", "1")
            .unwrap();
        let parsed = AuthorizationHeader::parse(&headers.authorization).unwrap();
        let sig = parsed.signature.unwrap();
        assert!(!sig.contains('+'));
        assert!(!sig.contains('/'));
        assert!(!sig.contains('='));
        assert_eq!(headers.app_id, "APPID");
    }

    #[test]
    fn test_verifier_fails_closed() {
        let v = verifier(CLIENT_PUBLIC);
        assert_eq!(
            v.verify("POST", "/p", None, Some("APPID"), b""),
            Err(SignatureError::MissingAuthorization)
        );
        assert!(matches!(
            v.verify("POST", "/p", Some("algorithm=RSA1,time=1,signature=abc"), Some("APPID"), b""),
            Err(SignatureError::UnsupportedAlgorithm(_))
        ));
        assert_eq!(
            v.verify("POST", "/p", Some("algorithm=RSA2,time=1"), Some("APPID"), b""),
            Err(SignatureError::MissingSignature)
        );
        assert_eq!(
            v.verify("POST", "/p", Some("algorithm=RSA2,time=1,signature=abc"), None, b""),
            Err(SignatureError::MissingAppId)
        );
        assert!(matches!(
            v.verify("POST", "/p", Some("algorithm=RSA2,time=1,signature=%%%"), Some("APPID"), b""),
            Err(SignatureError::Encoding(_))
        ));

        let unconfigured = SignatureVerifier::new(None);
        assert!(matches!(
            unconfigured.verify("POST", "/p", Some("algorithm=RSA2,time=1,signature=abc"), Some("APPID"), b""),
            Err(SignatureError::KeyUnavailable(_))
        ));
    }

    #[test]
    fn test_missing_key_file() {
        let signer = RequestSigner::new(
            "APPID",
            Some(KeySource::File(PathBuf::from("/nonexistent/client.pem"))),
        );
        assert!(matches!(
            signer.headers("POST", "/p", b""),
            Err(SignatureError::KeyUnavailable(_))
        ));

        let garbage = RequestSigner::new("APPID", Some(KeySource::Pem("not a key".into())));
        assert!(matches!(
            garbage.headers("POST", "/p", b""),
            Err(SignatureError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_spki_public_key_is_accepted() {
        let headers = signer(SERVER_PRIVATE)
            .headers_at("POST", "/webhooks/gateway", b"{}", "1700000000000")
            .unwrap();
        verifier(SERVER_PUBLIC_SPKI)
            .verify(
                "POST",
                "/webhooks/gateway",
                Some(&headers.authorization),
                Some("APPID"),
                b"{}",
            )
            .unwrap();
    }

    #[test]
    fn test_authorization_header_round_trip() {
        let header = AuthorizationHeader::parse("algorithm=RSA2, time=123 ,signature=a%2Bb").unwrap();
        assert_eq!(header.algorithm, "RSA2");
        assert_eq!(header.timestamp_ms.as_deref(), Some("123"));
        assert_eq!(header.to_header_value(), "algorithm=RSA2,time=123,signature=a%2Bb");
        assert!(AuthorizationHeader::parse("time=1").is_err());
    }
}
