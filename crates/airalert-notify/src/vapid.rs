//! VAPID application server keys and request signing (RFC 8292).

use airalert_core::error::{AirAlertError, Result};
use base64::Engine as _;
use chrono::Utc;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::rand_core::OsRng;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde::Serialize;

/// Uncompressed P-256 point length.
pub(crate) const PUBLIC_KEY_LEN: usize = 65;

/// Lifetime of a signed VAPID token.
const JWT_EXP_SECS: i64 = 12 * 60 * 60;

/// The application server's signing key pair.
pub struct VapidKeys {
    public_key: String,
    signing_key: SigningKey,
}

impl VapidKeys {
    /// Fresh random key pair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Load a key pair stored as URL-safe base64: the uncompressed public
    /// point and the raw 32-byte private scalar.
    pub fn from_base64(public_key: &str, private_key: &str) -> Result<Self> {
        let private_raw = decode_b64url(private_key)
            .map_err(|e| AirAlertError::Config(format!("invalid VAPID private key: {e}")))?;
        let signing_key = SigningKey::from_slice(&private_raw)
            .map_err(|_| AirAlertError::Config("VAPID private key must be a 32-byte P-256 scalar".into()))?;

        let keys = Self::from_signing_key(signing_key);
        let public_raw = decode_b64url(public_key)
            .map_err(|e| AirAlertError::Config(format!("invalid VAPID public key: {e}")))?;
        if public_raw.len() != PUBLIC_KEY_LEN || encode_b64url(&public_raw) != keys.public_key {
            return Err(AirAlertError::Config(
                "VAPID public key does not match the private key".into(),
            ));
        }
        Ok(keys)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let point = p256::PublicKey::from(signing_key.verifying_key()).to_encoded_point(false);
        Self {
            public_key: encode_b64url(point.as_bytes()),
            signing_key,
        }
    }

    /// Public key as handed to browsers (`applicationServerKey`).
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn private_key(&self) -> String {
        encode_b64url(&self.signing_key.to_bytes())
    }

    /// ES256 JWT for one push service origin.
    pub fn sign(&self, audience: &str, subject: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Claims<'a> {
            aud: &'a str,
            exp: i64,
            sub: &'a str,
        }

        let header = serde_json::json!({ "typ": "JWT", "alg": "ES256" });
        let claims = Claims {
            aud: audience,
            exp: Utc::now().timestamp() + JWT_EXP_SECS,
            sub: subject,
        };
        let signing_input = format!(
            "{}.{}",
            encode_b64url(serde_json::to_string(&header)?.as_bytes()),
            encode_b64url(serde_json::to_string(&claims)?.as_bytes())
        );
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        Ok(format!("{signing_input}.{}", encode_b64url(&signature.to_bytes())))
    }

    /// `Authorization` header value for a push request to `endpoint`.
    pub fn authorization(&self, endpoint: &str, subject: &str) -> Result<String> {
        let jwt = self.sign(&audience(endpoint)?, subject)?;
        Ok(format!("vapid t={jwt}, k={}", self.public_key))
    }
}

/// Origin of a push endpoint, the JWT audience.
pub fn audience(endpoint: &str) -> Result<String> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| AirAlertError::DeliveryFailed(format!("invalid push endpoint '{endpoint}': {e}")))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(AirAlertError::DeliveryFailed(format!(
            "push endpoint '{endpoint}' has no origin"
        )));
    }
    Ok(origin.ascii_serialization())
}

/// `sub` claim: a contact URI for the push service operator.
pub fn subject(contact: &str) -> String {
    if contact.starts_with("mailto:") || contact.starts_with("https:") {
        contact.to_string()
    } else {
        format!("mailto:{contact}")
    }
}

/// Browsers hand out keys URL-safe without padding; accept padded and
/// standard alphabets too.
pub(crate) fn decode_b64url(input: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
    let trimmed = input.trim().trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
}

pub(crate) fn encode_b64url(input: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::VerifyingKey;
    use p256::ecdsa::signature::Verifier;

    #[test]
    fn test_generated_keys_reload() {
        let keys = VapidKeys::generate();
        assert_eq!(decode_b64url(keys.public_key()).unwrap().len(), PUBLIC_KEY_LEN);
        assert_eq!(decode_b64url(&keys.private_key()).unwrap().len(), 32);

        let reloaded = VapidKeys::from_base64(keys.public_key(), &keys.private_key()).unwrap();
        assert_eq!(reloaded.public_key(), keys.public_key());
    }

    #[test]
    fn test_mismatched_or_bad_keys_rejected() {
        let a = VapidKeys::generate();
        let b = VapidKeys::generate();
        let err = VapidKeys::from_base64(a.public_key(), &b.private_key()).err().unwrap();
        assert!(matches!(err, AirAlertError::Config(_)));
        assert!(VapidKeys::from_base64(a.public_key(), "not base64!").is_err());
        assert!(VapidKeys::from_base64(a.public_key(), &encode_b64url(&[1u8; 12])).is_err());
        assert!(VapidKeys::from_base64("", "").is_err());
    }

    #[test]
    fn test_jwt_verifies_with_public_key() {
        let keys = VapidKeys::generate();
        let jwt = keys.sign("https://fcm.googleapis.com", "mailto:admin@localhost").unwrap();

        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        let claims: serde_json::Value =
            serde_json::from_slice(&decode_b64url(parts[1]).unwrap()).unwrap();
        assert_eq!(claims["aud"], "https://fcm.googleapis.com");
        assert_eq!(claims["sub"], "mailto:admin@localhost");
        assert!(claims["exp"].as_i64().unwrap() > Utc::now().timestamp());

        let verifying =
            VerifyingKey::from_sec1_bytes(&decode_b64url(keys.public_key()).unwrap()).unwrap();
        let signature = Signature::from_slice(&decode_b64url(parts[2]).unwrap()).unwrap();
        let signing_input = format!("{}.{}", parts[0], parts[1]);
        assert!(verifying.verify(signing_input.as_bytes(), &signature).is_ok());
    }

    #[test]
    fn test_audience_is_origin() {
        assert_eq!(
            audience("https://fcm.googleapis.com/fcm/send/abc:def").unwrap(),
            "https://fcm.googleapis.com"
        );
        assert_eq!(
            audience("https://push.example:8443/wpush/v2/xyz").unwrap(),
            "https://push.example:8443"
        );
        assert!(audience("not a url").is_err());
    }

    #[test]
    fn test_subject() {
        assert_eq!(subject("admin@localhost"), "mailto:admin@localhost");
        assert_eq!(subject("mailto:ops@example.com"), "mailto:ops@example.com");
        assert_eq!(subject("https://example.com/contact"), "https://example.com/contact");
    }
}
