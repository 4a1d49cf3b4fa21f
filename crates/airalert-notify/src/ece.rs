//! Web push message encryption: `aes128gcm` content coding (RFC 8188/8291).

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, KeyInit};
use airalert_core::error::{AirAlertError, Result};
use airalert_core::types::PushKeys;
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::Sha256;

use crate::vapid::{PUBLIC_KEY_LEN, decode_b64url};

const SALT_LEN: usize = 16;
const AUTH_SECRET_LEN: usize = 16;
/// Record size advertised in the header; one record carries the whole message.
const RECORD_SIZE: u32 = 4096;
/// Tag, delimiter and header overhead leave this much room for the payload.
pub const MAX_PAYLOAD_LEN: usize = 3993;

const IKM_INFO_PREFIX: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

/// Encrypt `payload` for the browser holding `keys`.
///
/// Returns the request body: salt, record size, sender key id, then the
/// single ciphertext record.
pub fn encrypt(payload: &[u8], keys: &PushKeys) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(AirAlertError::DeliveryFailed(format!(
            "push payload of {} bytes exceeds {MAX_PAYLOAD_LEN}",
            payload.len()
        )));
    }
    let receiver_raw: [u8; PUBLIC_KEY_LEN] = decode_b64url(&keys.p256dh)
        .ok()
        .and_then(|raw| raw.try_into().ok())
        .ok_or_else(|| AirAlertError::DeliveryFailed("invalid p256dh key".into()))?;
    let auth: [u8; AUTH_SECRET_LEN] = decode_b64url(&keys.auth)
        .ok()
        .and_then(|raw| raw.try_into().ok())
        .ok_or_else(|| AirAlertError::DeliveryFailed("invalid auth secret".into()))?;
    let receiver = p256::PublicKey::from_sec1_bytes(&receiver_raw)
        .map_err(|_| AirAlertError::DeliveryFailed("p256dh is not a P-256 point".into()))?;

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let sender = EphemeralSecret::random(&mut OsRng);
    let sender_point = sender.public_key().to_encoded_point(false);
    let sender_raw = sender_point.as_bytes();
    let shared = sender.diffie_hellman(&receiver);

    let (cek, nonce) = derive_keys(
        shared.raw_secret_bytes(),
        &auth,
        &salt,
        &receiver_raw,
        sender_raw,
    )?;

    let mut record = Vec::with_capacity(payload.len() + 1);
    record.extend_from_slice(payload);
    // Last-record delimiter, no padding.
    record.push(2);
    let cipher = Aes128Gcm::new_from_slice(&cek)
        .map_err(|_| AirAlertError::DeliveryFailed("bad content encryption key".into()))?;
    let ciphertext = cipher
        .encrypt((&nonce).into(), record.as_slice())
        .map_err(|_| AirAlertError::DeliveryFailed("payload encryption failed".into()))?;

    let mut body = Vec::with_capacity(SALT_LEN + 5 + sender_raw.len() + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(sender_raw.len() as u8);
    body.extend_from_slice(sender_raw);
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

/// Content encryption key and nonce from the ECDH secret.
fn derive_keys(
    shared_secret: &[u8],
    auth: &[u8],
    salt: &[u8],
    receiver_raw: &[u8],
    sender_raw: &[u8],
) -> Result<([u8; 16], [u8; 12])> {
    let mut key_info = Vec::with_capacity(IKM_INFO_PREFIX.len() + receiver_raw.len() + sender_raw.len());
    key_info.extend_from_slice(IKM_INFO_PREFIX);
    key_info.extend_from_slice(receiver_raw);
    key_info.extend_from_slice(sender_raw);

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth), shared_secret)
        .expand(&key_info, &mut ikm)
        .map_err(|_| AirAlertError::DeliveryFailed("HKDF expand failed".into()))?;

    let prk = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut cek = [0u8; 16];
    let mut nonce = [0u8; 12];
    prk.expand(CEK_INFO, &mut cek)
        .and_then(|_| prk.expand(NONCE_INFO, &mut nonce))
        .map_err(|_| AirAlertError::DeliveryFailed("HKDF expand failed".into()))?;
    Ok((cek, nonce))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vapid::encode_b64url;
    use p256::SecretKey;

    struct Browser {
        secret: SecretKey,
        auth: [u8; AUTH_SECRET_LEN],
    }

    impl Browser {
        fn new() -> Self {
            let mut auth = [0u8; AUTH_SECRET_LEN];
            OsRng.fill_bytes(&mut auth);
            Self {
                secret: SecretKey::random(&mut OsRng),
                auth,
            }
        }

        fn keys(&self) -> PushKeys {
            PushKeys {
                auth: encode_b64url(&self.auth),
                p256dh: encode_b64url(self.secret.public_key().to_encoded_point(false).as_bytes()),
            }
        }

        /// Receiver side of the content coding.
        fn decrypt(&self, body: &[u8]) -> Vec<u8> {
            let salt = &body[..SALT_LEN];
            let rs = u32::from_be_bytes(body[SALT_LEN..SALT_LEN + 4].try_into().unwrap());
            assert_eq!(rs, RECORD_SIZE);
            let id_len = body[SALT_LEN + 4] as usize;
            let sender_raw = &body[SALT_LEN + 5..SALT_LEN + 5 + id_len];
            let ciphertext = &body[SALT_LEN + 5 + id_len..];

            let sender = p256::PublicKey::from_sec1_bytes(sender_raw).unwrap();
            let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), sender.as_affine());
            let receiver_point = self.secret.public_key().to_encoded_point(false);
            let (cek, nonce) = derive_keys(
                shared.raw_secret_bytes(),
                &self.auth,
                salt,
                receiver_point.as_bytes(),
                sender_raw,
            )
            .unwrap();

            let cipher = Aes128Gcm::new_from_slice(&cek).unwrap();
            let mut record = cipher.decrypt((&nonce).into(), ciphertext).unwrap();
            assert_eq!(record.pop(), Some(2));
            record
        }
    }

    #[test]
    fn test_browser_can_decrypt() {
        let browser = Browser::new();
        let body = encrypt(b"The AQI is 50.1. Time to go inside.", &browser.keys()).unwrap();
        assert_eq!(browser.decrypt(&body), b"The AQI is 50.1. Time to go inside.");
    }

    #[test]
    fn test_each_message_uses_fresh_salt_and_key() {
        let browser = Browser::new();
        let a = encrypt(b"same", &browser.keys()).unwrap();
        let b = encrypt(b"same", &browser.keys()).unwrap();
        assert_ne!(a[..SALT_LEN], b[..SALT_LEN]);
        assert_ne!(a, b);
        assert_eq!(browser.decrypt(&b), b"same");
    }

    #[test]
    fn test_bad_subscription_keys() {
        let keys = PushKeys {
            auth: "short".into(),
            p256dh: "also-short".into(),
        };
        let err = encrypt(b"hi", &keys).unwrap_err();
        assert!(matches!(err, AirAlertError::DeliveryFailed(_)));

        let mut keys = Browser::new().keys();
        keys.auth = encode_b64url(&[7u8; 8]);
        assert!(encrypt(b"hi", &keys).is_err());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let browser = Browser::new();
        assert!(encrypt(&vec![b'x'; MAX_PAYLOAD_LEN + 1], &browser.keys()).is_err());
        assert!(encrypt(&vec![b'x'; MAX_PAYLOAD_LEN], &browser.keys()).is_ok());
    }
}
