//! HMAC-SHA256 body signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{CallbackError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the `X-Signature` header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Computes the hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CallbackError::Signature(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks an `X-Signature` header value (`sha256=<hex>`) against a body.
///
/// Comparison is constant time.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let digest = sign("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            digest,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_accepts_own_signature() {
        let body = br#"{"event_id":"x"}"#;
        let header = format!("{SIGNATURE_PREFIX}{}", sign("s3cret", body).unwrap());
        assert!(verify_signature("s3cret", body, &header));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let body = br#"{"event_id":"x"}"#;
        let header = format!("{SIGNATURE_PREFIX}{}", sign("s3cret", body).unwrap());
        assert!(!verify_signature("other", body, &header));
        assert!(!verify_signature("s3cret", br#"{"event_id":"y"}"#, &header));
        assert!(!verify_signature("s3cret", body, "md5=abcd"));
        assert!(!verify_signature("s3cret", body, "sha256=zz"));
    }
}
