//! HMAC-SHA256 payload signatures

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of the serialized payload under the tenant secret.
#[must_use]
pub fn sign(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex signature against the payload in constant time.
#[must_use]
pub fn verify(secret: &str, payload: &str, signature: &str) -> bool {
    let Ok(raw) = hex::decode(signature) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    mac.verify_slice(&raw).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_deterministic_hex() {
        let signature = sign("secret", "{\"a\":1}");
        assert_eq!(signature.len(), 64);
        assert_eq!(signature, sign("secret", "{\"a\":1}"));
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let payload = "{\"event\":\"employee.updated\"}";
        let signature = sign("secret", payload);
        assert!(verify("secret", payload, &signature));
    }

    #[test]
    fn verify_rejects_single_byte_tamper() {
        let payload = "{\"amount\":100}";
        let signature = sign("secret", payload);
        assert!(!verify("secret", "{\"amount\":900}", &signature));
    }

    #[test]
    fn verify_rejects_wrong_secret_and_bad_hex() {
        let payload = "{}";
        let signature = sign("secret", payload);
        assert!(!verify("other", payload, &signature));
        assert!(!verify("secret", payload, "zz-not-hex"));
    }
}
