//! RFC 6238 TOTP generation/verification for console 2FA, plus backup codes.

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::error::AuthError;

type HmacSha1 = Hmac<Sha1>;

const STEP_SECONDS: u64 = 30;
const DIGITS: u32 = 6;
/// Number of steps before/after the current one that are still accepted,
/// to tolerate clock drift between client and server.
const WINDOW: i64 = 1;

/// Generate a random base32-encoded TOTP secret (160 bits).
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

/// Verify a 6-digit TOTP code against `secret` at the current Unix time,
/// tolerating one step of clock drift in either direction.
pub fn verify_code(secret: &str, code: &str, unix_time: u64) -> Result<(), AuthError> {
    let key = BASE32_NOPAD
        .decode(secret.as_bytes())
        .map_err(|_| AuthError::InvalidTotpCode)?;
    let current_step = unix_time / STEP_SECONDS;

    for offset in -WINDOW..=WINDOW {
        let step = (current_step as i64 + offset).max(0) as u64;
        if hotp(&key, step) == code {
            return Ok(());
        }
    }
    Err(AuthError::InvalidTotpCode)
}

fn hotp(key: &[u8], counter: u64) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    let offset = (hash[hash.len() - 1] & 0x0f) as usize;
    let truncated = u32::from_be_bytes([
        hash[offset] & 0x7f,
        hash[offset + 1],
        hash[offset + 2],
        hash[offset + 3],
    ]);
    format!("{:0width$}", truncated % 10u32.pow(DIGITS), width = DIGITS as usize)
}

/// Generate a set of single-use backup codes (10 codes, 8 hex chars each).
pub fn generate_backup_codes() -> Vec<String> {
    (0..10)
        .map(|_| {
            let mut bytes = [0u8; 4];
            rand::thread_rng().fill_bytes(&mut bytes);
            hex::encode(bytes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hotp_known_vector() {
        // RFC 4226 test vector: secret "12345678901234567890" (ASCII), counter 0.
        let key = b"12345678901234567890";
        assert_eq!(hotp(key, 0), "755224");
        assert_eq!(hotp(key, 1), "287082");
    }

    #[test]
    fn test_verify_code_accepts_current_step() {
        let secret = generate_secret();
        let key = BASE32_NOPAD.decode(secret.as_bytes()).unwrap();
        let now = 1_700_000_000u64;
        let code = hotp(&key, now / STEP_SECONDS);
        assert!(verify_code(&secret, &code, now).is_ok());
    }

    #[test]
    fn test_verify_code_rejects_stale_code() {
        let secret = generate_secret();
        let key = BASE32_NOPAD.decode(secret.as_bytes()).unwrap();
        let now = 1_700_000_000u64;
        let stale = hotp(&key, now / STEP_SECONDS - 5);
        assert!(verify_code(&secret, &stale, now).is_err());
    }

    #[test]
    fn test_backup_codes_are_unique() {
        let codes = generate_backup_codes();
        assert_eq!(codes.len(), 10);
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), 10);
    }
}
