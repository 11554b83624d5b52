//! Request signing for the resolution service.
//!
//! Each request carries a millisecond timestamp, a random 32-letter
//! nonce and the nonce Vigenère-encrypted with a key derived from the
//! timestamp (digit `d` becomes letter `a + d`).

use rand::Rng;

pub const TIMESTAMP_HEADER: &str = "X-Timestamp";
pub const NONCE_HEADER: &str = "X-GCLT-Text";
pub const SIGNATURE_HEADER: &str = "X-EGCT-Text";

const NONCE_LEN: usize = 32;
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// The three signing header values for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
}

impl SignedHeaders {
    /// Sign with the given Unix millisecond timestamp and a fresh nonce.
    pub fn generate(timestamp_ms: i64) -> Self {
        let timestamp = timestamp_ms.to_string();
        let nonce = random_letters(NONCE_LEN);
        let signature = vigenere_encrypt(&nonce, &timestamp_to_key(&timestamp));
        Self {
            timestamp,
            nonce,
            signature,
        }
    }
}

/// Map each decimal digit to a lowercase letter; anything else becomes `?`.
pub fn timestamp_to_key(timestamp: &str) -> String {
    timestamp
        .chars()
        .map(|c| match c.to_digit(10) {
            Some(d) => (b'a' + d as u8) as char,
            None => '?',
        })
        .collect()
}

/// Vigenère shift over ASCII letters, preserving case. Non-letters pass
/// through and do not advance the key.
pub fn vigenere_encrypt(text: &str, key: &str) -> String {
    let shifts: Vec<i32> = key
        .to_ascii_lowercase()
        .bytes()
        .map(|b| b as i32 - b'a' as i32)
        .collect();
    if shifts.is_empty() {
        return text.to_string();
    }

    let mut key_index = 0;
    text.chars()
        .map(|c| {
            let base = if c.is_ascii_lowercase() {
                b'a'
            } else if c.is_ascii_uppercase() {
                b'A'
            } else {
                return c;
            };
            let shift = shifts[key_index % shifts.len()];
            key_index += 1;
            let offset = (c as i32 - base as i32 + shift).rem_euclid(26);
            (base + offset as u8) as char
        })
        .collect()
}

/// `n` random ASCII letters.
pub fn random_letters(n: usize) -> String {
    let mut rng = rand::rng();
    (0..n)
        .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_to_key() {
        assert_eq!(timestamp_to_key("0123456789"), "abcdefghij");
        assert_eq!(timestamp_to_key("1x"), "b?");
    }

    #[test]
    fn test_vigenere_encrypt() {
        // key "bcd" shifts by 1, 2, 3
        assert_eq!(vigenere_encrypt("abc", "bcd"), "bdf");
        assert_eq!(vigenere_encrypt("XyZ", "bcd"), "YaC");
        // separators keep the key position
        assert_eq!(vigenere_encrypt("a-b c", "bcd"), "b-d f");
        assert_eq!(vigenere_encrypt("zz", "b"), "aa");
        assert_eq!(vigenere_encrypt("hello", ""), "hello");
    }

    #[test]
    fn test_random_letters() {
        let s = random_letters(32);
        assert_eq!(s.len(), 32);
        assert!(s.bytes().all(|b| b.is_ascii_alphabetic()));
        assert_ne!(s, random_letters(32));
    }

    #[test]
    fn test_signed_headers() {
        let headers = SignedHeaders::generate(1_700_000_000_123);
        assert_eq!(headers.timestamp, "1700000000123");
        assert_eq!(
            headers.signature,
            vigenere_encrypt(&headers.nonce, "bhaaaaaaaabcd")
        );
    }
}
