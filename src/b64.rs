//! Standard Base64 (RFC 4648 alphabet, `=` padding)
//!
//! Decoding accumulates 6-bit groups into big-endian 32-bit words and then
//! flattens the words back into bytes, including a final partial word of
//! 1-3 bytes. The logical end of the data is the first padding symbol.
//!
//! Unlike a lenient decoder, symbols outside the alphabet are rejected with
//! [`ErrorKind::InvalidEncoding`] instead of decoding to garbage bytes.

use crate::error::{ErrorCategory, ErrorKind, HostError, Result};

/// The 64-symbol standard alphabet.
pub const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Padding symbol.
pub const PAD: u8 = b'=';

/// Sentinel in [`DECODE_TABLE`] for bytes outside the alphabet.
const INVALID: u8 = 0xFF;

const DECODE_TABLE: [u8; 256] = build_decode_table();

const fn build_decode_table() -> [u8; 256] {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

/// Encode bytes as padded standard Base64.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;

        out.push(symbol(triple >> 18));
        out.push(symbol(triple >> 12));
        if chunk.len() > 1 {
            out.push(symbol(triple >> 6));
        } else {
            out.push(PAD as char);
        }
        if chunk.len() > 2 {
            out.push(symbol(triple));
        } else {
            out.push(PAD as char);
        }
    }
    out
}

/// Encode bytes as standard Base64 without trailing padding, as used by the
/// salt and digest fields of an encoded Argon2 hash.
pub fn encode_unpadded(bytes: &[u8]) -> String {
    let mut out = encode(bytes);
    let data_len = out.trim_end_matches(PAD as char).len();
    out.truncate(data_len);
    out
}

/// Encode text as UTF-8, then as padded standard Base64.
pub fn encode_text(text: &str) -> String {
    encode(text.as_bytes())
}

/// Decode standard Base64. Padding is optional; decoding stops at the first `=`.
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    let input = encoded.as_bytes();
    let data_len = input.iter().position(|&b| b == PAD).unwrap_or(input.len());

    let mut words: Vec<u32> = Vec::with_capacity(data_len / 5 + 1);
    let mut n_bytes: usize = 0;
    let mut prev: u32 = 0;

    for (i, &b) in input[..data_len].iter().enumerate() {
        let value = DECODE_TABLE[b as usize];
        if value == INVALID {
            return Err(HostError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidEncoding,
                format!("invalid base64 symbol {:?} at offset {}", b as char, i),
            ));
        }
        let value = value as u32;

        let phase = (i % 4) as u32;
        if phase != 0 {
            let high = prev << (phase * 2);
            let low = value >> (6 - phase * 2);
            let byte = (high | low) & 0xFF;

            let word = n_bytes / 4;
            if word == words.len() {
                words.push(0);
            }
            words[word] |= byte << (24 - (n_bytes % 4) * 8);
            n_bytes += 1;
        }
        prev = value;
    }

    // A lone trailing symbol carries no whole byte; unused low bits must be zero.
    let unused_bits = match data_len % 4 {
        1 => {
            return Err(HostError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidEncoding,
                format!("truncated base64 input: {} symbols", data_len),
            ));
        }
        2 => 4,
        3 => 2,
        _ => 0,
    };
    if prev & ((1 << unused_bits) - 1) != 0 {
        return Err(HostError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidEncoding,
            "non-canonical base64: trailing bits are not zero",
        ));
    }

    Ok(words_to_bytes(&words, n_bytes))
}

fn symbol(sextet: u32) -> char {
    ALPHABET[(sextet & 0x3F) as usize] as char
}

/// Flatten big-endian words into exactly `len` bytes.
fn words_to_bytes(words: &[u32], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut remaining = len;
    for word in words {
        let take = remaining.min(4);
        out.extend_from_slice(&word.to_be_bytes()[..take]);
        remaining -= take;
        if remaining == 0 {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine, engine::general_purpose::STANDARD};

    #[test]
    fn test_known_vectors() {
        assert_eq!(encode(b""), "");
        assert_eq!(encode(b"f"), "Zg==");
        assert_eq!(encode(b"fo"), "Zm8=");
        assert_eq!(encode(b"foo"), "Zm9v");
        assert_eq!(encode(b"foob"), "Zm9vYg==");
        assert_eq!(encode(b"fooba"), "Zm9vYmE=");
        assert_eq!(encode(b"foobar"), "Zm9vYmFy");
    }

    #[test]
    fn test_decode_known_vectors() {
        assert_eq!(decode("").unwrap(), b"");
        assert_eq!(decode("Zg==").unwrap(), b"f");
        assert_eq!(decode("Zm8=").unwrap(), b"fo");
        assert_eq!(decode("Zm9v").unwrap(), b"foo");
        assert_eq!(decode("Zm9vYmFy").unwrap(), b"foobar");
    }

    #[test]
    fn test_round_trip_all_lengths() {
        for len in 0..=1000usize {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 31 + len) as u8).collect();
            let encoded = encode(&bytes);
            assert_eq!(encoded.len() % 4, 0, "length {}", len);
            assert_eq!(decode(&encoded).unwrap(), bytes, "length {}", len);
        }
    }

    #[test]
    fn test_matches_base64_crate() {
        let bytes: Vec<u8> = (0..=255).collect();
        for end in [0, 1, 2, 3, 17, 64, 255, 256] {
            assert_eq!(encode(&bytes[..end]), STANDARD.encode(&bytes[..end]));
        }
        assert_eq!(encode(&bytes), STANDARD.encode(&bytes));
    }

    #[test]
    fn test_decode_stops_at_first_padding() {
        assert_eq!(decode("Zg==Zm9v").unwrap(), b"f");
    }

    #[test]
    fn test_decode_without_padding() {
        assert_eq!(decode("Zg").unwrap(), b"f");
        assert_eq!(decode("Zm8").unwrap(), b"fo");
    }

    #[test]
    fn test_unpadded() {
        assert_eq!(encode_unpadded(b"f"), "Zg");
        assert_eq!(encode_unpadded(b"fo"), "Zm8");
        assert_eq!(encode_unpadded(b"foo"), "Zm9v");
        assert_eq!(encode_unpadded(b"somesalt"), "c29tZXNhbHQ");
    }

    #[test]
    fn test_encode_text() {
        assert_eq!(encode_text("foo"), "Zm9v");
        // Multi-byte UTF-8 is encoded byte-wise.
        assert_eq!(encode_text("é"), "w6k=");
    }

    #[test]
    fn test_invalid_symbol_rejected() {
        let err = decode("Zm9v$A==").expect_err("expected invalid encoding");
        assert_eq!(err.kind, Some(ErrorKind::InvalidEncoding));

        let err = decode("Zm 9v").expect_err("whitespace is not part of the alphabet");
        assert_eq!(err.kind, Some(ErrorKind::InvalidEncoding));
    }

    #[test]
    fn test_dangling_symbol_rejected() {
        let err = decode("Zm9vY").expect_err("a single trailing symbol is not a byte");
        assert_eq!(err.kind, Some(ErrorKind::InvalidEncoding));

        let err = decode("Z===").expect_err("a single symbol before padding is not a byte");
        assert_eq!(err.kind, Some(ErrorKind::InvalidEncoding));
    }

    #[test]
    fn test_non_canonical_trailing_bits_rejected() {
        let err = decode("Zh==").expect_err("low bits of the last symbol must be zero");
        assert_eq!(err.kind, Some(ErrorKind::InvalidEncoding));

        let err = decode("Zm9=").expect_err("low bits of the last symbol must be zero");
        assert_eq!(err.kind, Some(ErrorKind::InvalidEncoding));

        assert_eq!(decode("Zg==").unwrap(), b"f");
        assert_eq!(decode("Zm8=").unwrap(), b"fo");
    }

    #[test]
    fn test_url_safe_symbols_rejected() {
        let err = decode("-_8=").expect_err("url-safe alphabet is not accepted");
        assert_eq!(err.kind, Some(ErrorKind::InvalidEncoding));
    }

    #[test]
    fn test_garbage_after_padding_ignored() {
        assert_eq!(decode("Zm8=!!").unwrap(), b"fo");
    }
}
