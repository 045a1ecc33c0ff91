//! JWK to PEM conversion.
//!
//! A fetched RSA JWK carries its modulus and public exponent as base64url
//! big-endian integers. Signature verification wants a `SubjectPublicKeyInfo`
//! structure, so this module builds the ASN.1 DER encoding from scratch and
//! wraps it in PEM:
//!
//! ```text
//! SEQUENCE {
//!   SEQUENCE { OID rsaEncryption, NULL }    -- fixed algorithm identifier
//!   BIT STRING {
//!     SEQUENCE { INTEGER n, INTEGER e }     -- RSAPublicKey
//!   }
//! }
//! ```
//!
//! Everything here is a pure byte transformation with no I/O.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use thiserror::Error;

use super::jwks::Jwk;

/// Why a JWK could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyConversionError {
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),
    #[error("key is missing component '{0}'")]
    MissingComponent(&'static str),
    #[error("key component '{0}' is not valid base64url")]
    InvalidEncoding(&'static str),
}

/// Fixed DER block for `AlgorithmIdentifier { rsaEncryption, NULL }`.
const RSA_ALGORITHM_ID: [u8; 15] = [
    0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, 0x05, 0x00,
];

/// DER length octets: short form below 128, long form with a
/// count-of-length-bytes prefix otherwise. RSA key material never exceeds
/// two length bytes.
fn encode_der_length(length: usize) -> Vec<u8> {
    if length < 128 {
        vec![length as u8]
    } else if length < 256 {
        vec![0x81, length as u8]
    } else {
        vec![0x82, (length >> 8) as u8, (length & 0xff) as u8]
    }
}

/// DER INTEGER from an unsigned big-endian byte string.
///
/// Redundant leading zeros are stripped for minimal encoding, then a single
/// zero is re-inserted when the high bit is set so the value stays
/// non-negative.
fn encode_der_integer(bytes: &[u8]) -> Vec<u8> {
    let mut start = 0;
    while start + 1 < bytes.len() && bytes[start] == 0 {
        start += 1;
    }
    let trimmed: &[u8] = if bytes.is_empty() { &[0] } else { &bytes[start..] };

    let needs_leading_zero = trimmed[0] & 0x80 != 0;
    let content_len = trimmed.len() + usize::from(needs_leading_zero);

    let mut out = vec![0x02];
    out.extend_from_slice(&encode_der_length(content_len));
    if needs_leading_zero {
        out.push(0x00);
    }
    out.extend_from_slice(trimmed);
    out
}

/// DER `SubjectPublicKeyInfo` for an RSA public key given its modulus and
/// exponent as unsigned big-endian byte strings.
pub(crate) fn rsa_spki_der(modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
    // RSAPublicKey ::= SEQUENCE { n INTEGER, e INTEGER }
    let mut key_content = encode_der_integer(modulus);
    key_content.extend_from_slice(&encode_der_integer(exponent));

    let mut key_sequence = vec![0x30];
    key_sequence.extend_from_slice(&encode_der_length(key_content.len()));
    key_sequence.extend_from_slice(&key_content);

    // BIT STRING with zero unused bits.
    let mut bit_string = vec![0x03];
    bit_string.extend_from_slice(&encode_der_length(key_sequence.len() + 1));
    bit_string.push(0x00);
    bit_string.extend_from_slice(&key_sequence);

    let mut spki_content = RSA_ALGORITHM_ID.to_vec();
    spki_content.extend_from_slice(&bit_string);

    let mut der = vec![0x30];
    der.extend_from_slice(&encode_der_length(spki_content.len()));
    der.extend_from_slice(&spki_content);
    der
}

fn pem_encode(der: &[u8]) -> String {
    let b64 = STANDARD.encode(der);
    let mut pem = String::with_capacity(b64.len() + b64.len() / 64 + 64);
    pem.push_str("-----BEGIN PUBLIC KEY-----\n");
    for chunk in b64.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----");
    pem
}

/// Convert an RSA JWK into a PEM-encoded `SubjectPublicKeyInfo`.
pub fn jwk_to_pem(jwk: &Jwk) -> Result<String, KeyConversionError> {
    if jwk.kty != "RSA" {
        return Err(KeyConversionError::UnsupportedKeyType(jwk.kty.clone()));
    }
    let n = jwk
        .n
        .as_deref()
        .ok_or(KeyConversionError::MissingComponent("n"))?;
    let e = jwk
        .e
        .as_deref()
        .ok_or(KeyConversionError::MissingComponent("e"))?;

    let modulus = URL_SAFE_NO_PAD
        .decode(n.as_bytes())
        .map_err(|_| KeyConversionError::InvalidEncoding("n"))?;
    let exponent = URL_SAFE_NO_PAD
        .decode(e.as_bytes())
        .map_err(|_| KeyConversionError::InvalidEncoding("e"))?;

    Ok(pem_encode(&rsa_spki_der(&modulus, &exponent)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::DecodingKey;

    // 2048-bit modulus of a published RSA signing key, base64url.
    const SAMPLE_N: &str = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";

    fn rsa_jwk(n: &str, e: &str) -> Jwk {
        Jwk {
            kid: "test-key".to_string(),
            kty: "RSA".to_string(),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            n: Some(n.to_string()),
            e: Some(e.to_string()),
        }
    }

    #[test]
    fn test_der_length_forms() {
        assert_eq!(encode_der_length(5), vec![0x05]);
        assert_eq!(encode_der_length(127), vec![0x7f]);
        assert_eq!(encode_der_length(128), vec![0x81, 0x80]);
        assert_eq!(encode_der_length(255), vec![0x81, 0xff]);
        assert_eq!(encode_der_length(256), vec![0x82, 0x01, 0x00]);
        assert_eq!(encode_der_length(65535), vec![0x82, 0xff, 0xff]);
    }

    #[test]
    fn test_der_integer_high_bit_padding() {
        // High bit clear: encoded as-is.
        assert_eq!(encode_der_integer(&[0x7f]), vec![0x02, 0x01, 0x7f]);
        // High bit set: a zero byte keeps the INTEGER non-negative.
        assert_eq!(encode_der_integer(&[0x80]), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(
            encode_der_integer(&[0xff, 0x01]),
            vec![0x02, 0x03, 0x00, 0xff, 0x01]
        );
    }

    #[test]
    fn test_der_integer_strips_redundant_zeros() {
        assert_eq!(encode_der_integer(&[0x00, 0x80]), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(encode_der_integer(&[0x00, 0x00, 0x01]), vec![0x02, 0x01, 0x01]);
        assert_eq!(encode_der_integer(&[0x00]), vec![0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_der_integer_long_form() {
        let modulus = [0xffu8; 256];
        let encoded = encode_der_integer(&modulus);
        // 256 value bytes + 1 leading zero = 257 content bytes.
        assert_eq!(&encoded[..5], &[0x02, 0x82, 0x01, 0x01, 0x00]);
        assert_eq!(encoded.len(), 5 + 256);
    }

    #[test]
    fn test_spki_der_exact_bytes() {
        // Small enough to verify byte-for-byte by hand.
        let der = rsa_spki_der(&[0x01, 0x02, 0x03], &[0x01, 0x00, 0x01]);
        let expected = [
            0x30, 0x1e, // SubjectPublicKeyInfo
            0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01,
            0x05, 0x00, // AlgorithmIdentifier
            0x03, 0x0d, 0x00, // BIT STRING, no unused bits
            0x30, 0x0a, // RSAPublicKey
            0x02, 0x03, 0x01, 0x02, 0x03, // n
            0x02, 0x03, 0x01, 0x00, 0x01, // e
        ];
        assert_eq!(der, expected);
    }

    #[test]
    fn test_pem_formatting() {
        let pem = jwk_to_pem(&rsa_jwk(SAMPLE_N, "AQAB")).unwrap();
        let mut lines = pem.lines();
        assert_eq!(lines.next(), Some("-----BEGIN PUBLIC KEY-----"));
        let body: Vec<&str> = pem
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect();
        assert!(!body.is_empty());
        assert!(body.iter().all(|l| l.len() <= 64));
        assert!(pem.ends_with("-----END PUBLIC KEY-----"));

        // The base64 body must decode back to the same DER.
        let der = STANDARD.decode(body.concat()).unwrap();
        assert_eq!(der[0], 0x30);
    }

    #[test]
    fn test_known_key_parses_as_public_key() {
        // The produced PEM must be accepted by the signature library's
        // own parser; this catches any length or padding slip.
        let pem = jwk_to_pem(&rsa_jwk(SAMPLE_N, "AQAB")).unwrap();
        assert!(DecodingKey::from_rsa_pem(pem.as_bytes()).is_ok());
    }

    #[test]
    fn test_rejects_non_rsa_keys() {
        let mut jwk = rsa_jwk(SAMPLE_N, "AQAB");
        jwk.kty = "EC".to_string();
        assert_eq!(
            jwk_to_pem(&jwk),
            Err(KeyConversionError::UnsupportedKeyType("EC".to_string()))
        );
    }

    #[test]
    fn test_rejects_missing_or_bad_components() {
        let mut jwk = rsa_jwk(SAMPLE_N, "AQAB");
        jwk.e = None;
        assert_eq!(
            jwk_to_pem(&jwk),
            Err(KeyConversionError::MissingComponent("e"))
        );

        let bad = rsa_jwk("not base64url!!", "AQAB");
        assert_eq!(
            jwk_to_pem(&bad),
            Err(KeyConversionError::InvalidEncoding("n"))
        );
    }
}
