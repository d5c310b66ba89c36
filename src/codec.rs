//! Payload Codec
//!
//! Byte-level helpers shared by the classifier and materializer: strict hex
//! and UTF-8 decoding, content hashing, data-URI parsing, and ESIP-7 gzip
//! canonicalization. Identity is always computed over the canonical URI.

use base64::Engine;
use flate2::read::GzDecoder;
use sha2::{Digest as Sha2Digest, Sha256};
use sha3::{Digest as Sha3Digest, Keccak256};
use std::io::Read;

use crate::error::{IndexerError, IndexerResult};

/// Decode a `0x`-prefixed hex string. Rejects empty input, a bare `0x`,
/// odd lengths and non-hex characters.
pub fn hex_to_bytes(s: &str) -> IndexerResult<Vec<u8>> {
    let stripped = s
        .strip_prefix("0x")
        .ok_or_else(|| IndexerError::Decode(format!("missing 0x prefix: {:.16}", s)))?;
    if stripped.is_empty() {
        return Err(IndexerError::Decode("empty hex payload".to_string()));
    }
    Ok(hex::decode(stripped)?)
}

/// Strict UTF-8 decode; `None` on any invalid sequence.
pub fn to_utf8(bytes: &[u8]) -> Option<String> {
    String::from_utf8(bytes.to_vec()).ok()
}

/// `0x` + lowercase hex SHA-256 of the input.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("0x{}", hex::encode(hasher.finalize()))
}

/// `0x` + lowercase hex Keccak-256 of the input. Used for log topic
/// signatures.
pub fn keccak256_hex(bytes: &[u8]) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    format!("0x{}", hex::encode(hasher.finalize()))
}

/// Parse a `0x`-prefixed EVM quantity into a u64.
pub fn parse_quantity(s: &str) -> IndexerResult<u64> {
    let stripped = s
        .strip_prefix("0x")
        .ok_or_else(|| IndexerError::Decode(format!("quantity missing 0x prefix: {}", s)))?;
    u64::from_str_radix(stripped, 16)
        .map_err(|e| IndexerError::Decode(format!("bad quantity {}: {}", s, e)))
}

/// Recover the address from a right-padded 32-byte topic: the trailing
/// 20 bytes, lowercased.
pub fn topic_to_address(topic: &str) -> Option<String> {
    let stripped = topic.strip_prefix("0x")?;
    if stripped.len() != 64 {
        return None;
    }
    Some(format!("0x{}", stripped[24..].to_lowercase()))
}

/// Decode a standard ABI-encoded string from log data: a 32-byte offset,
/// a 32-byte length, then the bytes.
pub fn abi_decode_string(data: &[u8]) -> Option<String> {
    if data.len() < 64 {
        return None;
    }
    let offset = u64::from_be_bytes(data[24..32].try_into().ok()?) as usize;
    if data.len() < offset + 32 {
        return None;
    }
    let len = u64::from_be_bytes(data[offset + 24..offset + 32].try_into().ok()?) as usize;
    let start = offset + 32;
    if data.len() < start + len {
        return None;
    }
    to_utf8(&data[start..start + len])
}

/// A parsed `data:` URI. `params` is everything between the first `;` and
/// the `,`, split on `;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    pub params: Vec<String>,
    pub body: String,
    pub is_base64: bool,
}

impl DataUri {
    /// Effective MIME type, defaulting to `text/plain`.
    pub fn content_type(&self) -> String {
        if self.mime.is_empty() {
            "text/plain".to_string()
        } else {
            self.mime.clone()
        }
    }

    /// Raw body bytes: base64-decoded when the `base64` param is present,
    /// the literal body bytes otherwise.
    pub fn body_bytes(&self) -> Option<Vec<u8>> {
        if self.is_base64 {
            base64::engine::general_purpose::STANDARD
                .decode(self.body.as_bytes())
                .ok()
        } else {
            Some(self.body.as_bytes().to_vec())
        }
    }

    /// Reassemble the URI from its parts.
    pub fn to_uri(&self) -> String {
        let mut header = self.mime.clone();
        for p in &self.params {
            header.push(';');
            header.push_str(p);
        }
        format!("data:{},{}", header, self.body)
    }
}

/// Parse a data URI. `None` unless the input starts with the literal
/// prefix `data:` and contains a `,` separator.
pub fn parse_data_uri(s: &str) -> Option<DataUri> {
    let rest = s.strip_prefix("data:")?;
    let comma = rest.find(',')?;
    let (header, body) = (&rest[..comma], &rest[comma + 1..]);

    let mut parts = header.split(';');
    let mime = parts.next().unwrap_or_default().to_string();
    let params: Vec<String> = parts.map(|p| p.to_string()).collect();
    let is_base64 = params.iter().any(|p| p == "base64");

    Some(DataUri {
        mime,
        params,
        body: body.to_string(),
        is_base64,
    })
}

/// ESIP-6 opt-in: the literal substring anywhere in the (original,
/// pre-canonicalization) URI.
pub fn has_rule_esip6(uri: &str) -> bool {
    uri.contains("rule=esip6")
}

/// ESIP-7 canonicalization. When the URI carries a `gzip` param, inflate
/// the body and re-encode it (in the payload's original encoding) as a URI
/// without the `gzip` param; identity is taken over this form. Inflation
/// failure falls through to the original URI unchanged. Idempotent: the
/// output never carries a `gzip` param.
pub fn canonicalize_uri(uri: &str) -> String {
    let parsed = match parse_data_uri(uri) {
        Some(p) => p,
        None => return uri.to_string(),
    };
    if !parsed.params.iter().any(|p| p == "gzip") {
        return uri.to_string();
    }

    let compressed = match parsed.body_bytes() {
        Some(b) => b,
        None => return uri.to_string(),
    };

    let mut inflated = Vec::new();
    let mut decoder = GzDecoder::new(compressed.as_slice());
    if decoder.read_to_end(&mut inflated).is_err() {
        return uri.to_string();
    }

    let body = if parsed.is_base64 {
        base64::engine::general_purpose::STANDARD.encode(&inflated)
    } else {
        match to_utf8(&inflated) {
            Some(text) => text,
            None => return uri.to_string(),
        }
    };

    let canonical = DataUri {
        mime: parsed.mime,
        params: parsed
            .params
            .into_iter()
            .filter(|p| p != "gzip")
            .collect(),
        body,
        is_base64: parsed.is_base64,
    };
    canonical.to_uri()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_hex_to_bytes_strict() {
        assert_eq!(hex_to_bytes("0x68690a").unwrap(), b"hi\n");
        assert!(hex_to_bytes("0x").is_err());
        assert!(hex_to_bytes("").is_err());
        assert!(hex_to_bytes("68690a").is_err());
        assert!(hex_to_bytes("0xzz").is_err());
        assert!(hex_to_bytes("0x123").is_err());
    }

    #[test]
    fn test_to_utf8_rejects_invalid() {
        assert_eq!(to_utf8(b"hello").as_deref(), Some("hello"));
        assert!(to_utf8(&[0xff, 0xfe]).is_none());
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        // sha256("data:,hello")
        assert_eq!(
            sha256_hex(b"data:,hello"),
            "0x06c84f230c1ff90bd6aa50ec631cf556ca2a6da0cd6ff07ce61acecd5afb2012"
        );
    }

    #[test]
    fn test_keccak_topic_signatures() {
        // The three event signatures the log classifier keys on.
        assert_eq!(
            keccak256_hex(b"ethscriptions_protocol_TransferEthscription(address,bytes32)"),
            "0xf30861289185032f511ff94a8127e470f3d0e6230be4925cb6fad33f3436dffb",
        );
        assert_eq!(
            keccak256_hex(
                b"ethscriptions_protocol_TransferEthscriptionForPreviousOwner(address,address,bytes32)"
            ),
            "0xf1d95ed4d1680e6f665104f19c296ae52c1f64cd8114e84d55dc6349dbdafea3",
        );
        assert_eq!(
            keccak256_hex(b"ethscriptions_protocol_CreateEthscription(address,string)"),
            "0x665fba0baf3dc33e9943340197893ac16f56482c2defb8de60f944987fee451c",
        );
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert!(parse_quantity("26").is_err());
    }

    #[test]
    fn test_topic_to_address() {
        let topic = "0x000000000000000000000000AABBccddeeff00112233445566778899aabbCCDD";
        assert_eq!(
            topic_to_address(topic).unwrap(),
            "0xaabbccddeeff00112233445566778899aabbccdd"
        );
        assert!(topic_to_address("0x1234").is_none());
    }

    #[test]
    fn test_abi_decode_string() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0u8; 24]);
        data.extend_from_slice(&32u64.to_be_bytes());
        data.extend_from_slice(&[0u8; 24]);
        data.extend_from_slice(&(9u64).to_be_bytes());
        data.extend_from_slice(b"data:,xyz");
        data.extend_from_slice(&[0u8; 23]); // right padding
        assert_eq!(abi_decode_string(&data).as_deref(), Some("data:,xyz"));
        assert!(abi_decode_string(&data[..40]).is_none());
    }

    #[test]
    fn test_parse_data_uri() {
        let uri = parse_data_uri("data:application/json;rule=esip6;base64,eyJ9").unwrap();
        assert_eq!(uri.mime, "application/json");
        assert_eq!(uri.params, vec!["rule=esip6", "base64"]);
        assert!(uri.is_base64);
        assert_eq!(uri.body, "eyJ9");

        let bare = parse_data_uri("data:,hello").unwrap();
        assert_eq!(bare.content_type(), "text/plain");
        assert_eq!(bare.body, "hello");

        assert!(parse_data_uri("notdata:,x").is_none());
        assert!(parse_data_uri("data:no-comma").is_none());
    }

    #[test]
    fn test_rule_esip6_substring() {
        assert!(has_rule_esip6("data:,foo;rule=esip6"));
        assert!(has_rule_esip6("data:text/plain;rule=esip6,foo"));
        assert!(!has_rule_esip6("data:,foo"));
    }

    #[test]
    fn test_canonicalize_strips_gzip() {
        let compressed = gzip(b"hello world");
        let b64 = base64::engine::general_purpose::STANDARD.encode(&compressed);
        let uri = format!("data:text/plain;gzip;base64,{}", b64);

        let canonical = canonicalize_uri(&uri);
        let expected_body = base64::engine::general_purpose::STANDARD.encode(b"hello world");
        assert_eq!(
            canonical,
            format!("data:text/plain;base64,{}", expected_body)
        );

        // Canonicalization is idempotent.
        assert_eq!(canonicalize_uri(&canonical), canonical);
    }

    #[test]
    fn test_canonicalize_bad_gzip_falls_through() {
        let uri = "data:text/plain;gzip;base64,bm90Z3ppcA==";
        assert_eq!(canonicalize_uri(uri), uri);
    }

    #[test]
    fn test_canonicalize_without_gzip_is_identity() {
        let uri = "data:,plain body";
        assert_eq!(canonicalize_uri(uri), uri);
    }
}
