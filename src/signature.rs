//! GitHub webhook signature verification.
//!
//! GitHub signs every delivery with an HMAC of the raw body keyed by the shared
//! webhook secret. The legacy `X-Hub-Signature` header carries `sha1=<hex>`; newer
//! deliveries also carry `X-Hub-Signature-256` with `sha256=<hex>`. When the
//! SHA-256 header is present it is the one checked.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::error::{Result, WebhookError};

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";
pub const SIGNATURE_256_HEADER: &str = "X-Hub-Signature-256";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
}

impl SignatureAlgorithm {
    fn prefix(self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => "sha1=",
            SignatureAlgorithm::Sha256 => "sha256=",
        }
    }

    fn header(self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => SIGNATURE_HEADER,
            SignatureAlgorithm::Sha256 => SIGNATURE_256_HEADER,
        }
    }
}

/// Parses a signature header value (`sha1=<hex>` or `sha256=<hex>`) into raw bytes.
///
/// Returns `None` for a wrong prefix or invalid hex.
pub fn parse_signature_header(header: &str, algorithm: SignatureAlgorithm) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix(algorithm.prefix())?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC of `payload` keyed by `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8], algorithm: SignatureAlgorithm) -> Vec<u8> {
    match algorithm {
        SignatureAlgorithm::Sha1 => match HmacSha1::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(payload);
                mac.finalize().into_bytes().to_vec()
            }
            Err(_) => Vec::new(),
        },
        SignatureAlgorithm::Sha256 => match HmacSha256::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(payload);
                mac.finalize().into_bytes().to_vec()
            }
            Err(_) => Vec::new(),
        },
    }
}

/// Formats raw signature bytes as a header value, e.g. `sha1=<hex>`.
pub fn format_signature_header(signature: &[u8], algorithm: SignatureAlgorithm) -> String {
    format!("{}{}", algorithm.prefix(), hex::encode(signature))
}

/// Verifies a signature header against the payload and secret.
///
/// The comparison goes through `Mac::verify_slice`, which is constant time.
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &[u8],
    algorithm: SignatureAlgorithm,
) -> bool {
    let expected = match parse_signature_header(signature_header, algorithm) {
        Some(sig) => sig,
        None => return false,
    };

    match algorithm {
        SignatureAlgorithm::Sha1 => match HmacSha1::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(payload);
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
        SignatureAlgorithm::Sha256 => match HmacSha256::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(payload);
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
    }
}

/// Authenticates a delivery from its headers and raw body.
///
/// Fails with `MissingSignature` when neither signature header is present and
/// `InvalidSignature` when the present header does not match.
pub fn authenticate(headers: &HeaderMap, body: &[u8], secret: &str) -> Result<SignatureAlgorithm> {
    let (algorithm, supplied) = [SignatureAlgorithm::Sha256, SignatureAlgorithm::Sha1]
        .into_iter()
        .find_map(|alg| {
            headers
                .get(alg.header())
                .and_then(|v| v.to_str().ok())
                .map(|v| (alg, v))
        })
        .ok_or(WebhookError::MissingSignature)?;

    debug!("Supplied message signature: {}", supplied);

    if verify_signature(body, supplied, secret.as_bytes(), algorithm) {
        info!("Valid message signature found. Request is authenticated.");
        Ok(algorithm)
    } else {
        warn!("Signature verification failed ({} header)", algorithm.header());
        Err(WebhookError::InvalidSignature)
    }
}
