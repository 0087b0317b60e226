//! HMAC-SHA256 webhook signatures

use crate::error::WebhookError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the base64 signature of the raw request body
pub const SIGNATURE_HEADER: &str = "x-xero-signature";

/// Base64 HMAC-SHA256 of `body` keyed with `key`
pub fn sign(body: &[u8], key: &[u8]) -> Result<String, WebhookError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| WebhookError::InvalidKey)?;
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Check `signature` against the signature of `body`.
///
/// The comparison runs in constant time over the encoded signatures and the header value
/// must match exactly; an absent signature is rejected like a wrong one.
pub fn verify_signature(
    body: &[u8],
    signature: Option<&str>,
    key: &[u8],
) -> Result<(), WebhookError> {
    let signature = signature.ok_or(WebhookError::MissingSignature)?;
    let expected = sign(body, key)?;
    if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}
