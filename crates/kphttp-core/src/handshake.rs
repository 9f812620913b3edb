//! Challenge verification. A [`VerifiedRequest`] can only be produced by
//! [`verify`], so any code holding one has already passed the key check.

use base64::{engine::general_purpose, Engine as _};
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{self, NONCE_SIZE};
use crate::error::{CryptoError, ProtocolError};
use crate::request::{RequestHeader, RequestType};
use crate::store::KeyStore;

pub struct VerifiedRequest {
    request_type: RequestType,
    id: String,
    nonce: [u8; NONCE_SIZE],
    key: Zeroizing<Vec<u8>>,
}

impl VerifiedRequest {
    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    pub(crate) fn key(&self) -> &Zeroizing<Vec<u8>> {
        &self.key
    }

    #[cfg(test)]
    pub(crate) fn for_test(request_type: RequestType, id: &str, key: &[u8]) -> Self {
        Self {
            request_type,
            id: id.to_string(),
            nonce: crypto::create_nonce(),
            key: Zeroizing::new(key.to_vec()),
        }
    }

    /// Decrypt an optional base64 ciphertext field with the request's key and
    /// nonce. Absent or empty fields yield `None`.
    pub fn decrypt_field(&self, field: Option<&str>) -> Result<Option<String>, CryptoError> {
        let Some(encoded) = field.filter(|f| !f.is_empty()) else {
            return Ok(None);
        };
        let ciphertext = general_purpose::STANDARD.decode(encoded)?;
        let plain = crypto::decrypt_string(&self.key, &self.nonce, &ciphertext)?;
        Ok(Some(plain))
    }
}

impl std::fmt::Debug for VerifiedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedRequest")
            .field("request_type", &self.request_type)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

pub async fn verify(
    request_type: RequestType,
    header: &RequestHeader,
    client_id: Option<String>,
    key_store: &dyn KeyStore,
) -> Result<VerifiedRequest, ProtocolError> {
    let nonce_b64 = non_empty(header.nonce.as_deref());
    let verifier_b64 = non_empty(header.verifier.as_deref());
    let client_id = client_id.filter(|id| !id.is_empty());
    let (Some(nonce_b64), Some(verifier_b64), Some(id)) = (nonce_b64, verifier_b64, client_id)
    else {
        return Err(ProtocolError::MissingAttributes);
    };

    let key = match key_store.retrieve(&id).await {
        Ok(Some(key)) => key,
        Ok(None) => {
            debug!(client = %id, "no key stored for client");
            return Err(ProtocolError::VerificationFailed);
        }
        Err(err) => {
            debug!(client = %id, error = %err, "key lookup failed");
            return Err(ProtocolError::VerificationFailed);
        }
    };

    let nonce = general_purpose::STANDARD
        .decode(nonce_b64)
        .map_err(|_| ProtocolError::VerificationFailed)?;
    let verifier = general_purpose::STANDARD
        .decode(verifier_b64)
        .map_err(|_| ProtocolError::VerificationFailed)?;
    if !crypto::valid_params(&key, &nonce) {
        debug!(client = %id, "key or nonce has the wrong size");
        return Err(ProtocolError::VerificationFailed);
    }
    if !crypto::verify(&key, &nonce, &verifier) {
        debug!(client = %id, "verifier mismatch");
        return Err(ProtocolError::VerificationFailed);
    }

    let nonce: [u8; NONCE_SIZE] = nonce
        .try_into()
        .map_err(|_| ProtocolError::VerificationFailed)?;
    Ok(VerifiedRequest {
        request_type,
        id,
        nonce,
        key,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
