//! Reply shapes. Every authenticated reply draws its own nonce and proves
//! possession of the client key by carrying a verifier over that nonce; the
//! verifier and all encrypted entry fields are produced when the reply is
//! serialized.

use base64::{engine::general_purpose, Engine as _};
use serde::ser::{Error as _, SerializeStruct};
use serde::{Serialize, Serializer};
use zeroize::Zeroizing;

use crate::crypto::{self, NONCE_SIZE};
use crate::error::CryptoError;
use crate::handshake::VerifiedRequest;
use crate::request::{RequestType, PROTOCOL_VERSION};
use crate::store::LoginEntry;

#[derive(Debug)]
pub enum Response {
    /// The inbound value did not match any known request shape.
    /// Serializes to exactly `{"Success":false}`.
    ProtocolError,
    Failure {
        request_type: RequestType,
        error: Option<String>,
    },
    Authenticated(AuthenticatedResponse),
}

impl Response {
    pub fn failure(request_type: RequestType, error: Option<String>) -> Self {
        Response::Failure { request_type, error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Authenticated(_))
    }
}

enum Body {
    Empty,
    Count(usize),
    Logins(Vec<LoginEntry>),
}

impl Body {
    // Entries carry plaintext secrets, so debug output only shows the shape.
    fn describe(&self) -> String {
        match self {
            Body::Empty => "empty".to_string(),
            Body::Count(count) => format!("count({count})"),
            Body::Logins(list) => format!("logins({})", list.len()),
        }
    }
}

pub struct AuthenticatedResponse {
    request_type: RequestType,
    id: String,
    hash: String,
    nonce: [u8; NONCE_SIZE],
    key: Zeroizing<Vec<u8>>,
    body: Body,
}

impl AuthenticatedResponse {
    pub fn new(request: &VerifiedRequest, hash: String) -> Self {
        Self::with_body(request, hash, Body::Empty)
    }

    pub fn with_count(request: &VerifiedRequest, hash: String, count: usize) -> Self {
        Self::with_body(request, hash, Body::Count(count))
    }

    pub fn with_entries(request: &VerifiedRequest, hash: String, entries: Vec<LoginEntry>) -> Self {
        Self::with_body(request, hash, Body::Logins(entries))
    }

    fn with_body(request: &VerifiedRequest, hash: String, body: Body) -> Self {
        Self {
            request_type: request.request_type(),
            id: request.id().to_string(),
            hash,
            nonce: crypto::create_nonce(),
            key: request.key().clone(),
            body,
        }
    }

    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    fn encrypt_field(&self, plain: &str) -> Result<Option<String>, CryptoError> {
        if plain.is_empty() {
            return Ok(None);
        }
        let ciphertext = crypto::encrypt(&self.key, &self.nonce, plain.as_bytes())?;
        Ok(Some(general_purpose::STANDARD.encode(ciphertext)))
    }

    fn wire_entries(&self, entries: &[LoginEntry]) -> Result<Vec<WireEntry>, CryptoError> {
        entries
            .iter()
            .map(|entry| {
                let string_fields = entry
                    .string_fields
                    .iter()
                    .map(|field| {
                        Ok(WireField {
                            key: self.encrypt_field(&field.key)?,
                            value: self.encrypt_field(&field.value)?,
                        })
                    })
                    .collect::<Result<Vec<_>, CryptoError>>()?;
                Ok(WireEntry {
                    login: self.encrypt_field(&entry.login)?,
                    password: self.encrypt_field(&entry.password)?,
                    uuid: self.encrypt_field(&entry.uuid)?,
                    name: self.encrypt_field(&entry.name)?,
                    string_fields,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for AuthenticatedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedResponse")
            .field("request_type", &self.request_type)
            .field("id", &self.id)
            .field("hash", &self.hash)
            .field("body", &self.body.describe())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireResponse<'a> {
    request_type: RequestType,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    success: bool,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entries: Option<Vec<WireEntry>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireEntry {
    login: Option<String>,
    password: Option<String>,
    uuid: Option<String>,
    name: Option<String>,
    string_fields: Vec<WireField>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireField {
    key: Option<String>,
    value: Option<String>,
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Response::ProtocolError => {
                let mut s = serializer.serialize_struct("ProtocolError", 1)?;
                s.serialize_field("Success", &false)?;
                s.end()
            }
            Response::Failure {
                request_type,
                error,
            } => WireResponse {
                request_type: *request_type,
                error: error.as_deref(),
                success: false,
                version: PROTOCOL_VERSION,
                id: None,
                hash: None,
                nonce: None,
                verifier: None,
                count: None,
                entries: None,
            }
            .serialize(serializer),
            Response::Authenticated(auth) => auth.serialize(serializer),
        }
    }
}

impl Serialize for AuthenticatedResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let verifier = crypto::create_verifier(&self.key, &self.nonce).map_err(S::Error::custom)?;
        let (count, entries) = match &self.body {
            Body::Empty => (None, None),
            Body::Count(count) => (Some(*count), None),
            Body::Logins(list) => (
                Some(list.len()),
                Some(self.wire_entries(list).map_err(S::Error::custom)?),
            ),
        };
        WireResponse {
            request_type: self.request_type,
            error: None,
            success: true,
            version: PROTOCOL_VERSION,
            id: Some(&self.id),
            hash: Some(&self.hash),
            nonce: Some(general_purpose::STANDARD.encode(self.nonce)),
            verifier: Some(general_purpose::STANDARD.encode(verifier)),
            count,
            entries,
        }
        .serialize(serializer)
    }
}
