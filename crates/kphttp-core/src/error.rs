use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid cipher parameters: key must be 32 bytes and nonce 16 bytes")]
    InvalidParams,

    #[error("Decryption failed (bad padding or wrong key)")]
    Decrypt,

    #[error("Decrypted value is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

/// Failures of a single protocol exchange. The `Display` text is what ends up
/// in the `Error` field of the failure response, so it must never carry key
/// material or decrypted values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Missing Key attribute")]
    MissingKey,

    #[error("Associate request has been rejected")]
    AssociationRejected,

    #[error("Missing required attributes")]
    MissingAttributes,

    #[error("Request failed verification")]
    VerificationFailed,

    #[error("Missing required login fields")]
    MissingLoginFields,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("bind failed: {0}")]
    Bind(#[from] std::io::Error),

    #[error("listen attempt cancelled by close()")]
    Cancelled,

    #[error("listener already active")]
    AlreadyActive,
}
