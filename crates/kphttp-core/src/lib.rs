//! kphttp-core: the KeePassHttp protocol engine.
//!
//! # Module layout
//! - `crypto`: AES-256-CBC field encryption, nonces and challenge verifiers
//! - `request`: the seven request shapes and their classification
//! - `handshake`: verification gate producing `VerifiedRequest`
//! - `response`: reply shapes and per-field encryption
//! - `store`: contracts of the credential store, key store and generator
//! - `protocol`: request dispatch and per-type handlers
//! - `observer`: optional traffic observer
//! - `server`: HTTP listener with bind retry and cancellation
//! - `error`: error types

pub mod crypto;
pub mod error;
pub mod handshake;
pub mod observer;
pub mod protocol;
pub mod request;
pub mod response;
pub mod server;
pub mod store;

pub use error::{CryptoError, ListenError, ProtocolError};
pub use protocol::{KeePassHttpProtocol, Protocol, DEFAULT_PORT};
pub use server::RestServer;
