use crate::definitions::cose_key;

/// Errors that can occur when parsing an engagement.
///
/// The variants are deliberately fine-grained: the wallet UI distinguishes
/// "could not connect to reader" from "reader engagement malformed", so each
/// failure mode here maps onto its own user-facing state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("engagement uri does not start with 'mdoc://'")]
    InvalidScheme,
    #[error("engagement uri is not valid base64url: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("engagement payload is not valid CBOR")]
    InvalidCbor,
    #[error("expected engagement version 1.0")]
    UnsupportedVersion,
    #[error("unsupported cipher suite")]
    UnsupportedCipherSuite,
    #[error("unsupported device retrieval method")]
    UnsupportedRetrievalMethod,
    #[error("no BLE service uuid present in either direction")]
    NoServiceUuidFound,
    #[error("no retrieval method supports BLE central client mode")]
    NoCentralClientMode,
    #[error("retrieval method carries no server-to-client uuid")]
    MissingServerToClientUuid,
    #[error("malformed engagement structure")]
    Malformed,
    #[error("invalid COSE key: {0}")]
    CoseKey(#[from] cose_key::Error),
}
