use thiserror::Error;

use crate::{cert::Digest, DecodeError, EncodeError};

/// Failure classes of the security processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    /// malformed or unsupported wire data
    Parse = 1,
    /// time, region, permission or chain constraint violated
    Validation = 2,
    /// trust information from an unpermitted or untrusted signer
    Trust = 3,
    /// failure of the underlying crypto engine
    Crypto = 4,
    /// missing buffer space, pool capacity or data not yet available
    Resource = 5,
}

/// Error type of every operation of the security processor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Parse
    #[error("Decoding error: {0}")]
    Decode(String),
    #[error("Encoding error: {0}")]
    Encode(String),
    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("Unsupported payload type")]
    UnsupportedPayloadType,
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Too many permissions in certificate: {0}")]
    TooManyPermissions(usize),
    #[error("Invalid certificate format: {0}")]
    InvalidCertificateFormat(String),

    // Validation
    #[error("Unknown signer certificate {0}")]
    UnknownSigner(Digest),
    #[error("Unknown issuer certificate {0}")]
    UnknownIssuer(Digest),
    #[error("Signature verification failed")]
    SignatureMismatch,
    #[error("Certificate expired")]
    Expired,
    #[error("Certificate not yet valid")]
    NotYetValid,
    #[error("Message expired")]
    MessageExpired,
    #[error("Message generated in the future")]
    FutureMessage,
    #[error("Position is outside of the certificate region")]
    OutOfRegion,
    #[error("Certificate has no permission for the application")]
    NoPermission,
    #[error("Service specific permissions do not match")]
    SspMismatch,
    #[error("Certificate chain is too long")]
    ChainTooLong,
    #[error("Certificate chain contains a cycle")]
    ChainCycle,
    #[error("Certificate {0} is revoked")]
    Revoked(Digest),
    #[error("Certificate {0} is invalid")]
    InvalidCertificate(Digest),
    #[error("Certificate is inconsistent with its issuer: {0}")]
    InconsistentIssuer(String),
    #[error("No eligible certificate")]
    NoEligibleCertificate,

    // Trust
    #[error("Signer is not permitted to sign trust information")]
    UnauthorizedTrustSigner,
    #[error("Signer of trust information is not trusted")]
    UntrustedTrustSigner,
    #[error("Trust information is outdated")]
    StaleTrustList,
    #[error("Root certificate is not trusted")]
    UnknownRoot,
    #[error("PKI response does not match the request")]
    PkiResponseMismatch,
    #[error("PKI request rejected with response code {0}")]
    PkiResponseRejected(u8),

    // Crypto
    #[error("Crypto engine error: {0}")]
    Crypto(String),
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Key size mismatch")]
    KeySizeMismatch,
    #[error("No matching recipient")]
    UnknownRecipient,
    #[error("Unknown crypto engine {0}")]
    UnknownEngine(String),
    #[error("Private key is not available")]
    MissingPrivateKey,

    // Resource
    #[error("Buffer too small: {required} bytes required, {available} available")]
    BufferTooSmall { required: usize, available: usize },
    #[error("Too many recipients: {0}")]
    TooManyRecipients(usize),
    #[error("Certificate pool is full")]
    PoolFull,
    #[error("Certificate {0} is not available yet")]
    CertificateUnavailable(Digest),
}

const PARSE_MESSAGES: &[&str] = &[
    "decoding error",
    "encoding error",
    "unsupported protocol version",
    "unsupported payload type",
    "unsupported algorithm",
    "too many permissions",
    "invalid certificate format",
];

const VALIDATION_MESSAGES: &[&str] = &[
    "unknown signer certificate",
    "unknown issuer certificate",
    "signature verification failed",
    "certificate expired",
    "certificate not yet valid",
    "message expired",
    "message generated in the future",
    "position is outside of the certificate region",
    "no permission for the application",
    "service specific permissions mismatch",
    "certificate chain is too long",
    "certificate chain contains a cycle",
    "certificate revoked",
    "certificate invalid",
    "certificate inconsistent with its issuer",
    "no eligible certificate",
];

const TRUST_MESSAGES: &[&str] = &[
    "signer is not permitted to sign trust information",
    "signer of trust information is not trusted",
    "trust information is outdated",
    "root certificate is not trusted",
    "PKI response does not match the request",
    "PKI request rejected",
];

const CRYPTO_MESSAGES: &[&str] = &[
    "crypto engine error",
    "decryption failed",
    "key size mismatch",
    "no matching recipient",
    "unknown crypto engine",
    "private key is not available",
];

const RESOURCE_MESSAGES: &[&str] = &[
    "buffer too small",
    "too many recipients",
    "certificate pool is full",
    "certificate is not available yet",
];

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind_and_index().0
    }

    /// Stable numeric error code: `kind << 8 | index`
    #[must_use]
    pub fn code(&self) -> u32 {
        let (kind, index) = self.kind_and_index();
        (kind as u32) << 8 | index
    }

    fn kind_and_index(&self) -> (ErrorKind, u32) {
        use ErrorKind::*;
        match self {
            Error::Decode(_) => (Parse, 0),
            Error::Encode(_) => (Parse, 1),
            Error::UnsupportedVersion(_) => (Parse, 2),
            Error::UnsupportedPayloadType => (Parse, 3),
            Error::UnsupportedAlgorithm(_) => (Parse, 4),
            Error::TooManyPermissions(_) => (Parse, 5),
            Error::InvalidCertificateFormat(_) => (Parse, 6),

            Error::UnknownSigner(_) => (Validation, 0),
            Error::UnknownIssuer(_) => (Validation, 1),
            Error::SignatureMismatch => (Validation, 2),
            Error::Expired => (Validation, 3),
            Error::NotYetValid => (Validation, 4),
            Error::MessageExpired => (Validation, 5),
            Error::FutureMessage => (Validation, 6),
            Error::OutOfRegion => (Validation, 7),
            Error::NoPermission => (Validation, 8),
            Error::SspMismatch => (Validation, 9),
            Error::ChainTooLong => (Validation, 10),
            Error::ChainCycle => (Validation, 11),
            Error::Revoked(_) => (Validation, 12),
            Error::InvalidCertificate(_) => (Validation, 13),
            Error::InconsistentIssuer(_) => (Validation, 14),
            Error::NoEligibleCertificate => (Validation, 15),

            Error::UnauthorizedTrustSigner => (Trust, 0),
            Error::UntrustedTrustSigner => (Trust, 1),
            Error::StaleTrustList => (Trust, 2),
            Error::UnknownRoot => (Trust, 3),
            Error::PkiResponseMismatch => (Trust, 4),
            Error::PkiResponseRejected(_) => (Trust, 5),

            Error::Crypto(_) => (Crypto, 0),
            Error::DecryptionFailed => (Crypto, 1),
            Error::KeySizeMismatch => (Crypto, 2),
            Error::UnknownRecipient => (Crypto, 3),
            Error::UnknownEngine(_) => (Crypto, 4),
            Error::MissingPrivateKey => (Crypto, 5),

            Error::BufferTooSmall { .. } => (Resource, 0),
            Error::TooManyRecipients(_) => (Resource, 1),
            Error::PoolFull => (Resource, 2),
            Error::CertificateUnavailable(_) => (Resource, 3),
        }
    }

    /// `true` for conditions the caller can resolve by fetching data and retrying
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnknownSigner(_)
                | Error::UnknownIssuer(_)
                | Error::CertificateUnavailable(_)
                | Error::StaleTrustList
        )
    }
}

/// Human readable text of a numeric error code
#[must_use]
pub fn error_message(code: u32) -> &'static str {
    let table = match code >> 8 {
        1 => PARSE_MESSAGES,
        2 => VALIDATION_MESSAGES,
        3 => TRUST_MESSAGES,
        4 => CRYPTO_MESSAGES,
        5 => RESOURCE_MESSAGES,
        _ => return "unknown error",
    };
    table
        .get((code & 0xFF) as usize)
        .copied()
        .unwrap_or("unknown error")
}

impl<I> From<DecodeError<I>> for Error {
    fn from(value: DecodeError<I>) -> Self {
        Error::Decode(value.message())
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Error::Encode(value.message().into())
    }
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(value: openssl::error::ErrorStack) -> Self {
        Error::Crypto(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
