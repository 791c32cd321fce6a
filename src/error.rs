// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No config specified")]
    NoConfig,

    #[error("Config \"{}\" does not exist", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Config \"{}\" is not a valid CA document: {reason}", path.display())]
    ConfigParse { path: PathBuf, reason: String },

    #[error("Failed to write config {}: {source}", path.display())]
    ConfigWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {}: {source}", path.display())]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("Key generation failed: {0}")]
    KeyGen(String),

    #[error("Certificate creation failed: {0}")]
    CertCreate(#[from] rcgen::Error),

    #[error("Certificate request signature does not verify: {0}")]
    SignatureVerify(String),

    #[error("CA private key does not match its certificate")]
    KeyMismatch,

    #[error("No hosts specified")]
    NoHosts,

    #[error("CA certificate expired at {0}")]
    CaExpired(time::OffsetDateTime),

    #[error("Invalid PEM: {0}")]
    InvalidPem(String),

    #[error("Failed to parse certificate: {0}")]
    CertParse(String),

    #[error("Failed to parse private key: {0}")]
    KeyParse(String),

    #[error("Failed to parse certificate request: {0}")]
    CsrParse(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to render certificate: {0}")]
    Render(#[from] serde_json::Error),

    #[error("Failed to bind to {addr}: {reason}\nIs another process using this port?")]
    BindFailed { addr: String, reason: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of an [`Error`], used to pick HTTP status codes and
/// exit behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing, unreadable or malformed persisted CA, or bad settings.
    Config,
    /// Key generation, certificate creation or signature verification.
    Crypto,
    /// PEM or DER structural problems.
    Decode,
    /// Missing or invalid credentials.
    Auth,
    /// Malformed inbound request.
    Request,
    /// Unknown route.
    NotFound,
    /// Filesystem or socket failure.
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoConfig
            | Error::ConfigNotFound(_)
            | Error::ConfigParse { .. }
            | Error::ConfigRead { .. }
            | Error::ConfigWrite { .. }
            | Error::Config(_) => ErrorKind::Config,
            Error::KeyGen(_)
            | Error::CertCreate(_)
            | Error::SignatureVerify(_)
            | Error::KeyMismatch
            | Error::NoHosts
            | Error::CaExpired(_)
            | Error::Tls(_) => ErrorKind::Crypto,
            Error::InvalidPem(_)
            | Error::CertParse(_)
            | Error::KeyParse(_)
            | Error::CsrParse(_)
            | Error::Render(_) => ErrorKind::Decode,
            Error::Unauthorized => ErrorKind::Auth,
            Error::BadRequest(_) => ErrorKind::Request,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::WriteFile { .. }
            | Error::InvalidPath(_)
            | Error::BindFailed { .. } => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::NoConfig.kind(), ErrorKind::Config);
        let unreadable = Error::ConfigRead {
            path: PathBuf::from("/etc/ca.json"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(unreadable.kind(), ErrorKind::Config);
        assert_eq!(Error::NoHosts.kind(), ErrorKind::Crypto);
        assert_eq!(Error::InvalidPem("x".into()).kind(), ErrorKind::Decode);
        assert_eq!(Error::Unauthorized.kind(), ErrorKind::Auth);
        assert_eq!(Error::BadRequest("x".into()).kind(), ErrorKind::Request);
        assert_eq!(Error::NotFound("/x".into()).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_config_not_found_message() {
        let err = Error::ConfigNotFound(PathBuf::from("/nope/ca.json"));
        assert_eq!(err.to_string(), "Config \"/nope/ca.json\" does not exist");
    }
}
