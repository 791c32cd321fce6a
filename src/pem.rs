// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! PEM encoding and decoding for certificates, certificate requests and RSA
//! private keys.

use crate::error::{Error, Result};
use ::pem::{EncodeConfig, LineEnding, Pem};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The kinds of PEM block this crate reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemKind {
    Certificate,
    CertificateRequest,
    /// PKCS#1 RSA private key.
    RsaPrivateKey,
}

impl PemKind {
    pub fn tag(self) -> &'static str {
        match self {
            PemKind::Certificate => "CERTIFICATE",
            PemKind::CertificateRequest => "CERTIFICATE REQUEST",
            PemKind::RsaPrivateKey => "RSA PRIVATE KEY",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CERTIFICATE" => Some(PemKind::Certificate),
            "CERTIFICATE REQUEST" => Some(PemKind::CertificateRequest),
            "RSA PRIVATE KEY" => Some(PemKind::RsaPrivateKey),
            _ => None,
        }
    }
}

pub fn encode(kind: PemKind, der: &[u8]) -> String {
    let block = Pem::new(kind.tag(), der.to_vec());
    ::pem::encode_config(&block, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

/// Decode the first PEM block in `data`.
pub fn decode(data: impl AsRef<[u8]>) -> Result<(PemKind, Vec<u8>)> {
    let data = data.as_ref();
    if data.is_empty() {
        return Err(Error::InvalidPem("no PEM data".into()));
    }

    let block = ::pem::parse(data).map_err(|e| Error::InvalidPem(e.to_string()))?;
    let kind = PemKind::from_tag(block.tag())
        .ok_or_else(|| Error::InvalidPem(format!("unexpected PEM block {}", block.tag())))?;

    Ok((kind, block.into_contents()))
}

/// Decode the first PEM block in `data`, requiring it to be of `expected` kind.
pub fn decode_kind(data: impl AsRef<[u8]>, expected: PemKind) -> Result<Vec<u8>> {
    let (kind, der) = decode(data)?;
    if kind != expected {
        return Err(Error::InvalidPem(format!(
            "expected {}, got {}",
            expected.tag(),
            kind.tag()
        )));
    }
    Ok(der)
}

/// PEM-encoded private key material.
///
/// The backing buffer is wiped when the value is dropped or [`wipe`]d.
///
/// [`wipe`]: KeyMaterial::wipe
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    pub fn new(pem: impl Into<String>) -> Self {
        Self(pem.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrite the key bytes now rather than at drop time.
    pub fn wipe(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}
