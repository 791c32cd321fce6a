// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Minimal self-hosted certificate authority.
//!
//! ```rust,no_run
//! use certd::{sign, Ca, Csr};
//! use std::path::Path;
//!
//! let ca = Ca::setup(Path::new("ca.json"))?;
//!
//! let csr = Csr::create("localhost,127.0.0.1")?;
//! let cert = sign(&ca, csr)?;
//! println!("{}", cert.to_json()?);
//! # Ok::<(), certd::Error>(())
//! ```

/// Root CA creation, persistence and loading.
pub mod ca;
/// Leaf certificate issuance and rendering.
pub mod cert;
/// Endpoint settings and credentials.
pub mod config;
/// Certificate signing requests.
pub mod csr;
/// Error types.
pub mod error;
/// Filesystem utilities.
pub mod fs;
/// Host list parsing.
pub mod hosts;
/// PEM encoding and decoding.
pub mod pem;
/// HTTPS issuance endpoint.
pub mod server;
/// X.509 certificate parsing.
pub mod x509;

pub use ca::{Ca, CertificateSource, CA_COMMON_NAME, CA_ORG_NAME};
pub use cert::{sign, Cert, OutputFormat, SerialPolicy, Signer};
pub use config::{Credentials, ServeOptions};
pub use csr::{Csr, VerifiedRequest};
pub use error::{Error, ErrorKind, Result};
pub use hosts::SubjectName;
pub use pem::{KeyMaterial, PemKind};
pub use server::{PeerResolver, Server, SystemResolver};
pub use x509::{parse_cert_pem, CertInfo};
