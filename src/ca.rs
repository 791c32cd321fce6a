// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::pem::{self, KeyMaterial, PemKind};
use crate::x509::{self, CertInfo};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::path::Path;
use zeroize::Zeroizing;

pub const CA_COMMON_NAME: &str = "CERTD";
pub const CA_ORG_NAME: &str = "CERTD";
pub const CA_ORG_UNIT: &str = "CERTD";
pub const CA_COUNTRY: &str = "IE";
pub const CA_PROVINCE: &str = "Cork";
pub const CA_LOCALITY: &str = "Cork";

/// Size of every RSA key this crate generates.
pub const RSA_BITS: usize = 2048;

/// Validity of a freshly created root.
pub const CA_VALIDITY_DAYS: i64 = 365;

/// Key material a signer can issue certificates from.
///
/// [`Ca`] is the file-backed implementation; other backends only need to
/// hand out the PEM certificate and a signing key.
pub trait CertificateSource {
    /// The PEM-encoded CA certificate, exactly as stored.
    fn certificate_pem(&self) -> &str;

    fn private_key(&self) -> Result<RsaPrivateKey>;

    fn certificate(&self) -> Result<CertInfo> {
        let pem = self.certificate_pem();
        if pem.is_empty() {
            return Err(Error::InvalidPem("no certificate".into()));
        }
        x509::parse_cert_pem(pem)
    }

    /// The private key as an rcgen signing key.
    fn signing_key(&self) -> Result<KeyPair> {
        signing_key_pair(&self.private_key()?)
    }
}

/// Root CA: a self-signed certificate and its RSA private key, both PEM.
///
/// Serialized as the persisted config document `{cert, private_key}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ca {
    #[serde(rename = "cert")]
    cert_pem: String,
    #[serde(rename = "private_key")]
    key_pem: KeyMaterial,
}

impl CertificateSource for Ca {
    fn certificate_pem(&self) -> &str {
        &self.cert_pem
    }

    fn private_key(&self) -> Result<RsaPrivateKey> {
        if self.key_pem.is_empty() {
            return Err(Error::InvalidPem("no private key".into()));
        }
        decode_rsa_key(&self.key_pem)
    }
}

impl Ca {
    pub fn from_pem(cert_pem: impl Into<String>, key_pem: KeyMaterial) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem,
        }
    }

    /// Generate a new self-signed root.
    pub fn create() -> Result<Self> {
        tracing::info!("generating new CA cert and key");
        let private_key = generate_rsa_key()?;
        let key_pair = signing_key_pair(&private_key)?;

        let serial = random_serial();
        tracing::info!(serial = %hex_serial(&serial), "using generated serial number");

        let mut params = CertificateParams::default();
        params.serial_number = Some(serial);
        params.distinguished_name = identity_name(CA_COMMON_NAME)?;

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(CA_VALIDITY_DAYS);

        params.key_usages = vec![
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
        ];
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

        let cert = params.self_signed(&key_pair)?;
        let cert_pem = pem::encode(PemKind::Certificate, cert.der().as_ref());
        let key_pem = encode_rsa_key(&private_key)?;

        tracing::info!("new CA cert and key generated successfully");
        Ok(Self { cert_pem, key_pem })
    }

    /// Create a new root and persist it to `path`.
    pub fn setup(path: &Path) -> Result<Self> {
        if path.as_os_str().is_empty() {
            return Err(Error::NoConfig);
        }
        let ca = Self::create()?;
        ca.persist(path)?;
        Ok(ca)
    }

    /// Load a root from the JSON config document at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if path.as_os_str().is_empty() {
            return Err(Error::NoConfig);
        }
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        if path.is_dir() {
            return Err(Error::ConfigParse {
                path: path.to_path_buf(),
                reason: "path is a directory".into(),
            });
        }

        let contents = Zeroizing::new(std::fs::read(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?);

        serde_json::from_slice(&contents).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write the config document to `path`, owner read/write only.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(Error::ConfigWrite {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "no config path specified",
                ),
            });
        }

        let document = Zeroizing::new(serde_json::to_string_pretty(self)?);
        crate::fs::atomic_write_secret(path, document.as_bytes()).map_err(|e| match e {
            Error::WriteFile { source, .. } => Error::ConfigWrite {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

        tracing::info!(path = %path.display(), "CA config written");
        Ok(())
    }

    /// Export the public CA certificate.
    pub fn write_certificate(&self, path: &Path) -> Result<()> {
        crate::fs::write_secret_file(path, self.cert_pem.as_bytes())
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &KeyMaterial {
        &self.key_pem
    }

    /// Check that the certificate's public key belongs to the private key.
    pub fn check_key_binding(&self) -> Result<()> {
        let info = self.certificate()?;
        let cert_key = RsaPublicKey::from_public_key_der(&info.public_key_der)
            .map_err(|e| Error::CertParse(format!("certificate key is not RSA: {}", e)))?;

        if cert_key != self.private_key()?.to_public_key() {
            return Err(Error::KeyMismatch);
        }
        Ok(())
    }

    pub fn days_remaining(&self) -> Result<i64> {
        Ok(self.certificate()?.days_remaining())
    }
}

/// The organisational identity shared by the root and every request.
pub(crate) fn identity_name(common_name: &str) -> Result<DistinguishedName> {
    let mut name = DistinguishedName::new();
    name.push(
        DnType::CountryName,
        DnValue::PrintableString(CA_COUNTRY.try_into()?),
    );
    name.push(DnType::StateOrProvinceName, CA_PROVINCE);
    name.push(DnType::LocalityName, CA_LOCALITY);
    name.push(DnType::OrganizationName, CA_ORG_NAME);
    name.push(DnType::OrganizationalUnitName, CA_ORG_UNIT);
    name.push(DnType::CommonName, common_name);
    Ok(name)
}

pub(crate) fn generate_rsa_key() -> Result<RsaPrivateKey> {
    RsaPrivateKey::new(&mut rsa::rand_core::OsRng, RSA_BITS)
        .map_err(|e| Error::KeyGen(format!("RSA-{}: {}", RSA_BITS, e)))
}

/// PKCS#1 PEM, the format both the config document and issued certs use.
pub(crate) fn encode_rsa_key(key: &RsaPrivateKey) -> Result<KeyMaterial> {
    let der = key
        .to_pkcs1_der()
        .map_err(|e| Error::KeyGen(format!("failed to encode key: {}", e)))?;
    Ok(KeyMaterial::new(pem::encode(
        PemKind::RsaPrivateKey,
        der.as_bytes(),
    )))
}

pub(crate) fn decode_rsa_key(key_pem: &KeyMaterial) -> Result<RsaPrivateKey> {
    let der = Zeroizing::new(pem::decode_kind(key_pem.as_bytes(), PemKind::RsaPrivateKey)?);
    RsaPrivateKey::from_pkcs1_der(&der).map_err(|e| Error::KeyParse(e.to_string()))
}

/// rcgen only loads PKCS#8, so hand it the key in that form.
pub(crate) fn signing_key_pair(key: &RsaPrivateKey) -> Result<KeyPair> {
    let pkcs8 = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::KeyParse(format!("failed to encode PKCS#8: {}", e)))?;
    Ok(KeyPair::from_pem(&pkcs8)?)
}

/// 128 bits from the thread-local CSPRNG.
pub(crate) fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
    SerialNumber::from_slice(&bytes)
}

fn hex_serial(serial: &SerialNumber) -> String {
    serial
        .to_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
