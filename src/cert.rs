// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::ca::{random_serial, CertificateSource};
use crate::csr::{Csr, VerifiedRequest};
use crate::error::{Error, Result};
use crate::hosts::{self, SubjectName};
use crate::pem::{self, KeyMaterial, PemKind};
use crate::x509::{self, CertInfo};
use rcgen::{CertificateParams, IsCa, Issuer, KeyUsagePurpose, SanType, SerialNumber};
use serde::Serialize;

/// An issued leaf certificate with its private key, both PEM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cert {
    #[serde(rename = "cert")]
    cert_pem: String,
    #[serde(rename = "private_key")]
    key_pem: KeyMaterial,
}

/// How a [`Cert`] is rendered for the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `{"cert": ..., "private_key": ...}`, two-space indented.
    #[default]
    Json,
    /// Certificate PEM, a newline, then key PEM.
    Plain,
}

impl OutputFormat {
    /// Only `plain` selects plain text; anything else, including nothing, is JSON.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("plain") => OutputFormat::Plain,
            _ => OutputFormat::Json,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            OutputFormat::Json => "cert.json",
            OutputFormat::Plain => "cert.txt",
        }
    }
}

impl Cert {
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &KeyMaterial {
        &self.key_pem
    }

    pub fn info(&self) -> Result<CertInfo> {
        x509::parse_cert_pem(&self.cert_pem)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_plain(&self) -> String {
        format!("{}\n{}", self.cert_pem, self.key_pem.expose())
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => self.to_json(),
            OutputFormat::Plain => Ok(self.to_plain()),
        }
    }
}

/// Where leaf serial numbers come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SerialPolicy {
    /// Nanoseconds since the Unix epoch.
    #[default]
    Clock,
    /// 128 bits from the CSPRNG, the same source the root uses.
    Random,
}

impl SerialPolicy {
    fn next(self) -> SerialNumber {
        match self {
            SerialPolicy::Clock => {
                let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos().max(0) as u64;
                SerialNumber::from_slice(&nanos.to_be_bytes())
            }
            SerialPolicy::Random => random_serial(),
        }
    }
}

/// Issues leaf certificates from a [`CertificateSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Signer {
    serial_policy: SerialPolicy,
}

impl Signer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_serial_policy(serial_policy: SerialPolicy) -> Self {
        Self { serial_policy }
    }

    pub fn serial_policy(&self) -> SerialPolicy {
        self.serial_policy
    }

    /// Sign `csr` for the hosts it carries.
    ///
    /// The returned [`Cert`] pairs the new certificate with the request's own
    /// private key.
    pub fn sign<A>(&self, ca: &A, csr: Csr) -> Result<Cert>
    where
        A: CertificateSource + ?Sized,
    {
        let request = csr.verify()?;
        let names = hosts::subject_names(csr.hosts());
        let cert_pem = self.issue(ca, &request, &names)?;

        tracing::info!(hosts = %csr.hosts(), "issued certificate");
        Ok(Cert {
            cert_pem,
            key_pem: csr.into_private_key(),
        })
    }

    /// Issue a certificate for a proven public key and a caller-chosen set of
    /// names. The request's signature says nothing about `names`; whoever
    /// calls this decides what the certificate covers.
    ///
    /// Validity runs from now until the CA's own expiry.
    pub fn issue<A>(&self, ca: &A, request: &VerifiedRequest, names: &[SubjectName]) -> Result<String>
    where
        A: CertificateSource + ?Sized,
    {
        let signing_key = ca.signing_key()?;
        let ca_info = ca.certificate()?;

        let now = time::OffsetDateTime::now_utc();
        if ca_info.not_after <= now {
            return Err(Error::CaExpired(ca_info.not_after));
        }

        let mut params = CertificateParams::default();
        params.serial_number = Some(self.serial_policy.next());
        params.distinguished_name = request.subject().clone();
        params.not_before = now;
        params.not_after = ca_info.not_after;
        params.key_usages = vec![
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.is_ca = IsCa::ExplicitNoCa;
        params.use_authority_key_identifier_extension = true;

        for name in names {
            let san = match name {
                SubjectName::Ip(ip) => SanType::IpAddress(*ip),
                SubjectName::Dns(dns) => SanType::DnsName(dns.as_str().try_into()?),
            };
            params.subject_alt_names.push(san);
        }

        let issuer = Issuer::from_ca_cert_pem(ca.certificate_pem(), signing_key)?;
        let cert = params.signed_by(request.public_key(), &issuer)?;

        Ok(pem::encode(PemKind::Certificate, cert.der().as_ref()))
    }
}

/// Sign with the default [`Signer`].
pub fn sign<A>(ca: &A, csr: Csr) -> Result<Cert>
where
    A: CertificateSource + ?Sized,
{
    Signer::new().sign(ca, csr)
}
