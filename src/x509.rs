// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Parse X.509 certificates into an owned summary.

use crate::error::{Error, Result};
use crate::pem::{self, PemKind};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use ::time::OffsetDateTime;
use x509_parser::prelude::*;

/// Key usage bits present on a certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyUsages {
    pub digital_signature: bool,
    pub key_encipherment: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
}

/// Owned view of a parsed certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    pub der: Vec<u8>,
    /// Big-endian serial number bytes as encoded.
    pub serial: Vec<u8>,
    pub subject: String,
    pub issuer: String,
    pub common_name: Option<String>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    /// Whether a basic constraints extension is present at all.
    pub basic_constraints_valid: bool,
    pub is_ca: bool,
    pub key_usage: Option<KeyUsages>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    /// DER-encoded SubjectPublicKeyInfo.
    pub public_key_der: Vec<u8>,
}

impl CertInfo {
    pub fn days_remaining(&self) -> i64 {
        (self.not_after - OffsetDateTime::now_utc()).whole_days()
    }

    pub fn is_expired(&self) -> bool {
        self.not_after < OffsetDateTime::now_utc()
    }
}

pub fn parse_cert_pem(pem_data: impl AsRef<[u8]>) -> Result<CertInfo> {
    let der = pem::decode_kind(pem_data, PemKind::Certificate)?;
    parse_cert_der(der)
}

pub fn parse_cert_der(der: Vec<u8>) -> Result<CertInfo> {
    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| Error::CertParse(format!("Invalid X.509: {}", e)))?;

    let not_before = cert.validity().not_before.to_datetime();
    let not_after = cert.validity().not_after.to_datetime();

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);

    let mut basic_constraints_valid = false;
    let mut is_ca = false;
    let mut key_usage = None;
    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();

    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => {
                for name in &san.general_names {
                    match name {
                        GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                        GeneralName::IPAddress(bytes) => {
                            if let Some(ip) = ip_from_bytes(bytes) {
                                ip_addresses.push(ip);
                            }
                        }
                        _ => {}
                    }
                }
            }
            ParsedExtension::BasicConstraints(bc) => {
                basic_constraints_valid = true;
                is_ca = bc.ca;
            }
            ParsedExtension::KeyUsage(ku) => {
                key_usage = Some(KeyUsages {
                    digital_signature: ku.digital_signature(),
                    key_encipherment: ku.key_encipherment(),
                    key_cert_sign: ku.key_cert_sign(),
                    crl_sign: ku.crl_sign(),
                });
            }
            _ => {}
        }
    }

    Ok(CertInfo {
        serial: cert.raw_serial().to_vec(),
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        common_name,
        not_before,
        not_after,
        basic_constraints_valid,
        is_ca,
        key_usage,
        dns_names,
        ip_addresses,
        public_key_der: cert.public_key().raw.to_vec(),
        der,
    })
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes)
            .ok()
            .map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(bytes)
            .ok()
            .map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}
