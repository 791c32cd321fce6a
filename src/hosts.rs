// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Comma-separated host lists.
//!
//! A host list such as `"localhost,127.0.0.1"` is the caller's description of
//! the names a certificate should cover. Tokens are used exactly as given: no
//! trimming, no deduplication, input order preserved.

use std::fmt;
use std::net::IpAddr;

/// One Subject Alternative Name entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectName {
    Dns(String),
    Ip(IpAddr),
}

impl fmt::Display for SubjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectName::Dns(name) => f.write_str(name),
            SubjectName::Ip(ip) => write!(f, "{}", ip),
        }
    }
}

pub fn split(hosts: &str) -> impl Iterator<Item = &str> {
    hosts.split(',')
}

/// The first token, used as the request's common name.
pub fn first(hosts: &str) -> &str {
    split(hosts).next().unwrap_or_default()
}

/// Classify each token as an IP literal or a DNS name.
pub fn subject_names(hosts: &str) -> Vec<SubjectName> {
    split(hosts)
        .map(|host| match host.parse::<IpAddr>() {
            Ok(ip) => SubjectName::Ip(ip),
            Err(_) => SubjectName::Dns(host.to_string()),
        })
        .collect()
}

/// Join resolved peer names the way the issuance endpoint reports them:
/// each new entry is prepended and the trailing separator trimmed.
pub fn join_resolved<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: fmt::Display,
{
    let mut hosts = String::new();
    for name in names {
        hosts = format!("{},{}", name, hosts);
    }
    hosts.trim_end_matches(',').to_string()
}
