// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Runtime settings for the issuance endpoint.
//!
//! The persisted CA document itself lives with [`crate::ca::Ca`].

pub const DEFAULT_LISTEN: &str = "localhost";
pub const DEFAULT_PORT: u16 = 4443;
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

pub const DEFAULT_USER: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "password";

pub const USER_ENV: &str = "CERTD_USER";
pub const PASSWORD_ENV: &str = "CERTD_PASS";

/// Where and how the endpoint listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeOptions {
    pub listen: String,
    pub port: u16,
    /// Hosts for the serving certificate. Falls back to `listen` when unset.
    pub cert_addrs: Option<String>,
    /// Concurrent issuances allowed before new requests queue.
    pub max_issuance: usize,
    /// Connections beyond this are dropped at accept time.
    pub max_connections: usize,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            port: DEFAULT_PORT,
            cert_addrs: None,
            max_issuance: default_max_issuance(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl ServeOptions {
    /// Host list the bootstrap certificate is issued for.
    pub fn bootstrap_hosts(&self) -> &str {
        match self.cert_addrs.as_deref() {
            Some(addrs) if !addrs.is_empty() => addrs,
            _ => &self.listen,
        }
    }

    /// `host:port`, bracketing bare IPv6 literals.
    pub fn bind_addr(&self) -> String {
        if self.listen.contains(':') && !self.listen.starts_with('[') {
            format!("[{}]:{}", self.listen, self.port)
        } else {
            format!("{}:{}", self.listen, self.port)
        }
    }
}

/// One issuance slot per available core.
fn default_max_issuance() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Basic auth user and password the endpoint accepts.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(DEFAULT_USER, DEFAULT_PASSWORD)
    }
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Defaults overridden by `CERTD_USER` / `CERTD_PASS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the two variable
    /// names. Empty values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut creds = Self::default();
        if let Some(user) = lookup(USER_ENV).filter(|u| !u.is_empty()) {
            creds.user = user;
        }
        if let Some(password) = lookup(PASSWORD_ENV).filter(|p| !p.is_empty()) {
            creds.password = password;
        }
        creds
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn matches(&self, user: &str, password: &str) -> bool {
        self.user == user && self.password == password
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_serve_options_default() {
        let opts = ServeOptions::default();
        assert_eq!(opts.listen, "localhost");
        assert_eq!(opts.port, 4443);
        assert_eq!(opts.max_connections, 1024);
        assert!(opts.max_issuance >= 1);
        assert_eq!(opts.bind_addr(), "localhost:4443");
    }

    #[test]
    fn test_bootstrap_hosts() {
        let mut opts = ServeOptions::default();
        assert_eq!(opts.bootstrap_hosts(), "localhost");

        opts.cert_addrs = Some(String::new());
        assert_eq!(opts.bootstrap_hosts(), "localhost");

        opts.cert_addrs = Some("ca.internal,10.1.2.3".into());
        assert_eq!(opts.bootstrap_hosts(), "ca.internal,10.1.2.3");
    }

    #[test]
    fn test_bind_addr_ipv6() {
        let opts = ServeOptions {
            listen: "::1".into(),
            port: 8443,
            ..Default::default()
        };
        assert_eq!(opts.bind_addr(), "[::1]:8443");
    }

    #[test]
    fn test_credentials_default() {
        let creds = Credentials::from_lookup(|_| None);
        assert_eq!(creds, Credentials::default());
        assert!(creds.matches("admin", "password"));
        assert!(!creds.matches("admin", "wrong"));
    }

    #[test]
    fn test_credentials_override() {
        let vars: HashMap<&str, &str> = [(USER_ENV, "ops"), (PASSWORD_ENV, "hunter2")].into();
        let creds = Credentials::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(creds.user(), "ops");
        assert!(creds.matches("ops", "hunter2"));
        assert!(!creds.matches("admin", "password"));
    }

    #[test]
    fn test_credentials_empty_values_ignored() {
        let creds = Credentials::from_lookup(|_| Some(String::new()));
        assert!(creds.matches("admin", "password"));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("ops", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("ops"));
        assert!(!debug.contains("hunter2"));
    }
}
