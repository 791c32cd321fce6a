// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! HTTPS issuance endpoint.
//!
//! Serves the CA certificate and mints leaf certificates on request, behind
//! HTTP Basic auth. The endpoint's own TLS identity is issued by the same CA
//! at startup.

use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE, EXPIRES,
    WWW_AUTHENTICATE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

use crate::ca::CertificateSource;
use crate::cert::{OutputFormat, Signer};
use crate::config::{Credentials, ServeOptions};
use crate::csr::Csr;
use crate::error::{Error, ErrorKind, Result};
use crate::hosts;

/// Graceful shutdown timeout for draining in-flight connections.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const REALM: &str = "certd";

const INDEX_PAGE: &str = include_str!("../static/index.html");

/// Turns a caller's address into names for its certificate.
pub trait PeerResolver: Send + Sync {
    fn resolve(&self, ip: IpAddr) -> Vec<String>;
}

/// Looks the peer address up through the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl PeerResolver for SystemResolver {
    fn resolve(&self, ip: IpAddr) -> Vec<String> {
        match (ip.to_string().as_str(), 0).to_socket_addrs() {
            Ok(addrs) => addrs.map(|addr| addr.ip().to_string()).collect(),
            Err(e) => {
                tracing::debug!(peer = %ip, error = %e, "peer lookup failed");
                Vec::new()
            }
        }
    }
}

/// The issuance endpoint for one CA.
pub struct Server<A> {
    authority: Arc<A>,
    signer: Signer,
    credentials: Credentials,
    resolver: Arc<dyn PeerResolver>,
    issuance: Arc<Semaphore>,
    options: ServeOptions,
}

impl<A> Server<A>
where
    A: CertificateSource + Send + Sync + 'static,
{
    /// Credentials are read from the environment here, once.
    pub fn new(authority: A, options: ServeOptions) -> Self {
        Self {
            authority: Arc::new(authority),
            signer: Signer::new(),
            credentials: Credentials::from_env(),
            resolver: Arc::new(SystemResolver),
            issuance: Arc::new(Semaphore::new(options.max_issuance.max(1))),
            options,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_resolver(mut self, resolver: impl PeerResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.signer = signer;
        self
    }

    pub fn options(&self) -> &ServeOptions {
        &self.options
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }

    /// Issue the endpoint's own certificate and build a TLS config from it.
    pub fn bootstrap_identity(&self) -> Result<ServerConfig> {
        use rustls_pemfile::{certs, private_key};

        let hosts = self.options.bootstrap_hosts();
        tracing::info!(hosts = %hosts, "generating serving certificate");

        let csr = Csr::create(hosts)?;
        let cert = self.signer.sign(&*self.authority, csr)?;

        let chain = certs(&mut cert.cert_pem().as_bytes())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Tls(format!("Failed to parse serving certificate: {}", e)))?;
        if chain.is_empty() {
            return Err(Error::Tls("No serving certificate issued".into()));
        }
        let key = private_key(&mut cert.key_pem().as_bytes())
            .map_err(|e| Error::Tls(format!("Failed to parse serving key: {}", e)))?
            .ok_or_else(|| Error::Tls("No serving key issued".into()))?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .map_err(|e| Error::Tls(e.to_string()))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(config)
    }

    /// Route one request. Never fails: errors become status codes.
    pub async fn handle<B>(&self, req: Request<B>, peer: SocketAddr) -> Response<Full<Bytes>> {
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);
        let auth = basic_auth(&req);
        tracing::debug!(peer = %peer, path = %path, "request");

        let mut response = match path.as_str() {
            "/" => index_page(),
            "/ca" => match self.authorize(auth) {
                Ok(()) => self.dump_ca(),
                Err(e) => error_response(&e),
            },
            "/req" => match self.authorize(auth) {
                Ok(()) => match self.gen_cert(query.as_deref(), peer.ip()).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!(peer = %peer, error = %e, "issuance failed");
                        error_response(&e)
                    }
                },
                Err(e) => error_response(&e),
            },
            other => error_response(&Error::NotFound(other.to_string())),
        };

        let headers = response.headers_mut();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("private, max-age=0"));
        headers.insert(EXPIRES, HeaderValue::from_static("0"));
        response
    }

    fn authorize(&self, auth: Option<(String, String)>) -> Result<()> {
        let (user, password) = auth.ok_or(Error::Unauthorized)?;
        if self.credentials.matches(&user, &password) {
            Ok(())
        } else {
            tracing::warn!(user = %user, "rejected credentials");
            Err(Error::Unauthorized)
        }
    }

    fn dump_ca(&self) -> Response<Full<Bytes>> {
        download(
            "inline; filename=ca.crt",
            self.authority.certificate_pem().to_string(),
        )
    }

    async fn gen_cert(&self, query: Option<&str>, peer: IpAddr) -> Result<Response<Full<Bytes>>> {
        let query = IssueQuery::parse(query.unwrap_or_default())?;
        let format = OutputFormat::from_param(query.output.as_deref());

        let _permit = Arc::clone(&self.issuance)
            .acquire_owned()
            .await
            .map_err(|e| Error::Config(format!("Issuance queue closed: {}", e)))?;

        let authority = Arc::clone(&self.authority);
        let resolver = Arc::clone(&self.resolver);
        let signer = self.signer;
        let requested = query.hosts;

        let output = tokio::task::spawn_blocking(move || {
            let hosts = match requested {
                Some(hosts) if !hosts.is_empty() => hosts,
                _ => hosts::join_resolved(resolver.resolve(peer)),
            };
            tracing::info!(hosts = %hosts, "generating cert");

            let csr = Csr::create(&hosts)?;
            signer.sign(&*authority, csr)?.render(format)
        })
        .await
        .map_err(|e| Error::Config(format!("Task join error: {}", e)))??;

        let disposition = format!("inline; filename=\"{}\"", format.file_name());
        Ok(download(&disposition, format!("{}\n", output)))
    }

    /// Accept TLS connections on `listener` until `shutdown` resolves.
    pub async fn serve<F>(
        self: Arc<Self>,
        listener: TcpListener,
        tls_config: ServerConfig,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let tls_acceptor = TlsAcceptor::from(Arc::new(tls_config));

        // Connection limiter
        let connection_semaphore = Arc::new(Semaphore::new(self.options.max_connections.max(1)));

        let mut connection_tasks: JoinSet<()> = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutting down");

                    let active_count = connection_tasks.len();
                    if active_count > 0 {
                        tracing::info!(
                            active = active_count,
                            timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT.as_secs(),
                            "waiting for active connections"
                        );

                        let drain_result = tokio::time::timeout(
                            GRACEFUL_SHUTDOWN_TIMEOUT,
                            drain_connections(&mut connection_tasks),
                        )
                        .await;

                        if drain_result.is_err() {
                            tracing::warn!(
                                remaining = connection_tasks.len(),
                                "timeout reached, aborting remaining connections"
                            );
                            connection_tasks.abort_all();
                        }
                    }

                    tracing::info!("server stopped");
                    return Ok(());
                }

                accept_result = listener.accept() => {
                    let (stream, peer_addr) = match accept_result {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept error");
                            continue;
                        }
                    };

                    let permit = match Arc::clone(&connection_semaphore).try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(peer = %peer_addr, "connection limit reached, rejecting");
                            drop(stream);
                            continue;
                        }
                    };

                    let acceptor = tls_acceptor.clone();
                    let server = Arc::clone(&self);

                    connection_tasks.spawn(async move {
                        let _permit = permit;

                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => {
                                let io = TokioIo::new(tls_stream);
                                let svc = service_fn(move |req| {
                                    let server = Arc::clone(&server);
                                    async move {
                                        Ok::<_, Infallible>(server.handle(req, peer_addr).await)
                                    }
                                });

                                if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                                    tracing::debug!(peer = %peer_addr, error = %e, "connection error");
                                }
                            }
                            Err(e) => {
                                tracing::debug!(peer = %peer_addr, error = %e, "TLS handshake failed");
                            }
                        }
                    });

                    while connection_tasks.try_join_next().is_some() {}
                }
            }
        }
    }

    /// Bootstrap the serving identity, bind, and serve until Ctrl+C.
    pub async fn run(self) -> Result<()> {
        let server = Arc::new(self);

        let bootstrap = Arc::clone(&server);
        let tls_config = tokio::task::spawn_blocking(move || bootstrap.bootstrap_identity())
            .await
            .map_err(|e| Error::Config(format!("Task join error: {}", e)))??;

        let addr = server.options.bind_addr();
        let listener = TcpListener::bind(addr.as_str())
            .await
            .map_err(|e| Error::BindFailed {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(addr = %addr, "listening for HTTPS connections");

        server
            .serve(listener, tls_config, async {
                let _ = signal::ctrl_c().await;
            })
            .await
    }
}

/// Drain all connections from the JoinSet, waiting for each to complete.
async fn drain_connections(tasks: &mut JoinSet<()>) {
    while tasks.join_next().await.is_some() {}
}

/// `hosts` and `output` from a `/req` query string. Repeated keys keep the
/// first value.
#[derive(Debug, Default, PartialEq, Eq)]
struct IssueQuery {
    hosts: Option<String>,
    output: Option<String>,
}

impl IssueQuery {
    fn parse(query: &str) -> Result<Self> {
        if query.contains(';') {
            return Err(Error::BadRequest("invalid semicolon separator in query".into()));
        }
        let bytes = query.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let valid = bytes
                    .get(i + 1..i + 3)
                    .map(|hex| hex.iter().all(|b| b.is_ascii_hexdigit()))
                    .unwrap_or(false);
                if !valid {
                    return Err(Error::BadRequest(format!("invalid URL escape at {}", i)));
                }
                i += 3;
            } else {
                i += 1;
            }
        }

        let mut parsed = Self::default();
        for (key, value) in url::form_urlencoded::parse(bytes) {
            match key.as_ref() {
                "hosts" if parsed.hosts.is_none() => parsed.hosts = Some(value.into_owned()),
                "output" if parsed.output.is_none() => parsed.output = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(parsed)
    }
}

/// Decode `Authorization: Basic ...` into user and password.
fn basic_auth<B>(req: &Request<B>) -> Option<(String, String)> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

pub fn status_for(err: &Error) -> StatusCode {
    match err.kind() {
        ErrorKind::Auth => StatusCode::UNAUTHORIZED,
        ErrorKind::Request => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &Error) -> Response<Full<Bytes>> {
    let status = status_for(err);
    let body = match status {
        StatusCode::NOT_FOUND => "404 page not found\n".to_string(),
        _ => format!("{}\n", status.canonical_reason().unwrap_or("Error")),
    };

    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header("X-Content-Type-Options", "nosniff");
    if status == StatusCode::UNAUTHORIZED {
        builder = builder.header(WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", REALM));
    }
    builder
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"Internal Server Error"))))
}

fn index_page() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(Bytes::from_static(INDEX_PAGE.as_bytes())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"Internal Server Error"))))
}

fn download(disposition: &str, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(CONTENT_DISPOSITION, disposition)
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"Internal Server Error"))))
}
