//! TLS policy and per-listener context construction.
//!
//! Each encrypted listener gets a [`TlsContext`]: key, certificate,
//! authority, and dhparam material read off disk, the resolved cipher-suite
//! policy, and the client-authentication flags. The proxy and
//! administrative interfaces use the same constructor with their own slice
//! of the options. [`TlsContext::server_config`] turns a context into the
//! rustls configuration a listener is served with.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use const_format::concatcp;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::{Error, Result};

/// Suites offered when no override is given, strongest first. The order is
/// part of the policy: listeners are configured to honor it over client
/// preference.
const PREFERRED_CIPHERS: &str = "ECDHE-RSA-AES128-GCM-SHA256:\
    ECDHE-ECDSA-AES128-GCM-SHA256:\
    ECDHE-RSA-AES256-GCM-SHA384:\
    ECDHE-ECDSA-AES256-GCM-SHA384:\
    DHE-RSA-AES128-GCM-SHA256:\
    ECDHE-RSA-AES128-SHA256:\
    DHE-RSA-AES128-SHA256:\
    ECDHE-RSA-AES256-SHA384:\
    DHE-RSA-AES256-SHA384:\
    ECDHE-RSA-AES256-SHA256:\
    DHE-RSA-AES256-SHA256:\
    HIGH";

/// Families that are never negotiated regardless of the RC4 toggle.
const EXCLUDED_CIPHERS: &str = "!aNULL:!eNULL:!EXPORT:!DES:!3DES:!MD5:!PSK";

/// Built-in policy with the legacy RC4 family disabled.
pub const CIPHERS_DEFAULT: &str = concatcp!(PREFERRED_CIPHERS, ":!RC4:", EXCLUDED_CIPHERS);

/// Built-in policy with RC4 explicitly opted into. Differs from
/// [`CIPHERS_DEFAULT`] in that single token only.
pub const CIPHERS_WITH_RC4: &str = concatcp!(PREFERRED_CIPHERS, ":RC4:", EXCLUDED_CIPHERS);

/// Resolve the cipher-suite string for a listener.
///
/// An explicit override wins unchanged, bypassing the RC4 toggle entirely.
/// Otherwise the built-in list is used with the RC4 token flipped between
/// its enabling and disabling form.
pub fn cipher_suite_list(allow_rc4: bool, override_list: Option<&str>) -> String {
    match override_list {
        Some(list) => list.to_string(),
        None if allow_rc4 => CIPHERS_WITH_RC4.to_string(),
        None => CIPHERS_DEFAULT.to_string(),
    }
}

/// Protocol version pin. Only versions rustls can actually serve are
/// accepted; requesting anything older is a configuration error, not a
/// silent downgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    V1_2,
    V1_3,
}

impl TlsVersion {
    /// Parse the conventional method-style names (`TLSv1_2`, `TLSv1_3`,
    /// also accepted with a dot and in any case).
    pub fn parse(name: &str) -> Result<Self> {
        match name.replace('.', "_").to_ascii_lowercase().as_str() {
            "tlsv1_2" => Ok(TlsVersion::V1_2),
            "tlsv1_3" => Ok(TlsVersion::V1_3),
            _ => Err(Error::UnsupportedTlsVersion(name.to_string())),
        }
    }

    fn protocol(self) -> &'static rustls::SupportedProtocolVersion {
        match self {
            TlsVersion::V1_2 => &rustls::version::TLS12,
            TlsVersion::V1_3 => &rustls::version::TLS13,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsVersion::V1_2 => f.write_str("TLSv1_2"),
            TlsVersion::V1_3 => f.write_str("TLSv1_3"),
        }
    }
}

/// One interface's slice of the raw TLS options. The dhparam and protocol
/// fields are shared between interfaces; everything else is per-namespace.
#[derive(Debug, Clone, Copy)]
pub struct TlsOptions<'a> {
    pub key: Option<&'a Path>,
    pub cert: Option<&'a Path>,
    pub ca: Option<&'a Path>,
    pub dhparam: Option<&'a Path>,
    pub protocol: Option<&'a str>,
    pub request_cert: bool,
    pub reject_unauthorized: bool,
}

/// Everything one encrypted listener needs: material, cipher policy, and
/// client-authentication behavior.
///
/// Absent (`None` from [`TlsContext::build`]) when the interface has
/// neither key nor certificate configured, in which case that listener
/// serves plain HTTP.
#[derive(Debug, Clone)]
pub struct TlsContext {
    pub key: Option<Vec<u8>>,
    pub cert: Option<Vec<u8>>,
    pub ca: Option<Vec<u8>>,
    pub dhparam: Option<Vec<u8>>,
    pub ciphers: String,
    pub protocol: Option<TlsVersion>,
    /// Always true: server-side suite order is the point of the policy.
    pub honor_cipher_order: bool,
    pub request_cert: bool,
    pub reject_unauthorized: bool,
}

impl TlsContext {
    /// Build the context for one interface, or `None` when neither key nor
    /// certificate is configured there. Either field alone is enough to
    /// request TLS; whether the material is sufficient is checked when the
    /// listener is assembled, not here.
    ///
    /// Reads all referenced files synchronously. Startup is the only
    /// caller, and an unreadable path is fatal with the path attached.
    pub fn build(options: &TlsOptions<'_>, ciphers: &str) -> Result<Option<Self>> {
        if options.key.is_none() && options.cert.is_none() {
            return Ok(None);
        }

        let protocol = options.protocol.map(TlsVersion::parse).transpose()?;

        Ok(Some(Self {
            key: read_material(options.key)?,
            cert: read_material(options.cert)?,
            ca: read_material(options.ca)?,
            dhparam: read_material(options.dhparam)?,
            ciphers: ciphers.to_string(),
            protocol,
            honor_cipher_order: true,
            request_cert: options.request_cert,
            reject_unauthorized: options.reject_unauthorized,
        }))
    }

    /// Assemble the rustls server configuration for this context.
    ///
    /// The protocol pin and client-auth flags translate directly. The
    /// cipher string and dhparam bytes stay policy data carried on the
    /// context (rustls negotiates from its own suite table and supplies
    /// its own FFDHE groups) and travel to the engine with the rest of the
    /// configuration.
    pub fn server_config(&self) -> Result<ServerConfig, TlsError> {
        let cert_pem = self.cert.as_deref().ok_or(TlsError::MissingCert)?;
        let key_pem = self.key.as_deref().ok_or(TlsError::MissingKey)?;

        let certs = parse_cert_chain(cert_pem)?;
        let key = parse_private_key(key_pem)?;

        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let versions = match self.protocol {
            Some(version) => vec![version.protocol()],
            None => rustls::DEFAULT_VERSIONS.to_vec(),
        };

        let builder = ServerConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&versions)?;

        let builder = if self.request_cert {
            let roots = self.client_roots()?;
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider);
            let verifier = if self.reject_unauthorized {
                verifier.build()?
            } else {
                // Certificates are requested and verified when presented,
                // but a client without one is still admitted.
                verifier.allow_unauthenticated().build()?
            };
            builder.with_client_cert_verifier(verifier)
        } else {
            builder.with_no_client_auth()
        };

        Ok(builder.with_single_cert(certs, key)?)
    }

    fn client_roots(&self) -> Result<RootCertStore, TlsError> {
        let ca_pem = self.ca.as_deref().ok_or(TlsError::MissingClientCa)?;
        let mut roots = RootCertStore::empty();
        for cert in parse_cert_chain(ca_pem)? {
            roots.add(cert)?;
        }
        Ok(roots)
    }
}

/// Problems turning a context into a live rustls configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("a certificate is configured but no private key")]
    MissingKey,

    #[error("a private key is configured but no certificate")]
    MissingCert,

    #[error("client certificate verification requires CA material")]
    MissingClientCa,

    #[error("no certificates found in PEM data")]
    EmptyCertChain,

    #[error("no private key found in PEM data")]
    NoPrivateKey,

    #[error("malformed PEM data: {0}")]
    Pem(std::io::Error),

    #[error(transparent)]
    Rustls(#[from] rustls::Error),

    #[error("client certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

fn read_material(path: Option<&Path>) -> Result<Option<Vec<u8>>> {
    match path {
        Some(path) => fs::read(path).map(Some).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        }),
        None => Ok(None),
    }
}

fn parse_cert_chain(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(TlsError::Pem)?;
    if certs.is_empty() {
        return Err(TlsError::EmptyCertChain);
    }
    Ok(certs)
}

fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = pem;
    rustls_pemfile::private_key(&mut reader)
        .map_err(TlsError::Pem)?
        .ok_or(TlsError::NoPrivateKey)
}
