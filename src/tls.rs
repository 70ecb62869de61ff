use anyhow::{Context, Result};
use rustls::pki_types::CertificateDer;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio_rustls::rustls;
use tracing::warn;

use crate::config::TlsOptions;

/// 加载连接上游代理使用的 TLS 客户端配置
///
/// 未指定 CA 时使用系统证书；`skip_verify` 打开时不验证代理证书
pub fn load_client_config(options: &TlsOptions) -> Result<Arc<rustls::ClientConfig>> {
    let mut root_store = rustls::RootCertStore::empty();

    // 跳过验证时不需要加载任何根证书
    if !options.skip_verify {
        match options.ca_cert_path {
            Some(ref ca_path) => {
                let ca_path = shellexpand::tilde(&ca_path.to_string_lossy()).into_owned();
                let ca_file = File::open(&ca_path)
                    .with_context(|| format!("Failed to open CA cert file: {}", ca_path))?;
                let mut ca_reader = BufReader::new(ca_file);
                let ca_certs: Vec<CertificateDer> = rustls_pemfile::certs(&mut ca_reader)
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to parse CA certificates")?;

                for cert in ca_certs {
                    root_store
                        .add(cert)
                        .context("Failed to add CA certificate")?;
                }
            }
            None => {
                let native_certs = rustls_native_certs::load_native_certs();
                for err in &native_certs.errors {
                    warn!("Failed to load a native certificate: {}", err);
                }
                for cert in native_certs.certs {
                    root_store.add(cert).ok();
                }
            }
        }
    }

    // 显式指定加密后端，依赖树中同时启用多个后端时 builder() 无法自动选择
    let mut config = rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .context("Failed to select TLS protocol versions")?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if options.skip_verify {
        warn!("Proxy certificate verification is DISABLED (skip_verify); the proxy connection is not authenticated");
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoCertificateVerification));
    }

    Ok(Arc::new(config))
}

/// TLS 加密后端
pub fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// 不验证证书的验证器（仅在显式配置 skip_verify 时使用）
#[derive(Debug)]
struct NoCertificateVerification;

impl rustls::client::danger::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer,
        _intermediates: &[CertificateDer],
        _server_name: &rustls::pki_types::ServerName,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}
