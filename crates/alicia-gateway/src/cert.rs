//! X.509 service-certificate verification against a pinned project CA.

use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use alicia_core::AliciaError;

pub struct CaTrustStore {
    ca_der: Vec<u8>,
}

impl CaTrustStore {
    pub fn from_der(ca_der: Vec<u8>) -> Self {
        Self { ca_der }
    }

    /// Verify `cert_pem` is signed by the pinned CA and still within its
    /// validity window, returning the certificate's Common Name (used as
    /// `service_name`).
    pub fn verify_and_extract_cn(&self, cert_pem: &str) -> Result<String, AliciaError> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes())
            .map_err(|e| AliciaError::Unauthorized(format!("malformed certificate: {e}")))?;
        let cert = pem
            .parse_x509()
            .map_err(|e| AliciaError::Unauthorized(format!("malformed certificate: {e}")))?;

        let (_, ca_cert) = X509Certificate::from_der(&self.ca_der)
            .map_err(|e| AliciaError::Internal(format!("malformed CA certificate: {e}")))?;

        cert.verify_signature(Some(ca_cert.public_key()))
            .map_err(|_| AliciaError::Unauthorized("certificate not signed by project CA".into()))?;

        let now = x509_parser::time::ASN1Time::now();
        if !cert.validity().is_valid_at(now) {
            return Err(AliciaError::Unauthorized("certificate outside validity window".into()));
        }

        cert.subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| AliciaError::Unauthorized("certificate has no Common Name".into()))
    }
}
