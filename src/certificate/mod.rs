/// Certificate records, digests, QR payloads and the record store

pub mod hash;
mod models;
pub mod payload;
pub mod qr;
mod store;

pub use models::{
    parse_date, Certificate, CertificateStatus, ContentRef, Metadata, MetadataValue,
    CONTENT_METADATA_KEY,
};
pub use payload::{parse_payload, CertificatePayload, ParsedPayload};
pub use store::{CertificateStore, SqliteCertificateStore};

/// Verification link handed to recipients
pub fn verify_url(public_url: &str, token: &str) -> String {
    format!(
        "{}/api/cert/verify?token={}",
        public_url.trim_end_matches('/'),
        token
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_url() {
        assert_eq!(
            verify_url("http://localhost:4000/", "abc"),
            "http://localhost:4000/api/cert/verify?token=abc"
        );
    }
}
