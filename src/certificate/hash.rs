/// Deterministic certificate digests
use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Field order is part of the digest and must not change.
#[derive(Serialize)]
struct StudentHashInput<'a> {
    name: &'a str,
    course: &'a str,
    #[serde(rename = "issuedOn")]
    issued_on: String,
    #[serde(rename = "certificateId")]
    certificate_id: &'a str,
}

/// SHA-256 (hex) over `{"name","course","issuedOn","certificateId"}` as
/// compact JSON, independent of the ledger
pub fn student_hash(
    recipient_name: &str,
    course_name: &str,
    issued_on: NaiveDate,
    certificate_id: &str,
) -> String {
    let input = StudentHashInput {
        name: recipient_name,
        course: course_name,
        issued_on: issued_on.format("%Y-%m-%d").to_string(),
        certificate_id,
    };
    // Serializing a struct of strings cannot fail
    let json = serde_json::to_string(&input).unwrap_or_default();
    sha256_hex(json.as_bytes())
}

/// Key under which a certificate is attested on the ledger
pub fn ledger_key(certificate_id: &str) -> String {
    sha256_hex(certificate_id.as_bytes())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_student_hash_matches_canonical_json() {
        let expected = sha256_hex(
            br#"{"name":"Alice","course":"Algorithms 101","issuedOn":"2024-01-01","certificateId":"CERT-0001"}"#,
        );
        let actual = student_hash(
            "Alice",
            "Algorithms 101",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            "CERT-0001",
        );
        assert_eq!(actual, expected);
        assert_eq!(actual.len(), 64);
    }

    #[test]
    fn test_student_hash_depends_on_every_field() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let base = student_hash("Alice", "Algorithms 101", day, "CERT-0001");
        assert_ne!(base, student_hash("Alicia", "Algorithms 101", day, "CERT-0001"));
        assert_ne!(base, student_hash("Alice", "Algorithms 102", day, "CERT-0001"));
        assert_ne!(
            base,
            student_hash("Alice", "Algorithms 101", day.succ_opt().unwrap(), "CERT-0001")
        );
        assert_ne!(base, student_hash("Alice", "Algorithms 101", day, "CERT-0002"));
    }

    #[test]
    fn test_ledger_key_is_stable_hex() {
        assert_eq!(ledger_key("CERT-0001"), ledger_key("CERT-0001"));
        assert_ne!(ledger_key("CERT-0001"), ledger_key("CERT-0002"));
        assert!(ledger_key("CERT-0001").chars().all(|c| c.is_ascii_hexdigit()));
    }
}
