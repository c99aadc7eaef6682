use sni_proxy::certs::{
    CertificateManager, DEFAULT_CERT_PATH_TEMPLATE, FileSystemCertificateManager,
    validate_server_name,
};
use sni_proxy::error::CertificateError;
use std::path::Path;
use tempfile::TempDir;

/// Write a self-signed certificate and key for `sni` into `dir`
fn write_key_pair(dir: &Path, sni: &str) {
    let generated = rcgen::generate_simple_self_signed(vec![sni.to_string()]).unwrap();
    std::fs::write(dir.join(format!("{}.cert", sni)), generated.cert.pem()).unwrap();
    std::fs::write(
        dir.join(format!("{}.key", sni)),
        generated.key_pair.serialize_pem(),
    )
    .unwrap();
}

fn manager_for(dir: &TempDir) -> FileSystemCertificateManager {
    let base = dir.path().display();
    FileSystemCertificateManager::new(
        format!("{}/{{sni}}.cert", base),
        format!("{}/{{sni}}.key", base),
    )
}

#[test]
fn test_path_templates() {
    let manager = FileSystemCertificateManager::default();
    assert_eq!(
        manager.cert_path("a.example.com"),
        "/etc/ssl/certs/a.example.com.cert"
    );
    assert_eq!(
        manager.key_path("a.example.com"),
        "/etc/ssl/certs/a.example.com.key"
    );
    assert!(DEFAULT_CERT_PATH_TEMPLATE.contains("{sni}"));
}

#[tokio::test]
async fn test_loads_matching_key_pair() {
    let dir = TempDir::new().unwrap();
    write_key_pair(dir.path(), "a.example.com");

    let certified = manager_for(&dir)
        .get_certificate("a.example.com")
        .await
        .unwrap();
    assert_eq!(certified.cert.len(), 1);
}

#[tokio::test]
async fn test_missing_certificate_file() {
    let dir = TempDir::new().unwrap();

    let err = manager_for(&dir)
        .get_certificate("missing.example.com")
        .await
        .unwrap_err();
    assert!(
        matches!(err, CertificateError::FileNotFound { ref path } if path.ends_with("missing.example.com.cert"))
    );
}

#[tokio::test]
async fn test_mismatched_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_key_pair(dir.path(), "a.example.com");
    write_key_pair(dir.path(), "b.example.com");

    // Certificate of one host paired with the key of another
    std::fs::copy(
        dir.path().join("b.example.com.key"),
        dir.path().join("a.example.com.key"),
    )
    .unwrap();

    let err = manager_for(&dir)
        .get_certificate("a.example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, CertificateError::KeyMismatch { .. }));
}

#[tokio::test]
async fn test_garbage_certificate_file() {
    let dir = TempDir::new().unwrap();
    write_key_pair(dir.path(), "a.example.com");
    std::fs::write(dir.path().join("a.example.com.cert"), "not a certificate").unwrap();

    let err = manager_for(&dir)
        .get_certificate("a.example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, CertificateError::InvalidFormat { .. }));
}

#[tokio::test]
async fn test_unsafe_server_name_never_touches_disk() {
    let dir = TempDir::new().unwrap();

    for sni in ["../etc/passwd", "a/b.example.com", "", "a..example.com"] {
        let err = manager_for(&dir).get_certificate(sni).await.unwrap_err();
        assert!(
            matches!(err, CertificateError::UnsafeServerName { .. }),
            "{:?} should be rejected",
            sni
        );
    }
}

#[test]
fn test_validate_server_name() {
    assert!(validate_server_name("a.example.com").is_ok());
    assert!(validate_server_name("xn--bcher-kva.example").is_ok());
    assert!(validate_server_name("_acme.example.com").is_ok());
    assert!(validate_server_name("localhost").is_ok());

    assert!(validate_server_name("..").is_err());
    assert!(validate_server_name("a b.example.com").is_err());
    assert!(validate_server_name(&"a".repeat(64)).is_err());
    assert!(validate_server_name(&format!("{}.com", "a.".repeat(130))).is_err());
}
