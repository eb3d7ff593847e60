//! Offline CA and certificate generation for the command service PKI.
//!
//! Writes PEM pairs the way an out-of-band provisioning step would: a
//! self-signed CA, a server certificate for `localhost`, and client
//! certificates whose subject organizations and units carry the role
//! information the server evaluates.

use crate::errors::{SandboxError, SandboxResult};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SanType,
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use time::{Duration, OffsetDateTime};

/// Long-lived fixtures; a production CA would rotate far sooner.
const VALIDITY_DAYS: i64 = 3650;

/// A generated CA certificate together with its signing key.
pub struct CaPair {
    pub cert: rcgen::Certificate,
    pub key: KeyPair,
}

/// Generate a self-signed CA and write `<cert_file>`/`<key_file>` under
/// `base`.
pub fn generate_ca(base: &Path, cert_file: &str, key_file: &str, org: &str) -> SandboxResult<CaPair> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, org);
    params.distinguished_name = dn;

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
    ];

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(VALIDITY_DAYS);

    let key = KeyPair::generate().map_err(generation_error)?;
    let cert = params.self_signed(&key).map_err(generation_error)?;

    write_pem(&base.join(cert_file), cert.pem().as_bytes())?;
    write_pem(&base.join(key_file), key.serialize_pem().as_bytes())?;

    Ok(CaPair { cert, key })
}

/// Generate a leaf certificate signed by `ca` and write
/// `<name>.cert`/`<name>.key` under `base`, where `<name>` is the
/// organization, suffixed with `_<units joined by ->` when units are
/// present. Server certificates get the server-auth EKU, client
/// certificates the client-auth EKU; both are valid for `localhost`.
pub fn generate_cert(
    base: &Path,
    ca: &CaPair,
    server: bool,
    org: &str,
    units: &[&str],
) -> SandboxResult<()> {
    let mut params =
        CertificateParams::new(vec!["localhost".to_string()]).map_err(generation_error)?;
    params
        .subject_alt_names
        .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    params
        .subject_alt_names
        .push(SanType::IpAddress(IpAddr::V6(Ipv6Addr::LOCALHOST)));

    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, org);
    for unit in units {
        dn.push(DnType::OrganizationalUnitName, *unit);
    }
    params.distinguished_name = dn;

    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![if server {
        ExtendedKeyUsagePurpose::ServerAuth
    } else {
        ExtendedKeyUsagePurpose::ClientAuth
    }];

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(VALIDITY_DAYS);

    let key = KeyPair::generate().map_err(generation_error)?;
    let cert = params
        .signed_by(&key, &ca.cert, &ca.key)
        .map_err(generation_error)?;

    let mut name = org.to_string();
    if !units.is_empty() {
        name = format!("{}_{}", name, units.join("-"));
    }

    write_pem(&base.join(format!("{name}.cert")), cert.pem().as_bytes())?;
    write_pem(&base.join(format!("{name}.key")), key.serialize_pem().as_bytes())?;

    Ok(())
}

fn generation_error(err: rcgen::Error) -> SandboxError {
    SandboxError::Config(format!("certificate generation: {err}"))
}

fn write_pem(path: &Path, pem: &[u8]) -> SandboxResult<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| SandboxError::Config(format!("failed to create {}: {e}", path.display())))?;

    file.write_all(pem)
        .map_err(|e| SandboxError::Config(format!("failed to write {}: {e}", path.display())))
}
