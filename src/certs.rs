// Copyright (C) 2025 Matías Salinas (support@fenden.com)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Mints a per-host leaf certificate signed by a locally trusted CA,
//! entirely in-process via `rcgen` — no shelling out to an external CA
//! toolchain. The CA itself is loaded from disk if present, or generated
//! and persisted on first run.

use std::path::{Path, PathBuf};

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose,
};
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::error::ProxyError;

const LEAF_VALIDITY_DAYS: i64 = 365;
const CA_VALIDITY_DAYS: i64 = 3650;

fn mint_failure(host: &str, err: impl std::fmt::Display) -> ProxyError {
    ProxyError::CertMintFailure(host.to_string(), err.to_string())
}

/// Owns the in-memory CA used to sign every minted leaf certificate.
pub struct CertStore {
    cert_dir: PathBuf,
    ca: Certificate,
}

impl CertStore {
    /// Loads the CA from `ca_cert_path`/`ca_key_path`, generating and
    /// persisting a fresh one if either file is missing.
    pub fn load_or_create(
        cert_dir: impl Into<PathBuf>,
        ca_cert_path: &str,
        ca_key_path: &str,
    ) -> Result<Self, ProxyError> {
        let cert_dir = cert_dir.into();
        std::fs::create_dir_all(&cert_dir)?;

        let ca = if Path::new(ca_cert_path).exists() && Path::new(ca_key_path).exists() {
            load_ca(ca_cert_path, ca_key_path)?
        } else {
            let ca = generate_ca()?;
            std::fs::write(
                ca_cert_path,
                ca.serialize_pem().map_err(|e| mint_failure("CA", e))?,
            )?;
            std::fs::write(ca_key_path, ca.serialize_private_key_pem())?;
            set_permissions(ca_key_path, 0o600)?;
            set_permissions(ca_cert_path, 0o644)?;
            info!("generated a new local CA at {ca_cert_path}");
            ca
        };

        Ok(CertStore { cert_dir, ca })
    }

    /// Returns the cert/key file paths for `host`, minting them if they
    /// don't already exist. Idempotent: a repeated call for the same
    /// host with both files present returns the same paths unchanged.
    pub fn mint(&self, host: &str) -> Result<(PathBuf, PathBuf), ProxyError> {
        let cert_path = self.cert_dir.join(format!("{host}.crt"));
        let key_path = self.cert_dir.join(format!("{host}.key"));

        if cert_path.exists() && key_path.exists() {
            return Ok((cert_path, key_path));
        }

        let leaf = build_leaf(host).map_err(|e| mint_failure(host, e))?;
        let cert_pem = leaf
            .serialize_pem_with_signer(&self.ca)
            .map_err(|e| mint_failure(host, e))?;
        let key_pem = leaf.serialize_private_key_pem();

        write_atomic(&key_path, key_pem.as_bytes())?;
        set_permissions(&key_path, 0o600)?;
        write_atomic(&cert_path, cert_pem.as_bytes())?;
        set_permissions(&cert_path, 0o644)?;

        Ok((cert_path, key_path))
    }

    pub fn ca_cert_pem(&self) -> Result<String, ProxyError> {
        self.ca.serialize_pem().map_err(|e| mint_failure("CA", e))
    }
}

fn build_leaf(host: &str) -> Result<Certificate, rcgen::RcgenError> {
    let mut params = CertificateParams::new(vec![host.to_string(), format!("*.{host}")]);
    params.distinguished_name = dummy_dn(host);
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DataEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(LEAF_VALIDITY_DAYS);
    Certificate::from_params(params)
}

fn generate_ca() -> Result<Certificate, ProxyError> {
    let mut params = CertificateParams::new(vec![]);
    params.distinguished_name = dummy_dn("mitmcache-proxy local CA");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(CA_VALIDITY_DAYS);
    Certificate::from_params(params).map_err(|e| mint_failure("CA", e))
}

fn load_ca(ca_cert_path: &str, ca_key_path: &str) -> Result<Certificate, ProxyError> {
    let cert_pem = std::fs::read_to_string(ca_cert_path)?;
    let key_pem = std::fs::read_to_string(ca_key_path)?;
    let key_pair = rcgen::KeyPair::from_pem(&key_pem).map_err(|e| mint_failure("CA", e))?;
    let params =
        CertificateParams::from_ca_cert_pem(&cert_pem, key_pair).map_err(|e| mint_failure("CA", e))?;
    Certificate::from_params(params).map_err(|e| mint_failure("CA", e))
}

fn dummy_dn(cn: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, "US");
    dn.push(DnType::StateOrProvinceName, "State");
    dn.push(DnType::LocalityName, "City");
    dn.push(DnType::OrganizationName, "Organization");
    dn.push(DnType::OrganizationalUnitName, "Organizational Unit");
    dn.push(DnType::CommonName, cn);
    dn
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ProxyError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(unix)]
fn set_permissions(path: impl AsRef<Path>, mode: u32) -> Result<(), ProxyError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: impl AsRef<Path>, _mode: u32) -> Result<(), ProxyError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ca_cert = dir.path().join("ca.crt");
        let ca_key = dir.path().join("ca.key");
        let store = CertStore::load_or_create(
            dir.path().join("leaves"),
            ca_cert.to_str().unwrap(),
            ca_key.to_str().unwrap(),
        )
        .unwrap();

        let (cert1, key1) = store.mint("example.com").unwrap();
        let before = std::fs::read(&cert1).unwrap();
        let (cert2, key2) = store.mint("example.com").unwrap();
        let after = std::fs::read(&cert2).unwrap();

        assert_eq!(cert1, cert2);
        assert_eq!(key1, key2);
        assert_eq!(before, after);
    }

    #[test]
    fn distinct_hosts_get_distinct_certs() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::load_or_create(
            dir.path().join("leaves"),
            dir.path().join("ca.crt").to_str().unwrap(),
            dir.path().join("ca.key").to_str().unwrap(),
        )
        .unwrap();

        let (cert_a, _) = store.mint("a.example.com").unwrap();
        let (cert_b, _) = store.mint("b.example.com").unwrap();
        assert_ne!(std::fs::read(cert_a).unwrap(), std::fs::read(cert_b).unwrap());
    }
}
