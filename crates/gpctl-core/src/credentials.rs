//! Transport credentials for hub, agent and CLI channels.
//!
//! Every channel is mutually authenticated. Credential problems surface at
//! startup as errors; they are never retried.

use crate::config::CredentialPaths;
use crate::error::{CoreError, Result};
use std::path::Path;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

/// Source of TLS configuration for servers and clients.
pub trait Credentials: Send + Sync {
    /// TLS configuration for a listening service, `None` for plaintext
    fn server_tls(&self) -> Result<Option<ServerTlsConfig>>;

    /// TLS configuration for a channel to `host`, `None` for plaintext
    fn client_tls(&self, host: &str) -> Result<Option<ClientTlsConfig>>;

    /// URI scheme matching the client configuration
    fn scheme(&self) -> &'static str {
        "https"
    }
}

/// Mutual TLS from PEM files on disk.
///
/// The files are read eagerly by [`TlsCredentials::load`] so a broken setup
/// fails before any listener or channel is created.
#[derive(Debug, Clone)]
pub struct TlsCredentials {
    ca: Vec<u8>,
    server_cert: Vec<u8>,
    server_key: Vec<u8>,
    client_cert: Vec<u8>,
    client_key: Vec<u8>,
}

impl TlsCredentials {
    pub fn load(paths: &CredentialPaths) -> Result<Self> {
        Ok(Self {
            ca: read_pem(&paths.ca_cert)?,
            server_cert: read_pem(&paths.server_cert)?,
            server_key: read_pem(&paths.server_key)?,
            client_cert: read_pem(&paths.client_cert)?,
            client_key: read_pem(&paths.client_key)?,
        })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    let data = std::fs::read(path).map_err(|e| {
        CoreError::Credentials(format!("cannot read {}: {}", path.display(), e))
    })?;
    if !String::from_utf8_lossy(&data).contains("-----BEGIN") {
        return Err(CoreError::Credentials(format!(
            "{} is not a PEM file",
            path.display()
        )));
    }
    Ok(data)
}

impl Credentials for TlsCredentials {
    fn server_tls(&self) -> Result<Option<ServerTlsConfig>> {
        let config = ServerTlsConfig::new()
            .identity(Identity::from_pem(&self.server_cert, &self.server_key))
            .client_ca_root(Certificate::from_pem(&self.ca));
        Ok(Some(config))
    }

    fn client_tls(&self, host: &str) -> Result<Option<ClientTlsConfig>> {
        let config = ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(&self.ca))
            .identity(Identity::from_pem(&self.client_cert, &self.client_key))
            .domain_name(host);
        Ok(Some(config))
    }
}

/// Plaintext channels. Only meant for in-process tests and local development.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsecureCredentials;

impl Credentials for InsecureCredentials {
    fn server_tls(&self) -> Result<Option<ServerTlsConfig>> {
        Ok(None)
    }

    fn client_tls(&self, _host: &str) -> Result<Option<ClientTlsConfig>> {
        Ok(None)
    }

    fn scheme(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FAKE_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

    fn paths_in(dir: &Path) -> CredentialPaths {
        CredentialPaths {
            ca_cert: dir.join("ca.crt"),
            server_cert: dir.join("server.crt"),
            server_key: dir.join("server.key"),
            client_cert: dir.join("client.crt"),
            client_key: dir.join("client.key"),
        }
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempdir().unwrap();
        let err = TlsCredentials::load(&paths_in(dir.path())).unwrap_err();
        assert!(err.to_string().contains("ca.crt"));
    }

    #[test]
    fn test_non_pem_file_rejected() {
        let dir = tempdir().unwrap();
        let paths = paths_in(dir.path());
        for path in [
            &paths.ca_cert,
            &paths.server_cert,
            &paths.server_key,
            &paths.client_cert,
        ] {
            std::fs::write(path, FAKE_PEM).unwrap();
        }
        std::fs::write(&paths.client_key, "not a key").unwrap();

        let err = TlsCredentials::load(&paths).unwrap_err();
        assert!(err.to_string().contains("client.key is not a PEM file"));
    }

    #[test]
    fn test_insecure_credentials_use_plaintext() {
        let creds = InsecureCredentials;
        assert!(creds.server_tls().unwrap().is_none());
        assert!(creds.client_tls("sdw1").unwrap().is_none());
        assert_eq!(creds.scheme(), "http");
    }
}
