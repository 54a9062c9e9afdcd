use std::net::Ipv4Addr;
use std::path::PathBuf;
use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum IssueError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Failed to remove stale {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// PEM material for one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub ca: String,
    pub crt: String,
    pub key: String,
}

/// Signs overlay certificates whose groups are the client's teams
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn issue(
        &self,
        login: &str,
        ip: Ipv4Addr,
        prefix_len: u8,
        teams: &[String],
    ) -> Result<Certificate, IssueError>;
}

/// Issues certificates with the `nebula-cert` tool
#[derive(Debug, Clone)]
pub struct NebulaCertIssuer {
    binary: PathBuf,
    cert_dir: PathBuf,
    duration: String,
}

impl NebulaCertIssuer {
    pub fn new(binary: impl Into<PathBuf>, cert_dir: impl Into<PathBuf>, duration: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            cert_dir: cert_dir.into(),
            duration: duration.into(),
        }
    }

    async fn read(path: PathBuf) -> Result<String, IssueError> {
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| IssueError::Read { path, source })
    }
}

#[async_trait]
impl CertificateIssuer for NebulaCertIssuer {
    async fn issue(
        &self,
        login: &str,
        ip: Ipv4Addr,
        prefix_len: u8,
        teams: &[String],
    ) -> Result<Certificate, IssueError> {
        let program = self.binary.display().to_string();
        let ca_crt = self.cert_dir.join("ca.crt");
        let ca_key = self.cert_dir.join("ca.key");
        let crt_path = self.cert_dir.join(format!("{}.crt", login));
        let key_path = self.cert_dir.join(format!("{}.key", login));

        // nebula-cert refuses to overwrite existing output
        for stale in [&crt_path, &key_path] {
            if let Err(e) = tokio::fs::remove_file(stale).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(IssueError::Remove { path: stale.clone(), source: e });
                }
            }
        }

        debug!("Signing certificate for {} ({}/{}) with groups {:?}", login, ip, prefix_len, teams);
        let output = Command::new(&self.binary)
            .arg("sign")
            .arg("-name").arg(login)
            .arg("-out-crt").arg(&crt_path)
            .arg("-out-key").arg(&key_path)
            .arg("-ca-crt").arg(&ca_crt)
            .arg("-ca-key").arg(&ca_key)
            .arg("-ip").arg(format!("{}/{}", ip, prefix_len))
            .arg("-groups").arg(teams.join(","))
            .arg("-duration").arg(&self.duration)
            .output()
            .await
            .map_err(|source| IssueError::Spawn { program: program.clone(), source })?;

        if !output.status.success() {
            return Err(IssueError::Failed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(Certificate {
            ca: Self::read(ca_crt).await?,
            crt: Self::read(crt_path).await?,
            key: Self::read(key_path).await?,
        })
    }
}
