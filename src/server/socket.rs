//! Unix-domain socket placement and binding.
//!
//! The socket lives in the system temp directory as
//! `lci-server-<hash>.sock`, where the hash is a 32-bit function of the
//! absolute project root rendered as 8 hex digits, so daemons for
//! different projects coexist. The file is created mode 0600 and unlinked
//! on graceful shutdown. A second daemon for the same project finds a
//! live listener and backs off non-fatally; a stale socket file left by a
//! crash is unlinked and rebound.

use sha2::{Digest, Sha256};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};

/// 32-bit project hash: the first four bytes of SHA-256 over the absolute
/// root path.
pub fn project_hash(project_root: &Path) -> u32 {
    let digest = Sha256::digest(project_root.as_os_str().as_encoded_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

pub fn socket_path(project_root: &Path) -> PathBuf {
    std::env::temp_dir().join(format!("lci-server-{:08x}.sock", project_hash(project_root)))
}

/// Outcome of trying to claim the project socket.
pub enum BindOutcome {
    Bound(UnixListener),
    /// Another daemon for this project is alive on the socket.
    AlreadyRunning,
}

pub async fn bind(path: &Path) -> io::Result<BindOutcome> {
    match UnixListener::bind(path) {
        Ok(listener) => {
            restrict_mode(path)?;
            Ok(BindOutcome::Bound(listener))
        }
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            if UnixStream::connect(path).await.is_ok() {
                return Ok(BindOutcome::AlreadyRunning);
            }
            // Nobody answering: a stale socket from an unclean exit.
            std::fs::remove_file(path)?;
            let listener = UnixListener::bind(path)?;
            restrict_mode(path)?;
            Ok(BindOutcome::Bound(listener))
        }
        Err(e) => Err(e),
    }
}

fn restrict_mode(path: &Path) -> io::Result<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

/// Remove the socket file; absent is fine.
pub fn unlink(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!("[server] failed to unlink {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_root_sensitive() {
        let a = project_hash(Path::new("/home/user/project"));
        let b = project_hash(Path::new("/home/user/project"));
        let c = project_hash(Path::new("/home/user/other"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_socket_path_shape() {
        let path = socket_path(Path::new("/home/user/project"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("lci-server-"));
        assert!(name.ends_with(".sock"));
        // 8 hex digits between prefix and suffix.
        let hash = &name["lci-server-".len()..name.len() - ".sock".len()];
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_bind_sets_owner_only_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let outcome = bind(&path).await.unwrap();
        assert!(matches!(outcome, BindOutcome::Bound(_)));

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_second_bind_backs_off_while_live() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let first = bind(&path).await.unwrap();
        let BindOutcome::Bound(_listener) = first else {
            panic!("first bind should own the socket");
        };

        let second = bind(&path).await.unwrap();
        assert!(matches!(second, BindOutcome::AlreadyRunning));
    }

    #[tokio::test]
    async fn test_stale_socket_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        {
            let _dead = bind(&path).await.unwrap();
            // Listener dropped here; the file lingers.
        }
        assert!(path.exists());

        let outcome = bind(&path).await.unwrap();
        assert!(matches!(outcome, BindOutcome::Bound(_)));
    }
}
