// Lockfile protocol: one live engine instance per data root.
//
// Contents: `{port, token, engine_uuid, engine_pid, parent_pid, created_at}`,
// written with owner-only permissions. Mirrors the teacher's atomic
// temp-file + rename writes for on-disk state that must never be observed
// half-written.

use crate::constants::{LOCKFILE_NAME, PORT_RANGE_END, PORT_RANGE_START, TOKEN_BYTES};
use crate::error::{EngineError, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lockfile {
    pub port: u16,
    pub token: String,
    pub engine_uuid: String,
    pub engine_pid: u32,
    pub parent_pid: u32,
    pub created_at: String,
}

pub enum StartupOutcome {
    /// No live engine holds this data root; `Lockfile` is freshly written.
    Proceed(Lockfile),
    AlreadyRunning,
    ConflictingEngine,
}

fn lockfile_path(data_root: &Path) -> PathBuf {
    data_root.join(LOCKFILE_NAME)
}

impl Lockfile {
    fn generate(parent_pid: u32) -> Result<Self> {
        let port = pick_available_port()?;
        let token = generate_token();
        Ok(Lockfile {
            port,
            token,
            engine_uuid: uuid::Uuid::new_v4().to_string(),
            engine_pid: std::process::id(),
            parent_pid,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// The startup protocol from the lifecycle contract: probe any existing
    /// lockfile, decide whether to take over a stale one, and either hand
    /// back a freshly written lockfile or an outcome the caller must exit on.
    pub fn startup(data_root: &Path, parent_pid: u32) -> Result<StartupOutcome> {
        let path = lockfile_path(data_root);

        if let Some(existing) = read_lockfile(&path)? {
            if probe_health(existing.port, &existing.token, &existing.engine_uuid) {
                tracing::warn!(uuid = %existing.engine_uuid, "another engine instance is already serving this data root");
                return Ok(StartupOutcome::AlreadyRunning);
            }

            if pid_is_alive(existing.engine_pid) {
                tracing::warn!(pid = existing.engine_pid, "lockfile pid alive but uuid mismatched or unresponsive");
                return Ok(StartupOutcome::ConflictingEngine);
            }

            tracing::info!(pid = existing.engine_pid, "removing stale lockfile");
            let _ = std::fs::remove_file(&path);
        }

        let lockfile = Self::generate(parent_pid)?;
        lockfile.write(&path)?;
        Ok(StartupOutcome::Proceed(lockfile))
    }

    fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp_path = path.with_extension("lock.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn remove(data_root: &Path) -> Result<()> {
        let path = lockfile_path(data_root);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Redact the token to its first 4 characters for logging.
    pub fn redacted_token(&self) -> String {
        format!("{}…", &self.token.chars().take(4).collect::<String>())
    }
}

fn read_lockfile(path: &Path) -> Result<Option<Lockfile>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    match serde_json::from_str(&contents) {
        Ok(lockfile) => Ok(Some(lockfile)),
        Err(_) => Ok(None), // corrupt lockfile is treated as stale
    }
}

fn pick_available_port() -> Result<u16> {
    for port in PORT_RANGE_START..=PORT_RANGE_END {
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return Ok(port);
        }
    }
    Err(EngineError::EngineStartupTimeout)
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    url_safe_base64(&bytes)
}

fn url_safe_base64(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
    let mut out = String::with_capacity((bytes.len() * 4 + 2) / 3);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = *chunk.get(1).unwrap_or(&0) as u32;
        let b2 = *chunk.get(2).unwrap_or(&0) as u32;
        let n = (b0 << 16) | (b1 << 8) | b2;
        out.push(ALPHABET[((n >> 18) & 0x3f) as usize] as char);
        out.push(ALPHABET[((n >> 12) & 0x3f) as usize] as char);
        if chunk.len() > 1 {
            out.push(ALPHABET[((n >> 6) & 0x3f) as usize] as char);
        }
        if chunk.len() > 2 {
            out.push(ALPHABET[(n & 0x3f) as usize] as char);
        }
    }
    out
}

/// Check whether the PID referenced by a lockfile is still alive. Signal 0
/// sends nothing but still fails with `ESRCH` if the process is gone.
#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    false
}

/// Probe `/health` at the advertised port with a short timeout, verifying
/// the response carries a matching `engine_uuid`.
fn probe_health(port: u16, token: &str, expected_uuid: &str) -> bool {
    let timeout = Duration::from_millis(crate::constants::HEALTH_PROBE_TIMEOUT_MS);
    let addr = format!("127.0.0.1:{}", port);
    let Ok(mut stream) = std::net::TcpStream::connect_timeout(
        &addr.parse().unwrap_or_else(|_| "127.0.0.1:1".parse().unwrap()),
        timeout,
    ) else {
        return false;
    };
    let _ = stream.set_read_timeout(Some(timeout));
    let _ = stream.set_write_timeout(Some(timeout));

    let request = format!(
        "GET /health HTTP/1.1\r\nHost: 127.0.0.1\r\nAuthorization: Bearer {}\r\nConnection: close\r\n\r\n",
        token
    );
    if stream.write_all(request.as_bytes()).is_err() {
        return false;
    }

    let mut response = String::new();
    if stream.read_to_string(&mut response).is_err() {
        return false;
    }

    response.contains("200") && response.contains(expected_uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn token_is_url_safe_and_right_length() {
        let token = generate_token();
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(token.len() >= 40);
    }

    #[test]
    fn startup_with_no_lockfile_proceeds() {
        let dir = tempdir().unwrap();
        match Lockfile::startup(dir.path(), std::process::id()).unwrap() {
            StartupOutcome::Proceed(lock) => {
                assert!(lock.port >= PORT_RANGE_START && lock.port <= PORT_RANGE_END);
                assert!(lockfile_path(dir.path()).exists());
            }
            _ => panic!("expected Proceed"),
        }
    }

    #[test]
    fn startup_removes_stale_lockfile_with_dead_pid() {
        let dir = tempdir().unwrap();
        let stale = Lockfile {
            port: 48123,
            token: "deadbeef".into(),
            engine_uuid: uuid::Uuid::new_v4().to_string(),
            engine_pid: 999_999, // extremely unlikely to be a live pid
            parent_pid: 1,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        stale.write(&lockfile_path(dir.path())).unwrap();

        match Lockfile::startup(dir.path(), std::process::id()).unwrap() {
            StartupOutcome::Proceed(_) => {}
            _ => panic!("expected stale lockfile to be cleared"),
        }
    }

    #[test]
    fn redacted_token_only_shows_prefix() {
        let lock = Lockfile {
            port: 48100,
            token: "abcdefghijklmnop".into(),
            engine_uuid: "u".into(),
            engine_pid: 1,
            parent_pid: 1,
            created_at: "now".into(),
        };
        assert_eq!(lock.redacted_token(), "abcd…");
    }
}
