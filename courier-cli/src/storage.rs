//! On-disk client state: server address and local identity, both plain text
//! files resolved next to the executable.
//!
//! `server.info` holds one `host:port` line. `me.info` holds three parts:
//! the display name, the 32-hex-digit client id, and the base64 private key
//! (which may span multiple lines).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use courier_core::PeerId;

pub const SERVER_FILE: &str = "server.info";
pub const IDENTITY_FILE: &str = "me.info";

/// Directory the info files live in: next to the executable, falling back to
/// the working directory when the executable path is unavailable.
pub fn data_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl ServerAddr {
    /// Parse a `host:port` line. The split is on the last colon so the host
    /// part may itself contain colons.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let Some((host, port)) = line.rsplit_once(':') else {
            bail!("expected host:port, got {line:?}");
        };
        if host.is_empty() {
            bail!("empty host in {line:?}");
        }
        let port: u16 = port
            .parse()
            .with_context(|| format!("bad port in {line:?}"))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

pub fn load_server_addr(dir: &Path) -> Result<ServerAddr> {
    let path = dir.join(SERVER_FILE);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let line = text
        .lines()
        .next()
        .with_context(|| format!("{} is empty", path.display()))?;
    ServerAddr::parse(line).with_context(|| format!("bad server address in {}", path.display()))
}

/// The persisted identity, exactly as stored. The private key stays in its
/// encoded form here; only the key adapter decodes it.
#[derive(Debug, Clone)]
pub struct SavedIdentity {
    pub name: String,
    pub id: PeerId,
    pub encoded_private_key: String,
}

/// Load the identity file if one exists. A missing file means first run; a
/// malformed file is an error, not a silent re-registration.
pub fn load_identity(dir: &Path) -> Result<Option<SavedIdentity>> {
    let path = dir.join(IDENTITY_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("cannot read {}", path.display())),
    };
    let mut lines = text.lines();
    let name = lines
        .next()
        .with_context(|| format!("{} is empty", path.display()))?
        .trim()
        .to_string();
    let id_line = lines
        .next()
        .with_context(|| format!("{} is missing the id line", path.display()))?;
    let id = PeerId::from_hex(id_line.trim())
        .with_context(|| format!("bad client id in {}", path.display()))?;
    let encoded_private_key: String = lines.collect::<Vec<_>>().join("\n");
    if encoded_private_key.trim().is_empty() {
        bail!("{} is missing the private key", path.display());
    }
    Ok(Some(SavedIdentity {
        name,
        id,
        encoded_private_key,
    }))
}

pub fn save_identity(dir: &Path, identity: &SavedIdentity) -> Result<()> {
    let path = dir.join(IDENTITY_FILE);
    let contents = format!(
        "{}\n{}\n{}\n",
        identity.name,
        identity.id.to_hex(),
        identity.encoded_private_key
    );
    fs::write(&path, contents).with_context(|| format!("cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("courier-cli-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn server_addr_parsing() {
        let addr = ServerAddr::parse("127.0.0.1:1357").unwrap();
        assert_eq!(addr.host, "127.0.0.1");
        assert_eq!(addr.port, 1357);

        // Last-colon split keeps colons in the host part intact.
        let addr = ServerAddr::parse("::1:8080").unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 8080);

        assert!(ServerAddr::parse("no-port-here").is_err());
        assert!(ServerAddr::parse("host:notaport").is_err());
        assert!(ServerAddr::parse(":1234").is_err());
        assert!(ServerAddr::parse("host:99999").is_err());
    }

    #[test]
    fn server_file_first_line_wins() {
        let dir = scratch_dir("server");
        fs::write(dir.join(SERVER_FILE), "localhost:1357\nignored garbage\n").unwrap();
        let addr = load_server_addr(&dir).unwrap();
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, 1357);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_server_file_is_an_error() {
        let dir = scratch_dir("no-server");
        assert!(load_server_addr(&dir).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn identity_roundtrip() {
        let dir = scratch_dir("identity");
        let saved = SavedIdentity {
            name: "alice".to_string(),
            id: PeerId::from_bytes([0xAB; 16]),
            encoded_private_key: "QUJDREVG".to_string(),
        };
        save_identity(&dir, &saved).unwrap();

        let loaded = load_identity(&dir).unwrap().unwrap();
        assert_eq!(loaded.name, "alice");
        assert_eq!(loaded.id, saved.id);
        assert_eq!(loaded.encoded_private_key, "QUJDREVG");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn identity_key_may_span_lines() {
        let dir = scratch_dir("multiline");
        fs::write(
            dir.join(IDENTITY_FILE),
            format!("bob\n{}\nQUJD\nREVG\n", PeerId::from_bytes([1; 16]).to_hex()),
        )
        .unwrap();
        let loaded = load_identity(&dir).unwrap().unwrap();
        assert_eq!(loaded.encoded_private_key, "QUJD\nREVG");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_identity_is_first_run() {
        let dir = scratch_dir("first-run");
        assert!(load_identity(&dir).unwrap().is_none());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn malformed_identity_is_an_error() {
        let dir = scratch_dir("malformed");
        fs::write(dir.join(IDENTITY_FILE), "alice\nnot-hex-at-all\nQUJD\n").unwrap();
        assert!(load_identity(&dir).is_err());

        fs::write(dir.join(IDENTITY_FILE), "alice\n").unwrap();
        assert!(load_identity(&dir).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
