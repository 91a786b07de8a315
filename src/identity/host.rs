//! Identity provider backed by the local host.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use log::warn;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{Identity, IdentityProvider};

const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Resolves identity from the host: a persisted device id, a hashed trace id
/// and the host name.
#[derive(Clone, Debug)]
pub struct HostIdentityProvider {
    device_id_path: PathBuf,
}

impl HostIdentityProvider {
    /// Create a provider persisting the device id at `device_id_path`.
    pub fn new(device_id_path: impl Into<PathBuf>) -> Self {
        Self {
            device_id_path: device_id_path.into(),
        }
    }

    pub fn device_id_path(&self) -> &Path {
        &self.device_id_path
    }
}

impl IdentityProvider for HostIdentityProvider {
    fn identity(&self) -> Identity {
        let device_id = load_or_create_device_id(&self.device_id_path).unwrap_or_else(|err| {
            warn!(
                "femtoship: cannot persist device id at {}: {err}; using an ephemeral id",
                self.device_id_path.display()
            );
            Uuid::new_v4().to_string()
        });
        let hostname = resolve_hostname();
        let trace_id = compute_trace_id(&hostname, machine_id().as_deref());
        Identity {
            device_id,
            trace_id,
            hostname,
        }
    }
}

/// Load the device id stored at `path`, or generate and persist a new one.
///
/// Existing content that is not a UUID is replaced.
///
/// # Errors
///
/// Returns an error if a new id cannot be written.
pub fn load_or_create_device_id(path: &Path) -> io::Result<String> {
    if let Ok(existing) = fs::read_to_string(path) {
        let existing = existing.trim();
        if Uuid::parse_str(existing).is_ok() {
            return Ok(existing.to_owned());
        }
    }
    let id = Uuid::new_v4().to_string();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &id)?;
    Ok(id)
}

fn resolve_hostname() -> String {
    if let Ok(name) = env::var("HOSTNAME")
        && !name.trim().is_empty()
    {
        return name.trim().to_owned();
    }
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            warn!("femtoship: cannot resolve host name: {err}");
            String::new()
        }
    }
}

fn machine_id() -> Option<String> {
    MACHINE_ID_PATHS
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok())
        .map(|id| id.trim().to_owned())
        .find(|id| !id.is_empty())
}

/// Hash host facts into a 32-character uppercase hex trace id.
///
/// Falls back to random input when no host facts are available, in which case
/// the id is only stable for the lifetime of the cache holding it.
pub(crate) fn compute_trace_id(hostname: &str, machine_id: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    if hostname.is_empty() && machine_id.is_none() {
        hasher.update(rand::random::<u128>().to_le_bytes());
    } else {
        hasher.update(hostname.as_bytes());
        hasher.update(machine_id.unwrap_or_default().as_bytes());
        hasher.update(env::consts::OS.as_bytes());
        hasher.update(env::consts::ARCH.as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode_upper(&digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn device_id_is_created_then_stable() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("device-id");
        let first = load_or_create_device_id(&path).expect("create id");
        assert!(Uuid::parse_str(&first).is_ok());
        let second = load_or_create_device_id(&path).expect("reload id");
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_device_id_is_replaced() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("device-id");
        fs::write(&path, "not-a-uuid").expect("seed file");
        let id = load_or_create_device_id(&path).expect("regenerate");
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(fs::read_to_string(&path).expect("read back"), id);
    }

    #[test]
    fn trace_id_is_deterministic_for_host_facts() {
        let a = compute_trace_id("box", Some("abc"));
        let b = compute_trace_id("box", Some("abc"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(a, compute_trace_id("other", Some("abc")));
    }

    #[test]
    fn trace_id_without_facts_is_random() {
        assert_ne!(compute_trace_id("", None), compute_trace_id("", None));
    }

    #[test]
    fn host_provider_persists_device_id() {
        let dir = tempdir().expect("temp dir");
        let provider = HostIdentityProvider::new(dir.path().join("device-id"));
        let first = provider.identity();
        let second = provider.identity();
        assert_eq!(first.device_id, second.device_id);
        assert_eq!(first.trace_id, second.trace_id);
    }
}
