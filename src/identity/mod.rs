//! Device and host identity used to tag outgoing records.
//!
//! Identity resolution is a collaborator of the delivery subsystem: the
//! transport worker asks an [`IdentityProvider`] once when it starts and keeps
//! the result for its lifetime. [`CachedIdentity`] memoises any provider so the
//! lookup happens once per process even across worker restarts.

mod host;

use std::sync::Arc;

use once_cell::sync::OnceCell;

pub use host::{HostIdentityProvider, load_or_create_device_id};

/// Identity fields attached to every formatted record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    /// Stable per-installation UUID.
    pub device_id: String,
    /// Stable hash of host facts.
    pub trace_id: String,
    /// Host name, possibly empty when it cannot be resolved.
    pub hostname: String,
}

impl Identity {
    pub fn new(
        device_id: impl Into<String>,
        trace_id: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            trace_id: trace_id.into(),
            hostname: hostname.into(),
        }
    }
}

/// Source of [`Identity`] values.
///
/// Implementations may perform I/O; callers are expected to cache the result.
pub trait IdentityProvider: Send + Sync {
    fn identity(&self) -> Identity;
}

impl IdentityProvider for Identity {
    fn identity(&self) -> Identity {
        self.clone()
    }
}

impl<P: IdentityProvider + ?Sized> IdentityProvider for Arc<P> {
    fn identity(&self) -> Identity {
        (**self).identity()
    }
}

/// Resolve an inner provider once and serve the cached value afterwards.
pub struct CachedIdentity<P> {
    inner: P,
    cell: OnceCell<Identity>,
}

impl<P: IdentityProvider> CachedIdentity<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cell: OnceCell::new(),
        }
    }
}

impl<P: IdentityProvider> IdentityProvider for CachedIdentity<P> {
    fn identity(&self) -> Identity {
        self.cell.get_or_init(|| self.inner.identity()).clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingProvider(AtomicUsize);

    impl IdentityProvider for CountingProvider {
        fn identity(&self) -> Identity {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Identity::new(format!("device-{n}"), "trace", "host")
        }
    }

    #[test]
    fn cached_identity_resolves_once() {
        let cached = CachedIdentity::new(CountingProvider(AtomicUsize::new(0)));
        assert_eq!(cached.identity().device_id, "device-0");
        assert_eq!(cached.identity().device_id, "device-0");
        assert_eq!(cached.inner.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn static_identity_is_its_own_provider() {
        let identity = Identity::new("dev", "trace", "host");
        assert_eq!(identity.identity(), identity);
    }
}
