//! Remote CLI sessions.
//!
//! The engine only sees [`DeviceConnector`] and [`DeviceSession`]; the SSH
//! implementation lives in [`ssh`]. Calls are blocking and run on tokio's
//! blocking pool.

pub mod ssh;

#[cfg(test)]
pub(crate) mod fake;

use crate::device::Device;
use crate::utils::errors::{ConnectError, FetchError};
use std::ops::{Deref, DerefMut};

pub use ssh::SshConnector;

/// Opens sessions to devices.
pub trait DeviceConnector: Send + Sync {
    fn open(&self, device: &Device) -> Result<Box<dyn DeviceSession>, ConnectError>;
}

/// An authenticated CLI channel to one device.
pub trait DeviceSession: Send {
    /// Run the platform's "show running configuration" command.
    fn fetch_running_config(&mut self) -> Result<String, FetchError>;

    /// Release the session. Called exactly once, by [`SessionGuard`].
    fn close(&mut self);
}

/// Scoped session handle: closes the session when dropped, including
/// during unwinding, unless [`SessionGuard::close`] already did.
pub struct SessionGuard {
    session: Option<Box<dyn DeviceSession>>,
    hostname: String,
}

impl SessionGuard {
    pub fn new(session: Box<dyn DeviceSession>, hostname: impl Into<String>) -> Self {
        Self {
            session: Some(session),
            hostname: hostname.into(),
        }
    }

    /// Close now. Later calls and the eventual drop are no-ops.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            tracing::debug!(hostname = %self.hostname, "Session closed");
        }
    }
}

impl Deref for SessionGuard {
    type Target = dyn DeviceSession;

    fn deref(&self) -> &Self::Target {
        match &self.session {
            Some(session) => session.as_ref(),
            None => panic!("session for {} used after close", self.hostname),
        }
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.session {
            Some(session) => session.as_mut(),
            None => panic!("session for {} used after close", self.hostname),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{Behavior, FakeConnector};
    use super::*;

    #[test]
    fn test_guard_closes_once() {
        let connector = FakeConnector::new().with("r1", Behavior::Config("cfg".into()));
        let session = connector.open(&Device::new("r1", "10.0.0.1")).unwrap();

        let mut guard = SessionGuard::new(session, "r1");
        assert_eq!(guard.fetch_running_config().unwrap(), "cfg");
        guard.close();
        guard.close();
        drop(guard);

        assert_eq!(connector.closes("r1"), 1);
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let connector = FakeConnector::new();
        let session = connector.open(&Device::new("r2", "10.0.0.2")).unwrap();
        drop(SessionGuard::new(session, "r2"));
        assert_eq!(connector.closes("r2"), 1);
    }

    #[test]
    fn test_guard_closes_during_panic() {
        let connector = FakeConnector::new();
        let session = connector.open(&Device::new("r3", "10.0.0.3")).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = SessionGuard::new(session, "r3");
            panic!("worker fault");
        }));

        assert!(result.is_err());
        assert_eq!(connector.closes("r3"), 1);
    }
}
