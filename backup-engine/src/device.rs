//! Device identity as read from the inventory.

use crate::utils::Sensitive;

/// One network device. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Device {
    /// IP address or DNS name used to open the session
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: Sensitive,
    /// Privilege-escalation (enable) secret; empty when not needed
    pub secret: Sensitive,
    /// Platform tag selecting the retrieval command, e.g. `cisco_ios`
    pub device_type: String,
    /// Versioning key: names the storage partition and artifact files
    pub hostname: String,
}

impl Device {
    pub fn new(hostname: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: 22,
            username: String::new(),
            password: Sensitive::default(),
            secret: Sensitive::default(),
            device_type: "cisco_ios".to_string(),
            hostname: hostname.into(),
        }
    }
}

/// Whether `hostname` can safely name a partition directory and artifact files.
pub fn is_safe_hostname(hostname: &str) -> bool {
    !hostname.is_empty()
        && hostname != "."
        && hostname != ".."
        && !hostname.starts_with('.')
        && hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
