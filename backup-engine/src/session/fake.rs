//! Scripted in-memory connector for tests.

use super::{DeviceConnector, DeviceSession};
use crate::device::Device;
use crate::utils::errors::{ConnectError, FetchError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Config(String),
    ConnectFails,
    FetchFails,
    /// Sleep, then return the config.
    Slow(Duration, String),
    Panics,
}

#[derive(Default)]
struct Counters {
    opens: HashMap<String, usize>,
    closes: HashMap<String, usize>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Connector whose per-hostname behavior is set by the test. Unlisted
/// hostnames return `hostname <name>` as their configuration.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    behaviors: Arc<Mutex<HashMap<String, Behavior>>>,
    counters: Arc<Mutex<Counters>>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(self, hostname: &str, behavior: Behavior) -> Self {
        self.set(hostname, behavior);
        self
    }

    pub(crate) fn set(&self, hostname: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(hostname.to_string(), behavior);
    }

    pub(crate) fn opens(&self, hostname: &str) -> usize {
        self.counters.lock().unwrap().opens.get(hostname).copied().unwrap_or(0)
    }

    pub(crate) fn closes(&self, hostname: &str) -> usize {
        self.counters.lock().unwrap().closes.get(hostname).copied().unwrap_or(0)
    }

    /// Highest number of sessions open at the same time.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.counters.lock().unwrap().max_in_flight
    }

    fn behavior(&self, hostname: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(hostname)
            .cloned()
            .unwrap_or_else(|| Behavior::Config(format!("hostname {}\n", hostname)))
    }
}

impl DeviceConnector for FakeConnector {
    fn open(&self, device: &Device) -> Result<Box<dyn DeviceSession>, ConnectError> {
        let behavior = self.behavior(&device.hostname);
        if matches!(behavior, Behavior::ConnectFails) {
            return Err(ConnectError::Other(format!("{} unreachable", device.address)));
        }
        {
            let mut counters = self.counters.lock().unwrap();
            *counters.opens.entry(device.hostname.clone()).or_default() += 1;
            counters.in_flight += 1;
            counters.max_in_flight = counters.max_in_flight.max(counters.in_flight);
        }
        Ok(Box::new(FakeSession {
            hostname: device.hostname.clone(),
            behavior,
            counters: self.counters.clone(),
        }))
    }
}

struct FakeSession {
    hostname: String,
    behavior: Behavior,
    counters: Arc<Mutex<Counters>>,
}

impl DeviceSession for FakeSession {
    fn fetch_running_config(&mut self) -> Result<String, FetchError> {
        match &self.behavior {
            Behavior::Config(config) => Ok(config.clone()),
            Behavior::FetchFails => Err(FetchError::Command {
                command: "show running-config".into(),
                reason: "% Invalid input detected".into(),
            }),
            Behavior::Slow(delay, config) => {
                std::thread::sleep(*delay);
                Ok(config.clone())
            }
            Behavior::Panics => panic!("session fault on {}", self.hostname),
            Behavior::ConnectFails => unreachable!("connect failures never open a session"),
        }
    }

    fn close(&mut self) {
        let mut counters = self.counters.lock().unwrap();
        *counters.closes.entry(self.hostname.clone()).or_default() += 1;
        counters.in_flight -= 1;
    }
}
