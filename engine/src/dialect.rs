//! Process-wide dialect registry.
//!
//! Dialect crates register an opener once at startup; stores are then
//! opened by dialect name and connection descriptor.

use crate::{
    driver::{Driver, DriverError, DriverOpener},
    error::Result,
    DialectName, Error,
};
use dashmap::DashMap;
use std::sync::{Arc, OnceLock};

fn registry() -> &'static DashMap<DialectName, Arc<dyn DriverOpener>> {
    static REGISTRY: OnceLock<DashMap<DialectName, Arc<dyn DriverOpener>>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

/// Register `opener` under `name`, replacing any earlier registration.
pub fn register(name: impl Into<DialectName>, opener: Arc<dyn DriverOpener>) {
    let name = name.into();
    tracing::debug!(dialect = %name, "dialect registered");
    registry().insert(name, opener);
}

pub fn resolve(name: &str) -> Result<Arc<dyn DriverOpener>> {
    registry()
        .get(name)
        .map(|entry| Arc::clone(entry.value()))
        .ok_or_else(|| Error::configuration(format!("no dialect registered under '{}'", name)))
}

/// Open a driver of dialect `name`.
pub fn open(name: &str, descriptor: &str) -> Result<Arc<dyn Driver>> {
    resolve(name)?.open(descriptor).map_err(|err| match err {
        DriverError::Validation(msg) => Error::configuration(format!(
            "invalid connection descriptor for dialect '{}': {}",
            name, msg
        )),
        other => other.into(),
    })
}

/// Names of all registered dialects, sorted.
pub fn registered() -> Vec<String> {
    let mut names: Vec<String> = registry().iter().map(|e| e.key().clone()).collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverResult;
    use crate::testing::FakeDriver;

    struct FakeOpener;

    impl DriverOpener for FakeOpener {
        fn open(&self, descriptor: &str) -> DriverResult<Arc<dyn Driver>> {
            if descriptor == "bad" {
                return Err(DriverError::Validation("unknown option".into()));
            }
            Ok(Arc::new(FakeDriver::new()))
        }
    }

    #[test]
    fn unknown_dialect_is_configuration_error() {
        let err = open("no-such-dialect", "").map(|_| ()).unwrap_err();
        assert_eq!(
            err,
            Error::configuration("no dialect registered under 'no-such-dialect'")
        );
    }

    #[test]
    fn registered_dialect_opens() {
        register("registry-test", Arc::new(FakeOpener));
        assert!(registered().contains(&"registry-test".to_string()));

        let driver = open("registry-test", "").unwrap();
        assert_eq!(driver.dialect(), "fake");

        let err = open("registry-test", "bad").map(|_| ()).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("unknown option")));
    }
}
