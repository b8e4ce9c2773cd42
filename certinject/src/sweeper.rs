// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Removal of stale injected certificates.

Only entries carrying the injector's marker with its expected value are
candidates. An entry is stale once its key's last modified time is further
than the expiry period from now, in either direction: a timestamp far in the
future means the clock moved and the bookkeeping can no longer be trusted.
*/

use {
    crate::{
        config::CryptoApiConfig,
        error::CertInjectError,
        injector::{MARKER_MAGIC, MARKER_VALUE_NAME},
        registry::{KeyAccess, Registry, RegistryError, RegistryKey},
    },
    chrono::{DateTime, Utc},
    log::{debug, info, warn},
    std::time::Duration,
};

/// Whether an entry last modified at `modified` has expired at `now`.
///
/// Compares at full timestamp precision. An entry exactly `period` away is
/// still valid.
pub fn is_expired(modified: DateTime<Utc>, now: DateTime<Utc>, period: Duration) -> bool {
    let drift = now.signed_duration_since(modified);
    let drift = if drift < chrono::Duration::zero() {
        -drift
    } else {
        drift
    };

    match chrono::Duration::from_std(period) {
        Ok(period) => drift > period,
        // Longer than any representable drift.
        Err(_) => false,
    }
}

/// Tally of a sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Number of store entries looked at.
    pub examined: usize,
    pub deleted: Vec<String>,
    /// Entries without the marker.
    pub skipped_unmarked: usize,
    /// Entries whose marker has an unrecognized value.
    pub skipped_foreign: usize,
    /// Marked entries that have not expired.
    pub retained: usize,
    /// Entries that could not be processed, with the reason.
    pub failures: Vec<(String, RegistryError)>,
}

/// What happened to a single entry.
enum Disposition {
    Unmarked,
    Foreign(u32),
    Retained,
    Expired,
}

/// Deletes expired entries from the store described by a [CryptoApiConfig].
pub struct Sweeper<'a, R: Registry> {
    registry: &'a R,
    config: &'a CryptoApiConfig,
}

impl<'a, R: Registry> Sweeper<'a, R> {
    pub fn new(registry: &'a R, config: &'a CryptoApiConfig) -> Self {
        Self { registry, config }
    }

    /// Sweep using the current time.
    pub fn sweep(&self) -> Result<SweepReport, CertInjectError> {
        self.sweep_at(Utc::now())
    }

    /// Sweep as of `now`.
    ///
    /// Failures on individual entries are collected in the report. Only a
    /// failure to open or list the store itself is an error.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, CertInjectError> {
        let descriptor = self.config.physical_store.descriptor();
        let location = descriptor.display(&self.config.logical_store);
        let mut report = SweepReport::default();

        let store = match self.registry.open_key(
            descriptor.root,
            &descriptor.key_path(&self.config.logical_store),
            KeyAccess::ReadWrite,
        ) {
            Ok(key) => key,
            Err(e) if e.is_not_found() => {
                debug!("{} does not exist; nothing to sweep", location);
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };

        for name in store.subkey_names()? {
            report.examined += 1;

            match self.examine(&store, &name, now) {
                Ok(Disposition::Unmarked) => {
                    report.skipped_unmarked += 1;
                }
                Ok(Disposition::Foreign(value)) => {
                    debug!("{} has foreign marker value {}; leaving it", name, value);
                    report.skipped_foreign += 1;
                }
                Ok(Disposition::Retained) => {
                    report.retained += 1;
                }
                Ok(Disposition::Expired) => match store.delete_subkey(&name) {
                    Ok(()) => {
                        info!("deleted expired certificate {} from {}", name, location);
                        report.deleted.push(name);
                    }
                    Err(e) => {
                        warn!("unable to delete expired certificate {}: {}", name, e);
                        report.failures.push((name, e));
                    }
                },
                Err(e) => {
                    warn!("unable to examine {}: {}", name, e);
                    report.failures.push((name, e));
                }
            }
        }

        Ok(report)
    }

    fn examine(
        &self,
        store: &R::Key,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Disposition, RegistryError> {
        let entry = store.open_subkey(name, KeyAccess::Read)?;

        let marker = match entry.get_dword_value(MARKER_VALUE_NAME) {
            Ok(value) => value,
            Err(RegistryError::NotFound(_)) | Err(RegistryError::UnexpectedType(_)) => {
                return Ok(Disposition::Unmarked)
            }
            Err(e) => return Err(e),
        };

        if marker != MARKER_MAGIC {
            return Ok(Disposition::Foreign(marker));
        }

        let modified = entry.last_modified()?;

        Ok(if is_expired(modified, now, self.config.expiry_period) {
            Disposition::Expired
        } else {
            Disposition::Retained
        })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            injector::{CertificateSource, Injector},
            registry::{MemoryKey, MemoryRegistry, RegistryRoot},
        },
        chrono::TimeZone,
    };

    /// Wraps a [MemoryRegistry], failing operations on chosen entry names.
    struct FlakyRegistry {
        inner: MemoryRegistry,
        unopenable: &'static str,
        undeletable: &'static str,
    }

    struct FlakyKey {
        inner: MemoryKey,
        unopenable: &'static str,
        undeletable: &'static str,
    }

    impl FlakyRegistry {
        fn wrap(&self, inner: MemoryKey) -> FlakyKey {
            FlakyKey {
                inner,
                unopenable: self.unopenable,
                undeletable: self.undeletable,
            }
        }
    }

    impl Registry for FlakyRegistry {
        type Key = FlakyKey;

        fn open_key(
            &self,
            root: RegistryRoot,
            path: &str,
            access: KeyAccess,
        ) -> Result<Self::Key, RegistryError> {
            Ok(self.wrap(self.inner.open_key(root, path, access)?))
        }

        fn create_key(&self, root: RegistryRoot, path: &str) -> Result<Self::Key, RegistryError> {
            Ok(self.wrap(self.inner.create_key(root, path)?))
        }
    }

    impl FlakyKey {
        fn wrap(&self, inner: MemoryKey) -> Self {
            Self {
                inner,
                unopenable: self.unopenable,
                undeletable: self.undeletable,
            }
        }
    }

    impl RegistryKey for FlakyKey {
        fn open_subkey(&self, path: &str, access: KeyAccess) -> Result<Self, RegistryError> {
            if path == self.unopenable {
                return Err(RegistryError::Os {
                    operation: "RegOpenKeyExW",
                    path: path.to_string(),
                    code: 5,
                });
            }

            Ok(self.wrap(self.inner.open_subkey(path, access)?))
        }

        fn create_subkey(&self, path: &str) -> Result<Self, RegistryError> {
            Ok(self.wrap(self.inner.create_subkey(path)?))
        }

        fn get_binary_value(&self, name: &str) -> Result<Vec<u8>, RegistryError> {
            self.inner.get_binary_value(name)
        }

        fn set_binary_value(&self, name: &str, data: &[u8]) -> Result<(), RegistryError> {
            self.inner.set_binary_value(name, data)
        }

        fn get_dword_value(&self, name: &str) -> Result<u32, RegistryError> {
            self.inner.get_dword_value(name)
        }

        fn set_dword_value(&self, name: &str, value: u32) -> Result<(), RegistryError> {
            self.inner.set_dword_value(name, value)
        }

        fn delete_value(&self, name: &str) -> Result<(), RegistryError> {
            self.inner.delete_value(name)
        }

        fn delete_subkey(&self, name: &str) -> Result<(), RegistryError> {
            if name == self.undeletable {
                return Err(RegistryError::Os {
                    operation: "RegDeleteTreeW",
                    path: name.to_string(),
                    code: 5,
                });
            }

            self.inner.delete_subkey(name)
        }

        fn subkey_names(&self) -> Result<Vec<String>, RegistryError> {
            self.inner.subkey_names()
        }

        fn last_modified(&self) -> Result<DateTime<Utc>, RegistryError> {
            self.inner.last_modified()
        }
    }

    const ROOT_CERTIFICATES: &str = r"SOFTWARE\Microsoft\SystemCertificates\Root\Certificates";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, 16, 12, 0, 0).unwrap()
    }

    fn config(period: u64) -> CryptoApiConfig {
        CryptoApiConfig {
            expiry_period: Duration::from_secs(period),
            ..Default::default()
        }
    }

    fn entry(registry: &MemoryRegistry, name: &str, marker: Option<u32>) {
        let key = registry
            .create_key(
                RegistryRoot::LocalMachine,
                &format!("{}\\{}", ROOT_CERTIFICATES, name),
            )
            .unwrap();
        key.set_binary_value("Blob", b"").unwrap();
        if let Some(value) = marker {
            key.set_dword_value(MARKER_VALUE_NAME, value).unwrap();
        }
    }

    fn exists(registry: &MemoryRegistry, name: &str) -> bool {
        registry.key_exists(
            RegistryRoot::LocalMachine,
            &format!("{}\\{}", ROOT_CERTIFICATES, name),
        )
    }

    #[test]
    fn expiry_boundary() {
        let period = Duration::from_secs(100);
        let now = t0();

        assert!(!is_expired(now, now, period));
        assert!(!is_expired(now - chrono::Duration::seconds(100), now, period));
        assert!(is_expired(now - chrono::Duration::seconds(101), now, period));
        assert!(!is_expired(now - chrono::Duration::seconds(99), now, period));
        assert!(!is_expired(now + chrono::Duration::seconds(100), now, period));
        assert!(is_expired(now + chrono::Duration::seconds(101), now, period));
    }

    #[test]
    fn fractional_drift_expires() {
        let period = Duration::from_secs(100);
        let now = t0();

        assert!(is_expired(
            now - chrono::Duration::milliseconds(100_900),
            now,
            period
        ));
        assert!(is_expired(
            now + chrono::Duration::microseconds(100_000_001),
            now,
            period
        ));
        assert!(!is_expired(
            now - chrono::Duration::milliseconds(99_999),
            now,
            period
        ));
        assert!(!is_expired(now, now, Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn deletes_only_expired_marked_entries() -> Result<(), CertInjectError> {
        let registry = MemoryRegistry::with_time(t0());
        let config = config(100);

        entry(&registry, "OLD", Some(MARKER_MAGIC));
        entry(&registry, "UNMARKED", None);
        entry(&registry, "FOREIGN", Some(2));
        registry.advance(chrono::Duration::seconds(50));
        entry(&registry, "RECENT", Some(MARKER_MAGIC));
        registry.advance(chrono::Duration::seconds(51));

        let report = Sweeper::new(&registry, &config).sweep_at(registry.now())?;

        assert_eq!(report.examined, 4);
        assert_eq!(report.deleted, vec!["OLD".to_string()]);
        assert_eq!(report.skipped_unmarked, 1);
        assert_eq!(report.skipped_foreign, 1);
        assert_eq!(report.retained, 1);
        assert!(report.failures.is_empty());

        assert!(!exists(&registry, "OLD"));
        assert!(exists(&registry, "UNMARKED"));
        assert!(exists(&registry, "FOREIGN"));
        assert!(exists(&registry, "RECENT"));

        Ok(())
    }

    #[test]
    fn future_entries_expire() -> Result<(), CertInjectError> {
        let registry = MemoryRegistry::with_time(t0());
        let config = config(100);

        entry(&registry, "SKEWED", Some(MARKER_MAGIC));
        entry(&registry, "CLOSE", Some(MARKER_MAGIC));
        registry.set_last_modified(
            RegistryRoot::LocalMachine,
            &format!("{}\\SKEWED", ROOT_CERTIFICATES),
            t0() + chrono::Duration::seconds(101),
        )?;
        registry.set_last_modified(
            RegistryRoot::LocalMachine,
            &format!("{}\\CLOSE", ROOT_CERTIFICATES),
            t0() + chrono::Duration::seconds(99),
        )?;

        let report = Sweeper::new(&registry, &config).sweep_at(t0())?;
        assert_eq!(report.deleted, vec!["SKEWED".to_string()]);
        assert_eq!(report.retained, 1);

        Ok(())
    }

    #[test]
    fn old_foreign_and_unmarked_entries_survive() -> Result<(), CertInjectError> {
        let registry = MemoryRegistry::with_time(t0());
        let config = config(1);

        entry(&registry, "FOREIGN", Some(0));
        entry(&registry, "UNMARKED", None);
        registry
            .open_key(
                RegistryRoot::LocalMachine,
                &format!("{}\\UNMARKED", ROOT_CERTIFICATES),
                KeyAccess::ReadWrite,
            )?
            .set_binary_value(MARKER_VALUE_NAME, b"\x01\x00\x00\x00")?;

        let report = Sweeper::new(&registry, &config)
            .sweep_at(t0() + chrono::Duration::days(365))?;

        assert!(report.deleted.is_empty());
        assert_eq!(report.skipped_foreign, 1);
        assert_eq!(report.skipped_unmarked, 1);
        assert!(exists(&registry, "FOREIGN"));
        assert!(exists(&registry, "UNMARKED"));

        Ok(())
    }

    #[test]
    fn missing_store() -> Result<(), CertInjectError> {
        let registry = MemoryRegistry::new();
        let report = Sweeper::new(&registry, &config(1)).sweep()?;

        assert_eq!(report.examined, 0);
        assert!(report.deleted.is_empty());
        assert!(report.failures.is_empty());

        Ok(())
    }

    #[test]
    fn sweeps_injected_certificates() -> Result<(), CertInjectError> {
        let registry = MemoryRegistry::with_time(t0());
        let config = config(1800);

        let outcome = Injector::new(&registry, &config)
            .inject(&CertificateSource::Der(b"\x30\x00".to_vec()))?;

        let sweeper = Sweeper::new(&registry, &config);
        let report = sweeper.sweep_at(t0() + chrono::Duration::seconds(1800))?;
        assert_eq!(report.retained, 1);

        let report = sweeper.sweep_at(t0() + chrono::Duration::seconds(1801))?;
        assert_eq!(report.deleted, vec![outcome.fingerprint.to_string()]);

        Ok(())
    }

    #[test]
    fn entry_failures_do_not_abort_sweep() -> Result<(), CertInjectError> {
        let memory = MemoryRegistry::with_time(t0());
        let config = config(100);

        // Enumerated in name order, so both failures precede the deletable entry.
        entry(&memory, "A_UNOPENABLE", Some(MARKER_MAGIC));
        entry(&memory, "B_UNDELETABLE", Some(MARKER_MAGIC));
        entry(&memory, "C_EXPIRED", Some(MARKER_MAGIC));

        let registry = FlakyRegistry {
            inner: memory.clone(),
            unopenable: "A_UNOPENABLE",
            undeletable: "B_UNDELETABLE",
        };

        let report = Sweeper::new(&registry, &config)
            .sweep_at(t0() + chrono::Duration::seconds(101))?;

        assert_eq!(report.examined, 3);
        assert_eq!(report.deleted, vec!["C_EXPIRED".to_string()]);
        assert_eq!(
            report
                .failures
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>(),
            vec!["A_UNOPENABLE", "B_UNDELETABLE"]
        );
        assert!(report
            .failures
            .iter()
            .all(|(_, e)| matches!(e, RegistryError::Os { code: 5, .. })));

        assert!(exists(&memory, "A_UNOPENABLE"));
        assert!(exists(&memory, "B_UNDELETABLE"));
        assert!(!exists(&memory, "C_EXPIRED"));

        Ok(())
    }
}
