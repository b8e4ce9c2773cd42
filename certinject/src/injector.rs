// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Writing certificates into a CryptoAPI store.

Each certificate in a store is a registry key named after the certificate's
[Fingerprint]. The key holds a `Blob` value, the serialized
[CertificateBlob], and entries written by this crate additionally carry a
`Namecoin` DWORD marker so the [crate::Sweeper] can recognize them later.

Everything that can fail short of a registry write happens before the first
write, so a rejected policy never leaves a partially updated entry behind.
*/

use {
    crate::{
        config::CryptoApiConfig,
        error::CertInjectError,
        fingerprint::Fingerprint,
        registry::{KeyAccess, Registry, RegistryError, RegistryKey},
    },
    certinject_blob::{
        build_extended_key_usage, build_name_constraints, CertificateBlob, PropertyId,
        PropertyRecord,
    },
    log::{debug, info, warn},
};

/// Name of the value holding the serialized blob.
pub const BLOB_VALUE_NAME: &str = "Blob";

/// Name of the DWORD value tagging entries written by this crate.
pub const MARKER_VALUE_NAME: &str = "Namecoin";

/// Value of the marker on entries written by this crate.
pub const MARKER_MAGIC: u32 = 1;

/// The certificate to operate on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CertificateSource {
    /// DER certificate data.
    Der(Vec<u8>),
    /// A certificate already present in the store.
    Fingerprint(Fingerprint),
}

impl CertificateSource {
    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            Self::Der(der) => Fingerprint::of_der(der),
            Self::Fingerprint(fp) => fp.clone(),
        }
    }

    pub fn der(&self) -> Option<&[u8]> {
        match self {
            Self::Der(der) => Some(der),
            Self::Fingerprint(_) => None,
        }
    }
}

/// What an injection wrote.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InjectionOutcome {
    pub fingerprint: Fingerprint,
    /// Human readable location of the entry's key.
    pub location: String,
    /// Whether the written blob was based on one already in the store.
    pub base_from_store: bool,
    /// Ids of all properties in the written blob.
    pub properties: Vec<PropertyId>,
}

/// Injects certificates into the store described by a [CryptoApiConfig].
pub struct Injector<'a, R: Registry> {
    registry: &'a R,
    config: &'a CryptoApiConfig,
}

impl<'a, R: Registry> Injector<'a, R> {
    pub fn new(registry: &'a R, config: &'a CryptoApiConfig) -> Self {
        Self { registry, config }
    }

    /// Build the policy properties called for by the configuration.
    ///
    /// Nothing is built for policies that are not configured.
    pub fn policy_properties(&self) -> Result<Vec<PropertyRecord>, CertInjectError> {
        let mut records = vec![];

        if !self.config.purposes.is_empty() {
            let record = build_extended_key_usage(&self.config.purposes).map_err(|source| {
                CertInjectError::PropertyEncodeFailed {
                    property: "extended key usage",
                    source,
                }
            })?;
            debug!(
                "built extended key usage property ({} bytes): {}",
                record.data.len(),
                hex::encode(&record.data)
            );
            records.push(record);
        }

        if !self.config.name_constraints.is_empty() {
            let record = build_name_constraints(&self.config.name_constraints).map_err(
                |source| CertInjectError::PropertyEncodeFailed {
                    property: "name constraints",
                    source,
                },
            )?;
            debug!(
                "built name constraints property ({} bytes): {}",
                record.data.len(),
                hex::encode(&record.data)
            );
            records.push(record);
        }

        Ok(records)
    }

    /// Inject a certificate, applying the configured policy.
    pub fn inject(&self, source: &CertificateSource) -> Result<InjectionOutcome, CertInjectError> {
        let descriptor = self.config.physical_store.descriptor();
        let fingerprint = source.fingerprint();
        let store_path = descriptor.key_path(&self.config.logical_store);
        let entry_path = format!("{}\\{}", store_path, fingerprint);
        let location = format!(
            "{}\\{}",
            descriptor.display(&self.config.logical_store),
            fingerprint
        );

        info!("injecting certificate {} into {}", fingerprint, location);

        let (mut blob, base_from_store) = self.initial_blob(source, &fingerprint, &entry_path)?;

        for record in self.policy_properties()? {
            blob.set_property(record);
        }

        let data = blob.to_bytes()?;

        let store = self.registry.create_key(descriptor.root, &store_path)?;
        let entry = store.create_subkey(fingerprint.as_str())?;

        entry.set_binary_value(BLOB_VALUE_NAME, &data)?;
        debug!("wrote {} byte blob to {}", data.len(), location);

        // Recreating the marker refreshes the key's last modified time even
        // when the blob is unchanged.
        match entry.delete_value(MARKER_VALUE_NAME) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        entry.set_dword_value(MARKER_VALUE_NAME, MARKER_MAGIC)?;

        Ok(InjectionOutcome {
            fingerprint,
            location,
            base_from_store,
            properties: blob.ids(),
        })
    }

    /// Determine the blob that policy properties are applied on top of.
    ///
    /// Returns the blob and whether it came from the store.
    fn initial_blob(
        &self,
        source: &CertificateSource,
        fingerprint: &Fingerprint,
        entry_path: &str,
    ) -> Result<(CertificateBlob, bool), CertInjectError> {
        let der = source.der();

        if self.config.reset {
            if let Some(der) = der {
                debug!("reset requested; discarding existing properties");
                return Ok((CertificateBlob::from_certificate_der(der), false));
            }
        }

        let existing = match self.read_existing(entry_path) {
            Ok(data) => CertificateBlob::parse(&data).map_err(|e| {
                warn!("unable to parse existing blob for {}: {}", fingerprint, e);
                e.to_string()
            }),
            Err(e) if e.is_not_found() => Err(e.to_string()),
            Err(e) => {
                warn!("unable to read existing blob for {}: {}", fingerprint, e);
                Err(e.to_string())
            }
        };

        match (existing, der) {
            (Ok(blob), _) if self.config.reset => {
                let cert = blob.certificate_der().ok_or_else(|| CertInjectError::NoInitialBlob {
                    fingerprint: fingerprint.to_string(),
                    reason: "existing blob has no certificate content".to_string(),
                })?;

                Ok((CertificateBlob::from_certificate_der(cert), true))
            }
            (Ok(mut blob), der) => {
                debug!(
                    "using existing blob for {} with {} properties",
                    fingerprint,
                    blob.len()
                );
                if let Some(der) = der {
                    if !blob.contains(PropertyId::CERT) {
                        blob.set_property(PropertyRecord::certificate(der));
                    }
                }

                Ok((blob, true))
            }
            (Err(reason), Some(der)) => {
                debug!("starting from a fresh blob for {}: {}", fingerprint, reason);
                Ok((CertificateBlob::from_certificate_der(der), false))
            }
            (Err(reason), None) => Err(CertInjectError::NoInitialBlob {
                fingerprint: fingerprint.to_string(),
                reason,
            }),
        }
    }

    fn read_existing(&self, entry_path: &str) -> Result<Vec<u8>, RegistryError> {
        let descriptor = self.config.physical_store.descriptor();
        let entry = self
            .registry
            .open_key(descriptor.root, entry_path, KeyAccess::Read)?;

        entry.get_binary_value(BLOB_VALUE_NAME)
    }
}
