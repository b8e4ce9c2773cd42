// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::registry::RegistryError, certinject_blob::BlobError, std::path::PathBuf,
    thiserror::Error,
};

/// Unified error type for certificate injection.
#[derive(Debug, Error)]
pub enum CertInjectError {
    #[error("bad argument")]
    CliBadArgument,

    #[error("{0}")]
    CliGeneralError(String),

    #[error("invalid choice for physical store: {0}; consider: current-user, system, enterprise, group-policy")]
    InvalidStore(String),

    #[error("invalid certificate fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("error getting initial blob for {fingerprint}: {reason}")]
    NoInitialBlob { fingerprint: String, reason: String },

    #[error("couldn't build {property} property: {source}")]
    PropertyEncodeFailed {
        property: &'static str,
        #[source]
        source: BlobError,
    },

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to read {0}: {1}")]
    ReadFile(PathBuf, std::io::Error),

    #[error("PEM error: {0}")]
    Pem(#[from] pem::PemError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("no backend available for the Windows registry on this platform; use --dry-run")]
    NoNativeRegistry,
}
