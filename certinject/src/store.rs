// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CryptoAPI certificate store locations.

use {
    crate::{error::CertInjectError, registry::RegistryRoot},
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// Scope of a CryptoAPI certificate store.
///
/// Each scope is a distinct physical store in the registry. Logical stores
/// (`Root`, `CA`, ...) exist within each of them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PhysicalStore {
    /// Stores of the current user.
    CurrentUser,
    /// Stores of the local machine.
    System,
    /// Stores populated by Active Directory.
    Enterprise,
    /// Stores populated by group policy.
    GroupPolicy,
}

impl Default for PhysicalStore {
    fn default() -> Self {
        Self::System
    }
}

impl PhysicalStore {
    pub fn all() -> &'static [Self] {
        &[
            Self::CurrentUser,
            Self::System,
            Self::Enterprise,
            Self::GroupPolicy,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentUser => "current-user",
            Self::System => "system",
            Self::Enterprise => "enterprise",
            Self::GroupPolicy => "group-policy",
        }
    }

    /// Resolve where this store lives in the registry.
    pub fn descriptor(&self) -> StoreDescriptor {
        match self {
            Self::CurrentUser => StoreDescriptor {
                root: RegistryRoot::CurrentUser,
                physical: r"SOFTWARE\Microsoft\SystemCertificates",
                logical_template: r"{}\Certificates",
            },
            Self::System => StoreDescriptor {
                root: RegistryRoot::LocalMachine,
                physical: r"SOFTWARE\Microsoft\SystemCertificates",
                logical_template: r"{}\Certificates",
            },
            Self::Enterprise => StoreDescriptor {
                root: RegistryRoot::LocalMachine,
                physical: r"SOFTWARE\Microsoft\EnterpriseCertificates",
                logical_template: r"{}\Certificates",
            },
            Self::GroupPolicy => StoreDescriptor {
                root: RegistryRoot::LocalMachine,
                physical: r"SOFTWARE\Policies\Microsoft\SystemCertificates",
                logical_template: r"{}\Certificates",
            },
        }
    }
}

impl Display for PhysicalStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhysicalStore {
    type Err = CertInjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .find(|store| store.as_str() == s)
            .copied()
            .ok_or_else(|| CertInjectError::InvalidStore(s.to_string()))
    }
}

/// Registry location of a physical certificate store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StoreDescriptor {
    /// Root key the store lives under.
    pub root: RegistryRoot,
    /// Path of the physical store beneath the root.
    pub physical: &'static str,
    /// Path of a logical store's certificates beneath the physical store.
    ///
    /// `{}` is replaced by the logical store name. It may be absent.
    pub logical_template: &'static str,
}

impl StoreDescriptor {
    /// Path, relative to [Self::root], of the key holding a logical store's certificates.
    pub fn key_path(&self, logical_store: &str) -> String {
        format!(
            "{}\\{}",
            self.physical,
            self.logical_template.replace("{}", logical_store)
        )
    }

    /// Human readable location of a logical store.
    pub fn display(&self, logical_store: &str) -> String {
        format!("{}\\{}", self.root, self.key_path(logical_store))
    }
}
