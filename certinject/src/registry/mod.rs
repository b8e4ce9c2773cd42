// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Access to a hierarchical registry of keys and values.

The injector and sweeper only talk to the registry through the [Registry]
and [RegistryKey] traits. [MemoryRegistry] is an in-process implementation.
On Windows, [WindowsRegistry] operates on the native registry.

Key handles are released when dropped, so every early return closes
whatever was opened along the way.
*/

mod memory;
pub use memory::*;
#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::*;

use {
    chrono::{DateTime, Utc},
    std::fmt::{Display, Formatter},
    thiserror::Error,
};

/// A predefined top-level registry key.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum RegistryRoot {
    CurrentUser,
    LocalMachine,
}

impl Display for RegistryRoot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::CurrentUser => "HKEY_CURRENT_USER",
            Self::LocalMachine => "HKEY_LOCAL_MACHINE",
        })
    }
}

/// Access requested when opening a key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyAccess {
    Read,
    ReadWrite,
}

/// Errors reported by a registry implementation.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry entry not found: {0}")]
    NotFound(String),

    #[error("registry value has an unexpected type: {0}")]
    UnexpectedType(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("{operation} failed on {path}: OS error {code}")]
    Os {
        operation: &'static str,
        path: String,
        code: i32,
    },
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// An open registry key.
///
/// `path` arguments are relative to this key and may contain multiple
/// backslash separated components. `name` arguments are single value or
/// subkey names.
pub trait RegistryKey: Sized {
    /// Open an existing subkey.
    fn open_subkey(&self, path: &str, access: KeyAccess) -> Result<Self, RegistryError>;

    /// Open a subkey for writing, creating it and any missing parents.
    fn create_subkey(&self, path: &str) -> Result<Self, RegistryError>;

    fn get_binary_value(&self, name: &str) -> Result<Vec<u8>, RegistryError>;

    fn set_binary_value(&self, name: &str, data: &[u8]) -> Result<(), RegistryError>;

    /// Read a 32-bit integer value.
    fn get_dword_value(&self, name: &str) -> Result<u32, RegistryError>;

    fn set_dword_value(&self, name: &str, value: u32) -> Result<(), RegistryError>;

    fn delete_value(&self, name: &str) -> Result<(), RegistryError>;

    /// Delete a subkey along with everything beneath it.
    fn delete_subkey(&self, name: &str) -> Result<(), RegistryError>;

    /// Names of the immediate subkeys.
    fn subkey_names(&self) -> Result<Vec<String>, RegistryError>;

    /// When this key was last written.
    fn last_modified(&self) -> Result<DateTime<Utc>, RegistryError>;
}

/// A registry that keys can be opened from.
pub trait Registry {
    type Key: RegistryKey;

    /// Open an existing key beneath a root.
    fn open_key(
        &self,
        root: RegistryRoot,
        path: &str,
        access: KeyAccess,
    ) -> Result<Self::Key, RegistryError>;

    /// Open a key beneath a root for writing, creating it if missing.
    fn create_key(&self, root: RegistryRoot, path: &str) -> Result<Self::Key, RegistryError>;
}

/// Split a backslash separated key path into components.
pub(crate) fn path_components(path: &str) -> impl Iterator<Item = &str> {
    path.split('\\').filter(|c| !c.is_empty())
}
