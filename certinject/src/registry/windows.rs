// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The native Windows registry.

use {
    super::{KeyAccess, Registry, RegistryError, RegistryKey, RegistryRoot},
    chrono::{DateTime, TimeZone, Utc},
    std::{ffi::OsStr, os::windows::ffi::OsStrExt, ptr},
    winapi::{
        shared::{
            minwindef::{DWORD, FILETIME, HKEY},
            winerror::{
                ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_NO_MORE_ITEMS, ERROR_SUCCESS,
            },
        },
        um::{
            winnt::{KEY_ALL_ACCESS, KEY_READ, REG_BINARY, REG_DWORD, REG_OPTION_NON_VOLATILE},
            winreg::{
                RegCloseKey, RegCreateKeyExW, RegDeleteTreeW, RegDeleteValueW, RegEnumKeyExW,
                RegOpenKeyExW, RegQueryInfoKeyW, RegQueryValueExW, RegSetValueExW,
                HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE,
            },
        },
    },
};

/// Seconds between 1601-01-01 (the FILETIME epoch) and 1970-01-01.
const FILETIME_UNIX_EPOCH_OFFSET: i64 = 11_644_473_600;

/// Longest possible key name, plus the terminator.
const MAX_KEY_NAME_CHARS: usize = 256;

fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn check(status: i32, operation: &'static str, path: &str) -> Result<(), RegistryError> {
    match status as DWORD {
        ERROR_SUCCESS => Ok(()),
        ERROR_FILE_NOT_FOUND => Err(RegistryError::NotFound(path.to_string())),
        ERROR_ACCESS_DENIED => Err(RegistryError::AccessDenied(path.to_string())),
        _ => Err(RegistryError::Os {
            operation,
            path: path.to_string(),
            code: status,
        }),
    }
}

fn filetime_to_datetime(ft: &FILETIME, path: &str) -> Result<DateTime<Utc>, RegistryError> {
    let ticks = ((ft.dwHighDateTime as u64) << 32) | ft.dwLowDateTime as u64;
    let secs = (ticks / 10_000_000) as i64 - FILETIME_UNIX_EPOCH_OFFSET;
    let nanos = ((ticks % 10_000_000) * 100) as u32;

    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or(RegistryError::Os {
            operation: "RegQueryInfoKeyW",
            path: path.to_string(),
            code: 0,
        })
}

/// The Windows registry of the running system.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowsRegistry;

impl WindowsRegistry {
    fn root_handle(root: RegistryRoot) -> HKEY {
        match root {
            RegistryRoot::CurrentUser => HKEY_CURRENT_USER,
            RegistryRoot::LocalMachine => HKEY_LOCAL_MACHINE,
        }
    }
}

fn sam(access: KeyAccess) -> DWORD {
    match access {
        KeyAccess::Read => KEY_READ,
        KeyAccess::ReadWrite => KEY_ALL_ACCESS,
    }
}

fn open(
    parent: HKEY,
    sub: &str,
    access: KeyAccess,
    path: String,
) -> Result<WindowsKey, RegistryError> {
    let wide = to_wide(sub);
    let mut hkey: HKEY = ptr::null_mut();

    let status = unsafe { RegOpenKeyExW(parent, wide.as_ptr(), 0, sam(access), &mut hkey) };
    check(status, "RegOpenKeyExW", &path)?;

    Ok(WindowsKey { hkey, path })
}

fn create(parent: HKEY, sub: &str, path: String) -> Result<WindowsKey, RegistryError> {
    let wide = to_wide(sub);
    let mut hkey: HKEY = ptr::null_mut();
    let mut disposition: DWORD = 0;

    let status = unsafe {
        RegCreateKeyExW(
            parent,
            wide.as_ptr(),
            0,
            ptr::null_mut(),
            REG_OPTION_NON_VOLATILE,
            KEY_ALL_ACCESS,
            ptr::null_mut(),
            &mut hkey,
            &mut disposition,
        )
    };
    check(status, "RegCreateKeyExW", &path)?;

    Ok(WindowsKey { hkey, path })
}

impl Registry for WindowsRegistry {
    type Key = WindowsKey;

    fn open_key(
        &self,
        root: RegistryRoot,
        path: &str,
        access: KeyAccess,
    ) -> Result<Self::Key, RegistryError> {
        open(
            Self::root_handle(root),
            path,
            access,
            format!("{}\\{}", root, path),
        )
    }

    fn create_key(&self, root: RegistryRoot, path: &str) -> Result<Self::Key, RegistryError> {
        create(Self::root_handle(root), path, format!("{}\\{}", root, path))
    }
}

/// An open native registry key. Closed on drop.
#[derive(Debug)]
pub struct WindowsKey {
    hkey: HKEY,
    path: String,
}

impl Drop for WindowsKey {
    fn drop(&mut self) {
        unsafe {
            RegCloseKey(self.hkey);
        }
    }
}

impl WindowsKey {
    fn value_path(&self, name: &str) -> String {
        format!("{}\\{}", self.path, name)
    }

    fn query_value(&self, name: &str) -> Result<(DWORD, Vec<u8>), RegistryError> {
        let wide = to_wide(name);
        let path = self.value_path(name);
        let mut value_type: DWORD = 0;
        let mut size: DWORD = 0;

        let status = unsafe {
            RegQueryValueExW(
                self.hkey,
                wide.as_ptr(),
                ptr::null_mut(),
                &mut value_type,
                ptr::null_mut(),
                &mut size,
            )
        };
        check(status, "RegQueryValueExW", &path)?;

        let mut data = vec![0u8; size as usize];
        let status = unsafe {
            RegQueryValueExW(
                self.hkey,
                wide.as_ptr(),
                ptr::null_mut(),
                &mut value_type,
                data.as_mut_ptr(),
                &mut size,
            )
        };
        check(status, "RegQueryValueExW", &path)?;
        data.truncate(size as usize);

        Ok((value_type, data))
    }

    fn set_value(&self, name: &str, value_type: DWORD, data: &[u8]) -> Result<(), RegistryError> {
        let wide = to_wide(name);
        let path = self.value_path(name);
        let len = DWORD::try_from(data.len()).map_err(|_| RegistryError::Os {
            operation: "RegSetValueExW",
            path: path.clone(),
            code: 0,
        })?;

        let status = unsafe {
            RegSetValueExW(
                self.hkey,
                wide.as_ptr(),
                0,
                value_type,
                data.as_ptr(),
                len,
            )
        };

        check(status, "RegSetValueExW", &path)
    }
}

impl RegistryKey for WindowsKey {
    fn open_subkey(&self, path: &str, access: KeyAccess) -> Result<Self, RegistryError> {
        open(self.hkey, path, access, format!("{}\\{}", self.path, path))
    }

    fn create_subkey(&self, path: &str) -> Result<Self, RegistryError> {
        create(self.hkey, path, format!("{}\\{}", self.path, path))
    }

    fn get_binary_value(&self, name: &str) -> Result<Vec<u8>, RegistryError> {
        match self.query_value(name)? {
            (REG_BINARY, data) => Ok(data),
            _ => Err(RegistryError::UnexpectedType(self.value_path(name))),
        }
    }

    fn set_binary_value(&self, name: &str, data: &[u8]) -> Result<(), RegistryError> {
        self.set_value(name, REG_BINARY, data)
    }

    fn get_dword_value(&self, name: &str) -> Result<u32, RegistryError> {
        match self.query_value(name)? {
            (REG_DWORD, data) if data.len() == 4 => {
                Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
            }
            _ => Err(RegistryError::UnexpectedType(self.value_path(name))),
        }
    }

    fn set_dword_value(&self, name: &str, value: u32) -> Result<(), RegistryError> {
        self.set_value(name, REG_DWORD, &value.to_le_bytes())
    }

    fn delete_value(&self, name: &str) -> Result<(), RegistryError> {
        let wide = to_wide(name);
        let status = unsafe { RegDeleteValueW(self.hkey, wide.as_ptr()) };

        check(status, "RegDeleteValueW", &self.value_path(name))
    }

    fn delete_subkey(&self, name: &str) -> Result<(), RegistryError> {
        let wide = to_wide(name);
        let status = unsafe { RegDeleteTreeW(self.hkey, wide.as_ptr()) };

        check(status, "RegDeleteTreeW", &self.value_path(name))
    }

    fn subkey_names(&self) -> Result<Vec<String>, RegistryError> {
        let mut names = Vec::new();
        let mut buffer = [0u16; MAX_KEY_NAME_CHARS];

        for index in 0.. {
            let mut len = buffer.len() as DWORD;

            let status = unsafe {
                RegEnumKeyExW(
                    self.hkey,
                    index,
                    buffer.as_mut_ptr(),
                    &mut len,
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            };

            if status as DWORD == ERROR_NO_MORE_ITEMS {
                break;
            }
            check(status, "RegEnumKeyExW", &self.path)?;

            names.push(String::from_utf16_lossy(&buffer[..len as usize]));
        }

        Ok(names)
    }

    fn last_modified(&self) -> Result<DateTime<Utc>, RegistryError> {
        let mut ft = FILETIME {
            dwLowDateTime: 0,
            dwHighDateTime: 0,
        };

        let status = unsafe {
            RegQueryInfoKeyW(
                self.hkey,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                &mut ft,
            )
        };
        check(status, "RegQueryInfoKeyW", &self.path)?;

        filetime_to_datetime(&ft, &self.path)
    }
}
