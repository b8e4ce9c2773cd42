// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process registry.

use {
    super::{path_components, KeyAccess, Registry, RegistryError, RegistryKey, RegistryRoot},
    chrono::{DateTime, Duration, Utc},
    std::{cell::RefCell, collections::BTreeMap, rc::Rc},
};

/// A value stored in a [MemoryRegistry].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RegistryValue {
    Binary(Vec<u8>),
    Dword(u32),
    String(String),
}

#[derive(Debug)]
struct Node {
    name: String,
    values: BTreeMap<String, (String, RegistryValue)>,
    subkeys: BTreeMap<String, Node>,
    modified: DateTime<Utc>,
}

impl Node {
    fn new(name: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            values: BTreeMap::new(),
            subkeys: BTreeMap::new(),
            modified: now,
        }
    }
}

// Lookups are case-insensitive, as they are in the Windows registry.
fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

#[derive(Debug)]
struct State {
    roots: BTreeMap<RegistryRoot, Node>,
    now: DateTime<Utc>,
}

impl State {
    fn root(&mut self, root: RegistryRoot) -> &mut Node {
        let now = self.now;
        self.roots
            .entry(root)
            .or_insert_with(|| Node::new(&root.to_string(), now))
    }

    fn node(&mut self, root: RegistryRoot, components: &[String]) -> Option<&mut Node> {
        let mut node = self.root(root);

        for component in components {
            node = node.subkeys.get_mut(&fold(component))?;
        }

        Some(node)
    }

    fn create(&mut self, root: RegistryRoot, components: &[String]) -> &mut Node {
        let now = self.now;
        let mut node = self.root(root);

        for component in components {
            if !node.subkeys.contains_key(&fold(component)) {
                node.modified = now;
            }
            node = node
                .subkeys
                .entry(fold(component))
                .or_insert_with(|| Node::new(component, now));
        }

        node
    }
}

/// A registry held entirely in memory.
///
/// Clones share the same underlying tree. The registry has its own clock,
/// which starts at the wall clock time of construction and only moves when
/// told to. Every write stamps the affected key with the clock's time.
#[derive(Clone, Debug)]
pub struct MemoryRegistry {
    state: Rc<RefCell<State>>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::with_time(Utc::now())
    }

    /// Construct an instance whose clock starts at `now`.
    pub fn with_time(now: DateTime<Utc>) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                roots: BTreeMap::new(),
                now,
            })),
        }
    }

    /// The registry clock's current time.
    pub fn now(&self) -> DateTime<Utc> {
        self.state.borrow().now
    }

    pub fn set_time(&self, now: DateTime<Utc>) {
        self.state.borrow_mut().now = now;
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.borrow_mut();
        state.now = state.now + duration;
    }

    /// Override the last modified time of an existing key.
    pub fn set_last_modified(
        &self,
        root: RegistryRoot,
        path: &str,
        time: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let components = path_components(path).map(String::from).collect::<Vec<_>>();
        let mut state = self.state.borrow_mut();

        let node = state
            .node(root, &components)
            .ok_or_else(|| RegistryError::NotFound(format!("{}\\{}", root, path)))?;
        node.modified = time;

        Ok(())
    }

    /// Read any value, regardless of type.
    pub fn value(&self, root: RegistryRoot, path: &str, name: &str) -> Option<RegistryValue> {
        let components = path_components(path).map(String::from).collect::<Vec<_>>();
        let mut state = self.state.borrow_mut();

        state
            .node(root, &components)
            .and_then(|node| node.values.get(&fold(name)).map(|(_, v)| v.clone()))
    }

    /// Whether a key exists.
    pub fn key_exists(&self, root: RegistryRoot, path: &str) -> bool {
        let components = path_components(path).map(String::from).collect::<Vec<_>>();

        self.state.borrow_mut().node(root, &components).is_some()
    }

    fn key(&self, root: RegistryRoot, components: Vec<String>, access: KeyAccess) -> MemoryKey {
        MemoryKey {
            state: self.state.clone(),
            root,
            components,
            access,
        }
    }
}

impl Registry for MemoryRegistry {
    type Key = MemoryKey;

    fn open_key(
        &self,
        root: RegistryRoot,
        path: &str,
        access: KeyAccess,
    ) -> Result<Self::Key, RegistryError> {
        let components = path_components(path).map(String::from).collect::<Vec<_>>();

        if self.state.borrow_mut().node(root, &components).is_none() {
            return Err(RegistryError::NotFound(format!("{}\\{}", root, path)));
        }

        Ok(self.key(root, components, access))
    }

    fn create_key(&self, root: RegistryRoot, path: &str) -> Result<Self::Key, RegistryError> {
        let components = path_components(path).map(String::from).collect::<Vec<_>>();
        self.state.borrow_mut().create(root, &components);

        Ok(self.key(root, components, KeyAccess::ReadWrite))
    }
}

/// An open key of a [MemoryRegistry].
///
/// Operations on a handle whose key was deleted fail with
/// [RegistryError::NotFound].
#[derive(Debug)]
pub struct MemoryKey {
    state: Rc<RefCell<State>>,
    root: RegistryRoot,
    components: Vec<String>,
    access: KeyAccess,
}

impl MemoryKey {
    fn path(&self) -> String {
        let mut path = self.root.to_string();
        for component in &self.components {
            path.push('\\');
            path.push_str(component);
        }

        path
    }

    fn child(&self, path: &str) -> Vec<String> {
        let mut components = self.components.clone();
        components.extend(path_components(path).map(String::from));

        components
    }

    fn with_node<T>(
        &self,
        f: impl FnOnce(&mut Node, DateTime<Utc>) -> T,
    ) -> Result<T, RegistryError> {
        let mut state = self.state.borrow_mut();
        let now = state.now;

        let node = state
            .node(self.root, &self.components)
            .ok_or_else(|| RegistryError::NotFound(self.path()))?;

        Ok(f(node, now))
    }

    fn writable(&self) -> Result<(), RegistryError> {
        if self.access == KeyAccess::ReadWrite {
            Ok(())
        } else {
            Err(RegistryError::AccessDenied(self.path()))
        }
    }

    fn get_value(&self, name: &str) -> Result<RegistryValue, RegistryError> {
        self.with_node(|node, _| node.values.get(&fold(name)).map(|(_, v)| v.clone()))?
            .ok_or_else(|| RegistryError::NotFound(format!("{}\\{}", self.path(), name)))
    }

    fn set_value(&self, name: &str, value: RegistryValue) -> Result<(), RegistryError> {
        self.writable()?;

        self.with_node(|node, now| {
            node.values.insert(fold(name), (name.to_string(), value));
            node.modified = now;
        })
    }

    /// Write a string value.
    pub fn set_string_value(&self, name: &str, value: &str) -> Result<(), RegistryError> {
        self.set_value(name, RegistryValue::String(value.to_string()))
    }
}

impl RegistryKey for MemoryKey {
    fn open_subkey(&self, path: &str, access: KeyAccess) -> Result<Self, RegistryError> {
        let components = self.child(path);

        if self
            .state
            .borrow_mut()
            .node(self.root, &components)
            .is_none()
        {
            return Err(RegistryError::NotFound(format!("{}\\{}", self.path(), path)));
        }

        Ok(Self {
            state: self.state.clone(),
            root: self.root,
            components,
            access,
        })
    }

    fn create_subkey(&self, path: &str) -> Result<Self, RegistryError> {
        self.writable()?;
        // The parent itself must still exist.
        self.with_node(|_, _| ())?;

        let components = self.child(path);
        self.state.borrow_mut().create(self.root, &components);

        Ok(Self {
            state: self.state.clone(),
            root: self.root,
            components,
            access: KeyAccess::ReadWrite,
        })
    }

    fn get_binary_value(&self, name: &str) -> Result<Vec<u8>, RegistryError> {
        match self.get_value(name)? {
            RegistryValue::Binary(data) => Ok(data),
            _ => Err(RegistryError::UnexpectedType(format!(
                "{}\\{}",
                self.path(),
                name
            ))),
        }
    }

    fn set_binary_value(&self, name: &str, data: &[u8]) -> Result<(), RegistryError> {
        self.set_value(name, RegistryValue::Binary(data.to_vec()))
    }

    fn get_dword_value(&self, name: &str) -> Result<u32, RegistryError> {
        match self.get_value(name)? {
            RegistryValue::Dword(v) => Ok(v),
            _ => Err(RegistryError::UnexpectedType(format!(
                "{}\\{}",
                self.path(),
                name
            ))),
        }
    }

    fn set_dword_value(&self, name: &str, value: u32) -> Result<(), RegistryError> {
        self.set_value(name, RegistryValue::Dword(value))
    }

    fn delete_value(&self, name: &str) -> Result<(), RegistryError> {
        self.writable()?;

        let removed = self.with_node(|node, now| {
            let removed = node.values.remove(&fold(name)).is_some();
            if removed {
                node.modified = now;
            }
            removed
        })?;

        if removed {
            Ok(())
        } else {
            Err(RegistryError::NotFound(format!("{}\\{}", self.path(), name)))
        }
    }

    fn delete_subkey(&self, name: &str) -> Result<(), RegistryError> {
        self.writable()?;

        let removed = self.with_node(|node, now| {
            let removed = node.subkeys.remove(&fold(name)).is_some();
            if removed {
                node.modified = now;
            }
            removed
        })?;

        if removed {
            Ok(())
        } else {
            Err(RegistryError::NotFound(format!("{}\\{}", self.path(), name)))
        }
    }

    fn subkey_names(&self) -> Result<Vec<String>, RegistryError> {
        self.with_node(|node, _| node.subkeys.values().map(|k| k.name.clone()).collect())
    }

    fn last_modified(&self) -> Result<DateTime<Utc>, RegistryError> {
        self.with_node(|node, _| node.modified)
    }
}
