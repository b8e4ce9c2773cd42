// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Configuration of injection and sweeping.

[ConfigFile] is the raw, serializable form as read from YAML and layered
with command line flags. [CryptoApiConfig] is the validated form handed to
the [crate::Injector] and [crate::Sweeper]. It is constructed once and
passed by reference; nothing reads configuration from global state.
*/

use {
    crate::{error::CertInjectError, store::PhysicalStore},
    certinject_blob::{ExtendedKeyUsagePurpose, IpRange, NameConstraintsTemplate},
    ipnet::IpNet,
    serde::Deserialize,
    std::{collections::BTreeSet, path::Path, time::Duration},
};

/// Logical store injected into when none is configured.
pub const DEFAULT_LOGICAL_STORE: &str = "Root";

/// Seconds after which injected certificates are swept when none is configured.
pub const DEFAULT_EXPIRE_SECONDS: u64 = 60 * 30;

/// Name constraints as written in a configuration file.
///
/// IP entries are CIDR strings such as `10.0.0.0/8`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct NameConstraintsConfig {
    pub permitted_dns: Vec<String>,
    pub excluded_dns: Vec<String>,
    pub permitted_ip: Vec<String>,
    pub excluded_ip: Vec<String>,
    pub permitted_email: Vec<String>,
    pub excluded_email: Vec<String>,
    pub permitted_uri: Vec<String>,
    pub excluded_uri: Vec<String>,
}

/// Raw configuration.
///
/// ```yaml
/// physical-store: current-user
/// logical-store: Root
/// reset: false
/// eku: [server, client]
/// name-constraints:
///   permitted-dns: [bit]
///   excluded-ip: [192.168.0.0/16]
/// expire: 1800
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigFile {
    pub physical_store: String,
    pub logical_store: String,
    pub reset: bool,
    pub eku: Vec<String>,
    pub name_constraints: NameConstraintsConfig,
    pub expire: u64,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            physical_store: PhysicalStore::default().to_string(),
            logical_store: DEFAULT_LOGICAL_STORE.to_string(),
            reset: false,
            eku: vec![],
            name_constraints: NameConstraintsConfig::default(),
            expire: DEFAULT_EXPIRE_SECONDS,
        }
    }
}

impl ConfigFile {
    pub fn from_yaml(s: &str) -> Result<Self, CertInjectError> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, CertInjectError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| CertInjectError::ReadFile(path.to_path_buf(), e))?;

        Self::from_yaml(&data)
    }
}

/// Validated configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CryptoApiConfig {
    pub physical_store: PhysicalStore,
    pub logical_store: String,
    /// Discard existing properties of the certificate before applying new ones.
    pub reset: bool,
    pub purposes: BTreeSet<ExtendedKeyUsagePurpose>,
    pub name_constraints: NameConstraintsTemplate,
    /// Only consulted when sweeping.
    pub expiry_period: Duration,
}

impl Default for CryptoApiConfig {
    fn default() -> Self {
        Self {
            physical_store: PhysicalStore::default(),
            logical_store: DEFAULT_LOGICAL_STORE.to_string(),
            reset: false,
            purposes: BTreeSet::new(),
            name_constraints: NameConstraintsTemplate::default(),
            expiry_period: Duration::from_secs(DEFAULT_EXPIRE_SECONDS),
        }
    }
}

impl TryFrom<ConfigFile> for CryptoApiConfig {
    type Error = CertInjectError;

    fn try_from(raw: ConfigFile) -> Result<Self, Self::Error> {
        let physical_store = raw.physical_store.parse::<PhysicalStore>()?;

        if raw.logical_store.is_empty() || raw.logical_store.contains('\\') {
            return Err(CertInjectError::Config(format!(
                "invalid logical store name: {:?}",
                raw.logical_store
            )));
        }

        let purposes = raw
            .eku
            .iter()
            .map(|s| {
                s.parse::<ExtendedKeyUsagePurpose>()
                    .map_err(|e| CertInjectError::Config(e.to_string()))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        let nc = raw.name_constraints;
        let name_constraints = NameConstraintsTemplate {
            permitted_dns_domains: non_empty(nc.permitted_dns),
            excluded_dns_domains: non_empty(nc.excluded_dns),
            permitted_ip_ranges: parse_cidrs(&nc.permitted_ip)?,
            excluded_ip_ranges: parse_cidrs(&nc.excluded_ip)?,
            permitted_email_addresses: non_empty(nc.permitted_email),
            excluded_email_addresses: non_empty(nc.excluded_email),
            permitted_uri_domains: non_empty(nc.permitted_uri),
            excluded_uri_domains: non_empty(nc.excluded_uri),
        };

        Ok(Self {
            physical_store,
            logical_store: raw.logical_store,
            reset: raw.reset,
            purposes,
            name_constraints,
            expiry_period: Duration::from_secs(raw.expire),
        })
    }
}

// An empty string means "unset", as with an empty command line flag.
fn non_empty(values: Vec<String>) -> Vec<String> {
    values.into_iter().filter(|v| !v.is_empty()).collect()
}

/// Parse a CIDR string into the address and mask form used by name constraints.
///
/// Host bits are cleared, so `10.1.2.3/8` yields `10.0.0.0/255.0.0.0`.
pub fn parse_cidr(s: &str) -> Result<IpRange, CertInjectError> {
    let net = s
        .parse::<IpNet>()
        .map_err(|e| CertInjectError::Config(format!("couldn't parse IP CIDR {:?}: {}", s, e)))?;

    IpRange::new(net.network(), net.netmask())
        .map_err(|e| CertInjectError::Config(format!("invalid IP CIDR {:?}: {}", s, e)))
}

fn parse_cidrs(values: &[String]) -> Result<Vec<IpRange>, CertInjectError> {
    values
        .iter()
        .filter(|v| !v.is_empty())
        .map(|v| parse_cidr(v))
        .collect()
}
