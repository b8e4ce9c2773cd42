// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Inject certificates into Windows CryptoAPI certificate stores.

CryptoAPI stores that are backed by the registry can be written directly,
without going through the certificate management APIs. That allows
attaching trust policy, such as extended key usage and name constraints, to
a certificate without modifying the certificate itself.

The [Injector] writes a certificate and its policy properties into a store.
Every entry it writes carries a marker value. The [Sweeper] uses that marker
to find and remove injected entries once they have not been refreshed
within a configured period, leaving certificates installed by other means
alone.

Registry access goes through the [registry::Registry] trait. The
[registry::MemoryRegistry] implementation works on every platform; the
native registry is only available on Windows.
*/

pub mod config;
pub use config::{ConfigFile, CryptoApiConfig};
mod error;
pub use error::*;
mod fingerprint;
pub use fingerprint::*;
pub mod injector;
pub use injector::{CertificateSource, InjectionOutcome, Injector};
pub mod inspect;
pub mod registry;
pub mod store;
pub use store::{PhysicalStore, StoreDescriptor};
pub mod sweeper;
pub use sweeper::{is_expired, SweepReport, Sweeper};
