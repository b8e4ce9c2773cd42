// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Windows CryptoAPI certificate registry blobs.

CryptoAPI persists each certificate of a registry-backed store as a `Blob`
value under a subkey named after the certificate's SHA-1 fingerprint. The
value is a flat sequence of property records, each a 12 byte little-endian
header (property id, a flags word that is always `1`, payload length)
followed by the payload.

Only the certificate content property ([PropertyId::CERT]) is required.
Windows regenerates the hashes, key identifiers and other derived
properties whenever the certificate is actually used, so this crate never
computes them.

The [blob] module reads and writes the container. The [eku] and
[name_constraints] modules produce the two policy properties this crate
knows how to build. Low-level ASN.1 types for those properties live in
[rfc5280].
*/

pub mod blob;
pub use blob::*;
pub mod eku;
pub use eku::*;
mod error;
pub use error::*;
pub mod name_constraints;
pub use name_constraints::*;
pub mod rfc5280;
