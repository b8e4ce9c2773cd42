// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {crate::PropertyId, thiserror::Error};

/// Errors produced while reading or building certificate blobs.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob truncated in record header at offset {offset} ({remaining} bytes remaining)")]
    TruncatedHeader { offset: usize, remaining: usize },

    #[error("property {id} at offset {offset} declares {declared} bytes but only {remaining} remain")]
    TruncatedPayload {
        id: PropertyId,
        offset: usize,
        declared: usize,
        remaining: usize,
    },

    #[error("property {id} at offset {offset} has unexpected flags {flags:#x}")]
    UnexpectedFlags {
        id: PropertyId,
        offset: usize,
        flags: u32,
    },

    #[error("property {0} payload is too large to serialize")]
    PayloadTooLarge(PropertyId),

    #[error("name constraints require at least one permitted or excluded name")]
    EmptyNameConstraints,

    #[error("extended key usage requires at least one purpose")]
    EmptyExtendedKeyUsage,

    #[error("value is not a valid IA5 string: {0:?}")]
    NotIa5(String),

    #[error("address and mask families differ in IP range")]
    IpRangeFamilyMismatch,

    #[error("IP range must be 8 or 32 bytes; got {0}")]
    IpRangeLength(usize),

    #[error("ASN.1 encode error: {0}")]
    Encode(#[from] std::io::Error),

    #[error("ASN.1 decode error: {0}")]
    Decode(String),

    #[error("unknown extended key usage purpose: {0}")]
    UnknownPurpose(String),
}
