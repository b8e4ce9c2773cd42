// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The certificate registry blob container.

The format is undocumented. Observed layout of a blob written by Windows
itself:

```text
5c 00 00 00   property id (subject public key bit length)
01 00 00 00   flags; always 1
04 00 00 00   payload length
.. .. .. ..   payload

19 00 00 00   subject public key MD5 hash
0f 00 00 00   signature hash
03 00 00 00   SHA-1 hash
14 00 00 00   key identifier
04 00 00 00   MD5 hash
20 00 00 00   certificate content (DER)
```

Records are concatenated without padding or trailer.
*/

use {
    crate::BlobError,
    byteorder::{ByteOrder, LittleEndian, WriteBytesExt},
    std::{
        collections::BTreeMap,
        fmt::{Display, Formatter},
        io::Write,
    },
};

/// Size of a record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 12;

/// Value of the header flags word in every record.
///
/// Its meaning is unknown. Windows has only ever been observed writing `1`.
pub const RECORD_FLAGS: u32 = 1;

/// Identifies the kind of a property record.
///
/// These are the `CERT_*_PROP_ID` values of CryptoAPI. Ids not named here
/// are carried through parsing and serialization untouched.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PropertyId(pub u32);

impl PropertyId {
    pub const KEY_PROV_INFO: Self = Self(2);
    pub const SHA1_HASH: Self = Self(3);
    pub const MD5_HASH: Self = Self(4);
    /// Extended key usage restriction.
    pub const ENHKEY_USAGE: Self = Self(9);
    pub const FRIENDLY_NAME: Self = Self(11);
    pub const SIGNATURE_HASH: Self = Self(15);
    pub const KEY_IDENTIFIER: Self = Self(20);
    pub const SUBJECT_PUBLIC_KEY_MD5_HASH: Self = Self(25);
    /// The DER encoded certificate itself.
    pub const CERT: Self = Self(32);
    /// Name constraints imposed on a root.
    pub const ROOT_PROGRAM_NAME_CONSTRAINTS: Self = Self(84);
    pub const SUBJECT_PUB_KEY_BIT_LENGTH: Self = Self(92);

    /// Symbolic name of a known property id.
    pub fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::KEY_PROV_INFO => "key-prov-info",
            Self::SHA1_HASH => "sha1-hash",
            Self::MD5_HASH => "md5-hash",
            Self::ENHKEY_USAGE => "enhkey-usage",
            Self::FRIENDLY_NAME => "friendly-name",
            Self::SIGNATURE_HASH => "signature-hash",
            Self::KEY_IDENTIFIER => "key-identifier",
            Self::SUBJECT_PUBLIC_KEY_MD5_HASH => "subject-public-key-md5-hash",
            Self::CERT => "cert",
            Self::ROOT_PROGRAM_NAME_CONSTRAINTS => "root-program-name-constraints",
            Self::SUBJECT_PUB_KEY_BIT_LENGTH => "subject-pub-key-bit-length",
            _ => return None,
        })
    }
}

impl Display for PropertyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(name) = self.name() {
            write!(f, "{} ({})", name, self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u32> for PropertyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// A single property ready to be stored in a blob.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropertyRecord {
    pub id: PropertyId,
    pub data: Vec<u8>,
}

impl PropertyRecord {
    pub fn new(id: PropertyId, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    /// The certificate content property for DER certificate data.
    pub fn certificate(der: &[u8]) -> Self {
        Self::new(PropertyId::CERT, der)
    }
}

/// A parsed certificate registry blob.
///
/// Maps each property id to its payload. A blob never holds two records of
/// the same id. Iteration and serialization follow ascending id order, so
/// equal blobs always serialize to equal bytes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CertificateBlob {
    properties: BTreeMap<PropertyId, Vec<u8>>,
}

impl CertificateBlob {
    /// Construct an empty blob.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a blob holding only the certificate content property.
    pub fn from_certificate_der(der: &[u8]) -> Self {
        let mut blob = Self::new();
        blob.set_property(PropertyRecord::certificate(der));

        blob
    }

    /// Parse the serialized form of a blob.
    ///
    /// An empty slice yields an empty blob. When the same id appears more
    /// than once, the later record wins.
    pub fn parse(data: &[u8]) -> Result<Self, BlobError> {
        let mut blob = Self::new();
        let mut offset = 0;

        while offset < data.len() {
            let remaining = data.len() - offset;
            if remaining < RECORD_HEADER_SIZE {
                return Err(BlobError::TruncatedHeader { offset, remaining });
            }

            let header = &data[offset..offset + RECORD_HEADER_SIZE];
            let id = PropertyId(LittleEndian::read_u32(&header[0..4]));
            let flags = LittleEndian::read_u32(&header[4..8]);
            let declared = LittleEndian::read_u32(&header[8..12]) as usize;

            if flags != RECORD_FLAGS {
                return Err(BlobError::UnexpectedFlags { id, offset, flags });
            }

            let payload_offset = offset + RECORD_HEADER_SIZE;
            let remaining = data.len() - payload_offset;
            if declared > remaining {
                return Err(BlobError::TruncatedPayload {
                    id,
                    offset,
                    declared,
                    remaining,
                });
            }

            blob.properties
                .insert(id, data[payload_offset..payload_offset + declared].to_vec());
            offset = payload_offset + declared;
        }

        Ok(blob)
    }

    /// Insert a property, replacing any existing property of the same id.
    pub fn set_property(&mut self, record: PropertyRecord) {
        self.properties.insert(record.id, record.data);
    }

    pub fn set(&mut self, id: PropertyId, data: impl Into<Vec<u8>>) {
        self.properties.insert(id, data.into());
    }

    pub fn get(&self, id: PropertyId) -> Option<&[u8]> {
        self.properties.get(&id).map(|v| v.as_slice())
    }

    pub fn remove(&mut self, id: PropertyId) -> Option<Vec<u8>> {
        self.properties.remove(&id)
    }

    pub fn contains(&self, id: PropertyId) -> bool {
        self.properties.contains_key(&id)
    }

    /// The DER certificate stored in this blob, if any.
    pub fn certificate_der(&self) -> Option<&[u8]> {
        self.get(PropertyId::CERT)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Iterate over `(id, payload)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &[u8])> + '_ {
        self.properties.iter().map(|(id, data)| (*id, data.as_slice()))
    }

    /// Property ids present, in ascending order.
    pub fn ids(&self) -> Vec<PropertyId> {
        self.properties.keys().copied().collect()
    }

    /// Size of the serialized form in bytes.
    pub fn serialized_len(&self) -> usize {
        self.properties
            .values()
            .map(|data| RECORD_HEADER_SIZE + data.len())
            .sum()
    }

    /// Write the serialized form to a writer.
    pub fn write_to(&self, fh: &mut impl Write) -> Result<(), BlobError> {
        for (id, data) in &self.properties {
            let len = u32::try_from(data.len()).map_err(|_| BlobError::PayloadTooLarge(*id))?;

            fh.write_u32::<LittleEndian>(id.0)?;
            fh.write_u32::<LittleEndian>(RECORD_FLAGS)?;
            fh.write_u32::<LittleEndian>(len)?;
            fh.write_all(data)?;
        }

        Ok(())
    }

    /// Obtain the serialized form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BlobError> {
        let mut buffer = Vec::with_capacity(self.serialized_len());
        self.write_to(&mut buffer)?;

        Ok(buffer)
    }
}

impl FromIterator<PropertyRecord> for CertificateBlob {
    fn from_iter<T: IntoIterator<Item = PropertyRecord>>(iter: T) -> Self {
        let mut blob = Self::new();
        for record in iter {
            blob.set_property(record);
        }

        blob
    }
}

#[cfg(test)]
mod tests {
    use {super::*, proptest::prelude::*};

    fn record(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&id.to_le_bytes());
        v.extend_from_slice(&1u32.to_le_bytes());
        v.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn serialize_layout() -> Result<(), BlobError> {
        let blob = CertificateBlob::from_certificate_der(b"\x30\x03\x02\x01\x05");

        assert_eq!(
            blob.to_bytes()?,
            vec![
                0x20, 0, 0, 0, 1, 0, 0, 0, 5, 0, 0, 0, 0x30, 0x03, 0x02, 0x01, 0x05
            ]
        );

        Ok(())
    }

    #[test]
    fn serialize_orders_by_id() -> Result<(), BlobError> {
        let mut blob = CertificateBlob::new();
        blob.set(PropertyId::CERT, b"cert".to_vec());
        blob.set(PropertyId::ENHKEY_USAGE, b"eku".to_vec());
        blob.set(PropertyId::SHA1_HASH, b"sha".to_vec());

        let mut expected = record(3, b"sha");
        expected.extend(record(9, b"eku"));
        expected.extend(record(32, b"cert"));

        assert_eq!(blob.to_bytes()?, expected);
        assert_eq!(blob.serialized_len(), expected.len());

        Ok(())
    }

    #[test]
    fn parse_windows_layout() -> Result<(), BlobError> {
        let mut data = record(0x5c, &2048u32.to_le_bytes());
        data.extend(record(0x19, &[0xaa; 16]));
        data.extend(record(0x03, &[0xbb; 20]));
        data.extend(record(0x20, b"\x30\x00"));

        let blob = CertificateBlob::parse(&data)?;
        assert_eq!(blob.len(), 4);
        assert_eq!(
            blob.get(PropertyId::SUBJECT_PUB_KEY_BIT_LENGTH),
            Some(&2048u32.to_le_bytes()[..])
        );
        assert_eq!(blob.certificate_der(), Some(&b"\x30\x00"[..]));
        assert_eq!(
            blob.ids(),
            vec![
                PropertyId::SHA1_HASH,
                PropertyId::SUBJECT_PUBLIC_KEY_MD5_HASH,
                PropertyId::CERT,
                PropertyId::SUBJECT_PUB_KEY_BIT_LENGTH
            ]
        );

        Ok(())
    }

    #[test]
    fn parse_empty() -> Result<(), BlobError> {
        assert!(CertificateBlob::parse(&[])?.is_empty());

        Ok(())
    }

    #[test]
    fn parse_zero_length_payload() -> Result<(), BlobError> {
        let blob = CertificateBlob::parse(&record(11, &[]))?;
        assert_eq!(blob.get(PropertyId::FRIENDLY_NAME), Some(&[][..]));

        Ok(())
    }

    #[test]
    fn parse_duplicate_last_wins() -> Result<(), BlobError> {
        let mut data = record(32, b"first");
        data.extend(record(9, b"eku"));
        data.extend(record(32, b"second"));

        let blob = CertificateBlob::parse(&data)?;
        assert_eq!(blob.len(), 2);
        assert_eq!(blob.certificate_der(), Some(&b"second"[..]));

        Ok(())
    }

    #[test]
    fn parse_preserves_unknown_ids() -> Result<(), BlobError> {
        let data = record(0x1234, b"opaque");

        let blob = CertificateBlob::parse(&data)?;
        assert_eq!(blob.get(PropertyId(0x1234)), Some(&b"opaque"[..]));
        assert_eq!(blob.to_bytes()?, data);

        Ok(())
    }

    #[test]
    fn parse_truncated_header() {
        let mut data = record(32, b"cert");
        data.extend_from_slice(&[9, 0, 0, 0, 1, 0]);

        match CertificateBlob::parse(&data) {
            Err(BlobError::TruncatedHeader { offset, remaining }) => {
                assert_eq!(offset, 16);
                assert_eq!(remaining, 6);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn parse_truncated_payload() {
        let mut data = record(32, b"certificate");
        data.truncate(data.len() - 1);

        match CertificateBlob::parse(&data) {
            Err(BlobError::TruncatedPayload {
                id,
                offset,
                declared,
                remaining,
            }) => {
                assert_eq!(id, PropertyId::CERT);
                assert_eq!(offset, 0);
                assert_eq!(declared, 11);
                assert_eq!(remaining, 10);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn parse_length_overflowing_buffer() {
        let mut data = Vec::new();
        data.extend_from_slice(&32u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        data.extend_from_slice(b"abc");

        assert!(matches!(
            CertificateBlob::parse(&data),
            Err(BlobError::TruncatedPayload { .. })
        ));
    }

    #[test]
    fn parse_rejects_unknown_flags() {
        let mut data = record(32, b"cert");
        data[4] = 2;

        assert!(matches!(
            CertificateBlob::parse(&data),
            Err(BlobError::UnexpectedFlags { flags: 2, .. })
        ));
    }

    #[test]
    fn set_property_overwrites() {
        let mut blob = CertificateBlob::from_certificate_der(b"old");
        blob.set_property(PropertyRecord::certificate(b"new"));

        assert_eq!(blob.len(), 1);
        assert_eq!(blob.certificate_der(), Some(&b"new"[..]));
    }

    #[test]
    fn set_property_idempotent() {
        let record = PropertyRecord::new(PropertyId::ENHKEY_USAGE, b"\x30\x00".to_vec());

        let mut once = CertificateBlob::from_certificate_der(b"cert");
        once.set_property(record.clone());

        let mut twice = once.clone();
        twice.set_property(record);

        assert_eq!(once, twice);
    }

    #[test]
    fn property_id_display() {
        assert_eq!(PropertyId::CERT.to_string(), "cert (32)");
        assert_eq!(PropertyId(7).to_string(), "7");
    }

    proptest! {
        #[test]
        fn round_trip(properties in prop::collection::btree_map(
            any::<u32>(),
            prop::collection::vec(any::<u8>(), 0..64),
            1..8,
        )) {
            let blob = properties
                .into_iter()
                .map(|(id, data)| PropertyRecord::new(PropertyId(id), data))
                .collect::<CertificateBlob>();

            let bytes = blob.to_bytes().unwrap();
            prop_assert_eq!(CertificateBlob::parse(&bytes).unwrap(), blob);
        }

        #[test]
        fn parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..96)) {
            let _ = CertificateBlob::parse(&data);
        }
    }
}
