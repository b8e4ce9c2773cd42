// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! ASN.1 types defined RFC 5280.

Only the certificate extension payloads that CryptoAPI accepts as store
properties are defined here. The module uses implicit tagging, as RFC 5280's
`PKIX1Implicit88` module does.
*/

use {
    bcder::{
        decode::{Constructed, DecodeError, Source},
        encode,
        encode::{PrimitiveContent, Values},
        Mode, OctetString, Oid, Tag,
    },
    bytes::Bytes,
    std::{
        fmt::{Debug, Formatter},
        io::Write,
        ops::{Deref, DerefMut},
    },
};

/// Extended key usage.
///
/// ```ASN.1
/// ExtKeyUsageSyntax ::= SEQUENCE SIZE (1..MAX) OF KeyPurposeId
///
/// KeyPurposeId ::= OBJECT IDENTIFIER
/// ```
#[derive(Clone, Default, Eq, PartialEq)]
pub struct ExtKeyUsageSyntax(Vec<Oid>);

impl Debug for ExtKeyUsageSyntax {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|oid| format!("{}", oid)))
            .finish()
    }
}

impl ExtKeyUsageSyntax {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let mut purposes = Vec::new();

            while let Some(oid) = Oid::take_opt_from(cons)? {
                purposes.push(oid);
            }

            if purposes.is_empty() {
                return Err(cons.content_err("empty ExtKeyUsageSyntax"));
            }

            Ok(Self(purposes))
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence(
            self.0
                .iter()
                .map(|oid| oid.encode_ref())
                .collect::<Vec<_>>(),
        )
    }

    /// Decode an instance from DER data.
    pub fn from_der(data: &[u8]) -> Result<Self, String> {
        Constructed::decode(data, Mode::Der, |cons| Self::take_from(cons))
            .map_err(|e| e.to_string())
    }
}

impl From<Vec<Oid>> for ExtKeyUsageSyntax {
    fn from(purposes: Vec<Oid>) -> Self {
        Self(purposes)
    }
}

impl Deref for ExtKeyUsageSyntax {
    type Target = Vec<Oid>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ExtKeyUsageSyntax {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Values for ExtKeyUsageSyntax {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}

/// Name constraints.
///
/// ```ASN.1
/// NameConstraints ::= SEQUENCE {
///      permittedSubtrees       [0]     GeneralSubtrees OPTIONAL,
///      excludedSubtrees        [1]     GeneralSubtrees OPTIONAL }
///
/// GeneralSubtrees ::= SEQUENCE SIZE (1..MAX) OF GeneralSubtree
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NameConstraints {
    pub permitted_subtrees: Vec<GeneralSubtree>,
    pub excluded_subtrees: Vec<GeneralSubtree>,
}

impl NameConstraints {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let permitted_subtrees = cons
                .take_opt_constructed_if(Tag::CTX_0, |cons| Self::take_subtrees(cons))?
                .unwrap_or_default();
            let excluded_subtrees = cons
                .take_opt_constructed_if(Tag::CTX_1, |cons| Self::take_subtrees(cons))?
                .unwrap_or_default();

            Ok(Self {
                permitted_subtrees,
                excluded_subtrees,
            })
        })
    }

    fn take_subtrees<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Vec<GeneralSubtree>, DecodeError<S::Error>> {
        let mut subtrees = Vec::new();

        while let Some(subtree) = GeneralSubtree::take_opt_from(cons)? {
            subtrees.push(subtree);
        }

        if subtrees.is_empty() {
            return Err(cons.content_err("empty GeneralSubtrees"));
        }

        Ok(subtrees)
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            if self.permitted_subtrees.is_empty() {
                None
            } else {
                Some(encode::sequence_as(Tag::CTX_0, &self.permitted_subtrees))
            },
            if self.excluded_subtrees.is_empty() {
                None
            } else {
                Some(encode::sequence_as(Tag::CTX_1, &self.excluded_subtrees))
            },
        ))
    }

    /// Decode an instance from DER data.
    pub fn from_der(data: &[u8]) -> Result<Self, String> {
        Constructed::decode(data, Mode::Der, |cons| Self::take_from(cons))
            .map_err(|e| e.to_string())
    }
}

/// A subtree within name constraints.
///
/// ```ASN.1
/// GeneralSubtree ::= SEQUENCE {
///      base                    GeneralName,
///      minimum         [0]     BaseDistance DEFAULT 0,
///      maximum         [1]     BaseDistance OPTIONAL }
/// ```
///
/// RFC 5280 requires `minimum` to be 0 and `maximum` to be absent, so only
/// the base is retained. Encoded values never carry the distance fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneralSubtree {
    pub base: GeneralName,
}

impl GeneralSubtree {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let base = GeneralName::take_from(cons)?;
            cons.take_opt_primitive_if(Tag::CTX_0, |prim| prim.take_all())?;
            cons.take_opt_primitive_if(Tag::CTX_1, |prim| prim.take_all())?;

            Ok(Self { base })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence(self.base.encode_ref())
    }
}

impl From<GeneralName> for GeneralSubtree {
    fn from(base: GeneralName) -> Self {
        Self { base }
    }
}

impl Values for GeneralSubtree {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}

/// General name.
///
/// ```ASN.1
/// GeneralName ::= CHOICE {
///   otherName                       [0]     AnotherName,
///   rfc822Name                      [1]     IA5String,
///   dNSName                         [2]     IA5String,
///   x400Address                     [3]     ORAddress,
///   directoryName                   [4]     Name,
///   ediPartyName                    [5]     EDIPartyName,
///   uniformResourceIdentifier       [6]     IA5String,
///   iPAddress                       [7]     OCTET STRING,
///   registeredID                    [8]     OBJECT IDENTIFIER }
/// ```
///
/// Only the primitive variants usable in name constraints are supported.
/// String variants hold raw IA5 octets; callers validate the character set.
#[derive(Clone, Eq, PartialEq)]
pub enum GeneralName {
    Rfc822Name(Bytes),
    DnsName(Bytes),
    UniformResourceIdentifier(Bytes),
    IpAddress(Bytes),
}

impl Debug for GeneralName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rfc822Name(v) => write!(f, "Rfc822Name({:?})", String::from_utf8_lossy(v)),
            Self::DnsName(v) => write!(f, "DnsName({:?})", String::from_utf8_lossy(v)),
            Self::UniformResourceIdentifier(v) => write!(
                f,
                "UniformResourceIdentifier({:?})",
                String::from_utf8_lossy(v)
            ),
            Self::IpAddress(v) => write!(f, "IpAddress({})", hex::encode(v)),
        }
    }
}

impl GeneralName {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        if let Some(v) = cons.take_opt_primitive_if(Tag::CTX_1, |prim| prim.take_all())? {
            Ok(Self::Rfc822Name(v))
        } else if let Some(v) = cons.take_opt_primitive_if(Tag::CTX_2, |prim| prim.take_all())? {
            Ok(Self::DnsName(v))
        } else if let Some(v) = cons.take_opt_primitive_if(Tag::CTX_6, |prim| prim.take_all())? {
            Ok(Self::UniformResourceIdentifier(v))
        } else if let Some(v) = cons.take_opt_primitive_if(Tag::ctx(7), |prim| prim.take_all())? {
            Ok(Self::IpAddress(v))
        } else {
            Err(cons.content_err("unsupported GeneralName variant"))
        }
    }

    fn tag(&self) -> Tag {
        match self {
            Self::Rfc822Name(_) => Tag::CTX_1,
            Self::DnsName(_) => Tag::CTX_2,
            Self::UniformResourceIdentifier(_) => Tag::CTX_6,
            Self::IpAddress(_) => Tag::ctx(7),
        }
    }

    /// The raw content octets of this name.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Rfc822Name(v)
            | Self::DnsName(v)
            | Self::UniformResourceIdentifier(v)
            | Self::IpAddress(v) => v.as_ref(),
        }
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        OctetString::encode_slice_as(self.as_bytes(), self.tag())
    }
}
