// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Name constraints property.

use {
    crate::{
        rfc5280::{GeneralName, GeneralSubtree, NameConstraints},
        BlobError, PropertyId, PropertyRecord,
    },
    bcder::{encode::Values, Mode},
    bytes::Bytes,
    std::{
        fmt::{Display, Formatter},
        net::IpAddr,
    },
};

/// An IP address range expressed as a network address and mask.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IpRange {
    address: IpAddr,
    mask: IpAddr,
}

impl IpRange {
    /// Construct a range from an address and a mask of the same family.
    pub fn new(address: IpAddr, mask: IpAddr) -> Result<Self, BlobError> {
        if address.is_ipv4() != mask.is_ipv4() {
            return Err(BlobError::IpRangeFamilyMismatch);
        }

        Ok(Self { address, mask })
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn mask(&self) -> IpAddr {
        self.mask
    }

    /// Encode as the `iPAddress` content of a name constraint: address octets
    /// followed by mask octets.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut v = ip_octets(&self.address);
        v.extend(ip_octets(&self.mask));

        v
    }

    /// Decode the 8 or 32 byte `iPAddress` content of a name constraint.
    pub fn from_bytes(data: &[u8]) -> Result<Self, BlobError> {
        match data.len() {
            8 => {
                let mut address = [0u8; 4];
                let mut mask = [0u8; 4];
                address.copy_from_slice(&data[0..4]);
                mask.copy_from_slice(&data[4..8]);

                Self::new(address.into(), mask.into())
            }
            32 => {
                let mut address = [0u8; 16];
                let mut mask = [0u8; 16];
                address.copy_from_slice(&data[0..16]);
                mask.copy_from_slice(&data[16..32]);

                Self::new(address.into(), mask.into())
            }
            len => Err(BlobError::IpRangeLength(len)),
        }
    }
}

impl Display for IpRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.mask)
    }
}

fn ip_octets(ip: &IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(ip) => ip.octets().to_vec(),
        IpAddr::V6(ip) => ip.octets().to_vec(),
    }
}

/// Names a certificate authority may or may not issue for.
///
/// Each list is independent. Empty lists contribute nothing to the encoded
/// property.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NameConstraintsTemplate {
    pub permitted_dns_domains: Vec<String>,
    pub excluded_dns_domains: Vec<String>,
    pub permitted_ip_ranges: Vec<IpRange>,
    pub excluded_ip_ranges: Vec<IpRange>,
    pub permitted_email_addresses: Vec<String>,
    pub excluded_email_addresses: Vec<String>,
    pub permitted_uri_domains: Vec<String>,
    pub excluded_uri_domains: Vec<String>,
}

impl NameConstraintsTemplate {
    /// Whether no constraint of any kind is present.
    pub fn is_empty(&self) -> bool {
        self.permitted_dns_domains.is_empty()
            && self.excluded_dns_domains.is_empty()
            && self.permitted_ip_ranges.is_empty()
            && self.excluded_ip_ranges.is_empty()
            && self.permitted_email_addresses.is_empty()
            && self.excluded_email_addresses.is_empty()
            && self.permitted_uri_domains.is_empty()
            && self.excluded_uri_domains.is_empty()
    }

    fn subtrees(
        dns: &[String],
        ips: &[IpRange],
        emails: &[String],
        uris: &[String],
    ) -> Result<Vec<GeneralSubtree>, BlobError> {
        let mut subtrees = Vec::new();

        for name in dns {
            subtrees.push(GeneralName::DnsName(ia5(name)?).into());
        }
        for range in ips {
            subtrees.push(GeneralName::IpAddress(Bytes::from(range.to_bytes())).into());
        }
        for name in emails {
            subtrees.push(GeneralName::Rfc822Name(ia5(name)?).into());
        }
        for name in uris {
            subtrees.push(GeneralName::UniformResourceIdentifier(ia5(name)?).into());
        }

        Ok(subtrees)
    }

    fn to_asn1(&self) -> Result<NameConstraints, BlobError> {
        Ok(NameConstraints {
            permitted_subtrees: Self::subtrees(
                &self.permitted_dns_domains,
                &self.permitted_ip_ranges,
                &self.permitted_email_addresses,
                &self.permitted_uri_domains,
            )?,
            excluded_subtrees: Self::subtrees(
                &self.excluded_dns_domains,
                &self.excluded_ip_ranges,
                &self.excluded_email_addresses,
                &self.excluded_uri_domains,
            )?,
        })
    }

    fn from_asn1(nc: &NameConstraints) -> Result<Self, BlobError> {
        let mut template = Self::default();

        let groups = [
            (&nc.permitted_subtrees, true),
            (&nc.excluded_subtrees, false),
        ];

        for (subtrees, permitted) in groups {
            for subtree in subtrees {
                match &subtree.base {
                    GeneralName::DnsName(v) => {
                        let name = from_ia5(v)?;
                        if permitted {
                            template.permitted_dns_domains.push(name);
                        } else {
                            template.excluded_dns_domains.push(name);
                        }
                    }
                    GeneralName::IpAddress(v) => {
                        let range = IpRange::from_bytes(v)?;
                        if permitted {
                            template.permitted_ip_ranges.push(range);
                        } else {
                            template.excluded_ip_ranges.push(range);
                        }
                    }
                    GeneralName::Rfc822Name(v) => {
                        let name = from_ia5(v)?;
                        if permitted {
                            template.permitted_email_addresses.push(name);
                        } else {
                            template.excluded_email_addresses.push(name);
                        }
                    }
                    GeneralName::UniformResourceIdentifier(v) => {
                        let name = from_ia5(v)?;
                        if permitted {
                            template.permitted_uri_domains.push(name);
                        } else {
                            template.excluded_uri_domains.push(name);
                        }
                    }
                }
            }
        }

        Ok(template)
    }
}

fn ia5(s: &str) -> Result<Bytes, BlobError> {
    if s.is_ascii() {
        Ok(Bytes::copy_from_slice(s.as_bytes()))
    } else {
        Err(BlobError::NotIa5(s.to_string()))
    }
}

fn from_ia5(data: &[u8]) -> Result<String, BlobError> {
    if data.is_ascii() {
        Ok(String::from_utf8_lossy(data).into_owned())
    } else {
        Err(BlobError::NotIa5(String::from_utf8_lossy(data).into_owned()))
    }
}

/// Build the name constraints property from a template.
///
/// The payload is the DER `NameConstraints` extension value. Within each
/// subtree list, DNS names come first, then IP ranges, email addresses and
/// URI domains.
pub fn build_name_constraints(
    template: &NameConstraintsTemplate,
) -> Result<PropertyRecord, BlobError> {
    if template.is_empty() {
        return Err(BlobError::EmptyNameConstraints);
    }

    let mut data = Vec::new();
    template
        .to_asn1()?
        .encode_ref()
        .write_encoded(Mode::Der, &mut data)?;

    Ok(PropertyRecord::new(
        PropertyId::ROOT_PROGRAM_NAME_CONSTRAINTS,
        data,
    ))
}

/// Decode a name constraints property payload.
pub fn decode_name_constraints(data: &[u8]) -> Result<NameConstraintsTemplate, BlobError> {
    let nc = NameConstraints::from_der(data).map_err(BlobError::Decode)?;

    NameConstraintsTemplate::from_asn1(&nc)
}
