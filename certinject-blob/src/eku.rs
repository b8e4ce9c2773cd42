// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Extended key usage property.

use {
    crate::{rfc5280::ExtKeyUsageSyntax, BlobError, PropertyId, PropertyRecord},
    bcder::{encode::Values, ConstOid, Mode, Oid},
    bytes::Bytes,
    std::{
        collections::BTreeSet,
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// anyExtendedKeyUsage.
///
/// 2.5.29.37.0
const OID_EKU_PURPOSE_ANY: ConstOid = Oid(&[85, 29, 37, 0]);

/// 1.3.6.1.5.5.7.3.1
const OID_EKU_PURPOSE_SERVER_AUTH: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 1]);

/// 1.3.6.1.5.5.7.3.2
const OID_EKU_PURPOSE_CLIENT_AUTH: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 2]);

/// 1.3.6.1.5.5.7.3.3
const OID_EKU_PURPOSE_CODE_SIGNING: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 3]);

/// 1.3.6.1.5.5.7.3.4
const OID_EKU_PURPOSE_EMAIL_PROTECTION: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 4]);

/// 1.3.6.1.5.5.7.3.5
const OID_EKU_PURPOSE_IPSEC_END_SYSTEM: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 5]);

/// 1.3.6.1.5.5.7.3.6
const OID_EKU_PURPOSE_IPSEC_TUNNEL: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 6]);

/// 1.3.6.1.5.5.7.3.7
const OID_EKU_PURPOSE_IPSEC_USER: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 7]);

/// 1.3.6.1.5.5.7.3.8
const OID_EKU_PURPOSE_TIME_STAMPING: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 8]);

/// 1.3.6.1.5.5.7.3.9
const OID_EKU_PURPOSE_OCSP_SIGNING: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 9]);

/// Microsoft commercial code signing.
///
/// 1.3.6.1.4.1.311.2.1.22
const OID_EKU_PURPOSE_MICROSOFT_COMMERCIAL_CODE_SIGNING: ConstOid =
    Oid(&[43, 6, 1, 4, 1, 130, 55, 2, 1, 22]);

/// Microsoft kernel-mode code signing.
///
/// 1.3.6.1.4.1.311.61.1.1
const OID_EKU_PURPOSE_MICROSOFT_KERNEL_CODE_SIGNING: ConstOid =
    Oid(&[43, 6, 1, 4, 1, 130, 55, 61, 1, 1]);

/// A purpose a certificate may be restricted to.
///
/// Server-gated crypto purposes are intentionally absent: they only exist to
/// enable export-grade cryptography.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ExtendedKeyUsagePurpose {
    Any,
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    IpsecEndSystem,
    IpsecTunnel,
    IpsecUser,
    TimeStamping,
    OcspSigning,
    MicrosoftCommercialCodeSigning,
    MicrosoftKernelCodeSigning,
}

impl ExtendedKeyUsagePurpose {
    /// Obtain all variants of this enumeration.
    pub fn all() -> Vec<Self> {
        vec![
            Self::Any,
            Self::ServerAuth,
            Self::ClientAuth,
            Self::CodeSigning,
            Self::EmailProtection,
            Self::IpsecEndSystem,
            Self::IpsecTunnel,
            Self::IpsecUser,
            Self::TimeStamping,
            Self::OcspSigning,
            Self::MicrosoftCommercialCodeSigning,
            Self::MicrosoftKernelCodeSigning,
        ]
    }

    pub fn as_oid(&self) -> ConstOid {
        match self {
            Self::Any => OID_EKU_PURPOSE_ANY,
            Self::ServerAuth => OID_EKU_PURPOSE_SERVER_AUTH,
            Self::ClientAuth => OID_EKU_PURPOSE_CLIENT_AUTH,
            Self::CodeSigning => OID_EKU_PURPOSE_CODE_SIGNING,
            Self::EmailProtection => OID_EKU_PURPOSE_EMAIL_PROTECTION,
            Self::IpsecEndSystem => OID_EKU_PURPOSE_IPSEC_END_SYSTEM,
            Self::IpsecTunnel => OID_EKU_PURPOSE_IPSEC_TUNNEL,
            Self::IpsecUser => OID_EKU_PURPOSE_IPSEC_USER,
            Self::TimeStamping => OID_EKU_PURPOSE_TIME_STAMPING,
            Self::OcspSigning => OID_EKU_PURPOSE_OCSP_SIGNING,
            Self::MicrosoftCommercialCodeSigning => {
                OID_EKU_PURPOSE_MICROSOFT_COMMERCIAL_CODE_SIGNING
            }
            Self::MicrosoftKernelCodeSigning => OID_EKU_PURPOSE_MICROSOFT_KERNEL_CODE_SIGNING,
        }
    }

    /// The short name used on command lines and in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::ServerAuth => "server",
            Self::ClientAuth => "client",
            Self::CodeSigning => "code",
            Self::EmailProtection => "email",
            Self::IpsecEndSystem => "ipsec-end-system",
            Self::IpsecTunnel => "ipsec-tunnel",
            Self::IpsecUser => "ipsec-user",
            Self::TimeStamping => "time",
            Self::OcspSigning => "ocsp",
            Self::MicrosoftCommercialCodeSigning => "ms-code-com",
            Self::MicrosoftKernelCodeSigning => "ms-code-kernel",
        }
    }
}

impl Display for ExtendedKeyUsagePurpose {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Any => "Any purpose",
            Self::ServerAuth => "Server authentication",
            Self::ClientAuth => "Client authentication",
            Self::CodeSigning => "Code signing",
            Self::EmailProtection => "Secure email",
            Self::IpsecEndSystem => "IP security end system",
            Self::IpsecTunnel => "IP security tunnel termination",
            Self::IpsecUser => "IP security user",
            Self::TimeStamping => "Time stamping",
            Self::OcspSigning => "OCSP signing",
            Self::MicrosoftCommercialCodeSigning => "Microsoft commercial code signing",
            Self::MicrosoftKernelCodeSigning => "Microsoft kernel-mode code signing",
        })
    }
}

impl FromStr for ExtendedKeyUsagePurpose {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|purpose| purpose.as_str() == s)
            .ok_or_else(|| BlobError::UnknownPurpose(s.to_string()))
    }
}

impl TryFrom<&Oid> for ExtendedKeyUsagePurpose {
    type Error = BlobError;

    fn try_from(oid: &Oid) -> Result<Self, Self::Error> {
        Self::all()
            .into_iter()
            .find(|purpose| purpose.as_oid().as_ref() == oid.as_ref())
            .ok_or_else(|| BlobError::UnknownPurpose(format!("{}", oid)))
    }
}

/// Build the extended key usage property restricting a certificate to `purposes`.
///
/// The payload is the DER `ExtKeyUsageSyntax`, the same value a certificate
/// carries in its extended key usage extension. OIDs appear in the
/// enumeration order of [ExtendedKeyUsagePurpose].
pub fn build_extended_key_usage(
    purposes: &BTreeSet<ExtendedKeyUsagePurpose>,
) -> Result<PropertyRecord, BlobError> {
    if purposes.is_empty() {
        return Err(BlobError::EmptyExtendedKeyUsage);
    }

    let syntax = ExtKeyUsageSyntax::from(
        purposes
            .iter()
            .map(|purpose| Oid(Bytes::copy_from_slice(purpose.as_oid().as_ref())))
            .collect::<Vec<_>>(),
    );

    let mut data = Vec::new();
    syntax.write_encoded(Mode::Der, &mut data)?;

    Ok(PropertyRecord::new(PropertyId::ENHKEY_USAGE, data))
}

/// Decode an extended key usage property payload into its purposes.
pub fn decode_extended_key_usage(
    data: &[u8],
) -> Result<BTreeSet<ExtendedKeyUsagePurpose>, BlobError> {
    let syntax = ExtKeyUsageSyntax::from_der(data).map_err(BlobError::Decode)?;

    syntax
        .iter()
        .map(ExtendedKeyUsagePurpose::try_from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_and_client() -> Result<(), BlobError> {
        let purposes = [
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ]
        .into_iter()
        .collect::<BTreeSet<_>>();

        let record = build_extended_key_usage(&purposes)?;
        assert_eq!(record.id, PropertyId::ENHKEY_USAGE);
        assert_eq!(
            record.data,
            vec![
                0x30, 0x14, 0x06, 0x08, 0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x01, 0x06,
                0x08, 0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x02
            ]
        );
        assert_eq!(decode_extended_key_usage(&record.data)?, purposes);

        Ok(())
    }

    #[test]
    fn all_purposes() -> Result<(), BlobError> {
        let purposes = ExtendedKeyUsagePurpose::all()
            .into_iter()
            .collect::<BTreeSet<_>>();

        let record = build_extended_key_usage(&purposes)?;
        assert_eq!(decode_extended_key_usage(&record.data)?, purposes);

        Ok(())
    }

    #[test]
    fn microsoft_kernel_oid() {
        assert_eq!(
            format!("{}", ExtendedKeyUsagePurpose::MicrosoftKernelCodeSigning.as_oid()),
            "1.3.6.1.4.1.311.61.1.1"
        );
        assert_eq!(
            format!("{}", ExtendedKeyUsagePurpose::Any.as_oid()),
            "2.5.29.37.0"
        );
    }

    #[test]
    fn empty_refused() {
        assert!(matches!(
            build_extended_key_usage(&BTreeSet::new()),
            Err(BlobError::EmptyExtendedKeyUsage)
        ));
    }

    #[test]
    fn names_round_trip() -> Result<(), BlobError> {
        for purpose in ExtendedKeyUsagePurpose::all() {
            assert_eq!(purpose.as_str().parse::<ExtendedKeyUsagePurpose>()?, purpose);
        }

        assert!("sgc".parse::<ExtendedKeyUsagePurpose>().is_err());

        Ok(())
    }

    #[test]
    fn unknown_oid_rejected() {
        // SEQUENCE { 1.3.6.1.5.5.7.3.99 }
        let data = [
            0x30, 0x0a, 0x06, 0x08, 0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x63,
        ];

        assert!(matches!(
            decode_extended_key_usage(&data),
            Err(BlobError::UnknownPurpose(_))
        ));
    }
}
