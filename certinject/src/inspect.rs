// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Human readable rendering of certificate blobs.

use {
    crate::{error::CertInjectError, fingerprint::Fingerprint},
    certinject_blob::{
        decode_extended_key_usage, decode_name_constraints, CertificateBlob, PropertyId,
    },
    std::io::Write,
};

fn write_list(
    out: &mut impl Write,
    label: &str,
    values: impl Iterator<Item = String>,
) -> Result<(), CertInjectError> {
    for value in values {
        writeln!(out, "    {}: {}", label, value)?;
    }

    Ok(())
}

/// Describe each property of a blob.
///
/// Policy properties are decoded. A policy property that fails to decode is
/// reported inline rather than aborting the description.
pub fn describe_blob(blob: &CertificateBlob, out: &mut impl Write) -> Result<(), CertInjectError> {
    writeln!(out, "{} properties", blob.len())?;

    for (id, data) in blob.iter() {
        writeln!(out, "{}: {} bytes", id, data.len())?;

        match id {
            PropertyId::CERT => {
                writeln!(out, "    SHA-1 fingerprint: {}", Fingerprint::of_der(data))?;
            }
            PropertyId::ENHKEY_USAGE => match decode_extended_key_usage(data) {
                Ok(purposes) => {
                    for purpose in purposes {
                        writeln!(
                            out,
                            "    {} ({}; {})",
                            purpose,
                            purpose.as_str(),
                            purpose.as_oid()
                        )?;
                    }
                }
                Err(e) => writeln!(out, "    (undecodable: {})", e)?,
            },
            PropertyId::ROOT_PROGRAM_NAME_CONSTRAINTS => match decode_name_constraints(data) {
                Ok(nc) => {
                    write_list(out, "permitted DNS", nc.permitted_dns_domains.into_iter())?;
                    write_list(out, "excluded DNS", nc.excluded_dns_domains.into_iter())?;
                    write_list(
                        out,
                        "permitted IP",
                        nc.permitted_ip_ranges.iter().map(|r| r.to_string()),
                    )?;
                    write_list(
                        out,
                        "excluded IP",
                        nc.excluded_ip_ranges.iter().map(|r| r.to_string()),
                    )?;
                    write_list(out, "permitted email", nc.permitted_email_addresses.into_iter())?;
                    write_list(out, "excluded email", nc.excluded_email_addresses.into_iter())?;
                    write_list(out, "permitted URI", nc.permitted_uri_domains.into_iter())?;
                    write_list(out, "excluded URI", nc.excluded_uri_domains.into_iter())?;
                }
                Err(e) => writeln!(out, "    (undecodable: {})", e)?,
            },
            _ => {
                writeln!(out, "    {}", hex::encode(data))?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        certinject_blob::{
            build_extended_key_usage, build_name_constraints, ExtendedKeyUsagePurpose, IpRange,
            NameConstraintsTemplate,
        },
        std::net::Ipv4Addr,
    };

    #[test]
    fn describe() -> Result<(), CertInjectError> {
        let mut blob = CertificateBlob::from_certificate_der(b"abc");
        blob.set_property(build_extended_key_usage(
            &[ExtendedKeyUsagePurpose::ServerAuth].into_iter().collect(),
        )?);
        blob.set_property(build_name_constraints(&NameConstraintsTemplate {
            permitted_dns_domains: vec!["bit".to_string()],
            excluded_ip_ranges: vec![IpRange::new(
                Ipv4Addr::new(10, 0, 0, 0).into(),
                Ipv4Addr::new(255, 0, 0, 0).into(),
            )?],
            ..Default::default()
        })?);
        blob.set(PropertyId(1000), vec![0xde, 0xad]);

        let mut out = Vec::new();
        describe_blob(&blob, &mut out)?;
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("4 properties\n"));
        assert!(text.contains("    Server authentication (server; 1.3.6.1.5.5.7.3.1)\n"));
        assert!(text.contains("    SHA-1 fingerprint: A9993E364706816ABA3E25717850C26C9CD0D89D\n"));
        assert!(text.contains("    permitted DNS: bit\n"));
        assert!(text.contains("    excluded IP: 10.0.0.0/255.0.0.0\n"));
        assert!(text.contains("1000: 2 bytes\n    dead\n"));

        Ok(())
    }

    #[test]
    fn undecodable_policy() -> Result<(), CertInjectError> {
        let mut blob = CertificateBlob::new();
        blob.set(PropertyId::ENHKEY_USAGE, vec![0x04, 0x00]);

        let mut out = Vec::new();
        describe_blob(&blob, &mut out)?;

        assert!(String::from_utf8(out).unwrap().contains("(undecodable: "));

        Ok(())
    }
}
