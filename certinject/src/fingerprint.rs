// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Certificate identity within a store.

use {
    crate::error::CertInjectError,
    sha1::{Digest, Sha1},
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// The SHA-1 fingerprint of a DER certificate, as uppercase hex.
///
/// CryptoAPI names each certificate's registry key after this value, so the
/// hash algorithm and the casing are not ours to choose.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of DER certificate data.
    pub fn of_der(der: &[u8]) -> Self {
        Self(hex::encode_upper(Sha1::digest(der)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = CertInjectError;

    /// Accepts 40 hex digits in either case. Colons and spaces, as found in
    /// fingerprints copied from certificate viewers, are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .chars()
            .filter(|c| *c != ':' && !c.is_whitespace())
            .collect::<String>();

        if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CertInjectError::InvalidFingerprint(s.to_string()));
        }

        Ok(Self(digits.to_ascii_uppercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_of_der() {
        assert_eq!(
            Fingerprint::of_der(b"abc").as_str(),
            "A9993E364706816ABA3E25717850C26C9CD0D89D"
        );
        assert_eq!(Fingerprint::of_der(b"abc"), Fingerprint::of_der(b"abc"));
        assert_ne!(Fingerprint::of_der(b"abc"), Fingerprint::of_der(b"abd"));
    }

    #[test]
    fn parse() -> Result<(), CertInjectError> {
        let fp = "a9:99:3e:36:47:06:81:6a:ba:3e:25:71:78:50:c2:6c:9c:d0:d8:9d"
            .parse::<Fingerprint>()?;
        assert_eq!(fp, Fingerprint::of_der(b"abc"));

        assert!("A9993E".parse::<Fingerprint>().is_err());
        assert!("Z9993E364706816ABA3E25717850C26C9CD0D89D"
            .parse::<Fingerprint>()
            .is_err());

        Ok(())
    }
}
