// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Digest algorithms usable in JAR manifests.

use {
    crate::{Error, XpiResult},
    digest::Digest,
    std::fmt::{Display, Formatter},
};

/// A digest algorithm recorded in manifests and signature files.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl Display for DigestAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => f.write_str("md5"),
            Self::Sha1 => f.write_str("sha1"),
            Self::Sha256 => f.write_str("sha256"),
        }
    }
}

impl TryFrom<&str> for DigestAlgorithm {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            _ => Err(Error::UnknownDigestAlgorithm(s.to_string())),
        }
    }
}

impl DigestAlgorithm {
    /// The label used for this algorithm in manifest attribute names.
    ///
    /// e.g. `SHA1` for `SHA1-Digest` and `SHA1-Digest-Manifest`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Digest data with this algorithm.
    pub fn digest_data(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Md5 => md5::Md5::digest(data).to_vec(),
            Self::Sha1 => sha1::Sha1::digest(data).to_vec(),
            Self::Sha256 => sha2::Sha256::digest(data).to_vec(),
        }
    }

    /// Digest data and return the base64 encoding of the digest.
    ///
    /// This is the representation stored in manifests.
    pub fn digest_base64(&self, data: &[u8]) -> String {
        base64::encode(self.digest_data(data))
    }
}

/// Validate a list of digest algorithms for use in a manifest.
///
/// The list must not be empty. Duplicates are removed while preserving the
/// order of first appearance.
pub fn normalize_digest_algorithms(
    algorithms: impl IntoIterator<Item = DigestAlgorithm>,
) -> XpiResult<Vec<DigestAlgorithm>> {
    let mut res = Vec::new();

    for alg in algorithms {
        if !res.contains(&alg) {
            res.push(alg);
        }
    }

    if res.is_empty() {
        Err(Error::NoDigestAlgorithms)
    } else {
        Ok(res)
    }
}
