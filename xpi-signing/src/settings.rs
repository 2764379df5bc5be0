// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Add-on signing settings.

use {
    crate::{normalize_digest_algorithms, DigestAlgorithm, EntryCompression, Error, XpiResult},
    std::fmt::{Display, Formatter},
};

/// Base name of signature files used by Firefox add-on signing.
pub const DEFAULT_SIGNATURE_NAME: &str = "mozilla";

/// Path of the manifest within a signed archive.
pub const MANIFEST_PATH: &str = "META-INF/manifest.mf";

/// The kind of cryptographic signature held in a signature block.
///
/// This only influences the file extension of the signature block. The
/// block content is opaque to us.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureBlockKind {
    Rsa,
    Dsa,
    Ec,
}

impl Default for SignatureBlockKind {
    fn default() -> Self {
        Self::Rsa
    }
}

impl Display for SignatureBlockKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl TryFrom<&str> for SignatureBlockKind {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "rsa" => Ok(Self::Rsa),
            "dsa" => Ok(Self::Dsa),
            "ec" => Ok(Self::Ec),
            _ => Err(Error::UnknownBlockKind(s.to_string())),
        }
    }
}

impl SignatureBlockKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Dsa => "dsa",
            Self::Ec => "ec",
        }
    }
}

/// Represents settings that influence how an add-on is signed.
#[derive(Clone, Debug)]
pub struct SigningSettings {
    digest_algorithms: Vec<DigestAlgorithm>,
    signature_name: String,
    block_kind: SignatureBlockKind,
    include_signature_sections: bool,
    compression: EntryCompression,
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            digest_algorithms: vec![DigestAlgorithm::Sha1, DigestAlgorithm::Sha256],
            signature_name: DEFAULT_SIGNATURE_NAME.to_string(),
            block_kind: SignatureBlockKind::default(),
            include_signature_sections: true,
            compression: EntryCompression::Deflated,
        }
    }
}

impl SigningSettings {
    /// Digest algorithms recorded in the manifest and signature file.
    pub fn digest_algorithms(&self) -> &[DigestAlgorithm] {
        &self.digest_algorithms
    }

    /// Set the digest algorithms to use.
    ///
    /// Duplicates are ignored. At least one algorithm is required.
    pub fn set_digest_algorithms(
        &mut self,
        algorithms: impl IntoIterator<Item = DigestAlgorithm>,
    ) -> XpiResult<()> {
        self.digest_algorithms = normalize_digest_algorithms(algorithms)?;

        Ok(())
    }

    /// The base name of the signature file and signature block.
    pub fn signature_name(&self) -> &str {
        &self.signature_name
    }

    /// Set the base name of the signature file and signature block.
    ///
    /// JAR signature names are limited to 1-8 characters of `[A-Za-z0-9_-]`.
    pub fn set_signature_name(&mut self, name: impl ToString) -> XpiResult<()> {
        let name = name.to_string();

        if name.is_empty()
            || name.len() > 8
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::BadSignatureName(name));
        }

        self.signature_name = name;

        Ok(())
    }

    pub fn block_kind(&self) -> SignatureBlockKind {
        self.block_kind
    }

    pub fn set_block_kind(&mut self, kind: SignatureBlockKind) {
        self.block_kind = kind;
    }

    /// Whether the signature file contains per-file sections.
    pub fn include_signature_sections(&self) -> bool {
        self.include_signature_sections
    }

    pub fn set_include_signature_sections(&mut self, value: bool) {
        self.include_signature_sections = value;
    }

    /// Compression used for the entries added by signing.
    pub fn compression(&self) -> EntryCompression {
        self.compression
    }

    pub fn set_compression(&mut self, compression: EntryCompression) {
        self.compression = compression;
    }

    /// Archive path of the signature file.
    pub fn signature_file_path(&self) -> String {
        format!("META-INF/{}.sf", self.signature_name)
    }

    /// File name of the signature block, without a directory.
    ///
    /// The signing service keys its response by this name.
    pub fn signature_block_file_name(&self) -> String {
        format!("{}.{}", self.signature_name, self.block_kind.extension())
    }

    /// Archive path of the signature block.
    pub fn signature_block_path(&self) -> String {
        format!("META-INF/{}", self.signature_block_file_name())
    }

    /// Archive paths added by signing, in the order they are written.
    pub fn signing_paths(&self) -> [String; 3] {
        [
            MANIFEST_PATH.to_string(),
            self.signature_file_path(),
            self.signature_block_path(),
        ]
    }
}
