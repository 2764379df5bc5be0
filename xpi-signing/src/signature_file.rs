// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! JAR signature files.

The signature file (`META-INF/<name>.sf`) is what actually gets signed. Its
main section holds digests of the entire serialized manifest. Following it
are optional per-file sections holding digests of the corresponding manifest
section bytes (not of the file content).
*/

use {
    crate::{
        manifest::{digest_all, write_attribute, write_digest_section},
        normalize_digest_algorithms, DigestAlgorithm, SectionDigest, SerializedManifest,
        XpiResult,
    },
    log::debug,
};

/// A signature file section covering one manifest section.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignatureFileSection {
    name: String,
    digests: Vec<SectionDigest>,
}

impl SignatureFileSection {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Digests of the manifest section's serialized bytes.
    pub fn digests(&self) -> &[SectionDigest] {
        &self.digests
    }
}

/// A JAR signature file derived from a serialized manifest.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignatureFile {
    manifest_digests: Vec<SectionDigest>,
    sections: Vec<SignatureFileSection>,
}

impl SignatureFile {
    /// Derive a signature file from serialized manifest data.
    ///
    /// When `include_sections` is false, only the main section with the
    /// whole manifest digests is emitted.
    pub fn from_manifest(
        manifest: &SerializedManifest,
        algorithms: &[DigestAlgorithm],
        include_sections: bool,
    ) -> XpiResult<Self> {
        let algorithms = normalize_digest_algorithms(algorithms.iter().copied())?;

        let manifest_digests = digest_all(&algorithms, manifest.as_bytes());

        let sections = if include_sections {
            manifest
                .sections()
                .map(|(name, data)| SignatureFileSection {
                    name: name.to_string(),
                    digests: digest_all(&algorithms, data),
                })
                .collect::<Vec<_>>()
        } else {
            debug!("omitting per-file sections from signature file");
            vec![]
        };

        Ok(Self {
            manifest_digests,
            sections,
        })
    }

    /// Digests of the whole manifest.
    pub fn manifest_digests(&self) -> &[SectionDigest] {
        &self.manifest_digests
    }

    /// Obtain the base64 whole manifest digest for a specific algorithm.
    pub fn manifest_digest(&self, algorithm: DigestAlgorithm) -> Option<&str> {
        self.manifest_digests
            .iter()
            .find(|d| d.algorithm == algorithm)
            .map(|d| d.value.as_str())
    }

    pub fn sections(&self) -> &[SignatureFileSection] {
        &self.sections
    }

    /// Serialize to the canonical text form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![];

        write_attribute(&mut buf, "Signature-Version", "1.0");
        for digest in &self.manifest_digests {
            write_attribute(
                &mut buf,
                &format!("{}-Digest-Manifest", digest.algorithm.label()),
                &digest.value,
            );
        }
        buf.push(b'\n');

        for section in &self.sections {
            write_digest_section(&mut buf, &section.name, &section.digests);
        }

        buf
    }
}
