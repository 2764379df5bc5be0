// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! JAR manifests.

A JAR manifest (`META-INF/manifest.mf`) is a text document consisting of a
main section followed by one section per archive file. Each per-file section
names the file and records digests of its content:

```text
Manifest-Version: 1.0

Name: install.rdf
Digest-Algorithms: SHA1 SHA256
SHA1-Digest: ...
SHA256-Digest: ...

```

Sections are separated by blank lines. Lines are limited to 72 bytes: longer
values continue on subsequent lines that begin with a single space.

The serialized form is significant: the signature file digests the manifest
bytes verbatim, so serialization must be deterministic and the bytes we
digest must be the bytes written to the archive. [Manifest::serialize()]
returns a [SerializedManifest] recording where each section lives within the
produced bytes for this reason.
*/

use {
    crate::{ArchiveEntry, DigestAlgorithm, Error, XpiResult},
    log::{debug, info},
    std::ops::Range,
};

/// Maximum length in bytes of a line, excluding the line terminator.
pub const MAX_LINE_LENGTH: usize = 72;

/// Largest index <= `limit` that falls on a character boundary.
fn split_point(s: &str, limit: usize) -> usize {
    if s.len() <= limit {
        return s.len();
    }

    let mut i = limit;
    while !s.is_char_boundary(i) {
        i -= 1;
    }

    i
}

/// Write a `key: value` attribute line, wrapping as needed.
pub(crate) fn write_attribute(buf: &mut Vec<u8>, key: &str, value: &str) {
    let line = format!("{}: {}", key, value);
    let mut remaining = line.as_str();
    let mut limit = MAX_LINE_LENGTH;

    loop {
        let split = split_point(remaining, limit);
        buf.extend_from_slice(remaining[..split].as_bytes());
        buf.push(b'\n');

        remaining = &remaining[split..];
        if remaining.is_empty() {
            break;
        }

        // Continuation lines lead with a space, which counts against the limit.
        buf.push(b' ');
        limit = MAX_LINE_LENGTH - 1;
    }
}

/// A digest of some data, as recorded in a manifest or signature file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SectionDigest {
    pub algorithm: DigestAlgorithm,

    /// Base64 encoded digest.
    pub value: String,
}

/// Write a named section holding digests, including its trailing blank line.
///
/// Manifests and signature files share this section layout.
pub(crate) fn write_digest_section(buf: &mut Vec<u8>, name: &str, digests: &[SectionDigest]) {
    write_attribute(buf, "Name", name);
    write_attribute(
        buf,
        "Digest-Algorithms",
        &digests
            .iter()
            .map(|d| d.algorithm.label())
            .collect::<Vec<_>>()
            .join(" "),
    );

    for digest in digests {
        write_attribute(
            buf,
            &format!("{}-Digest", digest.algorithm.label()),
            &digest.value,
        );
    }

    buf.push(b'\n');
}

/// Compute [SectionDigest] for data using multiple algorithms.
pub(crate) fn digest_all(algorithms: &[DigestAlgorithm], data: &[u8]) -> Vec<SectionDigest> {
    algorithms
        .iter()
        .map(|algorithm| SectionDigest {
            algorithm: *algorithm,
            value: algorithm.digest_base64(data),
        })
        .collect()
}

/// The manifest section describing a single archive file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManifestSection {
    name: String,
    digests: Vec<SectionDigest>,
}

impl ManifestSection {
    /// Construct a section by digesting file content.
    pub fn from_content(
        name: impl ToString,
        content: &[u8],
        algorithms: &[DigestAlgorithm],
    ) -> XpiResult<Self> {
        let name = name.to_string();

        if name.contains(|c: char| c == '\n' || c == '\r') {
            return Err(Error::Format(format!(
                "entry name cannot be represented in a manifest: {:?}",
                name
            )));
        }

        Ok(Self {
            name,
            digests: digest_all(algorithms, content),
        })
    }

    /// Archive path this section describes.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn digests(&self) -> &[SectionDigest] {
        &self.digests
    }

    /// Obtain the base64 digest for a specific algorithm.
    pub fn digest(&self, algorithm: DigestAlgorithm) -> Option<&str> {
        self.digests
            .iter()
            .find(|d| d.algorithm == algorithm)
            .map(|d| d.value.as_str())
    }

    /// Serialize this section, including its terminating blank line.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![];
        write_digest_section(&mut buf, &self.name, &self.digests);
        buf
    }
}

/// A JAR manifest describing the signable content of an archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Manifest {
    algorithms: Vec<DigestAlgorithm>,
    sections: Vec<ManifestSection>,
}

impl Manifest {
    /// Build a manifest from archive entries.
    ///
    /// Entries that aren't signable (see [ArchiveEntry::is_signable()]) are
    /// skipped. Sections are emitted in the order entries are given, which
    /// should be archive order.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a ArchiveEntry>,
        algorithms: &[DigestAlgorithm],
    ) -> XpiResult<Self> {
        let algorithms = crate::normalize_digest_algorithms(algorithms.iter().copied())?;

        let sections = entries
            .into_iter()
            .filter(|entry| {
                if entry.is_signable() {
                    true
                } else {
                    debug!("excluding {} from manifest", entry.name());
                    false
                }
            })
            .map(|entry| ManifestSection::from_content(entry.name(), entry.content(), &algorithms))
            .collect::<XpiResult<Vec<_>>>()?;

        if sections.is_empty() {
            return Err(Error::EmptyArchive);
        }

        info!(
            "digested {} files using {}",
            sections.len(),
            algorithms
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            algorithms,
            sections,
        })
    }

    /// Digest algorithms used by every section.
    pub fn algorithms(&self) -> &[DigestAlgorithm] {
        &self.algorithms
    }

    pub fn sections(&self) -> &[ManifestSection] {
        &self.sections
    }

    /// Serialize to the canonical text form.
    pub fn serialize(&self) -> SerializedManifest {
        let mut data = b"Manifest-Version: 1.0\n\n".to_vec();
        let mut sections = Vec::with_capacity(self.sections.len());

        for section in &self.sections {
            let start = data.len();
            write_digest_section(&mut data, &section.name, &section.digests);
            sections.push((section.name.clone(), start..data.len()));
        }

        SerializedManifest { data, sections }
    }

    /// Serialize to the canonical text form, discarding section offsets.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.serialize().into_bytes()
    }
}

/// The serialized bytes of a [Manifest] plus the location of each section.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SerializedManifest {
    data: Vec<u8>,
    sections: Vec<(String, Range<usize>)>,
}

impl SerializedManifest {
    /// The full manifest document.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Iterate over `(name, bytes)` of every per-file section.
    ///
    /// The bytes are slices of [Self::as_bytes()] and include each section's
    /// terminating blank line.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
        self.sections
            .iter()
            .map(move |(name, range)| (name.as_str(), &self.data[range.clone()]))
    }
}
