// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only access to XPI (ZIP) archives.

use {
    crate::{Error, XpiResult},
    log::debug,
    std::{
        collections::HashSet,
        fs::File,
        io::{BufReader, Read, Seek, Write},
        path::Path,
    },
    zip::{result::ZipError, write::ZipWriter, CompressionMethod, ZipArchive},
};

/// Directory within the archive holding signature metadata.
///
/// Entries under this directory are never digested.
pub const SIGNING_DIRECTORY: &str = "META-INF/";

/// Whether an archive path is within [SIGNING_DIRECTORY].
///
/// The comparison is ASCII case-insensitive, since consumers of JAR files
/// don't agree on the case of `META-INF`.
pub fn is_signing_path(name: &str) -> bool {
    name.len() >= SIGNING_DIRECTORY.len()
        && name.as_bytes()[..SIGNING_DIRECTORY.len()]
            .eq_ignore_ascii_case(SIGNING_DIRECTORY.as_bytes())
}

/// How an entry's data is stored within the archive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryCompression {
    Stored,
    Deflated,
}

impl EntryCompression {
    fn from_zip(method: CompressionMethod) -> XpiResult<Self> {
        match method {
            CompressionMethod::Stored => Ok(Self::Stored),
            CompressionMethod::Deflated => Ok(Self::Deflated),
            method => Err(Error::Format(format!(
                "unsupported compression method: {:?}",
                method
            ))),
        }
    }

    /// The [CompressionMethod] used to write entries with this compression.
    pub fn as_zip(&self) -> CompressionMethod {
        match self {
            Self::Stored => CompressionMethod::Stored,
            Self::Deflated => CompressionMethod::Deflated,
        }
    }
}

/// A file stored in an archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchiveEntry {
    index: usize,
    name: String,
    compression: EntryCompression,
    is_dir: bool,
    content: Vec<u8>,
}

impl ArchiveEntry {
    /// Position of this entry in the archive's central directory.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The path of this entry within the archive.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compression(&self) -> EntryCompression {
        self.compression
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Uncompressed content of this entry.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Whether this entry should be recorded in a manifest.
    ///
    /// Directories and entries under [SIGNING_DIRECTORY] are not.
    pub fn is_signable(&self) -> bool {
        !self.is_dir && !is_signing_path(&self.name)
    }
}

pub(crate) fn format_error(e: ZipError) -> Error {
    Error::Format(e.to_string())
}

pub(crate) fn write_error(e: ZipError) -> Error {
    Error::Write(e.to_string())
}

/// An XPI archive opened for reading.
///
/// All entries are read and decompressed when the archive is opened. The
/// underlying reader is retained so entry data can later be copied verbatim
/// into a new archive.
#[derive(Debug)]
pub struct XpiArchive<R: Read + Seek> {
    zip: ZipArchive<R>,
    entries: Vec<ArchiveEntry>,
}

impl XpiArchive<BufReader<File>> {
    /// Open an archive from a filesystem path.
    pub fn open(path: impl AsRef<Path>) -> XpiResult<Self> {
        let path = path.as_ref();
        debug!("opening archive {}", path.display());

        Self::from_reader(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> XpiArchive<R> {
    /// Construct an instance from a reader of ZIP data.
    pub fn from_reader(reader: R) -> XpiResult<Self> {
        let mut zip = ZipArchive::new(reader).map_err(format_error)?;

        let mut entries = Vec::with_capacity(zip.len());
        let mut seen = HashSet::with_capacity(zip.len());

        for index in 0..zip.len() {
            let mut file = zip.by_index(index).map_err(format_error)?;

            let name = file.name().to_string();
            if !seen.insert(name.clone()) {
                return Err(Error::DuplicateEntry(name));
            }

            let compression = EntryCompression::from_zip(file.compression())?;
            let is_dir = file.is_dir();

            let declared_size = file.size();

            // The declared size is untrusted, so it doesn't size the buffer.
            let mut content = vec![];
            // Decompression and CRC failures surface as I/O errors.
            file.read_to_end(&mut content)
                .map_err(|e| Error::Format(format!("{}: {}", name, e)))?;

            if content.len() as u64 != declared_size {
                return Err(Error::Format(format!(
                    "{}: declared size {} but found {} bytes",
                    name,
                    declared_size,
                    content.len()
                )));
            }

            entries.push(ArchiveEntry {
                index,
                name,
                compression,
                is_dir,
                content,
            });
        }

        debug!("read {} archive entries", entries.len());

        Ok(Self { zip, entries })
    }

    /// Entries in this archive, in central directory order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Find an entry by its exact name.
    pub fn entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Copy the entry at `index` into a ZIP writer without recompressing it.
    ///
    /// The compressed bytes, compression method, CRC and timestamps of the
    /// entry are carried over as-is.
    pub fn copy_raw_entry<W: Write + Seek>(
        &mut self,
        index: usize,
        writer: &mut ZipWriter<W>,
    ) -> XpiResult<()> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| Error::Format(format!("no entry at index {}", index)))?;

        let file = self.zip.by_index_raw(index).map_err(format_error)?;

        if file.name() != entry.name {
            return Err(Error::Format(format!(
                "entry {} changed to {} since archive was opened",
                entry.name,
                file.name()
            )));
        }

        writer.raw_copy_file(file).map_err(write_error)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::testutil::build_zip, std::io::Cursor};

    #[test]
    fn read_entries() -> XpiResult<()> {
        let data = build_zip(&[
            ("install.rdf", b"<RDF/>", EntryCompression::Deflated),
            ("content/", b"", EntryCompression::Stored),
            ("content/a.js", b"var a;", EntryCompression::Stored),
            ("META-INF/mozilla.rsa", b"\x30\x80", EntryCompression::Stored),
        ]);

        let archive = XpiArchive::from_reader(Cursor::new(data))?;
        let entries = archive.entries();

        assert_eq!(
            entries.iter().map(|e| e.name()).collect::<Vec<_>>(),
            vec![
                "install.rdf",
                "content/",
                "content/a.js",
                "META-INF/mozilla.rsa"
            ]
        );
        assert_eq!(
            entries.iter().map(|e| e.index()).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(entries[0].compression(), EntryCompression::Deflated);
        assert_eq!(entries[0].content(), b"<RDF/>");
        assert_eq!(entries[2].compression(), EntryCompression::Stored);
        assert!(entries[1].is_dir());

        assert_eq!(
            entries
                .iter()
                .filter(|e| e.is_signable())
                .map(|e| e.name())
                .collect::<Vec<_>>(),
            vec!["install.rdf", "content/a.js"]
        );

        assert_eq!(
            archive.entry("content/a.js").map(|e| e.content()),
            Some(&b"var a;"[..])
        );
        assert!(archive.entry("missing").is_none());

        Ok(())
    }

    #[test]
    fn signing_paths() {
        assert!(is_signing_path("META-INF/manifest.mf"));
        assert!(is_signing_path("meta-inf/MOZILLA.SF"));
        assert!(is_signing_path("META-INF/"));
        assert!(!is_signing_path("META-INF"));
        assert!(!is_signing_path("content/META-INF/foo"));
        assert!(!is_signing_path("é"));
    }

    #[test]
    fn reject_garbage() {
        let res = XpiArchive::from_reader(Cursor::new(b"this is not a zip file".to_vec()));
        assert!(matches!(res, Err(Error::Format(_))));
    }

    #[test]
    fn reject_truncated() {
        let mut data = build_zip(&[("a.txt", b"hello", EntryCompression::Stored)]);
        // Chop off the end of central directory record.
        data.truncate(data.len() - 10);

        let res = XpiArchive::from_reader(Cursor::new(data));
        assert!(matches!(res, Err(Error::Format(_))));
    }

    /// A stored single-entry archive whose central directory claims a ZIP64
    /// uncompressed size of `u64::MAX`.
    fn oversized_entry_zip() -> Vec<u8> {
        let name = b"a.txt";
        let content = b"hello";
        let crc = 0x3610a686u32;

        let mut data = vec![];

        // Local file header.
        data.extend_from_slice(&0x04034b50u32.to_le_bytes());
        data.extend_from_slice(&45u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0x21u16.to_le_bytes());
        data.extend_from_slice(&crc.to_le_bytes());
        data.extend_from_slice(&(content.len() as u32).to_le_bytes());
        data.extend_from_slice(&(content.len() as u32).to_le_bytes());
        data.extend_from_slice(&(name.len() as u16).to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(name);
        data.extend_from_slice(content);

        let cd_offset = data.len() as u32;

        // Central directory header.
        data.extend_from_slice(&0x02014b50u32.to_le_bytes());
        data.extend_from_slice(&45u16.to_le_bytes());
        data.extend_from_slice(&45u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0x21u16.to_le_bytes());
        data.extend_from_slice(&crc.to_le_bytes());
        data.extend_from_slice(&(content.len() as u32).to_le_bytes());
        data.extend_from_slice(&0xffffffffu32.to_le_bytes());
        data.extend_from_slice(&(name.len() as u16).to_le_bytes());
        data.extend_from_slice(&12u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(name);
        // ZIP64 extended information holding the uncompressed size.
        data.extend_from_slice(&0x0001u16.to_le_bytes());
        data.extend_from_slice(&8u16.to_le_bytes());
        data.extend_from_slice(&u64::MAX.to_le_bytes());

        let cd_size = data.len() as u32 - cd_offset;

        // End of central directory record.
        data.extend_from_slice(&0x06054b50u32.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&cd_size.to_le_bytes());
        data.extend_from_slice(&cd_offset.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());

        data
    }

    #[test]
    fn reject_oversized_declared_size() {
        let res = XpiArchive::from_reader(Cursor::new(oversized_entry_zip()));
        assert!(matches!(res, Err(Error::Format(_))));
    }

    #[test]
    fn reject_corrupt_local_header() {
        let mut data = build_zip(&[("a.txt", b"hello", EntryCompression::Stored)]);
        // Local file header signature is at the start of the file.
        data[0] = b'X';

        let res = XpiArchive::from_reader(Cursor::new(data));
        assert!(matches!(res, Err(Error::Format(_))));
    }
}
