// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Writing signed archives.

A signed archive is the original archive with three entries appended:
the manifest, the signature file, and the signature block. Original entries
are copied without decompressing them, so their bytes, compression method,
and relative order are untouched.
*/

use {
    crate::{
        archive::{format_error, write_error},
        EntryCompression, Error, SigningSettings, XpiArchive, XpiResult,
    },
    log::{info, warn},
    std::io::{Read, Seek, Write},
    zip::{write::FileOptions, ZipArchive, ZipWriter},
};

/// Describes an entry written to a signed archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedEntry {
    pub name: String,
    pub compression: EntryCompression,
}

/// The entries of a signed archive, in the order they were written.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SignedArchiveLayout {
    entries: Vec<SignedEntry>,
}

impl SignedArchiveLayout {
    pub fn entries(&self) -> &[SignedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

/// Produces signed archives from an existing archive and signature material.
pub struct ArchiveSigner<'a> {
    settings: &'a SigningSettings,
}

impl<'a> ArchiveSigner<'a> {
    pub fn new(settings: &'a SigningSettings) -> Self {
        Self { settings }
    }

    /// Write a signed version of `archive` to `writer`.
    ///
    /// `manifest` and `signature_file` are the serialized documents and
    /// `signature_block` is the opaque signature over the signature file.
    ///
    /// Entries of the source archive having the same name as one of the new
    /// signature entries are from a previous signing and are not copied.
    ///
    /// Returns the writer and the layout of what was written.
    pub fn write_signed_archive<R: Read + Seek, W: Write + Seek>(
        &self,
        archive: &mut XpiArchive<R>,
        manifest: &[u8],
        signature_file: &[u8],
        signature_block: &[u8],
        writer: W,
    ) -> XpiResult<(W, SignedArchiveLayout)> {
        let signing_paths = self.settings.signing_paths();

        let copies = archive
            .entries()
            .iter()
            .filter(|entry| {
                if signing_paths
                    .iter()
                    .any(|p| p.eq_ignore_ascii_case(entry.name()))
                {
                    warn!("replacing existing signature file {}", entry.name());
                    false
                } else {
                    true
                }
            })
            .map(|entry| {
                (
                    entry.index(),
                    SignedEntry {
                        name: entry.name().to_string(),
                        compression: entry.compression(),
                    },
                )
            })
            .collect::<Vec<_>>();

        let mut zip = ZipWriter::new(writer);
        let mut layout = SignedArchiveLayout::default();

        for (index, entry) in copies {
            archive.copy_raw_entry(index, &mut zip)?;
            layout.entries.push(entry);
        }

        let compression = self.settings.compression();
        let options = FileOptions::default().compression_method(compression.as_zip());

        for (path, data) in signing_paths
            .iter()
            .zip([manifest, signature_file, signature_block])
        {
            info!("adding {} ({} bytes)", path, data.len());
            zip.start_file(path.as_str(), options)
                .map_err(write_error)?;
            zip.write_all(data)
                .map_err(|e| Error::Write(format!("{}: {}", path, e)))?;

            layout.entries.push(SignedEntry {
                name: path.clone(),
                compression,
            });
        }

        let writer = zip.finish().map_err(write_error)?;

        Ok((writer, layout))
    }
}

/// Verify that a written archive is readable and holds exactly the entries in `layout`.
pub fn verify_signed_archive<R: Read + Seek>(
    reader: R,
    layout: &SignedArchiveLayout,
) -> XpiResult<()> {
    let mut zip = ZipArchive::new(reader).map_err(format_error)?;

    if zip.len() != layout.len() {
        return Err(Error::SignedArchiveMismatch(format!(
            "expected {} entries; found {}",
            layout.len(),
            zip.len()
        )));
    }

    for (index, expected) in layout.entries().iter().enumerate() {
        let file = zip.by_index_raw(index).map_err(format_error)?;

        if file.name() != expected.name {
            return Err(Error::SignedArchiveMismatch(format!(
                "entry {} is {}; expected {}",
                index,
                file.name(),
                expected.name
            )));
        }

        if file.compression() != expected.compression.as_zip() {
            return Err(Error::SignedArchiveMismatch(format!(
                "entry {} has compression {:?}; expected {:?}",
                expected.name,
                file.compression(),
                expected.compression
            )));
        }
    }

    Ok(())
}
