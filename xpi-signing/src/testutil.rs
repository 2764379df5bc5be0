// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{authority::SigningAuthority, EntryCompression, Error, XpiResult},
    std::{
        cell::RefCell,
        io::{Cursor, Write},
    },
    zip::{write::FileOptions, ZipWriter},
};

/// Produce ZIP file data holding the given entries, in order.
///
/// Names ending with `/` become directory entries.
pub fn build_zip(entries: &[(&str, &[u8], EntryCompression)]) -> Vec<u8> {
    let mut zf = ZipWriter::new(Cursor::new(vec![]));

    for (name, data, compression) in entries {
        let options = FileOptions::default().compression_method(compression.as_zip());

        if name.ends_with('/') {
            zf.add_directory(*name, options).unwrap();
        } else {
            zf.start_file(*name, options).unwrap();
            zf.write_all(data).unwrap();
        }
    }

    zf.finish().unwrap().into_inner()
}

/// A [SigningAuthority] that records requests and answers with fixed data.
pub struct StubAuthority {
    pub block: Option<Vec<u8>>,
    pub requests: RefCell<Vec<(String, Vec<u8>)>>,
}

impl StubAuthority {
    /// An authority that always returns `block`.
    pub fn returning(block: &[u8]) -> Self {
        Self {
            block: Some(block.to_vec()),
            requests: RefCell::new(vec![]),
        }
    }

    /// An authority that rejects every request.
    pub fn rejecting() -> Self {
        Self {
            block: None,
            requests: RefCell::new(vec![]),
        }
    }
}

impl SigningAuthority for StubAuthority {
    fn sign_signature_file(&self, addon_id: &str, signature_file: &[u8]) -> XpiResult<Vec<u8>> {
        self.requests
            .borrow_mut()
            .push((addon_id.to_string(), signature_file.to_vec()));

        self.block.clone().ok_or_else(|| Error::SigningRejected {
            status: 403,
            reason: "Forbidden".to_string(),
        })
    }
}
