// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signing of browser add-on (XPI) packages.

XPI files are JAR files, which are ZIP files with signature metadata stored
under `META-INF/`. Signing an XPI consists of:

1. Digesting every file in the archive and recording the digests in a
   manifest ([Manifest], stored as `META-INF/manifest.mf`).
2. Deriving a signature file from the serialized manifest ([SignatureFile],
   stored as `META-INF/<name>.sf`).
3. Obtaining a PKCS#7 signature over the signature file. This crate does not
   hold signing keys: a remote service implementing [SigningAuthority] does
   the cryptographic work.
4. Writing a new archive holding the original entries followed by the three
   signature entries ([ArchiveSigner]).

[SigningSession] ties these together and atomically replaces a file on disk
with its signed version.

Serialized manifests and signature files are byte-exact and deterministic:
the bytes we digest are the bytes we write.
*/

pub mod addon_id;
mod archive;
pub use archive::*;
pub mod authority;
pub use authority::{HttpSigningAuthority, SigningAuthority};
mod digests;
pub use digests::*;
mod manifest;
pub use manifest::*;
mod pipeline;
pub use pipeline::*;
mod settings;
pub use settings::*;
mod signature_file;
pub use signature_file::*;
mod signer;
pub use signer::*;
#[cfg(test)]
mod testutil;

/// Unified error type for add-on signing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed archive: {0}")]
    Format(String),

    #[error("archive contains multiple entries named {0}")]
    DuplicateEntry(String),

    #[error("signed archive does not match what was written: {0}")]
    SignedArchiveMismatch(String),

    #[error("archive has no files eligible for signing")]
    EmptyArchive,

    #[error("signing service rejected request: HTTP {status} {reason}")]
    SigningRejected { status: u16, reason: String },

    #[error("error communicating with signing service: {0}")]
    SigningTransport(#[from] reqwest::Error),

    #[error("invalid signing service URL: {0}")]
    BadEndpoint(String),

    #[error("bad response from signing service: {0}")]
    SigningResponse(String),

    #[error("could not find add-on identifier; specify one explicitly")]
    IdentifierNotFound,

    #[error("malformed add-on install descriptor: {0}")]
    IdentifierMalformed(String),

    #[error("error writing signed archive: {0}")]
    Write(String),

    #[error("error replacing original file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("unknown digest algorithm: {0}")]
    UnknownDigestAlgorithm(String),

    #[error("at least one digest algorithm is required")]
    NoDigestAlgorithms,

    #[error("invalid signature name (must be 1-8 of [A-Za-z0-9_-]): {0}")]
    BadSignatureName(String),

    #[error("unknown signature block kind: {0}")]
    UnknownBlockKind(String),
}

pub type XpiResult<T> = std::result::Result<T, Error>;
