// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signing add-ons on the filesystem.

[SigningSession] drives the complete signing of an add-on file: reading it,
digesting its content, obtaining a signature, writing a signed archive, and
replacing the original file.

The original file is never opened for writing. The signed archive is written
to a temporary file in the same directory, which atomically replaces the
original once it has been verified. The temporary file is only created
after a signature has been obtained, so nothing is written to disk unless
the signing service cooperates.
*/

use {
    crate::{
        addon_id::resolve_addon_id, verify_signed_archive, ArchiveSigner, Error, Manifest,
        SignatureFile, SignedArchiveLayout, SigningAuthority, SigningSettings, XpiArchive,
        XpiResult,
    },
    log::{debug, info, warn},
    std::{
        fmt::{Display, Formatter},
        io::{BufReader, BufWriter, Write},
        path::Path,
    },
};

/// A unit of work performed when signing a file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PipelineStage {
    /// Parsing the archive and resolving the add-on identifier.
    Read,
    /// Building the manifest and signature file.
    Digest,
    /// Waiting on the signing authority.
    AwaitSignature,
    /// Writing and verifying the signed archive.
    Rebuild,
    /// Replacing the original file.
    Commit,
}

impl Display for PipelineStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Digest => "digest",
            Self::AwaitSignature => "await-signature",
            Self::Rebuild => "rebuild",
            Self::Commit => "commit",
        })
    }
}

/// The state of a [SigningSession].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    Idle,
    Read,
    Digest,
    AwaitSignature,
    Rebuild,
    Committed,
    Failed { stage: PipelineStage },
}

impl SessionState {
    /// The stage that is executing while in this state.
    fn stage(&self) -> PipelineStage {
        match self {
            Self::Idle | Self::Read => PipelineStage::Read,
            Self::Digest => PipelineStage::Digest,
            Self::AwaitSignature => PipelineStage::AwaitSignature,
            Self::Rebuild => PipelineStage::Rebuild,
            Self::Committed => PipelineStage::Commit,
            Self::Failed { stage } => *stage,
        }
    }
}

fn temp_file_error(e: std::io::Error) -> Error {
    Error::Write(format!("temporary file: {}", e))
}

/// Signs add-on files in place.
pub struct SigningSession<'a> {
    settings: &'a SigningSettings,
    state: SessionState,
    stage: PipelineStage,
}

impl<'a> SigningSession<'a> {
    pub fn new(settings: &'a SigningSettings) -> Self {
        Self {
            settings,
            state: SessionState::Idle,
            stage: PipelineStage::Read,
        }
    }

    pub fn settings(&self) -> &SigningSettings {
        self.settings
    }

    /// The current state of the session.
    ///
    /// After a failed signing, this records the stage that failed.
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn advance(&mut self, state: SessionState) {
        info!("{:?} -> {:?}", self.state, state);
        self.state = state;
        self.stage = state.stage();
    }

    /// Sign the add-on at `path`, replacing it with its signed version.
    ///
    /// `addon_id` overrides the identifier found in the add-on's install
    /// descriptor. Either way, long identifiers are normalized before being
    /// sent to `authority`.
    ///
    /// On error, the file at `path` is unmodified.
    pub fn sign_file_in_place(
        &mut self,
        path: impl AsRef<Path>,
        authority: &dyn SigningAuthority,
        addon_id: Option<&str>,
    ) -> XpiResult<SignedArchiveLayout> {
        let path = path.as_ref();

        self.state = SessionState::Idle;
        self.stage = PipelineStage::Read;

        match self.sign_file_in_place_impl(path, authority, addon_id) {
            Ok(layout) => Ok(layout),
            Err(e) => {
                let stage = self.stage;
                warn!("signing {} failed during {} stage", path.display(), stage);
                self.state = SessionState::Failed { stage };

                Err(e)
            }
        }
    }

    fn sign_file_in_place_impl(
        &mut self,
        path: &Path,
        authority: &dyn SigningAuthority,
        addon_id: Option<&str>,
    ) -> XpiResult<SignedArchiveLayout> {
        self.advance(SessionState::Read);
        let mut archive = XpiArchive::open(path)?;
        let addon_id = resolve_addon_id(&archive, addon_id)?;

        self.advance(SessionState::Digest);
        let algorithms = self.settings.digest_algorithms();
        let manifest = Manifest::from_entries(archive.entries(), algorithms)?.serialize();
        let signature_file = SignatureFile::from_manifest(
            &manifest,
            algorithms,
            self.settings.include_signature_sections(),
        )?
        .to_bytes();

        self.advance(SessionState::AwaitSignature);
        let signature_block = authority.sign_signature_file(&addon_id, &signature_file)?;

        self.advance(SessionState::Rebuild);
        // Use a relative parent of "." for bare file names.
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(temp_file_error)?;

        let (mut writer, layout) = ArchiveSigner::new(self.settings).write_signed_archive(
            &mut archive,
            manifest.as_bytes(),
            &signature_file,
            &signature_block,
            BufWriter::new(temp.as_file_mut()),
        )?;
        writer.flush().map_err(temp_file_error)?;
        drop(writer);

        temp.as_file().sync_all().map_err(temp_file_error)?;

        verify_signed_archive(
            BufReader::new(temp.reopen().map_err(temp_file_error)?),
            &layout,
        )?;

        let permissions = std::fs::metadata(path)
            .map_err(|e| Error::Write(format!("{}: {}", path.display(), e)))?
            .permissions();
        temp.as_file()
            .set_permissions(permissions)
            .map_err(temp_file_error)?;

        // Release the original file before it is replaced.
        drop(archive);

        self.stage = PipelineStage::Commit;
        debug!("replacing {} with {}", path.display(), temp.path().display());
        temp.persist(path)?;
        self.advance(SessionState::Committed);

        info!("wrote {} entries to {}", layout.len(), path.display());

        Ok(layout)
    }
}
