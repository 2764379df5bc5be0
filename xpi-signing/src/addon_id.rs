// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Add-on identifiers.

Signing services want to know which add-on they are signing. The identifier
comes from the add-on's install descriptor: either a legacy `install.rdf`
or a WebExtension `manifest.json`.
*/

use {
    crate::{Error, XpiArchive, XpiResult},
    log::{info, warn},
    once_cell::sync::Lazy,
    regex::bytes::Regex,
    serde::Deserialize,
    sha2::{Digest, Sha256},
    std::io::{Read, Seek},
};

/// Legacy install descriptor.
pub const INSTALL_RDF: &str = "install.rdf";

/// WebExtension manifest.
pub const MANIFEST_JSON: &str = "manifest.json";

/// Email-like identifier in `install.rdf`.
static RE_INSTALL_RDF_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w.-]+@[\w.-]+").unwrap());

/// Maximum length of an identifier accepted by signing services.
pub const MAX_ADDON_ID_LENGTH: usize = 64;

/// Normalize an identifier for submission to a signing service.
///
/// Identifiers of at most [MAX_ADDON_ID_LENGTH] characters are returned
/// unchanged. Longer identifiers are replaced by the hex SHA-256 of their
/// UTF-8 bytes, which is exactly 64 characters.
pub fn normalize_addon_id(id: &str) -> String {
    if id.chars().count() <= MAX_ADDON_ID_LENGTH {
        id.to_string()
    } else {
        let digest = hex::encode(Sha256::digest(id.as_bytes()));
        warn!("add-on identifier {} is too long; using {}", id, digest);
        digest
    }
}

/// Find an email-like identifier in `install.rdf` content.
fn id_from_install_rdf(data: &[u8]) -> XpiResult<String> {
    let m = RE_INSTALL_RDF_ID
        .find(data)
        .ok_or(Error::IdentifierNotFound)?;

    String::from_utf8(m.as_bytes().to_vec())
        .map_err(|_| Error::IdentifierMalformed(format!("{} is not UTF-8", INSTALL_RDF)))
}

#[derive(Clone, Debug, Default, Deserialize)]
struct GeckoSettings {
    id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct BrowserSettings {
    gecko: Option<GeckoSettings>,
}

impl BrowserSettings {
    fn gecko_id(&self) -> Option<&str> {
        self.gecko
            .as_ref()
            .and_then(|gecko| gecko.id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// The parts of a WebExtension `manifest.json` we care about.
#[derive(Clone, Debug, Default, Deserialize)]
struct WebExtensionManifest {
    applications: Option<BrowserSettings>,
    browser_specific_settings: Option<BrowserSettings>,
}

/// Find the gecko identifier in `manifest.json` content.
///
/// `applications` is consulted before `browser_specific_settings`.
fn id_from_manifest_json(data: &[u8]) -> XpiResult<String> {
    let manifest = serde_json::from_slice::<WebExtensionManifest>(data)
        .map_err(|e| Error::IdentifierMalformed(format!("{}: {}", MANIFEST_JSON, e)))?;

    manifest
        .applications
        .iter()
        .chain(manifest.browser_specific_settings.iter())
        .find_map(|settings| settings.gecko_id())
        .map(|id| id.to_string())
        .ok_or(Error::IdentifierNotFound)
}

/// Resolve the raw identifier of an add-on from its install descriptor.
///
/// `install.rdf` takes precedence over `manifest.json`.
pub fn extract_addon_id<R: Read + Seek>(archive: &XpiArchive<R>) -> XpiResult<String> {
    if let Some(entry) = archive.entry(INSTALL_RDF) {
        id_from_install_rdf(entry.content())
    } else if let Some(entry) = archive.entry(MANIFEST_JSON) {
        id_from_manifest_json(entry.content())
    } else {
        Err(Error::IdentifierNotFound)
    }
}

/// Resolve the identifier to submit for an add-on.
///
/// An explicit identifier bypasses extraction. Either way, the result is
/// normalized by [normalize_addon_id()].
pub fn resolve_addon_id<R: Read + Seek>(
    archive: &XpiArchive<R>,
    explicit: Option<&str>,
) -> XpiResult<String> {
    let id = match explicit {
        Some(id) if !id.is_empty() => id.to_string(),
        Some(_) => return Err(Error::IdentifierNotFound),
        None => extract_addon_id(archive)?,
    };

    info!("using add-on identifier {}", id);

    Ok(normalize_addon_id(&id))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{testutil::build_zip, EntryCompression},
        std::io::Cursor,
    };

    fn make_archive(entries: &[(&str, &[u8])]) -> XpiResult<XpiArchive<Cursor<Vec<u8>>>> {
        let entries = entries
            .iter()
            .map(|(name, data)| (*name, *data, EntryCompression::Deflated))
            .collect::<Vec<_>>();

        XpiArchive::from_reader(Cursor::new(build_zip(&entries)))
    }

    const INSTALL_RDF_DATA: &[u8] = br#"<?xml version="1.0"?>
<RDF xmlns="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
     xmlns:em="http://www.mozilla.org/2004/em-rdf#">
  <Description about="urn:mozilla:install-manifest">
    <em:id>my-addon@example.com</em:id>
    <em:version>1.0</em:version>
  </Description>
</RDF>
"#;

    #[test]
    fn normalize() {
        assert_eq!(normalize_addon_id("a@b.c"), "a@b.c");

        let exact = "x".repeat(64);
        assert_eq!(normalize_addon_id(&exact), exact);

        let long = format!("{}@example.com", "x".repeat(60));
        let normalized = normalize_addon_id(&long);
        assert_eq!(normalized.len(), 64);
        assert!(normalized.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(normalized, hex::encode(Sha256::digest(long.as_bytes())));
        assert_eq!(normalize_addon_id(&long), normalized);

        // Characters, not bytes, are counted.
        let wide = "é".repeat(64);
        assert_eq!(normalize_addon_id(&wide), wide);
    }

    #[test]
    fn install_rdf() -> XpiResult<()> {
        let archive = make_archive(&[
            ("install.rdf", INSTALL_RDF_DATA),
            ("manifest.json", br#"{"applications": {"gecko": {"id": "other@example.com"}}}"#),
        ])?;

        assert_eq!(extract_addon_id(&archive)?, "my-addon@example.com");

        Ok(())
    }

    #[test]
    fn install_rdf_without_id() -> XpiResult<()> {
        let archive = make_archive(&[("install.rdf", b"<RDF></RDF>")])?;

        assert!(matches!(
            extract_addon_id(&archive),
            Err(Error::IdentifierNotFound)
        ));

        Ok(())
    }

    #[test]
    fn manifest_json() -> XpiResult<()> {
        let archive = make_archive(&[(
            "manifest.json",
            br#"{"manifest_version": 2, "applications": {"gecko": {"id": "webext@example.com"}}}"#,
        )])?;
        assert_eq!(extract_addon_id(&archive)?, "webext@example.com");

        let archive = make_archive(&[(
            "manifest.json",
            br#"{"browser_specific_settings": {"gecko": {"id": "{e4a8a97b-f2ed-450b-b12d-ee082ba24781}"}}}"#,
        )])?;
        assert_eq!(
            extract_addon_id(&archive)?,
            "{e4a8a97b-f2ed-450b-b12d-ee082ba24781}"
        );

        let archive = make_archive(&[(
            "manifest.json",
            br#"{"applications": {"gecko": {}}, "browser_specific_settings": {"gecko": {"id": "bss@example.com"}}}"#,
        )])?;
        assert_eq!(extract_addon_id(&archive)?, "bss@example.com");

        Ok(())
    }

    #[test]
    fn manifest_json_problems() -> XpiResult<()> {
        let archive = make_archive(&[("manifest.json", br#"{"name": "no id"}"#)])?;
        assert!(matches!(
            extract_addon_id(&archive),
            Err(Error::IdentifierNotFound)
        ));

        let archive = make_archive(&[("manifest.json", b"{not json")])?;
        assert!(matches!(
            extract_addon_id(&archive),
            Err(Error::IdentifierMalformed(_))
        ));

        Ok(())
    }

    #[test]
    fn no_descriptor() -> XpiResult<()> {
        let archive = make_archive(&[("a.txt", b"hello")])?;

        assert!(matches!(
            extract_addon_id(&archive),
            Err(Error::IdentifierNotFound)
        ));
        assert!(matches!(
            resolve_addon_id(&archive, None),
            Err(Error::IdentifierNotFound)
        ));

        Ok(())
    }

    #[test]
    fn explicit_identifier() -> XpiResult<()> {
        let archive = make_archive(&[("a.txt", b"hello")])?;

        assert_eq!(
            resolve_addon_id(&archive, Some("override@example.com"))?,
            "override@example.com"
        );

        let long = "y".repeat(65);
        assert_eq!(
            resolve_addon_id(&archive, Some(&long))?,
            normalize_addon_id(&long)
        );
        assert_ne!(resolve_addon_id(&archive, Some(&long))?, long);

        assert!(matches!(
            resolve_addon_id(&archive, Some("")),
            Err(Error::IdentifierNotFound)
        ));

        Ok(())
    }
}
