// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Remote signing services.

We never hold signing keys. Instead, the signature file is sent to a
service which answers with a PKCS#7 signature block over it.

The HTTP protocol spoken by [HttpSigningAuthority] is a `multipart/form-data`
POST with an `addon_id` text field and a `file` field holding the signature
file. A successful response is HTTP 200 with a JSON object mapping the
signature block file name (e.g. `mozilla.rsa`) to its base64 encoding.
*/

use {
    crate::{Error, SigningSettings, XpiResult},
    hyper::ext::ReasonPhrase,
    log::{debug, info, warn},
    reqwest::{
        blocking::{
            multipart::{Form, Part},
            Client, ClientBuilder,
        },
        IntoUrl, StatusCode, Url,
    },
};

/// An entity capable of producing a signature block for a signature file.
pub trait SigningAuthority {
    /// Obtain the signature block for a signature file.
    ///
    /// `addon_id` identifies the add-on being signed. The returned bytes are
    /// embedded in the archive verbatim.
    fn sign_signature_file(&self, addon_id: &str, signature_file: &[u8]) -> XpiResult<Vec<u8>>;
}

/// Obtain the default [Client] to use for HTTP requests.
///
/// No timeouts are configured. Construct a custom [Client] and use
/// [HttpSigningAuthority::with_client()] if you need them.
pub fn default_client() -> XpiResult<Client> {
    Ok(ClientBuilder::default()
        .user_agent(concat!("xpi-signing/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// A [SigningAuthority] reached over HTTP.
#[derive(Clone, Debug)]
pub struct HttpSigningAuthority {
    client: Client,
    endpoint: Url,
    signature_file_name: String,
    signature_block_file_name: String,
}

impl HttpSigningAuthority {
    /// Construct an instance talking to `endpoint` using the default client.
    pub fn new(endpoint: impl IntoUrl, settings: &SigningSettings) -> XpiResult<Self> {
        Self::with_client(default_client()?, endpoint, settings)
    }

    /// Construct an instance using a custom HTTP client.
    pub fn with_client(
        client: Client,
        endpoint: impl IntoUrl,
        settings: &SigningSettings,
    ) -> XpiResult<Self> {
        Ok(Self {
            client,
            endpoint: endpoint
                .into_url()
                .map_err(|e| Error::BadEndpoint(e.to_string()))?,
            signature_file_name: format!("{}.sf", settings.signature_name()),
            signature_block_file_name: settings.signature_block_file_name(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl SigningAuthority for HttpSigningAuthority {
    fn sign_signature_file(&self, addon_id: &str, signature_file: &[u8]) -> XpiResult<Vec<u8>> {
        info!("requesting signature for {} from {}", addon_id, self.endpoint);

        let form = Form::new().text("addon_id", addon_id.to_string()).part(
            "file",
            Part::bytes(signature_file.to_vec()).file_name(self.signature_file_name.clone()),
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Accept", "application/json")
            .multipart(form)
            .send()?;

        let status = response.status();
        // Only reason phrases differing from the canonical one are retained.
        let reason = response
            .extensions()
            .get::<ReasonPhrase>()
            .map(|reason| String::from_utf8_lossy(reason.as_bytes()).trim().to_string())
            .filter(|reason| !reason.is_empty())
            .or_else(|| status.canonical_reason().map(|reason| reason.to_string()));
        let body = response.bytes()?;

        if status != StatusCode::OK {
            let text = String::from_utf8_lossy(&body);
            warn!("signing service response body: {}", text);

            return Err(Error::SigningRejected {
                status: status.as_u16(),
                reason: reason.unwrap_or_else(|| match text.trim() {
                    "" => "unknown".to_string(),
                    text => text.to_string(),
                }),
            });
        }

        let value = serde_json::from_slice::<serde_json::Value>(&body)
            .map_err(|e| Error::SigningResponse(format!("invalid JSON: {}", e)))?;

        let encoded = value
            .get(&self.signature_block_file_name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::SigningResponse(format!(
                    "no {} string in response",
                    self.signature_block_file_name
                ))
            })?;

        let block = base64::decode(encoded).map_err(|e| {
            Error::SigningResponse(format!(
                "base64 error in {}: {}",
                self.signature_block_file_name, e
            ))
        })?;

        if block.is_empty() {
            return Err(Error::SigningResponse("empty signature block".to_string()));
        }

        debug!("received {} byte signature block", block.len());

        Ok(block)
    }
}
