#![forbid(unsafe_code)]

use super::{PayloadPath, UpdateCheck, UpdateSource};
use crate::error::Error;
use crate::resource::{Origin, VersionInfo};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::io::Write;
use tracing::debug;

/// Hosted distributor endpoint used when only a license key and product
/// name are configured.
const DISTRIBUTOR_URL: &str = "https://distributor.uascope.dev/api/v2/download";

const MAX_RETRIES: u32 = 3;

/// Fetches data file updates from a URL. Checks are conditional: the etag
/// recorded on the current version is sent as `If-None-Match`, so an
/// unchanged remote file costs one 304 round trip and no download.
pub struct RemoteSource {
    client: ClientWithMiddleware,
    url: String,
}

impl RemoteSource {
    pub fn new(url: impl Into<String>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Self {
            client,
            url: url.into(),
        }
    }

    /// Derive the hosted distributor URL from a license key and product.
    pub fn for_license(license_key: &str, product: &str) -> Self {
        Self::new(format!(
            "{DISTRIBUTOR_URL}?LicenseKeys={license_key}&Product={product}&Download=True"
        ))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl UpdateSource for RemoteSource {
    async fn check(&self, current: &VersionInfo) -> Result<UpdateCheck, Error> {
        let mut request = self.client.get(&self.url);
        if let Some(etag) = &current.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request
            .send()
            .await
            .map_err(|err| Error::FetchFailed(err.to_string()))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!(url = %self.url, "remote data file not modified");
            return Ok(UpdateCheck::not_available());
        }
        if !response.status().is_success() {
            return Err(Error::FetchFailed(format!(
                "unexpected status {} from {}",
                response.status(),
                self.url
            )));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(String::from);

        // A fresh fetch with an etag matching what we already have is the
        // conditional-request fallback for servers that ignore
        // If-None-Match.
        if let (Some(new), Some(old)) = (&etag, &current.etag)
            && new == old
        {
            debug!(url = %self.url, etag = %new, "remote etag unchanged");
            return Ok(UpdateCheck::not_available());
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| Error::FetchFailed(err.to_string()))?;
        if body.is_empty() {
            return Err(Error::InvalidPayload(format!(
                "empty response body from {}",
                self.url
            )));
        }

        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&body)?;
        file.flush()?;
        debug!(url = %self.url, bytes = body.len(), "update payload downloaded");

        let mut check = UpdateCheck::available(PayloadPath::Temporary(file.into_temp_path()));
        check.etag = etag;
        Ok(check)
    }

    fn origin(&self) -> Origin {
        Origin::Url(self.url.clone())
    }
}

impl std::fmt::Debug for RemoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSource").field("url", &self.url).finish()
    }
}
