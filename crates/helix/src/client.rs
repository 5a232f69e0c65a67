//! reqwest-backed Helix client
//!
//! Every Helix call carries `Authorization: Bearer <token>` and the
//! `Client-Id` header. Non-2xx answers become `Error::Status` with the raw
//! body; nothing is retried here.

use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::{debug, instrument};
use twitch_auth::{CLIENT_ID_HEADER, ClientCredentials, TOKEN_ENDPOINT, TokenResponse};

use crate::error::{Error, Result};
use crate::{ClipInfo, CreatedClip, Upstream, UpstreamFuture};

/// Production Helix base URL
pub const DEFAULT_API_BASE: &str = "https://api.twitch.tv/helix";

/// Helix list envelope: `{"data": [...]}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CreatedEntry {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClipEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Helix client bound to one registered application.
#[derive(Debug, Clone)]
pub struct HelixClient {
    http: reqwest::Client,
    app: ClientCredentials,
    api_base: String,
    token_endpoint: String,
}

impl HelixClient {
    /// Client against the production Helix and identity endpoints.
    pub fn new(http: reqwest::Client, app: ClientCredentials) -> Self {
        Self::with_endpoints(http, app, DEFAULT_API_BASE, TOKEN_ENDPOINT)
    }

    /// Client against custom endpoints (staging, local mocks).
    pub fn with_endpoints(
        http: reqwest::Client,
        app: ClientCredentials,
        api_base: &str,
        token_endpoint: &str,
    ) -> Self {
        Self {
            http,
            app,
            api_base: api_base.trim_end_matches('/').to_string(),
            token_endpoint: token_endpoint.to_string(),
        }
    }

    fn clips_url(&self) -> String {
        format!("{}/clips", self.api_base)
    }

    #[instrument(skip(self, access_token))]
    async fn create(&self, access_token: &str, broadcaster_id: &str) -> Result<CreatedClip> {
        let response = self
            .http
            .post(self.clips_url())
            .query(&[("broadcaster_id", broadcaster_id)])
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .header(CLIENT_ID_HEADER, &self.app.client_id)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let envelope: Envelope<CreatedEntry> = read_json(response).await?;
        let clip_id = envelope
            .data
            .into_iter()
            .next()
            .and_then(|entry| entry.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::InvalidResponse("Clip ID missing from Twitch response".into()))?;

        debug!(clip_id, "clip creation accepted");
        Ok(CreatedClip { clip_id })
    }

    #[instrument(skip(self, access_token))]
    async fn lookup(&self, access_token: &str, clip_id: &str) -> Result<ClipInfo> {
        let response = self
            .http
            .get(self.clips_url())
            .query(&[("id", clip_id)])
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .header(CLIENT_ID_HEADER, &self.app.client_id)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let envelope: Envelope<ClipEntry> = read_json(response).await?;
        // An empty list means the clip is not visible yet
        let info = match envelope.data.into_iter().next() {
            Some(entry) => ClipInfo {
                clip_id: entry.id.unwrap_or_else(|| clip_id.to_string()),
                url: entry.url.filter(|url| !url.is_empty()),
            },
            None => ClipInfo {
                clip_id: clip_id.to_string(),
                url: None,
            },
        };
        Ok(info)
    }
}

/// Classify the status, then decode the JSON body.
async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid Helix response: {e}")))
}

impl Upstream for HelixClient {
    fn create_clip<'a>(
        &'a self,
        access_token: &'a str,
        broadcaster_id: &'a str,
    ) -> UpstreamFuture<'a, CreatedClip> {
        Box::pin(self.create(access_token, broadcaster_id))
    }

    fn get_clip<'a>(
        &'a self,
        access_token: &'a str,
        clip_id: &'a str,
    ) -> UpstreamFuture<'a, ClipInfo> {
        Box::pin(self.lookup(access_token, clip_id))
    }

    fn refresh_credential<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> UpstreamFuture<'a, TokenResponse> {
        Box::pin(async move {
            twitch_auth::refresh_token(&self.http, &self.token_endpoint, &self.app, refresh_token)
                .await
                .map_err(Error::from)
        })
    }
}
