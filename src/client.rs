use std::time::Duration;

use chrono::{Local, Utc};
use chrono_tz::Tz;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{forecast_window, general_forecast, AmberError, Price, Site, BASE_URL_V1};

/// Request timeout used unless a different one or a custom transport is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Interval length requested from the price endpoints, in minutes.
const RESOLUTION: &str = "30";

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default, alias = "Message")]
    message: String,
}

/// Configuration for an [`AmberClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    api_key: SecretString,
    base_url: String,
    timeout: Duration,
    http: Option<reqwest::Client>,
    timezone: Option<Tz>,
}

impl ClientBuilder {
    /// Sets the API root, [`BASE_URL_V1`] by default.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the per-request timeout of the default transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Uses `http` as transport, e.g. to go through a proxy. The configured
    /// timeout is ignored in this case.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Computes the forecast date range in `timezone` instead of the local one.
    pub fn timezone(mut self, timezone: Tz) -> Self {
        self.timezone = Some(timezone);
        self
    }

    pub fn build(self) -> Result<AmberClient, AmberError> {
        let base_url = normalize_base_url(&self.base_url)?;
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder().timeout(self.timeout).build()?,
        };

        Ok(AmberClient {
            http,
            base_url,
            api_key: self.api_key,
            timezone: self.timezone,
        })
    }
}

/// Makes sure the path ends with a slash so endpoints are joined below it.
fn normalize_base_url(raw: &str) -> Result<Url, AmberError> {
    let mut url = Url::parse(raw)?;
    let path = url.path().trim_end_matches('/').to_owned();
    url.set_path(&format!("{path}/"));

    Ok(url)
}

/// Client for the Amber API, authenticated with a single API key.
///
/// The client holds no state besides its configuration and can be cloned and
/// shared between tasks freely.
#[derive(Debug, Clone)]
pub struct AmberClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
    timezone: Option<Tz>,
}

impl AmberClient {
    /// Creates a client for [`BASE_URL_V1`] with a one minute request timeout.
    ///
    /// The key is not validated, an invalid key only shows as an error
    /// response of the API.
    pub fn new(api_key: impl Into<String>) -> Result<Self, AmberError> {
        Self::builder(api_key).build()
    }

    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            api_key: SecretString::from(api_key.into()),
            base_url: BASE_URL_V1.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            http: None,
            timezone: None,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the sites available to the API key, usually only one.
    ///
    /// The site is needed to query prices.
    pub async fn get_sites(&self) -> Result<Vec<Site>, AmberError> {
        self.get("sites", &[]).await
    }

    /// Returns the prices of the current interval, one per channel of the site.
    pub async fn get_current_prices(&self, site: &Site) -> Result<Vec<Price>, AmberError> {
        self.get(
            &format!("sites/{}/prices/current", site.id),
            &[("resolution", RESOLUTION)],
        )
        .await
    }

    /// Returns up to 24 hours of forecast prices of the general channel, sorted
    /// by start time.
    pub async fn get_forecast_general_prices(
        &self,
        site: &Site,
    ) -> Result<Vec<Price>, AmberError> {
        let (start_date, end_date) = self.forecast_window();

        let prices: Vec<Price> = self
            .get(
                &format!("sites/{}/prices", site.id),
                &[
                    ("resolution", RESOLUTION),
                    ("startDate", start_date.as_str()),
                    ("endDate", end_date.as_str()),
                ],
            )
            .await?;

        Ok(general_forecast(prices))
    }

    fn forecast_window(&self) -> (String, String) {
        match self.timezone {
            Some(timezone) => forecast_window(Utc::now().with_timezone(&timezone)),
            None => forecast_window(Local::now()),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, AmberError> {
        let url = self.base_url.join(path)?;
        debug!("GET {url} params={params:?}");

        let response = self
            .http
            .get(url)
            .query(params)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(ACCEPT, JSON_CONTENT_TYPE)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;

        handle_response(response).await
    }
}

/// Redirects count as success, only statuses outside of 200..400 are errors.
fn is_success(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}

async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AmberError> {
    let status = response.status();

    if !is_success(status) {
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                debug!("reading error response failed: {e}");
                Default::default()
            }
        };
        debug!(%status, "api request failed");
        return Err(api_error(status, &body));
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| {
        let preview = String::from_utf8_lossy(&body[..body.len().min(200)]);
        debug!("decoding response failed: {e} (body preview: {preview:?})");
        AmberError::Decode(e)
    })
}

/// Uses the message of the error response, or a generic one if there is none.
///
/// Only the first JSON value of the body is read, anything after it is ignored.
fn api_error(status: StatusCode, body: &[u8]) -> AmberError {
    let first = serde_json::Deserializer::from_slice(body)
        .into_iter::<ErrorResponse>()
        .next();

    let message = match first {
        Some(Ok(response)) => response.message,
        _ => format!("unknown error, status code: {}", status.as_u16()),
    };

    AmberError::Api { status, message }
}
