use std::time::Duration;

use serde::Deserialize;

use super::error::ShopError;

const VERSION_URL: &str = "https://valorant-api.com/v1/version";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) struct VersionInfo {
    pub(super) client_version: String,
    pub(super) user_agent: String,
}

#[derive(Deserialize)]
struct VersionApiResponse {
    data: VersionData,
}

#[derive(Deserialize)]
struct VersionData {
    #[serde(rename = "riotClientVersion")]
    riot_client_version: String,
    #[serde(rename = "riotClientBuild")]
    riot_client_build: String,
}

fn user_agent(build: &str) -> String {
    format!("RiotClient/{} rso-auth (Windows;10;;Professional, x64)", build)
}

/// Current client version and a matching User-Agent, from the public
/// valorant-api.com mirror.
pub(super) async fn fetch_version_info() -> Result<VersionInfo, ShopError> {
    let client = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;

    let resp = client
        .get(VERSION_URL)
        .send()
        .await
        .map_err(|e| ShopError::VersionFetchFailed(format!("request failed: {}", e)))?;

    if !resp.status().is_success() {
        return Err(ShopError::VersionFetchFailed(format!(
            "API returned status {}",
            resp.status()
        )));
    }

    let api: VersionApiResponse = resp
        .json()
        .await
        .map_err(|e| ShopError::VersionFetchFailed(format!("failed to parse response: {}", e)))?;

    log::debug!("Riot client version {}", api.data.riot_client_version);
    Ok(VersionInfo {
        user_agent: user_agent(&api.data.riot_client_build),
        client_version: api.data.riot_client_version,
    })
}

#[derive(Deserialize)]
struct BundleApiResponse {
    data: BundleApiData,
}

#[derive(Deserialize)]
struct BundleApiData {
    #[serde(rename = "displayName")]
    display_name: String,
}

/// Display name of a featured bundle. `None` on any failure.
pub(super) async fn fetch_bundle_name(asset_id: &str) -> Option<String> {
    let client = reqwest::Client::builder()
        .timeout(LOOKUP_TIMEOUT)
        .build()
        .ok()?;
    let resp: BundleApiResponse = client
        .get(format!("https://valorant-api.com/v1/bundles/{}", asset_id))
        .send()
        .await
        .ok()?
        .error_for_status()
        .ok()?
        .json()
        .await
        .ok()?;
    Some(resp.data.display_name)
}
