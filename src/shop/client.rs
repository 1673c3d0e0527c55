use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, StatusCode, Url};

use super::error::ShopError;
use super::storefront::{bundle_asset_ids, extract_access_token, parse_storefront};
use super::types::{ApiStorefront, EntitlementsResponse, Storefront, UserInfoResponse};
use super::version::fetch_bundle_name;
use crate::cookies::RiotCookies;

const AUTH_COOKIES_URL: &str = "https://auth.riotgames.com/api/v1/authorization";
const AUTH_REAUTH_URL: &str = "https://auth.riotgames.com/authorize";
const ENTITLEMENTS_URL: &str = "https://entitlements.auth.riotgames.com/api/token/v1";
const USERINFO_URL: &str = "https://auth.riotgames.com/userinfo";

const CLIENT_PLATFORM: &str = "ew0KCSJwbGF0Zm9ybVR5cGUiOiAiUEMiLA0KCSJwbGF0Zm9ybU9TIjogIldpbmRvd3MiLA0KCSJwbGF0Zm9ybU9TVmVyc2lvbiI6ICIxMC4wLjE5MDQyLjEuMjU2LjY0Yml0IiwNCgkicGxhdGZvcm1DaGlwc2V0IjogIlVua25vd24iDQp9";
const RIOT_AUTH_URL: &str = "https://auth.riotgames.com";
const RIOT_GAMES_URL: &str = "https://riotgames.com";
const DEFAULT_SHARD: &str = "ap";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const AUTH_PARAMS: &[(&str, &str)] = &[
    ("client_id", "play-valorant-web-prod"),
    ("nonce", "1"),
    ("redirect_uri", "https://playvalorant.com/opt_in"),
    ("response_type", "token id_token"),
    ("scope", "account openid"),
];

/// `ap1` -> `ap`, `eu3` -> `eu`.
pub(super) fn shard_from_clid(clid: &str) -> &str {
    clid.trim_end_matches(|c: char| c.is_ascii_digit())
}

fn build_client(jar: Arc<Jar>, user_agent: &str, timeout: Duration) -> Result<Client, ShopError> {
    Ok(Client::builder()
        .cookie_provider(jar)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?)
}

fn parse_url(url: &str) -> Result<Url, ShopError> {
    url.parse()
        .map_err(|e| ShopError::ParseError(format!("Invalid URL {}: {}", url, e)))
}

/// One storefront fetch for one account. The cookie jar starts from the
/// account's persisted cookies and collects whatever the auth flow refreshes.
pub(super) struct ShopClient {
    shard: String,
    puuid: Option<String>,
    client: Client,
    jar: Arc<Jar>,
    auth_url: Url,
    riot_url: Url,
}

impl ShopClient {
    pub(super) fn new(cookies: &RiotCookies, user_agent: &str) -> Result<Self, ShopError> {
        let shard = cookies
            .clid
            .as_deref()
            .map(shard_from_clid)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SHARD)
            .to_string();

        let auth_url = parse_url(RIOT_AUTH_URL)?;
        let riot_url = parse_url(RIOT_GAMES_URL)?;

        let jar = Arc::new(Jar::default());
        for name in RiotCookies::AUTH_COOKIES {
            if let Some(value) = cookies.get(name) {
                jar.add_cookie_str(&format!("{}={}", name, value), &auth_url);
            }
        }
        if let Some(tdid) = &cookies.tdid {
            jar.add_cookie_str(&format!("tdid={}", tdid), &riot_url);
        }

        let client = build_client(jar.clone(), user_agent, REQUEST_TIMEOUT)?;

        Ok(Self {
            shard,
            puuid: cookies.sub.clone(),
            client,
            jar,
            auth_url,
            riot_url,
        })
    }

    async fn authenticate(&self) -> Result<String, ShopError> {
        let auth_body = serde_json::json!({
            "client_id": "play-valorant-web-prod",
            "nonce": "1",
            "redirect_uri": "https://playvalorant.com/opt_in",
            "response_type": "token id_token",
            "scope": "account openid",
        });

        self.client
            .post(AUTH_COOKIES_URL)
            .json(&auth_body)
            .send()
            .await?;

        let resp = self
            .client
            .get(AUTH_REAUTH_URL)
            .query(AUTH_PARAMS)
            .send()
            .await?;

        let status = resp.status();
        if !matches!(
            status,
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
        ) {
            return Err(ShopError::from_status(status).unwrap_or_else(|| {
                ShopError::Unauthorized(format!("expected a redirect, got {}", status))
            }));
        }

        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        extract_access_token(location).ok_or_else(|| {
            ShopError::Unauthorized("no access token in re-auth redirect".to_string())
        })
    }

    async fn get_entitlements_token(&self, access_token: &str) -> Result<String, ShopError> {
        let data: EntitlementsResponse = self
            .client
            .post(ENTITLEMENTS_URL)
            .bearer_auth(access_token)
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(data.entitlements_token)
    }

    async fn get_puuid(&self, access_token: &str) -> Result<String, ShopError> {
        let data: UserInfoResponse = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(data.sub)
    }

    /// Tries v2, v3 and v1 in that order. Auth and rate-limit responses end
    /// the attempt immediately.
    async fn get_storefront_raw(
        &self,
        access_token: &str,
        entitlements_token: &str,
        puuid: &str,
        client_version: &str,
    ) -> Result<ApiStorefront, ShopError> {
        let base = format!("https://pd.{}.a.pvp.net/store", self.shard);
        let endpoints = [
            (false, format!("{}/v2/storefront/{}", base, puuid)),
            (true, format!("{}/v3/storefront/{}", base, puuid)),
            (false, format!("{}/v1/storefront/{}", base, puuid)),
        ];

        let mut last_error = None;
        for (post, url) in &endpoints {
            let builder = if *post {
                self.client.post(url).json(&serde_json::json!({}))
            } else {
                self.client.get(url)
            };

            let resp = builder
                .bearer_auth(access_token)
                .header("X-Riot-Entitlements-JWT", entitlements_token)
                .header("X-Riot-ClientPlatform", CLIENT_PLATFORM)
                .header("X-Riot-ClientVersion", client_version)
                .send()
                .await?;

            let status = resp.status();
            if status.is_success() {
                match resp.json::<ApiStorefront>().await {
                    Ok(data) => {
                        log::debug!("Storefront served by {}", url);
                        return Ok(data);
                    }
                    Err(e) => {
                        log::debug!("Unexpected storefront payload from {}: {}", url, e);
                        continue;
                    }
                }
            }

            match ShopError::from_status(status) {
                Some(e @ ShopError::Unavailable(_)) => last_error = Some(e),
                Some(e) => return Err(e),
                None => log::debug!("Storefront endpoint {} returned {}", url, status),
            }
        }

        Err(last_error.unwrap_or(ShopError::StorefrontFailed))
    }

    pub(super) async fn fetch(&self, client_version: &str) -> Result<Storefront, ShopError> {
        let access_token = self.authenticate().await?;
        let entitlements_token = self.get_entitlements_token(&access_token).await?;

        let puuid = match &self.puuid {
            Some(puuid) => puuid.clone(),
            None => self.get_puuid(&access_token).await?,
        };

        let raw = self
            .get_storefront_raw(&access_token, &entitlements_token, &puuid, client_version)
            .await?;

        let mut bundle_names = HashMap::new();
        for asset_id in bundle_asset_ids(&raw) {
            match fetch_bundle_name(&asset_id).await {
                Some(name) => {
                    bundle_names.insert(asset_id, name);
                }
                None => log::warn!("Could not look up bundle name for {}", asset_id),
            }
        }

        Ok(parse_storefront(raw, &bundle_names))
    }

    /// Cookies as they stand in the jar, including any the auth flow
    /// replaced through Set-Cookie.
    pub(super) fn extract_updated_cookies(&self) -> RiotCookies {
        let mut cookies = RiotCookies::default();
        self.read_jar(&self.auth_url, &RiotCookies::AUTH_COOKIES, &mut cookies);
        self.read_jar(&self.riot_url, &["tdid"], &mut cookies);
        log::debug!("Updated cookies: {:?}", cookies);
        cookies
    }

    fn read_jar(&self, url: &Url, names: &[&str], into: &mut RiotCookies) {
        let Some(header) = self.jar.cookies(url) else {
            log::debug!("No cookies in jar for {}", url);
            return;
        };
        let Ok(header) = header.to_str() else {
            return;
        };
        for pair in header.split("; ") {
            if let Some((name, value)) = pair.split_once('=') {
                if names.contains(&name) {
                    into.set(name, value);
                }
            }
        }
    }
}
