mod cache;
mod client;
mod error;
mod storefront;
mod types;
mod version;

pub use cache::StorefrontCache;
pub use error::ShopError;
pub use types::{Bundle, BundleItem, DailyOffer, NightMarketOffer, Storefront};

use crate::cookies::RiotCookies;
use client::ShopClient;
use version::fetch_version_info;

/// Fetch the daily shop, featured bundles and night market with an
/// account's cookies.
///
/// The shard comes from `clid` (`ap1` -> `ap`) and the PUUID from `sub`.
/// Returns the cookies as they stand after re-auth so the caller can
/// persist refreshed values.
pub async fn fetch_storefront(
    cookies: &RiotCookies,
) -> Result<(Storefront, RiotCookies), ShopError> {
    let info = fetch_version_info().await?;
    let shop_client = ShopClient::new(cookies, &info.user_agent)?;

    let storefront = shop_client.fetch(&info.client_version).await?;
    log::info!(
        "Fetched storefront: {} daily offers, {} bundles, night market {}",
        storefront.daily_offers.len(),
        storefront.bundles.as_ref().map_or(0, Vec::len),
        if storefront.night_market.is_some() {
            "open"
        } else {
            "closed"
        }
    );

    Ok((storefront, shop_client.extract_updated_cookies()))
}
