use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// -- Shop model ---------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyOffer {
    pub skin_uuid: String,
    pub vp_cost: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NightMarketOffer {
    pub skin_uuid: String,
    pub base_cost: u64,
    pub discount_cost: u64,
    pub discount_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleItem {
    pub item_uuid: String,
    /// Riot's item type UUID. Skins, buddies and sprays all appear here.
    pub item_type_id: String,
    pub base_cost: u64,
    pub discounted_cost: u64,
    pub discount_percent: f64,
}

/// Costs are in VP and `*_percent` fields run from 0 to 100.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bundle {
    pub name: String,
    pub total_base_cost: u64,
    pub total_discounted_cost: u64,
    pub total_discount_percent: f64,
    pub bundle_remaining_secs: u64,
    pub items: Vec<BundleItem>,
}

/// One account's shop as returned to the UI and stored in the cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Storefront {
    pub daily_offers: Vec<DailyOffer>,
    pub daily_remaining_secs: u64,
    pub bundles: Option<Vec<Bundle>>,
    pub night_market: Option<Vec<NightMarketOffer>>,
    pub night_market_remaining_secs: Option<u64>,
}

// -- Upstream payloads (pd.<shard>.a.pvp.net) --------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiStorefront {
    pub(super) skins_panel_layout: ApiSkinsPanel,
    pub(super) bonus_store: Option<ApiBonusStore>,
    pub(super) featured_bundle: Option<ApiFeaturedBundle>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiFeaturedBundle {
    pub(super) bundles: Vec<ApiBundleData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiBundleData {
    #[serde(rename = "DataAssetID")]
    pub(super) data_asset_id: String,
    pub(super) items: Vec<ApiBundleItem>,
    pub(super) total_base_cost: Option<HashMap<String, u64>>,
    pub(super) total_discounted_cost: Option<HashMap<String, u64>>,
    pub(super) total_discount_percent: f64,
    #[serde(rename = "DurationRemainingInSeconds")]
    pub(super) duration_remaining_secs: u64,
}

// Upstream discounts are fractions, converted to percent on parse.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiBundleItem {
    pub(super) item: ApiItemRef,
    pub(super) base_price: u64,
    pub(super) discount_percent: f64,
    pub(super) discounted_price: u64,
}

#[derive(Deserialize)]
pub(super) struct ApiItemRef {
    #[serde(rename = "ItemTypeID")]
    pub(super) item_type_id: String,
    #[serde(rename = "ItemID")]
    pub(super) item_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiSkinsPanel {
    pub(super) single_item_offers: Vec<String>,
    #[serde(rename = "SingleItemOffersRemainingDurationInSeconds")]
    pub(super) remaining_duration_secs: u64,
    /// Older storefront versions omit prices.
    pub(super) single_item_store_offers: Option<Vec<ApiOffer>>,
}

/// Offer id with its price per currency.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiOffer {
    #[serde(rename = "OfferID")]
    pub(super) offer_id: String,
    pub(super) cost: HashMap<String, u64>,
}

/// The night market.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiBonusStore {
    pub(super) bonus_store_offers: Vec<ApiBonusOffer>,
    #[serde(rename = "BonusStoreRemainingDurationInSeconds")]
    pub(super) remaining_duration_secs: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiBonusOffer {
    pub(super) offer: ApiOffer,
    pub(super) discount_percent: f64,
    pub(super) discount_costs: HashMap<String, u64>,
}

#[derive(Deserialize)]
pub(super) struct EntitlementsResponse {
    pub(super) entitlements_token: String,
}

#[derive(Deserialize)]
pub(super) struct UserInfoResponse {
    pub(super) sub: String,
}
