use std::collections::HashMap;

use super::types::{
    ApiBundleData, ApiStorefront, Bundle, BundleItem, DailyOffer, NightMarketOffer, Storefront,
};

fn first_cost(cost: &HashMap<String, u64>) -> u64 {
    cost.values().next().copied().unwrap_or(0)
}

/// Pull `access_token` out of the re-auth redirect's fragment.
pub(super) fn extract_access_token(location: &str) -> Option<String> {
    let prefix = "access_token=";
    let start = location.find(prefix)?;
    let after = &location[start + prefix.len()..];
    let end = after.find('&').unwrap_or(after.len());
    let token = &after[..end];
    (!token.is_empty()).then(|| token.to_string())
}

/// Every featured bundle's `DataAssetID`, for the display name lookup.
pub(super) fn bundle_asset_ids(raw: &ApiStorefront) -> Vec<String> {
    raw.featured_bundle
        .as_ref()
        .map(|fb| fb.bundles.iter().map(|b| b.data_asset_id.clone()).collect())
        .unwrap_or_default()
}

fn parse_bundle(bundle: ApiBundleData, names: &HashMap<String, String>) -> Bundle {
    let name = names
        .get(&bundle.data_asset_id)
        .cloned()
        .unwrap_or_else(|| bundle.data_asset_id.clone());

    // Upstream percentages are fractions.
    let items = bundle
        .items
        .into_iter()
        .map(|item| BundleItem {
            item_uuid: item.item.item_id,
            item_type_id: item.item.item_type_id,
            base_cost: item.base_price,
            discounted_cost: item.discounted_price,
            discount_percent: item.discount_percent * 100.0,
        })
        .collect();

    Bundle {
        name,
        total_base_cost: bundle.total_base_cost.as_ref().map(first_cost).unwrap_or(0),
        total_discounted_cost: bundle
            .total_discounted_cost
            .as_ref()
            .map(first_cost)
            .unwrap_or(0),
        total_discount_percent: bundle.total_discount_percent * 100.0,
        bundle_remaining_secs: bundle.duration_remaining_secs,
        items,
    }
}

/// Convert the upstream response. Bundles without a looked-up name are
/// named by their `DataAssetID`.
pub(super) fn parse_storefront(
    raw: ApiStorefront,
    bundle_names: &HashMap<String, String>,
) -> Storefront {
    let cost_map: HashMap<String, u64> = raw
        .skins_panel_layout
        .single_item_store_offers
        .unwrap_or_default()
        .into_iter()
        .map(|offer| {
            let vp = first_cost(&offer.cost);
            (offer.offer_id, vp)
        })
        .collect();

    let daily_offers = raw
        .skins_panel_layout
        .single_item_offers
        .into_iter()
        .map(|uuid| DailyOffer {
            vp_cost: cost_map.get(&uuid).copied().unwrap_or(0),
            skin_uuid: uuid,
        })
        .collect();

    let night_market_remaining_secs = raw
        .bonus_store
        .as_ref()
        .and_then(|bs| bs.remaining_duration_secs);

    let night_market = raw.bonus_store.map(|bs| {
        bs.bonus_store_offers
            .into_iter()
            .map(|o| NightMarketOffer {
                skin_uuid: o.offer.offer_id,
                base_cost: first_cost(&o.offer.cost),
                discount_cost: first_cost(&o.discount_costs),
                discount_percent: o.discount_percent,
            })
            .collect()
    });

    let bundles = raw.featured_bundle.map(|fb| {
        fb.bundles
            .into_iter()
            .map(|bundle| parse_bundle(bundle, bundle_names))
            .collect()
    });

    Storefront {
        daily_offers,
        daily_remaining_secs: raw.skins_panel_layout.remaining_duration_secs,
        bundles,
        night_market,
        night_market_remaining_secs,
    }
}
