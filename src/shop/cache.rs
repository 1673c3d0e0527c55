use rusqlite::{params, OptionalExtension};

use super::error::ShopError;
use super::types::{Bundle, DailyOffer, NightMarketOffer, Storefront};
use crate::db::Database;
use crate::error::Result;

fn current_unix_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn remaining(expires_at: i64, now: i64) -> u64 {
    u64::try_from(expires_at - now).unwrap_or(0)
}

struct CacheRow {
    daily_offers_json: String,
    night_market_json: Option<String>,
    bundles_json: Option<String>,
    expires_at: i64,
    nm_expires_at: Option<i64>,
    cached_at: i64,
}

/// Per-account storefront cache. Entries are served only until the daily
/// rotation; the night market and each bundle carry their own deadlines.
#[derive(Debug, Clone)]
pub struct StorefrontCache {
    db: Database,
}

impl StorefrontCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn load(&self, account_id: i64) -> Result<Option<Storefront>> {
        self.load_at(account_id, current_unix_secs())
    }

    pub(crate) fn load_at(&self, account_id: i64, now: i64) -> Result<Option<Storefront>> {
        let conn = self.db.connection()?;
        let row = conn
            .query_row(
                "SELECT daily_offers_json, night_market_json, bundles_json,
                        expires_at, nm_expires_at, cached_at
                   FROM storefront_cache
                  WHERE account_id = ?1",
                [account_id],
                |row| {
                    Ok(CacheRow {
                        daily_offers_json: row.get(0)?,
                        night_market_json: row.get(1)?,
                        bundles_json: row.get(2)?,
                        expires_at: row.get(3)?,
                        nm_expires_at: row.get(4)?,
                        cached_at: row.get(5)?,
                    })
                },
            )
            .optional()?;

        let Some(row) = row else {
            log::debug!("Cache: miss (no entry) for account {}", account_id);
            return Ok(None);
        };

        if row.expires_at <= now {
            log::debug!("Cache: miss (expired) for account {}", account_id);
            return Ok(None);
        }

        match decode(row, now) {
            Ok(storefront) => {
                log::info!(
                    "Cache: hit for account {} ({} secs remaining)",
                    account_id,
                    storefront.daily_remaining_secs
                );
                Ok(Some(storefront))
            }
            Err(e) => {
                log::warn!("Cache: unreadable entry for account {}: {}", account_id, e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, account_id: i64, storefront: &Storefront) -> Result<()> {
        self.save_at(account_id, storefront, current_unix_secs())
    }

    /// Replace the account's entry. Absent sections are stored as NULL.
    pub(crate) fn save_at(&self, account_id: i64, storefront: &Storefront, now: i64) -> Result<()> {
        let daily_json = encode(&storefront.daily_offers)?;
        let night_json = storefront.night_market.as_ref().map(encode).transpose()?;
        let bundles_json = storefront.bundles.as_ref().map(encode).transpose()?;

        let expires_at = now + storefront.daily_remaining_secs as i64;
        let nm_expires_at = storefront
            .night_market_remaining_secs
            .map(|secs| now + secs as i64);

        let mut conn = self.db.connection()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM storefront_cache WHERE account_id = ?1",
            [account_id],
        )?;
        tx.execute(
            "INSERT INTO storefront_cache
                 (account_id, daily_offers_json, night_market_json, bundles_json,
                  expires_at, nm_expires_at, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                account_id,
                daily_json,
                night_json,
                bundles_json,
                expires_at,
                nm_expires_at,
                now
            ],
        )?;
        tx.commit()?;

        log::info!(
            "Cache: saved for account {} (expires_at={})",
            account_id,
            expires_at
        );
        Ok(())
    }
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> std::result::Result<String, ShopError> {
    serde_json::to_string(value)
        .map_err(|e| ShopError::ParseError(format!("failed to encode cache entry: {}", e)))
}

fn decode(row: CacheRow, now: i64) -> serde_json::Result<Storefront> {
    let daily_offers: Vec<DailyOffer> = serde_json::from_str(&row.daily_offers_json)?;

    // The night market is only shown while its own deadline holds.
    let (night_market, night_market_remaining_secs) = match (row.night_market_json, row.nm_expires_at) {
        (Some(json), Some(nm_expires_at)) if nm_expires_at > now => {
            let offers: Vec<NightMarketOffer> = serde_json::from_str(&json)?;
            (Some(offers), Some(remaining(nm_expires_at, now)))
        }
        _ => (None, None),
    };

    let elapsed = now - row.cached_at;
    let bundles = row
        .bundles_json
        .map(|json| serde_json::from_str::<Vec<Bundle>>(&json))
        .transpose()?
        .map(|bundles| {
            bundles
                .into_iter()
                .filter_map(|mut bundle| {
                    let left = bundle.bundle_remaining_secs as i64 - elapsed;
                    (left > 0).then(|| {
                        bundle.bundle_remaining_secs = left as u64;
                        bundle
                    })
                })
                .collect()
        });

    Ok(Storefront {
        daily_offers,
        daily_remaining_secs: remaining(row.expires_at, now),
        bundles,
        night_market,
        night_market_remaining_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_test_store, NewAccount};
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000;

    fn bundle(name: &str, remaining_secs: u64) -> Bundle {
        Bundle {
            name: name.to_string(),
            total_base_cost: 5000,
            total_discounted_cost: 4000,
            total_discount_percent: 20.0,
            bundle_remaining_secs: remaining_secs,
            items: vec![],
        }
    }

    fn storefront() -> Storefront {
        Storefront {
            daily_offers: vec![DailyOffer {
                skin_uuid: "skin-a".to_string(),
                vp_cost: 1775,
            }],
            daily_remaining_secs: 3600,
            bundles: Some(vec![bundle("short", 600), bundle("long", 86400)]),
            night_market: Some(vec![NightMarketOffer {
                skin_uuid: "nm-skin".to_string(),
                base_cost: 2175,
                discount_cost: 1305,
                discount_percent: 40.0,
            }]),
            night_market_remaining_secs: Some(7200),
        }
    }

    fn setup() -> (TempDir, StorefrontCache, i64, crate::db::AccountStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());
        let account = store
            .create_account(&NewAccount {
                riot_id: "Player".to_string(),
                tagline: "JP1".to_string(),
                ..NewAccount::default()
            })
            .unwrap();
        let cache = StorefrontCache::new(store.database().clone());
        (temp_dir, cache, account.id, store)
    }

    #[test]
    fn test_miss_without_entry() {
        let (_dir, cache, id, _store) = setup();
        assert!(cache.load_at(id, NOW).unwrap().is_none());
    }

    #[test]
    fn test_hit_recomputes_remaining() {
        let (_dir, cache, id, _store) = setup();
        cache.save_at(id, &storefront(), NOW).unwrap();

        let hit = cache.load_at(id, NOW + 1000).unwrap().unwrap();
        assert_eq!(hit.daily_remaining_secs, 2600);
        assert_eq!(hit.night_market_remaining_secs, Some(6200));
        assert_eq!(hit.daily_offers, storefront().daily_offers);

        let bundles = hit.bundles.unwrap();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].name, "long");
        assert_eq!(bundles[0].bundle_remaining_secs, 85400);
    }

    #[test]
    fn test_daily_expiry_is_miss_even_with_night_market() {
        let (_dir, cache, id, _store) = setup();
        cache.save_at(id, &storefront(), NOW).unwrap();

        assert!(cache.load_at(id, NOW + 3600).unwrap().is_none());
        assert!(cache.load_at(id, NOW + 5000).unwrap().is_none());
    }

    #[test]
    fn test_night_market_expires_independently() {
        let (_dir, cache, id, _store) = setup();
        let sf = Storefront {
            daily_remaining_secs: 86400,
            ..storefront()
        };
        cache.save_at(id, &sf, NOW).unwrap();

        let hit = cache.load_at(id, NOW + 7200).unwrap().unwrap();
        assert!(hit.night_market.is_none());
        assert!(hit.night_market_remaining_secs.is_none());
        assert_eq!(hit.daily_remaining_secs, 86400 - 7200);
    }

    #[test]
    fn test_save_replaces_whole_entry() {
        let (_dir, cache, id, _store) = setup();
        cache.save_at(id, &storefront(), NOW).unwrap();

        let bare = Storefront {
            daily_offers: vec![],
            daily_remaining_secs: 100,
            bundles: None,
            night_market: None,
            night_market_remaining_secs: None,
        };
        cache.save_at(id, &bare, NOW).unwrap();

        let hit = cache.load_at(id, NOW).unwrap().unwrap();
        assert_eq!(hit, bare);
    }

    #[test]
    fn test_unreadable_entry_is_miss() {
        let (_dir, cache, id, store) = setup();
        cache.save_at(id, &storefront(), NOW).unwrap();
        store
            .database()
            .connection()
            .unwrap()
            .execute(
                "UPDATE storefront_cache SET daily_offers_json = 'garbage' WHERE account_id = ?1",
                [id],
            )
            .unwrap();

        assert!(cache.load_at(id, NOW).unwrap().is_none());
    }

    #[test]
    fn test_entry_removed_with_account() {
        let (_dir, cache, id, store) = setup();
        cache.save_at(id, &storefront(), NOW).unwrap();
        store.delete_account(id).unwrap();

        let count: i64 = store
            .database()
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM storefront_cache", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
