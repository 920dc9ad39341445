use std::time::Duration;

use common::utils::cache::SharedCache;

const UPLOAD_RATE_LIMIT_NAMESPACE: &str = "cache:rate_limit:upload:";
const UPLOAD_WINDOW: Duration = Duration::from_secs(60);
const UPLOAD_WINDOW_MAX: u32 = 20;

/// Fixed-window request counter backed by the shared cache, in the style of
/// the per-tenant token bucket other ingestion-adjacent services in this
/// stack keep in front of expensive endpoints. A window rather than a token
/// bucket, since `SharedCache` only exposes get/set-with-ttl, not an atomic
/// increment the bucket approach would need.
pub async fn check_upload_rate_limit(cache: &SharedCache, org_id: &str) -> bool {
    let count = cache
        .get(UPLOAD_RATE_LIMIT_NAMESPACE, org_id)
        .await
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);

    if count >= UPLOAD_WINDOW_MAX {
        return false;
    }

    cache
        .set(UPLOAD_RATE_LIMIT_NAMESPACE, org_id, &(count + 1).to_string(), UPLOAD_WINDOW)
        .await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::config::AppConfig;

    #[tokio::test]
    async fn allows_up_to_the_window_max_then_rejects() {
        let cache = SharedCache::from_config(&AppConfig::default()).await;
        for _ in 0..UPLOAD_WINDOW_MAX {
            assert!(check_upload_rate_limit(&cache, "org_1").await);
        }
        assert!(!check_upload_rate_limit(&cache, "org_1").await);
    }

    #[tokio::test]
    async fn tracks_each_org_independently() {
        let cache = SharedCache::from_config(&AppConfig::default()).await;
        for _ in 0..UPLOAD_WINDOW_MAX {
            assert!(check_upload_rate_limit(&cache, "org_1").await);
        }
        assert!(check_upload_rate_limit(&cache, "org_2").await);
    }
}
