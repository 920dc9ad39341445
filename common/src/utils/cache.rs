use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use redis::AsyncCommands;
use tracing::warn;

use crate::utils::config::AppConfig;

/// Shared cache for C9/C10's namespaced caches (retrieval context, tool
/// results, message-history summaries). Best-effort, never authoritative:
/// every miss or backend error is treated the same as an absent key, never
/// surfaced as an `AppError`.
///
/// Backed by Redis when `CACHE_URL` is configured; otherwise (or on any
/// connection failure) falls back to an in-process map for the life of the
/// instance, per §5's "degradation path falls back to in-memory Map".
pub struct SharedCache {
    redis: Option<redis::aio::ConnectionManager>,
    local: Mutex<HashMap<String, (String, Instant)>>,
}

impl SharedCache {
    pub async fn from_config(cfg: &AppConfig) -> Self {
        let redis = match &cfg.cache_url {
            Some(url) => match redis::Client::open(url.as_str()) {
                Ok(client) => match client.get_connection_manager().await {
                    Ok(manager) => Some(manager),
                    Err(err) => {
                        warn!("shared cache unreachable, falling back to in-memory: {err}");
                        None
                    }
                },
                Err(err) => {
                    warn!("invalid CACHE_URL, falling back to in-memory: {err}");
                    None
                }
            },
            None => None,
        };

        Self {
            redis,
            local: Mutex::new(HashMap::new()),
        }
    }

    fn namespaced(namespace: &str, key: &str) -> String {
        format!("{namespace}{key}")
    }

    pub async fn get(&self, namespace: &str, key: &str) -> Option<String> {
        let full_key = Self::namespaced(namespace, key);

        if let Some(manager) = &self.redis {
            let mut manager = manager.clone();
            match manager.get::<_, Option<String>>(&full_key).await {
                Ok(value) => return value,
                Err(err) => warn!("shared cache get failed, falling back to in-memory: {err}"),
            }
        }

        let mut local = self.local.lock().unwrap_or_else(|e| e.into_inner());
        match local.get(&full_key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            Some(_) => {
                local.remove(&full_key);
                None
            }
            None => None,
        }
    }

    pub async fn set(&self, namespace: &str, key: &str, value: &str, ttl: Duration) {
        let full_key = Self::namespaced(namespace, key);

        if let Some(manager) = &self.redis {
            let mut manager = manager.clone();
            let ttl_secs = ttl.as_secs().max(1);
            if let Err(err) = manager
                .set_ex::<_, _, ()>(&full_key, value, ttl_secs)
                .await
            {
                warn!("shared cache set failed, falling back to in-memory: {err}");
            } else {
                return;
            }
        }

        let mut local = self.local.lock().unwrap_or_else(|e| e.into_inner());
        local.insert(full_key, (value.to_string(), Instant::now() + ttl));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trip() {
        let cache = SharedCache {
            redis: None,
            local: Mutex::new(HashMap::new()),
        };

        assert_eq!(cache.get("cache:retrieval:", "abc").await, None);

        cache
            .set("cache:retrieval:", "abc", "assembled context", Duration::from_secs(300))
            .await;
        assert_eq!(
            cache.get("cache:retrieval:", "abc").await,
            Some("assembled context".to_string())
        );
    }

    #[tokio::test]
    async fn in_memory_entries_expire() {
        let cache = SharedCache {
            redis: None,
            local: Mutex::new(HashMap::new()),
        };

        cache
            .set("cache:tool:", "call-1", "summary", Duration::from_millis(1))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("cache:tool:", "call-1").await, None);
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let cache = SharedCache {
            redis: None,
            local: Mutex::new(HashMap::new()),
        };

        cache
            .set("cache:retrieval:", "same-key", "retrieval value", Duration::from_secs(60))
            .await;
        cache
            .set("cache:summary:", "same-key", "summary value", Duration::from_secs(60))
            .await;

        assert_eq!(
            cache.get("cache:retrieval:", "same-key").await,
            Some("retrieval value".to_string())
        );
        assert_eq!(
            cache.get("cache:summary:", "same-key").await,
            Some("summary value".to_string())
        );
    }
}
