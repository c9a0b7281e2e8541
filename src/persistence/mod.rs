use crate::execution::digit_buffer::DIGIT_CAPACITY;
use crate::execution::DigitStore;
use crate::models::{Digit, DIGIT_COUNT};
use crate::Result;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

const SELECTED_KEY: &str = "selected_symbol";

fn digits_key(symbol: &str) -> String {
    format!("digits:{}", symbol)
}

/// Pack the newest `DIGIT_CAPACITY` digits as a string of ASCII digits
pub fn encode_digits(digits: &[Digit]) -> String {
    let start = digits.len().saturating_sub(DIGIT_CAPACITY);
    digits[start..]
        .iter()
        .filter(|&&d| (d as usize) < DIGIT_COUNT)
        .map(|&d| char::from(b'0' + d))
        .collect()
}

/// Inverse of `encode_digits`; anything that is not `0-9` is skipped
pub fn decode_digits(packed: &str) -> Vec<Digit> {
    packed
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| b - b'0')
        .collect()
}

/// Best-effort Redis cache of digit queues and the last selected symbol
///
/// Each symbol's queue is stored under `digits:{symbol}` so a restart can
/// analyse markets before the venue backfill arrives.
pub struct DigitCache {
    conn: ConnectionManager,
}

impl DigitCache {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    pub async fn save_digits(&mut self, symbol: &str, digits: &[Digit]) -> Result<()> {
        let packed = encode_digits(digits);
        self.conn
            .set::<_, _, ()>(digits_key(symbol), &packed)
            .await?;
        tracing::trace!(symbol, digits = packed.len(), "Digits cached");
        Ok(())
    }

    pub async fn load_digits(&mut self, symbol: &str) -> Result<Vec<Digit>> {
        let packed: Option<String> = self.conn.get(digits_key(symbol)).await?;
        Ok(packed.map(|p| decode_digits(&p)).unwrap_or_default())
    }

    pub async fn clear_digits(&mut self, symbol: &str) -> Result<()> {
        self.conn.del::<_, ()>(digits_key(symbol)).await?;
        Ok(())
    }

    /// Write every symbol in the store; returns how many were saved
    pub async fn flush(&mut self, store: &DigitStore) -> Result<usize> {
        let mut saved = 0;
        for symbol in store.symbols() {
            let digits = store.snapshot(&symbol);
            if digits.is_empty() {
                continue;
            }
            self.save_digits(&symbol, &digits).await?;
            saved += 1;
        }
        tracing::debug!(symbols = saved, "Flushed digit cache");
        Ok(saved)
    }

    /// Seed the store from cache; symbols already holding digits are left alone
    pub async fn rehydrate(&mut self, store: &DigitStore, symbols: &[String]) -> Result<usize> {
        let mut restored = 0;
        for symbol in symbols {
            if store.total(symbol) > 0 {
                continue;
            }
            let digits = self.load_digits(symbol).await?;
            if digits.is_empty() {
                continue;
            }
            let kept = store.reset(symbol, digits);
            tracing::info!(symbol = %symbol, digits = kept, "♻️  Restored cached digits");
            restored += 1;
        }
        Ok(restored)
    }

    pub async fn save_selected(&mut self, symbol: &str) -> Result<()> {
        self.conn.set::<_, _, ()>(SELECTED_KEY, symbol).await?;
        Ok(())
    }

    pub async fn load_selected(&mut self) -> Result<Option<String>> {
        let selected: Option<String> = self.conn.get(SELECTED_KEY).await?;
        Ok(selected.filter(|s| !s.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_URL: &str = "redis://127.0.0.1:6379";

    #[test]
    fn test_encode_keeps_newest_capacity() {
        let digits: Vec<Digit> = (0..1205).map(|i| (i % 10) as Digit).collect();
        let packed = encode_digits(&digits);
        assert_eq!(packed.len(), DIGIT_CAPACITY);
        // oldest kept digit is index 205
        assert!(packed.starts_with("56789"));
        assert_eq!(decode_digits(&packed), digits[205..].to_vec());
    }

    #[test]
    fn test_decode_skips_garbage() {
        assert_eq!(decode_digits("1a2 3\n"), vec![1, 2, 3]);
        assert!(decode_digits("").is_empty());
        assert_eq!(encode_digits(&[4, 12, 7]), "47");
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_connection_timeout() {
        let result = DigitCache::new("redis://192.0.2.1:6379").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_save_and_load_digits() {
        let mut cache = DigitCache::new(TEST_URL)
            .await
            .expect("Failed to connect to Redis");
        let _ = cache.clear_digits("TEST_DIGITS").await;

        cache.save_digits("TEST_DIGITS", &[3, 1, 4, 1, 5]).await.unwrap();
        let loaded = cache.load_digits("TEST_DIGITS").await.unwrap();
        assert_eq!(loaded, vec![3, 1, 4, 1, 5]);

        let _ = cache.clear_digits("TEST_DIGITS").await;
        assert!(cache.load_digits("TEST_DIGITS").await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_flush_and_rehydrate() {
        let mut cache = DigitCache::new(TEST_URL)
            .await
            .expect("Failed to connect to Redis");

        let store = DigitStore::default();
        store.reset("TEST_FLUSH", vec![9, 8, 7]);
        assert_eq!(cache.flush(&store).await.unwrap(), 1);

        let fresh = DigitStore::default();
        let restored = cache
            .rehydrate(&fresh, &["TEST_FLUSH".to_string(), "TEST_NONE".to_string()])
            .await
            .unwrap();
        assert_eq!(restored, 1);
        assert_eq!(fresh.snapshot("TEST_FLUSH"), vec![9, 8, 7]);

        let _ = cache.clear_digits("TEST_FLUSH").await;
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_selected_symbol_roundtrip() {
        let mut cache = DigitCache::new(TEST_URL)
            .await
            .expect("Failed to connect to Redis");

        cache.save_selected("R_75").await.unwrap();
        assert_eq!(cache.load_selected().await.unwrap(), Some("R_75".to_string()));
    }
}
