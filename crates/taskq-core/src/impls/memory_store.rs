//! InMemoryStore - 開発・テスト用の KeyValueStore
//!
//! # 実装詳細
//! - 1 つの Mutex で全キーを守る（各操作はロック内で完結 = アトミック）
//! - TTL は注入された Clock で判定し、アクセス時に遅延削除する
//! - 文字列とソート済み集合は同じキー空間。型が違えば WrongType
//! - `set_available(false)` で障害を注入できる（StoreUnavailable の伝播確認用）

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::ports::clock::to_chrono;
use crate::ports::{Clock, KeyValueStore, StoreError, SystemClock};

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    order: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.order.remove(&(old, member.to_string()));
        }
        self.order.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn first(&self) -> Option<(String, i64)> {
        self.order
            .iter()
            .next()
            .map(|(score, member)| (member.clone(), *score))
    }

    fn len(&self) -> usize {
        self.scores.len()
    }
}

#[derive(Debug)]
enum Value {
    Str(String),
    ZSet(SortedSet),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// InMemoryStore は単一プロセス内で共有できる KeyValueStore
///
/// # 使用例
/// ```ignore
/// let store = Arc::new(InMemoryStore::new());
/// store.set("k", "v", Duration::from_secs(60)).await?;
/// ```
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate a backend outage.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store marked unavailable".into()))
        }
    }

    fn expiry(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        Some(
            self.clock
                .now()
                .checked_add_signed(to_chrono(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 期限切れなら消してから返す
fn live_entry<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: DateTime<Utc>,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        if live_entry(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: self.expiry(ttl),
            },
        );
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        // Redis の SET と同じく、既存の型に関係なく上書き
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: self.expiry(ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key, now) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn zadd(&self, set_key: &str, member: &str, score: i64) -> Result<(), StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        if live_entry(&mut entries, set_key, now).is_none() {
            entries.insert(
                set_key.to_string(),
                Entry {
                    value: Value::ZSet(SortedSet::default()),
                    expires_at: None,
                },
            );
        }
        match entries.get_mut(set_key) {
            Some(Entry {
                value: Value::ZSet(set),
                ..
            }) => {
                set.insert(member, score);
                Ok(())
            }
            _ => Err(StoreError::WrongType {
                key: set_key.to_string(),
            }),
        }
    }

    async fn zrange_first(&self, set_key: &str) -> Result<Option<(String, i64)>, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, set_key, now) {
            None => Ok(None),
            Some(Entry {
                value: Value::ZSet(set),
                ..
            }) => Ok(set.first()),
            Some(_) => Err(StoreError::WrongType {
                key: set_key.to_string(),
            }),
        }
    }

    async fn zrem(&self, set_key: &str, member: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let (removed, now_empty) = match live_entry(&mut entries, set_key, now) {
            None => return Ok(false),
            Some(Entry {
                value: Value::ZSet(set),
                ..
            }) => (set.remove(member), set.len() == 0),
            Some(_) => {
                return Err(StoreError::WrongType {
                    key: set_key.to_string(),
                });
            }
        };
        // 空になった集合はキーごと消す（Redis と同じ）
        if now_empty {
            entries.remove(set_key);
        }
        Ok(removed)
    }

    async fn zcard(&self, set_key: &str) -> Result<u64, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, set_key, now) {
            None => Ok(0),
            Some(Entry {
                value: Value::ZSet(set),
                ..
            }) => Ok(set.len() as u64),
            Some(_) => Err(StoreError::WrongType {
                key: set_key.to_string(),
            }),
        }
    }

    async fn keys_matching(&self, pattern: &str) -> Result<BTreeSet<String>, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| !e.is_expired(now));
        Ok(entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }
}

/// `*` (any run) and `?` (one char) glob matching.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = backtrack {
            pi = star_pi + 1;
            ti = star_ti + 1;
            backtrack = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}
