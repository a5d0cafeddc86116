use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use parley_shared::ChatMessage;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Process-wide conversation history, keyed by the caller's opaque
/// conversation id. Entries only grow: turns are appended in chronological
/// order and never evicted or truncated.
///
/// The lock map is kept separate from the data map so that taking a
/// conversation's guard (which happens before the provider call) does not
/// create a history entry; an entry exists only after a successful append.
#[derive(Default)]
pub struct HistoryStore {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    data: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize the read-then-append span for one conversation.
    ///
    /// The guard must be held from the history read through the provider call
    /// to the append, otherwise two concurrent requests on the same id would
    /// both read the old history and one would lose its turns. Guards for
    /// different ids are independent.
    pub async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let gate = {
            let mut locks = self.locks.lock().unwrap();
            locks.entry(id.to_string()).or_default().clone()
        };
        gate.lock_owned().await
    }

    /// Stored turns for `id`, oldest first. Empty for an unknown id.
    pub fn get(&self, id: &str) -> Vec<ChatMessage> {
        self.data
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Like [`get`](Self::get), but distinguishes "never recorded" from
    /// empty. Drives the 404 on the history endpoint.
    pub fn snapshot(&self, id: &str) -> Option<Vec<ChatMessage>> {
        self.data.read().unwrap().get(id).cloned()
    }

    /// True when no conversation has ever been recorded.
    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    /// Append `turns` to `id`, creating the entry if absent. Order within
    /// `turns` and relative to previously stored turns is preserved.
    pub fn append(&self, id: &str, turns: Vec<ChatMessage>) {
        self.data
            .write()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .extend(turns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn unknown_id_reads_empty() {
        let store = HistoryStore::new();
        assert!(store.get("missing").is_empty());
        assert!(store.snapshot("missing").is_none());
    }

    #[test]
    fn append_then_get_round_trips_in_order() {
        let store = HistoryStore::new();
        store.append(
            "c1",
            vec![ChatMessage::user("hello"), ChatMessage::assistant("hi")],
        );
        store.append(
            "c1",
            vec![ChatMessage::user("again"), ChatMessage::assistant("yes")],
        );

        let turns = store.get("c1");
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].content, "hello");
        assert_eq!(turns[1].content, "hi");
        assert_eq!(turns[2].content, "again");
        assert_eq!(turns[3].content, "yes");
    }

    #[test]
    fn conversations_are_isolated() {
        let store = HistoryStore::new();
        store.append("a", vec![ChatMessage::user("for a")]);
        store.append("b", vec![ChatMessage::user("for b")]);
        assert_eq!(store.get("a").len(), 1);
        assert_eq!(store.get("b").len(), 1);
        assert_eq!(store.get("a")[0].content, "for a");
    }

    #[tokio::test]
    async fn concurrent_read_modify_append_loses_nothing() {
        let store = Arc::new(HistoryStore::new());

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = store.lock("shared").await;
                let seen = store.get("shared").len();
                tokio::time::sleep(Duration::from_millis(5)).await;
                store.append(
                    "shared",
                    vec![
                        ChatMessage::user(format!("q{i} after {seen}")),
                        ChatMessage::assistant(format!("a{i}")),
                    ],
                );
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.get("shared").len(), 16);
    }

    #[tokio::test]
    async fn distinct_ids_do_not_block_each_other() {
        let store = Arc::new(HistoryStore::new());
        let _held = store.lock("busy").await;

        let other = tokio::time::timeout(Duration::from_millis(100), store.lock("idle")).await;
        assert!(other.is_ok(), "lock on a different id should not wait");
    }

    #[tokio::test]
    async fn taking_a_lock_does_not_create_an_entry() {
        let store = HistoryStore::new();
        let _guard = store.lock("fresh").await;
        assert!(store.snapshot("fresh").is_none());
    }
}
