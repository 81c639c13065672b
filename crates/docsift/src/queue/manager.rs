//! Queue manager
//!
//! Owns the ordered list of [`QueueItem`]s. Items are kept in run order:
//! higher priority first, ties by insertion order. The manager is passive; the
//! orchestrator pulls from it and reports status changes back.

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

use crate::types::{FileKind, ItemError, ItemStatus, QueueItem, QueueStats};

const EVENT_CAPACITY: usize = 1024;

/// Change notifications
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    ItemAdded { item: QueueItem },
    ItemUpdated { item: QueueItem },
    ItemRemoved { path: PathBuf },
    Cleared { removed: usize },
    Reordered { path: PathBuf, index: usize },
}

/// Priority work queue
pub struct QueueManager {
    items: Mutex<Vec<QueueItem>>,
    events: broadcast::Sender<QueueEvent>,
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Index where an item of `priority` goes: after every item of equal or higher priority
fn insertion_index(items: &[QueueItem], priority: i32) -> usize {
    items
        .iter()
        .position(|i| i.priority < priority)
        .unwrap_or(items.len())
}

fn position(items: &[QueueItem], path: &Path) -> Option<usize> {
    items.iter().position(|i| i.path == path)
}

impl QueueManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            items: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Subscribe to queue changes
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: QueueEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Enqueue a path. Returns false for duplicates and unsupported kinds.
    pub fn add(&self, path: impl Into<PathBuf>, priority: i32) -> bool {
        let path = path.into();
        let Some(kind) = FileKind::from_path(&path) else {
            tracing::debug!("Not queueing unsupported file {}", path.display());
            return false;
        };

        let item = {
            let mut items = self.items.lock();
            if position(&items, &path).is_some() {
                return false;
            }
            let item = QueueItem::new(path, kind, priority);
            let index = insertion_index(&items, priority);
            items.insert(index, item.clone());
            item
        };

        self.emit(QueueEvent::ItemAdded { item });
        true
    }

    /// Enqueue many paths; returns how many were added
    pub fn add_batch<I, P>(&self, paths: I, priority: i32) -> usize
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        paths
            .into_iter()
            .map(|p| self.add(p, priority))
            .filter(|added| *added)
            .count()
    }

    pub fn remove(&self, path: &Path) -> bool {
        let removed = {
            let mut items = self.items.lock();
            match position(&items, path) {
                Some(index) => {
                    items.remove(index);
                    true
                }
                None => false,
            }
        };

        if removed {
            self.emit(QueueEvent::ItemRemoved {
                path: path.to_path_buf(),
            });
        }
        removed
    }

    pub fn remove_batch<P: AsRef<Path>>(&self, paths: &[P]) -> usize {
        paths.iter().filter(|p| self.remove(p.as_ref())).count()
    }

    /// Remove every item, or only those with `status`
    pub fn clear(&self, status: Option<ItemStatus>) -> usize {
        let removed = {
            let mut items = self.items.lock();
            let before = items.len();
            match status {
                Some(status) => items.retain(|i| i.status != status),
                None => items.clear(),
            }
            before - items.len()
        };

        if removed > 0 {
            self.emit(QueueEvent::Cleared { removed });
        }
        removed
    }

    /// Move an item to `new_index`, clamped to the list bounds
    pub fn reorder(&self, path: &Path, new_index: usize) -> bool {
        let index = {
            let mut items = self.items.lock();
            let Some(old) = position(&items, path) else {
                return false;
            };
            let item = items.remove(old);
            let index = new_index.min(items.len());
            items.insert(index, item);
            if index == old {
                return true;
            }
            index
        };

        self.emit(QueueEvent::Reordered {
            path: path.to_path_buf(),
            index,
        });
        true
    }

    pub fn move_up(&self, path: &Path) -> bool {
        let index = {
            let items = self.items.lock();
            match position(&items, path) {
                Some(index) => index,
                None => return false,
            }
        };
        self.reorder(path, index.saturating_sub(1))
    }

    pub fn move_down(&self, path: &Path) -> bool {
        let index = {
            let items = self.items.lock();
            match position(&items, path) {
                Some(index) => index,
                None => return false,
            }
        };
        self.reorder(path, index + 1)
    }

    /// First Pending item in run order, without claiming it
    pub fn next_pending(&self) -> Option<QueueItem> {
        self.items
            .lock()
            .iter()
            .find(|i| i.status == ItemStatus::Pending)
            .cloned()
    }

    /// Take the next Pending item and mark it Active in one step
    pub fn claim_next(&self) -> Option<QueueItem> {
        let item = {
            let mut items = self.items.lock();
            let item = items.iter_mut().find(|i| i.status == ItemStatus::Pending)?;
            item.status = ItemStatus::Active;
            item.started_at = Some(Utc::now());
            item.completed_at = None;
            item.clone()
        };

        self.emit(QueueEvent::ItemUpdated { item: item.clone() });
        Some(item)
    }

    /// Apply a status transition. Returns false for unknown paths and
    /// illegal transitions; setting the current status again is a no-op.
    pub fn set_status(&self, path: &Path, status: ItemStatus, error: Option<ItemError>) -> bool {
        let item = {
            let mut items = self.items.lock();
            let Some(item) = items.iter_mut().find(|i| i.path == path) else {
                return false;
            };

            if item.status == status {
                return true;
            }
            if !item.status.can_transition_to(status) {
                tracing::warn!(
                    "Rejected status change {} -> {} for {}",
                    item.status.as_str(),
                    status.as_str(),
                    path.display()
                );
                return false;
            }

            let now = Utc::now();
            match status {
                ItemStatus::Pending => {
                    item.started_at = None;
                    item.completed_at = None;
                    item.last_error = None;
                }
                ItemStatus::Active => {
                    item.started_at = Some(now);
                    item.completed_at = None;
                }
                ItemStatus::Failed => {
                    item.completed_at = Some(now);
                    item.last_error = error;
                }
                ItemStatus::Completed | ItemStatus::Skipped => {
                    item.completed_at = Some(now);
                }
            }
            item.status = status;
            item.clone()
        };

        self.emit(QueueEvent::ItemUpdated { item });
        true
    }

    /// Move every Failed item back to Pending
    pub fn reset_failed(&self) -> usize {
        let reset: Vec<QueueItem> = {
            let mut items = self.items.lock();
            items
                .iter_mut()
                .filter(|i| i.status == ItemStatus::Failed)
                .map(|item| {
                    item.status = ItemStatus::Pending;
                    item.started_at = None;
                    item.completed_at = None;
                    item.last_error = None;
                    item.clone()
                })
                .collect()
        };

        let count = reset.len();
        for item in reset {
            self.emit(QueueEvent::ItemUpdated { item });
        }
        count
    }

    /// Change priority of several items and re-position them by the insertion rule
    pub fn set_batch_priority<P: AsRef<Path>>(&self, paths: &[P], priority: i32) -> usize {
        let updated: Vec<QueueItem> = {
            let mut items = self.items.lock();
            let mut indices: Vec<usize> = paths
                .iter()
                .filter_map(|path| position(&items, path.as_ref()))
                .collect();
            indices.sort_unstable();
            indices.dedup();

            // Pull out back to front, then re-insert in queue order so ties keep arrival order
            let mut moved: Vec<QueueItem> = indices.iter().rev().map(|&i| items.remove(i)).collect();
            moved.reverse();

            let mut updated = Vec::with_capacity(moved.len());
            for mut item in moved {
                item.priority = priority;
                let index = insertion_index(&items, priority);
                items.insert(index, item.clone());
                updated.push(item);
            }
            updated
        };

        let count = updated.len();
        for item in updated {
            self.emit(QueueEvent::ItemUpdated { item });
        }
        count
    }

    pub fn statistics(&self) -> QueueStats {
        let items = self.items.lock();
        let mut stats = QueueStats::default();
        for item in items.iter() {
            stats.count(item.status);
        }
        stats
    }

    /// Snapshot in run order
    pub fn items(&self) -> Vec<QueueItem> {
        self.items.lock().clone()
    }

    pub fn get(&self, path: &Path) -> Option<QueueItem> {
        self.items.lock().iter().find(|i| i.path == path).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn paths(queue: &QueueManager) -> Vec<String> {
        queue
            .items()
            .iter()
            .map(|i| i.path.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_priority_insertion_is_stable() {
        let queue = QueueManager::new();
        assert!(queue.add("a.pdf", 0));
        assert!(queue.add("b.pdf", 10));
        assert!(queue.add("c.pdf", 0));
        assert!(queue.add("d.pdf", 10));
        assert_eq!(paths(&queue), vec!["b.pdf", "d.pdf", "a.pdf", "c.pdf"]);
    }

    #[test]
    fn test_add_rejects_duplicates_and_unsupported() {
        let queue = QueueManager::new();
        assert!(queue.add("/in/scan.png", 0));
        assert!(!queue.add("/in/scan.png", 5));
        assert!(!queue.add("/in/tool.exe", 0));
        assert_eq!(queue.add_batch(["/in/scan.png", "/in/a.txt", "/in/b.zip"], 0), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_unknown_paths_are_noops() {
        let queue = QueueManager::new();
        let missing = Path::new("nope.pdf");
        assert!(!queue.remove(missing));
        assert!(!queue.reorder(missing, 3));
        assert!(!queue.move_up(missing));
        assert!(!queue.set_status(missing, ItemStatus::Active, None));
        assert_eq!(queue.set_batch_priority(&[missing], 4), 0);
        assert_eq!(queue.remove_batch(&[missing]), 0);
    }

    #[test]
    fn test_reorder_clamps() {
        let queue = QueueManager::new();
        queue.add_batch(["a.txt", "b.txt", "c.txt"], 0);
        assert!(queue.reorder(Path::new("a.txt"), 99));
        assert_eq!(paths(&queue), vec!["b.txt", "c.txt", "a.txt"]);
        assert!(queue.move_up(Path::new("a.txt")));
        assert_eq!(paths(&queue), vec!["b.txt", "a.txt", "c.txt"]);
        assert!(queue.move_up(Path::new("b.txt")));
        assert_eq!(paths(&queue), vec!["b.txt", "a.txt", "c.txt"]);
        assert!(queue.move_down(Path::new("c.txt")));
        assert_eq!(paths(&queue), vec!["b.txt", "a.txt", "c.txt"]);
    }

    #[test]
    fn test_next_pending_skips_active() {
        let queue = QueueManager::new();
        queue.add_batch(["a.txt", "b.txt"], 0);
        let first = queue.next_pending().unwrap();
        assert_eq!(first.path, PathBuf::from("a.txt"));
        assert!(queue.set_status(&first.path, ItemStatus::Active, None));
        assert_eq!(queue.next_pending().unwrap().path, PathBuf::from("b.txt"));

        assert!(queue.set_status(&first.path, ItemStatus::Pending, None));
        assert_eq!(queue.next_pending().unwrap().path, PathBuf::from("a.txt"));
    }

    #[test]
    fn test_claim_next_marks_active() {
        let queue = QueueManager::new();
        queue.add("a.txt", 0);
        let claimed = queue.claim_next().unwrap();
        assert_eq!(claimed.status, ItemStatus::Active);
        assert!(claimed.started_at.is_some());
        assert!(queue.claim_next().is_none());
    }

    #[test]
    fn test_set_status_validates_transitions() {
        let queue = QueueManager::new();
        queue.add("a.txt", 0);
        let path = Path::new("a.txt");
        assert!(!queue.set_status(path, ItemStatus::Completed, None));
        assert!(queue.set_status(path, ItemStatus::Active, None));
        let err = ItemError {
            code: "ocr_failure".into(),
            message: "garbled".into(),
        };
        assert!(queue.set_status(path, ItemStatus::Failed, Some(err.clone())));

        let item = queue.get(path).unwrap();
        assert_eq!(item.last_error, Some(err));
        assert!(item.completed_at.is_some());
        assert!(!queue.set_status(path, ItemStatus::Active, None));

        assert_eq!(queue.reset_failed(), 1);
        let item = queue.get(path).unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert!(item.last_error.is_none());
    }

    #[test]
    fn test_clear_with_filter() {
        let queue = QueueManager::new();
        queue.add_batch(["a.txt", "b.txt", "c.txt"], 0);
        queue.claim_next();
        queue.set_status(Path::new("a.txt"), ItemStatus::Completed, None);
        assert_eq!(queue.clear(Some(ItemStatus::Completed)), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.clear(None), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_batch_priority_repositions() {
        let queue = QueueManager::new();
        queue.add_batch(["a.txt", "b.txt", "c.txt"], 0);
        queue.add("d.txt", 5);
        assert_eq!(queue.set_batch_priority(&["c.txt", "b.txt"], 5), 2);
        assert_eq!(paths(&queue), vec!["d.txt", "b.txt", "c.txt", "a.txt"]);
    }

    #[test]
    fn test_batch_priority_keeps_arrival_order_for_ties() {
        let queue = QueueManager::new();
        queue.add_batch(["a.txt", "b.txt", "c.txt"], 0);
        assert_eq!(queue.set_batch_priority(&["c.txt", "b.txt", "c.txt"], 5), 2);
        assert_eq!(paths(&queue), vec!["b.txt", "c.txt", "a.txt"]);
    }

    #[test]
    fn test_statistics() {
        let queue = QueueManager::new();
        queue.add_batch(["a.txt", "b.txt", "c.txt"], 0);
        queue.claim_next();
        let stats = queue.statistics();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.pending, 2);
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let queue = QueueManager::new();
        let mut rx = queue.subscribe();
        queue.add("a.txt", 0);
        queue.remove(Path::new("a.txt"));
        assert!(matches!(rx.recv().await.unwrap(), QueueEvent::ItemAdded { .. }));
        assert!(matches!(rx.recv().await.unwrap(), QueueEvent::ItemRemoved { .. }));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8, i32),
        Remove(u8),
        Reorder(u8, usize),
        Claim,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6, -2i32..3).prop_map(|(p, pr)| Op::Add(p, pr)),
            (0u8..6).prop_map(Op::Remove),
            (0u8..6, 0usize..8).prop_map(|(p, i)| Op::Reorder(p, i)),
            Just(Op::Claim),
        ]
    }

    proptest! {
        #[test]
        fn prop_paths_stay_unique(ops in proptest::collection::vec(op(), 0..64)) {
            let queue = QueueManager::new();
            let name = |p: u8| PathBuf::from(format!("file{}.txt", p));
            for op in ops {
                match op {
                    Op::Add(p, pr) => { queue.add(name(p), pr); }
                    Op::Remove(p) => { queue.remove(&name(p)); }
                    Op::Reorder(p, i) => { queue.reorder(&name(p), i); }
                    Op::Claim => { queue.claim_next(); }
                }
                let mut seen = paths(&queue);
                let len = seen.len();
                seen.sort();
                seen.dedup();
                prop_assert_eq!(seen.len(), len);

                if let Some(next) = queue.next_pending() {
                    prop_assert_eq!(next.status, ItemStatus::Pending);
                }
            }
        }
    }
}
