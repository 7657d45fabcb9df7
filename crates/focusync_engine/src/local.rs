//! Local collection abstraction.

use focusync_model::{Record, RecordId};
use tokio::sync::watch;

/// An observable on-device collection of records.
///
/// The host application owns the data; the syncer only reads the current
/// contents, listens for changes and, after a pull, replaces everything.
pub trait LocalCollection<R: Record>: Send + Sync {
    /// Returns the current contents.
    fn current_value(&self) -> Vec<R>;

    /// Returns a receiver that is notified with the full contents on every change.
    fn subscribe(&self) -> watch::Receiver<Vec<R>>;

    /// Replaces the whole collection. Must notify subscribers.
    fn replace_all(&self, records: Vec<R>);
}

/// A [`LocalCollection`] backed by a `tokio::sync::watch` channel.
///
/// Every mutation notifies subscribers, even when the contents did not
/// change.
///
/// # Example
///
/// ```rust
/// use focusync_engine::{LocalCollection, MemoryCollection};
/// use focusync_model::FocusPreset;
///
/// let presets = MemoryCollection::new(vec![FocusPreset::new("Classic", 25, 5)]);
/// presets.push(FocusPreset::new("Deep Work", 50, 10));
/// assert_eq!(presets.current_value().len(), 2);
/// ```
#[derive(Debug)]
pub struct MemoryCollection<R> {
    tx: watch::Sender<Vec<R>>,
}

impl<R: Record> MemoryCollection<R> {
    /// Creates a collection with initial contents.
    pub fn new(initial: Vec<R>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Creates an empty collection.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Applies `f` to the contents and notifies subscribers.
    pub fn update(&self, f: impl FnOnce(&mut Vec<R>)) {
        self.tx.send_modify(f);
    }

    /// Appends a record, or replaces the record with the same ID.
    pub fn push(&self, record: R) {
        self.update(|records| {
            match records.iter_mut().find(|r| r.id() == record.id()) {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        });
    }

    /// Removes the record with `id`. Returns true if it was present.
    pub fn remove(&self, id: &RecordId) -> bool {
        let mut removed = false;
        self.update(|records| {
            let before = records.len();
            records.retain(|r| r.id() != id);
            removed = records.len() != before;
        });
        removed
    }

    /// Removes every record.
    pub fn clear(&self) {
        self.update(Vec::clear);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    /// Returns true if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }
}

impl<R: Record> Default for MemoryCollection<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R: Record> LocalCollection<R> for MemoryCollection<R> {
    fn current_value(&self) -> Vec<R> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Vec<R>> {
        self.tx.subscribe()
    }

    fn replace_all(&self, records: Vec<R>) {
        self.tx.send_replace(records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focusync_model::FocusSession;

    #[test]
    fn push_replaces_same_id() {
        let sessions = MemoryCollection::empty();
        sessions.push(FocusSession::new(1, 60).with_id("s1"));
        sessions.push(FocusSession::new(2, 90).with_id("s1"));

        let current = sessions.current_value();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].duration_seconds, 90);
    }

    #[test]
    fn remove_reports_presence() {
        let sessions = MemoryCollection::new(vec![FocusSession::new(1, 60).with_id("s1")]);
        assert!(sessions.remove(&RecordId::new("s1")));
        assert!(!sessions.remove(&RecordId::new("s1")));
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn replace_all_notifies_even_when_equal() {
        let initial = vec![FocusSession::new(1, 60).with_id("s1")];
        let sessions = MemoryCollection::new(initial.clone());
        let mut rx = sessions.subscribe();

        sessions.replace_all(initial.clone());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), initial);
    }
}
