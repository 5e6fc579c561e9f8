//! Live status board shared by all supervisors.
//!
//! Each supervisor only writes its own key; readers see a point-in-time copy.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveInfo {
    pub entity_id: u64,
    pub name: String,
    pub title: String,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct LiveBoard {
    entries: DashMap<u64, LiveInfo>,
}

impl LiveBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_live(&self, info: LiveInfo) {
        self.entries.insert(info.entity_id, info);
    }

    pub fn clear(&self, entity_id: u64) {
        self.entries.remove(&entity_id);
    }

    pub fn is_live(&self, entity_id: u64) -> bool {
        self.entries.contains_key(&entity_id)
    }

    pub fn get(&self, entity_id: u64) -> Option<LiveInfo> {
        self.entries.get(&entity_id).map(|e| e.value().clone())
    }

    /// Live entities ordered by id.
    pub fn list(&self) -> Vec<LiveInfo> {
        let mut list: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        list.sort_by_key(|i| i.entity_id);
        list
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u64) -> LiveInfo {
        LiveInfo {
            entity_id: id,
            name: format!("e{}", id),
            title: "t".into(),
            since: Utc::now(),
        }
    }

    #[test]
    fn list_is_sorted_and_clear_removes() {
        let board = LiveBoard::new();
        board.set_live(info(3));
        board.set_live(info(1));
        assert_eq!(
            board.list().iter().map(|i| i.entity_id).collect::<Vec<_>>(),
            vec![1, 3]
        );

        board.clear(3);
        assert!(!board.is_live(3));
        assert_eq!(board.len(), 1);
    }
}
