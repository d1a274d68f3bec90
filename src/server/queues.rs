//! Preference queues for waiting users
//!
//! Three FIFO queues, one per match preference. A connection can wait in at
//! most one queue at a time; joining again moves it instead of duplicating.

use std::collections::VecDeque;

use crate::current_timestamp;
use crate::protocol::messages::{ConnectionId, Preference};

/// A waiting user in a preference queue
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Waiting connection
    pub connection_id: ConnectionId,
    /// When the user joined the queue (Unix ms)
    pub joined_at: u64,
}

/// The three preference queues
pub struct PreferenceQueues {
    any: VecDeque<QueueEntry>,
    male: VecDeque<QueueEntry>,
    female: VecDeque<QueueEntry>,
}

impl PreferenceQueues {
    pub fn new() -> Self {
        Self {
            any: VecDeque::new(),
            male: VecDeque::new(),
            female: VecDeque::new(),
        }
    }

    fn queue(&self, preference: Preference) -> &VecDeque<QueueEntry> {
        match preference {
            Preference::Any => &self.any,
            Preference::Male => &self.male,
            Preference::Female => &self.female,
        }
    }

    fn queue_mut(&mut self, preference: Preference) -> &mut VecDeque<QueueEntry> {
        match preference {
            Preference::Any => &mut self.any,
            Preference::Male => &mut self.male,
            Preference::Female => &mut self.female,
        }
    }

    /// Add a connection to the back of a queue, returning its 1-based
    /// position. Any previous entry for the same connection is removed first.
    pub fn enqueue(&mut self, connection_id: &ConnectionId, preference: Preference) -> usize {
        self.remove(connection_id);
        let queue = self.queue_mut(preference);
        queue.push_back(QueueEntry {
            connection_id: connection_id.clone(),
            joined_at: current_timestamp(),
        });
        queue.len()
    }

    /// Remove a connection from whichever queue holds it. Idempotent.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Preference> {
        for preference in [Preference::Any, Preference::Male, Preference::Female] {
            let queue = self.queue_mut(preference);
            if let Some(idx) = queue
                .iter()
                .position(|e| e.connection_id == *connection_id)
            {
                queue.remove(idx);
                return Some(preference);
            }
        }
        None
    }

    /// Locate a waiting connection: which queue, 1-based position, and the
    /// total size of that queue.
    pub fn position_of(
        &self,
        connection_id: &ConnectionId,
    ) -> Option<(Preference, usize, usize)> {
        for preference in [Preference::Any, Preference::Male, Preference::Female] {
            let queue = self.queue(preference);
            if let Some(idx) = queue
                .iter()
                .position(|e| e.connection_id == *connection_id)
            {
                return Some((preference, idx + 1, queue.len()));
            }
        }
        None
    }

    /// Iterate entries of one queue in FIFO order
    pub fn entries(&self, preference: Preference) -> impl Iterator<Item = &QueueEntry> {
        self.queue(preference).iter()
    }

    /// Total number of waiting connections across all queues
    pub fn count_all(&self) -> usize {
        self.any.len() + self.male.len() + self.female.len()
    }
}

impl Default for PreferenceQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_positions() {
        let mut queues = PreferenceQueues::new();

        assert_eq!(queues.enqueue(&"c-1".to_string(), Preference::Any), 1);
        assert_eq!(queues.enqueue(&"c-2".to_string(), Preference::Any), 2);
        assert_eq!(queues.enqueue(&"c-3".to_string(), Preference::Female), 1);
        assert_eq!(queues.count_all(), 3);
    }

    #[test]
    fn test_rejoin_moves_instead_of_duplicating() {
        let mut queues = PreferenceQueues::new();
        queues.enqueue(&"c-1".to_string(), Preference::Any);
        queues.enqueue(&"c-2".to_string(), Preference::Any);

        // c-1 switches queues; only one entry survives
        let pos = queues.enqueue(&"c-1".to_string(), Preference::Male);
        assert_eq!(pos, 1);
        assert_eq!(queues.count_all(), 2);
        assert_eq!(
            queues.position_of(&"c-1".to_string()),
            Some((Preference::Male, 1, 1))
        );

        // c-2 moved up in the any queue
        assert_eq!(
            queues.position_of(&"c-2".to_string()),
            Some((Preference::Any, 1, 1))
        );
    }

    #[test]
    fn test_remove_idempotent() {
        let mut queues = PreferenceQueues::new();
        queues.enqueue(&"c-1".to_string(), Preference::Female);

        assert_eq!(queues.remove(&"c-1".to_string()), Some(Preference::Female));
        assert_eq!(queues.remove(&"c-1".to_string()), None);
        assert_eq!(queues.count_all(), 0);
    }

    #[test]
    fn test_fifo_order_preserved() {
        let mut queues = PreferenceQueues::new();
        queues.enqueue(&"c-1".to_string(), Preference::Any);
        queues.enqueue(&"c-2".to_string(), Preference::Any);
        queues.enqueue(&"c-3".to_string(), Preference::Any);

        let order: Vec<_> = queues
            .entries(Preference::Any)
            .map(|e| e.connection_id.clone())
            .collect();
        assert_eq!(order, vec!["c-1", "c-2", "c-3"]);
    }

    #[test]
    fn test_position_of_missing() {
        let queues = PreferenceQueues::new();
        assert!(queues.position_of(&"c-404".to_string()).is_none());
    }
}
