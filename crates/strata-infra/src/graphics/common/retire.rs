// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Deferred destruction keyed by submission value.

use std::collections::VecDeque;

/// Objects waiting for the GPU to finish with them.
///
/// Each entry is tagged with the last submission that referenced it. Entries are
/// released in the order their submissions complete.
#[derive(Debug)]
pub struct RetireQueue<T> {
    entries: VecDeque<(u64, T)>,
}

impl<T> Default for RetireQueue<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T> RetireQueue<T> {
    /// Queues `item` for release once submission `last_use` has completed.
    pub fn push(&mut self, last_use: u64, item: T) {
        let at = self.entries.partition_point(|(value, _)| *value <= last_use);
        self.entries.insert(at, (last_use, item));
    }

    /// Removes every entry whose submission value is at most `completed`.
    pub fn drain(&mut self, completed: u64) -> Vec<T> {
        let ready = self.entries.partition_point(|(value, _)| *value <= completed);
        self.entries.drain(..ready).map(|(_, item)| item).collect()
    }

    /// Takes `item` back out of the queue before its release.
    /// ## Returns
    /// The submission value it was waiting on, or `None` if it is not queued.
    pub fn cancel(&mut self, item: &T) -> Option<u64>
    where
        T: PartialEq,
    {
        let at = self.entries.iter().position(|(_, queued)| queued == item)?;
        self.entries.remove(at).map(|(value, _)| value)
    }

    /// Removes every entry regardless of completion.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.entries.drain(..).map(|(_, item)| item).collect()
    }

    /// Number of entries still waiting.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_drain_in_completion_order() {
        // --- ARRANGE ---
        let mut queue = RetireQueue::default();
        queue.push(3, "c");
        queue.push(1, "a");
        queue.push(2, "b");
        queue.push(0, "unused");

        // --- ACT ---
        let first = queue.drain(1);
        let second = queue.drain(1);
        let rest = queue.drain(10);

        // --- ASSERT ---
        assert_eq!(first, vec!["unused", "a"]);
        assert!(second.is_empty());
        assert_eq!(rest, vec!["b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn cancelled_entries_report_their_value() {
        let mut queue = RetireQueue::default();
        queue.push(4, 'x');
        queue.push(6, 'y');
        assert_eq!(queue.cancel(&'y'), Some(6));
        assert_eq!(queue.cancel(&'y'), None);
        assert_eq!(queue.drain(10), vec!['x']);
    }
}
