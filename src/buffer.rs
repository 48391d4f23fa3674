use crate::activity::Activity;

/// Fixed-capacity FIFO of activities.
///
/// Backed by a ring of slots with a head index, so appending to a full buffer
/// overwrites the oldest slot instead of shifting every element. Iteration and
/// [`snapshot`](ActivityBuffer::snapshot) always yield oldest first.
///
/// # Examples
///
/// ```
/// use activitytail::{parse_line, ActivityBuffer};
///
/// let mut buffer = ActivityBuffer::new(2);
/// for agent in ["a", "b", "c"] {
///     let line = format!(
///         r#"{{"timestamp":"t","agent":"{agent}","action":"x","duration_ms":1}}"#
///     );
///     buffer.append(parse_line(&line).unwrap());
/// }
/// let agents: Vec<_> = buffer.snapshot().into_iter().map(|a| a.agent).collect();
/// assert_eq!(agents, vec!["b", "c"]);
/// ```
#[derive(Debug, Clone)]
pub struct ActivityBuffer {
    slots: Vec<Option<Activity>>,
    /// Index of the oldest entry.
    head: usize,
    len: usize,
}

impl ActivityBuffer {
    /// Create an empty buffer. A capacity of zero is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        ActivityBuffer {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
        }
    }

    /// Build a buffer from an ordered sequence, keeping only the newest
    /// `capacity` entries.
    pub fn from_ordered(capacity: usize, activities: Vec<Activity>) -> Self {
        let mut buffer = ActivityBuffer::new(capacity);
        let skip = activities.len().saturating_sub(buffer.capacity());
        for activity in activities.into_iter().skip(skip) {
            buffer.append(activity);
        }
        buffer
    }

    /// Append at the tail. Returns the evicted head when the buffer was full.
    pub fn append(&mut self, activity: Activity) -> Option<Activity> {
        let capacity = self.capacity();
        if self.len < capacity {
            let tail = (self.head + self.len) % capacity;
            self.slots[tail] = Some(activity);
            self.len += 1;
            None
        } else {
            let evicted = self.slots[self.head].replace(activity);
            self.head = (self.head + 1) % capacity;
            evicted
        }
    }

    /// Owned copy of the contents, oldest first.
    pub fn snapshot(&self) -> Vec<Activity> {
        self.iter().cloned().collect()
    }

    /// Iterate over the buffered activities, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Activity> {
        let capacity = self.capacity();
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % capacity].as_ref())
    }

    /// Returns the number of buffered activities.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the fixed maximum number of activities.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::parse_line;

    fn activity(n: usize) -> Activity {
        let line = format!(
            r#"{{"timestamp":"2024-01-01T00:00:{n:02}Z","agent":"agent_{n}","action":"x","duration_ms":{n}}}"#
        );
        parse_line(&line).unwrap()
    }

    fn agents(buffer: &ActivityBuffer) -> Vec<String> {
        buffer.iter().map(|a| a.agent.clone()).collect()
    }

    #[test]
    fn test_append_below_capacity() {
        let mut buffer = ActivityBuffer::new(3);
        assert!(buffer.is_empty());
        assert_eq!(buffer.append(activity(0)), None);
        assert_eq!(buffer.append(activity(1)), None);
        assert_eq!(buffer.len(), 2);
        assert_eq!(agents(&buffer), vec!["agent_0", "agent_1"]);
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut buffer = ActivityBuffer::new(3);
        for n in 0..3 {
            buffer.append(activity(n));
        }
        let evicted = buffer.append(activity(3)).unwrap();
        assert_eq!(evicted.agent, "agent_0");
        assert_eq!(agents(&buffer), vec!["agent_1", "agent_2", "agent_3"]);
    }

    #[test]
    fn test_wraps_around_many_times() {
        let mut buffer = ActivityBuffer::new(5);
        for n in 0..1000 {
            buffer.append(activity(n % 60));
        }
        assert_eq!(buffer.len(), 5);
        let expected: Vec<String> = (995..1000).map(|n| format!("agent_{}", n % 60)).collect();
        assert_eq!(agents(&buffer), expected);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut buffer = ActivityBuffer::new(2);
        buffer.append(activity(0));
        let mut snap = buffer.snapshot();
        snap.clear();
        buffer.append(activity(1));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.snapshot()[0].agent, "agent_0");
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = ActivityBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.append(activity(0));
        buffer.append(activity(1));
        assert_eq!(agents(&buffer), vec!["agent_1"]);
    }

    #[test]
    fn test_from_ordered_keeps_newest() {
        let buffer = ActivityBuffer::from_ordered(2, (0..5).map(activity).collect());
        assert_eq!(buffer.capacity(), 2);
        assert_eq!(agents(&buffer), vec!["agent_3", "agent_4"]);
    }
}
