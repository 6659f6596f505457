use buildworld_common::{Location, OccupantId};
use std::collections::BTreeMap;

/// Deferred steps of manager operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Continuation {
    /// Finish a teleport once an on-demand load has warmed up.
    Relocate {
        occupant: OccupantId,
        world: String,
        location: Location,
    },
    /// Import the next world of the running batch.
    ImportNext,
    /// Unload `world` if it is still idle. Stale when `generation` no longer
    /// matches the world's current unload generation.
    UnloadCheck { world: String, generation: u64 },
}

/// Virtual tick clock holding values due at a later tick.
///
/// Nothing runs by itself: [`Scheduler::tick`] advances time by one tick and
/// hands back everything that became due, in (due tick, submission) order.
#[derive(Debug)]
pub struct Scheduler<T> {
    now: u64,
    seq: u64,
    queue: BTreeMap<(u64, u64), T>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            now: 0,
            seq: 0,
            queue: BTreeMap::new(),
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Queue `item` to run `delay` ticks from now. A delay of zero runs on
    /// the next tick. Returns the due tick.
    pub fn schedule(&mut self, delay: u64, item: T) -> u64 {
        let due = self.now + delay.max(1);
        self.queue.insert((due, self.seq), item);
        self.seq += 1;
        due
    }

    pub fn tick(&mut self) -> Vec<T> {
        self.now += 1;
        let later = self.queue.split_off(&(self.now + 1, 0));
        std::mem::replace(&mut self.queue, later).into_values().collect()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.queue.iter().map(|((due, _), item)| (*due, item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_fire_on_their_due_tick() {
        let mut s = Scheduler::new();
        assert_eq!(s.schedule(3, "c"), 3);
        s.schedule(1, "a");
        s.schedule(0, "b");
        assert_eq!(s.tick(), vec!["a", "b"]);
        assert!(s.tick().is_empty());
        assert_eq!(s.tick(), vec!["c"]);
        assert!(s.is_idle());
        assert_eq!(s.now(), 3);
    }

    #[test]
    fn delays_are_relative_to_the_current_tick() {
        let mut s = Scheduler::new();
        s.tick();
        s.tick();
        s.schedule(2, 7);
        assert_eq!(s.iter().next(), Some((4, &7)));
        assert!(s.tick().is_empty());
        assert_eq!(s.tick(), vec![7]);
    }

    #[test]
    fn same_tick_preserves_submission_order() {
        let mut s = Scheduler::new();
        for i in 0..5 {
            s.schedule(2, i);
        }
        s.tick();
        assert_eq!(s.tick(), vec![0, 1, 2, 3, 4]);
        assert_eq!(s.pending(), 0);
    }
}
