//! Per-subgroup occupancy counters, materialized only for raid groups.

use crate::{MAX_RAID_SUBGROUPS, MAX_SUBGROUP_SIZE};

#[derive(Debug, Clone, Default)]
pub struct SubGroupCounters {
    counts: [u8; MAX_RAID_SUBGROUPS as usize],
}

impl SubGroupCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild counters from current membership (used when a normal group
    /// converts to raid; existing members keep their slot indices).
    pub fn from_members<I: IntoIterator<Item = u8>>(subgroups: I) -> Self {
        let mut c = Self::new();
        for g in subgroups {
            c.increase(g);
        }
        c
    }

    /// Lowest-index subgroup with free capacity, if any.
    pub fn has_free_slot(&self) -> Option<u8> {
        self.counts
            .iter()
            .position(|&c| c < MAX_SUBGROUP_SIZE)
            .map(|i| i as u8)
    }

    pub fn has_room(&self, subgroup: u8) -> bool {
        self.counts
            .get(subgroup as usize)
            .map(|&c| c < MAX_SUBGROUP_SIZE)
            .unwrap_or(false)
    }

    pub fn increase(&mut self, subgroup: u8) {
        if let Some(c) = self.counts.get_mut(subgroup as usize) {
            *c += 1;
        }
    }

    pub fn decrease(&mut self, subgroup: u8) {
        if let Some(c) = self.counts.get_mut(subgroup as usize) {
            *c = c.saturating_sub(1);
        }
    }

    pub fn count(&self, subgroup: u8) -> u8 {
        self.counts.get(subgroup as usize).copied().unwrap_or(0)
    }

    /// Sum over all subgroups; must always equal the raid's member count.
    pub fn total(&self) -> usize {
        self.counts.iter().map(|&c| c as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_RAID_SIZE;

    #[test]
    fn fills_lowest_index_first() {
        let mut c = SubGroupCounters::new();
        for _ in 0..MAX_SUBGROUP_SIZE {
            let g = c.has_free_slot().unwrap();
            assert_eq!(g, 0);
            c.increase(g);
        }
        assert_eq!(c.has_free_slot(), Some(1));
    }

    #[test]
    fn full_raid_has_no_free_slot() {
        let mut c = SubGroupCounters::new();
        for _ in 0..MAX_RAID_SIZE {
            let g = c.has_free_slot().unwrap();
            c.increase(g);
        }
        assert_eq!(c.has_free_slot(), None);
        assert_eq!(c.total(), MAX_RAID_SIZE);
    }

    #[test]
    fn rebuild_preserves_assignments() {
        let c = SubGroupCounters::from_members([0, 0, 3, 3, 3]);
        assert_eq!(c.count(0), 2);
        assert_eq!(c.count(3), 3);
        assert_eq!(c.total(), 5);
    }
}
