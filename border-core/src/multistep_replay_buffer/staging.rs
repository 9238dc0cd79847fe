//! Staging ring for raw transitions.
use super::{BatchBase, Transition};
use anyhow::Result;

/// A window of consecutive raw steps read from a [`StagingRing`].
pub struct StagedWindow<O, A> {
    /// Observation at the first step.
    pub obs: O,

    /// Action at the first step.
    pub act: A,

    /// Rewards of the steps, oldest first.
    pub rewards: Vec<f32>,

    /// Observation after the last step.
    pub next_obs: O,

    /// Terminal flag of the last step.
    pub is_terminated: bool,
}

/// A fixed-capacity circular array of single-step transitions.
///
/// The write pointer always points to the next free slot. Data are addressed by
/// offsets counted backward from the write pointer, so an offset of `1` is the most
/// recently pushed step. Pushing into a full ring silently overwrites the oldest slot.
pub struct StagingRing<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    capacity: usize,
    ptr: usize,
    len: usize,
    obs: O,
    act: A,
    next_obs: O,
    reward: Vec<f32>,
    is_terminated: Vec<bool>,
}

impl<O, A> StagingRing<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Creates an empty ring.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ptr: 0,
            len: 0,
            obs: O::new(capacity),
            act: A::new(capacity),
            next_obs: O::new(capacity),
            reward: vec![0.; capacity],
            is_terminated: vec![false; capacity],
        }
    }

    /// Writes a transition at the write pointer and advances it.
    pub fn push(&mut self, tr: Transition<O, A>) -> Result<()> {
        let Transition {
            obs,
            act,
            next_obs,
            reward,
            is_terminated,
        } = tr;
        self.obs.push(self.ptr, obs)?;
        self.act.push(self.ptr, act)?;
        self.next_obs.push(self.ptr, next_obs)?;
        self.reward[self.ptr] = reward;
        self.is_terminated[self.ptr] = is_terminated;

        self.ptr = (self.ptr + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
        Ok(())
    }

    /// Slot `offset` steps behind the write pointer.
    #[inline]
    fn slot(&self, offset: usize) -> usize {
        (self.ptr + self.capacity - offset % self.capacity) % self.capacity
    }

    /// Returns `length` rewards starting `start_offset` steps behind the write pointer.
    ///
    /// Rewards are returned in the order they were pushed. Reading more slots than
    /// were written yields the zeros the ring was initialized with.
    pub fn window_rewards(&self, start_offset: usize, length: usize) -> Vec<f32> {
        let start = self.slot(start_offset);
        (0..length)
            .map(|j| self.reward[(start + j) % self.capacity])
            .collect()
    }

    /// Reads the window made of the `n_steps` most recently pushed steps.
    pub fn window(&self, n_steps: usize) -> Result<StagedWindow<O, A>> {
        debug_assert!(n_steps >= 1 && n_steps <= self.len);
        let first = self.slot(n_steps);
        let last = self.slot(1);

        Ok(StagedWindow {
            obs: self.obs.sample(&[first])?,
            act: self.act.sample(&[first])?,
            rewards: self.window_rewards(n_steps, n_steps),
            next_obs: self.next_obs.sample(&[last])?,
            is_terminated: self.is_terminated[last],
        })
    }

    /// Number of written slots, saturating at the capacity.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Capacity of the ring.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::VecBatch;

    fn tr(t: usize, reward: f32, is_terminated: bool) -> Transition<VecBatch, VecBatch> {
        Transition {
            obs: VecBatch::row(vec![t as f32]),
            act: VecBatch::row(vec![-(t as f32)]),
            next_obs: VecBatch::row(vec![t as f32 + 1.0]),
            reward,
            is_terminated,
        }
    }

    #[test]
    fn test_window_reads_latest_steps() -> Result<()> {
        let mut ring = StagingRing::<VecBatch, VecBatch>::new(8);
        for t in 0..5 {
            ring.push(tr(t, t as f32, t == 4))?;
        }
        assert_eq!(ring.len(), 5);

        let w = ring.window(3)?;
        assert_eq!(w.obs.rows(), &[vec![2.0]]);
        assert_eq!(w.act.rows(), &[vec![-2.0]]);
        assert_eq!(w.next_obs.rows(), &[vec![5.0]]);
        assert_eq!(w.rewards, vec![2.0, 3.0, 4.0]);
        assert!(w.is_terminated);
        Ok(())
    }

    #[test]
    fn test_window_across_wrap_around() -> Result<()> {
        let mut ring = StagingRing::<VecBatch, VecBatch>::new(4);
        for t in 0..11 {
            ring.push(tr(t, t as f32, false))?;
        }
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.capacity(), 4);

        // slots hold steps 8, 9, 10 and 7, the write pointer is at slot 3
        assert_eq!(ring.window_rewards(4, 4), vec![7.0, 8.0, 9.0, 10.0]);
        let w = ring.window(3)?;
        assert_eq!(w.obs.rows(), &[vec![8.0]]);
        assert_eq!(w.next_obs.rows(), &[vec![11.0]]);
        assert_eq!(w.rewards, vec![8.0, 9.0, 10.0]);
        Ok(())
    }
}
