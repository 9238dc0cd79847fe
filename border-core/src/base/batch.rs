//! Batch.

/// A batch of multi-step transitions sampled from a replay buffer.
///
/// Each element is a window `(o_t, a_t, o_t+n, R_t, d, n)`, where `R_t` is
/// the discounted sum of the `n` rewards in the window and `d` tells if the
/// episode terminated inside the window.
pub trait TransitionBatch {
    /// A set of observation in a batch.
    type ObsBatch;

    /// A set of actions in a batch.
    type ActBatch;

    /// Unpack the data `(o_t, a_t, o_t+n, R_t, is_terminated, n, ix_sample)`.
    fn unpack(
        self,
    ) -> (
        Self::ObsBatch,
        Self::ActBatch,
        Self::ObsBatch,
        Vec<f32>,
        Vec<i8>,
        Vec<usize>,
        Option<Vec<usize>>,
    );

    /// Returns the length.
    fn len(&self) -> usize;

    /// Returns `o_t`.
    fn obs(&self) -> &Self::ObsBatch;

    /// Returns `a_t`.
    fn act(&self) -> &Self::ActBatch;
}
