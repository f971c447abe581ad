//! Batches sampled from replay buffers.

/// Transitions `(o_t, a_t, o_t+1, r_t, is_done_t)` sampled for one gradient iteration.
///
/// Observations and actions are stacked along the first axis; rewards and
/// done flags are given per transition.
pub trait TransitionBatch {
    /// Stacked observations, a tensor for the tch agents.
    type ObsBatch;

    /// Stacked actions.
    type ActBatch;

    /// Splits the batch into `(o_t, a_t, o_t+1, r_t, is_done_t)`.
    fn unpack(self) -> (Self::ObsBatch, Self::ActBatch, Self::ObsBatch, Vec<f32>, Vec<i8>);

    /// The number of transitions.
    fn len(&self) -> usize;

    /// Observations `o_t`.
    fn obs(&self) -> &Self::ObsBatch;

    /// Actions `a_t`.
    fn act(&self) -> &Self::ActBatch;
}
