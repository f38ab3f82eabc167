//! The fight simulation that gives individuals their fitness.

use crate::error::SimulationError;

/// Evaluates a controller and returns its fitness (higher is better).
///
/// Fights of different individuals run concurrently, so implementations must be
/// shareable between threads.
///
/// Any `Fn(usize, &C) -> Result<f64, SimulationError>` closure is an arena:
///
/// ```
/// use darwini_genetic::{arena::Arena, error::SimulationError};
///
/// let arena = |index: usize, _controller: &Vec<f32>| -> Result<f64, SimulationError> {
///     Ok(index as f64)
/// };
/// assert_eq!(arena.fight(3, &vec![]), Ok(3.0));
/// ```
pub trait Arena<C>: Send + Sync {
    /// Runs the simulation for the individual with the given index.
    fn fight(&self, index: usize, controller: &C) -> Result<f64, SimulationError>;
}

impl<C, F> Arena<C> for F
where
    F: Fn(usize, &C) -> Result<f64, SimulationError> + Send + Sync,
{
    fn fight(&self, index: usize, controller: &C) -> Result<f64, SimulationError> {
        self(index, controller)
    }
}
