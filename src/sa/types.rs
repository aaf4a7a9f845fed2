//! Core traits for Simulated Annealing.

use rand::Rng;

/// A candidate solution the annealer can evaluate and clone.
///
/// The objective is minimized. It must be a pure function of the
/// solution: calling it twice without an intervening mutation returns
/// the same value.
pub trait Solution: Clone + Send {
    /// Cost of this solution. Lower is better.
    fn objective(&self) -> u64;
}

/// A neighborhood move applied in place.
///
/// Implementations must leave the solution valid (every structural
/// invariant preserved) but need not improve it. When no move exists,
/// for example a single machine, the operator is a no-op.
///
/// # Examples
///
/// ```ignore
/// struct Flip;
///
/// impl Mutation<Bits> for Flip {
///     fn name(&self) -> &str { "flip" }
///
///     fn apply<R: Rng>(&self, bits: &mut Bits, rng: &mut R) {
///         let i = rng.random_range(0..bits.len());
///         bits.toggle(i);
///     }
/// }
/// ```
pub trait Mutation<S>: Send + Sync {
    /// Returns a human-readable name for this operator.
    fn name(&self) -> &str;

    /// Mutates `solution` into a neighbor.
    fn apply<R: Rng>(&self, solution: &mut S, rng: &mut R);
}

/// Stateful temperature sequence.
///
/// The schedule knows nothing about the objective; the annealer resets it
/// once per run and advances it once per temperature level.
pub trait TemperatureSchedule: Send {
    /// Sets the current temperature to `initial`.
    fn reset(&mut self, initial: f64);

    /// The active temperature.
    fn current(&self) -> f64;

    /// Moves to the next temperature level.
    fn advance(&mut self);
}

impl<T: TemperatureSchedule + ?Sized> TemperatureSchedule for Box<T> {
    fn reset(&mut self, initial: f64) {
        (**self).reset(initial);
    }

    fn current(&self) -> f64 {
        (**self).current()
    }

    fn advance(&mut self) {
        (**self).advance();
    }
}
