//! SA parameters and cooling schedules.

use super::types::TemperatureSchedule;
use crate::error::{Error, Result};

/// Geometric (exponential) cooling: `T_{k+1} = alpha * T_k`.
///
/// Most widely used. Typical `alpha`: 0.90–0.99.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometric {
    alpha: f64,
    temperature: f64,
}

impl Geometric {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            temperature: 1.0,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl Default for Geometric {
    fn default() -> Self {
        Self::new(0.95)
    }
}

impl TemperatureSchedule for Geometric {
    fn reset(&mut self, initial: f64) {
        self.temperature = initial;
    }

    fn current(&self) -> f64 {
        self.temperature
    }

    fn advance(&mut self) {
        self.temperature *= self.alpha;
    }
}

/// Lundy-Mees cooling: `T_{k+1} = T_k / (1 + beta * T_k)`.
///
/// Cools fast at high T and slowly at low T.
///
/// Reference: Lundy & Mees (1986), "Convergence of an Annealing Algorithm"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LundyMees {
    beta: f64,
    temperature: f64,
}

impl LundyMees {
    pub fn new(beta: f64) -> Self {
        Self {
            beta,
            temperature: 1.0,
        }
    }
}

impl TemperatureSchedule for LundyMees {
    fn reset(&mut self, initial: f64) {
        self.temperature = initial;
    }

    fn current(&self) -> f64 {
        self.temperature
    }

    fn advance(&mut self) {
        self.temperature /= 1.0 + self.beta * self.temperature;
    }
}

/// Cooling schedule selection.
///
/// This is the transferable description of a schedule: drivers hand it to
/// every worker, and each worker builds its own stateful instance with
/// [`CoolingSchedule::build`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoolingSchedule {
    /// See [`Geometric`].
    Geometric {
        /// Cooling factor in (0, 1). Higher = slower cooling.
        alpha: f64,
    },

    /// See [`LundyMees`].
    LundyMees {
        /// Cooling parameter, positive.
        beta: f64,
    },
}

impl Default for CoolingSchedule {
    fn default() -> Self {
        CoolingSchedule::Geometric { alpha: 0.95 }
    }
}

impl CoolingSchedule {
    /// Creates a fresh stateful schedule.
    pub fn build(self) -> Box<dyn TemperatureSchedule> {
        match self {
            CoolingSchedule::Geometric { alpha } => Box::new(Geometric::new(alpha)),
            CoolingSchedule::LundyMees { beta } => Box::new(LundyMees::new(beta)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            CoolingSchedule::Geometric { alpha } => {
                if !(alpha > 0.0 && alpha < 1.0) {
                    return Err(Error::InvalidConfig(format!(
                        "geometric alpha must be in (0, 1), got {alpha}"
                    )));
                }
            }
            CoolingSchedule::LundyMees { beta } => {
                if !(beta > 0.0) || !beta.is_finite() {
                    return Err(Error::InvalidConfig(format!(
                        "lundy-mees beta must be positive, got {beta}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Parameters of one annealing run.
///
/// # Examples
///
/// ```
/// use k2_anneal::sa::SaParams;
///
/// let params = SaParams::default()
///     .with_initial_temperature(50.0)
///     .with_min_temperature(0.01)
///     .with_iterations_per_temperature(200)
///     .with_patience(40)
///     .with_seed(7);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SaParams {
    /// Initial temperature `T0`. Higher values allow more exploration.
    pub initial_temperature: f64,

    /// The run stops once the temperature drops below this.
    pub min_temperature: f64,

    /// Number of candidate moves evaluated at each temperature level.
    pub iterations_per_temperature: usize,

    /// Consecutive temperature levels without a new best before stopping.
    pub patience: usize,

    /// Seed of the engine's random generator.
    pub seed: u64,
}

impl Default for SaParams {
    fn default() -> Self {
        Self {
            initial_temperature: 1.0,
            min_temperature: 1e-3,
            iterations_per_temperature: 100,
            patience: 100,
            seed: 42,
        }
    }
}

impl SaParams {
    pub fn with_initial_temperature(mut self, t: f64) -> Self {
        self.initial_temperature = t;
        self
    }

    pub fn with_min_temperature(mut self, t: f64) -> Self {
        self.min_temperature = t;
        self
    }

    pub fn with_iterations_per_temperature(mut self, n: usize) -> Self {
        self.iterations_per_temperature = n;
        self
    }

    pub fn with_patience(mut self, n: usize) -> Self {
        self.patience = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_temperature > 0.0) || !self.initial_temperature.is_finite() {
            return Err(Error::InvalidConfig(
                "initial_temperature must be positive and finite".into(),
            ));
        }
        if !(self.min_temperature > 0.0) {
            return Err(Error::InvalidConfig("min_temperature must be positive".into()));
        }
        if self.min_temperature >= self.initial_temperature {
            return Err(Error::InvalidConfig(
                "min_temperature must be less than initial_temperature".into(),
            ));
        }
        if self.iterations_per_temperature == 0 {
            return Err(Error::InvalidConfig(
                "iterations_per_temperature must be at least 1".into(),
            ));
        }
        if self.patience == 0 {
            return Err(Error::InvalidConfig("patience must be at least 1".into()));
        }
        Ok(())
    }
}
