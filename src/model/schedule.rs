use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LearningSchedule {
    Adagrad,
    Adadelta,
}

impl LearningSchedule {
    /// Starting value of the squared gradient accumulators.
    #[must_use]
    pub const fn initial_accumulator(self) -> f64 {
        match self {
            Self::Adagrad => 1.0,
            Self::Adadelta => 0.0,
        }
    }
}

/// Per-parameter step size calculation.
#[derive(Copy, Clone)]
pub struct Optimizer {
    pub schedule: LearningSchedule,
    pub learning_rate: f64,
    pub rho: f64,
    pub epsilon: f64,
}

impl Optimizer {
    /// Calculates the value to subtract from the parameter
    /// and advances the parameter's accumulators.
    #[inline]
    pub fn delta(&self, gradient: f64, gradient_sum: &mut f64, delta_sum: &mut f64) -> f64 {
        match self.schedule {
            LearningSchedule::Adagrad => {
                *gradient_sum += gradient * gradient;
                self.learning_rate * gradient / gradient_sum.sqrt()
            }
            LearningSchedule::Adadelta => {
                *gradient_sum = self.rho * *gradient_sum + (1.0 - self.rho) * gradient * gradient;
                let delta = (*delta_sum + self.epsilon).sqrt()
                    / (*gradient_sum + self.epsilon).sqrt()
                    * gradient;
                *delta_sum = self.rho * *delta_sum + (1.0 - self.rho) * delta * delta;
                delta
            }
        }
    }
}
