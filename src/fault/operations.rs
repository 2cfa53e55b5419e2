//! Weighted choice over the three fault operations.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::FaultOperation;
use super::FaultError;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Probability of each operation per attempt. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationWeights {
    #[serde(alias = "STOP")]
    pub stop: f64,
    #[serde(alias = "CONT", alias = "continue")]
    pub cont: f64,
    #[serde(alias = "TERM", alias = "terminate")]
    pub term: f64,
}

impl OperationWeights {
    pub fn new(stop: f64, cont: f64, term: f64) -> Self {
        Self { stop, cont, term }
    }

    fn as_array(&self) -> [f64; 3] {
        [self.stop, self.cont, self.term]
    }

    pub fn validate(&self) -> Result<(), FaultError> {
        for (op, weight) in FaultOperation::ALL.iter().zip(self.as_array()) {
            if !weight.is_finite() || weight < 0.0 {
                return Err(FaultError::InvalidWeights(format!(
                    "{:?} weight must be a non-negative number, got {}",
                    op, weight
                )));
            }
        }
        let sum: f64 = self.as_array().iter().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(FaultError::InvalidWeights(format!(
                "weights must sum to 1, got {}",
                sum
            )));
        }
        Ok(())
    }

    pub fn picker(&self) -> Result<OperationPicker, FaultError> {
        self.validate()?;
        let index = WeightedIndex::new(self.as_array())
            .map_err(|e| FaultError::InvalidWeights(e.to_string()))?;
        Ok(OperationPicker { index })
    }
}

/// Samples operations with the configured long-run frequencies.
#[derive(Debug, Clone)]
pub struct OperationPicker {
    index: WeightedIndex<f64>,
}

impl OperationPicker {
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> FaultOperation {
        FaultOperation::ALL[self.index.sample(rng)]
    }
}
