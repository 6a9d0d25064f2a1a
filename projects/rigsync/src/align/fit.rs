use crate::errors::AlignError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A first-degree time-base correction, `y = slope * x + intercept`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl Default for LinearFit {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl LinearFit {
    pub const IDENTITY: LinearFit = LinearFit {
        slope: 1.0,
        intercept: 0.0,
    };

    pub fn new(slope: f64, intercept: f64) -> Self {
        Self { slope, intercept }
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Applies `self` first and `next` to its output: `next(self(x))`.
    ///
    /// Composition does not commute. For alignment `self` is the initial
    /// guess and `next` the correction fit on top of it.
    pub fn then(&self, next: &LinearFit) -> LinearFit {
        LinearFit {
            slope: next.slope * self.slope,
            intercept: next.slope * self.intercept + next.intercept,
        }
    }

    /// Least-squares line through `(x, y)`.
    pub fn fit(x: &[f64], y: &[f64]) -> Result<Self, AlignError> {
        if x.len() != y.len() {
            return Err(AlignError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        if x.len() < 2 {
            return Err(AlignError::TooFewPoints(x.len()));
        }

        let n = x.len() as f64;
        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;
        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (xi, yi) in x.iter().zip(y) {
            sxy += (xi - mean_x) * (yi - mean_y);
            sxx += (xi - mean_x).powi(2);
        }
        if sxx == 0.0 {
            return Err(AlignError::Degenerate);
        }

        let slope = sxy / sxx;
        Ok(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    /// Observed minus predicted for each point.
    pub fn residuals(&self, x: &[f64], observed: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(observed)
            .map(|(xi, yi)| yi - self.eval(*xi))
            .collect()
    }
}

impl fmt::Display for LinearFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.slope, self.intercept)
    }
}

/// Parses `"slope,intercept"`.
impl FromStr for LinearFit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slope, intercept) = s
            .split_once(',')
            .ok_or_else(|| format!("expected slope,intercept, got {:?}", s))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("{:?}: {}", v, e))
        };
        Ok(Self::new(parse(slope)?, parse(intercept)?))
    }
}
