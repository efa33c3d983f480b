use serde::{Deserialize, Serialize};

/// Per-epoch learning rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LrSchedule {
    Constant {
        lr: f64,
    },
    /// `lr * decay_rate^(epoch / decay_every)`.
    StepDecay {
        lr: f64,
        decay_rate: f64,
        decay_every: usize,
    },
}

impl Default for LrSchedule {
    fn default() -> Self {
        LrSchedule::Constant { lr: 5e-4 }
    }
}

impl LrSchedule {
    pub fn lr(&self, epoch: usize) -> f64 {
        match *self {
            LrSchedule::Constant { lr } => lr,
            LrSchedule::StepDecay {
                lr,
                decay_rate,
                decay_every,
            } => {
                let steps = epoch / decay_every.max(1);
                lr * decay_rate.powi(steps as i32)
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let (lr, rate) = match *self {
            LrSchedule::Constant { lr } => (lr, 1.0),
            LrSchedule::StepDecay {
                lr,
                decay_rate,
                decay_every,
            } => {
                if decay_every == 0 {
                    anyhow::bail!("decay_every must be at least 1");
                }
                (lr, decay_rate)
            }
        };
        if !(lr.is_finite() && lr > 0.0) {
            anyhow::bail!("learning rate must be positive, got {lr}");
        }
        if !(rate.is_finite() && rate > 0.0) {
            anyhow::bail!("decay rate must be positive, got {rate}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_decay_drops_every_n_epochs() {
        let s = LrSchedule::StepDecay {
            lr: 1e-3,
            decay_rate: 0.5,
            decay_every: 2,
        };
        let lrs: Vec<f64> = (0..5).map(|e| s.lr(e)).collect();
        let expected = [1e-3, 1e-3, 5e-4, 5e-4, 2.5e-4];
        for (got, want) in lrs.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{got} != {want}");
        }
    }

    #[test]
    fn constant_ignores_epoch() {
        let s = LrSchedule::default();
        assert_eq!(s.lr(0), s.lr(100));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn zero_period_is_rejected() {
        let s = LrSchedule::StepDecay {
            lr: 1e-3,
            decay_rate: 0.9,
            decay_every: 0,
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn parses_tagged_toml() {
        let s: LrSchedule =
            toml::from_str("kind = \"step_decay\"\nlr = 0.01\ndecay_rate = 0.1\ndecay_every = 10\n")
                .unwrap();
        assert_eq!(
            s,
            LrSchedule::StepDecay {
                lr: 0.01,
                decay_rate: 0.1,
                decay_every: 10
            }
        );
    }
}
