//! Training loop for the per-entity LSTM: minibatch Adam over MSE with
//! early stopping once the epoch loss crosses the configured threshold

use crate::error::{ForecastError, Result};
use crate::model::{LstmGradients, LstmNetwork};
use crate::preprocess::TrainingData;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::{Duration, Instant};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;
const MAX_GRAD_NORM: f64 = 5.0;

/// Training hyperparameters
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Hidden units in the recurrent layer
    pub units: usize,
    /// Epoch budget; training stops earlier when the loss threshold is hit
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Early-stopping threshold on the epoch mean training loss
    pub loss_threshold: f64,
    /// Optional wall-clock budget; when exceeded the run stops at the end
    /// of the current epoch with the model trained so far
    pub max_duration: Option<Duration>,
    /// Seed for weight init and shuffling; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            units: 50,
            epochs: 600,
            batch_size: 16,
            learning_rate: 1e-3,
            loss_threshold: 0.01,
            max_duration: None,
            seed: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.units == 0 {
            return Err(ForecastError::InvalidParameter(
                "units must be positive".to_string(),
            ));
        }
        if self.epochs == 0 {
            return Err(ForecastError::InvalidParameter(
                "epochs must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ForecastError::InvalidParameter(
                "batch_size must be positive".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ForecastError::InvalidParameter(
                "learning_rate must be positive".to_string(),
            ));
        }
        if !(self.loss_threshold > 0.0) {
            return Err(ForecastError::InvalidParameter(
                "loss_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one training run.
///
/// The trainer never persists anything; the pipeline saves the returned
/// network exactly once through the model store.
#[derive(Debug)]
pub struct TrainingReport {
    pub network: LstmNetwork,
    /// Mean training loss of the last completed epoch
    pub final_loss: f64,
    pub epochs_run: usize,
    /// True when the loss threshold stopped the run before the epoch budget
    pub stopped_early: bool,
    /// True when the wall-clock budget stopped the run
    pub hit_time_budget: bool,
}

/// Train a fresh network on prepared window/target pairs
pub fn train(data: &TrainingData, config: &TrainingConfig) -> Result<TrainingReport> {
    config.validate()?;
    let samples = data.samples();
    if samples == 0 {
        return Err(ForecastError::InsufficientHistory {
            actual: data.time_steps(),
            required: data.time_steps() + 1,
        });
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut network = LstmNetwork::new(config.units, &mut rng);
    let mut adam = Adam::new(config.units, config.learning_rate);

    let started = Instant::now();
    let mut indices: Vec<usize> = (0..samples).collect();
    let mut epoch_loss = f64::INFINITY;
    let mut epochs_run = 0;
    let mut stopped_early = false;
    let mut hit_time_budget = false;

    info!(
        "training LSTM: {} samples, {} units, up to {} epochs",
        samples, config.units, config.epochs
    );

    for epoch in 0..config.epochs {
        indices.shuffle(&mut rng);
        let mut total_loss = 0.0;

        for batch in indices.chunks(config.batch_size) {
            let mut grads = LstmGradients::zeros(config.units);
            for &i in batch {
                let window: Vec<f64> = data.x.row(i).to_vec();
                let cache = network.forward_cached(&window);
                let err = cache.output - data.y[i];
                total_loss += err * err;
                let sample_grads = network.backward(&cache, 2.0 * err / batch.len() as f64);
                grads.accumulate(&sample_grads);
            }

            let norm = grads.global_norm();
            if norm > MAX_GRAD_NORM {
                grads.scale(MAX_GRAD_NORM / norm);
            }
            let deltas = adam.step(&grads);
            network.apply_deltas(&deltas);
        }

        epoch_loss = total_loss / samples as f64;
        epochs_run = epoch + 1;

        if !epoch_loss.is_finite() {
            return Err(ForecastError::TrainingDivergence { epoch: epochs_run });
        }
        if epoch % 50 == 0 {
            debug!("epoch {}: loss {:.6}", epochs_run, epoch_loss);
        }
        if epoch_loss <= config.loss_threshold {
            info!(
                "early stop at epoch {}: loss {:.4} <= {:.4}",
                epochs_run, epoch_loss, config.loss_threshold
            );
            stopped_early = true;
            break;
        }
        if let Some(budget) = config.max_duration {
            if started.elapsed() >= budget {
                warn!(
                    "training time budget exhausted after {} epochs (loss {:.4})",
                    epochs_run, epoch_loss
                );
                hit_time_budget = true;
                break;
            }
        }
    }

    Ok(TrainingReport {
        network,
        final_loss: epoch_loss,
        epochs_run,
        stopped_early,
        hit_time_budget,
    })
}

/// Adam optimizer state shaped like the network gradients
struct Adam {
    m: LstmGradients,
    v: LstmGradients,
    t: i32,
    learning_rate: f64,
}

impl Adam {
    fn new(units: usize, learning_rate: f64) -> Self {
        Self {
            m: LstmGradients::zeros(units),
            v: LstmGradients::zeros(units),
            t: 0,
            learning_rate,
        }
    }

    /// Advance one step and return the parameter deltas to subtract
    fn step(&mut self, grads: &LstmGradients) -> LstmGradients {
        self.t += 1;
        let lr_t = self.learning_rate * (1.0 - BETA2.powi(self.t)).sqrt()
            / (1.0 - BETA1.powi(self.t));

        let mut deltas = LstmGradients::zeros(self.m.w_input.len());

        macro_rules! update {
            ($($field:ident),+ $(,)?) => {$(
                ndarray::Zip::from(&mut self.m.$field)
                    .and(&mut self.v.$field)
                    .and(&grads.$field)
                    .and(&mut deltas.$field)
                    .for_each(|m, v, &g, d| {
                        *m = BETA1 * *m + (1.0 - BETA1) * g;
                        *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                        *d = lr_t * *m / (v.sqrt() + ADAM_EPS);
                    });
            )+};
        }

        update!(
            w_input, u_input, b_input, w_forget, u_forget, b_forget, w_output, u_output, b_output,
            w_cell, u_cell, b_cell, w_dense,
        );

        self.m.b_dense = BETA1 * self.m.b_dense + (1.0 - BETA1) * grads.b_dense;
        self.v.b_dense = BETA2 * self.v.b_dense + (1.0 - BETA2) * grads.b_dense * grads.b_dense;
        deltas.b_dense = lr_t * self.m.b_dense / (self.v.b_dense.sqrt() + ADAM_EPS);

        deltas
    }
}
