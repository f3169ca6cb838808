//! Decision-transformer training loop.
//!
//! Consumes windowed trajectory samples in shuffled batches, trains the
//! policy with a masked action-regression loss, synchronizes workers after
//! every optimization step, and on the save cadence checkpoints from the
//! primary worker and runs evaluation rollouts. Evaluation failures are
//! absorbed here — a broken rollout is reported and skipped, never allowed
//! to take down the training run.

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::checkpoint::Checkpointer;
use crate::config::TrainerConfig;
use crate::data::dataset::{Dataset, EvaluationDataset, TrainingWindowDataset};
use crate::data::store::StateStore;
use crate::data::window::WindowBatch;
use crate::env::ReconEnv;
use crate::metrics::{MetricsLogger, TrainingSnapshot};
use crate::policy::Policy;
use crate::rollout::RolloutDriver;
use crate::train::sync::Collective;
use crate::train::TrainError;

/// Outcome of a completed training run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    /// Epochs completed.
    pub epochs: usize,
    /// Mean masked loss of the final epoch, averaged across workers.
    pub final_loss: f32,
    /// Best mean evaluation reward observed, when any evaluation completed.
    pub best_eval_reward: Option<f32>,
}

/// Build the AdamW optimizer described by a trainer configuration.
pub fn create_optimizer<B, M>(config: &TrainerConfig) -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut adamw = AdamWConfig::new().with_weight_decay(config.weight_decay);
    if let Some(max_norm) = config.grad_clip_norm {
        adamw = adamw.with_grad_clipping(Some(GradientClippingConfig::Norm(max_norm)));
    }
    adamw.init()
}

/// Trains one policy replica; one trainer per data-parallel worker.
pub struct Trainer<B, M, O, S, E, C>
where
    B: AutodiffBackend,
    M: Policy<B> + AutodiffModule<B> + Clone,
    O: Optimizer<M, B>,
    S: StateStore,
    E: ReconEnv,
    C: Collective,
{
    config: TrainerConfig,
    model: M,
    optimizer: O,
    train_data: TrainingWindowDataset<S>,
    eval_data: EvaluationDataset,
    env: E,
    driver: RolloutDriver,
    collective: C,
    checkpointer: Option<Checkpointer>,
    logger: Box<dyn MetricsLogger>,
    device: B::Device,
    step: usize,
    windows_seen: usize,
    best_eval: Option<f32>,
}

impl<B, M, O, S, E, C> Trainer<B, M, O, S, E, C>
where
    B: AutodiffBackend,
    M: Policy<B> + AutodiffModule<B> + Clone,
    O: Optimizer<M, B>,
    S: StateStore,
    E: ReconEnv,
    C: Collective,
{
    /// Create a trainer over a validated configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TrainerConfig,
        model: M,
        optimizer: O,
        train_data: TrainingWindowDataset<S>,
        eval_data: EvaluationDataset,
        env: E,
        collective: C,
        checkpointer: Option<Checkpointer>,
        logger: Box<dyn MetricsLogger>,
        device: B::Device,
    ) -> Result<Self, TrainError> {
        config.validate().map_err(TrainError::Config)?;
        let driver = RolloutDriver::new(config.rollout()).map_err(TrainError::Config)?;
        Ok(Self {
            config,
            model,
            optimizer,
            train_data,
            eval_data,
            env,
            driver,
            collective,
            checkpointer,
            logger,
            device,
            step: 0,
            windows_seen: 0,
            best_eval: None,
        })
    }

    /// Run the full training schedule, returning the summary and the
    /// trained policy.
    pub fn train(mut self) -> Result<(TrainingSummary, M), TrainError> {
        let mut final_loss = 0.0;
        for epoch in 1..=self.config.max_epochs {
            final_loss = self.run_epoch(epoch)?;

            if epoch % self.config.save_every == 0 {
                let eval_reward = if self.collective.is_primary() {
                    self.run_evaluation()
                } else {
                    None
                };
                if let Some(reward) = eval_reward {
                    self.logger.log(
                        &TrainingSnapshot::new(epoch, self.step, self.windows_seen, final_loss)
                            .with_eval_reward(reward),
                    );
                }
                if self.collective.is_primary() {
                    if let Some(checkpointer) = self.checkpointer.as_mut() {
                        checkpointer
                            .save(&self.model, epoch, eval_reward)
                            .map_err(TrainError::Checkpoint)?;
                    }
                }
                // Epoch boundary: nobody proceeds while the primary's
                // checkpoint is in flight.
                self.collective.barrier();
            }
        }

        self.logger.flush();
        let summary = TrainingSummary {
            epochs: self.config.max_epochs,
            final_loss,
            best_eval_reward: self.best_eval,
        };
        Ok((summary, self.model))
    }

    /// One pass over the training dataset in shuffled batches. Returns the
    /// epoch's mean loss averaged across workers.
    fn run_epoch(&mut self, epoch: usize) -> Result<f32, TrainError> {
        let mut indices: Vec<usize> = (0..self.train_data.len()).collect();
        indices.shuffle(&mut thread_rng());

        let mut epoch_loss = 0.0;
        let mut batches = 0usize;

        for chunk in indices.chunks(self.config.batch_size) {
            let mut samples = Vec::with_capacity(chunk.len());
            for &index in chunk {
                // A failed window request skips that sample; the failure
                // is data corruption, not something a retry would fix.
                match self.train_data.get(index) {
                    Ok(sample) => samples.push(sample),
                    Err(e) => eprintln!("[train] skipping window {}: {}", index, e),
                }
            }

            if !samples.is_empty() {
                self.windows_seen += samples.len();
                let batch = WindowBatch::from_samples(samples);
                if let Some(loss) = self.train_step(&batch) {
                    self.step += 1;
                    epoch_loss += loss;
                    batches += 1;
                    self.logger.log(&TrainingSnapshot::new(
                        epoch,
                        self.step,
                        self.windows_seen,
                        loss,
                    ));
                }
            }

            // Every worker passes the same number of sync points per
            // epoch, batches skipped or not.
            self.collective.sync_step();
        }

        if batches == 0 {
            return Err(TrainError::NoTrainingData);
        }

        let mut mean = [epoch_loss / batches as f32];
        self.collective.all_reduce(&mut mean);
        Ok(mean[0])
    }

    /// One optimization step on a batch. Returns `None` when the batch has
    /// no valid positions or the loss is unusable; the batch is then
    /// skipped outright — gradients are never zero-filled in its place.
    fn train_step(&mut self, batch: &WindowBatch) -> Option<f32> {
        let valid = batch.valid_count();
        if valid == 0 {
            return None;
        }

        let tensors = batch.to_tensors::<B>(&self.device);
        let targets = tensors.actions.clone();
        let output = self.model.forward(
            tensors.returns,
            tensors.states,
            tensors.timesteps,
            Some(tensors.actions),
            tensors.tasks,
        );

        // Mean squared error over valid positions only; padding
        // contributes nothing to the loss.
        let mask: Tensor<B, 3> = tensors.mask.unsqueeze_dim(2);
        let squared = (output.action_preds - targets).powf_scalar(2.0).sum_dim(2);
        let denom = (valid * batch.action_dim) as f32;
        let loss = (squared * mask).sum().div_scalar(denom);

        let loss_value = loss.clone().into_scalar().elem::<f32>();
        if !loss_value.is_finite() {
            eprintln!("[train] skipping batch: non-finite loss {}", loss_value);
            return None;
        }

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self
            .optimizer
            .step(self.config.learning_rate, self.model.clone(), grads);
        Some(loss_value)
    }

    /// Evaluation rollouts over every case, reporting the mean final
    /// reward. Per-case failures are logged and skipped: evaluation can
    /// degrade, but it cannot crash the training run.
    fn run_evaluation(&mut self) -> Option<f32> {
        let mut total = 0.0;
        let mut completed = 0usize;

        for index in 0..self.eval_data.len() {
            let seed = match self.eval_data.get(index) {
                Ok(seed) => seed,
                Err(e) => {
                    eprintln!("[eval] skipping case {}: {}", index, e);
                    continue;
                }
            };
            match self.driver.run::<B, _, _>(
                &self.model,
                &mut self.env,
                self.eval_data.case(index),
                &seed,
                &self.device,
            ) {
                Ok(report) => {
                    total += report.final_reward;
                    completed += 1;
                }
                Err(e) => eprintln!("[eval] rollout for case {} failed: {}", index, e),
            }
        }

        if completed == 0 {
            return None;
        }
        let mean = total / completed as f32;
        self.best_eval = Some(self.best_eval.map_or(mean, |best| best.max(mean)));
        Some(mean)
    }
}
