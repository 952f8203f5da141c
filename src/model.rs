use std::path::Path;

use tch::{nn, nn::OptimizerConfig, Device, Tensor};
use tracing::info;

use crate::config::DiscriminatorConfig;
use crate::discriminator::Discriminator;
use crate::error::Result;

/// A discriminator together with the var store that owns its parameters.
///
/// Evaluation goes through `&self`. Anything that changes the parameters or the batch-norm
/// running statistics takes `&mut self`, so sharing one model between threads while it is
/// being trained is rejected at compile time.
#[derive(Debug)]
pub struct DiscriminatorModel {
    vs: nn::VarStore,
    net: Discriminator,
    config: DiscriminatorConfig,
}

impl DiscriminatorModel {
    pub fn new(device: Device, config: DiscriminatorConfig) -> Result<DiscriminatorModel> {
        let vs = nn::VarStore::new(device);
        let net = Discriminator::new(&vs.root(), &config)?;
        let model = DiscriminatorModel { vs, net, config };
        info!(device = ?device, parameters = model.num_parameters(), "discriminator ready");
        Ok(model)
    }

    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    /// The network, for inference-mode use only: every evaluation path reachable through
    /// `&Discriminator` leaves the running statistics untouched.
    pub fn network(&self) -> &Discriminator {
        &self.net
    }

    /// Number of learnable scalars. Running statistics are not counted.
    pub fn num_parameters(&self) -> usize {
        self.vs.trainable_variables().iter().map(|t| t.numel()).sum()
    }

    /// Inference-mode forward pass. The graph is kept so gradients can flow back into
    /// whatever produced `xs`.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.net.forward(&xs.to_device(self.device()))
    }

    /// Inference-mode forward pass without autograd.
    pub fn predict(&self, xs: &Tensor) -> Result<Tensor> {
        tch::no_grad(|| self.forward(xs))
    }

    /// Training-mode forward pass; updates the batch-norm running statistics.
    pub fn forward_train(&mut self, xs: &Tensor) -> Result<Tensor> {
        let xs = xs.to_device(self.device());
        self.net.forward_train(&xs)
    }

    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.vs.save(path)?;
        Ok(())
    }

    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.vs.load(path)?;
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.vs.freeze();
    }

    pub fn unfreeze(&mut self) {
        self.vs.unfreeze();
    }

    pub fn build_optimizer<C: OptimizerConfig>(&self, config: C, lr: f64) -> Result<nn::Optimizer> {
        Ok(config.build(&self.vs, lr)?)
    }

    /// Applies one optimizer step for `loss` to this model's parameters.
    pub fn backward_step(&mut self, opt: &mut nn::Optimizer, loss: &Tensor) {
        opt.backward_step(loss);
    }

    /// Runs `f` on the var store with gradient tracking disabled.
    pub fn update_parameters<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut nn::VarStore) -> Result<T>,
    {
        tch::no_grad(|| f(&mut self.vs))
    }
}
