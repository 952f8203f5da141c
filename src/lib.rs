//! A convolutional domain classifier for domain-adversarial training, built on tch.
//!
//! ```rust,no_run
//! use domain_discriminator::{DiscriminatorConfig, DiscriminatorModel};
//! use tch::{kind, Device, Tensor};
//!
//! fn main() -> domain_discriminator::Result<()> {
//!     let model = DiscriminatorModel::new(Device::Cpu, DiscriminatorConfig::new(10))?;
//!     let logits = model.predict(&Tensor::randn([1, 128, 3, 4], kind::FLOAT_CPU))?;
//!     assert_eq!(logits.size(), vec![1, 10]);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discriminator;
pub mod error;
pub mod layer;
pub mod model;

pub use config::{DiscriminatorConfig, FLAT_FEATURES};
pub use discriminator::Discriminator;
pub use error::{Error, Result};
pub use layer::Layer;
pub use model::DiscriminatorModel;
