//! The building blocks of the discriminator pipeline.
//!
//! Each layer checks the shape of its input before handing it to libtorch, so a
//! mis-sized feature map surfaces as an [`Error`] naming the offending layer instead of
//! an opaque torch exception.
use tch::{nn, Tensor};

use crate::config::DiscriminatorConfig;
use crate::error::{Error, Result};

/// One step of a feed-forward pipeline.
pub trait Layer: std::fmt::Debug + Send {
    /// Name under which the layer's variables live in the var store.
    fn name(&self) -> &str;

    /// Short type tag, e.g. `"Convolution2D"`.
    fn kind(&self) -> &'static str;

    /// Evaluates the layer. `train` only matters for layers that keep running statistics.
    fn apply(&self, xs: &Tensor, train: bool) -> Result<Tensor>;
}

fn check_rank(layer: &str, xs: &Tensor, rank: usize) -> Result<Vec<i64>> {
    let size = xs.size();
    if size.len() != rank {
        return Err(Error::Rank {
            layer: layer.to_string(),
            expected: rank,
            actual: size.len(),
        });
    }
    Ok(size)
}

fn check_dim(layer: &str, what: &'static str, expected: i64, actual: i64) -> Result<()> {
    if expected != actual {
        return Err(Error::ShapeMismatch {
            layer: layer.to_string(),
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

#[derive(Debug)]
pub struct Convolution2D {
    name: String,
    conv: nn::Conv2D,
    in_channels: i64,
    stride: i64,
    padding: i64,
}

impl Convolution2D {
    pub fn new(
        path: &nn::Path,
        name: &str,
        in_channels: i64,
        out_channels: i64,
        config: &DiscriminatorConfig,
    ) -> Convolution2D {
        let conv = nn::conv2d(
            path / name,
            in_channels,
            out_channels,
            config.kernel_size,
            nn::ConvConfig {
                stride: config.stride,
                padding: config.padding,
                ..Default::default()
            },
        );
        Convolution2D {
            name: name.to_string(),
            conv,
            in_channels,
            stride: config.stride,
            padding: config.padding,
        }
    }
}

impl Layer for Convolution2D {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Convolution2D"
    }

    fn apply(&self, xs: &Tensor, _train: bool) -> Result<Tensor> {
        let size = check_rank(&self.name, xs, 4)?;
        check_dim(&self.name, "input channels", self.in_channels, size[1])?;
        let ys = xs.f_conv2d(
            &self.conv.ws,
            self.conv.bs.as_ref(),
            [self.stride, self.stride],
            [self.padding, self.padding],
            [1, 1],
            1,
        )?;
        Ok(ys)
    }
}

/// Elementwise `max(x, 0)`.
#[derive(Debug)]
pub struct ReLUActivation {
    name: String,
}

impl ReLUActivation {
    pub fn new(name: &str) -> ReLUActivation {
        ReLUActivation { name: name.to_string() }
    }
}

impl Layer for ReLUActivation {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "ReLUActivation"
    }

    fn apply(&self, xs: &Tensor, _train: bool) -> Result<Tensor> {
        Ok(xs.f_relu()?)
    }
}

/// Per-channel batch normalization over a 4-d feature map.
///
/// In training mode the batch statistics are used and the running mean/variance are
/// updated in place; otherwise the running statistics are used and left untouched.
#[derive(Debug)]
pub struct BatchNormalization {
    name: String,
    bn: nn::BatchNorm,
    num_features: i64,
    momentum: f64,
    eps: f64,
}

impl BatchNormalization {
    pub fn new(
        path: &nn::Path,
        name: &str,
        num_features: i64,
        config: &DiscriminatorConfig,
    ) -> BatchNormalization {
        let bn = nn::batch_norm2d(
            path / name,
            num_features,
            nn::BatchNormConfig {
                momentum: config.bn_momentum,
                eps: config.bn_eps,
                ..Default::default()
            },
        );
        BatchNormalization {
            name: name.to_string(),
            bn,
            num_features,
            momentum: config.bn_momentum,
            eps: config.bn_eps,
        }
    }

    pub fn running_mean(&self) -> &Tensor {
        &self.bn.running_mean
    }
}

impl Layer for BatchNormalization {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "BatchNormalization"
    }

    fn apply(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let size = check_rank(&self.name, xs, 4)?;
        check_dim(&self.name, "channels", self.num_features, size[1])?;
        let ys = xs.f_batch_norm(
            self.bn.ws.as_ref(),
            self.bn.bs.as_ref(),
            Some(&self.bn.running_mean),
            Some(&self.bn.running_var),
            train,
            self.momentum,
            self.eps,
            true,
        )?;
        Ok(ys)
    }
}

/// Reshapes (N, ...) into (N, features), keeping batch order.
#[derive(Debug)]
pub struct Flatten {
    name: String,
}

impl Flatten {
    pub fn new(name: &str) -> Flatten {
        Flatten { name: name.to_string() }
    }
}

impl Layer for Flatten {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Flatten"
    }

    fn apply(&self, xs: &Tensor, _train: bool) -> Result<Tensor> {
        if xs.dim() < 2 {
            return Err(Error::Rank {
                layer: self.name.clone(),
                expected: 2,
                actual: xs.dim(),
            });
        }
        Ok(xs.f_flatten(1, -1)?)
    }
}

#[derive(Debug)]
pub struct LinearProjection {
    name: String,
    linear: nn::Linear,
    in_features: i64,
}

impl LinearProjection {
    pub fn new(path: &nn::Path, name: &str, in_features: i64, out_features: i64) -> LinearProjection {
        let linear = nn::linear(path / name, in_features, out_features, Default::default());
        LinearProjection {
            name: name.to_string(),
            linear,
            in_features,
        }
    }
}

impl Layer for LinearProjection {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "LinearProjection"
    }

    fn apply(&self, xs: &Tensor, _train: bool) -> Result<Tensor> {
        let size = check_rank(&self.name, xs, 2)?;
        check_dim(&self.name, "input features", self.in_features, size[1])?;
        Ok(xs.f_linear(&self.linear.ws, self.linear.bs.as_ref())?)
    }
}
