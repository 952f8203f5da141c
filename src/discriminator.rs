use tch::{nn, Tensor};
use tracing::{debug, info};

use crate::config::DiscriminatorConfig;
use crate::error::Result;
use crate::layer::{BatchNormalization, Convolution2D, Flatten, LinearProjection, Layer, ReLUActivation};

/// The domain classifier.
///
/// Every convolution stage is `conv -> relu -> batch norm`; the last stage is flattened per
/// batch element and projected onto `nb_outputs` logits.
#[derive(Debug)]
pub struct Discriminator {
    net: Vec<Box<dyn Layer>>,
    nb_outputs: i64,
}

impl Discriminator {
    pub fn new(path: &nn::Path, config: &DiscriminatorConfig) -> Result<Discriminator> {
        config.validate()?;

        let mut convs = Vec::new();
        let mut bns = Vec::new();
        let mut in_channels = config.in_channels;
        for (i, &out_channels) in config.hidden_channels.iter().enumerate() {
            convs.push(Convolution2D::new(
                path,
                &format!("cnn_{}", i + 1),
                in_channels,
                out_channels,
                config,
            ));
            bns.push(BatchNormalization::new(path, &format!("bn_{}", i + 1), out_channels, config));
            in_channels = out_channels;
        }

        let flat_features = config.flat_features();
        let linear = LinearProjection::new(path, "linear_1", flat_features, config.nb_outputs);

        let mut net: Vec<Box<dyn Layer>> = Vec::new();
        for (i, (conv, bn)) in convs.into_iter().zip(bns).enumerate() {
            net.push(Box::new(conv));
            net.push(Box::new(ReLUActivation::new(&format!("relu_{}", i + 1))));
            net.push(Box::new(bn));
        }
        net.push(Box::new(Flatten::new("flatten")));
        net.push(Box::new(linear));

        info!(
            stages = config.hidden_channels.len(),
            flat_features,
            nb_outputs = config.nb_outputs,
            "built discriminator"
        );
        Ok(Discriminator { net, nb_outputs: config.nb_outputs })
    }

    pub fn nb_outputs(&self) -> i64 {
        self.nb_outputs
    }

    /// The pipeline in evaluation order.
    pub fn layers(&self) -> impl Iterator<Item = &dyn Layer> {
        self.net.iter().map(|layer| layer.as_ref())
    }

    /// Runs the pipeline in inference mode on an (N, C, H, W) batch and returns
    /// (N, nb_outputs) logits. Batch normalization uses its running statistics.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.run(xs, false, |_, _| {})
    }

    /// Training-mode forward pass: batch normalization uses batch statistics and updates its
    /// running statistics, hence `&mut self`.
    pub fn forward_train(&mut self, xs: &Tensor) -> Result<Tensor> {
        self.run(xs, true, |_, _| {})
    }

    /// Like [`Discriminator::forward`], calling `inspect` with every intermediate output.
    pub fn forward_inspect<F>(&self, xs: &Tensor, inspect: F) -> Result<Tensor>
    where
        F: FnMut(&dyn Layer, &Tensor),
    {
        self.run(xs, false, inspect)
    }

    fn run<F>(&self, xs: &Tensor, train: bool, mut inspect: F) -> Result<Tensor>
    where
        F: FnMut(&dyn Layer, &Tensor),
    {
        let mut xs = xs.shallow_clone();
        for layer in self.net.iter() {
            xs = layer.apply(&xs, train)?;
            debug!(layer = layer.name(), shape = ?xs.size(), train, "layer output");
            inspect(layer.as_ref(), &xs);
        }
        Ok(xs)
    }
}

/// Inference-mode evaluation, so `xs.apply(&net)` and `xs.apply_t(&net, train)` never touch
/// the running statistics; use [`Discriminator::forward_train`] for that.
///
/// # Panics
///
/// Panics when the input does not fit the network, as tch's own layers do. Use
/// [`Discriminator::forward`] to get the error instead.
impl nn::Module for Discriminator {
    fn forward(&self, xs: &Tensor) -> Tensor {
        match Discriminator::forward(self, xs) {
            Ok(ys) => ys,
            Err(err) => panic!("discriminator forward failed: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tch::{kind, Device};

    fn build(nb_outputs: i64) -> (nn::VarStore, Discriminator) {
        let vs = nn::VarStore::new(Device::Cpu);
        let net = Discriminator::new(&vs.root(), &DiscriminatorConfig::new(nb_outputs)).unwrap();
        (vs, net)
    }

    #[test]
    fn layer_order() {
        let (_vs, net) = build(4);
        let names: Vec<_> = net.layers().map(|layer| layer.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "cnn_1", "relu_1", "bn_1", "cnn_2", "relu_2", "bn_2", "cnn_3", "relu_3", "bn_3",
                "flatten", "linear_1"
            ]
        );
    }

    #[test]
    fn variables_are_named_after_layers() {
        let (vs, _net) = build(4);
        let variables = vs.variables();
        for name in [
            "cnn_1.weight",
            "cnn_3.bias",
            "bn_2.running_mean",
            "bn_3.running_var",
            "linear_1.weight",
            "linear_1.bias",
        ] {
            assert!(variables.contains_key(name), "missing {name}");
        }
        assert_eq!(variables["linear_1.weight"].size(), vec![4, 192]);
        assert_eq!(variables["cnn_1.weight"].size(), vec![64, 128, 3, 3]);
    }

    #[test]
    fn output_shape() {
        let (_vs, net) = build(10);
        let ys = net.forward(&Tensor::randn([1, 128, 3, 4], kind::FLOAT_CPU)).unwrap();
        assert_eq!(ys.size(), vec![1, 10]);
    }

    #[test]
    fn relu_outputs_are_non_negative() {
        let (_vs, net) = build(3);
        let xs = Tensor::randn([4, 128, 3, 4], kind::FLOAT_CPU);
        let mut seen = 0;
        net.forward_inspect(&xs, |layer, ys| {
            if layer.kind() == "ReLUActivation" {
                seen += 1;
                assert!(ys.min().double_value(&[]) >= 0.0, "{} went negative", layer.name());
            }
        })
        .unwrap();
        assert_eq!(seen, 3);
    }

    #[test]
    fn wrong_spatial_size_fails_at_projection() {
        let (_vs, net) = build(10);
        let err = net.forward(&Tensor::randn([1, 128, 4, 4], kind::FLOAT_CPU)).unwrap_err();
        match err {
            Error::ShapeMismatch { layer, expected, actual, .. } => {
                assert_eq!(layer, "linear_1");
                assert_eq!((expected, actual), (192, 256));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_zero_outputs() {
        let vs = nn::VarStore::new(Device::Cpu);
        let err = Discriminator::new(&vs.root(), &DiscriminatorConfig::new(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
    }

    #[test]
    fn module_t_matches_fallible_forward() {
        let (_vs, net) = build(2);
        let xs = Tensor::randn([2, 128, 3, 4], kind::FLOAT_CPU);
        let ys = xs.apply_t(&net, false);
        assert!(ys.equal(&net.forward(&xs).unwrap()));
    }

    #[test]
    fn running_statistics_only_move_through_forward_train() {
        let (vs, mut net) = build(2);
        let xs = Tensor::randn([8, 128, 3, 4], kind::FLOAT_CPU) + 1.0;
        let running_mean = || vs.variables()["bn_1.running_mean"].copy();
        let before = running_mean();

        // Shared-reference paths, including tch's training flag, stay in inference mode.
        let _ = xs.apply_t(&net, true);
        let _ = xs.apply(&net);
        net.forward(&xs).unwrap();
        net.forward_inspect(&xs, |_, _| {}).unwrap();
        assert!(running_mean().equal(&before));

        net.forward_train(&xs).unwrap();
        assert!(!running_mean().equal(&before));
    }
}
