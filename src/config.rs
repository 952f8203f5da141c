use crate::error::{Error, Result};

/// Width of the projection input for the default configuration:
/// 16 channels over a 3x4 feature map.
pub const FLAT_FEATURES: i64 = 192;

/// Shape and hyper-parameters of the discriminator.
///
/// The projection width is not stored; it is derived from the input size and the
/// convolution stack by [`DiscriminatorConfig::flat_features`], so the two cannot drift apart.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscriminatorConfig {
    pub in_channels: i64,
    pub hidden_channels: Vec<i64>,
    pub kernel_size: i64,
    pub stride: i64,
    pub padding: i64,
    pub input_height: i64,
    pub input_width: i64,
    pub nb_outputs: i64,
    pub bn_momentum: f64,
    pub bn_eps: f64,
}

impl DiscriminatorConfig {
    pub fn new(nb_outputs: i64) -> Self {
        DiscriminatorConfig {
            in_channels: 128,
            hidden_channels: vec![64, 32, 16],
            kernel_size: 3,
            stride: 1,
            padding: 1,
            input_height: 3,
            input_width: 4,
            nb_outputs,
            bn_momentum: 0.1,
            bn_eps: 1e-5,
        }
    }

    pub fn with_in_channels(mut self, in_channels: i64) -> Self {
        self.in_channels = in_channels;
        self
    }

    pub fn with_hidden_channels(mut self, hidden_channels: Vec<i64>) -> Self {
        self.hidden_channels = hidden_channels;
        self
    }

    pub fn with_kernel_size(mut self, kernel_size: i64) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    pub fn with_stride(mut self, stride: i64) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: i64) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_input_size(mut self, height: i64, width: i64) -> Self {
        self.input_height = height;
        self.input_width = width;
        self
    }

    pub fn with_batch_norm(mut self, momentum: f64, eps: f64) -> Self {
        self.bn_momentum = momentum;
        self.bn_eps = eps;
        self
    }

    fn conv_out(&self, x: i64) -> i64 {
        let span = x + 2 * self.padding - self.kernel_size;
        if span < 0 {
            0
        } else {
            span / self.stride + 1
        }
    }

    /// Spatial size of the last convolution's output.
    pub fn output_spatial(&self) -> (i64, i64) {
        self.hidden_channels
            .iter()
            .fold((self.input_height, self.input_width), |(h, w), _| {
                (self.conv_out(h), self.conv_out(w))
            })
    }

    /// Number of features each batch element carries into the projection.
    pub fn flat_features(&self) -> i64 {
        let (h, w) = self.output_spatial();
        self.hidden_channels.last().copied().unwrap_or(self.in_channels) * h * w
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidArgument(msg));

        if self.nb_outputs <= 0 {
            return invalid(format!("nb_outputs must be positive, got {}", self.nb_outputs));
        }
        if self.in_channels <= 0 {
            return invalid(format!("in_channels must be positive, got {}", self.in_channels));
        }
        if self.hidden_channels.is_empty() {
            return invalid("at least one convolution stage is required".to_string());
        }
        if let Some(c) = self.hidden_channels.iter().find(|&&c| c <= 0) {
            return invalid(format!("hidden channel counts must be positive, got {c}"));
        }
        if self.kernel_size <= 0 || self.stride <= 0 {
            return invalid(format!(
                "kernel size and stride must be positive, got {} and {}",
                self.kernel_size, self.stride
            ));
        }
        if self.padding < 0 {
            return invalid(format!("padding must not be negative, got {}", self.padding));
        }
        if self.input_height <= 0 || self.input_width <= 0 {
            return invalid(format!(
                "input size must be positive, got {}x{}",
                self.input_height, self.input_width
            ));
        }

        let (mut h, mut w) = (self.input_height, self.input_width);
        for (i, _) in self.hidden_channels.iter().enumerate() {
            h = self.conv_out(h);
            w = self.conv_out(w);
            if h <= 0 || w <= 0 {
                return invalid(format!(
                    "convolution stage {} leaves an empty {h}x{w} feature map",
                    i + 1
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.bn_momentum) {
            return invalid(format!("batch norm momentum must be in [0, 1], got {}", self.bn_momentum));
        }
        if self.bn_eps <= 0.0 {
            return invalid(format!("batch norm eps must be positive, got {}", self.bn_eps));
        }
        Ok(())
    }
}
