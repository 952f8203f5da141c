/// Errors raised while building or evaluating the discriminator.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{layer}: expected {expected} {what}, got {actual}")]
    ShapeMismatch {
        layer: String,
        what: &'static str,
        expected: i64,
        actual: i64,
    },

    #[error("{layer}: expected a {expected}-d input, got {actual}-d")]
    Rank {
        layer: String,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Torch(#[from] tch::TchError),
}

pub type Result<T> = std::result::Result<T, Error>;
