use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid evaluation config: {0}")]
    InvalidConfig(String),

    #[error("invalid dataset config: {0}")]
    InvalidDatasetConfig(String),

    /// The model and the dataset config disagree on the heading bins.
    #[error("heading bin {index} is out of range for {num_heading_bin} heading bins")]
    HeadingBinOutOfRange { index: i64, num_heading_bin: usize },

    #[error("size cluster {index} is out of range for {num_size_cluster} size clusters")]
    SizeClusterOutOfRange { index: i64, num_size_cluster: usize },

    #[error("class label {index} is out of range for {num_class} classes")]
    ClassOutOfRange { index: i64, num_class: usize },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("batch is missing `{0}`")]
    MissingField(&'static str),

    #[error("AP calculator is finalized, reset it before stepping again")]
    Finalized,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
