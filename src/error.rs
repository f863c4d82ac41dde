use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("time range is inverted: from {from} is after to {to}")]
    InvertedRange { from: String, to: String },
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read CSV input: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV input has no header row")]
    MissingHeader,
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
