use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("record for {table} is missing grain column {column}")]
    MissingGrainColumn { table: String, column: String },
    #[error("{table} has no column named {column}")]
    UnknownColumn { table: String, column: String },
    #[error("unknown export hook {0}")]
    UnknownHook(String),
    #[error("metric value isn't JSON-representable: {0}")]
    InvalidMetricValue(String),
    #[error("export failed: {0}")]
    Export(String),
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn export(message: impl Into<String>) -> Self {
        Self::Export(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
