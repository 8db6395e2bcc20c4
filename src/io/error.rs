#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Geom(#[from] crate::geom::Error),

    #[error(transparent)]
    Wkb(#[from] geozero::error::GeozeroError),

    #[error("missing column {0}")]
    MissingColumn(&'static str),

    #[error("column {0} has an unexpected data type")]
    UnexpectedColumnType(&'static str),
}
