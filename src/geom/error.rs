#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Geos(#[from] geos::Error),

    #[error(transparent)]
    Geozero(#[from] geozero::error::GeozeroError),

    #[error("geometry is invalid: {0}")]
    InvalidGeometry(String),

    #[error("{0} produced an empty geometry")]
    EmptyResult(&'static str),

    #[error("{0} produced an unexpected geometry variant")]
    UnexpectedVariant(&'static str),
}
