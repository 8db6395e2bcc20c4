use crate::parcel::ParcelKey;

/// Top level error for a run of the merge engine.
///
/// Composes the per-module error enums (`geom::Error`, `io::Error`, ...)
/// into one enum at the boundary it is returned across; every variant here
/// maps to one of the exit codes in the run configuration's documentation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Geom(#[from] crate::geom::Error),

    #[error(transparent)]
    Io(#[from] crate::io::Error),

    #[error(transparent)]
    Ols(#[from] crate::ols::Error),

    #[error("missing mandatory column: {0}")]
    MissingColumn(&'static str),

    #[error("parcel {0:?} has non-positive land_area_sqft")]
    NonPositiveLandArea(ParcelKey),

    #[error("parcel {0:?} has no built_area donors within the parcel table")]
    NoBuiltAreaDonors(ParcelKey),

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Process exit code this error should surface as, per the run's error
    /// handling design: schema/validity failures are distinguished from I/O
    /// failures so a caller scripting around the binary can tell them apart.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Io(_) => 3,
            Error::Geom(crate::geom::Error::InvalidGeometry(_)) => 2,
            Error::MissingColumn(_)
            | Error::NonPositiveLandArea(_)
            | Error::NoBuiltAreaDonors(_)
            | Error::InvalidConfig(_) => 2,
            _ => 1,
        }
    }
}
