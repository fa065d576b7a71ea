//! Defines [`Error`], representing all errors returned by this crate.

use std::path::PathBuf;
use thiserror::Error;

/// The two broad failure classes a caller has to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input could not be read: missing file, corrupt or unsupported
    /// format, or a coordinate reference system that cannot be resolved.
    Read,
    /// The features were read but their geometries could not be reprojected
    /// or unioned.
    Geometry,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Shapefile(#[from] shapefile::Error),

    #[error(transparent)]
    GeoJson(#[from] geojson::Error),

    #[error("GeoPackage error: {0}")]
    GeoPackage(#[from] rusqlite::Error),

    #[error("GeoPackage has no feature layer{}", .0.as_ref().map(|name| format!(" named {name}")).unwrap_or_default())]
    MissingLayer(Option<String>),

    /// The input carries no coordinate reference system and none was supplied.
    #[error("No coordinate reference system found for {}; supply one explicitly", .0.display())]
    MissingCrs(PathBuf),

    #[error("Cannot build a transformation from {crs}: {source}")]
    InvalidCrs {
        crs: String,
        #[source]
        source: proj::ProjCreateError,
    },

    #[error(transparent)]
    Projection(#[from] proj::ProjError),

    #[error("Invalid geometry in feature {feature}: {reason}")]
    InvalidGeometry { feature: usize, reason: String },

    #[error("Feature table contains no geometries to union")]
    EmptyUnion,

    #[error("Union failed: {0}")]
    Union(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_)
            | Error::Io { .. }
            | Error::UnsupportedFormat(_)
            | Error::Shapefile(_)
            | Error::GeoJson(_)
            | Error::GeoPackage(_)
            | Error::MissingLayer(_)
            | Error::MissingCrs(_)
            | Error::InvalidCrs { .. } => ErrorKind::Read,
            Error::Projection(_)
            | Error::InvalidGeometry { .. }
            | Error::EmptyUnion
            | Error::Union(_) => ErrorKind::Geometry,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
