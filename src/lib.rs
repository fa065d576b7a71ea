use std::path::Path;

pub mod crs;
pub mod error;
pub mod gpkg;
pub mod options;
pub mod reader;
pub mod remote;
pub mod reproject;
pub mod table;
pub mod union;

pub use crs::{Crs, WGS84};
pub use error::{Error, ErrorKind, Result};
pub use options::LoadOptions;
pub use reader::{read_feature_table, InputFormat};
pub use remote::RemoteGeometry;
pub use reproject::reproject_to_wgs84;
pub use table::{Feature, FeatureTable};

/// Reads a vector file, reprojects it to EPSG:4326 and unions every feature
/// into one geometry ready for a remote analysis service.
pub fn load_as_unified_geometry(path: impl AsRef<Path>) -> Result<RemoteGeometry> {
    load_as_unified_geometry_with_options(path, &LoadOptions::default())
}

pub fn load_as_unified_geometry_with_options(
    path: impl AsRef<Path>,
    options: &LoadOptions,
) -> Result<RemoteGeometry> {
    let table = load_as_feature_table_with_options(path, options)?;
    let unified = table.unary_union()?;
    Ok(RemoteGeometry::new(&unified, options.geodesic))
}

/// Reads a vector file and reprojects it to EPSG:4326, keeping every feature
/// and its attributes.
pub fn load_as_feature_table(path: impl AsRef<Path>) -> Result<FeatureTable> {
    load_as_feature_table_with_options(path, &LoadOptions::default())
}

pub fn load_as_feature_table_with_options(
    path: impl AsRef<Path>,
    options: &LoadOptions,
) -> Result<FeatureTable> {
    let table = read_feature_table(path.as_ref(), options)?;
    reproject_to_wgs84(table)
}
