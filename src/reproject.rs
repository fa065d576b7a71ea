use proj::{Proj, Transform};

use crate::crs::{Crs, WGS84};
use crate::error::{Error, Result};
use crate::table::FeatureTable;

/// Reprojects every geometry of the table into lon/lat WGS84.
///
/// `Proj::new_known_crs` normalises axis order, so the output is always
/// x = longitude, y = latitude, whatever the authority's declared order.
pub fn reproject_to_wgs84(table: FeatureTable) -> Result<FeatureTable> {
    let (source, mut features) = table.into_parts();
    if source.is_wgs84() {
        tracing::debug!("Input is already {}, skipping reprojection", WGS84);
        return Ok(FeatureTable::new(Crs::wgs84(), features));
    }

    let proj = Proj::new_known_crs(source.as_str(), WGS84, None).map_err(|e| {
        Error::InvalidCrs {
            crs: source.to_string(),
            source: e,
        }
    })?;
    tracing::info!("Reprojecting {} features from {} to {}", features.len(), source, WGS84);

    for geometry in features.iter_mut().filter_map(|f| f.geometry.as_mut()) {
        geometry.transform(&proj)?;
    }

    Ok(FeatureTable::new(Crs::wgs84(), features))
}
