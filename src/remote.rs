//! The geometry handed to a remote geospatial analysis service.
//!
//! Serialises to the argument object of the service's geometry constructor:
//! `{"geoJson": {...}, "proj": "EPSG:4326", "geodesic": true}`. `geodesic` is
//! omitted when the caller leaves the choice to the service.

use serde::Serialize;

use crate::crs::WGS84;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteGeometry {
    geo_json: geojson::Geometry,
    proj: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    geodesic: Option<bool>,
}

impl RemoteGeometry {
    /// Wraps a geometry whose coordinates are already lon/lat WGS84.
    pub fn new(geometry: &geo::Geometry<f64>, geodesic: Option<bool>) -> Self {
        RemoteGeometry {
            geo_json: geojson::Geometry::new(geojson::Value::from(geometry)),
            proj: WGS84,
            geodesic,
        }
    }

    pub fn geometry(&self) -> &geojson::Geometry {
        &self.geo_json
    }

    pub fn proj(&self) -> &str {
        self.proj
    }

    pub fn geodesic(&self) -> Option<bool> {
        self.geodesic
    }

    pub fn into_geometry(self) -> geojson::Geometry {
        self.geo_json
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
