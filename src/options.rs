use crate::crs::Crs;

/// Knobs for a single load. The defaults match what most callers want:
/// take the CRS from the file and let the analysis service decide on edge
/// interpolation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// CRS to assume for the input. Overrides whatever the file declares;
    /// required for shapefiles that ship without a `.prj`.
    pub source_crs: Option<Crs>,

    /// GeoPackage layer to read. `None` picks the first feature layer by
    /// table name. Ignored for other formats.
    pub layer: Option<String>,

    /// Whether the remote service should interpret polygon edges as geodesics
    /// rather than straight lines in lon/lat. `None` leaves it to the service.
    pub geodesic: Option<bool>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_crs(mut self, crs: impl Into<String>) -> Self {
        self.source_crs = Some(Crs::new(crs));
        self
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn with_geodesic(mut self, geodesic: bool) -> Self {
        self.geodesic = Some(geodesic);
        self
    }
}
