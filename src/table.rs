use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use geo::Geometry;
use geojson::feature::Id;
use geojson::{Feature as GeoJsonFeature, FeatureCollection, JsonObject};

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::union;

/// A single record: an optional geometry plus its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Identifier carried by the source record (GeoJSON `id`, GeoPackage
    /// primary key). Shapefile records have none.
    pub id: Option<Id>,
    pub geometry: Option<Geometry<f64>>,
    pub properties: JsonObject,
}

impl Feature {
    pub fn new(geometry: Option<Geometry<f64>>, properties: JsonObject) -> Self {
        Feature {
            id: None,
            geometry,
            properties,
        }
    }

    pub fn with_id(mut self, id: Option<Id>) -> Self {
        self.id = id;
        self
    }
}

/// An ordered collection of features sharing one coordinate reference system.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    crs: Crs,
    features: Vec<Feature>,
}

impl FeatureTable {
    pub fn new(crs: Crs, features: Vec<Feature>) -> Self {
        FeatureTable { crs, features }
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn geometries(&self) -> impl Iterator<Item = &Geometry<f64>> {
        self.features.iter().filter_map(|f| f.geometry.as_ref())
    }

    pub fn into_parts(self) -> (Crs, Vec<Feature>) {
        (self.crs, self.features)
    }

    /// Set-union of every geometry in the table, in the table's own CRS.
    pub fn unary_union(&self) -> Result<Geometry<f64>> {
        union::unary_union(self.features.iter().map(|f| f.geometry.as_ref()))
    }

    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self
            .features
            .iter()
            .map(|feature| GeoJsonFeature {
                bbox: None,
                geometry: feature
                    .geometry
                    .as_ref()
                    .map(|geom| geojson::Geometry::new(geojson::Value::from(geom))),
                id: feature.id.clone(),
                properties: Some(feature.properties.clone()),
                foreign_members: None,
            })
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }

    /// Writes the table as a pretty-printed GeoJSON FeatureCollection.
    pub fn write_geojson(&self, output_path: &Path) -> Result<()> {
        let io_err = |source| Error::Io {
            path: output_path.to_path_buf(),
            source,
        };
        let file = File::create(output_path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.to_feature_collection())
            .map_err(|e| io_err(e.into()))?;
        writer.flush().map_err(io_err)?;
        tracing::info!(
            "Written {} features to {}",
            self.features.len(),
            output_path.display()
        );
        Ok(())
    }
}
