use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use geo::Geometry;
use geojson::{GeoJson, JsonObject, Value as GeoJsonValue};
use serde_json::{Number, Value};
use shapefile::dbase::{self, FieldValue};
use shapefile::{Shape, ShapeReader};

use crate::crs::{self, Crs};
use crate::error::{Error, Result};
use crate::gpkg;
use crate::options::LoadOptions;
use crate::table::{Feature, FeatureTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Shapefile,
    GeoJSON,
    GeoPackage,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("shp") => Ok(InputFormat::Shapefile),
            Some("geojson") | Some("json") => Ok(InputFormat::GeoJSON),
            Some("gpkg") => Ok(InputFormat::GeoPackage),
            Some(other) => Err(Error::UnsupportedFormat(format!(
                ".{other} ({})",
                path.display()
            ))),
            None => Err(Error::UnsupportedFormat(format!(
                "no file extension ({})",
                path.display()
            ))),
        }
    }
}

/// Reads every feature of a file in its native CRS.
pub fn read_feature_table(path: &Path, options: &LoadOptions) -> Result<FeatureTable> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let format = InputFormat::from_path(path)?;
    tracing::info!("Loading file: {}", path.display());

    let (declared_crs, features) = match format {
        InputFormat::Shapefile => (crs::read_prj(path)?, read_shapefile(path)?),
        InputFormat::GeoJSON => read_geojson(path)?,
        InputFormat::GeoPackage => gpkg::read_geopackage(path, options.layer.as_deref())?,
    };

    let crs = options
        .source_crs
        .clone()
        .or(declared_crs)
        .ok_or_else(|| Error::MissingCrs(path.to_path_buf()))?;

    tracing::info!(
        "Loaded {} features from {} (crs {})",
        features.len(),
        path.display(),
        crs
    );
    Ok(FeatureTable::new(crs, features))
}

fn read_shapefile(path: &Path) -> Result<Vec<Feature>> {
    let shape_reader = ShapeReader::from_path(path)?;
    let dbf_path = path.with_extension("dbf");
    if !dbf_path.exists() {
        return Err(Error::NotFound(dbf_path));
    }
    let dbf_reader = dbase::Reader::from_path(&dbf_path)
        .map_err(shapefile::Error::from)?;
    let fields = dbf_reader.fields().to_vec();
    let total_features = dbf_reader.header().num_records as usize;
    tracing::debug!(
        "Found {} records with {} attribute fields",
        total_features,
        fields.len()
    );

    let mut reader = shapefile::Reader::new(shape_reader, dbf_reader);
    let mut features = Vec::with_capacity(total_features);

    for (feature_count, shape_and_record) in reader.iter_shapes_and_records().enumerate() {
        if (feature_count + 1) % 1000 == 0 {
            tracing::debug!("Processing feature {}/{}", feature_count + 1, total_features);
        }
        let (shape, record) = shape_and_record?;

        let geometry = shape_to_geometry(feature_count, shape)?;

        let mut properties = JsonObject::new();
        for field in &fields {
            let name = field.name();
            let value = record.get(name).map(field_value_to_json).unwrap_or(Value::Null);
            properties.insert(name.to_string(), value);
        }

        features.push(Feature::new(geometry, properties));
    }

    Ok(features)
}

// Null shapes carry no geometry but still hold a record.
fn shape_to_geometry(feature: usize, shape: Shape) -> Result<Option<Geometry<f64>>> {
    match shape {
        Shape::NullShape => Ok(None),
        shape => Geometry::<f64>::try_from(shape)
            .map(Some)
            .map_err(|e| Error::InvalidGeometry {
                feature,
                reason: e.to_string(),
            }),
    }
}

fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Character(v) => v.clone().map(Value::String).unwrap_or(Value::Null),
        FieldValue::Memo(v) => Value::String(v.clone()),
        FieldValue::Numeric(v) => v.and_then(Number::from_f64).map_or(Value::Null, Value::Number),
        FieldValue::Float(v) => v
            .and_then(|f| Number::from_f64(f as f64))
            .map_or(Value::Null, Value::Number),
        FieldValue::Currency(v) | FieldValue::Double(v) => {
            Number::from_f64(*v).map_or(Value::Null, Value::Number)
        }
        FieldValue::Integer(v) => Value::from(*v),
        FieldValue::Logical(v) => v.map_or(Value::Null, Value::Bool),
        FieldValue::Date(v) => v.as_ref().map_or(Value::Null, |d| {
            Value::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }),
        FieldValue::DateTime(v) => Value::from(v.to_unix_timestamp()),
    }
}

// Returns the CRS declared in the document; RFC 7946 data without a legacy
// `crs` member is lon/lat WGS84.
fn read_geojson(path: &Path) -> Result<(Option<Crs>, Vec<Feature>)> {
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let geojson = GeoJson::from_reader(reader).map_err(geojson::Error::from)?;

    let (members, features) = match geojson {
        GeoJson::FeatureCollection(fc) => {
            let total_features = fc.features.len();
            tracing::debug!("Found {} features in file", total_features);
            let mut features = Vec::with_capacity(total_features);
            for (feature_count, feature) in fc.features.into_iter().enumerate() {
                if (feature_count + 1) % 1000 == 0 {
                    tracing::debug!(
                        "Processing feature {}/{}",
                        feature_count + 1,
                        total_features
                    );
                }
                features.push(convert_feature(feature)?);
            }
            (fc.foreign_members, features)
        }
        GeoJson::Feature(feature) => {
            let members = feature.foreign_members.clone();
            (members, vec![convert_feature(feature)?])
        }
        GeoJson::Geometry(geometry) => {
            let members = geometry.foreign_members.clone();
            let geometry = convert_geometry(geometry.value)?;
            (members, vec![Feature::new(Some(geometry), JsonObject::new())])
        }
    };

    let crs = crs::from_geojson_member(members.as_ref()).unwrap_or_else(Crs::wgs84);
    Ok((Some(crs), features))
}

fn convert_feature(feature: geojson::Feature) -> Result<Feature> {
    let geometry = feature
        .geometry
        .map(|geometry| convert_geometry(geometry.value))
        .transpose()?;
    Ok(Feature::new(geometry, feature.properties.unwrap_or_default()).with_id(feature.id))
}

fn convert_geometry(value: GeoJsonValue) -> Result<Geometry<f64>> {
    Ok(Geometry::<f64>::try_from(value)?)
}
