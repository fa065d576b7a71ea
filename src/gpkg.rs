//! GeoPackage input: one feature layer of an OGC GeoPackage, read through
//! SQLite. Geometry blobs (GeoPackage header + WKB) are decoded with
//! `geozero`.

use std::path::Path;

use geo::Geometry;
use geojson::feature::Id;
use geojson::JsonObject;
use geozero::wkb::GpkgWkb;
use geozero::ToGeo;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::{Number, Value};

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::table::Feature;

// Bit of the header flags byte marking an empty geometry.
const EMPTY_GEOMETRY_FLAG: u8 = 0b0001_0000;

/// A features table registered in `gpkg_geometry_columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpkgLayer {
    pub table_name: String,
    pub geometry_column: String,
    pub srs_id: i64,
}

pub struct GeoPackage {
    conn: Connection,
}

impl GeoPackage {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(GeoPackage { conn })
    }

    /// Feature layers in table name order.
    pub fn layers(&self) -> Result<Vec<GpkgLayer>> {
        let mut stmt = self.conn.prepare(
            "SELECT g.table_name, g.column_name, g.srs_id \
             FROM gpkg_geometry_columns g \
             JOIN gpkg_contents c ON c.table_name = g.table_name \
             WHERE c.data_type = 'features' \
             ORDER BY g.table_name",
        )?;
        let layers = stmt
            .query_map([], |row| {
                Ok(GpkgLayer {
                    table_name: row.get(0)?,
                    geometry_column: row.get(1)?,
                    srs_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(layers)
    }

    /// The named layer, or the first one when no name is given.
    pub fn layer(&self, name: Option<&str>) -> Result<GpkgLayer> {
        let mut layers = self.layers()?.into_iter();
        let found = match name {
            Some(name) => layers.find(|l| l.table_name.eq_ignore_ascii_case(name)),
            None => layers.next(),
        };
        found.ok_or_else(|| Error::MissingLayer(name.map(str::to_string)))
    }

    /// CRS registered for `srs_id` in `gpkg_spatial_ref_sys`. The reserved
    /// "undefined" systems (ids 0 and -1) yield `None`.
    pub fn crs(&self, srs_id: i64) -> Result<Option<Crs>> {
        let row = self
            .conn
            .query_row(
                "SELECT organization, organization_coordsys_id, definition \
                 FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
                [srs_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.and_then(|(organization, code, definition)| {
            srs_to_crs(&organization, code, &definition)
        }))
    }

    pub fn read_features(&self, layer: &GpkgLayer) -> Result<Vec<Feature>> {
        let key = self.primary_key(&layer.table_name)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {}", quote_identifier(&layer.table_name)))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query([])?;
        let mut features = Vec::new();
        while let Some(row) = rows.next()? {
            let feature_count = features.len();
            if (feature_count + 1) % 1000 == 0 {
                tracing::debug!("Processing feature {}", feature_count + 1);
            }

            let mut id = None;
            let mut geometry = None;
            let mut properties = JsonObject::new();
            for (i, name) in columns.iter().enumerate() {
                let value = row.get_ref(i)?;
                if name.eq_ignore_ascii_case(&layer.geometry_column) {
                    geometry = decode_geometry(feature_count, value)?;
                } else if key.as_deref().is_some_and(|k| k.eq_ignore_ascii_case(name)) {
                    id = value_to_id(value);
                } else {
                    properties.insert(name.clone(), value_to_json(value));
                }
            }
            features.push(Feature::new(geometry, properties).with_id(id));
        }
        Ok(features)
    }

    fn primary_key(&self, table: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT name FROM pragma_table_info(?1) WHERE pk = 1",
                [table],
                |row| row.get(0),
            )
            .optional()?)
    }
}

/// Reads one layer of a GeoPackage with the CRS it declares.
pub fn read_geopackage(
    path: &Path,
    layer: Option<&str>,
) -> Result<(Option<Crs>, Vec<Feature>)> {
    let gpkg = GeoPackage::open(path)?;
    let layer = gpkg.layer(layer)?;
    tracing::debug!(
        "Reading layer {} (geometry column {}, srs {})",
        layer.table_name,
        layer.geometry_column,
        layer.srs_id
    );
    let crs = gpkg.crs(layer.srs_id)?;
    let features = gpkg.read_features(&layer)?;
    Ok((crs, features))
}

fn srs_to_crs(organization: &str, code: i64, definition: &str) -> Option<Crs> {
    if definition.trim().eq_ignore_ascii_case("undefined") {
        return None;
    }
    if organization.eq_ignore_ascii_case("EPSG") && code > 0 {
        return Some(Crs::new(format!("EPSG:{code}")));
    }
    Some(Crs::new(definition))
}

fn decode_geometry(feature: usize, value: ValueRef<'_>) -> Result<Option<Geometry<f64>>> {
    let blob = match value {
        ValueRef::Null => return Ok(None),
        ValueRef::Blob(blob) => blob,
        other => {
            return Err(Error::InvalidGeometry {
                feature,
                reason: format!("geometry column holds {} instead of a blob", other.data_type()),
            })
        }
    };
    if blob.get(3).is_some_and(|flags| flags & EMPTY_GEOMETRY_FLAG != 0) {
        return Ok(None);
    }
    GpkgWkb(blob)
        .to_geo()
        .map(Some)
        .map_err(|e| Error::InvalidGeometry {
            feature,
            reason: e.to_string(),
        })
}

fn value_to_id(value: ValueRef<'_>) -> Option<Id> {
    match value {
        ValueRef::Integer(i) => Some(Id::Number(i.into())),
        ValueRef::Text(text) => Some(Id::String(String::from_utf8_lossy(text).into_owned())),
        _ => None,
    }
}

// Blobs besides the geometry have no JSON form and read as null.
fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
