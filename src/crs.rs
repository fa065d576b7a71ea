use std::fmt;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

use geojson::JsonObject;

use crate::error::{Error, Result};

/// Authority code of the geographic longitude/latitude frame every load
/// reprojects into.
pub const WGS84: &str = "EPSG:4326";

const WGS84_ALIASES: &[&str] = &[
    "EPSG:4326",
    "OGC:CRS84",
    "urn:ogc:def:crs:EPSG::4326",
    "urn:ogc:def:crs:OGC:1.3:CRS84",
    "urn:ogc:def:crs:OGC::CRS84",
];

/// A coordinate reference system definition, in any form PROJ accepts:
/// an authority code, WKT (as found in `.prj` files) or a PROJ string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crs(String);

impl Crs {
    pub fn new(definition: impl Into<String>) -> Self {
        Crs(definition.into().trim().to_string())
    }

    pub fn wgs84() -> Self {
        Crs(WGS84.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the definition names the geographic standard frame by one of
    /// its well-known identifiers. WKT definitions are never matched here and
    /// always go through PROJ.
    pub fn is_wgs84(&self) -> bool {
        WGS84_ALIASES
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(&self.0))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // WKT can run to several kilobytes; the first line is enough for logs
        match self.0.lines().next() {
            Some(first) if first.len() < self.0.len() => write!(f, "{first}..."),
            _ => f.write_str(&self.0),
        }
    }
}

/// Reads the `.prj` sidecar next to a shapefile, if there is one.
pub fn read_prj(shp_path: &Path) -> Result<Option<Crs>> {
    let prj_path = shp_path.with_extension("prj");
    match fs::read_to_string(&prj_path) {
        Ok(contents) if contents.trim().is_empty() => Ok(None),
        Ok(contents) => Ok(Some(Crs::new(contents))),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
        Err(source) => Err(Error::Io {
            path: prj_path,
            source,
        }),
    }
}

/// Extracts a legacy (pre RFC 7946) named CRS member from a GeoJSON object:
/// `"crs": {"type": "name", "properties": {"name": "EPSG:3857"}}`.
pub fn from_geojson_member(foreign_members: Option<&JsonObject>) -> Option<Crs> {
    let crs = foreign_members?.get("crs")?;
    if crs.get("type")?.as_str()? != "name" {
        return None;
    }
    let name = crs.get("properties")?.get("name")?.as_str()?;
    Some(Crs::new(normalize_urn(name)))
}

// PROJ understands "EPSG:3857" everywhere but only some builds accept the URN.
fn normalize_urn(name: &str) -> String {
    if let Some(code) = name.strip_prefix("urn:ogc:def:crs:EPSG::") {
        return format!("EPSG:{code}");
    }
    if name.eq_ignore_ascii_case("urn:ogc:def:crs:OGC:1.3:CRS84") {
        return "OGC:CRS84".to_string();
    }
    name.to_string()
}
