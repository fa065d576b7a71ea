use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use geo::{polygon, Area, Geometry};
use geozero::{CoordDimensions, ToWkb};
use rusqlite::Connection;
use serde_json::{json, Value};
use shape_loader::{
    load_as_feature_table, load_as_feature_table_with_options, load_as_unified_geometry,
    load_as_unified_geometry_with_options, Error, ErrorKind, LoadOptions, WGS84,
};
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::{Point, PolygonRing};
use tempfile::TempDir;

fn square(x: f64, y: f64, size: f64) -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [x, y], [x + size, y], [x + size, y + size], [x, y + size], [x, y]
        ]]
    })
}

fn write_geojson(dir: &TempDir, name: &str, geometries: &[Value], extra: Value) -> PathBuf {
    let features: Vec<Value> = geometries
        .iter()
        .enumerate()
        .map(|(i, geometry)| {
            json!({
                "type": "Feature",
                "properties": {"id": i, "name": format!("parcel-{i}")},
                "geometry": geometry
            })
        })
        .collect();
    let mut doc = json!({"type": "FeatureCollection", "features": features});
    if let (Some(doc), Some(extra)) = (doc.as_object_mut(), extra.as_object()) {
        doc.extend(extra.clone());
    }
    let path = dir.path().join(name);
    std::fs::write(&path, doc.to_string()).unwrap();
    path
}

fn unified(path: &Path) -> Geometry<f64> {
    let remote = load_as_unified_geometry(path).unwrap();
    Geometry::<f64>::try_from(remote.into_geometry().value).unwrap()
}

fn write_shapefile(dir: &TempDir, name: &str, squares: &[(f64, f64, f64)]) -> PathBuf {
    let path = dir.path().join(name);
    let table_builder = TableWriterBuilder::new()
        .add_character_field(FieldName::try_from("name").unwrap(), 32)
        .add_numeric_field(FieldName::try_from("rank").unwrap(), 10, 0);
    let mut writer = shapefile::Writer::from_path(&path, table_builder).unwrap();

    for (i, &(x, y, size)) in squares.iter().enumerate() {
        let polygon = shapefile::Polygon::new(PolygonRing::Outer(vec![
            Point::new(x, y),
            Point::new(x, y + size),
            Point::new(x + size, y + size),
            Point::new(x + size, y),
            Point::new(x, y),
        ]));
        let mut record = Record::default();
        record.insert(
            "name".to_string(),
            FieldValue::Character(Some(format!("block-{i}"))),
        );
        record.insert("rank".to_string(), FieldValue::Numeric(Some(i as f64)));
        writer.write_shape_and_record(&polygon, &record).unwrap();
    }
    drop(writer);
    path
}

// `srs` is (srs_id, organization, organization_coordsys_id, definition).
fn write_geopackage(
    dir: &TempDir,
    name: &str,
    srs: (i64, &str, i64, &str),
    squares: &[(f64, f64, f64)],
) -> PathBuf {
    let path = dir.path().join(name);
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE gpkg_spatial_ref_sys (
             srs_name TEXT NOT NULL, srs_id INTEGER PRIMARY KEY,
             organization TEXT NOT NULL, organization_coordsys_id INTEGER NOT NULL,
             definition TEXT NOT NULL, description TEXT);
         CREATE TABLE gpkg_contents (
             table_name TEXT NOT NULL PRIMARY KEY, data_type TEXT NOT NULL);
         CREATE TABLE gpkg_geometry_columns (
             table_name TEXT NOT NULL, column_name TEXT NOT NULL,
             geometry_type_name TEXT NOT NULL, srs_id INTEGER NOT NULL,
             z TINYINT NOT NULL, m TINYINT NOT NULL);
         INSERT INTO gpkg_contents VALUES ('blocks', 'features');
         CREATE TABLE blocks (fid INTEGER PRIMARY KEY, geom BLOB, name TEXT);",
    )
    .unwrap();
    let (srs_id, organization, code, definition) = srs;
    conn.execute(
        "INSERT INTO gpkg_spatial_ref_sys VALUES ('fixture', ?1, ?2, ?3, ?4, NULL)",
        rusqlite::params![srs_id, organization, code, definition],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO gpkg_geometry_columns VALUES ('blocks', 'geom', 'POLYGON', ?1, 0, 0)",
        [srs_id],
    )
    .unwrap();

    for (i, &(x, y, size)) in squares.iter().enumerate() {
        let polygon: Geometry<f64> = geo::polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size)
        ]
        .into();
        let blob = polygon
            .to_gpkg_wkb(CoordDimensions::xy(), Some(srs_id as i32), Vec::new())
            .unwrap();
        conn.execute(
            "INSERT INTO blocks (geom, name) VALUES (?1, ?2)",
            rusqlite::params![blob, format!("block-{i}")],
        )
        .unwrap();
    }
    path
}

#[test]
fn missing_path_is_a_read_error_for_both_operations() {
    let path = Path::new("/no/such/dir/boundaries.shp");

    let err = load_as_unified_geometry(path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Read);
    assert!(matches!(err, Error::NotFound(_)));

    let err = load_as_feature_table(path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Read);
}

#[test]
fn unsupported_format_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.kml");
    std::fs::write(&path, b"<kml/>").unwrap();

    let err = load_as_feature_table(&path).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(_)));
    assert_eq!(err.kind(), ErrorKind::Read);
}

#[test]
fn feature_table_is_always_wgs84_and_keeps_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_geojson(
        &dir,
        "parcels.geojson",
        &[square(10.0, 59.0, 0.1), square(11.0, 60.0, 0.1)],
        json!({}),
    );

    let table = load_as_feature_table(&path).unwrap();
    assert_eq!(table.crs().as_str(), WGS84);
    assert_eq!(table.len(), 2);
    assert_eq!(table.features()[1].properties["name"], json!("parcel-1"));
}

#[test]
fn loading_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_geojson(
        &dir,
        "aoi.geojson",
        &[square(0.0, 0.0, 2.0), square(1.0, 1.0, 2.0)],
        json!({}),
    );

    assert_eq!(
        load_as_feature_table(&path).unwrap(),
        load_as_feature_table(&path).unwrap()
    );
    assert_eq!(
        load_as_unified_geometry(&path).unwrap(),
        load_as_unified_geometry(&path).unwrap()
    );
}

#[test]
fn single_feature_unifies_to_itself() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_geojson(&dir, "one.geojson", &[square(5.0, 45.0, 1.0)], json!({}));

    let table = load_as_feature_table(&path).unwrap();
    let only = table.features()[0].geometry.clone().unwrap();
    assert_eq!(unified(&path), only);
}

#[test]
fn disjoint_features_unify_to_multipart_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_geojson(
        &dir,
        "islands.geojson",
        &[square(0.0, 0.0, 1.0), square(3.0, 3.0, 1.0)],
        json!({}),
    );

    match unified(&path) {
        Geometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 2),
        other => panic!("expected MultiPolygon, got {other:?}"),
    }
}

#[test]
fn unified_area_matches_union_of_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_geojson(
        &dir,
        "overlap.geojson",
        &[
            square(0.0, 0.0, 2.0),
            square(1.0, 0.0, 2.0),
            square(10.0, 10.0, 1.0),
        ],
        json!({}),
    );

    let table = load_as_feature_table(&path).unwrap();
    let summed: f64 = table.geometries().map(|g| g.unsigned_area()).sum();
    assert_relative_eq!(summed, 9.0, epsilon = 1e-9);

    // The first two squares share a 1 x 2 strip, the third stands alone
    let area = unified(&path).unsigned_area();
    assert_relative_eq!(area, summed - 2.0, epsilon = 1e-9);
}

#[test]
fn repeated_line_features_unify_to_one_line() {
    let dir = tempfile::tempdir().unwrap();
    let road = json!({"type": "LineString", "coordinates": [[10.0, 59.0], [10.5, 59.0]]});
    let path = write_geojson(&dir, "roads.geojson", &[road.clone(), road], json!({}));

    match unified(&path) {
        Geometry::LineString(ls) => assert_eq!(ls.0.len(), 2),
        other => panic!("expected LineString, got {other:?}"),
    }
}

#[test]
fn geojson_feature_ids_survive_the_table_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ids.geojson");
    let doc = json!({
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "id": 42, "properties": {}, "geometry": square(0.0, 0.0, 1.0)},
            {"type": "Feature", "id": "b", "properties": {}, "geometry": null}
        ]
    });
    std::fs::write(&path, doc.to_string()).unwrap();

    let table = load_as_feature_table(&path).unwrap();
    let exported = serde_json::to_value(table.to_feature_collection()).unwrap();
    assert_eq!(exported["features"][0]["id"], json!(42));
    assert_eq!(exported["features"][1]["id"], json!("b"));
}

#[test]
fn empty_collection_cannot_be_unified() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_geojson(&dir, "empty.geojson", &[], json!({}));

    assert!(load_as_feature_table(&path).unwrap().is_empty());
    let err = load_as_unified_geometry(&path).unwrap_err();
    assert!(matches!(err, Error::EmptyUnion));
    assert_eq!(err.kind(), ErrorKind::Geometry);
}

#[test]
fn legacy_crs_member_drives_reprojection() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_geojson(
        &dir,
        "mercator.geojson",
        &[json!({"type": "Point", "coordinates": [111319.49079327357, 0.0]})],
        json!({"crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3857"}}}),
    );

    let table = load_as_feature_table(&path).unwrap();
    assert_eq!(table.crs().as_str(), WGS84);
    let Some(Geometry::Point(p)) = &table.features()[0].geometry else {
        panic!("expected a point");
    };
    assert_relative_eq!(p.x(), 1.0, epsilon = 1e-9);
    assert_relative_eq!(p.y(), 0.0, epsilon = 1e-9);
}

#[test]
fn remote_geometry_carries_options() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_geojson(&dir, "aoi.geojson", &[square(0.0, 0.0, 1.0)], json!({}));

    let remote =
        load_as_unified_geometry_with_options(&path, &LoadOptions::new().with_geodesic(false))
            .unwrap();
    let body = remote.to_json().unwrap();
    assert_eq!(body["proj"], json!("EPSG:4326"));
    assert_eq!(body["geodesic"], json!(false));
    assert_eq!(body["geoJson"]["type"], json!("Polygon"));
}

#[test]
fn shapefile_prj_drives_reprojection() {
    let dir = tempfile::tempdir().unwrap();
    let metre = 111319.49079327357;
    let path = write_shapefile(&dir, "blocks.shp", &[(0.0, 0.0, metre), (3.0 * metre, 0.0, metre)]);
    std::fs::write(path.with_extension("prj"), "EPSG:3857").unwrap();

    let table = load_as_feature_table(&path).unwrap();
    assert_eq!(table.crs().as_str(), WGS84);
    assert_eq!(table.len(), 2);
    assert_eq!(table.features()[0].properties["name"], json!("block-0"));
    assert_eq!(table.features()[1].properties["rank"], json!(1.0));

    let first = table.features()[0].geometry.as_ref().unwrap();
    // One degree of longitude on the equator; the latitude side shrinks a hair.
    assert_relative_eq!(first.unsigned_area(), 1.0, epsilon = 1e-3);

    match unified(&path) {
        Geometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 2),
        other => panic!("expected MultiPolygon, got {other:?}"),
    }
}

#[test]
fn shapefile_without_prj_needs_a_source_crs() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_shapefile(&dir, "naive.shp", &[(10.0, 59.0, 0.5)]);

    let err = load_as_feature_table(&path).unwrap_err();
    assert!(matches!(err, Error::MissingCrs(_)));
    assert_eq!(err.kind(), ErrorKind::Read);

    let options = LoadOptions::new().with_source_crs("EPSG:4326");
    let table = load_as_feature_table_with_options(&path, &options).unwrap();
    assert_eq!(table.crs().as_str(), WGS84);
    assert_relative_eq!(
        table.unary_union().unwrap().unsigned_area(),
        0.25,
        epsilon = 1e-9
    );
}

#[test]
fn source_crs_overrides_the_prj() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_shapefile(&dir, "mislabelled.shp", &[(10.0, 59.0, 0.5)]);
    std::fs::write(path.with_extension("prj"), "EPSG:3857").unwrap();

    // Read as metres, the square shrinks to a speck near the origin
    let as_declared = load_as_feature_table(&path).unwrap();
    assert!(as_declared.geometries().all(|g| g.unsigned_area() < 1e-6));

    let options = LoadOptions::new().with_source_crs("EPSG:4326");
    let table = load_as_feature_table_with_options(&path, &options).unwrap();
    assert_relative_eq!(
        table.unary_union().unwrap().unsigned_area(),
        0.25,
        epsilon = 1e-9
    );
}

#[test]
fn geopackage_srs_drives_reprojection() {
    let dir = tempfile::tempdir().unwrap();
    let metre = 111319.49079327357;
    let path = write_geopackage(
        &dir,
        "blocks.gpkg",
        (3857, "EPSG", 3857, "PROJCS[\"WGS 84 / Pseudo-Mercator\"]"),
        &[(0.0, 0.0, metre), (3.0 * metre, 0.0, metre)],
    );

    let table = load_as_feature_table(&path).unwrap();
    assert_eq!(table.crs().as_str(), WGS84);
    assert_eq!(table.len(), 2);
    assert_eq!(table.features()[1].properties["name"], json!("block-1"));
    assert_eq!(
        table.features()[0].id,
        Some(geojson::feature::Id::Number(1.into()))
    );
    let first = table.features()[0].geometry.as_ref().unwrap();
    assert_relative_eq!(first.unsigned_area(), 1.0, epsilon = 1e-3);

    match unified(&path) {
        Geometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 2),
        other => panic!("expected MultiPolygon, got {other:?}"),
    }
}

#[test]
fn geopackage_with_undefined_srs_needs_a_source_crs() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_geopackage(
        &dir,
        "local.gpkg",
        (0, "NONE", 0, "undefined"),
        &[(10.0, 59.0, 0.5)],
    );

    let err = load_as_feature_table(&path).unwrap_err();
    assert!(matches!(err, Error::MissingCrs(_)));

    let options = LoadOptions::new().with_source_crs("EPSG:4326");
    assert_eq!(load_as_feature_table_with_options(&path, &options).unwrap().len(), 1);
}

#[test]
fn corrupt_geopackage_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.gpkg");
    std::fs::write(&path, b"not a database at all, just some bytes padding it out").unwrap();

    let err = load_as_feature_table(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Read);
}
