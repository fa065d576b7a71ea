use clap::{Arg, Command};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use shape_loader::{
    load_as_feature_table_with_options, load_as_unified_geometry_with_options, LoadOptions,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shape_loader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = Command::new("shape-loader")
        .version("0.1.0")
        .author("Jesper Fjellin")
        .about("Loads a vector file, reprojects it to EPSG:4326 and emits GeoJSON")
        .arg(
            Arg::new("path")
                .required(true)
                .help("Input shapefile (.shp), GeoJSON or GeoPackage (.gpkg) file"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_parser(["union", "table"])
                .default_value("union")
                .help("union: one geometry for the analysis service; table: every feature"),
        )
        .arg(
            Arg::new("source-crs")
                .short('s')
                .long("source-crs")
                .num_args(1)
                .help("CRS of the input, overriding the .prj file or GeoJSON crs member"),
        )
        .arg(
            Arg::new("layer")
                .short('l')
                .long("layer")
                .num_args(1)
                .help("GeoPackage layer to read (default: the first feature layer)"),
        )
        .arg(
            Arg::new("geodesic")
                .long("geodesic")
                .value_parser(clap::value_parser!(bool))
                .num_args(1)
                .help("Mark the unified geometry's edges as geodesic (true) or planar (false)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .num_args(1)
                .help("Write to this file instead of stdout"),
        )
        .get_matches();

    let path = PathBuf::from(matches.get_one::<String>("path").unwrap());
    let output = matches.get_one::<String>("output").map(PathBuf::from);

    let mut options = LoadOptions::new();
    if let Some(crs) = matches.get_one::<String>("source-crs") {
        options = options.with_source_crs(crs.as_str());
    }
    if let Some(layer) = matches.get_one::<String>("layer") {
        options = options.with_layer(layer.as_str());
    }
    if let Some(geodesic) = matches.get_one::<bool>("geodesic") {
        options = options.with_geodesic(*geodesic);
    }

    let mode = matches.get_one::<String>("mode").map(String::as_str);
    let result = render(&path, mode, &options);

    let rendered = match result {
        Ok(rendered) => rendered,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(shape_loader::Error::MissingCrs(_)) = e.downcast_ref::<shape_loader::Error>() {
                eprintln!("Pass --source-crs to say which coordinate reference system the input uses.");
            }
            std::process::exit(1);
        }
    };

    match output {
        Some(output) => {
            if let Err(e) = fs::write(&output, rendered) {
                eprintln!("Error writing {}: {}", output.display(), e);
                std::process::exit(1);
            }
            tracing::info!("Output written to {}", output.display());
        }
        None => println!("{}", rendered),
    }
}

fn render(path: &Path, mode: Option<&str>, options: &LoadOptions) -> Result<String, Box<dyn Error>> {
    let rendered = match mode {
        Some("table") => {
            let table = load_as_feature_table_with_options(path, options)?;
            serde_json::to_string_pretty(&table.to_feature_collection())?
        }
        _ => {
            let geometry = load_as_unified_geometry_with_options(path, options)?;
            serde_json::to_string_pretty(&geometry.to_json()?)?
        }
    };
    Ok(rendered)
}
