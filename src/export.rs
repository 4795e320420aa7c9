//! KML export
//!
//! Writes position fixes as a KML 2.2 path document. Output goes to a
//! temporary file next to the destination and is renamed into place only
//! once completely written, so a failed export never leaves a partial file.

use crate::error::{ConvertError, Result};
use crate::types::{KmlCoordinate, PositionFix};
use kml::types::{Coord, Geometry};
use kml::{Kml, KmlReader};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appearance of the exported track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackStyle {
    /// Document and placemark name
    pub name: String,
    /// KML color, `aabbggrr`
    pub line_color: String,
    pub line_width: f64,
}

impl Default for TrackStyle {
    fn default() -> Self {
        Self {
            name: "Flight track".to_string(),
            line_color: "ff0000ff".to_string(),
            line_width: 4.0,
        }
    }
}

impl TrackStyle {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Export fixes to a KML document at `output_path`
///
/// Fails with `EmptyTrack` when there is nothing to draw and `Write` when
/// the destination cannot be created. Returns the number of coordinates
/// written.
pub fn export_to_kml(fixes: &[PositionFix], output_path: &Path, style: &TrackStyle) -> Result<usize> {
    if fixes.is_empty() {
        return Err(ConvertError::EmptyTrack);
    }

    let parent = parent_dir(output_path);
    let temp = tempfile::Builder::new()
        .prefix(".ulg2kml-")
        .suffix(".kml.tmp")
        .tempfile_in(parent)
        .map_err(|e| ConvertError::write(output_path, e))?;

    {
        let mut writer = BufWriter::new(temp.as_file());
        write_kml(&mut writer, fixes, style).map_err(|e| ConvertError::write(output_path, e))?;
        writer
            .flush()
            .map_err(|e| ConvertError::write(output_path, e))?;
    }

    temp.persist(output_path)
        .map_err(|e| ConvertError::write(output_path, e.error))?;

    Ok(fixes.len())
}

/// Write the KML document body
pub fn write_kml<W: Write>(out: &mut W, fixes: &[PositionFix], style: &TrackStyle) -> std::io::Result<()> {
    let name = escape_xml(&style.name);

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(out, r#"<kml xmlns="http://www.opengis.net/kml/2.2">"#)?;
    writeln!(out, "<Document>")?;
    writeln!(out, "<name>{}</name>", name)?;
    writeln!(out, r#"<Style id="track">"#)?;
    writeln!(
        out,
        "<LineStyle><color>{}</color><width>{}</width></LineStyle>",
        escape_xml(&style.line_color),
        style.line_width
    )?;
    writeln!(out, "</Style>")?;
    writeln!(out, "<Placemark>")?;
    writeln!(out, "<name>{}</name>", name)?;
    writeln!(out, "<styleUrl>#track</styleUrl>")?;

    // A LineString needs at least two vertices
    let geometry = if fixes.len() == 1 { "Point" } else { "LineString" };
    writeln!(out, "<{}>", geometry)?;
    if geometry == "LineString" {
        writeln!(out, "<tessellate>1</tessellate>")?;
    }
    writeln!(out, "<altitudeMode>absolute</altitudeMode>")?;
    writeln!(out, "<coordinates>")?;
    for fix in fixes {
        writeln!(
            out,
            "{:.8},{:.8},{:.3}",
            fix.longitude, fix.latitude, fix.altitude
        )?;
    }
    writeln!(out, "</coordinates>")?;
    writeln!(out, "</{}>", geometry)?;
    writeln!(out, "</Placemark>")?;
    writeln!(out, "</Document>")?;
    writeln!(out, "</kml>")?;
    Ok(())
}

/// Read back every vertex of the geometries in a KML file
pub fn read_kml_coordinates(path: &Path) -> Result<Vec<KmlCoordinate>> {
    let file = File::open(path).map_err(|source| ConvertError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let document = KmlReader::<_, f64>::from_reader(BufReader::new(file))
        .read()
        .map_err(|e| ConvertError::MalformedLog(format!("invalid KML in {}: {}", path.display(), e)))?;
    Ok(collect_coordinates(document))
}

/// Parse KML text and return the vertices of its geometries, in document order
pub fn parse_kml_coordinates(text: &str) -> Result<Vec<KmlCoordinate>> {
    let document = KmlReader::<_, f64>::from_string(text)
        .read()
        .map_err(|e| ConvertError::MalformedLog(format!("invalid KML: {}", e)))?;
    Ok(collect_coordinates(document))
}

fn flatten_kml(kml: Vec<Kml>) -> Vec<Kml> {
    kml.into_iter()
        .flat_map(|k| match k {
            Kml::KmlDocument(d) => flatten_kml(d.elements),
            Kml::Document { attrs: _, elements } => flatten_kml(elements),
            Kml::Folder { attrs: _, elements } => flatten_kml(elements),
            k => vec![k],
        })
        .collect()
}

fn collect_coordinates(document: Kml) -> Vec<KmlCoordinate> {
    let mut coordinates = Vec::new();
    for element in flatten_kml(vec![document]) {
        let geometry = match element {
            Kml::Placemark(placemark) => placemark.geometry,
            Kml::Point(point) => Some(Geometry::Point(point)),
            Kml::LineString(line) => Some(Geometry::LineString(line)),
            Kml::MultiGeometry(multi) => Some(Geometry::MultiGeometry(multi)),
            _ => None,
        };
        if let Some(geometry) = geometry {
            push_geometry(geometry, &mut coordinates);
        }
    }
    coordinates
}

fn push_geometry(geometry: Geometry<f64>, out: &mut Vec<KmlCoordinate>) {
    match geometry {
        Geometry::Point(point) => out.push(to_coordinate(point.coord)),
        Geometry::LineString(line) => out.extend(line.coords.into_iter().map(to_coordinate)),
        Geometry::LinearRing(ring) => out.extend(ring.coords.into_iter().map(to_coordinate)),
        Geometry::Polygon(polygon) => {
            out.extend(polygon.outer.coords.into_iter().map(to_coordinate))
        }
        Geometry::MultiGeometry(multi) => {
            for geometry in multi.geometries {
                push_geometry(geometry, out);
            }
        }
        _ => {}
    }
}

fn to_coordinate(coord: Coord<f64>) -> KmlCoordinate {
    KmlCoordinate {
        longitude: coord.x,
        latitude: coord.y,
        altitude: coord.z.unwrap_or(0.0),
    }
}

/// `dir/stem.kml`, or `dir/stem-N.kml` with the first free N
pub fn unique_output_path(dir: &Path, stem: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.kml", stem));
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|i| dir.join(format!("{}-{}.kml", stem, i)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}
