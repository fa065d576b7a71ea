//! Unary union of a feature table's geometries.
//!
//! Polygons are grouped into clusters whose bounding boxes overlap, using an
//! R-tree, and only polygons inside one cluster go through the boolean union.
//! Clusters are disjoint by construction so their results are concatenated.
//!
//! Line parts are broken into segments; duplicate and collinear-overlapping
//! segments are merged and the survivors chained back into line strings.
//! Whatever lies inside the polygonal result is clipped away, and points
//! covered by either are absorbed.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};

use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::intersects::Intersects;
use geo::{
    BooleanOps, Coord, CoordsIter, Geometry, GeometryCollection, HasKernel, Kernel, Line,
    LineString, MultiLineString, MultiPoint, MultiPolygon, Orientation, Point, Polygon,
};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, RTreeObject};

use crate::error::{Error, Result};

type Envelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

#[derive(Default)]
struct Parts {
    polygons: Vec<Polygon<f64>>,
    lines: Vec<LineString<f64>>,
    points: Vec<Point<f64>>,
}

impl Parts {
    fn is_empty(&self) -> bool {
        self.polygons.is_empty() && self.lines.is_empty() && self.points.is_empty()
    }

    fn push(&mut self, feature: usize, geometry: &Geometry<f64>) -> Result<()> {
        if let Some(bad) = geometry
            .coords_iter()
            .find(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(Error::InvalidGeometry {
                feature,
                reason: format!("non-finite coordinate ({}, {})", bad.x, bad.y),
            });
        }

        match geometry {
            Geometry::Point(p) => self.points.push(*p),
            Geometry::MultiPoint(mp) => self.points.extend(mp.0.iter().copied()),
            Geometry::Line(l) => self.lines.push(LineString::from(*l)),
            Geometry::LineString(ls) => self.push_line(ls.clone()),
            Geometry::MultiLineString(mls) => {
                for ls in &mls.0 {
                    self.push_line(ls.clone());
                }
            }
            Geometry::Polygon(p) => self.push_polygon(feature, p.clone())?,
            Geometry::MultiPolygon(mp) => {
                for p in &mp.0 {
                    self.push_polygon(feature, p.clone())?;
                }
            }
            Geometry::Rect(r) => self.polygons.push(r.to_polygon()),
            Geometry::Triangle(t) => self.polygons.push(t.to_polygon()),
            Geometry::GeometryCollection(gc) => {
                for g in &gc.0 {
                    self.push(feature, g)?;
                }
            }
        }
        Ok(())
    }

    fn push_line(&mut self, line: LineString<f64>) {
        if !line.0.is_empty() {
            self.lines.push(line);
        }
    }

    fn push_polygon(&mut self, feature: usize, polygon: Polygon<f64>) -> Result<()> {
        // An empty exterior is an empty polygon, not a broken one
        if polygon.exterior().0.is_empty() {
            return Ok(());
        }
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
        for ring in rings {
            if ring.0.len() < 4 {
                return Err(Error::InvalidGeometry {
                    feature,
                    reason: format!("polygon ring with {} positions", ring.0.len()),
                });
            }
        }
        self.polygons.push(polygon);
        Ok(())
    }
}

/// Unions every present geometry. `None` entries (features without
/// geometry) are skipped but still count towards feature indices in errors.
pub fn unary_union<'a>(
    geometries: impl IntoIterator<Item = Option<&'a Geometry<f64>>>,
) -> Result<Geometry<f64>> {
    let mut parts = Parts::default();
    for (feature, geometry) in geometries.into_iter().enumerate() {
        if let Some(geometry) = geometry {
            parts.push(feature, geometry)?;
        }
    }
    if parts.is_empty() {
        return Err(Error::EmptyUnion);
    }

    tracing::debug!(
        "Unioning {} polygons, {} lines, {} points",
        parts.polygons.len(),
        parts.lines.len(),
        parts.points.len()
    );

    let polygons = union_polygons(parts.polygons)?;
    let lines = clip_outside(&polygons, merge_lines(&parts.lines))?;

    let mut seen = HashSet::new();
    let points: Vec<Point<f64>> = parts
        .points
        .into_iter()
        .filter(|p| seen.insert(point_key(p)))
        .filter(|p| !polygons.0.iter().any(|poly| poly.intersects(p)))
        .filter(|p| !lines.iter().any(|line| line.intersects(p)))
        .collect();

    collapse(polygons, lines, points)
}

fn union_polygons(polygons: Vec<Polygon<f64>>) -> Result<MultiPolygon<f64>> {
    let clusters = cluster_by_envelope(&polygons);
    tracing::debug!(
        "Grouped {} polygons into {} clusters",
        polygons.len(),
        clusters.len()
    );

    let mut slots: Vec<Option<Polygon<f64>>> = polygons.into_iter().map(Some).collect();
    let mut result = Vec::new();

    for cluster in clusters {
        let mut members = cluster.into_iter().filter_map(|i| slots[i].take());
        let Some(first) = members.next() else {
            continue;
        };
        let mut merged = MultiPolygon::new(vec![first]);
        for polygon in members {
            merged = boolean_union(&merged, &MultiPolygon::new(vec![polygon]))?;
        }
        result.extend(merged.0);
    }

    Ok(MultiPolygon::new(result))
}

/// Connected components of the "bounding boxes intersect" relation, each in
/// input order.
fn cluster_by_envelope(polygons: &[Polygon<f64>]) -> Vec<Vec<usize>> {
    let envelopes: Vec<Envelope> = polygons
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            let rect = p.bounding_rect()?;
            let corners = (
                [rect.min().x, rect.min().y],
                [rect.max().x, rect.max().y],
            );
            Some(GeomWithData::new(
                Rectangle::from_corners(corners.0, corners.1),
                i,
            ))
        })
        .collect();

    let mut parent: Vec<usize> = (0..polygons.len()).collect();
    let tree = RTree::bulk_load(envelopes.clone());

    for envelope in &envelopes {
        for hit in tree.locate_in_envelope_intersecting(&envelope.envelope()) {
            let a = find_root(&mut parent, envelope.data);
            let b = find_root(&mut parent, hit.data);
            if a != b {
                parent[a.max(b)] = a.min(b);
            }
        }
    }

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut by_root: HashMap<usize, usize> = HashMap::new();
    for envelope in &envelopes {
        let root = find_root(&mut parent, envelope.data);
        let slot = *by_root.entry(root).or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[slot].push(envelope.data);
    }
    clusters
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

// Bit pattern of a point with -0.0 folded into 0.0, so both spellings of the
// origin dedupe together.
fn point_key(p: &Point<f64>) -> (u64, u64) {
    ((p.x() + 0.0).to_bits(), (p.y() + 0.0).to_bits())
}

/// Set-union of the line parts as line strings: every segment is folded into
/// the segments kept so far, so repeated and collinear-overlapping stretches
/// appear once. Zero-length segments are dropped.
fn merge_lines(lines: &[LineString<f64>]) -> Vec<LineString<f64>> {
    let mut segments: Vec<Line<f64>> = Vec::new();
    for segment in lines.iter().flat_map(|line| line.lines()) {
        if segment.start != segment.end {
            absorb_segment(&mut segments, segment);
        }
    }
    chain_segments(segments)
}

fn absorb_segment(segments: &mut Vec<Line<f64>>, segment: Line<f64>) {
    let Some(mut i) = segments.iter().position(|kept| overlaps(kept, &segment)) else {
        segments.push(segment);
        return;
    };
    segments[i] = span(&segments[i], &segment);

    // A longer segment can now reach others it did not touch before
    while let Some(j) =
        (0..segments.len()).find(|&j| j != i && overlaps(&segments[i], &segments[j]))
    {
        let other = segments.remove(j);
        if j < i {
            i -= 1;
        }
        segments[i] = span(&segments[i], &other);
    }
}

/// Position of `c` along `line`, 0 at its start and 1 at its end.
fn param(line: &Line<f64>, c: Coord<f64>) -> f64 {
    let d = line.delta();
    let v = c - line.start;
    (v.x * d.x + v.y * d.y) / (d.x * d.x + d.y * d.y)
}

// Both segments on one carrier line and sharing at least a point.
fn overlaps(a: &Line<f64>, b: &Line<f64>) -> bool {
    let collinear = |c: Coord<f64>| {
        <f64 as HasKernel>::Ker::orient2d(a.start, a.end, c) == Orientation::Collinear
    };
    if !collinear(b.start) || !collinear(b.end) {
        return false;
    }
    let (t0, t1) = (param(a, b.start), param(a, b.end));
    t0.min(t1) <= 1.0 && t0.max(t1) >= 0.0
}

/// The smallest segment covering two overlapping collinear segments, running
/// in the direction of `a`. Endpoints are taken from the inputs unchanged.
fn span(a: &Line<f64>, b: &Line<f64>) -> Line<f64> {
    let mut start = (0.0, a.start);
    let mut end = (1.0, a.end);
    for c in [b.start, b.end] {
        let t = param(a, c);
        if t < start.0 {
            start = (t, c);
        }
        if t > end.0 {
            end = (t, c);
        }
    }
    Line::new(start.1, end.1)
}

// Consecutive segments that meet end to start become one line string.
fn chain_segments(segments: Vec<Line<f64>>) -> Vec<LineString<f64>> {
    let mut chains: Vec<Vec<Coord<f64>>> = Vec::new();
    for segment in segments {
        match chains.last_mut() {
            Some(chain) if chain.last() == Some(&segment.start) => chain.push(segment.end),
            _ => chains.push(vec![segment.start, segment.end]),
        }
    }
    chains.into_iter().map(LineString::new).collect()
}

/// The parts of `lines` outside the polygonal union.
fn clip_outside(
    polygons: &MultiPolygon<f64>,
    lines: Vec<LineString<f64>>,
) -> Result<Vec<LineString<f64>>> {
    if polygons.0.is_empty() || lines.is_empty() {
        return Ok(lines);
    }
    let lines = MultiLineString::new(lines);
    let outside = guarded(|| polygons.clip(&lines, true))?;
    Ok(outside
        .0
        .into_iter()
        .filter(|line| line.lines().any(|l| l.start != l.end))
        .collect())
}

fn boolean_union(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
    guarded(|| a.union(b))
}

// The sweep-line in geo can panic on degenerate input instead of returning
// an error; surface that as a union failure.
fn guarded<T>(op: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(op)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "boolean operation panicked".to_string());
        Error::Union(message)
    })
}

fn collapse(
    polygons: MultiPolygon<f64>,
    mut lines: Vec<LineString<f64>>,
    mut points: Vec<Point<f64>>,
) -> Result<Geometry<f64>> {
    let mut out: Vec<Geometry<f64>> = Vec::with_capacity(3);

    let mut polygons = polygons.0;
    match polygons.len() {
        0 => {}
        1 => out.push(Geometry::Polygon(polygons.remove(0))),
        _ => out.push(Geometry::MultiPolygon(MultiPolygon::new(polygons))),
    }
    match lines.len() {
        0 => {}
        1 => out.push(Geometry::LineString(lines.remove(0))),
        _ => out.push(Geometry::MultiLineString(MultiLineString::new(lines))),
    }
    match points.len() {
        0 => {}
        1 => out.push(Geometry::Point(points.remove(0))),
        _ => out.push(Geometry::MultiPoint(MultiPoint::new(points))),
    }

    match out.len() {
        0 => Err(Error::Union("union collapsed to an empty geometry".to_string())),
        1 => Ok(out.remove(0)),
        _ => Ok(Geometry::GeometryCollection(GeometryCollection(out))),
    }
}
