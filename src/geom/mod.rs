//! Polygon operations used by the tile graph: the rook-adjacency predicate,
//! dissolve/union on merge, and centroid for the spatial index.
//!
//! Heavy boolean operations (union, buffer, DE-9IM relate) are delegated to
//! GEOS, round-tripped through `geo-types` via `geozero`. Cheap affine-free
//! queries (centroid, bounding box, area) stay in pure-Rust `geo` so the
//! common path never touches the C library.

mod error;

pub use error::Error;

use geo::{Area, BoundingRect, Centroid};
use geo_types::{Geometry, MultiPolygon, Point, Polygon, Rect};
use geos::Geom;
use geozero::{ToGeo, ToGeos};

/// Absolute area/length floor below which an overlap is treated as floating
/// point noise rather than a genuine shared boundary or interior overlap.
const MEASURE_EPSILON: f64 = 1e-9;

fn to_geos(mp: &MultiPolygon<f64>) -> Result<geos::Geometry, Error> {
    let geom = Geometry::MultiPolygon(mp.clone());
    Ok(geom.to_geos()?)
}

fn geos_to_multipolygon(g: geos::Geometry, op: &'static str) -> Result<MultiPolygon<f64>, Error> {
    let geo_geom: Geometry<f64> = g.to_geo()?;
    match geo_geom {
        Geometry::MultiPolygon(mp) => Ok(mp),
        Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        Geometry::GeometryCollection(gc) => {
            let polys: Vec<Polygon<f64>> = gc
                .into_iter()
                .filter_map(|g| match g {
                    Geometry::Polygon(p) => Some(p),
                    _ => None,
                })
                .collect();
            if polys.is_empty() {
                Err(Error::EmptyResult(op))
            } else {
                Ok(MultiPolygon(polys))
            }
        }
        _ => Err(Error::UnexpectedVariant(op)),
    }
}

/// Fatal-at-load validity check: rejects self-intersecting polygons and
/// empty rings. Never called from the merge loop itself — by the time a
/// tile's geometry reaches the graph it was either validated at load or
/// produced by [`union`], which GEOS guarantees is valid for valid inputs.
pub fn validate(mp: &MultiPolygon<f64>) -> Result<(), Error> {
    let g = to_geos(mp)?;
    if mp.0.iter().any(|p| p.exterior().0.is_empty()) {
        return Err(Error::InvalidGeometry("empty exterior ring".to_string()));
    }
    if !g.is_valid() {
        let reason = g
            .is_valid_reason()
            .unwrap_or_else(|_| "unknown reason".to_string());
        return Err(Error::InvalidGeometry(reason));
    }
    Ok(())
}

pub fn centroid(mp: &MultiPolygon<f64>) -> Option<Point<f64>> {
    mp.centroid()
}

pub fn bounding_rect(mp: &MultiPolygon<f64>) -> Option<Rect<f64>> {
    mp.bounding_rect()
}

pub fn area(mp: &MultiPolygon<f64>) -> f64 {
    mp.unsigned_area()
}

/// Topological union, preserving total area to within [`MEASURE_EPSILON`]
/// relative to the larger input.
pub fn union(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, Error> {
    let ga = to_geos(a)?;
    let gb = to_geos(b)?;
    let unioned = ga.union(&gb)?;
    let result = geos_to_multipolygon(unioned, "union")?;

    let before = area(a) + area(b);
    let after = area(&result);
    let tolerance = MEASURE_EPSILON.max(before.max(after) * 1e-6);
    debug_assert!(
        (before - after).abs() <= tolerance,
        "union changed total area: {before} -> {after}"
    );
    Ok(result)
}

/// True iff `a` and `b` share a boundary of positive 1-dimensional measure,
/// or their interiors overlap once either is expanded by `buffer_feet`. A
/// single point of tangency does not count.
pub fn intersects_rook(
    a: &MultiPolygon<f64>,
    b: &MultiPolygon<f64>,
    buffer_feet: f64,
) -> Result<bool, Error> {
    let ga = to_geos(a)?;
    let gb = to_geos(b)?;

    // Boundary/boundary DE-9IM dimension exactly 1 (a line): a single shared
    // vertex is dimension 0 and is rejected by this pattern on its own.
    if ga.relate_pattern(&gb, "****1****")? {
        return Ok(true);
    }

    // Interiors already overlapping with positive area (covers geometries
    // that overlap before any buffering is applied).
    if ga.intersects(&gb)? {
        let inter = ga.intersection(&gb)?;
        if inter.area()? > MEASURE_EPSILON {
            return Ok(true);
        }
    }

    // Buffered overlap: expand `a` by the adjacency buffer and re-test.
    let buffered = ga.buffer(buffer_feet, 8)?;
    if buffered.intersects(&gb)? {
        let inter = buffered.intersection(&gb)?;
        if inter.area()? > MEASURE_EPSILON {
            return Ok(true);
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use geo_types::{polygon, Polygon};

    fn square(x0: f64, y0: f64, side: f64) -> MultiPolygon<f64> {
        let p: Polygon<f64> = polygon![
            (x: x0, y: y0),
            (x: x0 + side, y: y0),
            (x: x0 + side, y: y0 + side),
            (x: x0, y: y0 + side),
            (x: x0, y: y0),
        ];
        MultiPolygon(vec![p])
    }

    #[test]
    fn shared_edge_is_rook_adjacent() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(10.0, 0.0, 10.0);
        assert!(intersects_rook(&a, &b, 0.0).unwrap());
    }

    #[test]
    fn single_corner_touch_is_not_rook_adjacent() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(10.0, 10.0, 10.0);
        assert!(!intersects_rook(&a, &b, 0.0).unwrap());
    }

    #[test]
    fn distant_tiles_need_buffer() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(10.5, 0.0, 10.0);
        assert!(!intersects_rook(&a, &b, 0.0).unwrap());
        assert!(intersects_rook(&a, &b, 1.0).unwrap());
    }

    #[test]
    fn union_preserves_area() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(10.0, 0.0, 10.0);
        let u = union(&a, &b).unwrap();
        assert!(approx_eq!(f64, area(&u), 200.0, epsilon = 1e-6));
    }

    #[test]
    fn centroid_of_unit_square_is_center() {
        let sq = square(0.0, 0.0, 2.0);
        let c = centroid(&sq).unwrap();
        assert!(approx_eq!(f64, c.x(), 1.0, epsilon = 1e-9));
        assert!(approx_eq!(f64, c.y(), 1.0, epsilon = 1e-9));
    }
}
