//! Stroke point reduction.
//!
//! DESIGN
//! ======
//! `simplify` is plain Douglas-Peucker over `(x, y)` pairs. The split point of
//! a segment is the FIRST point of maximum distance from the chord, which makes
//! the result a fixed point: every kept point is still the first maximum of its
//! segment when re-run on the output, and every dropped span has no interior
//! left to reconsider.
//!
//! `reduce_stroke` wraps it for the storage path: oversized strokes are
//! simplified with a growing tolerance until they fit the target point count.

use crate::config::env_parse;

const DEFAULT_SIMPLIFY_THRESHOLD: usize = 400;
const DEFAULT_SIMPLIFY_TARGET_POINTS: usize = 200;
const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 1.0;
/// Tolerance doublings tried before falling back to stride sampling.
const MAX_TOLERANCE_ROUNDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplifyConfig {
    /// Flat coordinate count above which a stroke is reduced.
    pub threshold_values: usize,
    /// Upper bound on points kept after reduction.
    pub target_points: usize,
    /// Starting Douglas-Peucker tolerance, in canvas units.
    pub tolerance: f64,
}

impl SimplifyConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            threshold_values: env_parse("SIMPLIFY_THRESHOLD", DEFAULT_SIMPLIFY_THRESHOLD),
            target_points: env_parse("SIMPLIFY_TARGET_POINTS", DEFAULT_SIMPLIFY_TARGET_POINTS).max(2),
            tolerance: env_parse("SIMPLIFY_TOLERANCE", DEFAULT_SIMPLIFY_TOLERANCE),
        }
    }
}

impl Default for SimplifyConfig {
    fn default() -> Self {
        Self {
            threshold_values: DEFAULT_SIMPLIFY_THRESHOLD,
            target_points: DEFAULT_SIMPLIFY_TARGET_POINTS,
            tolerance: DEFAULT_SIMPLIFY_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Pair up a flat `[x0, y0, x1, y1, ...]` list. A trailing odd value is ignored.
#[must_use]
pub fn to_points(flat: &[f64]) -> Vec<Point> {
    flat.chunks_exact(2).map(|c| Point::new(c[0], c[1])).collect()
}

#[must_use]
pub fn to_flat(points: &[Point]) -> Vec<f64> {
    points.iter().flat_map(|p| [p.x, p.y]).collect()
}

/// Douglas-Peucker simplification. Sequences of two points or fewer are
/// returned unchanged; the endpoints are always kept.
#[must_use]
pub fn simplify(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    // Explicit stack instead of recursion: long strokes stay off the call stack.
    let mut segments = vec![(0, points.len() - 1)];
    while let Some((start, end)) = segments.pop() {
        if end <= start + 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut split = start;
        for (i, p) in points.iter().enumerate().take(end).skip(start + 1) {
            let d = perpendicular_distance(*p, points[start], points[end]);
            if d > max_dist {
                max_dist = d;
                split = i;
            }
        }
        if max_dist > tolerance {
            keep[split] = true;
            segments.push((start, split));
            segments.push((split, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Reduce a flat stroke to at most `config.target_points` points.
///
/// Strokes at or under `config.threshold_values` coordinates are returned as-is.
#[must_use]
pub fn reduce_stroke(flat: &[f64], config: &SimplifyConfig) -> Vec<f64> {
    if flat.len() <= config.threshold_values {
        return flat.to_vec();
    }

    let points = to_points(flat);
    let target = config.target_points.max(2);
    let mut tolerance = config.tolerance.max(f64::EPSILON);
    let mut reduced = simplify(&points, tolerance);
    for _ in 0..MAX_TOLERANCE_ROUNDS {
        if reduced.len() <= target {
            return to_flat(&reduced);
        }
        tolerance *= 2.0;
        reduced = simplify(&reduced, tolerance);
    }
    if reduced.len() <= target {
        return to_flat(&reduced);
    }
    to_flat(&stride_sample(&reduced, target))
}

/// Evenly spaced sample of `target` points including both endpoints.
fn stride_sample(points: &[Point], target: usize) -> Vec<Point> {
    if points.len() <= target {
        return points.to_vec();
    }
    let last = points.len() - 1;
    let steps = target - 1;
    (0..target).map(|i| points[i * last / steps]).collect()
}

fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = dx.hypot(dy);
    if len == 0.0 {
        return (p.x - a.x).hypot(p.y - a.y);
    }
    ((dy * p.x - dx * p.y + b.x * a.y - b.y * a.x).abs()) / len
}

#[cfg(test)]
#[path = "simplify_test.rs"]
mod tests;
