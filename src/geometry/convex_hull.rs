//! 2D convex hull via Andrew's monotone chain (C1).

use nalgebra::Point2;

fn left_turn(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> bool {
    let ab = b - a;
    let bc = c - b;
    (ab.x * bc.y - ab.y * bc.x) > 0.0
}

// Appends `p` to the tentative chain, then backtracks while the last three
// points fail to form a left turn.
fn append_and_trim(p: Point2<f64>, chain: &mut Vec<Point2<f64>>) {
    chain.push(p);
    while chain.len() > 2 {
        let c = chain[chain.len() - 1];
        let b = chain[chain.len() - 2];
        let a = chain[chain.len() - 3];
        if left_turn(a, b, c) {
            break;
        }
        chain.remove(chain.len() - 2);
    }
}

/// Computes the convex hull of `points`, returned counter-clockwise.
///
/// `points` need not be in any particular order. Returns an empty vector if
/// there are fewer than three distinct points, or the input is degenerate
/// (e.g. all collinear).
pub fn compute_convex_hull(points: &[Point2<f64>]) -> Vec<Point2<f64>> {
    if points.len() < 3 {
        return Vec::new();
    }

    let mut sorted: Vec<Point2<f64>> = points.to_vec();
    sorted.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap()
            .then(a.y.partial_cmp(&b.y).unwrap())
    });

    let mut upper_hull = Vec::new();
    for &p in sorted.iter().rev() {
        append_and_trim(p, &mut upper_hull);
    }

    let mut lower_hull = Vec::new();
    for &p in sorted.iter() {
        append_and_trim(p, &mut lower_hull);
    }

    // Degenerate (collinear) case: both chains collapse to one segment
    // each, i.e. 4 points total counting the shared endpoints.
    if upper_hull.len() + lower_hull.len() < 5 {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(upper_hull.len() + lower_hull.len() - 2);
    result.extend_from_slice(&upper_hull[..upper_hull.len() - 1]);
    result.extend_from_slice(&lower_hull[..lower_hull.len() - 1]);
    result
}
