//! Synthetic pose graphs for tests and benchmarks
//!
//! Poses are laid out on a circle in the XY plane so that every pair of consecutive poses
//! is related by the same rigid transform. That makes the ground truth of a closed loop
//! exactly consistent, which is what convergence tests need.

use crate::core::{Key, factor_graph::FactorGraph, noise_model::DiagonalNoise, values::Values};
use crate::error::PoseGraphResult;
use crate::factors::{BetweenFactor, EqualityFactor};
use crate::manifold::{se2::SE2, se3::SE3, so3::SO3};
use nalgebra::{DVector, Matrix3, Rotation3, Vector3};
use std::f64::consts::{FRAC_PI_2, PI};

/// Translation sigma of the hexagon odometry, in meters.
pub const HEXAGON_TRANSLATION_SIGMA: f64 = 0.05;

/// Rotation sigma of the hexagon odometry, in radians (5 degrees).
pub const HEXAGON_ROTATION_SIGMA: f64 = 5.0 * PI / 180.0;

/// `n` SE(3) poses on a circle of radius `radius`, keyed `0..n`.
///
/// Pose `i` sits at angle `θ = 2πi/n` with translation `(r cos θ, r sin θ, 0)`. Its
/// rotation is `gRo · Rz(-θ)` where `gRo` maps a Z-down body frame into the world, so the
/// body x axis points along the direction of travel.
///
/// # Errors
/// `CoreError::DuplicateKey` only if `n` exceeds the key range.
pub fn circle_se3(n: usize, radius: f64) -> PoseGraphResult<Values> {
    #[rustfmt::skip]
    let g_r_o = Matrix3::new(
        0.0, 1.0, 0.0,
        1.0, 0.0, 0.0,
        0.0, 0.0, -1.0,
    );

    let mut values = Values::new();
    for (key, theta) in circle_angles(n) {
        let translation = Vector3::new(radius * theta.cos(), radius * theta.sin(), 0.0);
        let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), -theta).into_inner();
        let pose = SE3::from_translation_so3(translation, SO3::from_matrix(g_r_o * rz));
        values.insert(key, pose)?;
    }
    Ok(values)
}

/// `n` SE(2) poses on a circle of radius `radius`, keyed `0..n`.
///
/// Pose `i` is `(r cos θ, r sin θ, θ + π/2)`: tangent to the circle, turning left.
pub fn circle_se2(n: usize, radius: f64) -> PoseGraphResult<Values> {
    let mut values = Values::new();
    for (key, theta) in circle_angles(n) {
        let pose = SE2::from_xy_angle(radius * theta.cos(), radius * theta.sin(), theta + FRAC_PI_2);
        values.insert(key, pose)?;
    }
    Ok(values)
}

fn circle_angles(n: usize) -> impl Iterator<Item = (Key, f64)> {
    (0..n).map(move |i| (i as Key, 2.0 * PI * i as f64 / n as f64))
}

/// Anchored SE(3) hexagon on a circle of radius `radius`.
///
/// Returns the graph and its ground truth. The graph holds an equality factor fixing key 0
/// and six between factors `i → i+1 (mod 6)`, each measuring the common relative
/// transform between neighbours.
///
/// # Errors
/// Propagates noise-model and factor construction errors.
pub fn hexagon_graph(radius: f64) -> PoseGraphResult<(FactorGraph, Values)> {
    let truth = circle_se3(6, radius)?;
    let graph = closed_loop_graph(&truth, hexagon_noise()?)?;
    Ok((graph, truth))
}

/// Diagonal noise used by [`hexagon_graph`].
pub fn hexagon_noise() -> PoseGraphResult<DiagonalNoise> {
    let t = HEXAGON_TRANSLATION_SIGMA;
    let r = HEXAGON_ROTATION_SIGMA;
    Ok(DiagonalNoise::from_sigmas(DVector::from_vec(vec![
        t, t, t, r, r, r,
    ]))?)
}

/// Anchor the first key of `truth` and chain every consecutive pair, closing the loop
/// from the last key back to the first.
///
/// Works for SE(2) and SE(3) ground truths alike as long as `noise` matches the pose
/// dimension.
pub fn closed_loop_graph(truth: &Values, noise: DiagonalNoise) -> PoseGraphResult<FactorGraph> {
    let mut graph = FactorGraph::new();
    let keys = truth.keys();
    let Some(&first) = keys.first() else {
        return Ok(graph);
    };

    graph.add(EqualityFactor::new(first, truth.at(first)?.clone()));
    for (index, &key_i) in keys.iter().enumerate() {
        let key_j = keys[(index + 1) % keys.len()];
        if key_i == key_j {
            break;
        }
        let measured = truth.at(key_i)?.between(truth.at(key_j)?)?;
        graph.add(BetweenFactor::new(key_i, key_j, measured, noise.clone())?);
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pose::Pose;
    use crate::factors::GraphFactor;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_circle_se3_first_pose() -> TestResult {
        let values = circle_se3(6, 1.0)?;
        assert_eq!(values.len(), 6);

        let pose = values.at(0)?.as_se3().ok_or("expected SE3")?;
        assert!((pose.translation() - Vector3::new(1.0, 0.0, 0.0)).norm() < TOLERANCE);

        // Body x axis points along +y (direction of travel), z points down
        let rotation = pose.rotation_matrix();
        assert!((rotation.column(0) - Vector3::y()).norm() < TOLERANCE);
        assert!((rotation.column(2) + Vector3::z()).norm() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_circle_se3_consecutive_relations_are_identical() -> TestResult {
        let values = circle_se3(6, 1.0)?;
        let reference = values.at(0)?.between(values.at(1)?)?;

        for i in 1..6u64 {
            let relative = values.at(i)?.between(values.at((i + 1) % 6)?)?;
            assert!(relative.is_approx(&reference, 1e-9), "pair {i}");
        }

        // Hexagon on the unit circle: unit steps and 60 degree turns
        let se3 = reference.as_se3().ok_or("expected SE3")?;
        assert!((se3.translation().norm() - 1.0).abs() < TOLERANCE);
        assert!((se3.rotation_quaternion().angle() - PI / 3.0).abs() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_circle_se2_layout() -> TestResult {
        let values = circle_se2(4, 2.0)?;
        let pose = values.at(1)?.as_se2().ok_or("expected SE2")?;
        assert!(pose.x().abs() < TOLERANCE);
        assert!((pose.y() - 2.0).abs() < TOLERANCE);
        assert!((pose.angle() - PI).abs() < TOLERANCE || (pose.angle() + PI).abs() < TOLERANCE);

        let step = values.at(0)?.between(values.at(1)?)?;
        assert!(matches!(step, Pose::SE2(_)));
        Ok(())
    }

    #[test]
    fn test_hexagon_graph_structure() -> TestResult {
        let (graph, truth) = hexagon_graph(1.0)?;
        assert_eq!(graph.size(), 7);
        assert_eq!(truth.len(), 6);

        assert!(matches!(graph.get(0), Some(GraphFactor::Equality(_))));
        let between_count = graph
            .iter()
            .filter(|factor| matches!(factor, GraphFactor::Between(_)))
            .count();
        assert_eq!(between_count, 6);

        // Closing factor wraps back to key 0
        assert_eq!(graph.get(6).ok_or("missing factor")?.keys(), &[5, 0]);
        Ok(())
    }

    #[test]
    fn test_hexagon_ground_truth_has_zero_error() -> TestResult {
        let (graph, truth) = hexagon_graph(1.0)?;
        assert!(graph.error(&truth)? < 1e-12);
        Ok(())
    }

    #[test]
    fn test_closed_loop_graph_se2() -> TestResult {
        let truth = circle_se2(5, 3.0)?;
        let graph = closed_loop_graph(&truth, DiagonalNoise::isotropic(3, 0.1)?)?;
        assert_eq!(graph.size(), 6);
        assert!(graph.error(&truth)? < 1e-12);
        Ok(())
    }

    #[test]
    fn test_closed_loop_graph_edge_cases() -> TestResult {
        let empty = closed_loop_graph(&Values::new(), DiagonalNoise::unit(3)?)?;
        assert!(empty.is_empty());

        let single = closed_loop_graph(&circle_se2(1, 1.0)?, DiagonalNoise::unit(3)?)?;
        assert_eq!(single.size(), 1);
        Ok(())
    }
}
