//! Solver comparison benchmark for apex-pose-graph
//!
//! Compares Levenberg-Marquardt (sparse Cholesky and sparse QR) against Gauss-Newton on
//! synthetic closed-loop pose graphs of increasing size, in SE(2) and SE(3).
//!
//! ## Methodology
//!
//! - Every graph is a circle of poses anchored at key 0 with an equality factor and
//!   chained by noiseless between measurements, so the minimum error is zero.
//! - The initial estimate is the ground truth perturbed by `N(0, σ²)` per tangent
//!   component with a fixed seed. The anchor is left unperturbed.
//! - Timing covers only the `optimize()` call. Each configuration runs 5 times and the
//!   wall-clock time is averaged.
//!
//! ```bash
//! cargo bench --bench solver_comparison
//! RUST_LOG=debug cargo bench --bench solver_comparison   # per-iteration tables
//! ```

use std::hint::black_box;
use tracing::{info, warn};

use apex_pose_graph::simulation::{circle_se2, circle_se3, closed_loop_graph, hexagon_noise};
use apex_pose_graph::{
    DiagonalNoise, FactorGraph, GaussNewton, LevenbergMarquardt, LevenbergMarquardtConfig,
    LinearSolverType, PoseGraphResult, SolverResult, Values, init_logger,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

const NUM_RUNS: usize = 5;
const PERTURBATION_SIGMA: f64 = 0.05;

#[derive(Clone, Copy)]
enum Space {
    SE2,
    SE3,
}

struct Dataset {
    name: &'static str,
    space: Space,
    poses: usize,
    radius: f64,
}

const DATASETS: &[Dataset] = &[
    Dataset {
        name: "hexagon",
        space: Space::SE3,
        poses: 6,
        radius: 1.0,
    },
    Dataset {
        name: "circle-se2-100",
        space: Space::SE2,
        poses: 100,
        radius: 20.0,
    },
    Dataset {
        name: "circle-se2-1000",
        space: Space::SE2,
        poses: 1000,
        radius: 200.0,
    },
    Dataset {
        name: "circle-se3-100",
        space: Space::SE3,
        poses: 100,
        radius: 20.0,
    },
    Dataset {
        name: "circle-se3-1000",
        space: Space::SE3,
        poses: 1000,
        radius: 200.0,
    },
];

#[derive(Debug, Clone)]
struct BenchmarkResult {
    dataset: String,
    solver: String,
    initial_error: f64,
    final_error: f64,
    iterations: usize,
    elapsed_ms: f64,
    converged: bool,
}

fn build_problem(dataset: &Dataset) -> PoseGraphResult<(FactorGraph, Values)> {
    let (truth, noise) = match dataset.space {
        Space::SE2 => (
            circle_se2(dataset.poses, dataset.radius)?,
            DiagonalNoise::from_sigmas(nalgebra::DVector::from_vec(vec![
                0.05,
                0.05,
                5f64.to_radians(),
            ]))?,
        ),
        Space::SE3 => (circle_se3(dataset.poses, dataset.radius)?, hexagon_noise()?),
    };
    let graph = closed_loop_graph(&truth, noise)?;

    let mut rng = StdRng::seed_from_u64(dataset.poses as u64);
    let mut initial = truth.perturbed(PERTURBATION_SIGMA, &mut rng)?;
    if let Some(&anchor) = truth.keys().first() {
        initial.update(anchor, truth.at(anchor)?.clone())?;
    }
    Ok((graph, initial))
}

fn run_solver(solver: &str, graph: &FactorGraph, initial: &Values) -> PoseGraphResult<SolverResult> {
    match solver {
        "LM-Cholesky" => LevenbergMarquardt::new().optimize(graph, initial),
        "LM-QR" => LevenbergMarquardt::with_config(
            LevenbergMarquardtConfig::new().with_linear_solver_type(LinearSolverType::SparseQR),
        )
        .optimize(graph, initial),
        _ => GaussNewton::new().optimize(graph, initial),
    }
}

fn benchmark(dataset: &Dataset, solver: &str) -> PoseGraphResult<BenchmarkResult> {
    let (graph, initial) = build_problem(dataset)?;

    let mut total_ms = 0.0;
    let mut last = None;
    for _ in 0..NUM_RUNS {
        let result = run_solver(solver, black_box(&graph), black_box(&initial))?;
        total_ms += result.elapsed_time.as_secs_f64() * 1000.0;
        last = Some(result);
    }

    let result = last.ok_or_else(|| {
        apex_pose_graph::optimizer::OptimizerError::InvalidConfig("no benchmark runs".into())
    })?;
    Ok(BenchmarkResult {
        dataset: dataset.name.to_string(),
        solver: solver.to_string(),
        initial_error: result.initial_error,
        final_error: result.final_error,
        iterations: result.iterations,
        elapsed_ms: total_ms / NUM_RUNS as f64,
        converged: result.is_converged(),
    })
}

fn main() {
    init_logger();

    info!("Starting solver comparison benchmark...");
    info!("Running each configuration {} times and averaging results...", NUM_RUNS);

    let solvers = ["LM-Cholesky", "LM-QR", "Gauss-Newton"];
    let mut all_results = Vec::new();

    for dataset in DATASETS {
        info!("Dataset: {} ({} poses)", dataset.name, dataset.poses);

        for solver in &solvers {
            match benchmark(dataset, solver) {
                Ok(result) => {
                    info!(
                        "{} done (converged: {}, time: {:.2} ms)",
                        solver, result.converged, result.elapsed_ms
                    );
                    all_results.push(result);
                }
                Err(e) => warn!("{} failed on {}: {}", solver, dataset.name, e.chain_compact()),
            }
        }
    }

    info!("{}", "=".repeat(110));
    info!(
        "{:<18} {:<14} {:<14} {:<14} {:<8} {:<12} {:<6}",
        "Dataset", "Solver", "Init Error", "Final Error", "Iters", "Time (ms)", "Conv"
    );
    info!("{}", "-".repeat(110));
    for result in &all_results {
        info!(
            "{:<18} {:<14} {:<14.6e} {:<14.6e} {:<8} {:<12.2} {:<6}",
            result.dataset,
            result.solver,
            result.initial_error,
            result.final_error,
            result.iterations,
            result.elapsed_ms,
            result.converged
        );
    }
    info!("{}", "=".repeat(110));
}
