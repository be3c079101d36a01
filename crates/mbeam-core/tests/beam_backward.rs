// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use mbeam_config::determinism::rng_from_optional;
use mbeam_core::harness::grad_close;
use mbeam_core::window::SourceIndex;
use mbeam_core::{
    BeamError, BeamKernel, BeamParams, ConsistencyHarness, EdgeMode, ParallelKernel, ReferenceKernel,
    VectorizedKernel,
};
use ndarray::{Array, ArrayD, Axis, IxDyn};
use rand::distributions::Uniform;
use rand::{rngs::StdRng, Rng};
use rand_distr::StandardNormal;

const N_TIME: usize = 100;
const N_BATCH: usize = 10;
const N_DIM: usize = 5;
const BEAM_WIDTH: i64 = 20;
const SEEDS: [u64; 3] = [123, 7, 2024];
// zero, shorter than every valid length, longer than the whole source
const WIDTHS: [i64; 3] = [0, BEAM_WIDTH, 150];

struct RandomCase {
    source: ArrayD<f32>,
    params: BeamParams,
    rng: StdRng,
}

fn random_case(seed: u64, mode: EdgeMode, beam_width: i64) -> RandomCase {
    let mut rng = rng_from_optional(Some(seed), "beam_backward");
    let unit = Uniform::new(0.0f32, 1.0);
    let source = Array::from_shape_simple_fn(IxDyn(&[N_TIME, N_BATCH, N_DIM]), || rng.sample(unit));
    let lens = (0..N_BATCH)
        .map(|_| rng.gen_range(N_TIME as i64 / 5..N_TIME as i64))
        .collect::<Vec<_>>();
    let starts = (0..N_BATCH)
        .map(|_| rng.gen_range(-(N_TIME as i64)..N_TIME as i64))
        .collect::<Vec<_>>();
    RandomCase {
        source,
        params: BeamParams::new(starts, lens, beam_width, mode),
        rng,
    }
}

fn upstream_like(shape: &[usize], rng: &mut StdRng) -> ArrayD<f32> {
    Array::from_shape_simple_fn(IxDyn(shape), || rng.sample::<f32, _>(StandardNormal))
}

fn harness() -> ConsistencyHarness {
    ConsistencyHarness::builtin().expect("builtin kernels")
}

fn harness_with_sequential_parallel() -> ConsistencyHarness {
    let kernels: Vec<Box<dyn BeamKernel>> = vec![
        Box::new(ReferenceKernel),
        Box::new(ParallelKernel::sequential()),
        Box::new(VectorizedKernel),
    ];
    ConsistencyHarness::new(kernels).expect("three distinct kernels")
}

/// Runs forward and backward through `harness` for every seed and width.
fn assert_kernels_agree(harness: &ConsistencyHarness, mode: EdgeMode) {
    for seed in SEEDS {
        for width in WIDTHS {
            let RandomCase { source, params, mut rng } = random_case(seed, mode, width);
            let params = params.with_pads(42.0, -17.0);
            let beam = harness
                .compare_gather(&source, &params)
                .unwrap_or_else(|err| panic!("seed {seed}, width {width}: {err}"));
            assert_eq!(beam.shape(), &[width as usize, N_BATCH, N_DIM]);

            let upstream = upstream_like(beam.shape(), &mut rng);
            let grad = harness
                .compare_gather_grad(&upstream, &params, source.shape())
                .unwrap_or_else(|err| panic!("seed {seed}, width {width}: {err}"));
            assert_eq!(grad.source.shape(), source.shape());
            assert_eq!(grad.pad_left.is_some(), mode == EdgeMode::Pad);
            assert_eq!(grad.pad_right.is_some(), mode == EdgeMode::Pad);
        }
    }
}

#[test]
fn gradient_scatters_back_onto_wrapped_steps() {
    let shape = [10, 1];
    let params = BeamParams::new(vec![-2], vec![10], 4, EdgeMode::WrapAround);
    let upstream = Array::from_shape_vec(IxDyn(&[4, 1]), vec![0.0f32, 1.0, 2.0, 3.0]).unwrap();
    let grad = harness().compare_gather_grad(&upstream, &params, &shape).unwrap();
    assert_eq!(grad.source.shape(), &shape);
    assert_eq!(
        grad.source.iter().copied().collect::<Vec<_>>(),
        vec![2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]
    );
    assert_eq!((grad.pad_left, grad.pad_right), (None, None));
}

#[test]
fn overlapping_reads_accumulate() {
    // width 5 over 2 valid steps hits step 0 three times and step 1 twice
    let params = BeamParams::new(vec![0], vec![2], 5, EdgeMode::WrapAround);
    let upstream = Array::from_shape_vec(IxDyn(&[5, 1]), vec![1.0f32, 10.0, 100.0, 1000.0, 10000.0])
        .unwrap();
    let grad = harness().compare_gather_grad(&upstream, &params, &[3, 1]).unwrap();
    assert_eq!(
        grad.source.iter().copied().collect::<Vec<_>>(),
        vec![10101.0, 1010.0, 0.0]
    );
}

#[test]
fn random_wrap_kernels_agree() {
    assert_kernels_agree(&harness(), EdgeMode::WrapAround);
}

#[test]
fn random_pad_kernels_agree() {
    assert_kernels_agree(&harness(), EdgeMode::Pad);
}

#[test]
fn sequential_parallel_kernel_agrees() {
    let harness = harness_with_sequential_parallel();
    assert_eq!(harness.kernel_names(), vec!["parallel", "reference", "vectorized"]);
    assert_kernels_agree(&harness, EdgeMode::WrapAround);
    assert_kernels_agree(&harness, EdgeMode::Pad);
}

#[test]
fn random_pad_gradients_sum_pad_cells() {
    let RandomCase { source, params, mut rng } = random_case(123, EdgeMode::Pad, BEAM_WIDTH);
    let params = params.with_pads(42.0, -17.0);
    let harness = harness();
    let beam = harness.compare_gather(&source, &params).unwrap();

    let upstream = upstream_like(beam.shape(), &mut rng);
    let grad = harness
        .compare_gather_grad(&upstream, &params, source.shape())
        .unwrap();

    let (plan, _) = params.plan(source.shape()).unwrap();
    let (mut left, mut right) = (0.0f64, 0.0f64);
    for b in 0..N_BATCH {
        for i in 0..plan.beam_width() {
            let cell: f64 = upstream
                .index_axis(Axis(0), i)
                .index_axis(Axis(0), b)
                .iter()
                .map(|&v| v as f64)
                .sum();
            match plan.resolve(i, b) {
                SourceIndex::PadLeft => left += cell,
                SourceIndex::PadRight => right += cell,
                _ => {}
            }
        }
    }
    assert!(grad_close(grad.pad_left.unwrap(), left as f32));
    assert!(grad_close(grad.pad_right.unwrap(), right as f32));
}

#[test]
fn gradient_is_the_adjoint_of_the_beam() {
    let RandomCase { source, params, mut rng } = random_case(123, EdgeMode::Pad, BEAM_WIDTH);
    let params = params.with_pads(0.5, -2.0);
    let harness = harness();
    let beam = harness.compare_gather(&source, &params).unwrap();
    let upstream = upstream_like(beam.shape(), &mut rng);
    let grad = harness
        .compare_gather_grad(&upstream, &params, source.shape())
        .unwrap();

    let dot = |a: &ArrayD<f32>, b: &ArrayD<f32>| -> f64 {
        a.iter().zip(b.iter()).map(|(&x, &y)| x as f64 * y as f64).sum()
    };
    let lhs = dot(&beam, &upstream);
    let rhs = dot(&source, &grad.source)
        + 0.5 * grad.pad_left.unwrap() as f64
        - 2.0 * grad.pad_right.unwrap() as f64;
    assert!((lhs - rhs).abs() <= 1e-3 * lhs.abs().max(1.0), "lhs={lhs} rhs={rhs}");
}

#[test]
fn pad_gradients_are_zero_without_pad_cells() {
    let params = BeamParams::new(vec![1, 0], vec![4, 4], 3, EdgeMode::Pad);
    let upstream = ArrayD::from_elem(IxDyn(&[3, 2]), 1.0f32);
    let grad = harness().compare_gather_grad(&upstream, &params, &[4, 2]).unwrap();
    assert_eq!((grad.pad_left, grad.pad_right), (Some(0.0), Some(0.0)));
    assert_eq!(grad.source.sum(), 6.0);
}

#[test]
fn degenerate_columns_receive_no_gradient() {
    let params = BeamParams::new(vec![0, 3], vec![2, 0], 3, EdgeMode::WrapAround);
    let upstream = ArrayD::from_elem(IxDyn(&[3, 2]), 1.0f32);
    let grad = harness().compare_gather_grad(&upstream, &params, &[2, 2]).unwrap();
    let col = grad.source.index_axis(Axis(1), 1).iter().copied().collect::<Vec<_>>();
    assert_eq!(col, vec![0.0, 0.0]);
    assert_eq!(grad.source.sum(), 3.0);
}

#[test]
fn zero_width_gradient_is_all_zero() {
    let params = BeamParams::new(vec![-4, 7], vec![5, 5], 0, EdgeMode::Pad);
    let upstream = ArrayD::<f32>::zeros(IxDyn(&[0, 2, 3]));
    let grad = harness()
        .compare_gather_grad(&upstream, &params, &[5, 2, 3])
        .unwrap();
    assert_eq!(grad.source, ArrayD::<f32>::zeros(IxDyn(&[5, 2, 3])));
    assert_eq!((grad.pad_left, grad.pad_right), (Some(0.0), Some(0.0)));
}

#[test]
fn upstream_with_wrong_shape_is_rejected() {
    let params = BeamParams::new(vec![0], vec![4], 2, EdgeMode::WrapAround);
    let upstream = ArrayD::<f32>::zeros(IxDyn(&[3, 1]));
    assert!(matches!(
        harness().compare_gather_grad(&upstream, &params, &[4, 1]),
        Err(BeamError::ShapeMismatch { label: "upstream_grad", .. })
    ));
}
