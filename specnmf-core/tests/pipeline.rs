//! End-to-end behaviour of `decompose` and `resynthesize_component`.

use std::f64::consts::PI;

use specnmf_core::nmf::estimate_total;
use specnmf_core::dsp::{magnitude::magnitude, stft::Stft};
use specnmf_core::{Matrix, NmfError, NmfOptions, NmfPipeline};

const SAMPLE_RATE: usize = 44100;

fn options(components: usize, iterations: usize, seed: Option<u64>) -> NmfOptions {
    NmfOptions {
        components,
        iterations,
        fft_size: 1024,
        window_size: Some(1024),
        hop_size: Some(512),
        seed,
        ..Default::default()
    }
}

/// Two notes that alternate: a low tone, then a high tone, then both.
fn two_notes(n_samples: usize) -> Vec<f64> {
    let third = n_samples / 3;
    (0..n_samples)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            let low = (2.0 * PI * 220.0 * t).sin();
            let high = 0.6 * (2.0 * PI * 1760.0 * t).sin();
            match i / third {
                0 => low,
                1 => high,
                _ => low + high,
            }
        })
        .collect()
}

#[test]
fn silence_decomposes_without_error() {
    let pipeline = NmfPipeline::<f64>::from_options(&options(1, 10, None)).unwrap();
    let signal = vec![0.0; SAMPLE_RATE];

    let d = pipeline.decompose(&signal).unwrap();

    assert!(d.converged);
    assert_eq!(d.bases.shape(), (1, 513));
    assert_eq!(d.activations.shape(), (87, 1));
    assert!(d.bases.as_slice().iter().all(|&x| x.abs() < 1e-12));
    assert!(d.activations.as_slice().iter().all(|&x| x.abs() < 1e-12));
}

#[test]
fn single_sine_is_captured_by_one_component() {
    let opts = options(1, 100, Some(5));
    let pipeline = NmfPipeline::<f64>::from_options(&opts).unwrap();
    // bin 40 exactly, so every frame sees the same magnitude spectrum
    let n_samples = 64 * 512;
    let signal: Vec<f64> = (0..n_samples)
        .map(|i| (2.0 * PI * 40.0 * i as f64 / 1024.0).sin())
        .collect();

    let d = pipeline.decompose(&signal).unwrap();
    let total = estimate_total(&d.bases, &d.activations).unwrap();

    let stft = Stft::<f64>::new(1024, 1024, 512, Default::default()).unwrap();
    let original = magnitude(&stft.analyze(&signal).unwrap());
    assert_eq!(total.shape(), original.shape());

    let err: f64 = original
        .as_slice()
        .iter()
        .zip(total.as_slice())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt();
    let norm: f64 = original.as_slice().iter().map(|a| a * a).sum::<f64>().sqrt();
    assert!(err / norm < 0.02, "relative reconstruction error {}", err / norm);
}

#[test]
fn component_index_past_range_is_rejected() {
    let pipeline = NmfPipeline::<f64>::from_options(&options(2, 5, Some(1))).unwrap();
    let signal = two_notes(SAMPLE_RATE / 2);
    let d = pipeline.decompose(&signal).unwrap();

    let err = pipeline
        .resynthesize_component(&signal, &d.bases, &d.activations, 2)
        .unwrap_err();
    assert_eq!(err, NmfError::IndexOutOfRange { index: 2, count: 2 });
}

#[test]
fn signal_shorter_than_window_is_rejected() {
    let pipeline = NmfPipeline::<f64>::from_options(&options(1, 5, Some(1))).unwrap();
    let signal = vec![0.1; 1000];

    let err = pipeline.decompose(&signal).unwrap_err();
    assert_eq!(
        err,
        NmfError::InputTooShort {
            len: 1000,
            window_size: 1024
        }
    );

    let bases = Matrix::zeros(1, 513);
    let activations = Matrix::zeros(2, 1);
    assert!(matches!(
        pipeline.resynthesize_component(&signal, &bases, &activations, 0),
        Err(NmfError::InputTooShort { .. })
    ));
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    for opts in [options(0, 10, None), options(1, 0, None)] {
        assert!(matches!(
            NmfPipeline::<f64>::from_options(&opts),
            Err(NmfError::Configuration(_))
        ));
    }
    let opts = NmfOptions {
        fft_size: 512,
        window_size: Some(1024),
        ..Default::default()
    };
    assert!(matches!(
        NmfPipeline::<f32>::from_options(&opts),
        Err(NmfError::Configuration(_))
    ));
}

#[test]
fn same_seed_gives_identical_factorization() {
    let opts = options(3, 30, Some(1234));
    let signal = two_notes(SAMPLE_RATE / 2);

    let a = NmfPipeline::<f64>::from_options(&opts).unwrap().decompose(&signal).unwrap();
    let b = NmfPipeline::<f64>::from_options(&opts).unwrap().decompose(&signal).unwrap();

    assert_eq!(a.bases, b.bases);
    assert_eq!(a.activations, b.activations);
}

#[test]
fn factors_are_non_negative() {
    let signal = two_notes(SAMPLE_RATE / 2);
    for iterations in [1, 10, 60] {
        let pipeline = NmfPipeline::<f64>::from_options(&options(3, iterations, Some(9))).unwrap();
        let d = pipeline.decompose(&signal).unwrap();
        assert!(d.bases.as_slice().iter().all(|&x| x >= 0.0));
        assert!(d.activations.as_slice().iter().all(|&x| x >= 0.0));
    }
}

#[test]
fn resynthesis_accepts_factorization_from_elsewhere() {
    let signal = two_notes(SAMPLE_RATE / 2);
    let decomposer = NmfPipeline::<f64>::from_options(&options(2, 40, Some(3))).unwrap();
    let d = decomposer.decompose(&signal).unwrap();

    // A different pipeline with the same grid, but another rank and seed
    let other = NmfPipeline::<f64>::from_options(&options(5, 1, None)).unwrap();
    let out = other
        .resynthesize_component(&signal, &d.bases, &d.activations, 1)
        .unwrap();
    assert_eq!(out.len(), signal.len());
    assert!(out.iter().all(|x| x.is_finite()));
}

#[test]
fn resynthesize_all_matches_single_component_calls() {
    let signal = two_notes(SAMPLE_RATE / 2);
    let pipeline = NmfPipeline::<f64>::from_options(&options(2, 20, Some(21))).unwrap();
    let d = pipeline.decompose(&signal).unwrap();

    let all = pipeline
        .resynthesize_all(&signal, &d.bases, &d.activations)
        .unwrap();
    assert_eq!(all.len(), 2);
    for (k, component) in all.iter().enumerate() {
        let single = pipeline
            .resynthesize_component(&signal, &d.bases, &d.activations, k)
            .unwrap();
        assert_eq!(component, &single);
    }
}

#[test]
fn single_precision_pipeline() {
    let signal: Vec<f32> = two_notes(SAMPLE_RATE / 4).into_iter().map(|x| x as f32).collect();
    let pipeline = NmfPipeline::<f32>::from_options(&options(2, 20, Some(2))).unwrap();
    let d = pipeline.decompose(&signal).unwrap();
    let out = pipeline
        .resynthesize_component(&signal, &d.bases, &d.activations, 0)
        .unwrap();
    assert_eq!(out.len(), signal.len());
    assert!(out.iter().all(|x| x.is_finite()));
}
