use ndarray::{Array1, Array2};
use std::f64::consts::PI;
use tsmask::core::multitemporal::{multitemp_mask, RobustMaskParams};
use tsmask::MaskError;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 20 observations over two years with a seasonal cycle and small noise
fn two_year_series() -> (Array1<f64>, Array2<f64>) {
    let n = 20;
    let x = Array1::from_shape_fn(n, |i| 730120.0 + 38.0 * i as f64);
    let mut y = Array2::zeros((6, n));
    for i in 0..n {
        let phase = 2.0 * PI * x[i] / 365.25;
        let noise = (i as f64 * 1.7).sin() * 10.0;
        y[[0, i]] = 600.0 + 100.0 * phase.sin() + noise;
        y[[1, i]] = 1000.0 + 300.0 * phase.sin() + noise;
        y[[2, i]] = 900.0 + 250.0 * phase.sin() - noise;
        y[[3, i]] = 2500.0 + 600.0 * phase.sin() + noise;
        y[[4, i]] = 2000.0 + 200.0 * phase.cos() - noise;
        y[[5, i]] = 1200.0 + 150.0 * phase.cos() + noise;
    }
    (x, y)
}

#[test]
fn test_constant_bands_are_degenerate() {
    init_logging();

    let x = Array1::from_shape_fn(20, |i| 730120.0 + 38.0 * i as f64);
    let mut y = Array2::zeros((5, 20));
    y.row_mut(1).fill(1000.0);
    y.row_mut(4).fill(2000.0);

    let result = multitemp_mask(x.view(), y.view(), &RobustMaskParams::new(2.0));
    match result {
        Err(MaskError::DegenerateFit(msg)) => println!("Degenerate fit reported: {}", msg),
        other => panic!("expected a degenerate fit, got {:?}", other),
    }
}

#[test]
fn test_perturbed_green_points_are_masked() {
    init_logging();

    let (x, mut y) = two_year_series();
    let clouds = [4, 13];
    for &i in &clouds {
        y[[1, i]] += 2000.0;
    }

    let mask = multitemp_mask(x.view(), y.view(), &RobustMaskParams::new(2.0)).unwrap();

    assert_eq!(mask.len(), 20);
    for (i, &clear) in mask.iter().enumerate() {
        assert_eq!(clear, !clouds.contains(&i), "observation {}", i);
    }
}

#[test]
fn test_dark_swir1_is_masked_as_shadow() {
    let (x, mut y) = two_year_series();
    y[[4, 7]] -= 1500.0;

    let mask = multitemp_mask(x.view(), y.view(), &RobustMaskParams::new(2.0)).unwrap();
    assert!(!mask[7]);
    assert_eq!(mask.iter().filter(|&&m| !m).count(), 1);
}

#[test]
fn test_band_roles_are_not_interchangeable() {
    let (x, y) = two_year_series();

    // Darkening in green and brightening in SWIR1 do not look like cloud or shadow
    let mut swapped = y.clone();
    swapped[[1, 9]] -= 2000.0;
    swapped[[4, 15]] += 2000.0;
    let mask = multitemp_mask(x.view(), swapped.view(), &RobustMaskParams::new(2.0)).unwrap();
    assert!(mask.iter().all(|&m| m));

    // The same magnitudes in the physical direction are masked
    let mut physical = y.clone();
    physical[[1, 9]] += 2000.0;
    physical[[4, 15]] -= 2000.0;
    let mask = multitemp_mask(x.view(), physical.view(), &RobustMaskParams::new(2.0)).unwrap();
    assert!(!mask[9]);
    assert!(!mask[15]);
}

#[test]
fn test_robust_mask_is_idempotent() {
    let (x, mut y) = two_year_series();
    y[[1, 3]] += 900.0;
    y[[4, 11]] -= 700.0;

    let params = RobustMaskParams::new(2.0);
    let first = multitemp_mask(x.view(), y.view(), &params).unwrap();
    let second = multitemp_mask(x.view(), y.view(), &params).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_raising_crit_never_masks_more() {
    let (x, mut y) = two_year_series();
    let bumps = [(1, 2, 150.0), (1, 6, 350.0), (1, 10, 700.0), (4, 12, -250.0), (4, 17, -1200.0)];
    for &(band, i, delta) in &bumps {
        y[[band, i]] += delta;
    }

    let crits = [50.0, 100.0, 200.0, 400.0, 800.0, 1600.0];
    let masks: Vec<_> = crits
        .iter()
        .map(|&crit| {
            let mut params = RobustMaskParams::new(2.0);
            params.crit = crit;
            multitemp_mask(x.view(), y.view(), &params).unwrap()
        })
        .collect();

    for pair in masks.windows(2) {
        for (low, high) in pair[0].iter().zip(pair[1].iter()) {
            assert!(!*low || *high, "a clear observation became masked at a higher crit");
        }
    }

    let clear_counts: Vec<usize> = masks.iter().map(|m| m.iter().filter(|&&c| c).count()).collect();
    println!("Clear observations per crit {:?}: {:?}", crits, clear_counts);
    assert!(clear_counts.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_custom_band_indices() {
    let (x, mut y) = two_year_series();
    y[[2, 5]] += 2500.0;

    let mut params = RobustMaskParams::new(2.0);
    params.bands.green = 2;
    params.bands.swir1 = 5;

    let mask = multitemp_mask(x.view(), y.view(), &params).unwrap();
    assert!(!mask[5]);
    assert_eq!(mask.iter().filter(|&&m| !m).count(), 1);
}

/// Less than one year of observations, so both harmonic pairs coincide
fn one_year_series() -> (Array1<f64>, Array2<f64>) {
    let n = 23;
    let x = Array1::from_shape_fn(n, |i| 730120.0 + 16.0 * i as f64);
    let mut y = Array2::zeros((6, n));
    for i in 0..n {
        let phase = 2.0 * PI * x[i] / 365.25;
        let noise = (i as f64 * 1.7).sin() * 10.0;
        for b in 0..6 {
            y[[b, i]] = 800.0 + 100.0 * b as f64 + 150.0 * phase.sin() + noise;
        }
        y[[1, i]] = 1000.0 + 300.0 * phase.sin() + noise;
        y[[4, i]] = 2000.0 + 200.0 * phase.cos() - noise;
    }
    (x, y)
}

#[test]
fn test_single_year_window_masks_normally() {
    init_logging();

    let (x, mut y) = one_year_series();
    y[[1, 10]] += 2000.0;

    for n_year in [1.0, 0.8] {
        let mask = multitemp_mask(x.view(), y.view(), &RobustMaskParams::new(n_year)).unwrap();
        for (i, &clear) in mask.iter().enumerate() {
            assert_eq!(clear, i != 10, "n_year {} observation {}", n_year, i);
        }
    }
}

#[test]
fn test_exactly_modelled_band_is_not_degenerate() {
    init_logging();

    // Both diagnostic bands lie exactly in the span of the harmonic basis
    let n = 40;
    let x = Array1::from_shape_fn(n, |i| 730120.0 + 16.0 * i as f64);
    let mut y = Array2::zeros((6, n));
    for i in 0..n {
        let phase = 2.0 * PI * x[i] / 365.25;
        for b in 0..6 {
            y[[b, i]] = 700.0 + 100.0 * b as f64 + 120.0 * phase.sin();
        }
        y[[1, i]] = 1000.0 + 300.0 * phase.sin() + 50.0 * (phase / 2.0).cos();
        y[[4, i]] = 2000.0 + 200.0 * phase.cos() - 60.0 * (phase / 2.0).sin();
    }
    y[[1, 10]] += 2000.0;

    let mask = multitemp_mask(x.view(), y.view(), &RobustMaskParams::new(2.0)).unwrap();
    for (i, &clear) in mask.iter().enumerate() {
        assert_eq!(clear, i != 10, "observation {}", i);
    }
}
