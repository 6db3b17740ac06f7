use crate::core::multitemporal::{multitemp_mask, smooth_mask, RobustMaskParams, SmoothMaskParams};
use crate::types::{MaskError, MaskResult, Mask, ObservationSeries};
use serde::{Deserialize, Serialize};

/// Which temporal masking policy to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaskingStrategy {
    /// Bisquare harmonic regression
    Robust(RobustMaskParams),
    /// LOWESS with span retry
    Smooth(SmoothMaskParams),
}

impl MaskingStrategy {
    /// Mask one pixel's series
    pub fn apply(&self, series: &ObservationSeries) -> MaskResult<Mask> {
        match self {
            MaskingStrategy::Robust(params) => multitemp_mask(series.dates(), series.bands(), params),
            MaskingStrategy::Smooth(params) => smooth_mask(series.dates(), series.bands(), params),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MaskingStrategy::Robust(_) => "robust",
            MaskingStrategy::Smooth(_) => "smooth",
        }
    }
}

/// What to do with a pixel whose robust fit is degenerate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DegeneratePolicy {
    /// Mark every observation of the pixel invalid
    #[default]
    MaskAll,
    /// Report the error for that pixel
    Propagate,
}

/// Block masking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockParams {
    pub strategy: MaskingStrategy,
    #[serde(default)]
    pub degenerate_policy: DegeneratePolicy,
}

/// Mask of one pixel in a block, or the error that pixel produced
#[derive(Debug)]
pub struct PixelMask {
    /// Position of the pixel in the input block
    pub index: usize,
    pub result: MaskResult<Mask>,
    /// True when the mask replaced a degenerate fit
    pub degenerate: bool,
}

/// Tally of a block run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSummary {
    pub pixels: usize,
    pub masked_pixels: usize,
    pub degenerate_pixels: usize,
    pub failed_pixels: usize,
    pub clear_observations: usize,
    pub total_observations: usize,
}

/// Applies one masking strategy over a block of pixels
pub struct BlockMasker {
    params: BlockParams,
}

impl BlockMasker {
    pub fn new(strategy: MaskingStrategy) -> Self {
        Self::with_params(BlockParams {
            strategy,
            degenerate_policy: DegeneratePolicy::default(),
        })
    }

    pub fn with_params(params: BlockParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BlockParams {
        &self.params
    }

    /// Mask one pixel, applying the degenerate policy
    pub fn mask_pixel(&self, index: usize, series: &ObservationSeries) -> PixelMask {
        match self.params.strategy.apply(series) {
            Err(MaskError::DegenerateFit(msg)) if self.params.degenerate_policy == DegeneratePolicy::MaskAll => {
                log::debug!("Pixel {}: degenerate fit ({}), masking all observations", index, msg);
                PixelMask {
                    index,
                    result: Ok(Mask::from_elem(series.len(), false)),
                    degenerate: true,
                }
            }
            result => {
                if let Err(e) = &result {
                    log::warn!("Pixel {}: {} masking failed: {}", index, self.params.strategy.name(), e);
                }
                PixelMask {
                    index,
                    result,
                    degenerate: false,
                }
            }
        }
    }

    /// Mask every pixel of a block; one pixel's failure never stops the rest
    pub fn mask_block(&self, pixels: &[ObservationSeries]) -> Vec<PixelMask> {
        log::info!(
            "Applying {} temporal masking to {} pixels",
            self.params.strategy.name(),
            pixels.len()
        );

        #[cfg(feature = "parallel")]
        let results: Vec<PixelMask> = {
            use rayon::prelude::*;
            pixels
                .par_iter()
                .enumerate()
                .map(|(i, series)| self.mask_pixel(i, series))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<PixelMask> = pixels
            .iter()
            .enumerate()
            .map(|(i, series)| self.mask_pixel(i, series))
            .collect();

        let summary = summarize(&results);
        log::info!(
            "Temporal masking completed: {} pixels, {} degenerate, {} failed, {}/{} observations clear",
            summary.pixels,
            summary.degenerate_pixels,
            summary.failed_pixels,
            summary.clear_observations,
            summary.total_observations
        );
        results
    }
}

/// Count outcomes of a block run
pub fn summarize(results: &[PixelMask]) -> BlockSummary {
    let mut summary = BlockSummary {
        pixels: results.len(),
        ..BlockSummary::default()
    };

    for pixel in results {
        if pixel.degenerate {
            summary.degenerate_pixels += 1;
        }
        match &pixel.result {
            Ok(mask) => {
                summary.masked_pixels += 1;
                summary.total_observations += mask.len();
                summary.clear_observations += mask.iter().filter(|&&m| m).count();
            }
            Err(_) => summary.failed_pixels += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn flat_series(n: usize) -> ObservationSeries {
        let dates = Array1::from_shape_fn(n, |i| 730000.0 + 16.0 * i as f64);
        let bands = Array2::from_elem((5, n), 1000.0);
        ObservationSeries::new(dates, bands).unwrap()
    }

    fn noisy_series(n: usize) -> ObservationSeries {
        let dates = Array1::from_shape_fn(n, |i| 730000.0 + 16.0 * i as f64);
        let bands = Array2::from_shape_fn((5, n), |(b, i)| {
            1000.0 + 100.0 * b as f64 + 250.0 * (dates[i] * 2.0 * std::f64::consts::PI / 365.25).cos()
                + (i as f64 * 2.3).sin() * 20.0
        });
        ObservationSeries::new(dates, bands).unwrap()
    }

    #[test]
    fn test_degenerate_pixel_is_fully_masked() {
        let masker = BlockMasker::new(MaskingStrategy::Robust(RobustMaskParams::new(2.0)));
        let pixel = masker.mask_pixel(0, &flat_series(20));

        assert!(pixel.degenerate);
        let mask = pixel.result.unwrap();
        assert_eq!(mask.len(), 20);
        assert!(mask.iter().all(|&m| !m));
    }

    #[test]
    fn test_degenerate_pixel_can_propagate() {
        let masker = BlockMasker::with_params(BlockParams {
            strategy: MaskingStrategy::Robust(RobustMaskParams::new(2.0)),
            degenerate_policy: DegeneratePolicy::Propagate,
        });
        let pixel = masker.mask_pixel(3, &flat_series(20));

        assert_eq!(pixel.index, 3);
        assert!(!pixel.degenerate);
        assert!(matches!(pixel.result, Err(MaskError::DegenerateFit(_))));
    }

    #[test]
    fn test_block_keeps_order_and_isolates_failures() {
        let masker = BlockMasker::new(MaskingStrategy::Robust(RobustMaskParams::new(2.0)));

        let three_band = ObservationSeries::new(
            Array1::from_shape_fn(20, |i| 730000.0 + 16.0 * i as f64),
            Array2::from_elem((3, 20), 500.0),
        )
        .unwrap();
        let pixels = vec![noisy_series(40), three_band, flat_series(20), noisy_series(30)];

        let results = masker.mask_block(&pixels);
        assert_eq!(results.len(), 4);
        for (i, pixel) in results.iter().enumerate() {
            assert_eq!(pixel.index, i);
        }
        assert!(matches!(results[1].result, Err(MaskError::InvalidParameter(_))));

        let summary = summarize(&results);
        assert_eq!(summary.pixels, 4);
        assert_eq!(summary.failed_pixels, 1);
        assert_eq!(summary.degenerate_pixels, 1);
        assert_eq!(summary.masked_pixels, 3);
        assert_eq!(summary.total_observations, 90);
    }
}
