//! Core masking modules

pub mod harmonic;
pub mod robust;
pub mod lowess;
pub mod multitemporal;
pub mod valid_range;
pub mod block;
pub mod diagnostics;

// Re-export main types
pub use harmonic::{design_matrix, design_matrix_with, HarmonicParams, DAYS_PER_YEAR};
pub use robust::{bisquare, mad, RobustFit, RobustFitParams, RobustLinearModel};
pub use lowess::{lowess, Lowess, LowessFit, LowessParams};
pub use multitemporal::{
    multitemp_mask, multitemp_mask_with_diagnostics, smooth_mask, smooth_mask_outcome,
    smooth_mask_with_diagnostics, threshold_mask, RobustMaskParams, SmoothMaskOutcome, SmoothMaskParams,
};
pub use valid_range::{prepare_series, valid_range_mask, ValidRangeParams};
pub use block::{summarize, BlockMasker, BlockParams, BlockSummary, DegeneratePolicy, MaskingStrategy, PixelMask};
pub use diagnostics::{CollectingSink, DiagnosticsSink, LogSink, MaskDiagnostics};
