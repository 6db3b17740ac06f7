//! Optional inspection of masking results.
//!
//! Masking never depends on a sink; the `*_with_diagnostics` variants in
//! `multitemporal` hand one record per diagnostic band to whichever sink the
//! caller supplies (a plotting front end, a logger, a test collector).

use serde::{Deserialize, Serialize};

/// One band's series, the fitted baseline and the resulting mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskDiagnostics {
    /// Row of the band in the band matrix
    pub band: usize,
    pub dates: Vec<f64>,
    pub values: Vec<f64>,
    pub mask: Vec<bool>,
    /// Baseline in the same order as `dates`
    pub fitted: Vec<f64>,
}

impl MaskDiagnostics {
    pub fn clear_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    pub fn masked_count(&self) -> usize {
        self.mask.len() - self.clear_count()
    }

    /// Observed minus fitted value per observation
    pub fn residuals(&self) -> Vec<f64> {
        self.values
            .iter()
            .zip(&self.fitted)
            .map(|(v, f)| v - f)
            .collect()
    }
}

/// Receiver of diagnostics records
pub trait DiagnosticsSink {
    fn record(&mut self, diagnostics: MaskDiagnostics);
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Vec<MaskDiagnostics>,
}

impl CollectingSink {
    pub fn records(&self) -> &[MaskDiagnostics] {
        &self.records
    }

    pub fn into_records(self) -> Vec<MaskDiagnostics> {
        self.records
    }
}

impl DiagnosticsSink for CollectingSink {
    fn record(&mut self, diagnostics: MaskDiagnostics) {
        self.records.push(diagnostics);
    }
}

/// Writes records through the `log` facade at debug level
#[derive(Debug, Default)]
pub struct LogSink {
    /// Also log one line per observation
    pub per_observation: bool,
}

impl DiagnosticsSink for LogSink {
    fn record(&mut self, diagnostics: MaskDiagnostics) {
        log::debug!(
            "Band {}: {} clear, {} contaminated",
            diagnostics.band,
            diagnostics.clear_count(),
            diagnostics.masked_count()
        );

        if self.per_observation {
            for (i, resid) in diagnostics.residuals().iter().enumerate() {
                log::debug!(
                    "  date={:.0} value={:.1} fitted={:.1} resid={:.1} clear={}",
                    diagnostics.dates[i],
                    diagnostics.values[i],
                    diagnostics.fitted[i],
                    resid,
                    diagnostics.mask[i]
                );
            }
        }
    }
}
