// SPDX-License-Identifier: MPL-2.0
//! Frame timestamp index.
//!
//! Maps media time to frame indices. Constant-rate media uses the closed-form
//! `floor(t * fps)`; variable-frame-rate media uses a probed, sorted list of
//! presentation timestamps searched with a binary search.
//!
//! Probing runs once in the background; until it completes, the constant-rate
//! table stands in.

use super::time_units::{frame_at, frame_start_secs};
use crate::config::FALLBACK_FRAME_RATE;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Probe returning one presentation timestamp per frame.
pub type TimestampProbe = Arc<dyn Fn() -> Result<Vec<f64>> + Send + Sync>;

/// Frame index ↔ presentation time mapping. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampTable {
    Constant { fps: f64, frame_count: usize },
    Variable { pts: Vec<f64>, nominal_fps: f64 },
}

impl TimestampTable {
    #[must_use]
    pub fn constant(fps: f64, frame_count: usize) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            FALLBACK_FRAME_RATE
        };
        Self::Constant {
            fps,
            frame_count: frame_count.max(1),
        }
    }

    /// Builds a variable-rate table, or `None` if `pts` holds no usable times.
    ///
    /// Timestamps are sorted so the table is monotonically non-decreasing.
    #[must_use]
    pub fn variable(mut pts: Vec<f64>, nominal_fps: f64) -> Option<Self> {
        pts.retain(|t| t.is_finite());
        if pts.is_empty() {
            return None;
        }
        pts.sort_by(f64::total_cmp);
        let nominal_fps = if nominal_fps.is_finite() && nominal_fps > 0.0 {
            nominal_fps
        } else {
            FALLBACK_FRAME_RATE
        };
        Some(Self::Variable { pts, nominal_fps })
    }

    #[must_use]
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable { .. })
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        match self {
            Self::Constant { frame_count, .. } => *frame_count,
            Self::Variable { pts, .. } => pts.len(),
        }
    }

    fn last_index(&self) -> usize {
        self.frame_count().saturating_sub(1)
    }

    /// Index of the frame on screen at `secs`, clamped to the last frame.
    #[must_use]
    pub fn frame_for_time(&self, secs: f64) -> usize {
        match self {
            Self::Constant { fps, .. } => frame_at(secs, *fps).min(self.last_index()),
            Self::Variable { pts, .. } => pts
                .partition_point(|&t| t <= secs)
                .saturating_sub(1)
                .min(self.last_index()),
        }
    }

    /// Presentation time of frame `index` (clamped to the last frame).
    #[must_use]
    pub fn time_for_frame(&self, index: usize) -> f64 {
        let index = index.min(self.last_index());
        match self {
            Self::Constant { fps, .. } => frame_start_secs(index, *fps),
            Self::Variable { pts, .. } => pts[index],
        }
    }

    /// Instantaneous frame rate at `index`, from the gap to the next frame.
    #[must_use]
    pub fn frame_rate_at(&self, index: usize) -> f64 {
        match self {
            Self::Constant { fps, .. } => *fps,
            Self::Variable { pts, nominal_fps } => {
                let index = index.min(pts.len().saturating_sub(1));
                let gap = match (pts.get(index), pts.get(index + 1)) {
                    (Some(a), Some(b)) => b - a,
                    _ if index > 0 => pts[index] - pts[index - 1],
                    _ => 0.0,
                };
                if gap > 0.0 {
                    1.0 / gap
                } else {
                    *nominal_fps
                }
            }
        }
    }

    fn instantaneous_rates(&self) -> Vec<f64> {
        match self {
            Self::Constant { fps, .. } => vec![*fps],
            Self::Variable { pts, nominal_fps } => {
                let rates: Vec<f64> = pts
                    .windows(2)
                    .map(|w| w[1] - w[0])
                    .filter(|gap| *gap > 0.0)
                    .map(|gap| 1.0 / gap)
                    .collect();
                if rates.is_empty() {
                    vec![*nominal_fps]
                } else {
                    rates
                }
            }
        }
    }

    #[must_use]
    pub fn min_frame_rate(&self) -> f64 {
        self.instantaneous_rates()
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    }

    #[must_use]
    pub fn max_frame_rate(&self) -> f64 {
        self.instantaneous_rates().into_iter().fold(0.0, f64::max)
    }

    /// Average rate over the whole table.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_frame_rate(&self) -> f64 {
        match self {
            Self::Constant { fps, .. } => *fps,
            Self::Variable { pts, nominal_fps } => {
                let span = pts.last().copied().unwrap_or(0.0) - pts[0];
                if pts.len() > 1 && span > 0.0 {
                    (pts.len() - 1) as f64 / span
                } else {
                    *nominal_fps
                }
            }
        }
    }
}

/// The table in use plus an optional background probe that will replace it.
pub struct TimestampIndex {
    table: TimestampTable,
    fallback: TimestampTable,
    pending: Option<oneshot::Receiver<Result<Vec<f64>>>>,
    nominal_fps: f64,
}

impl TimestampIndex {
    /// An index that stays on `table` forever.
    #[must_use]
    pub fn fixed(table: TimestampTable) -> Self {
        let nominal_fps = table.avg_frame_rate();
        Self {
            fallback: table.clone(),
            table,
            pending: None,
            nominal_fps,
        }
    }

    /// Starts `probe` on the runtime's blocking pool; `fallback` is used
    /// until it finishes, and for good if it fails.
    #[must_use]
    pub fn probing(
        fallback: TimestampTable,
        probe: &TimestampProbe,
        runtime: &tokio::runtime::Handle,
    ) -> Self {
        let mut index = Self::fixed(fallback);
        index.start_probe(probe, runtime);
        index
    }

    /// Drops the current table and probes again.
    pub fn rebuild(&mut self, probe: &TimestampProbe, runtime: &tokio::runtime::Handle) {
        self.table = self.fallback.clone();
        self.start_probe(probe, runtime);
    }

    fn start_probe(&mut self, probe: &TimestampProbe, runtime: &tokio::runtime::Handle) {
        let (tx, rx) = oneshot::channel();
        let probe = Arc::clone(probe);
        runtime.spawn_blocking(move || {
            let _ = tx.send(probe());
        });
        self.pending = Some(rx);
    }

    /// Installs the probed table if the probe has finished.
    ///
    /// Returns true when the table changed.
    pub fn poll(&mut self) -> bool {
        let Some(rx) = self.pending.as_mut() else {
            return false;
        };
        match rx.try_recv() {
            Ok(Ok(pts)) => {
                self.pending = None;
                match TimestampTable::variable(pts, self.nominal_fps) {
                    Some(table) => {
                        log::debug!(
                            "timestamp probe finished: {} frames, {:.3}-{:.3} fps",
                            table.frame_count(),
                            table.min_frame_rate(),
                            table.max_frame_rate()
                        );
                        self.table = table;
                        true
                    }
                    None => false,
                }
            }
            Ok(Err(e)) => {
                self.pending = None;
                log::warn!("timestamp probe failed, assuming constant frame rate: {e}");
                false
            }
            Err(oneshot::error::TryRecvError::Empty) => false,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.pending = None;
                false
            }
        }
    }

    #[must_use]
    pub fn table(&self) -> &TimestampTable {
        &self.table
    }

    #[must_use]
    pub fn is_probing(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_utils::assert_abs_diff_eq;
    use std::time::Duration;

    #[test]
    fn constant_lookup_is_floor() {
        let table = TimestampTable::constant(24.0, 240);
        for step in 0..1000 {
            let t = f64::from(step) * 0.00999;
            let expected = ((t * 24.0).floor() as usize).min(239);
            assert_eq!(table.frame_for_time(t), expected, "t = {t}");
        }
    }

    #[test]
    fn constant_lookup_clamps_to_last_frame() {
        let table = TimestampTable::constant(24.0, 240);
        assert_eq!(table.frame_for_time(10.0), 239);
        assert_eq!(table.frame_for_time(1e9), 239);
        assert_eq!(table.frame_for_time(-5.0), 0);
    }

    #[test]
    fn variable_lookup_uses_binary_search() {
        let table = TimestampTable::variable(vec![0.0, 0.04, 0.1, 0.5, 0.52], 25.0).unwrap();
        assert_eq!(table.frame_count(), 5);
        assert_eq!(table.frame_for_time(0.0), 0);
        assert_eq!(table.frame_for_time(0.039), 0);
        assert_eq!(table.frame_for_time(0.04), 1);
        assert_eq!(table.frame_for_time(0.3), 2);
        assert_eq!(table.frame_for_time(0.51), 3);
        assert_eq!(table.frame_for_time(99.0), 4);
        assert_abs_diff_eq!(table.time_for_frame(3), 0.5);
    }

    #[test]
    fn variable_table_reports_rates() {
        let table = TimestampTable::variable(vec![0.0, 0.1, 0.15, 0.2], 20.0).unwrap();
        assert_abs_diff_eq!(table.frame_rate_at(0), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(table.frame_rate_at(1), 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(table.frame_rate_at(3), 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(table.min_frame_rate(), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(table.max_frame_rate(), 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(table.avg_frame_rate(), 15.0, epsilon = 1e-9);
    }

    #[test]
    fn variable_table_sorts_input() {
        let table = TimestampTable::variable(vec![0.2, 0.0, 0.1], 10.0).unwrap();
        assert_eq!(
            table,
            TimestampTable::Variable {
                pts: vec![0.0, 0.1, 0.2],
                nominal_fps: 10.0
            }
        );
        assert!(TimestampTable::variable(vec![f64::NAN], 10.0).is_none());
    }

    #[test]
    fn zero_rate_uses_fallback() {
        let table = TimestampTable::constant(0.0, 0);
        assert_abs_diff_eq!(table.avg_frame_rate(), FALLBACK_FRAME_RATE);
        assert_eq!(table.frame_count(), 1);
    }

    fn wait_for_probe(index: &mut TimestampIndex) -> bool {
        for _ in 0..200 {
            if index.poll() {
                return true;
            }
            if !index.is_probing() {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn probe_result_replaces_constant_table() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let probe: TimestampProbe = Arc::new(|| Ok(vec![0.0, 0.05, 0.2]));
        let mut index =
            TimestampIndex::probing(TimestampTable::constant(10.0, 3), &probe, runtime.handle());

        assert!(wait_for_probe(&mut index));
        assert!(index.table().is_variable());
        assert_eq!(index.table().frame_for_time(0.1), 1);
    }

    #[test]
    fn failed_probe_keeps_constant_table() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let probe: TimestampProbe =
            Arc::new(|| Err(Error::VideoStream("no packets".to_string())));
        let mut index =
            TimestampIndex::probing(TimestampTable::constant(10.0, 3), &probe, runtime.handle());

        assert!(!wait_for_probe(&mut index));
        assert!(!index.table().is_variable());
        assert!(!index.is_probing());
    }
}
