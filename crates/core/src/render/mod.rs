use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use crate::{ChartConfig, FrameSnapshot, Result, Sink};

/// Chart-facing sink. Keeps a rolling per-metric history of the snapshot
/// stream, limited to the blocks inside the visible window.
#[derive(Debug)]
pub struct ChartFeed {
    config: ChartConfig,
    series: BTreeMap<String, VecDeque<(f64, f64)>>,
    latest: Option<Arc<FrameSnapshot>>,
}

impl ChartFeed {
    pub fn new(config: ChartConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            series: BTreeMap::new(),
            latest: None,
        })
    }

    pub fn latest(&self) -> Option<&Arc<FrameSnapshot>> {
        self.latest.as_ref()
    }

    /// Visible block range `(start, end)` centred on the playhead.
    pub fn window(&self) -> (f64, f64) {
        let position = self.latest.as_ref().map_or(0.0, |frame| frame.position);
        let half = self.config.window_size as f64 / 2.0;
        ((position - half).max(0.0), position + half)
    }

    pub fn series(&self, metric: &str) -> Option<&VecDeque<(f64, f64)>> {
        self.series.get(metric)
    }

    /// The series for `metric` thinned to at most `max_points` by keeping
    /// every n-th point.
    pub fn downsampled(&self, metric: &str) -> Vec<(f64, f64)> {
        let Some(points) = self.series.get(metric) else {
            return Vec::new();
        };
        let step = points.len().div_ceil(self.config.max_points).max(1);
        points.iter().step_by(step).copied().collect()
    }
}

impl Sink for ChartFeed {
    fn accept(&mut self, frame: Arc<FrameSnapshot>) -> Result<()> {
        let rewound = self
            .latest
            .as_ref()
            .is_some_and(|latest| frame.position < latest.position);
        if rewound {
            self.series.clear();
        }

        let repeated = self
            .latest
            .as_ref()
            .is_some_and(|latest| frame.position == latest.position);
        self.latest = Some(Arc::clone(&frame));
        if repeated {
            return Ok(());
        }

        let (start, _) = self.window();
        for (name, &value) in &frame.metrics {
            let points = self.series.entry(name.clone()).or_default();
            points.push_back((frame.position, value));
            while points.front().is_some_and(|&(position, _)| position < start) {
                points.pop_front();
            }
        }
        Ok(())
    }
}
