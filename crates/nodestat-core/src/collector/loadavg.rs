//! Load averages from `/proc/loadavg`.

use std::sync::Arc;

use crate::collector::error::CollectError;
use crate::collector::procfs::ProcFs;
use crate::collector::settings::CollectorSettings;
use crate::collector::traits::FileSystem;
use crate::collector::Collector;
use crate::metric::{MetricDescriptor, MetricSample};

pub struct LoadAvgCollector<F: FileSystem> {
    procfs: ProcFs<F>,
    load1: Arc<MetricDescriptor>,
    load5: Arc<MetricDescriptor>,
    load15: Arc<MetricDescriptor>,
}

impl<F: FileSystem + Clone> LoadAvgCollector<F> {
    pub fn new(settings: &CollectorSettings<F>) -> Result<Self, CollectError> {
        Ok(Self {
            procfs: settings.procfs()?,
            load1: MetricDescriptor::gauge("", "load1", "1m load average.", &[]),
            load5: MetricDescriptor::gauge("", "load5", "5m load average.", &[]),
            load15: MetricDescriptor::gauge("", "load15", "15m load average.", &[]),
        })
    }
}

impl<F: FileSystem + Clone> Collector for LoadAvgCollector<F> {
    fn update(&self, emit: &mut dyn FnMut(MetricSample)) -> Result<(), CollectError> {
        let load = self.procfs.loadavg()?;
        let none: [&str; 0] = [];
        emit(MetricSample::new(&self.load1, load.load1, none));
        emit(MetricSample::new(&self.load5, load.load5, none));
        emit(MetricSample::new(&self.load15, load.load15, none));
        Ok(())
    }
}
