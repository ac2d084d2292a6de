//! Count-atoms fix: entity count and mean velocity inside a region, averaged
//! over `measurements` samples taken every `nevery` steps.

use crate::algs::communicator::Communicator;
use crate::calc::{Finalized, Velocity, VelocityCalculator};
use crate::config::CountAtomsConfig;
use crate::entity::EntitySource;
use crate::fix::sink::{ConsoleSink, CountRecord, FileSink, ResultSink};
use crate::region::RegionRegistry;
use crate::stats_error::StatsError;

/// Sink named by `config`: its file, or the console.
pub fn sink_for(config: &CountAtomsConfig) -> Box<dyn ResultSink> {
    match &config.file {
        Some(path) => Box::new(FileSink::new(path.clone())),
        None => Box::new(ConsoleSink),
    }
}

pub struct CountAtoms<C: Communicator, S: ResultSink> {
    calc: VelocityCalculator<C>,
    direction: [f64; 3],
    sink: S,
}

impl<C: Communicator, S: ResultSink> CountAtoms<C, S> {
    pub fn new(
        config: &CountAtomsConfig,
        regions: &RegionRegistry,
        sink: S,
    ) -> Result<Self, StatsError> {
        config.validate()?;
        let region = config.resolve_region(regions)?;
        let calc = VelocityCalculator::new(
            region,
            config.group,
            config.nevery,
            config.measurements,
            Velocity::new(),
        )?;
        Ok(Self {
            calc,
            direction: config.direction,
            sink,
        })
    }

    pub fn setup<E: EntitySource + ?Sized>(
        &mut self,
        world: &C,
        source: &E,
        step: u64,
    ) -> Result<(), StatsError> {
        self.calc.setup(world, source, step)
    }

    /// Sample if `step` is a multiple of `nevery`. Collective over `world`.
    ///
    /// Returns the record written by the local root when a window closes.
    pub fn end_of_step<E: EntitySource + ?Sized>(
        &mut self,
        world: &C,
        source: &E,
        step: u64,
    ) -> Result<Option<CountRecord>, StatsError> {
        if step % self.calc.nevery() != 0 {
            return Ok(None);
        }
        let Some(Finalized {
            step,
            average_count,
            value,
        }) = self.calc.run(world, source, step)?
        else {
            return Ok(None);
        };
        let directional = value
            .iter()
            .zip(self.direction)
            .map(|(v, d)| v * d)
            .sum();
        let record = CountRecord {
            step,
            count: average_count,
            velocity: value,
            directional,
        };
        self.sink.write_record(&record);
        Ok(Some(record))
    }

    pub fn calculator(&self) -> &VelocityCalculator<C> {
        &self.calc
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
