//! Tick scheduler: advances every entity by one tick, waits for all of their
//! records, fuses them and persists the result before starting the next tick.
//!
//! Ticks are strictly sequential. Entities of a tick run in entity-id order
//! and publish into a [`SlotTable`]; fusion only starts once every slot is
//! filled.

use crate::{
    channel::SlotTable,
    detection_client::DetectionClient,
    entity::EntityProcess,
    scene::SceneSource,
    store::{JsonlResultStore, ResultStore, RunInfo},
};
use fusion_core::{
    metrics::RunMetrics, EntityId, FusionConfig, FusionError, FusionOutput, FusionProcessor,
    FusionResult, Tick,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run-level scheduling options.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Include fixed roadside sensors
    pub use_rsu: bool,
    /// Stop after this many ticks
    pub max_ticks: Option<u64>,
    /// Restrict the run to these entities; all scene entities if `None`
    pub entities: Option<Vec<EntityId>>,
    /// Log progress every N ticks (0 disables)
    pub progress_every: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            use_rsu: true,
            max_ticks: None,
            entities: None,
            progress_every: 50,
        }
    }
}

/// Cooperative stop request, checked between ticks.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Scheduler {
    scene: Box<dyn SceneSource>,
    client: DetectionClient,
    processor: FusionProcessor,
    entities: Vec<EntityProcess>,
    slots: SlotTable,
    config: SchedulerConfig,
    tick: Tick,
    end: Tick,
    metrics: RunMetrics,
    abort: AbortHandle,
    aborted: bool,
}

impl Scheduler {
    /// Validate the run setup and build every entity process.
    ///
    /// Fails before any tick runs on: no participating entities, a requested
    /// id the scene does not know, an entity that is neither a vehicle nor a
    /// mounted sensor, missing intersection data, or invalid fusion config.
    pub fn new(
        scene: Box<dyn SceneSource>,
        client: DetectionClient,
        fusion_config: FusionConfig,
        config: SchedulerConfig,
    ) -> FusionResult<Self> {
        let known: BTreeSet<EntityId> = scene.entity_ids().into_iter().collect();
        let requested = match &config.entities {
            Some(ids) => ids.clone(),
            None => known.iter().cloned().collect(),
        };

        let mut seen = BTreeSet::new();
        let mut entities = Vec::with_capacity(requested.len());
        for id in requested {
            if !known.contains(&id) {
                return Err(FusionError::UnknownEntity(id));
            }
            if !seen.insert(id.clone()) {
                return Err(FusionError::InvalidConfig(format!(
                    "entity `{id}` requested twice"
                )));
            }
            let mount = scene.sensor_mount(&id);
            if mount.is_none() && scene.state_at(&id, 0).is_none() {
                return Err(FusionError::MissingMount(id));
            }
            if mount.is_some() && !config.use_rsu {
                debug!(entity = %id, "roadside sensors disabled, skipping");
                continue;
            }
            entities.push(EntityProcess::new(id, mount));
        }
        if entities.is_empty() {
            return Err(FusionError::NoEntities);
        }
        entities.sort_by(|a, b| a.id.cmp(&b.id));

        let mount_heights: BTreeMap<EntityId, f64> = entities
            .iter()
            .filter_map(|e| e.mount.as_ref().map(|m| (e.id.clone(), m.height)))
            .collect();
        let processor = FusionProcessor::new(fusion_config, scene.intersections())?
            .with_mount_heights(mount_heights);

        let length = scene.simulation_length();
        let end = config.max_ticks.map_or(length, |m| m.min(length));
        let slots = SlotTable::new(entities.iter().map(|e| e.id.clone()));

        info!(
            scene = scene.name(),
            model = client.model_name(),
            entities = entities.len(),
            ticks = end,
            use_rsu = config.use_rsu,
            "scheduler ready"
        );

        Ok(Self {
            scene,
            client,
            processor,
            entities,
            slots,
            config,
            tick: 0,
            end,
            metrics: RunMetrics::default(),
            abort: AbortHandle::default(),
            aborted: false,
        })
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Share an externally owned stop flag, e.g. one wired to an interrupt
    /// handler that outlives several runs.
    pub fn with_abort_handle(mut self, handle: AbortHandle) -> Self {
        self.abort = handle;
        self
    }

    pub fn scene(&self) -> &dyn SceneSource {
        self.scene.as_ref()
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.iter().map(|e| e.id.clone()).collect()
    }

    pub fn processor(&self) -> &FusionProcessor {
        &self.processor
    }

    /// Next tick to run.
    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    /// One past the last tick of the run.
    pub fn end_tick(&self) -> Tick {
        self.end
    }

    pub fn is_finished(&self) -> bool {
        self.tick >= self.end
    }

    pub fn was_aborted(&self) -> bool {
        self.aborted
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Summary of the run so far, as written to `run.json`.
    pub fn run_info(&self, run_id: &str) -> RunInfo {
        RunInfo {
            run_id: run_id.to_string(),
            scene: self.scene.name().to_string(),
            model: self.model_name().to_string(),
            use_rsu: self.config.use_rsu,
            entities: self.entity_ids(),
            aborted: self.aborted,
            metrics: self.metrics.clone(),
        }
    }

    /// Run one tick end to end. Returns `None` once the run is complete.
    pub fn step(&mut self, store: &mut dyn ResultStore) -> anyhow::Result<Option<FusionOutput>> {
        if self.is_finished() {
            return Ok(None);
        }
        let tick = self.tick;

        self.slots.begin_tick(tick);
        for entity in &mut self.entities {
            let slot = self
                .slots
                .writer(&entity.id)
                .ok_or_else(|| FusionError::UnknownEntity(entity.id.clone()))?;
            entity.advance_one_tick(tick, self.scene.as_ref(), &mut self.client, slot)?;
        }
        let records = self.slots.drain()?;

        for entity in &mut self.entities {
            let raw = entity.take_raw();
            store.append_detections(tick, &entity.id, &raw)?;
        }

        let output = self.processor.process_tick(tick, records);
        store.append_tick(&output.record)?;
        store.flush()?;
        self.metrics.accumulate(&output);

        if !output.record.gaps.is_empty() {
            debug!(tick, gaps = output.record.gaps.len(), "tick fused with gaps");
        }
        if self.config.progress_every > 0 && (tick + 1) % self.config.progress_every == 0 {
            info!(
                tick,
                end = self.end,
                agents = output.record.agents.len(),
                crash_warnings = self.metrics.n_crash_warnings,
                "progress"
            );
        }

        self.tick += 1;
        Ok(Some(output))
    }

    /// Run until the last tick or an abort request. Every tick completed
    /// before an error or abort is already persisted.
    pub fn run(&mut self, store: &mut dyn ResultStore) -> anyhow::Result<RunMetrics> {
        while !self.is_finished() {
            if self.abort.is_aborted() {
                warn!(tick = self.tick, "abort requested, stopping before tick");
                self.aborted = true;
                break;
            }
            if let Err(e) = self.step(store) {
                self.aborted = true;
                return Err(e);
            }
        }
        info!(
            ticks = self.metrics.n_ticks,
            agents = self.metrics.n_agents,
            duplicates = self.metrics.n_duplicates,
            gaps = self.metrics.n_gaps,
            "run finished"
        );
        Ok(self.metrics.clone())
    }

    /// Run into `store` and always write its `run.json`. A failed run is
    /// recorded as aborted and its error returned afterwards.
    pub fn run_to_store(
        &mut self,
        run_id: &str,
        mut store: JsonlResultStore,
    ) -> anyhow::Result<(RunInfo, PathBuf)> {
        let outcome = self.run(&mut store);
        let info = self.run_info(run_id);
        let dir = store.finish(&info)?;
        match outcome {
            Ok(_) => Ok((info, dir)),
            Err(e) => Err(e.context(format!(
                "run {run_id} stopped at tick {}, partial results in {}",
                self.tick,
                dir.display()
            ))),
        }
    }
}
