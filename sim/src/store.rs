//! Result store: persists fused ticks and raw detections of a run.
//!
//! On-disk layout under `<root>/<run_id>/`:
//! - `ticks.jsonl`      one [`TickRecord`] per line
//! - `detections.jsonl` one [`DetectionLine`] per entity and tick
//! - `run.json`         [`RunInfo`] written when the run finishes
//!
//! Lines are flushed every tick so an aborted run keeps every completed tick.

use anyhow::Context;
use camera_models::RawDetection;
use fusion_core::{metrics::RunMetrics, EntityId, Tick, TickRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Raw detector output of one entity for one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionLine {
    pub tick: Tick,
    pub entity: EntityId,
    pub detections: Vec<RawDetection>,
}

/// Summary of a finished (or aborted) run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub scene: String,
    pub model: String,
    pub use_rsu: bool,
    pub entities: Vec<EntityId>,
    pub aborted: bool,
    pub metrics: RunMetrics,
}

/// Sink for run results.
pub trait ResultStore {
    fn append_tick(&mut self, record: &TickRecord) -> anyhow::Result<()>;
    fn append_detections(
        &mut self,
        tick: Tick,
        entity: &EntityId,
        detections: &[RawDetection],
    ) -> anyhow::Result<()>;
    /// Make every appended line durable.
    fn flush(&mut self) -> anyhow::Result<()>;
}

/// Run identifier: `{model}-{scene}-rsu_used_{bool}-{unix_ts}`.
pub fn run_id(model: &str, scene: &str, use_rsu: bool, unix_ts: u64) -> String {
    format!("{model}-{scene}-rsu_used_{use_rsu}-{unix_ts}")
}

// ---------------------------------------------------------------------------
// JSON-lines store
// ---------------------------------------------------------------------------

pub struct JsonlResultStore {
    dir: PathBuf,
    ticks: BufWriter<File>,
    detections: BufWriter<File>,
}

impl JsonlResultStore {
    /// Create `<root>/<run_id>/` and open both line files.
    pub fn create(root: &Path, run_id: &str) -> anyhow::Result<Self> {
        let dir = root.join(run_id);
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let open = |name: &str| -> anyhow::Result<BufWriter<File>> {
            let path = dir.join(name);
            let file =
                File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            Ok(BufWriter::new(file))
        };
        Ok(Self {
            ticks: open("ticks.jsonl")?,
            detections: open("detections.jsonl")?,
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Flush the line files and write `run.json`.
    pub fn finish(mut self, info: &RunInfo) -> anyhow::Result<PathBuf> {
        self.flush()?;
        let path = self.dir.join("run.json");
        crate::replay::save_json(info, &path)?;
        Ok(self.dir)
    }
}

fn write_line<T: Serialize>(writer: &mut BufWriter<File>, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    Ok(())
}

impl ResultStore for JsonlResultStore {
    fn append_tick(&mut self, record: &TickRecord) -> anyhow::Result<()> {
        write_line(&mut self.ticks, record)
    }

    fn append_detections(
        &mut self,
        tick: Tick,
        entity: &EntityId,
        detections: &[RawDetection],
    ) -> anyhow::Result<()> {
        write_line(
            &mut self.detections,
            &DetectionLine {
                tick,
                entity: entity.clone(),
                detections: detections.to_vec(),
            },
        )
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.ticks.flush()?;
        self.detections.flush()?;
        Ok(())
    }
}

/// Read back every tick of a `ticks.jsonl` file.
pub fn load_ticks(path: &Path) -> anyhow::Result<Vec<TickRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut ticks = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", path.display(), n + 1))?;
        ticks.push(record);
    }
    Ok(ticks)
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Keeps everything in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub ticks: Vec<TickRecord>,
    pub detections: Vec<DetectionLine>,
    pub flushes: usize,
}

impl ResultStore for MemoryStore {
    fn append_tick(&mut self, record: &TickRecord) -> anyhow::Result<()> {
        self.ticks.push(record.clone());
        Ok(())
    }

    fn append_detections(
        &mut self,
        tick: Tick,
        entity: &EntityId,
        detections: &[RawDetection],
    ) -> anyhow::Result<()> {
        self.detections.push(DetectionLine {
            tick,
            entity: entity.clone(),
            detections: detections.to_vec(),
        });
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
