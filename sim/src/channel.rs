//! Per-tick output channel between entity processes and the fusion step.
//!
//! Every participating entity owns exactly one slot per tick. A slot is
//! written at most once; fusion drains the table only when every slot is
//! filled, so a tick never fuses a partial set of records.

use fusion_core::{EntityId, FusionError, FusionResult, OutputRecord, Tick};
use std::collections::BTreeMap;

/// Slot table for one tick at a time.
#[derive(Debug, Default)]
pub struct SlotTable {
    tick: Tick,
    slots: BTreeMap<EntityId, Option<OutputRecord>>,
}

impl SlotTable {
    pub fn new(participants: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            tick: 0,
            slots: participants.into_iter().map(|id| (id, None)).collect(),
        }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn participants(&self) -> impl Iterator<Item = &EntityId> {
        self.slots.keys()
    }

    /// Clear every slot and open the table for `tick`.
    pub fn begin_tick(&mut self, tick: Tick) {
        self.tick = tick;
        for slot in self.slots.values_mut() {
            *slot = None;
        }
    }

    /// Write handle for one entity's slot. `None` if the entity does not
    /// participate.
    pub fn writer(&mut self, entity: &EntityId) -> Option<SlotWriter<'_>> {
        let tick = self.tick;
        self.slots.get_mut(entity).map(|slot| SlotWriter {
            tick,
            entity: entity.clone(),
            slot,
        })
    }

    /// Number of slots written so far this tick.
    pub fn filled(&self) -> usize {
        self.slots.values().filter(|s| s.is_some()).count()
    }

    /// Take every record of the tick, in entity-id order. Fails with the first
    /// entity whose slot is still empty.
    pub fn drain(&mut self) -> FusionResult<Vec<OutputRecord>> {
        if let Some((entity, _)) = self.slots.iter().find(|(_, s)| s.is_none()) {
            return Err(FusionError::MissingSlot {
                tick: self.tick,
                entity: entity.clone(),
            });
        }
        Ok(self.slots.values_mut().filter_map(Option::take).collect())
    }
}

/// Exclusive write access to one slot for the current tick.
#[derive(Debug)]
pub struct SlotWriter<'a> {
    tick: Tick,
    entity: EntityId,
    slot: &'a mut Option<OutputRecord>,
}

impl SlotWriter<'_> {
    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    /// Publish the entity's record for the tick.
    pub fn write(self, record: OutputRecord) -> FusionResult<()> {
        if self.slot.is_some() {
            return Err(FusionError::DuplicateWrite {
                tick: self.tick,
                entity: self.entity,
            });
        }
        if record.entity_id != self.entity {
            return Err(FusionError::UnknownEntity(record.entity_id));
        }
        *self.slot = Some(record);
        Ok(())
    }
}
