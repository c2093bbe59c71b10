//! Starting/Finished bookkeeping per entity

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

use crate::models::{EntityLevel, Message, Phase};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LedgerState {
    Started,
    Finished,
}

/// Admits each entity's Starting once and its Finished once, in that order
#[derive(Default)]
pub struct EntityLedger {
    entries: Mutex<HashMap<(EntityLevel, String), LedgerState>>,
}

impl EntityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `message` may be delivered; records its transition if so
    pub fn admit(&self, message: &Message) -> bool {
        let (Some(phase), Some(entity)) = (message.phase(), message.entity()) else {
            return true;
        };

        let mut entries = self.entries.lock();
        let key = entity.ledger_key();
        match (phase, entries.get(&key).copied()) {
            (Phase::Starting, None) => {
                entries.insert(key, LedgerState::Started);
                true
            }
            (Phase::Finished, Some(LedgerState::Started)) => {
                entries.insert(key, LedgerState::Finished);
                true
            }
            (Phase::Starting, Some(state)) => {
                warn!("Dropping duplicate Starting for {} (state {:?})", entity, state);
                false
            }
            (Phase::Finished, state) => {
                warn!("Dropping Finished for {} (state {:?})", entity, state);
                false
            }
        }
    }

    /// Entities that started but have not finished
    pub fn open_entities(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|s| **s == LedgerState::Started)
            .count()
    }
}
