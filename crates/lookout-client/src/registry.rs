use std::collections::HashMap;

use lookout_proto::SubscriptionId;

use crate::error::{ClientError, ClientResult};

/// Bookkeeping for one logical subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub id: SubscriptionId,
    pub operation_name: String,
    /// Set on the first start and never cleared while the record exists.
    pub started: bool,
    /// Whether the router currently holds a callback for this id.
    pub has_listener: bool,
}

/// What a start call has to do on top of sending the new `start` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    /// Send `stop` first: an earlier instance may still be live upstream.
    pub rearm: bool,
    /// No callback is registered yet.
    pub attach_listener: bool,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    records: HashMap<SubscriptionId, SubscriptionRecord>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a start for `id` and reports what the caller must do. An id
    /// already bound to a different operation is rejected.
    pub fn activate(&mut self, id: &SubscriptionId, operation_name: &str) -> ClientResult<Activation> {
        let record = self
            .records
            .entry(id.clone())
            .or_insert_with(|| SubscriptionRecord {
                id: id.clone(),
                operation_name: operation_name.to_string(),
                started: false,
                has_listener: false,
            });

        if record.operation_name != operation_name {
            return Err(ClientError::IdCollision {
                id: id.clone(),
                existing: record.operation_name.clone(),
                requested: operation_name.to_string(),
            });
        }

        let activation = Activation {
            rearm: record.started,
            attach_listener: !record.has_listener,
        };
        record.started = true;
        record.has_listener = true;
        Ok(activation)
    }

    /// Marks the listener detached. Returns whether the id had been started.
    pub fn deactivate(&mut self, id: &SubscriptionId) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                record.has_listener = false;
                record.started
            }
            None => false,
        }
    }

    pub fn release(&mut self, id: &SubscriptionId) -> Option<SubscriptionRecord> {
        self.records.remove(id)
    }

    pub fn get(&self, id: &SubscriptionId) -> Option<&SubscriptionRecord> {
        self.records.get(id)
    }

    pub fn ids(&self) -> Vec<SubscriptionId> {
        let mut ids: Vec<_> = self.records.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
