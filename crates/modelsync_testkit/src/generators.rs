//! Property-based test generators using proptest.

use modelsync_model::{Record, RecordId, RemoteRecord, Value};
use proptest::prelude::*;

/// Strategy for simple record identifiers.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    "[a-z][a-z0-9]{0,11}".prop_map(RecordId::new)
}

/// Strategy for scalar field values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        "[ -~]{0,24}".prop_map(Value::String),
        (0i64..4_102_444_800_000).prop_map(Value::Timestamp),
    ]
}

/// Strategy for `Post` records with a fixed id.
pub fn post_record_strategy(id: String) -> impl Strategy<Value = Record> {
    prop::collection::btree_map("[a-z]{1,8}", scalar_value_strategy(), 0..4).prop_map(
        move |fields| {
            let mut record = Record::with_id("Post", id.clone());
            for (name, value) in fields {
                if name != "id" {
                    record.insert(name, value);
                }
            }
            record
        },
    )
}

/// One remote delivery of a record: its version and whether it is a
/// tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Remote version.
    pub version: u64,
    /// Tombstone flag.
    pub deleted: bool,
}

impl Delivery {
    /// Builds the `Post` delivery for record `id`.
    pub fn to_remote(self, id: &str) -> RemoteRecord {
        let record = Record::with_id("Post", id).set("title", format!("v{}", self.version));
        let changed_at = self.version as i64 * 100;
        if self.deleted {
            RemoteRecord::tombstone(record, self.version, changed_at)
        } else {
            RemoteRecord::new(record, self.version, changed_at)
        }
    }
}

/// Strategy for a sequence of deliveries of one record, in arbitrary
/// version order and with possible duplicates.
pub fn delivery_sequence_strategy() -> impl Strategy<Value = Vec<Delivery>> {
    prop::collection::vec(
        (1u64..8, prop::bool::weighted(0.2)).prop_map(|(version, deleted)| Delivery {
            version,
            deleted,
        }),
        1..12,
    )
}

/// The delivery a store must hold after applying `deliveries` in order:
/// the first one carrying the highest version.
pub fn expected_winner(deliveries: &[Delivery]) -> Option<Delivery> {
    let mut winner: Option<Delivery> = None;
    for delivery in deliveries {
        if winner.map_or(true, |w| delivery.version > w.version) {
            winner = Some(*delivery);
        }
    }
    winner
}
