//! Property-based test generators using proptest.

use proptest::prelude::*;
use recflow_core::{Demand, Record, RecordId, ZoneId};

/// Strategy for generating record ids.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    prop::array::uniform16(any::<u8>()).prop_map(RecordId::from_bytes)
}

/// Strategy for generating record type names.
pub fn record_type_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z]{0,15}").expect("Invalid regex")
}

/// Strategy for generating records with a few string fields.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (
        record_id_strategy(),
        record_type_strategy(),
        prop::option::of("[a-z]{1,8}"),
        prop::collection::btree_map("[a-z]{1,8}", "[ -~]{0,24}", 0..4),
    )
        .prop_map(|(id, record_type, zone, fields)| Record {
            id,
            record_type,
            zone: zone.map(ZoneId::new).unwrap_or_default(),
            fields,
        })
}

/// Strategy for generating a batch of records with distinct ids.
pub fn record_batch_strategy(max: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(record_strategy(), 0..=max).prop_map(|mut records| {
        let mut seen = std::collections::HashSet::new();
        records.retain(|record| seen.insert(record.id));
        records
    })
}

/// Strategy for raw progress fractions as a remote service reports them.
///
/// Includes out-of-range values, exact bounds and NaN.
pub fn progress_fraction_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        6 => -0.5f64..1.5,
        1 => Just(0.0),
        1 => Just(1.0),
        1 => Just(f64::NAN),
    ]
}

/// Strategy for sequences of progress fractions for one item.
pub fn progress_sequence_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(progress_fraction_strategy(), 0..16)
}

/// Strategy for consumer demand, bounded or unlimited.
pub fn demand_strategy() -> impl Strategy<Value = Demand> {
    prop_oneof![
        4 => (1u64..20).prop_map(Demand::max),
        1 => Just(Demand::unlimited()),
    ]
}
