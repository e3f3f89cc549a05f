use proptest::prelude::*;

use docsync_orchestrator::campaign::{CampaignKind, CampaignPayload};

pub fn kind_strategy() -> impl Strategy<Value = CampaignKind> {
    prop::sample::select(CampaignKind::ALL.to_vec())
}

pub fn resource_id_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![0i64..1_000, any::<i64>()]
}

/// Executor task ids (uuid-like or arbitrary printable strings)
pub fn task_id_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
        "[a-zA-Z0-9_:-]{1,40}",
    ]
}

pub fn payload_strategy() -> impl Strategy<Value = CampaignPayload> {
    (
        prop::option::of(1i64..1_000_000),
        prop::option::of(task_id_strategy()),
        prop::option::of(0u64..100_000),
    )
        .prop_map(|(index_attempt_id, executor_task_id, expected)| {
            let mut payload = CampaignPayload::new();
            payload.index_attempt_id = index_attempt_id;
            payload.executor_task_id = executor_task_id;
            payload.expected = expected;
            payload
        })
}
