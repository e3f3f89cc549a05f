mod common;

use common::strategies::*;
use docsync_orchestrator::campaign::{CampaignKeys, CampaignKind, FenceValue};
use proptest::prelude::*;

proptest! {
    /// Property: a fence key parses back to its resource id, and only for its own kind
    #[test]
    fn fence_keys_parse_back_to_resource(kind in kind_strategy(), id in resource_id_strategy()) {
        let key = CampaignKeys::new(kind, id).fence();
        prop_assert_eq!(CampaignKeys::parse_fence_key(kind, &key), Some(id));

        for other in CampaignKind::ALL.into_iter().filter(|other| *other != kind) {
            prop_assert_eq!(CampaignKeys::parse_fence_key(other, &key), None);
        }
    }

    /// Property: every per-resource key of a kind starts with that kind's prefix
    #[test]
    fn campaign_keys_are_scoped_to_kind(kind in kind_strategy(), id in resource_id_strategy()) {
        let keys = CampaignKeys::new(kind, id);
        let prefix = format!("{}:", kind.key_prefix());
        for key in keys.all() {
            prop_assert!(key.starts_with(&prefix), "{} lacks prefix {}", key, prefix);
            let suffix = format!(":{id}");
            prop_assert!(key.ends_with(&suffix));
        }
    }

    /// Property: termination keys never collide with fence keys
    #[test]
    fn termination_keys_are_distinct_from_fences(
        kind in kind_strategy(),
        id in resource_id_strategy(),
        task_id in task_id_strategy(),
    ) {
        let terminate = CampaignKeys::terminate(kind, &task_id);
        prop_assert_ne!(&terminate, &CampaignKeys::new(kind, id).fence());
        prop_assert_eq!(CampaignKeys::parse_fence_key(kind, &terminate), None);
    }

    /// Property: count fences decode from the bare integer string
    #[test]
    fn count_fences_decode_from_bare_integers(count in any::<u64>()) {
        let decoded = FenceValue::decode("k", &count.to_string()).unwrap();
        prop_assert_eq!(decoded.expected(), Some(count));
        prop_assert!(decoded.payload().is_none());
    }

    /// Property: payload fences keep their armed state and driver id through the store
    #[test]
    fn payload_fences_preserve_armed_state(payload in payload_strategy()) {
        let raw = FenceValue::Payload(payload.clone()).encode().unwrap();
        let decoded = FenceValue::decode("k", &raw).unwrap();
        prop_assert_eq!(decoded.is_armed(), payload.expected.is_some());
        prop_assert_eq!(decoded.expected(), payload.expected);
        prop_assert_eq!(
            decoded.payload().and_then(|p| p.executor_task_id.clone()),
            payload.executor_task_id
        );
    }

    /// Property: garbage never decodes into a fence
    #[test]
    fn malformed_fence_values_are_rejected(raw in "[a-z]{1,12}") {
        prop_assert!(FenceValue::decode("k", &raw).is_err());
    }
}
