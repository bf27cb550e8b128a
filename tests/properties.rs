//! Property-style tests over the domain value objects.

use proptest::prelude::*;
use std::time::Duration;

use widget_relay::adapters::redis::KeySpace;
use widget_relay::domain::{widget_channel, SessionId, Timestamp, UserId, UserSession, WidgetId};

proptest! {
    #[test]
    fn widget_channel_is_prefixed_and_reversible(id in "[a-zA-Z0-9_-]{1,64}") {
        let widget_id = WidgetId::new(id.clone()).unwrap();
        let channel = widget_channel(&widget_id);
        prop_assert_eq!(channel.strip_prefix("widget:"), Some(id.as_str()));
    }

    #[test]
    fn keyspace_widget_keys_never_collide_across_prefixes(
        prefix_a in "[a-z]{1,16}",
        prefix_b in "[a-z]{1,16}",
        id in "[a-zA-Z0-9_-]{1,32}",
    ) {
        prop_assume!(prefix_a != prefix_b);
        let widget_id = WidgetId::new(id).unwrap();
        let a = KeySpace::new(prefix_a).widget(&widget_id);
        let b = KeySpace::new(prefix_b).widget(&widget_id);
        prop_assert_ne!(a, b);
    }

    #[test]
    fn original_ttl_recovers_the_creation_ttl(secs in 1u64..=86_400 * 30) {
        let session = UserSession::new(
            SessionId::new("s").unwrap(),
            UserId::new("u").unwrap(),
        )
        .with_ttl(Duration::from_secs(secs));

        let ttl = session.original_ttl().expect("ttl was set");
        prop_assert_eq!(ttl.as_secs(), secs);
    }

    #[test]
    fn session_is_expired_exactly_past_its_deadline(secs in 1u64..=86_400) {
        let session = UserSession::new(
            SessionId::new("s").unwrap(),
            UserId::new("u").unwrap(),
        )
        .with_ttl(Duration::from_secs(secs));

        let before = session.created_at.plus_secs(secs.saturating_sub(1));
        let after = session.created_at.plus_secs(secs + 1);
        prop_assert!(!session.is_expired_at(&before));
        prop_assert!(session.is_expired_at(&after));
    }

    #[test]
    fn timestamp_unix_millis_roundtrip(millis in 0i64..=4_102_444_800_000) {
        let ts = Timestamp::from_unix_millis(millis);
        prop_assert_eq!(ts.as_unix_millis(), millis);
    }
}
