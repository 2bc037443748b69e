//! Property tests for the bounded histories kept by the bus and the router

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;
use smarttrack::events::EventBus;
use smarttrack::router::{HeadlessViewport, RouteConfig, Router, RouterOptions};

const PATHS: [&str; 4] = ["dashboard", "exercises", "progress", "settings"];

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

proptest! {
    #[test]
    fn bus_history_keeps_the_newest_events(capacity in 1usize..16, count in 0usize..48) {
        let bus = EventBus::new(capacity, Duration::from_millis(50));
        for i in 0..count {
            bus.emit(&format!("tick:{}", i), json!(i));
        }

        let history = bus.get_history(None);
        prop_assert_eq!(history.len(), count.min(capacity));
        if count > 0 {
            prop_assert_eq!(&history[history.len() - 1].name, &format!("tick:{}", count - 1));
            prop_assert_eq!(&history[0].name, &format!("tick:{}", count - history.len()));
        }
    }

    #[test]
    fn bus_history_limit_returns_a_suffix(count in 1usize..32, limit in 0usize..40) {
        let bus = EventBus::new(100, Duration::from_millis(50));
        for i in 0..count {
            bus.emit("tick", json!(i));
        }

        let all = bus.get_history(None);
        let tail = bus.get_history(Some(limit));
        prop_assert_eq!(tail.len(), limit.min(count));
        prop_assert_eq!(&all[all.len() - tail.len()..], &tail[..]);
    }

    #[test]
    fn router_history_never_exceeds_capacity(
        capacity in 1usize..8,
        steps in prop::collection::vec(0usize..PATHS.len(), 0..24),
    ) {
        let rt = runtime();
        let (history_len, current) = rt.block_on(async {
            let router = Router::new(
                EventBus::with_defaults(),
                Arc::new(HeadlessViewport::new()),
                RouterOptions { history_capacity: capacity, ..Default::default() },
            );
            for path in PATHS {
                router.define(path, RouteConfig::new(path));
            }
            router.init();
            for step in &steps {
                router.go(PATHS[*step]).await;
            }
            (router.history().len(), router.current_route())
        });

        prop_assert!(history_len <= capacity);
        match steps.last() {
            Some(last) => prop_assert_eq!(current.as_deref(), Some(PATHS[*last])),
            None => prop_assert!(current.is_none()),
        }
    }
}
