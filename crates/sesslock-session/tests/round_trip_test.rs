// Property tests for session values
// A value written through the coordinator reads back unchanged from the store

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Value;
use sesslock_backend::MemoryBackend;
use sesslock_common::SessionSettings;
use sesslock_consistency::LockService;
use sesslock_session::{SessionCoordinator, StaticSessionHost};

fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,12}".prop_map(Value::from),
        "\\PC{0,6}".prop_map(Value::from),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    leaf_strategy().prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..6)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn started(backend: &Arc<MemoryBackend>, owner: &str) -> SessionCoordinator {
    let mut session = SessionCoordinator::new(
        Box::new(StaticSessionHost::with_id("APP", "sid")),
        backend.clone(),
        Arc::new(LockService::with_owner(backend.clone(), owner)),
        SessionSettings::default(),
    );
    session.start().await.unwrap();
    session
}

proptest! {
    #[test]
    fn write_then_read_returns_value(value in value_strategy()) {
        let (stored, nested) = runtime().block_on(async {
            let backend = Arc::new(MemoryBackend::new());
            let mut session = started(&backend, "a").await;
            session.write("field", value.clone(), true).await.unwrap();
            session
                .write("outer.inner", value.clone(), true)
                .await
                .unwrap();

            // A second coordinator sees only what reached the store
            let mut reader = started(&backend, "b").await;
            let stored = reader.read("field", false, true).await.unwrap();
            let nested = reader.read("outer.inner", false, true).await.unwrap();
            (stored, nested)
        });
        prop_assert_eq!(stored, Some(value.clone()));
        prop_assert_eq!(nested, Some(value));
    }

    #[test]
    fn renewed_identifier_keeps_value(value in value_strategy()) {
        let renewed = runtime().block_on(async {
            let backend = Arc::new(MemoryBackend::new());
            let mut session = started(&backend, "a").await;
            session.write("field", value.clone(), true).await.unwrap();
            session.renew_identifier(false).await.unwrap();
            session.read("field", false, false).await.unwrap()
        });
        prop_assert_eq!(renewed, Some(value));
    }
}
