use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use bpmnflow_engine::{HandlerModule, ProcessInstance, StaticResolver};
use bpmnflow_hook::EngineEventDispatcher;
use bpmnflow_model::{DefinitionBuilder, ProcessDefinition, TaskKind};

fn parent_definition() -> Arc<ProcessDefinition> {
    Arc::new(
        DefinitionBuilder::new("PROCESS_PARENT", "Parent")
            .start_event("_1", "pstart")
            .call_activity("_2", "CA", "Child", None)
            .end_event("_3", "pend")
            .flow("_1", "_2")
            .flow("_2", "_3")
            .build()
            .unwrap(),
    )
}

fn child_definition() -> Arc<ProcessDefinition> {
    Arc::new(
        DefinitionBuilder::new("PROCESS_CHILD", "Child")
            .start_event("_1", "cstart")
            .task("_2", "T", TaskKind::UserTask)
            .end_event("_3", "cend")
            .flow("_1", "_2")
            .flow("_2", "_3")
            .build()
            .unwrap(),
    )
}

async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..300 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 3s");
}

#[tokio::test]
async fn call_activity_round_trip() {
    let child_handlers = HandlerModule::new()
        .handler("T", |ctx, data| async move {
            ctx.set_property("child_saw", json!(true));
            Ok(data)
        })
        .handler("TDone", |_ctx, data| async move { Ok(data) })
        .build();
    let resolver = StaticResolver::new()
        .with_definition(child_definition())
        .with_handlers("Child", child_handlers)
        .build();
    let parent_handlers = HandlerModule::new()
        .handler("CADone", |_ctx, data| async move { Ok(data) })
        .build();
    let parent = ProcessInstance::new(
        "p1",
        parent_definition(),
        parent_handlers,
        None,
        Arc::new(EngineEventDispatcher::empty()),
        Some(resolver),
    );

    parent.trigger_event("pstart", json!({"order": 9})).unwrap();
    parent.flush().await;

    // the child was instantiated and its start fired
    wait_for(|| parent.has_token_at("T")).await;
    {
        let snapshot = parent.snapshot().await;
        let ca_token = snapshot
            .state
            .tokens
            .iter()
            .find(|t| t.position == "CA")
            .expect("call-activity token present");
        assert_eq!(ca_token.called_process_id.as_deref(), Some("p1::CA"));
        assert!(ca_token.substate.is_some());
    }

    parent.task_done("T", json!({"done": true}));
    wait_for(|| parent.is_finished()).await;

    let snapshot = parent.snapshot().await;
    assert!(snapshot.state.tokens.is_empty());
    let names: Vec<&str> = snapshot
        .history
        .entries
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(names, ["pstart", "CA", "pend"]);

    let ca_entry = snapshot
        .history
        .entries
        .iter()
        .find(|e| e.name == "CA")
        .unwrap();
    assert!(ca_entry.end.is_some());
    let subhistory = ca_entry.subhistory.as_ref().expect("nested child history");
    let child_names: Vec<&str> = subhistory
        .entries
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(child_names, ["cstart", "T", "cend"]);
}

#[tokio::test]
async fn sub_module_wins_over_resolver_handlers() {
    let resolver = StaticResolver::new()
        .with_definition(child_definition())
        .build();
    // the parent module nests the child's handlers under the call
    // activity's name
    let child_handlers = HandlerModule::new()
        .handler("TDone", |ctx, data| async move {
            ctx.set_property("via_sub_module", json!(true));
            Ok(data)
        })
        .build();
    let parent_handlers = HandlerModule::new()
        .sub_module("CA", child_handlers)
        .build();
    let parent = ProcessInstance::new(
        "p2",
        parent_definition(),
        parent_handlers,
        None,
        Arc::new(EngineEventDispatcher::empty()),
        Some(resolver),
    );

    parent.trigger_event("pstart", json!({})).unwrap();
    parent.flush().await;
    wait_for(|| parent.has_token_at("T")).await;

    parent.task_done("T", json!({}));
    wait_for(|| parent.is_finished()).await;
}

#[tokio::test]
async fn unresolvable_called_process_is_fatal() {
    let resolver = StaticResolver::new().build(); // nothing registered
    let parent = ProcessInstance::new(
        "p3",
        parent_definition(),
        HandlerModule::new().build(),
        None,
        Arc::new(EngineEventDispatcher::empty()),
        Some(resolver),
    );

    parent.trigger_event("pstart", json!({})).unwrap();
    parent.flush().await;

    assert!(parent.has_failed());
    assert!(!parent.is_finished().await);
}
