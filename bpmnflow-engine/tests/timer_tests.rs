use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use bpmnflow_engine::{HandlerModule, ProcessInstance};
use bpmnflow_hook::EngineEventDispatcher;
use bpmnflow_model::{DefinitionBuilder, ProcessDefinition, TaskKind};

fn boundary_definition() -> Arc<ProcessDefinition> {
    Arc::new(
        DefinitionBuilder::new("PROCESS_T", "Deadline")
            .start_event("_1", "start")
            .task("_2", "W", TaskKind::UserTask)
            .boundary_event("_3", "deadline", "_2", true)
            .end_event("_4", "end")
            .end_event("_5", "escalated")
            .flow("_1", "_2")
            .flow("_2", "_4")
            .flow("_3", "_5")
            .build()
            .unwrap(),
    )
}

fn timer_catch_definition() -> Arc<ProcessDefinition> {
    Arc::new(
        DefinitionBuilder::new("PROCESS_C", "Pause")
            .start_event("_1", "start")
            .intermediate_catch_event("_2", "pause", true)
            .end_event("_3", "end")
            .flow("_1", "_2")
            .flow("_2", "_3")
            .build()
            .unwrap(),
    )
}

fn spawn(definition: Arc<ProcessDefinition>, handlers: Arc<HandlerModule>) -> ProcessInstance {
    ProcessInstance::new(
        "1",
        definition,
        handlers,
        None,
        Arc::new(EngineEventDispatcher::empty()),
        None,
    )
}

#[tokio::test]
async fn boundary_timer_diverts_an_unfinished_wait_task() {
    let timeout_calls = Arc::new(AtomicUsize::new(0));
    let calls = timeout_calls.clone();
    let handlers = HandlerModule::new()
        .handler("W$getTimeout", move |_ctx, _data| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!(50))
            }
        })
        .build();
    let instance = spawn(boundary_definition(), handlers);

    instance.trigger_event("start", json!({})).unwrap();
    instance.flush().await;
    assert!(instance.has_token_at("W").await);

    // no taskDone within 50ms: the boundary path wins
    tokio::time::sleep(Duration::from_millis(150)).await;
    instance.flush().await;

    let snapshot = instance.snapshot().await;
    assert!(snapshot.state.tokens.is_empty());
    assert!(!instance.has_token_at("W").await);
    let names: Vec<&str> = snapshot
        .history
        .entries
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert!(names.contains(&"deadline"));
    assert!(names.contains(&"escalated"));
    assert!(!names.contains(&"end"));
    assert!(snapshot
        .history
        .entries
        .iter()
        .find(|e| e.name == "W")
        .unwrap()
        .end
        .is_some());
    assert_eq!(timeout_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn task_done_before_the_deadline_cancels_the_boundary_timer() {
    let handlers = HandlerModule::new()
        .timeout_ms("W", 50)
        .handler("WDone", |_ctx, data| async move { Ok(data) })
        .build();
    let instance = spawn(boundary_definition(), handlers);

    instance.trigger_event("start", json!({})).unwrap();
    instance.flush().await;
    instance.task_done("W", json!({}));
    instance.flush().await;

    tokio::time::sleep(Duration::from_millis(120)).await;
    instance.flush().await;

    let snapshot = instance.snapshot().await;
    let names: Vec<&str> = snapshot
        .history
        .entries
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert!(names.contains(&"end"));
    assert!(!names.contains(&"deadline"));
    assert!(!names.contains(&"escalated"));
}

#[tokio::test]
async fn intermediate_timer_event_fires_and_advances() {
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let calls = handler_calls.clone();
    let handlers = HandlerModule::new()
        .timeout_ms("pause", 30)
        .handler("pause", move |_ctx, data| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(data)
            }
        })
        .build();
    let instance = spawn(timer_catch_definition(), handlers);

    instance.trigger_event("start", json!({})).unwrap();
    instance.flush().await;
    assert!(instance.has_token_at("pause").await);
    assert!(!instance.is_finished().await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    instance.flush().await;

    assert!(instance.is_finished().await);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_timeout_handler_is_fatal() {
    // a timer event without its $getTimeout handler is a programming error
    let handlers = HandlerModule::new().build();
    let instance = spawn(timer_catch_definition(), handlers);

    instance.trigger_event("start", json!({})).unwrap();
    instance.flush().await;

    assert!(instance.has_failed());
    assert!(!instance.is_finished().await);
}
