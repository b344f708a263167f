use std::sync::{Arc, Mutex};

use serde_json::json;

use bpmnflow_engine::{EngineError, HandlerModule, ProcessInstance};
use bpmnflow_hook::EngineEventDispatcher;
use bpmnflow_model::{DefinitionBuilder, ProcessDefinition, TaskKind};

fn order_definition() -> Arc<ProcessDefinition> {
    Arc::new(
        DefinitionBuilder::new("PROCESS_1", "Order")
            .start_event("_2", "start")
            .task("_3", "TaskA", TaskKind::UserTask)
            .end_event("_4", "end")
            .flow("_2", "_3")
            .flow("_3", "_4")
            .build()
            .unwrap(),
    )
}

fn instance_with(handlers: Arc<HandlerModule>) -> ProcessInstance {
    ProcessInstance::new(
        "1",
        order_definition(),
        handlers,
        None,
        Arc::new(EngineEventDispatcher::empty()),
        None,
    )
}

#[tokio::test]
async fn linear_process_runs_to_the_end() {
    let handlers = HandlerModule::new()
        .handler("start", |_ctx, data| async move { Ok(data) })
        .handler("TaskA", |ctx, data| async move {
            ctx.set_property("approved", json!(true));
            Ok(data)
        })
        .handler("TaskADone", |_ctx, data| async move { Ok(data) })
        .handler("end", |_ctx, data| async move { Ok(data) })
        .build();
    let instance = instance_with(handlers);

    instance.trigger_event("start", json!({"order": 42})).unwrap();
    instance.flush().await;
    assert!(instance.has_token_at("TaskA").await);
    assert_eq!(instance.get_property("approved"), Some(json!(true)));

    instance.task_done("TaskA", json!({"ok": true}));
    instance.flush().await;

    let snapshot = instance.snapshot().await;
    assert!(snapshot.state.tokens.is_empty());

    let names: Vec<&str> = snapshot
        .history
        .entries
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(names, ["start", "TaskA", "end"]);
    for entry in &snapshot.history.entries {
        let end = entry.end.expect("every entry closed");
        assert!(end >= entry.begin);
    }
    for pair in snapshot.history.entries.windows(2) {
        assert!(pair[0].begin <= pair[1].begin);
    }

    let views = instance.views().await;
    assert_eq!(views.start_event.unwrap().name, "start");
    assert_eq!(views.end_event.unwrap().name, "end");
    assert!(views.duration.unwrap() >= 0);
    assert!(instance.is_finished().await);
}

#[tokio::test]
async fn trigger_resolution_cases() {
    let handlers = HandlerModule::new().build();
    let instance = instance_with(handlers);

    // unknown names fail synchronously
    assert!(matches!(
        instance.trigger_event("nope", json!({})),
        Err(EngineError::UnknownEvent(_))
    ));
    // `Done` suffix only resolves against wait tasks
    assert!(matches!(
        instance.trigger_event("endDone", json!({})),
        Err(EngineError::UnknownEvent(_))
    ));

    instance.trigger_event("start", json!({})).unwrap();
    assert!(matches!(
        instance.trigger_event("start", json!({})),
        Err(EngineError::AlreadyStarted)
    ));
    instance.flush().await;

    // the `Done` suffix path is equivalent to task_done
    instance.trigger_event("TaskADone", json!({})).unwrap();
    instance.flush().await;
    assert!(instance.is_finished().await);
}

#[tokio::test]
async fn duplicate_task_done_is_ignored_via_default_event_handler() {
    let diagnostics: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = diagnostics.clone();
    let handlers = HandlerModule::new()
        .default_event_handler(move |_ctx, diag| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().unwrap().push(diag.reason);
            })
        })
        .handler("TaskADone", |_ctx, data| async move { Ok(data) })
        .build();
    let instance = instance_with(handlers);

    instance.trigger_event("start", json!({})).unwrap();
    instance.flush().await;
    instance.task_done("TaskA", json!({}));
    instance.flush().await;
    let after_first = instance.snapshot().await;
    assert!(after_first.state.tokens.is_empty());

    // second completion: no token, routed to the default event handler,
    // instance state untouched
    instance.task_done("TaskA", json!({}));
    instance.flush().await;
    let after_second = instance.snapshot().await;
    assert_eq!(
        after_first.history.entries.len(),
        after_second.history.entries.len()
    );
    assert!(diagnostics
        .lock()
        .unwrap()
        .iter()
        .any(|reason| reason.contains("no token at 'TaskA'")));
}

#[tokio::test]
async fn missing_handlers_fall_back_and_the_flow_advances() {
    // only the wait task's completion handler is registered; every other
    // lookup falls back without stalling the flow
    let handlers = HandlerModule::new()
        .handler("TaskADone", |_ctx, data| async move { Ok(data) })
        .build();
    let instance = instance_with(handlers);

    instance.trigger_event("start", json!({"k": 1})).unwrap();
    instance.flush().await;
    instance.task_done("TaskA", json!({}));
    instance.flush().await;
    assert!(instance.is_finished().await);
}

#[tokio::test]
async fn handler_errors_route_to_default_error_handler() {
    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let handlers = HandlerModule::new()
        .handler("TaskA", |_ctx, _data| async move {
            Err("boom".to_string())
        })
        .default_error_handler(move |_ctx, reason| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().unwrap().push(reason);
            })
        })
        .build();
    let instance = instance_with(handlers);

    instance.trigger_event("start", json!({})).unwrap();
    instance.flush().await;

    // the failure was reported but the instance survives and still waits
    assert!(errors.lock().unwrap().iter().any(|r| r.contains("boom")));
    assert!(instance.has_token_at("TaskA").await);
    assert!(!instance.has_failed());

    instance.task_done("TaskA", json!({}));
    instance.flush().await;
    assert!(instance.is_finished().await);
}
