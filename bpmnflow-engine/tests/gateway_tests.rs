use std::sync::{Arc, Mutex};

use serde_json::json;

use bpmnflow_engine::{HandlerModule, ProcessInstance};
use bpmnflow_hook::EngineEventDispatcher;
use bpmnflow_model::{DefinitionBuilder, ProcessDefinition, TaskKind};

fn exclusive_definition() -> Arc<ProcessDefinition> {
    Arc::new(
        DefinitionBuilder::new("PROCESS_X", "Routing")
            .start_event("_1", "start")
            .exclusive_gateway("_2", "gw")
            .task("_3", "A", TaskKind::ServiceTask)
            .task("_4", "B", TaskKind::ServiceTask)
            .end_event("_5", "end")
            .flow("_1", "_2")
            .named_flow("toA", "_2", "_3")
            .named_flow("toB", "_2", "_4")
            .flow("_3", "_5")
            .flow("_4", "_5")
            .build()
            .unwrap(),
    )
}

fn parallel_definition() -> Arc<ProcessDefinition> {
    Arc::new(
        DefinitionBuilder::new("PROCESS_P", "ForkJoin")
            .start_event("_1", "start")
            .parallel_gateway("_2", "split")
            .task("_3", "A", TaskKind::UserTask)
            .task("_4", "B", TaskKind::UserTask)
            .parallel_gateway("_5", "join")
            .end_event("_6", "end")
            .flow("_1", "_2")
            .flow("_2", "_3")
            .flow("_2", "_4")
            .flow("_3", "_5")
            .flow("_4", "_5")
            .flow("_5", "_6")
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
async fn exclusive_gateway_takes_the_first_truthy_branch() {
    let handlers = HandlerModule::new()
        .predicate("gw", "toA", |_data| false)
        .predicate("gw", "toB", |_data| true)
        .build();
    let instance = spawn(exclusive_definition(), handlers);

    instance.trigger_event("start", json!({"amount": 7})).unwrap();
    instance.flush().await;

    let snapshot = instance.snapshot().await;
    let names: Vec<&str> = snapshot
        .history
        .entries
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(names, ["start", "gw", "B", "end"]);
    assert!(snapshot.state.tokens.is_empty());
    assert!(instance.is_finished().await);
}

#[tokio::test]
async fn exclusive_gateway_with_no_truthy_predicate_drops_the_token() {
    let diagnostics: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = diagnostics.clone();
    let handlers = HandlerModule::new()
        .predicate("gw", "toA", |_data| false)
        .predicate("gw", "toB", |_data| false)
        .default_event_handler(move |_ctx, diag| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().unwrap().push(diag.reason);
            })
        })
        .build();
    let instance = spawn(exclusive_definition(), handlers);

    instance.trigger_event("start", json!({})).unwrap();
    instance.flush().await;

    // documented stuck state: the token is consumed, nothing is emitted
    let snapshot = instance.snapshot().await;
    assert!(snapshot.state.tokens.is_empty());
    assert!(!instance.is_finished().await);
    assert!(!snapshot.history.entries.iter().any(|e| e.name == "A"));
    assert!(!snapshot.history.entries.iter().any(|e| e.name == "B"));
    assert!(diagnostics
        .lock()
        .unwrap()
        .iter()
        .any(|reason| reason.contains("no outgoing flow predicate matched")));
}

#[tokio::test]
async fn parallel_join_fires_once_after_all_arrivals() {
    let handlers = HandlerModule::new()
        .handler("ADone", |_ctx, data| async move { Ok(data) })
        .handler("BDone", |_ctx, data| async move { Ok(data) })
        .build();
    let instance = spawn(parallel_definition(), handlers);

    instance.trigger_event("start", json!({})).unwrap();
    instance.flush().await;
    assert!(instance.has_token_at("A").await);
    assert!(instance.has_token_at("B").await);

    instance.task_done("A", json!({}));
    instance.flush().await;
    {
        let snapshot = instance.snapshot().await;
        let at_join = snapshot
            .state
            .tokens
            .iter()
            .filter(|t| t.position == "join")
            .count();
        assert_eq!(at_join, 1);
        assert!(instance.has_token_at("B").await);
        assert!(!instance.is_finished().await);
    }

    instance.task_done("B", json!({}));
    instance.flush().await;

    let snapshot = instance.snapshot().await;
    assert!(snapshot.state.tokens.is_empty());
    let ends = snapshot
        .history
        .entries
        .iter()
        .filter(|e| e.name == "end")
        .count();
    assert_eq!(ends, 1, "join fires exactly once");
    let joins = snapshot
        .history
        .entries
        .iter()
        .filter(|e| e.name == "join")
        .count();
    assert_eq!(joins, 2, "one history entry per arrival");
    assert!(snapshot
        .history
        .entries
        .iter()
        .filter(|e| e.name == "join")
        .all(|e| e.end.is_some()));
}
