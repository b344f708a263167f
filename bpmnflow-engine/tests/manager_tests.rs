use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map};

use bpmnflow_engine::{CollaborationDescriptor, ConfigError, HandlerModule, ProcessManager};
use bpmnflow_model::{DefinitionBuilder, MessageFlow, Participant, ProcessDefinition, TaskKind};

fn order_definition() -> ProcessDefinition {
    DefinitionBuilder::new("PROCESS_1", "Order")
        .start_event("_2", "start")
        .task("_3", "TaskA", TaskKind::UserTask)
        .end_event("_4", "end")
        .flow("_2", "_3")
        .flow("_3", "_4")
        .build()
        .unwrap()
}

fn noop_handlers() -> Arc<HandlerModule> {
    HandlerModule::new()
        .handler("TaskADone", |_ctx, data| async move { Ok(data) })
        .build()
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
async fn create_requires_an_unambiguous_definition() {
    let manager = ProcessManager::in_memory();
    assert!(matches!(
        manager.create_process("1").await,
        Err(ConfigError::AmbiguousDefinition(0))
    ));

    manager.add_definition(order_definition(), noop_handlers()).await;
    let instance = manager.create_process("1").await.unwrap();
    assert_eq!(instance.process_name(), "Order");

    // same id twice is a collision
    assert!(matches!(
        manager.create_process("1").await,
        Err(ConfigError::DuplicateProcessId(_))
    ));
}

#[tokio::test]
async fn queries_by_state_name_and_property() {
    let manager = ProcessManager::in_memory();
    manager.add_definition(order_definition(), noop_handlers()).await;

    let first = manager.create_process_named("Order", "a").await.unwrap();
    let second = manager.create_process_named("Order", "b").await.unwrap();

    first.trigger_event("start", json!({})).unwrap();
    first.flush().await;
    first.set_property("customer", json!({"name": "acme", "tier": 2}));
    second.set_property("customer", json!({"name": "initech", "tier": 1}));

    let waiting = manager.find_by_state("TaskA").await;
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].process_id(), "a");

    assert_eq!(manager.find_by_name("Order", true).await.len(), 2);
    assert_eq!(manager.find_by_name("order", false).await.len(), 2);
    assert!(manager.find_by_name("order", true).await.is_empty());

    // dot paths descend, equality is strict
    let mut query = Map::new();
    query.insert("customer.name".to_string(), json!("acme"));
    let found = manager.find_by_property(&query).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].process_id(), "a");

    let mut query = Map::new();
    query.insert("customer.tier".to_string(), json!("1"));
    assert!(manager.find_by_property(&query).await.is_empty());

    let mut query = Map::new();
    query.insert("customer.tier".to_string(), json!(1));
    assert_eq!(manager.find_by_property(&query).await.len(), 1);
}

fn seller_definition() -> ProcessDefinition {
    DefinitionBuilder::new("PA", "Seller")
        .start_event("_1", "sstart")
        .task("_2", "notify", TaskKind::SendTask)
        .end_event("_3", "send")
        .flow("_1", "_2")
        .flow("_2", "_3")
        .message_flow(MessageFlow {
            name: Some("order placed".to_string()),
            source_ref: "_2".to_string(),
            target_ref: "_r".to_string(),
            source_process_definition_id: Some("PA".to_string()),
            target_process_definition_id: Some("PB".to_string()),
        })
        .participant(Participant::new("Seller", "PA"))
        .participant(Participant::new("Buyer", "PB"))
        .build()
        .unwrap()
}

fn buyer_definition() -> ProcessDefinition {
    DefinitionBuilder::new("PB", "Buyer")
        .start_event("_b1", "bstart")
        .intermediate_catch_event("_r", "orderReceived", false)
        .end_event("_b2", "bend")
        .flow("_b1", "_r")
        .flow("_r", "_b2")
        .participant(Participant::new("Seller", "PA"))
        .participant(Participant::new("Buyer", "PB"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn collaborating_processes_exchange_messages() {
    let manager = ProcessManager::in_memory();

    let flow = seller_definition().message_flows[0].clone();
    let seller_handlers = HandlerModule::new()
        .handler("notify", move |ctx, data| {
            let flow = flow.clone();
            async move {
                ctx.send_message(&flow, data.clone())
                    .map_err(|e| e.to_string())?;
                Ok(data)
            }
        })
        .build();
    manager.add_definition(seller_definition(), seller_handlers).await;
    manager
        .add_definition(buyer_definition(), HandlerModule::new().build())
        .await;

    let created = manager
        .create_collaboration(&[
            CollaborationDescriptor {
                name: "Seller".to_string(),
                id: "s1".to_string(),
            },
            CollaborationDescriptor {
                name: "Buyer".to_string(),
                id: "b1".to_string(),
            },
        ])
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    let seller = manager.get_process("s1").await.unwrap();
    let buyer = manager.get_process("b1").await.unwrap();
    assert!(seller.participant("Buyer").is_some());
    assert!(buyer.participant("Seller").is_some());

    // the buyer parks on its catch event first
    buyer.trigger_event("bstart", json!({})).unwrap();
    buyer.flush().await;
    assert!(buyer.has_token_at("orderReceived").await);

    // the seller's send task completes synchronously and delivers along the
    // message flow
    seller.trigger_event("sstart", json!({"sku": "x"})).unwrap();
    wait_for(|| seller.is_finished()).await;
    wait_for(|| buyer.is_finished()).await;
}

#[tokio::test]
async fn collaboration_checks_id_collisions_up_front() {
    let manager = ProcessManager::in_memory();
    manager.add_definition(seller_definition(), noop_handlers()).await;
    manager.add_definition(buyer_definition(), noop_handlers()).await;

    let result = manager
        .create_collaboration(&[
            CollaborationDescriptor {
                name: "Seller".to_string(),
                id: "same".to_string(),
            },
            CollaborationDescriptor {
                name: "Buyer".to_string(),
                id: "same".to_string(),
            },
        ])
        .await;
    assert!(matches!(result, Err(ConfigError::DuplicateProcessId(_))));
    // nothing was created
    assert!(manager.get_process("same").await.is_none());
}
