use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use bpmnflow_engine::InstanceSnapshot;

#[derive(Debug, Serialize, ToSchema)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

/// REST projection of a live instance.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    pub id: String,
    pub name: String,
    pub link: Link,
    #[schema(value_type = Vec<Object>)]
    pub state: Value,
    #[schema(value_type = Vec<Object>)]
    pub history: Value,
    #[schema(value_type = Object)]
    pub properties: Map<String, Value>,
}

impl From<InstanceSnapshot> for InstanceView {
    fn from(snapshot: InstanceSnapshot) -> Self {
        let href = format!(
            "/{}/{}",
            urlencoding::encode(&snapshot.name),
            urlencoding::encode(&snapshot.id)
        );
        InstanceView {
            link: Link {
                rel: "self".to_string(),
                href,
            },
            state: serde_json::to_value(&snapshot.state.tokens).expect("tokens serialize"),
            history: serde_json::to_value(&snapshot.history.entries).expect("entries serialize"),
            properties: snapshot.properties,
            id: snapshot.id,
            name: snapshot.name,
        }
    }
}

/// One pool of a collaboration creation request.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDescriptorDto {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub start_event_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollaborateRequest {
    pub process_descriptors: Vec<ProcessDescriptorDto>,
}
