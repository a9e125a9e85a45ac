//! Guide assistant deployments.
//!
//! Deploying wraps a set of guides into a knowledge worker and registers
//! it under a fresh agent id. Deployments live for the process lifetime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::FileId;

pub const WORKER_ID: &str = "davinci_worker";
const WORKER_NAME: &str = "DaVinci Knowledge Worker";
const WORKER_DESCRIPTION: &str = "Worker that holds knowledge about the DaVinci guides";
const AGENT_NAME: &str = "DaVinci Assistant";
const AGENT_GOAL: &str = "Help users understand and access DaVinci guides";
const AGENT_DESCRIPTION: &str =
    "An agent that helps users navigate and understand the available guides";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeItem {
    pub title: String,
    pub content: String,
    pub file_id: FileId,
    #[serde(default, alias = "contentHash")]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeWorker {
    pub id: String,
    pub name: String,
    pub description: String,
    pub knowledge: Vec<KnowledgeItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub agent_id: String,
    pub name: String,
    pub goal: String,
    pub description: String,
    pub workers: Vec<KnowledgeWorker>,
    pub deployed_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct AgentRegistry {
    deployments: RwLock<Vec<Deployment>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an assistant whose single worker knows `guides`.
    /// Returns `None` when there is nothing to deploy.
    pub async fn deploy(&self, guides: Vec<KnowledgeItem>) -> Option<Deployment> {
        if guides.is_empty() {
            return None;
        }

        let deployment = Deployment {
            agent_id: Uuid::new_v4().to_string(),
            name: AGENT_NAME.to_string(),
            goal: AGENT_GOAL.to_string(),
            description: AGENT_DESCRIPTION.to_string(),
            workers: vec![KnowledgeWorker {
                id: WORKER_ID.to_string(),
                name: WORKER_NAME.to_string(),
                description: WORKER_DESCRIPTION.to_string(),
                knowledge: guides,
            }],
            deployed_at: Utc::now(),
        };

        tracing::info!(
            agent_id = %deployment.agent_id,
            guides = deployment.workers[0].knowledge.len(),
            "deployed guide assistant"
        );
        self.deployments.write().await.push(deployment.clone());
        Some(deployment)
    }

    pub async fn list(&self) -> Vec<Deployment> {
        self.deployments.read().await.clone()
    }
}
