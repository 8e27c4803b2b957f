//! HTTP implementation of the remote service.

use std::time::Duration;

use async_trait::async_trait;
use conversation_core::{
    AddMessageRequest, AiRequest, AiResponse, Branch, Conversation, ConversationTree,
    ConversationUpdate, CreateBranchRequest, CreateConversationRequest, Node, NodeUpdate,
};
use log::{debug, warn};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{RemoteError, Result};
use crate::service::RemoteService;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// reqwest client against the conversation REST surface.
///
/// Does not retry failed requests; retry is the caller's responsibility.
pub struct HttpRemoteService {
    client: Client,
    base_url: String,
}

/// Error body shape the backend uses for non-2xx responses.
#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

impl HttpRemoteService {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("http client");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("http client");
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success response to a typed error, carrying the backend's
    /// `detail` message when the body has one.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|parsed| parsed.detail)
            .unwrap_or(body);
        warn!("remote call failed: HTTP {}: {}", status, message);

        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(message));
        }
        Err(RemoteError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {}", path);
        let response = self.client.get(self.url(path)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        debug!("POST {}", path);
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn put_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        debug!("PUT {}", path);
        let response = self.client.put(self.url(path)).json(body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.get_json("/conversations").await
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        self.get_json(&format!("/conversations/{}", id)).await
    }

    async fn get_conversation_tree(&self, id: &str) -> Result<ConversationTree> {
        self.get_json(&format!("/conversations/{}/tree", id)).await
    }

    async fn create_conversation(
        &self,
        request: CreateConversationRequest,
    ) -> Result<Conversation> {
        self.post_json("/conversations", &request).await
    }

    async fn update_conversation(
        &self,
        id: &str,
        update: ConversationUpdate,
    ) -> Result<Conversation> {
        self.put_json(&format!("/conversations/{}", id), &update).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        debug!("DELETE /conversations/{}", id);
        let response = self
            .client
            .delete(self.url(&format!("/conversations/{}", id)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_branch(
        &self,
        conversation_id: &str,
        request: CreateBranchRequest,
    ) -> Result<Branch> {
        self.post_json(
            &format!("/conversations/{}/branches", conversation_id),
            &request,
        )
        .await
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        request: AddMessageRequest,
    ) -> Result<Node> {
        self.post_json(
            &format!("/conversations/{}/messages", conversation_id),
            &request,
        )
        .await
    }

    async fn update_node(
        &self,
        conversation_id: &str,
        node_id: &str,
        update: NodeUpdate,
    ) -> Result<Node> {
        self.put_json(
            &format!("/conversations/{}/nodes/{}", conversation_id, node_id),
            &update,
        )
        .await
    }

    async fn get_ai_response(&self, request: AiRequest) -> Result<AiResponse> {
        self.post_json("/ai/response", &request).await
    }
}
