use async_trait::async_trait;
use playground_protocol::{
    CreateSessionRequest, CreateSessionResponse, DeleteResponse, ErrorResponse, EventsResponse,
    MessagesResponse, SendRequest, SendResponse, StatusResponse,
};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{ClientError, Result};

/// Operations the client needs from the relay.
#[async_trait]
pub trait RelayApi: Send + Sync {
    async fn status(&self) -> Result<StatusResponse>;

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<String>;

    async fn send(&self, session_id: &str, prompt: &str) -> Result<String>;

    /// Events at `[from, total)` of the session's log
    async fn events(&self, session_id: &str, from: usize) -> Result<EventsResponse>;

    async fn messages(&self, session_id: &str) -> Result<MessagesResponse>;

    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

/// [`RelayApi`] over HTTP/JSON
#[derive(Clone)]
pub struct HttpRelayApi {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpRelayApi {
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(server_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http_client: reqwest::Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Validation(e.to_string()))
    }

    async fn handle<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| ClientError::Decode(e.to_string()));
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        tracing::debug!(status = %status, message = %message, "relay request failed");
        Err(ClientError::from_status(status, message))
    }
}

fn transport(e: reqwest::Error) -> ClientError {
    ClientError::Connection(e.to_string())
}

#[async_trait]
impl RelayApi for HttpRelayApi {
    async fn status(&self) -> Result<StatusResponse> {
        let resp = self
            .http_client
            .get(self.url("api/status")?)
            .send()
            .await
            .map_err(transport)?;
        Self::handle(resp).await
    }

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<String> {
        let resp = self
            .http_client
            .post(self.url("api/sessions")?)
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        let created: CreateSessionResponse = Self::handle(resp).await?;
        Ok(created.session_id)
    }

    async fn send(&self, session_id: &str, prompt: &str) -> Result<String> {
        let resp = self
            .http_client
            .post(self.url(&format!("api/sessions/{}/send", session_id))?)
            .json(&SendRequest {
                prompt: Some(prompt.to_string()),
            })
            .send()
            .await
            .map_err(transport)?;
        let sent: SendResponse = Self::handle(resp).await?;
        Ok(sent.message_id)
    }

    async fn events(&self, session_id: &str, from: usize) -> Result<EventsResponse> {
        let mut url = self.url(&format!("api/sessions/{}/events", session_id))?;
        url.query_pairs_mut().append_pair("from", &from.to_string());
        let resp = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(transport)?;
        Self::handle(resp).await
    }

    async fn messages(&self, session_id: &str) -> Result<MessagesResponse> {
        let resp = self
            .http_client
            .get(self.url(&format!("api/sessions/{}/messages", session_id))?)
            .send()
            .await
            .map_err(transport)?;
        Self::handle(resp).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let resp = self
            .http_client
            .delete(self.url(&format!("api/sessions/{}", session_id))?)
            .send()
            .await
            .map_err(transport)?;
        let _: DeleteResponse = Self::handle(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_keeps_prefix() {
        let api = HttpRelayApi::new("http://localhost:3000/relay").unwrap();
        assert_eq!(
            api.url("api/status").unwrap().as_str(),
            "http://localhost:3000/relay/api/status"
        );

        let api = HttpRelayApi::new("http://localhost:3000").unwrap();
        assert_eq!(
            api.url("api/sessions/s1/send").unwrap().as_str(),
            "http://localhost:3000/api/sessions/s1/send"
        );
    }

    #[test]
    fn test_invalid_server_url() {
        assert!(HttpRelayApi::new("not a url").is_err());
    }
}
