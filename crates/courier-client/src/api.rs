use courier_types::api::{
    AuthResponse, LoginRequest, MarkReadResponse, SendMessageRequest, SignupRequest,
    UpdateProfileRequest, UserListResponse,
};
use courier_types::models::{Message, PublicUser};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ClientError;

/// Typed REST client for a courier server.
///
/// `signup`/`login` store the returned token; every later call presents it
/// as a bearer header.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The stored credential, present after a successful signup or login.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Creates an account and stores the returned token.
    pub async fn signup(
        &mut self,
        email: &str,
        display_name: &str,
        password: &str,
        bio: Option<&str>,
    ) -> Result<PublicUser, ClientError> {
        let req = SignupRequest {
            email: email.into(),
            display_name: display_name.into(),
            password: password.into(),
            bio: bio.map(String::from),
        };
        let auth: AuthResponse = self
            .execute(self.http.post(self.url("/auth/signup")).json(&req))
            .await?;
        self.token = Some(auth.token);
        Ok(auth.user)
    }

    /// Authenticates and stores the returned token.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<PublicUser, ClientError> {
        let req = LoginRequest {
            email: email.into(),
            password: password.into(),
        };
        let auth: AuthResponse = self
            .execute(self.http.post(self.url("/auth/login")).json(&req))
            .await?;
        self.token = Some(auth.token);
        Ok(auth.user)
    }

    /// Validates the stored token, returning who the server thinks we are.
    pub async fn check_auth(&self) -> Result<PublicUser, ClientError> {
        self.execute(self.authed(Method::GET, "/auth/check")).await
    }

    /// Partial profile update; returns the updated user.
    pub async fn update_profile(
        &self,
        req: &UpdateProfileRequest,
    ) -> Result<PublicUser, ClientError> {
        self.execute(self.authed(Method::PUT, "/profile").json(req))
            .await
    }

    /// All other users plus the unseen-count map keyed by sender id.
    pub async fn list_users(&self) -> Result<UserListResponse, ClientError> {
        self.execute(self.authed(Method::GET, "/users")).await
    }

    /// Ordered history with `other`, ascending. The server marks our unseen
    /// messages in that conversation seen as a side effect, so a fetch both
    /// loads and acknowledges. `limit` keeps only the newest window;
    /// `before` pages further back from an earlier message's `created_at`.
    pub async fn fetch_conversation(
        &self,
        other: Uuid,
        limit: Option<u32>,
        before: Option<&str>,
    ) -> Result<Vec<Message>, ClientError> {
        let mut req = self.authed(Method::GET, &format!("/conversations/{other}"));
        if let Some(limit) = limit {
            req = req.query(&[("limit", limit.to_string())]);
        }
        if let Some(before) = before {
            req = req.query(&[("before", before)]);
        }
        self.execute(req).await
    }

    /// Explicit bulk mark-seen; returns how many messages flipped.
    pub async fn mark_read(&self, other: Uuid) -> Result<u32, ClientError> {
        let resp: MarkReadResponse = self
            .execute(self.authed(Method::PUT, &format!("/conversations/{other}/mark-read")))
            .await?;
        Ok(resp.marked)
    }

    /// Sends a message; returns it as persisted (id, timestamp, seen flag).
    pub async fn send_message(
        &self,
        to: Uuid,
        body: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<Message, ClientError> {
        let req = SendMessageRequest {
            body: body.map(String::from),
            image_url: image_url.map(String::from),
        };
        self.execute(
            self.authed(Method::POST, &format!("/conversations/{to}/messages"))
                .json(&req),
        )
        .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.http.request(method, self.url(path));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Sends the request and decodes the body, turning non-2xx responses
    /// into [`ClientError::Api`] carrying the server's envelope message.
    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let message = match resp.json::<Value>().await {
            Ok(envelope) => envelope["message"]
                .as_str()
                .unwrap_or("request failed")
                .to_string(),
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
