//! リモート設定サービスのクライアント
//!
//! プロジェクトドキュメントを `/projects` に保存する。認証は bearer トークンで、
//! 有効期限の `REFRESH_THRESHOLD_SECS` 秒前になったら先回りしてリフレッシュする。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

/// 有効期限の何秒前にリフレッシュするか
pub const REFRESH_THRESHOLD_SECS: i64 = 300;

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// プロジェクト検索条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectQuery {
    Id(String),
    Name(String),
}

impl ProjectQuery {
    fn as_pair(&self) -> (&'static str, &str) {
        match self {
            ProjectQuery::Id(id) => ("id", id.as_str()),
            ProjectQuery::Name(name) => ("name", name.as_str()),
        }
    }
}

/// リモート設定サービス
#[async_trait]
pub trait RemoteConfigService: Send + Sync {
    /// 作成してサーバ側のIDを返す
    async fn create_project(&self, document: &Value) -> Result<String, RemoteError>;

    async fn get_projects(&self, query: &ProjectQuery) -> Result<Vec<Value>, RemoteError>;

    async fn update_project(&self, id: &str, document: &Value) -> Result<(), RemoteError>;

    async fn delete_project(&self, id: &str) -> Result<(), RemoteError>;
}

/// ログイン情報
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// `/auth/login` と `/auth/refresh-token` のレスポンス
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(alias = "idToken")]
    pub id_token: String,

    #[serde(alias = "refreshToken", default)]
    pub refresh_token: Option<String>,

    /// 秒数（数値または文字列）
    #[serde(alias = "expiresIn")]
    pub expires_in: Value,
}

/// 取得済みトークン
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSession {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenSession {
    /// レスポンスからセッションを作る（refresh token が返らなければ以前のものを使う）
    pub fn from_response(
        response: TokenResponse,
        previous_refresh_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, RemoteError> {
        let seconds = match &response.expires_in {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            RemoteError::UnexpectedResponse(format!("expires_in: {}", response.expires_in))
        })?;

        let refresh_token = response
            .refresh_token
            .or_else(|| previous_refresh_token.map(String::from))
            .ok_or_else(|| RemoteError::UnexpectedResponse("refresh token がありません".into()))?;

        Ok(Self {
            id_token: response.id_token,
            refresh_token,
            expires_at: now + Duration::seconds(seconds),
        })
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::seconds(REFRESH_THRESHOLD_SECS)
    }
}

/// `{"data": {"id": ...}}` または `{"id": ...}` から ID を取り出す
pub fn extract_id(body: &Value) -> Option<String> {
    let candidates = [body.get("data").and_then(|d| d.get("id")), body.get("id")];
    candidates.into_iter().flatten().find_map(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// 検索結果を配列に正規化する
pub fn extract_documents(body: Value) -> Vec<Value> {
    let inner = match body {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    };
    match inner {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

/// リモート設定サービスの HTTP クライアント
pub struct RemoteClient {
    base_url: String,
    credentials: Credentials,
    client: Client,
    session: Mutex<Option<TokenSession>>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            client: Client::new(),
            session: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authenticate(&self, path: &str, body: &Value) -> Result<TokenResponse, RemoteError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let body = Self::handle_response(response).await?;
        serde_json::from_value(body.get("data").cloned().unwrap_or(body))
            .map_err(|e| RemoteError::UnexpectedResponse(e.to_string()))
    }

    /// セッション開始時のログイン
    pub async fn login(&self) -> Result<(), RemoteError> {
        let body = serde_json::to_value(&self.credentials)
            .map_err(|e| RemoteError::UnexpectedResponse(e.to_string()))?;
        let response = self.authenticate("/auth/login", &body).await?;
        let session = TokenSession::from_response(response, None, Utc::now())?;
        tracing::debug!(expires_at = %session.expires_at, "Logged in to remote config service");
        *self.session.lock().await = Some(session);
        Ok(())
    }

    /// 有効なトークンを返す（期限が近ければリフレッシュ、失敗したら再ログイン）
    async fn token(&self) -> Result<String, RemoteError> {
        let current = self.session.lock().await.clone();
        match current {
            None => self.login().await?,
            Some(session) if session.needs_refresh(Utc::now()) => {
                let body = serde_json::json!({ "refresh_token": session.refresh_token });
                match self.authenticate("/auth/refresh-token", &body).await {
                    Ok(response) => {
                        let refreshed = TokenSession::from_response(
                            response,
                            Some(&session.refresh_token),
                            Utc::now(),
                        )?;
                        tracing::debug!(expires_at = %refreshed.expires_at, "Refreshed token");
                        *self.session.lock().await = Some(refreshed);
                    }
                    Err(e) => {
                        tracing::warn!("Token refresh failed, logging in again: {}", e);
                        self.login().await?;
                    }
                }
            }
            Some(_) => {}
        }

        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.id_token.clone())
            .ok_or_else(|| RemoteError::Unauthorized("セッションがありません".into()))
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, RemoteError> {
        let token = self.token().await?;
        Ok(self.client.request(method, self.url(path)).bearer_auth(token))
    }

    /// Handle response, converting HTTP errors to RemoteError.
    async fn handle_response(response: reqwest::Response) -> Result<Value, RemoteError> {
        let status = response.status();
        if status.is_success() {
            let text = response.text().await?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text).map_err(|e| RemoteError::UnexpectedResponse(e.to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            match status {
                StatusCode::NOT_FOUND => Err(RemoteError::NotFound(body)),
                StatusCode::BAD_REQUEST => Err(RemoteError::BadRequest(body)),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Err(RemoteError::Unauthorized(body))
                }
                _ => Err(RemoteError::Server(format!("{}: {}", status, body))),
            }
        }
    }
}

#[async_trait]
impl RemoteConfigService for RemoteClient {
    async fn create_project(&self, document: &Value) -> Result<String, RemoteError> {
        let response = self
            .request(Method::POST, "/projects")
            .await?
            .json(document)
            .send()
            .await?;
        let body = Self::handle_response(response).await?;
        extract_id(&body)
            .ok_or_else(|| RemoteError::UnexpectedResponse(format!("id がありません: {}", body)))
    }

    async fn get_projects(&self, query: &ProjectQuery) -> Result<Vec<Value>, RemoteError> {
        let response = self
            .request(Method::GET, "/projects")
            .await?
            .query(&[query.as_pair()])
            .send()
            .await?;
        Ok(extract_documents(Self::handle_response(response).await?))
    }

    async fn update_project(&self, id: &str, document: &Value) -> Result<(), RemoteError> {
        let response = self
            .request(Method::PUT, &format!("/projects/{}", id))
            .await?
            .json(document)
            .send()
            .await?;
        Self::handle_response(response).await?;
        Ok(())
    }

    async fn delete_project(&self, id: &str) -> Result<(), RemoteError> {
        let response = self
            .request(Method::DELETE, &format!("/projects/{}", id))
            .await?
            .send()
            .await?;
        Self::handle_response(response).await?;
        Ok(())
    }
}
