use std::time::Duration;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);

/// A game profile authorized by a Yggdrasil server.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Profile id as issued by the server (unsigned hex uuid).
    pub id: String,
    pub display_name: String,
    pub access_token: String,
    #[serde(default)]
    pub client_token: Option<String>,
    /// Name of the API endpoint that issued the token.
    #[serde(default)]
    pub origin: String,
    /// Login handle used to authenticate, kept to prefill re-login.
    #[serde(default)]
    pub login: Option<String>,
    /// Whether the access token is already bound to this profile.
    #[serde(default = "default_true")]
    pub profile_bound: bool,
    #[serde(default)]
    pub invalid: bool,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("access_token", &"***")
            .field("client_token", &self.client_token.as_ref().map(|_| "***"))
            .field("origin", &self.origin)
            .field("profile_bound", &self.profile_bound)
            .field("invalid", &self.invalid)
            .finish()
    }
}

impl Account {
    pub fn profile(&self) -> GameProfile {
        GameProfile {
            id: self.id.clone(),
            name: self.display_name.clone(),
        }
    }

    /// Applies a refresh result: new tokens, profile now bound, validity restored.
    pub fn apply_refresh(&mut self, refreshed: &RefreshResponse) {
        self.access_token = refreshed.access_token.clone();
        if let Some(client_token) = &refreshed.client_token {
            self.client_token = Some(client_token.clone());
        }
        if let Some(profile) = &refreshed.selected_profile {
            if profile.id == self.id {
                self.display_name = profile.name.clone();
            }
        }
        self.profile_bound = true;
        self.invalid = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameProfile {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
struct AgentInfo {
    name: &'static str,
    version: u32,
}

const MINECRAFT_AGENT: AgentInfo = AgentInfo {
    name: "Minecraft",
    version: 1,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateRequest<'a> {
    agent: AgentInfo,
    username: &'a str,
    password: &'a str,
    client_token: &'a str,
    request_user: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateResponse {
    pub access_token: String,
    #[serde(default)]
    pub client_token: Option<String>,
    #[serde(default)]
    pub available_profiles: Vec<GameProfile>,
    #[serde(default)]
    pub selected_profile: Option<GameProfile>,
}

impl AuthenticateResponse {
    /// One account per available profile, the selected profile (else the first) first.
    pub fn into_accounts(self, origin: &str, login: &str) -> Vec<Account> {
        let mut profiles = self.available_profiles.clone();
        if let Some(selected) = &self.selected_profile {
            if !profiles.iter().any(|p| p.id == selected.id) {
                profiles.push(selected.clone());
            }
        }

        let selected_id = self.selected_profile.as_ref().map(|p| p.id.clone());
        let primary = selected_id
            .clone()
            .or_else(|| profiles.first().map(|p| p.id.clone()));
        profiles.sort_by_key(|p| Some(&p.id) != primary.as_ref());

        profiles
            .into_iter()
            .map(|profile| Account {
                profile_bound: selected_id.as_deref() == Some(profile.id.as_str()),
                id: profile.id,
                display_name: profile.name,
                access_token: self.access_token.clone(),
                client_token: self.client_token.clone(),
                origin: origin.to_string(),
                login: Some(login.to_string()),
                invalid: false,
                last_used: None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    access_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_token: Option<&'a str>,
    request_user: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    selected_profile: Option<&'a GameProfile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub client_token: Option<String>,
    #[serde(default)]
    pub selected_profile: Option<GameProfile>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest<'a> {
    access_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_token: Option<&'a str>,
}

/// The three Yggdrasil authserver operations. `base_url` is the API root,
/// without the `/authserver` suffix.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AuthClient: Send + Sync {
    async fn authenticate(&self, base_url: &str, username: &str, password: &str) -> Result<AuthenticateResponse>;

    async fn refresh(
        &self,
        base_url: &str,
        access_token: &str,
        client_token: Option<String>,
        profile: Option<GameProfile>,
    ) -> Result<RefreshResponse>;

    /// `Ok(false)` means the server rejected the token; transport and
    /// unexpected status failures are errors.
    async fn validate(&self, base_url: &str, access_token: &str, client_token: Option<String>) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct YggdrasilClient {
    http: Client,
}

impl YggdrasilClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("yggdrasil-proxy/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    fn endpoint(base_url: &str, action: &str) -> String {
        format!("{}/authserver/{}", base_url.trim_end_matches('/'), action)
    }

    async fn error_for(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Error::http(status, &body)
    }
}

#[async_trait::async_trait]
impl AuthClient for YggdrasilClient {
    async fn authenticate(&self, base_url: &str, username: &str, password: &str) -> Result<AuthenticateResponse> {
        let client_token = uuid::Uuid::new_v4().simple().to_string();
        let request = AuthenticateRequest {
            agent: MINECRAFT_AGENT,
            username,
            password,
            client_token: &client_token,
            request_user: true,
        };

        log::debug!("Authenticating {} against {}", username, base_url);
        let response = self
            .http
            .post(Self::endpoint(base_url, "authenticate"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let mut payload: AuthenticateResponse = response.json().await?;
        if payload.client_token.is_none() {
            payload.client_token = Some(client_token);
        }
        Ok(payload)
    }

    async fn refresh(
        &self,
        base_url: &str,
        access_token: &str,
        client_token: Option<String>,
        profile: Option<GameProfile>,
    ) -> Result<RefreshResponse> {
        let request = RefreshRequest {
            access_token,
            client_token: client_token.as_deref(),
            request_user: true,
            selected_profile: profile.as_ref(),
        };

        log::debug!("Refreshing token against {}", base_url);
        let response = self
            .http
            .post(Self::endpoint(base_url, "refresh"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        Ok(response.json().await?)
    }

    async fn validate(&self, base_url: &str, access_token: &str, client_token: Option<String>) -> Result<bool> {
        let request = ValidateRequest {
            access_token,
            client_token: client_token.as_deref(),
        };

        let response = self
            .http
            .post(Self::endpoint(base_url, "validate"))
            .timeout(VALIDATE_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(true),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::error_for(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn account() -> Account {
        Account {
            id: "abc".to_string(),
            display_name: "Steve".to_string(),
            access_token: "secret-token".to_string(),
            client_token: Some("client".to_string()),
            origin: "Test".to_string(),
            login: None,
            profile_bound: true,
            invalid: false,
            last_used: None,
        }
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", account());
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("client\""));
        assert!(rendered.contains("Steve"));
    }

    #[test]
    fn test_into_accounts_orders_selected_first() {
        let response = AuthenticateResponse {
            access_token: "tok".to_string(),
            client_token: Some("ct".to_string()),
            available_profiles: vec![
                GameProfile { id: "1".to_string(), name: "Alex".to_string() },
                GameProfile { id: "2".to_string(), name: "Steve".to_string() },
            ],
            selected_profile: Some(GameProfile { id: "2".to_string(), name: "Steve".to_string() }),
        };

        let accounts = response.into_accounts("LittleSkin", "me@example.com");
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, "2");
        assert!(accounts[0].profile_bound);
        assert!(!accounts[1].profile_bound);
        assert!(accounts.iter().all(|a| a.access_token == "tok" && a.origin == "LittleSkin"));
    }

    #[test]
    fn test_apply_refresh_restores_validity() {
        let mut acc = account();
        acc.invalid = true;
        acc.profile_bound = false;
        acc.apply_refresh(&RefreshResponse {
            access_token: "new".to_string(),
            client_token: None,
            selected_profile: Some(GameProfile { id: "abc".to_string(), name: "Steve2".to_string() }),
        });
        assert_eq!(acc.access_token, "new");
        assert_eq!(acc.client_token.as_deref(), Some("client"));
        assert_eq!(acc.display_name, "Steve2");
        assert!(acc.profile_bound);
        assert!(!acc.invalid);
    }

    #[tokio::test]
    async fn test_validate_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/authserver/validate"))
            .and(body_partial_json(serde_json::json!({ "accessToken": "good" })))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/authserver/validate"))
            .and(body_partial_json(serde_json::json!({ "accessToken": "stale" })))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/authserver/validate"))
            .and(body_partial_json(serde_json::json!({ "accessToken": "boom" })))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let client = YggdrasilClient::new().unwrap();
        let base = format!("{}/api/", server.uri());
        assert!(client.validate(&base, "good", None).await.unwrap());
        assert!(!client.validate(&base, "stale", None).await.unwrap());
        match client.validate(&base, "boom", None).await {
            Err(Error::Http { status, body_snippet }) => {
                assert_eq!(status, 500);
                assert_eq!(body_snippet, "oops");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresh_sends_profile_only_when_given() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authserver/refresh"))
            .and(body_partial_json(serde_json::json!({
                "accessToken": "old",
                "selectedProfile": { "id": "abc", "name": "Steve" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "new",
                "clientToken": "ct",
                "selectedProfile": { "id": "abc", "name": "Steve" }
            })))
            .mount(&server)
            .await;

        let client = YggdrasilClient::new().unwrap();
        let refreshed = client
            .refresh(&server.uri(), "old", Some("ct".to_string()), Some(account().profile()))
            .await
            .unwrap();
        assert_eq!(refreshed.access_token, "new");

        let rejected = client.refresh(&server.uri(), "old", Some("ct".to_string()), None).await;
        assert!(matches!(rejected, Err(Error::Http { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_authenticate_parses_profiles() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authserver/authenticate"))
            .and(body_partial_json(serde_json::json!({
                "username": "me@example.com",
                "agent": { "name": "Minecraft", "version": 1 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "tok",
                "availableProfiles": [{ "id": "abc", "name": "Steve" }],
                "selectedProfile": { "id": "abc", "name": "Steve" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/authserver/authenticate"))
            .and(body_partial_json(serde_json::json!({ "username": "wrong" })))
            .respond_with(ResponseTemplate::new(403).set_body_string("Invalid credentials"))
            .mount(&server)
            .await;

        let client = YggdrasilClient::new().unwrap();
        let response = client.authenticate(&server.uri(), "me@example.com", "pw").await.unwrap();
        assert_eq!(response.access_token, "tok");
        assert!(response.client_token.is_some());
        assert_eq!(response.selected_profile.unwrap().name, "Steve");

        let failed = client.authenticate(&server.uri(), "wrong", "pw").await;
        assert!(matches!(failed, Err(Error::Http { status: 403, .. })));
    }
}
