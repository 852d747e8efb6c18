//! HTTP backend for the gateway management API

use crate::entities::*;
use crate::error::{GatewayError, GatewayResult};
use crate::traits::Gateway;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Credentials for the management API
#[derive(Debug, Clone, Default)]
pub enum GatewayAuth {
    #[default]
    None,
    Basic {
        user: String,
        password: String,
    },
    Bearer(String),
}

/// Configuration of the HTTP backend
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Management API base URL, e.g. `https://gw.example.com/management`
    pub base_url: String,

    /// Routing coordinates scoping every call
    pub organization: String,
    pub environment: String,

    pub auth: GatewayAuth,

    /// Per-call timeout; a timed-out call surfaces as an ordinary error
    pub timeout: Duration,
}

/// Gateway management API over HTTP
pub struct HttpGateway {
    client: Client,
    base_url: String,
    auth: GatewayAuth,
}

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig) -> GatewayResult<Self> {
        if config.organization.is_empty() || config.environment.is_empty() {
            return Err(GatewayError::Config(
                "organization and environment must be set".into(),
            ));
        }
        url::Url::parse(&config.base_url)
            .map_err(|e| GatewayError::Config(format!("invalid base URL: {e}")))?;

        let client = Client::builder().timeout(config.timeout).build()?;

        // Every entity path lives under the org/env scope
        let base_url = format!(
            "{}/organizations/{}/environments/{}",
            config.base_url.trim_end_matches('/'),
            config.organization,
            config.environment
        );

        Ok(Self {
            client,
            base_url,
            auth: config.auth,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            GatewayAuth::None => request,
            GatewayAuth::Basic { user, password } => request.basic_auth(user, Some(password)),
            GatewayAuth::Bearer(token) => request.bearer_auth(token),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.authorize(self.client.get(&url)).send().await?;
        Self::parse(path, response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> GatewayResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await?;
        Self::parse(path, response).await
    }

    async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> GatewayResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .authorize(self.client.put(&url))
            .json(body)
            .send()
            .await?;
        Self::parse(path, response).await
    }

    async fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> GatewayResult<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await?;
        Self::check(path, response).await
    }

    async fn delete_unit(&self, path: &str) -> GatewayResult<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.authorize(self.client.delete(&url)).send().await?;
        Self::check(path, response).await
    }

    async fn parse<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> GatewayResult<T> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::api_error(path, status, response).await)
        }
    }

    async fn check(path: &str, response: reqwest::Response) -> GatewayResult<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::api_error(path, status, response).await)
        }
    }

    async fn api_error(path: &str, status: StatusCode, response: reqwest::Response) -> GatewayError {
        if status == StatusCode::NOT_FOUND {
            return GatewayError::NotFound(path.to_string());
        }
        let message = response.text().await.unwrap_or_default();
        tracing::debug!(path, status = status.as_u16(), %message, "gateway call rejected");
        GatewayError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn create_application(&self, app: &NewApplication) -> GatewayResult<RemoteApplication> {
        self.post_json("/applications", &application_body(app.name.clone(), app))
            .await
    }

    async fn update_application(
        &self,
        id: &str,
        app: &ApplicationUpdate,
    ) -> GatewayResult<RemoteApplication> {
        self.put_json(
            &format!("/applications/{id}"),
            &application_body(app.name.clone(), app),
        )
        .await
    }

    async fn get_application(&self, id: &str) -> GatewayResult<RemoteApplication> {
        self.get_json(&format!("/applications/{id}")).await
    }

    async fn delete_application(&self, id: &str) -> GatewayResult<()> {
        self.delete_unit(&format!("/applications/{id}")).await
    }

    async fn list_subscriptions(
        &self,
        application_id: &str,
    ) -> GatewayResult<Vec<RemoteSubscription>> {
        self.get_json(&format!("/applications/{application_id}/subscriptions"))
            .await
    }

    async fn create_subscription(
        &self,
        application_id: &str,
        plan_id: &str,
    ) -> GatewayResult<RemoteSubscription> {
        self.post_json(
            &format!("/applications/{application_id}/subscriptions?plan={plan_id}"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn close_subscription(
        &self,
        application_id: &str,
        subscription_id: &str,
    ) -> GatewayResult<()> {
        self.post_unit(
            &format!("/applications/{application_id}/subscriptions/{subscription_id}/_close"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn delete_subscription(
        &self,
        application_id: &str,
        subscription_id: &str,
    ) -> GatewayResult<()> {
        self.delete_unit(&format!(
            "/applications/{application_id}/subscriptions/{subscription_id}"
        ))
        .await
    }

    async fn create_api(&self, api: &NewApi) -> GatewayResult<RemoteRef> {
        self.post_json("/apis", api).await
    }

    async fn update_api(&self, id: &str, api: &ApiUpdate) -> GatewayResult<RemoteApi> {
        self.put_json(&format!("/apis/{id}"), &api_update_body(api))
            .await
    }

    async fn get_api(&self, id: &str) -> GatewayResult<RemoteApi> {
        self.get_json(&format!("/apis/{id}")).await
    }

    async fn search_api(&self, context_path: &str) -> GatewayResult<Option<RemoteApi>> {
        let matches: Vec<RemoteApi> = self
            .get_json(&format!("/apis?context_path={context_path}"))
            .await?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.into_iter().next()),
            n => Err(GatewayError::Ambiguous(format!(
                "{n} APIs match context path {context_path}"
            ))),
        }
    }

    async fn delete_api(&self, id: &str) -> GatewayResult<()> {
        self.delete_unit(&format!("/apis/{id}")).await
    }

    async fn deploy_api(&self, id: &str) -> GatewayResult<()> {
        self.post_unit(&format!("/apis/{id}/deploy"), &serde_json::json!({}))
            .await
    }

    async fn lifecycle_api(&self, id: &str, action: LifecycleAction) -> GatewayResult<()> {
        self.post_unit(
            &format!("/apis/{id}?action={}", action.as_str()),
            &serde_json::json!({}),
        )
        .await
    }

    async fn list_plans(&self, api_id: &str) -> GatewayResult<Vec<RemotePlan>> {
        self.get_json(&format!("/apis/{api_id}/plans")).await
    }

    async fn get_plan(&self, api_id: &str, plan_id: &str) -> GatewayResult<RemotePlan> {
        self.get_json(&format!("/apis/{api_id}/plans/{plan_id}")).await
    }

    async fn create_plan(&self, api_id: &str, plan: &NewPlan) -> GatewayResult<RemotePlan> {
        // New plans always go live immediately with automatic validation
        let rule = serde_json::json!({
            "methods": plan.allowed_methods,
            "enabled": true,
            "policy": plan.policy.as_ref().map(|name| serde_json::json!({ "name": name })),
        });
        let body = serde_json::json!({
            "api": api_id,
            "name": plan.name,
            "description": plan.description,
            "security": plan.security,
            "securityDefinition": plan.security_definition,
            "paths": { "/": [rule] },
            "status": "PUBLISHED",
            "type": "API",
            "validation": "AUTO",
        });
        self.post_json(&format!("/apis/{api_id}/plans"), &body).await
    }

    async fn update_plan(
        &self,
        api_id: &str,
        plan_id: &str,
        plan: &PlanUpdate,
    ) -> GatewayResult<RemotePlan> {
        let body = serde_json::json!({
            "name": plan.name,
            "description": plan.description,
            "securityDefinition": plan.security_definition,
            "tags": plan.tags,
            "order": plan.order,
            "validation": plan.validation,
        });
        self.put_json(&format!("/apis/{api_id}/plans/{plan_id}"), &body)
            .await
    }

    async fn close_plan(&self, api_id: &str, plan_id: &str) -> GatewayResult<()> {
        self.post_unit(
            &format!("/apis/{api_id}/plans/{plan_id}/_close"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn delete_plan(&self, api_id: &str, plan_id: &str) -> GatewayResult<()> {
        self.delete_unit(&format!("/apis/{api_id}/plans/{plan_id}"))
            .await
    }

    async fn api_metrics(&self, api_id: &str, window: Duration) -> GatewayResult<ApiMetrics> {
        let to = chrono::Utc::now().timestamp_millis();
        let from = to - window.as_millis() as i64;
        let stats = self
            .get_json(&format!(
                "/apis/{api_id}/analytics?type=stats&field=response-time&interval={}&from={from}&to={to}",
                window.as_millis()
            ))
            .await?;
        Ok(ApiMetrics { stats })
    }
}

/// Application payload with the nested settings block the gateway expects
fn application_body(name: String, app: &impl ApplicationFields) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "description": app.description(),
        "type": app.app_type(),
        "client_id": app.client_id(),
        "settings": {
            "app": {
                "client_id": app.client_id(),
                "type": app.app_type(),
            }
        }
    })
}

trait ApplicationFields {
    fn description(&self) -> &str;
    fn app_type(&self) -> &str;
    fn client_id(&self) -> &str;
}

impl ApplicationFields for NewApplication {
    fn description(&self) -> &str {
        &self.description
    }
    fn app_type(&self) -> &str {
        &self.app_type
    }
    fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl ApplicationFields for ApplicationUpdate {
    fn description(&self) -> &str {
        &self.description
    }
    fn app_type(&self) -> &str {
        &self.app_type
    }
    fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Full update body: the remote proxy configuration is replaced, not
/// merged, with a single default group pointing at the resolved target
fn api_update_body(api: &ApiUpdate) -> serde_json::Value {
    serde_json::json!({
        "name": api.name,
        "version": api.version,
        "description": api.description,
        "tags": api.tags,
        "visibility": api.visibility,
        "proxy": {
            "virtual_hosts": [{ "path": api.context_path }],
            "groups": [{
                "name": "default-group",
                "endpoints": [{
                    "name": "default",
                    "type": "http",
                    "target": api.target,
                }],
            }],
            "cors": api.cors,
        },
    })
}
