//! Backend-as-a-service adapter (Supabase REST): token resolution, profile reads and the
//! atomic usage RPC.

use giftpipe_core::{
    Account, AccountService, Error, QuotaDecision, QuotaStatus, Result, SubjectProfile,
};
use serde::Deserialize;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_ROLE: &str = "free";
pub const USAGE_FEATURE: &str = "gift_suggestions";

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct SupabaseBackend {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    timeout_ms: u64,
}

impl SupabaseBackend {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let base_url = env("GIFTPIPE_SUPABASE_URL")
            .or_else(|| env("SUPABASE_URL"))
            .ok_or_else(|| {
                Error::NotConfigured("missing GIFTPIPE_SUPABASE_URL (or SUPABASE_URL)".to_string())
            })?;
        let service_key = env("GIFTPIPE_SUPABASE_SERVICE_KEY")
            .or_else(|| env("SUPABASE_SERVICE_ROLE_KEY"))
            .ok_or_else(|| {
                Error::NotConfigured(
                    "missing GIFTPIPE_SUPABASE_SERVICE_KEY (or SUPABASE_SERVICE_ROLE_KEY)"
                        .to_string(),
                )
            })?;
        Ok(Self::new(client, base_url, service_key))
    }

    pub fn new(client: reqwest::Client, base_url: String, service_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    fn service_get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("apikey", &self.service_key)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.service_key),
            )
            .timeout(self.timeout())
    }
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    app_metadata: Option<AppMetadata>,
}

#[derive(Debug, Deserialize)]
struct AppMetadata {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    interests: Option<Vec<String>>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    age: Option<u32>,
    #[serde(default)]
    relationship: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageRow {
    allowed: bool,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    remaining: Option<u32>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    reset_time: Option<String>,
}

impl From<ProfileRow> for SubjectProfile {
    fn from(r: ProfileRow) -> Self {
        SubjectProfile {
            id: r.id,
            name: r.name.unwrap_or_default(),
            interests: r
                .interests
                .unwrap_or_default()
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            notes: r.notes.filter(|s| !s.trim().is_empty()),
            age: r.age,
            relationship: r.relationship.filter(|s| !s.trim().is_empty()),
        }
    }
}

#[async_trait::async_trait]
impl AccountService for SupabaseBackend {
    async fn resolve_account(&self, bearer_token: &str) -> Result<Account> {
        let resp = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.service_key)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {bearer_token}"),
            )
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Unauthorized("invalid or expired token".to_string()));
        }
        if !status.is_success() {
            return Err(Error::Backend(format!("auth user HTTP {status}")));
        }
        let user: AuthUser = resp
            .json()
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;
        let role = user
            .app_metadata
            .and_then(|m| m.role)
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE.to_string());
        Ok(Account { id: user.id, role })
    }

    async fn fetch_profile(&self, account: &Account, subject_id: &str) -> Result<SubjectProfile> {
        let resp = self
            .service_get("/rest/v1/persons")
            .query(&[
                ("id", format!("eq.{subject_id}")),
                ("user_id", format!("eq.{}", account.id)),
                (
                    "select",
                    "id,name,interests,notes,age,relationship".to_string(),
                ),
            ])
            .send()
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Backend(format!("persons HTTP {status}")));
        }
        let rows: Vec<ProfileRow> = resp
            .json()
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;
        rows.into_iter()
            .next()
            .map(SubjectProfile::from)
            .ok_or_else(|| Error::NotFound(format!("person {subject_id}")))
    }

    async fn check_and_increment_usage(&self, account: &Account) -> Result<QuotaDecision> {
        let body = serde_json::json!({
            "p_user_id": account.id,
            "p_role": account.role,
            "p_feature": USAGE_FEATURE,
        });
        let resp = self
            .client
            .post(format!(
                "{}/rest/v1/rpc/check_and_increment_usage",
                self.base_url
            ))
            .header("apikey", &self.service_key)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.service_key),
            )
            .json(&body)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Backend(format!("usage rpc HTTP {status}")));
        }
        // PostgREST returns either a bare object or a one-row array depending on the function.
        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;
        let row_v = match v {
            serde_json::Value::Array(mut xs) if !xs.is_empty() => xs.swap_remove(0),
            other => other,
        };
        let row: UsageRow =
            serde_json::from_value(row_v).map_err(|e| Error::Backend(e.to_string()))?;
        Ok(QuotaDecision {
            allowed: row.allowed,
            status: QuotaStatus {
                limit: row.limit,
                remaining: row.remaining,
                role: row.role.unwrap_or_else(|| account.role.clone()),
                reset_time: row.reset_time,
            },
        })
    }
}
