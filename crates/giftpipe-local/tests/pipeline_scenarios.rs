use axum::{extract::Query, routing::{get, post}, Json, Router};
use giftpipe_core::{
    Account, AccountService, Error, GiftRequest, LanguageModel, MatchType, ProductSearchProvider,
    QuotaDecision, QuotaStatus, Result, SubjectProfile, SuggestionSource,
};
use giftpipe_local::fanout::SearchProviders;
use giftpipe_local::openai_compat::OpenAiCompatClient;
use giftpipe_local::search::SerpApiProductSearch;
use giftpipe_local::{GiftPipeline, PipelineConfig};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct FakeBackend {
    role: &'static str,
    allowed: bool,
    usage_calls: AtomicUsize,
}

impl FakeBackend {
    fn new(role: &'static str, allowed: bool) -> Arc<Self> {
        Arc::new(Self {
            role,
            allowed,
            usage_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl AccountService for FakeBackend {
    async fn resolve_account(&self, bearer_token: &str) -> Result<Account> {
        if bearer_token != "good" {
            return Err(Error::Unauthorized("invalid token".to_string()));
        }
        Ok(Account {
            id: "u1".to_string(),
            role: self.role.to_string(),
        })
    }

    async fn fetch_profile(&self, _account: &Account, subject_id: &str) -> Result<SubjectProfile> {
        Ok(SubjectProfile {
            id: subject_id.to_string(),
            name: "Ana".to_string(),
            interests: vec!["Sport".to_string()],
            age: Some(31),
            ..SubjectProfile::default()
        })
    }

    async fn check_and_increment_usage(&self, account: &Account) -> Result<QuotaDecision> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        Ok(QuotaDecision {
            allowed: self.allowed,
            status: QuotaStatus {
                limit: Some(3),
                remaining: Some(if self.allowed { 2 } else { 0 }),
                role: account.role.clone(),
                reset_time: Some("2026-10-20T00:00:00Z".to_string()),
            },
        })
    }
}

/// Search fixture returning `rows` for every query.
async fn search_fixture(rows: serde_json::Value) -> Arc<dyn ProductSearchProvider> {
    let app = Router::new().route(
        "/search.json",
        get(move |_q: Query<HashMap<String, String>>| {
            let rows = rows.clone();
            async move { Json(serde_json::json!({ "organic_results": rows })) }
        }),
    );
    let addr = serve(app).await;
    Arc::new(SerpApiProductSearch::new(
        reqwest::Client::new(),
        "k".to_string(),
        Some(format!("http://{addr}/search.json")),
        None,
    ))
}

fn chat_answer(content: serde_json::Value) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "choices": [{"message": {"content": content.to_string()}, "finish_reason": "stop"}]
    }))
}

/// Language-model fixture that picks the first three identifiers listed in the prompt.
async fn echo_pool_model(price: Option<f64>) -> Arc<dyn LanguageModel> {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move |Json(body): Json<serde_json::Value>| async move {
            let user = body["messages"][1]["content"].as_str().unwrap_or_default().to_string();
            let picks: Vec<serde_json::Value> = user
                .lines()
                .filter_map(|l| l.split("ASIN: ").nth(1))
                .filter_map(|rest| rest.split(" | ").next())
                .take(3)
                .map(|asin| {
                    serde_json::json!({
                        "title": format!("Pick {asin}"),
                        "asin": asin,
                        "price": price,
                        "confidence": 0.9,
                        "reasoning": "Ana trains several times a week and will use this at every session."
                    })
                })
                .collect();
            chat_answer(serde_json::json!({ "suggestions": picks }))
        }),
    );
    model_at(serve(app).await)
}

async fn static_model(content: serde_json::Value) -> Arc<dyn LanguageModel> {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let content = content.clone();
            async move { chat_answer(content) }
        }),
    );
    model_at(serve(app).await)
}

fn model_at(addr: SocketAddr) -> Arc<dyn LanguageModel> {
    Arc::new(OpenAiCompatClient::new(
        reqwest::Client::new(),
        format!("http://{addr}"),
        None,
        "fixture".to_string(),
    ))
}

fn five_sport_rows() -> serde_json::Value {
    serde_json::json!([
        {"asin": "B000000001", "title": "Yoga Mat Non Slip", "extracted_price": 25.0, "rating": 4.6, "reviews": 900},
        {"asin": "B000000002", "title": "Adjustable Dumbbells", "extracted_price": 45.0, "rating": 4.4, "reviews": 300},
        {"asin": "B000000003", "title": "Running Waist Belt", "extracted_price": 15.0, "rating": 4.1, "reviews": 150},
        {"asin": "B000000004", "title": "Resistance Bands Set", "extracted_price": 18.0, "rating": 4.5, "reviews": 1200},
        {"asin": "B000000005", "title": "Foam Roller", "extracted_price": 22.0, "rating": 4.7, "reviews": 40}
    ])
}

fn request(budget: f64) -> GiftRequest {
    GiftRequest {
        person_id: Some("p1".to_string()),
        event_type: Some("birthday".to_string()),
        budget: Some(budget),
        additional_context: None,
    }
}

fn primary(p: Arc<dyn ProductSearchProvider>) -> SearchProviders {
    SearchProviders {
        primary: Some(p),
        secondary: None,
    }
}

#[tokio::test]
async fn scenario_a_verified_suggestions_come_from_search_results() {
    let backend = FakeBackend::new("free", true);
    let pipeline = GiftPipeline::new(
        backend.clone(),
        primary(search_fixture(five_sport_rows()).await),
        Some(echo_pool_model(None).await),
        None,
        PipelineConfig::default(),
    );
    let resp = pipeline.run(Some("good"), &request(50.0)).await.unwrap();

    assert!(resp.success);
    assert_eq!(resp.source, SuggestionSource::Verified);
    assert_eq!(resp.person_name, "Ana");
    assert_eq!(resp.suggestions.len(), 3);
    let searched: BTreeSet<&str> = [
        "B000000001",
        "B000000002",
        "B000000003",
        "B000000004",
        "B000000005",
    ]
    .into_iter()
    .collect();
    for s in &resp.suggestions {
        let asin = s.amazon_data.asin.as_deref().expect("verified suggestion has an identifier");
        assert!(searched.contains(asin));
        assert_eq!(s.amazon_data.match_type, MatchType::Exact);
        assert!(s.estimated_price <= 50.0);
        assert!(s.amazon_data.product_url.as_deref().unwrap().ends_with(asin));
    }
    assert_eq!(backend.usage_calls.load(Ordering::SeqCst), 1);
    assert_eq!(resp.usage.as_ref().and_then(|u| u.remaining), Some(2));
}

#[tokio::test]
async fn scenario_b_no_providers_uses_curated_fallback() {
    let pipeline = GiftPipeline::new(
        FakeBackend::new("free", true),
        SearchProviders::default(),
        None,
        None,
        PipelineConfig::default(),
    );
    let resp = pipeline.run(Some("good"), &request(50.0)).await.unwrap();
    assert!(resp.success);
    assert_eq!(resp.source, SuggestionSource::Fallback);
    assert_eq!(resp.suggestions.len(), 3);
    for s in &resp.suggestions {
        assert_eq!(s.amazon_data.match_type, MatchType::Search);
        assert!(s.amazon_data.asin.is_none());
    }
}

#[tokio::test]
async fn zero_usable_products_also_falls_back() {
    let rows = serde_json::json!([{"title": "no identity", "extracted_price": 20.0}]);
    let pipeline = GiftPipeline::new(
        FakeBackend::new("free", true),
        primary(search_fixture(rows).await),
        None,
        None,
        PipelineConfig::default(),
    );
    let resp = pipeline.run(Some("good"), &request(50.0)).await.unwrap();
    assert_eq!(resp.source, SuggestionSource::Fallback);
}

#[tokio::test]
async fn scenario_c_unmatchable_selections_in_a_large_pool_fail() {
    let rows: Vec<serde_json::Value> = (0..8)
        .map(|i| {
            serde_json::json!({
                "asin": format!("B00000001{i}"),
                "title": format!("Garden Hose Model {i}"),
                "extracted_price": 20.0
            })
        })
        .collect();
    let model = static_model(serde_json::json!({
        "gifts": [
            {"title": "Wireless Earbuds", "asin": "B0FAKE0001", "price": 30},
            {"title": "Espresso Machine", "asin": "B0FAKE0002", "price": 40},
            {"title": "Leather Journal", "asin": "B0FAKE0003", "price": 20}
        ]
    }))
    .await;
    let config = PipelineConfig {
        pool_size: 8,
        ..PipelineConfig::default()
    };
    let pipeline = GiftPipeline::new(
        FakeBackend::new("free", true),
        primary(search_fixture(serde_json::Value::Array(rows)).await),
        Some(model),
        None,
        config,
    );
    let err = pipeline.run(Some("good"), &request(50.0)).await.unwrap_err();
    assert!(matches!(err, Error::NoValidSuggestions(_)), "{err}");
}

#[tokio::test]
async fn scenario_d_everything_over_budget_is_a_budget_error() {
    let rows = serde_json::json!([
        {"asin": "B000000001", "title": "Unpriced A"},
        {"asin": "B000000002", "title": "Unpriced B"},
        {"asin": "B000000003", "title": "Unpriced C"}
    ]);
    let pipeline = GiftPipeline::new(
        FakeBackend::new("free", true),
        primary(search_fixture(rows).await),
        Some(echo_pool_model(Some(75.0)).await),
        None,
        PipelineConfig::default(),
    );
    let err = pipeline.run(Some("good"), &request(50.0)).await.unwrap_err();
    assert!(matches!(err, Error::OverBudget(_)), "{err}");
}

#[tokio::test]
async fn products_without_language_model_is_a_configuration_error() {
    let pipeline = GiftPipeline::new(
        FakeBackend::new("free", true),
        primary(search_fixture(five_sport_rows()).await),
        None,
        None,
        PipelineConfig::default(),
    );
    let err = pipeline.run(Some("good"), &request(50.0)).await.unwrap_err();
    assert!(matches!(err, Error::NotConfigured(_)), "{err}");
}

#[tokio::test]
async fn quota_gate_blocks_before_any_search() {
    let backend = FakeBackend::new("free", false);
    let pipeline = GiftPipeline::new(
        backend.clone(),
        SearchProviders::default(),
        None,
        None,
        PipelineConfig::default(),
    );
    match pipeline.run(Some("good"), &request(50.0)).await {
        Err(Error::QuotaExceeded(status)) => {
            assert_eq!(status.remaining, Some(0));
            assert_eq!(status.limit, Some(3));
            assert_eq!(status.role, "free");
        }
        other => panic!("expected quota error, got {other:?}"),
    }
}

#[tokio::test]
async fn unlimited_roles_skip_the_usage_counter() {
    let backend = FakeBackend::new("admin", false);
    let pipeline = GiftPipeline::new(
        backend.clone(),
        SearchProviders::default(),
        None,
        None,
        PipelineConfig::default(),
    );
    let resp = pipeline.run(Some("good"), &request(50.0)).await.unwrap();
    assert!(resp.usage.is_none());
    assert_eq!(backend.usage_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn auth_and_input_errors_come_first() {
    let backend = FakeBackend::new("free", true);
    let pipeline = GiftPipeline::new(
        backend.clone(),
        SearchProviders::default(),
        None,
        None,
        PipelineConfig::default(),
    );
    assert!(matches!(
        pipeline.run(None, &request(50.0)).await,
        Err(Error::Unauthorized(_))
    ));
    assert!(matches!(
        pipeline.run(Some("bad"), &request(50.0)).await,
        Err(Error::Unauthorized(_))
    ));
    assert!(matches!(
        pipeline.run(Some("good"), &request(-1.0)).await,
        Err(Error::InvalidInput(_))
    ));
    assert_eq!(backend.usage_calls.load(Ordering::SeqCst), 0);
}
