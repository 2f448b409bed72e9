//! HTTP Adapter Integration Tests
//!
//! OpenAI, Google Calendar and Open-Meteo clients against local mock servers.

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use promptchain::adapters::weather::WeatherError;
use promptchain::adapters::{
    ActionBackend, ActionError, CalendarConfig, ChatMessage, CompletionProvider,
    CompletionRequest, GoogleCalendarBackend, OpenAiConfig, OpenAiProvider, OpenMeteoClient,
    ProviderError, ResponseFormat, ToolDeclaration, WeatherConfig,
};
use promptchain::domain::{CalendarOptions, CalendarRequest, EventDetails};

// ============================================================================
// OpenAI
// ============================================================================

fn provider(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new(OpenAiConfig {
        api_key: "sk-test".to_string(),
        base_url: server.uri(),
        ..Default::default()
    })
    .unwrap()
}

fn structured_request() -> CompletionRequest {
    CompletionRequest::new(
        "gpt-4o-mini",
        vec![ChatMessage::system("Analyze"), ChatMessage::user("Lunch at noon")],
    )
    .with_response_format(ResponseFormat {
        name: "event_extraction".to_string(),
        schema: json!({"type": "object"}),
    })
}

#[tokio::test]
async fn test_openai_structured_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "{\"description\":\"Lunch\",\"is_event\":true,\"confidence\":0.9}"
                },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = provider(&server)
        .complete(structured_request())
        .await
        .unwrap();

    let value: Value = response.parse().unwrap();
    assert_eq!(value["is_event"], true);

    let received = server.received_requests().await.unwrap();
    let body: Value = received[0].body_json().unwrap();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["response_format"]["type"], "json_schema");
    assert_eq!(body["response_format"]["json_schema"]["name"], "event_extraction");
    assert_eq!(body["response_format"]["json_schema"]["strict"], true);
    assert_eq!(body["messages"][1]["role"], "user");
    assert!(body.get("tools").is_none());
}

#[tokio::test]
async fn test_openai_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {
                            "name": "get_weather",
                            "arguments": "{\"latitude\":38.7,\"longitude\":-9.1}"
                        }
                    }]
                }
            }]
        })))
        .mount(&server)
        .await;

    let request = CompletionRequest::new("gpt-4o-mini", vec![ChatMessage::user("Weather?")])
        .with_tools(vec![ToolDeclaration {
            name: "get_weather".to_string(),
            description: "Get current temperature".to_string(),
            parameters: json!({"type": "object"}),
        }]);

    let response = provider(&server).complete(request).await.unwrap();

    assert!(response.content.is_none());
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call_abc");
    assert_eq!(response.tool_calls[0].arguments["latitude"], 38.7);

    let received = server.received_requests().await.unwrap();
    let body: Value = received[0].body_json().unwrap();
    assert_eq!(body["tools"][0]["type"], "function");
    assert_eq!(body["tools"][0]["function"]["name"], "get_weather");
}

#[tokio::test]
async fn test_openai_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let result = provider(&server).complete(structured_request()).await;
    assert!(matches!(result, Err(ProviderError::RateLimited)));
}

#[tokio::test]
async fn test_openai_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let result = provider(&server).complete(structured_request()).await;
    match result {
        Err(ProviderError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "upstream down");
        }
        other => panic!("expected Status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_openai_refusal_and_empty_choices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": null, "refusal": "I can't help with that."}
            }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let provider = provider(&server);

    let refused = provider.complete(structured_request()).await;
    assert!(matches!(refused, Err(ProviderError::Refused(_))));

    let empty = provider.complete(structured_request()).await;
    assert!(matches!(empty, Err(ProviderError::EmptyResponse)));
}

// ============================================================================
// Google Calendar
// ============================================================================

fn calendar(server: &MockServer, token: Option<&str>) -> GoogleCalendarBackend {
    GoogleCalendarBackend::new(CalendarConfig {
        base_url: server.uri(),
        access_token: token.map(str::to_string),
        ..Default::default()
    })
    .unwrap()
}

fn calendar_request() -> CalendarRequest {
    let details = EventDetails {
        name: "Team Meeting".to_string(),
        start_time: Utc.with_ymd_and_hms(2025, 7, 8, 14, 0, 0).unwrap(),
        duration_minutes: 60,
        participants: vec!["alice@example.com".to_string()],
    };
    CalendarRequest::from_details(&details, CalendarOptions::default())
}

#[tokio::test]
async fn test_calendar_created() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .and(query_param("conferenceDataVersion", "1"))
        .and(header("authorization", "Bearer ya29.token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "evt1",
            "htmlLink": "https://calendar.google.com/event?eid=evt1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = calendar_request();
    let result = calendar(&server, Some("ya29.token"))
        .create_event(&request)
        .await
        .unwrap();

    assert!(result.succeeded);
    assert_eq!(
        result.external_reference.as_deref(),
        Some("https://calendar.google.com/event?eid=evt1")
    );

    let received = server.received_requests().await.unwrap();
    let body: Value = received[0].body_json().unwrap();
    assert_eq!(body["id"], request.request_id.as_str());
    assert_eq!(body["summary"], "Team Meeting");
    assert_eq!(body["end"]["dateTime"], "2025-07-08T15:00:00+00:00");
}

#[tokio::test]
async fn test_calendar_conflict_resolves_to_existing_event() {
    let server = MockServer::start().await;
    let request = calendar_request();

    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/calendars/primary/events/{}", request.request_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": request.request_id,
            "htmlLink": "https://calendar.google.com/event?eid=existing"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = calendar(&server, Some("ya29.token"))
        .create_event(&request)
        .await
        .unwrap();

    assert!(result.succeeded);
    assert_eq!(
        result.external_reference.as_deref(),
        Some("https://calendar.google.com/event?eid=existing")
    );
}

#[tokio::test]
async fn test_calendar_conflict_with_deleted_event_restores_it() {
    let server = MockServer::start().await;
    let request = calendar_request();
    let event_path = format!("/calendars/primary/events/{}", request.request_id);

    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(event_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": request.request_id,
            "status": "cancelled",
            "htmlLink": "https://calendar.google.com/event?eid=deleted"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(event_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": request.request_id,
            "status": "confirmed",
            "htmlLink": "https://calendar.google.com/event?eid=restored"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = calendar(&server, Some("ya29.token"))
        .create_event(&request)
        .await
        .unwrap();

    assert!(result.succeeded);
    assert_eq!(
        result.external_reference.as_deref(),
        Some("https://calendar.google.com/event?eid=restored")
    );

    let received = server.received_requests().await.unwrap();
    let patch = received
        .iter()
        .find(|r| r.method.as_str() == "PATCH")
        .unwrap();
    let body: Value = patch.body_json().unwrap();
    assert_eq!(body["status"], "confirmed");
}

#[tokio::test]
async fn test_calendar_deleted_event_not_restorable_is_failure() {
    let server = MockServer::start().await;
    let request = calendar_request();
    let event_path = format!("/calendars/primary/events/{}", request.request_id);

    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(event_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": request.request_id,
            "status": "cancelled",
            "htmlLink": "https://calendar.google.com/event?eid=deleted"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(event_path))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = calendar(&server, Some("ya29.token"))
        .create_event(&request)
        .await
        .unwrap();

    assert!(!result.succeeded);
    assert!(result.external_reference.is_none());
    assert!(result.failure_reason.unwrap().contains("deleted"));
}

#[tokio::test]
async fn test_calendar_client_error_is_clean_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(403).set_body_string("insufficient permissions"))
        .mount(&server)
        .await;

    let result = calendar(&server, Some("ya29.token"))
        .create_event(&calendar_request())
        .await
        .unwrap();

    assert!(!result.succeeded);
    assert!(result.failure_reason.unwrap().contains("403"));
}

#[tokio::test]
async fn test_calendar_server_error_is_indeterminate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = calendar(&server, Some("ya29.token"))
        .create_event(&calendar_request())
        .await;

    assert!(matches!(result, Err(ActionError::Indeterminate(_))));
}

#[tokio::test]
async fn test_calendar_unreachable_is_clean_failure() {
    let backend = GoogleCalendarBackend::new(CalendarConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        access_token: Some("ya29.token".to_string()),
        ..Default::default()
    })
    .unwrap();

    let result = backend.create_event(&calendar_request()).await.unwrap();
    assert!(!result.succeeded);
}

// ============================================================================
// Open-Meteo
// ============================================================================

#[tokio::test]
async fn test_weather_current_block() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .and(query_param("latitude", "38.7"))
        .and(query_param("longitude", "-9.1"))
        .and(query_param("current", "temperature_2m,wind_speed_10m"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "latitude": 38.7,
            "longitude": -9.1,
            "current": {"time": "2025-07-03T12:00", "temperature_2m": 24.3, "wind_speed_10m": 11.2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenMeteoClient::new(WeatherConfig {
        base_url: server.uri(),
        ..Default::default()
    })
    .unwrap();

    let current = client.current(38.7, -9.1).await.unwrap();
    assert_eq!(current["temperature_2m"], 24.3);
}

#[tokio::test]
async fn test_weather_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let client = OpenMeteoClient::new(WeatherConfig {
        base_url: server.uri(),
        ..Default::default()
    })
    .unwrap();

    let result = client.current(10.0, 10.0).await;
    assert!(matches!(result, Err(WeatherError::RequestFailed(_))));
}
