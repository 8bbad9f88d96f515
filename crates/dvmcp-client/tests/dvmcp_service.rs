use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dvmcp_client::{
    DvmcpConfig, DvmcpError, DvmcpService, PaymentRequest, SearchQuery, SearchType,
    SelectedProvider, payment_handler_fn,
};
use nostr::dvmcp::{
    JobFeedback, JobStatus, KIND_DVMCP_JOB_REQUEST, KIND_DVMCP_JOB_RESULT, ToolCallRequest,
    ToolCallResult, create_job_feedback_event, create_job_result_event,
    create_server_announcement_event,
};
use nostr::{Event, EventSigner, EventTemplate, SignerError, get_event_hash};
use nostr_client::{ClientError, Filter, MemoryBus, MessageBus};
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;

const INVOICE: &str = "lnbc100n1pjtestinvoice";

struct TestSigner {
    pubkey: String,
}

impl TestSigner {
    fn new(seed: char) -> Self {
        Self {
            pubkey: seed.to_string().repeat(64),
        }
    }
}

#[async_trait]
impl EventSigner for TestSigner {
    fn public_key_hex(&self) -> String {
        self.pubkey.clone()
    }

    async fn sign_event(&self, template: EventTemplate) -> Result<Event, SignerError> {
        let unsigned = template.into_unsigned(self.pubkey.clone());
        let id = get_event_hash(&unsigned)?;
        Ok(Event {
            id,
            pubkey: unsigned.pubkey,
            created_at: unsigned.created_at,
            kind: unsigned.kind,
            tags: unsigned.tags,
            content: unsigned.content,
            sig: "0".repeat(128),
        })
    }
}

/// One step of a simulated provider's answer to each request.
#[derive(Clone)]
enum Reply {
    Feedback(JobFeedback),
    Result(ToolCallResult),
    RawResult(String),
    /// Result that also references a thread root before the job id.
    ThreadedResult(ToolCallResult),
    Delay(Duration),
}

fn status(status: JobStatus) -> Reply {
    Reply::Feedback(JobFeedback::new(status, "", ""))
}

fn payment_required(amount: &str, invoice: Option<&str>) -> Reply {
    Reply::Feedback(
        JobFeedback::new(JobStatus::PaymentRequired, "", "")
            .with_amount(amount, invoice.map(str::to_owned)),
    )
}

fn text_result(text: &str) -> Reply {
    Reply::Result(ToolCallResult::success(text))
}

async fn send_reply(
    bus: &MemoryBus,
    signer: &TestSigner,
    request: &Event,
    reply: Reply,
) -> Result<(), ClientError> {
    let template = match reply {
        Reply::Delay(duration) => {
            tokio::time::sleep(duration).await;
            return Ok(());
        }
        Reply::Feedback(mut feedback) => {
            feedback.request_id = request.id.clone();
            feedback.customer_pubkey = request.pubkey.clone();
            create_job_feedback_event(&feedback)
        }
        Reply::Result(result) => create_job_result_event(&request.id, &request.pubkey, &result)
            .map_err(|error| ClientError::Internal(error.to_string()))?,
        Reply::RawResult(content) => EventTemplate {
            created_at: request.created_at,
            kind: KIND_DVMCP_JOB_RESULT,
            tags: vec![
                vec!["e".to_string(), request.id.clone()],
                vec!["p".to_string(), request.pubkey.clone()],
            ],
            content,
        },
        Reply::ThreadedResult(result) => EventTemplate {
            created_at: request.created_at,
            kind: KIND_DVMCP_JOB_RESULT,
            tags: vec![
                vec!["e".to_string(), "thread-root".to_string()],
                vec!["e".to_string(), request.id.clone()],
                vec!["p".to_string(), request.pubkey.clone()],
            ],
            content: result
                .to_content()
                .map_err(|error| ClientError::Internal(error.to_string()))?,
        },
    };
    let event = signer
        .sign_event(template)
        .await
        .map_err(|error| ClientError::Internal(error.to_string()))?;
    bus.publish(&event).await.map(|_| ())
}

/// Answer every job request on `bus` with `replies`, in order.
async fn spawn_provider(
    bus: &MemoryBus,
    replies: Vec<Reply>,
) -> Result<JoinHandle<()>, ClientError> {
    let mut requests = bus
        .subscribe(Filter::new().kinds([KIND_DVMCP_JOB_REQUEST]))
        .await?;
    let bus = bus.clone();
    Ok(tokio::spawn(async move {
        let signer = TestSigner::new('b');
        while let Some(request) = requests.next().await {
            for reply in replies.clone() {
                if send_reply(&bus, &signer, &request, reply).await.is_err() {
                    return;
                }
            }
        }
    }))
}

async fn announce(bus: &MemoryBus, seed: char, payload: Value) -> Result<(), ClientError> {
    let template = create_server_announcement_event("dvmcp", &payload)
        .map_err(|error| ClientError::Internal(error.to_string()))?;
    let event = TestSigner::new(seed)
        .sign_event(template)
        .await
        .map_err(|error| ClientError::Internal(error.to_string()))?;
    bus.publish(&event).await.map(|_| ())
}

fn service(bus: &MemoryBus) -> DvmcpService {
    DvmcpService::new(
        Arc::new(bus.clone()),
        Arc::new(TestSigner::new('c')),
        DvmcpConfig::default(),
    )
}

async fn pinned_service(bus: &MemoryBus) -> DvmcpService {
    let service = service(bus);
    service
        .set_provider("b".repeat(64), Some("wavefunc-dvmcp-bridge"))
        .await;
    service
}

fn arguments(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn job_requests(bus: &MemoryBus) -> Vec<Event> {
    bus.published()
        .into_iter()
        .filter(|event| event.kind == KIND_DVMCP_JOB_REQUEST)
        .collect()
}

#[tokio::test]
async fn search_artist_resolves_to_parsed_payload() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(
        &bus,
        vec![
            status(JobStatus::Processing),
            text_result(r#"{"artists":[{"id":"abc","name":"Boards of Canada"}]}"#),
        ],
    )
    .await?;
    let service = pinned_service(&bus).await;

    let response = service
        .call_tool(
            "musicbrainz-search-artist",
            arguments(json!({"name": "Boards of Canada", "limit": "10"})),
        )
        .await?;

    assert_eq!(
        response,
        json!({"artists": [{"id": "abc", "name": "Boards of Canada"}]})
    );

    let requests = job_requests(&bus);
    assert_eq!(requests.len(), 1);
    let request = ToolCallRequest::from_event(&requests[0])?;
    assert_eq!(request.tool_name, "musicbrainz-search-artist");
    assert_eq!(request.arguments.get("limit"), Some(&json!("10")));
    assert_eq!(request.provider_pubkey, "b".repeat(64));
    assert_eq!(request.server_identifier, "wavefunc-dvmcp-bridge");
    assert_eq!(requests[0].tag_value("method"), Some("tools/call"));
    Ok(())
}

#[tokio::test]
async fn non_json_result_text_fails_the_call() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(&bus, vec![text_result("plain words")]).await?;
    let service = pinned_service(&bus).await;

    let outcome = service.call_tool("echo", Map::new()).await;
    assert!(matches!(
        outcome,
        Err(DvmcpError::MalformedResult(ref reason)) if reason.contains("echo")
    ));
    Ok(())
}

#[tokio::test]
async fn result_with_extra_event_reference_still_resolves()
-> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(
        &bus,
        vec![Reply::ThreadedResult(ToolCallResult::success(r#"{"ok":true}"#))],
    )
    .await?;
    let service = pinned_service(&bus).await;

    let response = service.call_tool("threaded", Map::new()).await?;
    assert_eq!(response, json!({"ok": true}));
    Ok(())
}

#[tokio::test]
async fn first_terminal_message_wins() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(
        &bus,
        vec![
            text_result(r#"{"n":1}"#),
            text_result(r#"{"n":2}"#),
            Reply::Feedback(
                JobFeedback::new(JobStatus::Error, "", "").with_status_extra("too late"),
            ),
        ],
    )
    .await?;
    let baseline = bus.active_subscriptions();
    let service = pinned_service(&bus).await;

    let response = service.call_tool("counter", Map::new()).await?;
    assert_eq!(response, json!({"n": 1}));
    assert_eq!(bus.active_subscriptions(), baseline);
    Ok(())
}

#[tokio::test]
async fn error_results_and_feedback_fail_the_call() -> Result<(), Box<dyn std::error::Error>> {
    let cases = [
        (
            vec![Reply::RawResult(r#"{"error":{"message":"unknown tool"}}"#.to_string())],
            DvmcpError::Protocol("unknown tool".to_string()),
        ),
        (
            vec![Reply::Result(ToolCallResult::execution_error("bad mbid"))],
            DvmcpError::Execution("bad mbid".to_string()),
        ),
        (
            vec![Reply::Feedback(
                JobFeedback::new(JobStatus::Error, "", "").with_content("upstream down"),
            )],
            DvmcpError::Execution("upstream down".to_string()),
        ),
        (
            vec![payment_required_without_amount()],
            DvmcpError::PaymentMissingAmount,
        ),
    ];

    for (replies, expected) in cases {
        let bus = MemoryBus::new();
        let _provider = spawn_provider(&bus, replies).await?;
        let service = pinned_service(&bus).await;

        let outcome = service.call_tool("tool", Map::new()).await;
        assert_eq!(outcome, Err(expected));
    }
    Ok(())
}

fn payment_required_without_amount() -> Reply {
    Reply::Feedback(JobFeedback::new(JobStatus::PaymentRequired, "", ""))
}

#[tokio::test]
async fn paid_invoice_resumes_the_job() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(
        &bus,
        vec![
            payment_required("10", Some(INVOICE)),
            status(JobStatus::Processing),
            text_result(r#"{"paid":true}"#),
        ],
    )
    .await?;
    let service = pinned_service(&bus).await;

    let payments = Arc::new(std::sync::Mutex::new(Vec::<PaymentRequest>::new()));
    let recorded = Arc::clone(&payments);
    service
        .set_payment_handler(payment_handler_fn(move |request| {
            let recorded = Arc::clone(&recorded);
            async move {
                if let Ok(mut payments) = recorded.lock() {
                    payments.push(request);
                }
                Ok(true)
            }
        }))
        .await;

    let response = service.call_tool("paid-tool", Map::new()).await?;
    assert_eq!(response, json!({"paid": true}));

    let payments = payments.lock().map(|payments| payments.clone()).unwrap_or_default();
    assert_eq!(
        payments,
        vec![PaymentRequest {
            amount: "10".to_string(),
            invoice: INVOICE.to_string(),
        }]
    );
    Ok(())
}

#[tokio::test]
async fn declined_payment_surfaces_invoice() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(
        &bus,
        vec![
            payment_required("10", Some(INVOICE)),
            text_result(r#"{"paid":false}"#),
        ],
    )
    .await?;
    let baseline = bus.active_subscriptions();
    let service = pinned_service(&bus).await;
    service
        .set_payment_handler(payment_handler_fn(|_request| async { Ok(false) }))
        .await;

    let error = match service.call_tool("paid-tool", Map::new()).await {
        Ok(value) => return Err(format!("expected payment failure, got {value}").into()),
        Err(error) => error,
    };

    assert_eq!(
        error,
        DvmcpError::PaymentRequired {
            amount: "10".to_string(),
            invoice: Some(INVOICE.to_string()),
        }
    );
    let details = error.payment_details().ok_or("missing payment details")?;
    assert_eq!(details.invoice.as_deref(), Some(INVOICE));
    assert_eq!(bus.active_subscriptions(), baseline);
    Ok(())
}

#[tokio::test]
async fn missing_handler_requires_manual_payment() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(&bus, vec![payment_required("21", Some(INVOICE))]).await?;
    let service = pinned_service(&bus).await;

    let outcome = service.call_tool("paid-tool", Map::new()).await;
    assert_eq!(
        outcome,
        Err(DvmcpError::PaymentRequired {
            amount: "21".to_string(),
            invoice: Some(INVOICE.to_string()),
        })
    );
    Ok(())
}

#[tokio::test]
async fn invoice_falls_back_to_annotation_when_amount_tag_is_not_bolt11()
-> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(
        &bus,
        vec![Reply::Feedback(
            JobFeedback::new(JobStatus::PaymentRequired, "", "")
                .with_amount("10", Some("not-an-invoice".to_string()))
                .with_invoice_annotation(INVOICE),
        )],
    )
    .await?;
    let service = pinned_service(&bus).await;

    let outcome = service.call_tool("paid-tool", Map::new()).await;
    assert_eq!(
        outcome.err().and_then(|error| error.payment_details()).and_then(|d| d.invoice),
        Some(INVOICE.to_string())
    );
    Ok(())
}

#[tokio::test]
async fn repeated_payment_request_for_paid_invoice_is_not_paid_again()
-> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(
        &bus,
        vec![
            payment_required("10", Some(INVOICE)),
            Reply::Delay(Duration::from_millis(10)),
            Reply::Feedback(
                JobFeedback::new(JobStatus::PaymentRequired, "", "")
                    .with_amount("10", Some(INVOICE.to_string()))
                    .with_status_extra("waiting for settlement"),
            ),
            text_result(r#"{"ok":true}"#),
        ],
    )
    .await?;
    let service = pinned_service(&bus).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    service
        .set_payment_handler(payment_handler_fn(move |_request| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
        }))
        .await;

    let response = service.call_tool("paid-tool", Map::new()).await?;
    assert_eq!(response, json!({"ok": true}));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn panicking_payment_handler_counts_as_declined() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(
        &bus,
        vec![
            payment_required("10", Some(INVOICE)),
            text_result(r#"{"paid":true}"#),
        ],
    )
    .await?;
    let service = pinned_service(&bus).await;
    service
        .set_payment_handler(payment_handler_fn(|request| async move {
            if request.invoice.starts_with("lnbc") {
                panic!("wallet crashed");
            }
            Ok(true)
        }))
        .await;

    let outcome = service.call_tool("paid-tool", Map::new()).await;
    assert_eq!(
        outcome,
        Err(DvmcpError::PaymentRequired {
            amount: "10".to_string(),
            invoice: Some(INVOICE.to_string()),
        })
    );
    Ok(())
}

#[tokio::test]
async fn error_feedback_after_payment_fails_the_call() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(
        &bus,
        vec![
            payment_required("10", Some(INVOICE)),
            Reply::Feedback(
                JobFeedback::new(JobStatus::Error, "", "").with_status_extra("out of stock"),
            ),
            text_result(r#"{"paid":true}"#),
        ],
    )
    .await?;
    let service = pinned_service(&bus).await;
    service
        .set_payment_handler(payment_handler_fn(|_request| async { Ok(true) }))
        .await;

    let outcome = service.call_tool("paid-tool", Map::new()).await;
    assert_eq!(outcome, Err(DvmcpError::Execution("out of stock".to_string())));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_payment_handler_is_bounded_by_the_job_deadline()
-> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(&bus, vec![payment_required("10", Some(INVOICE))]).await?;
    let baseline = bus.active_subscriptions();
    let service = pinned_service(&bus).await;
    service
        .set_payment_handler(payment_handler_fn(|_request| async {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(true)
        }))
        .await;

    let started = tokio::time::Instant::now();
    let outcome = service.call_tool("paid-tool", Map::new()).await;

    assert_eq!(outcome, Err(DvmcpError::RequestTimeout));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(started.elapsed() < Duration::from_secs(120));
    assert_eq!(bus.active_subscriptions(), baseline);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn silent_provider_times_out_and_releases_subscription()
-> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(&bus, vec![status(JobStatus::Processing)]).await?;
    let baseline = bus.active_subscriptions();
    let service = pinned_service(&bus).await;

    let started = tokio::time::Instant::now();
    let outcome = service.call_tool("slow-tool", Map::new()).await;

    assert_eq!(outcome, Err(DvmcpError::RequestTimeout));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(bus.active_subscriptions(), baseline);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn recognition_gets_the_longer_budget() -> Result<(), Box<dyn std::error::Error>> {
    let envelope = json!({
        "type": "music-recognition-result",
        "result": {"title": "Roygbiv", "artist": "Boards of Canada"}
    })
    .to_string();
    let bus = MemoryBus::new();
    let _provider = spawn_provider(
        &bus,
        vec![Reply::Delay(Duration::from_secs(45)), text_result(&envelope)],
    )
    .await?;
    let service = pinned_service(&bus).await;

    let track = service
        .recognize_audio("https://example.com/clip.mp3")
        .await?;
    assert_eq!(track.title, "Roygbiv");
    assert_eq!(track.artist, "Boards of Canada");

    let request = ToolCallRequest::from_event(&job_requests(&bus)[0])?;
    assert_eq!(request.tool_name, "music-recognition");
    assert_eq!(
        request.arguments.get("audioUrl"),
        Some(&json!("https://example.com/clip.mp3"))
    );

    let outcome = service.call_tool("slow-tool", Map::new()).await;
    assert_eq!(outcome, Err(DvmcpError::RequestTimeout));
    Ok(())
}

#[tokio::test]
async fn recognition_error_envelope_fails_the_call() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let envelope = json!({"type": "audd-error", "error": "no match found"}).to_string();
    let _provider = spawn_provider(&bus, vec![text_result(&envelope)]).await?;
    let service = pinned_service(&bus).await;

    let outcome = service.recognize_audio("https://example.com/noise.mp3").await;
    assert_eq!(outcome, Err(DvmcpError::Execution("no match found".to_string())));
    Ok(())
}

#[tokio::test]
async fn publish_failure_leaves_nothing_pending() {
    let bus = MemoryBus::new();
    let service = pinned_service(&bus).await;
    bus.reject_publishes(Some("blocked: rate limited"));

    let outcome = service.call_tool("tool", Map::new()).await;

    assert!(matches!(
        outcome,
        Err(DvmcpError::PublishFailure(ref reason)) if reason.contains("blocked: rate limited")
    ));
    assert_eq!(bus.active_subscriptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn discovery_timeout_falls_back_to_default_provider()
-> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(&bus, vec![text_result(r#"{"ok":true}"#)]).await?;
    let service = service(&bus);

    let response = service.call_tool("tool", Map::new()).await?;
    assert_eq!(response, json!({"ok": true}));

    let default = DvmcpConfig::default();
    assert_eq!(
        service.provider().await,
        Some(SelectedProvider::new(
            default.fallback_provider_pubkey.clone(),
            default.server_identifier.clone(),
        ))
    );
    let request = ToolCallRequest::from_event(&job_requests(&bus)[0])?;
    assert_eq!(request.provider_pubkey, default.fallback_provider_pubkey);
    Ok(())
}

#[tokio::test]
async fn discovery_takes_the_first_compatible_announcement()
-> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    announce(&bus, 'd', json!({"name": "weather", "tools": ["forecast"]})).await?;
    announce(&bus, 'e', json!({"name": "misc", "about": "mirrors music-recognition output"}))
        .await?;
    announce(&bus, 'f', json!({"identifier": "wavefunc-dvmcp-bridge"})).await?;
    announce(&bus, 'a', json!({"identifier": "wavefunc-dvmcp-bridge", "type": "dvmcp"})).await?;
    let service = service(&bus);

    let provider = service.discover_providers(Duration::from_secs(1)).await?;

    assert_eq!(provider.provider_id, "e".repeat(64));
    assert_eq!(provider.service_id, "misc");
    assert_eq!(service.provider().await, Some(provider));
    assert_eq!(bus.active_subscriptions(), 0);
    Ok(())
}

#[tokio::test]
async fn unparsable_announcements_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let broken = TestSigner::new('d')
        .sign_event(EventTemplate {
            created_at: 1,
            kind: nostr::dvmcp::KIND_DVMCP_SERVER_ANNOUNCEMENT,
            tags: vec![],
            content: "wavefunc but not json".to_string(),
        })
        .await?;
    bus.publish(&broken).await?;
    announce(&bus, 'f', json!({"capabilities": "tools/call"})).await?;
    let service = service(&bus);

    let provider = service.discover_providers(Duration::from_secs(1)).await?;
    assert_eq!(provider.provider_id, "f".repeat(64));
    assert_eq!(provider.service_id, "wavefunc-dvmcp-bridge");
    Ok(())
}

#[tokio::test]
async fn concurrent_calls_share_one_discovery() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    announce(&bus, 'b', json!({"identifier": "wavefunc-dvmcp-bridge"})).await?;
    let _provider = spawn_provider(&bus, vec![text_result(r#"{"ok":true}"#)]).await?;
    let service = service(&bus);

    let (first, second) = tokio::join!(
        service.call_tool("tool-a", Map::new()),
        service.call_tool("tool-b", Map::new()),
    );
    assert_eq!(first?, json!({"ok": true}));
    assert_eq!(second?, json!({"ok": true}));

    // provider subscription + one discovery + two response subscriptions
    assert_eq!(bus.opened_subscriptions(), 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn provider_pinned_during_discovery_is_kept() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(&bus, vec![text_result(r#"{"ok":true}"#)]).await?;
    let service = service(&bus);

    let call = tokio::spawn({
        let service = service.clone();
        async move { service.call_tool("tool", Map::new()).await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    service.set_provider("a".repeat(64), Some("manual")).await;

    let response = call.await??;
    assert_eq!(response, json!({"ok": true}));
    assert_eq!(
        service.provider().await,
        Some(SelectedProvider::new("a".repeat(64), "manual"))
    );
    let request = ToolCallRequest::from_event(&job_requests(&bus)[0])?;
    assert_eq!(request.provider_pubkey, "a".repeat(64));
    assert_eq!(request.server_identifier, "manual");
    Ok(())
}

#[tokio::test]
async fn manual_provider_override_keeps_service_id() {
    let bus = MemoryBus::new();
    let service = service(&bus);

    service.set_provider("a".repeat(64), None).await;
    assert_eq!(
        service.provider().await,
        Some(SelectedProvider::new("a".repeat(64), "wavefunc-dvmcp-bridge"))
    );

    service.set_provider("a".repeat(64), Some("other")).await;
    service.set_provider("f".repeat(64), None).await;
    assert_eq!(
        service.provider().await,
        Some(SelectedProvider::new("f".repeat(64), "other"))
    );
}

#[tokio::test]
async fn search_and_lookup_use_music_tools() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    let _provider = spawn_provider(
        &bus,
        vec![text_result(
            r#"{"releases":[{"id":"r1"},{"id":"r2"}],"results":[{"id":9}]}"#,
        )],
    )
    .await?;
    let service = pinned_service(&bus).await;

    let releases = service
        .search(SearchType::Release, &SearchQuery::new("Boards of Canada"))
        .await?;
    assert_eq!(releases.len(), 2);

    let release = service.lookup(SearchType::Discogs, "12345").await?;
    assert_eq!(release["results"][0]["id"], json!(9));

    let requests = job_requests(&bus);
    let search = ToolCallRequest::from_event(&requests[0])?;
    let lookup = ToolCallRequest::from_event(&requests[1])?;
    assert_eq!(search.tool_name, "musicbrainz-search-release");
    assert_eq!(search.arguments.get("offset"), Some(&json!(0)));
    assert_eq!(lookup.tool_name, "discogs-lookup");
    assert_eq!(lookup.arguments.get("discogs_id"), Some(&json!("12345")));
    Ok(())
}
