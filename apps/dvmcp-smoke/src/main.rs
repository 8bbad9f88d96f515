use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use clap::Parser;
use dvmcp_client::{
    DvmcpConfig, DvmcpError, DvmcpService, SearchQuery, SearchType, payment_handler_fn,
};
use nostr::dvmcp::{
    JobFeedback, JobStatus, KIND_DVMCP_JOB_REQUEST, ToolCallRequest, ToolCallResult,
    create_job_feedback_event, create_job_result_event, create_server_announcement_event,
};
use nostr::{Event, EventSigner, EventTemplate, SignerError, get_event_hash};
use nostr_client::{Filter, MemoryBus, MessageBus};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Run DVMCP tool calls against an in-process simulated provider")]
struct Args {
    /// Artist to search for.
    #[arg(long, default_value = "Boards of Canada")]
    artist: String,

    /// Audio clip handed to the music-recognition tool.
    #[arg(long, default_value = "https://example.com/clips/roygbiv.mp3")]
    audio_url: String,

    /// Sats the simulated provider charges per call. Zero disables payment.
    #[arg(long, default_value_t = 10)]
    price_sats: u64,

    /// Decline invoices instead of paying them.
    #[arg(long)]
    decline_payments: bool,
}

/// Hash-only signer: pubkey is derived from a label and `sig` is left blank.
/// Enough for the in-memory bus, which never verifies signatures.
struct DemoSigner {
    pubkey: String,
}

impl DemoSigner {
    fn new(label: &str) -> Self {
        Self {
            pubkey: hex::encode(Sha256::digest(label.as_bytes())),
        }
    }
}

#[async_trait]
impl EventSigner for DemoSigner {
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
            sig: String::new(),
        })
    }
}

struct SimulatedProvider {
    bus: MemoryBus,
    signer: DemoSigner,
    price_sats: u64,
    settlements: mpsc::UnboundedReceiver<String>,
}

impl SimulatedProvider {
    async fn announce(&self, server_identifier: &str) -> Result<()> {
        let template = create_server_announcement_event(
            server_identifier,
            &json!({
                "identifier": server_identifier,
                "name": "Wavefunc DVMCP bridge (simulated)",
                "capabilities": ["tools/call"],
                "tools": [
                    {"name": "music-recognition"},
                    {"name": "musicbrainz-search-artist"}
                ]
            }),
        )?;
        self.publish(template).await
    }

    async fn publish(&self, template: EventTemplate) -> Result<()> {
        let event = self.signer.sign_event(template).await?;
        self.bus.publish(&event).await?;
        Ok(())
    }

    async fn run(mut self) -> Result<()> {
        let mut requests = self
            .bus
            .subscribe(Filter::new().kinds([KIND_DVMCP_JOB_REQUEST]))
            .await?;
        while let Some(request) = requests.next().await {
            if let Err(error) = self.answer(&request).await {
                warn!(request = %request.id, %error, "simulated provider failed to answer");
            }
        }
        Ok(())
    }

    async fn answer(&mut self, request: &Event) -> Result<()> {
        let call = ToolCallRequest::from_event(request)?;
        let feedback = |status| JobFeedback::new(status, &request.id, &request.pubkey);

        self.publish(create_job_feedback_event(&feedback(JobStatus::Processing)))
            .await?;

        if self.price_sats > 0 {
            let tag = request.id.get(..12).unwrap_or(&request.id);
            let invoice = format!("lnbc{}0n1psmoke{tag}", self.price_sats);
            let ask = feedback(JobStatus::PaymentRequired)
                .with_amount(self.price_sats.to_string(), Some(invoice.clone()));
            self.publish(create_job_feedback_event(&ask)).await?;

            let settled = tokio::time::timeout(Duration::from_secs(5), async {
                while let Some(paid) = self.settlements.recv().await {
                    if paid == invoice {
                        return true;
                    }
                }
                false
            })
            .await
            .unwrap_or(false);
            if !settled {
                info!(request = %request.id, "invoice not settled, dropping job");
                return Ok(());
            }
        }

        let result = ToolCallResult::success(respond(&call).to_string());
        self.publish(create_job_result_event(&request.id, &request.pubkey, &result)?)
            .await
    }
}

fn respond(call: &ToolCallRequest) -> Value {
    match call.tool_name.as_str() {
        "music-recognition" => json!({
            "type": "music-recognition-result",
            "result": {
                "title": "Roygbiv",
                "artist": "Boards of Canada",
                "album": "Music Has the Right to Children",
                "release_date": "1998-04-20"
            }
        }),
        "musicbrainz-search-artist" => {
            let name = call
                .arguments
                .get("artist")
                .and_then(Value::as_str)
                .unwrap_or_default();
            json!({"artists": [{"id": "abc", "name": name}]})
        }
        _ => json!({"echo": call.arguments}),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = DvmcpConfig::from_env().context("load DVMCP config")?;
    let bus = MemoryBus::new();
    let (settle_tx, settle_rx) = mpsc::unbounded_channel();

    let provider = SimulatedProvider {
        bus: bus.clone(),
        signer: DemoSigner::new("dvmcp-smoke-provider"),
        price_sats: args.price_sats,
        settlements: settle_rx,
    };
    provider.announce(&config.server_identifier).await?;
    let provider_task = tokio::spawn(provider.run());

    let service = DvmcpService::new(
        Arc::new(bus.clone()),
        Arc::new(DemoSigner::new("dvmcp-smoke-customer")),
        config,
    );
    let approve = !args.decline_payments;
    service
        .set_payment_handler(payment_handler_fn(move |request| {
            let settle_tx = settle_tx.clone();
            async move {
                info!(amount = %request.amount, "paying invoice");
                if approve {
                    let _ = settle_tx.send(request.invoice);
                }
                Ok(approve)
            }
        }))
        .await;

    match service
        .search(SearchType::Artist, &SearchQuery::new(args.artist.as_str()))
        .await
    {
        Ok(artists) => {
            for artist in &artists {
                info!(id = %artist["id"], name = %artist["name"], "artist");
            }
        }
        Err(DvmcpError::PaymentRequired { amount, invoice }) => {
            warn!(%amount, invoice = invoice.as_deref().unwrap_or("-"), "search needs payment");
        }
        Err(error) => return Err(anyhow!("artist search failed: {error}")),
    }

    match service.recognize_audio(&args.audio_url).await {
        Ok(track) => info!(
            title = %track.title,
            artist = %track.artist,
            album = track.album.as_deref().unwrap_or("-"),
            "recognized"
        ),
        Err(error) if error.payment_details().is_some() => {
            warn!(%error, "recognition needs payment");
        }
        Err(error) => return Err(anyhow!("recognition failed: {error}")),
    }

    if let Some(selected) = service.provider().await {
        info!(
            provider = %selected.provider_id,
            service = %selected.service_id,
            events = bus.published().len(),
            "smoke run complete"
        );
    }
    provider_task.abort();
    Ok(())
}
