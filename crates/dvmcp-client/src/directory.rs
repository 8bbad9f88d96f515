//! Provider discovery over server announcements.
//!
//! Announcement payloads differ between bridge versions, so compatibility is decided
//! by a list of named predicates. Any predicate matching is enough and the first
//! compatible announcement wins; later, better matches are never waited for.

use std::sync::Arc;
use std::time::Duration;

use nostr::dvmcp::{KIND_DVMCP_SERVER_ANNOUNCEMENT, METHOD_TOOLS_CALL, ServerAnnouncement};
use nostr_client::{Filter, MessageBus};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use crate::config::{DEFAULT_SERVER_IDENTIFIER, DvmcpConfig};
use crate::error::DvmcpError;

/// Provider a job is sent to. Both halves are always set together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedProvider {
    pub provider_id: String,
    pub service_id: String,
}

impl SelectedProvider {
    pub fn new(provider_id: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            service_id: service_id.into(),
        }
    }
}

/// What an announcement is matched against.
#[derive(Debug, Clone)]
pub struct MatchTarget {
    pub service_id: String,
    pub known_provider_id: String,
    pub tool: String,
}

impl MatchTarget {
    pub fn from_config(config: &DvmcpConfig) -> Self {
        Self {
            service_id: config.server_identifier.clone(),
            known_provider_id: config.fallback_provider_pubkey.clone(),
            tool: config.target_tool.clone(),
        }
    }
}

/// A named compatibility check.
pub struct ProviderPredicate {
    pub name: &'static str,
    pub check: fn(&ServerAnnouncement, &MatchTarget) -> bool,
}

/// Service ids every Wavefunc bridge release has announced under.
const KNOWN_SERVICE_ALIASES: [&str; 1] = [DEFAULT_SERVER_IDENTIFIER];
/// `type`/`kind` discriminators used by DVMCP servers.
const SERVER_TYPES: [&str; 2] = ["dvmcp-server", "dvmcp"];
/// Substrings that only show up in Wavefunc-related payloads.
const DOMAIN_KEYWORDS: [&str; 3] = ["wavefunc", "dvmcp-bridge", "music-recognition"];

/// Evaluated in order; strongest signal first.
pub const PROVIDER_PREDICATES: &[ProviderPredicate] = &[
    // The announcement names the service we were configured for.
    ProviderPredicate {
        name: "identifier",
        check: |announcement, target| {
            announcement.identifier.as_deref() == Some(target.service_id.as_str())
        },
    },
    // Older bridges only set a display name.
    ProviderPredicate {
        name: "name",
        check: |announcement, target| {
            announcement.name.as_deref() == Some(target.service_id.as_str())
        },
    },
    // Identifier or `serverId` is one of the bridge's known aliases.
    ProviderPredicate {
        name: "known_alias",
        check: |announcement, _| {
            [&announcement.identifier, &announcement.server_id]
                .into_iter()
                .flatten()
                .any(|id| KNOWN_SERVICE_ALIASES.contains(&id.as_str()))
        },
    },
    // Declares the target tool or generic tool invocation as a capability.
    ProviderPredicate {
        name: "capability",
        check: |announcement, target| {
            announcement
                .capability_list()
                .iter()
                .any(|capability| *capability == target.tool || capability == METHOD_TOOLS_CALL)
        },
    },
    // Lists the target tool among its tools.
    ProviderPredicate {
        name: "tool_list",
        check: |announcement, target| {
            announcement
                .tool_names()
                .iter()
                .any(|tool| *tool == target.tool)
        },
    },
    // Self-describes as a DVMCP server.
    ProviderPredicate {
        name: "server_type",
        check: |announcement, _| {
            announcement
                .server_type
                .as_deref()
                .is_some_and(|kind| SERVER_TYPES.contains(&kind))
        },
    },
    // Published by the operator we already trust.
    ProviderPredicate {
        name: "known_announcer",
        check: |announcement, target| announcement.announcer_pubkey == target.known_provider_id,
    },
    // Broad fallback: any domain keyword anywhere in the payload. Can match unrelated
    // providers that merely mention one of the keywords.
    ProviderPredicate {
        name: "keyword",
        check: |announcement, _| {
            let text = announcement.searchable_text();
            DOMAIN_KEYWORDS.iter().any(|keyword| text.contains(keyword))
        },
    },
];

/// Name of the first predicate the announcement satisfies.
pub fn match_announcement(
    announcement: &ServerAnnouncement,
    target: &MatchTarget,
) -> Option<&'static str> {
    PROVIDER_PREDICATES
        .iter()
        .find(|predicate| (predicate.check)(announcement, target))
        .map(|predicate| predicate.name)
}

/// Service id to address a matched provider with.
pub fn service_id_for(announcement: &ServerAnnouncement, target: &MatchTarget) -> String {
    announcement
        .identifier
        .clone()
        .or_else(|| announcement.name.clone())
        .unwrap_or_else(|| target.service_id.clone())
}

/// Scans announcement events for a compatible provider.
#[derive(Clone)]
pub struct ProviderDirectory {
    bus: Arc<dyn MessageBus>,
    target: MatchTarget,
    limit: usize,
}

impl ProviderDirectory {
    pub fn new(bus: Arc<dyn MessageBus>, target: MatchTarget, limit: usize) -> Self {
        Self { bus, target, limit }
    }

    pub fn target(&self) -> &MatchTarget {
        &self.target
    }

    /// Wait up to `timeout` for the first compatible announcement.
    pub async fn discover(&self, timeout: Duration) -> Result<SelectedProvider, DvmcpError> {
        let deadline = Instant::now() + timeout;
        let filter = Filter::new()
            .kinds([KIND_DVMCP_SERVER_ANNOUNCEMENT])
            .limit(self.limit);
        let mut stream = self
            .bus
            .subscribe(filter)
            .await
            .map_err(|error| DvmcpError::Transport(error.to_string()))?;

        let mut announcements = 0usize;
        let outcome = loop {
            let event = tokio::select! {
                () = sleep_until(deadline) => {
                    info!(
                        announcements,
                        timeout_ms = timeout.as_millis() as u64,
                        "provider discovery timed out"
                    );
                    break Err(DvmcpError::DiscoveryTimeout { announcements });
                }
                event = stream.next() => event,
            };
            let Some(event) = event else {
                break Err(DvmcpError::Transport(
                    "announcement stream closed during discovery".to_string(),
                ));
            };
            announcements += 1;

            let announcement = match ServerAnnouncement::from_event(&event) {
                Ok(announcement) => announcement,
                Err(error) => {
                    debug!(event_id = %event.id, %error, "skipping unreadable announcement");
                    continue;
                }
            };

            if let Some(predicate) = match_announcement(&announcement, &self.target) {
                let provider = SelectedProvider::new(
                    announcement.announcer_pubkey.clone(),
                    service_id_for(&announcement, &self.target),
                );
                info!(
                    provider = %provider.provider_id,
                    service = %provider.service_id,
                    predicate,
                    "discovered DVMCP provider"
                );
                break Ok(provider);
            }
            debug!(event_id = %event.id, "announcement is not compatible");
        };

        stream.stop();
        outcome
    }
}
