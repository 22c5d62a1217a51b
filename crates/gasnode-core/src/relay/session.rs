use log::{error, info, warn};

use super::{NoteBody, RelayConnection, RelayRequest, RelayTransport, SyncMode};
use crate::clock::Clock;
use crate::config::NodeConfig;
use crate::error::InitFault;
use crate::watchdog::Watchdog;

/// Everything the node decides once at boot and keeps until reset.
///
/// Owns the configuration, the relay connection and the watchdog. The
/// connection is resolved in [`establish`](Self::establish) and never changes
/// afterwards: a relay that was unreachable at boot stays unavailable until
/// the next reset.
pub struct DeviceSession<T: RelayTransport, W: Watchdog> {
    pub(crate) config: NodeConfig,
    pub(crate) relay: RelayConnection<T>,
    pub(crate) watchdog: W,
}

impl<T: RelayTransport, W: Watchdog> DeviceSession<T, W> {
    /// Arm the watchdog, open the relay and register the node with it.
    ///
    /// Opening is retried per [`NodeConfig::init_retry_policy`]. If every
    /// attempt fails the session runs offline. The setup transactions that
    /// follow a successful open are best effort: a rejected one is logged and
    /// the relay still counts as available.
    pub async fn establish<C: Clock>(
        config: NodeConfig,
        mut transport: T,
        mut watchdog: W,
        clock: &mut C,
    ) -> Self {
        watchdog.configure(config.watchdog_timeout());
        watchdog.feed();

        let policy = config.init_retry_policy();
        let opened = policy
            .run(clock, &mut watchdog, async |attempt| {
                info!(
                    "Opening relay (attempt {}/{})",
                    attempt,
                    policy.attempts()
                );
                transport.open().await
            })
            .await;

        let relay = match opened {
            Ok(()) => {
                info!("Relay connected");
                register(&config, &mut transport, &mut watchdog).await;
                RelayConnection::Available(transport)
            }
            Err(exhausted) => {
                let fault = InitFault {
                    attempts: exhausted.attempts,
                    last: exhausted.last,
                };
                error!("{}. Running in offline mode", fault);
                RelayConnection::Unavailable(fault)
            }
        };

        Self {
            config,
            relay,
            watchdog,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn relay(&self) -> &RelayConnection<T> {
        &self.relay
    }

    pub fn relay_mut(&mut self) -> &mut RelayConnection<T> {
        &mut self.relay
    }

    pub fn watchdog(&self) -> &W {
        &self.watchdog
    }

    pub fn watchdog_mut(&mut self) -> &mut W {
        &mut self.watchdog
    }

    pub fn is_online(&self) -> bool {
        self.relay.is_available()
    }

    /// Why the relay is unavailable, if it is
    pub fn init_fault(&self) -> Option<&InitFault> {
        self.relay.init_fault()
    }
}

/// One-time setup transactions sent right after the relay opens.
fn setup_requests(config: &NodeConfig) -> [RelayRequest; 3] {
    let relay = &config.relay;
    [
        RelayRequest::HubSet {
            product: relay.product_uid.clone(),
            mode: SyncMode::Periodic,
            outbound: relay.outbound_minutes,
            inbound: relay.inbound_minutes,
            align: true,
        },
        RelayRequest::NoteTemplate {
            file: relay.note_file.clone(),
            body: NoteBody::template(),
        },
        RelayRequest::CardPower {
            minutes: relay.power_report_minutes,
            reset: true,
        },
    ]
}

async fn register<T: RelayTransport, W: Watchdog>(
    config: &NodeConfig,
    transport: &mut T,
    watchdog: &mut W,
) {
    for request in setup_requests(config) {
        watchdog.feed();
        match transport.request(&request).await {
            Ok(()) => info!("Relay {} accepted", request.name()),
            Err(e) => warn!("Relay {} failed: {}", request.name(), e),
        }
    }
}
