//! Everything that talks to the relay: the transport port, the request
//! documents, the boot-time session and the delivery engine.

mod delivery;
mod request;
mod session;

pub use delivery::{DeliveryEngine, DeliveryResult, FlushReport};
pub use request::{NoteBody, RelayRequest, RelayResponse, SyncMode};
pub use session::DeviceSession;

use core::future::Future;

use thiserror_no_std::Error;

use crate::error::{InitFault, detail};

/// Error type for relay transactions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The relay did not answer on the bus
    #[error("relay not responding")]
    NotResponding,
    /// Bus-level failure
    #[error("bus error: {0}")]
    Bus(heapless::String<64>),
    /// The relay answered with an `err` field
    #[error("relay rejected request: {0}")]
    Rejected(heapless::String<64>),
    /// The reply could not be parsed
    #[error("malformed relay response")]
    MalformedResponse,
    /// The request could not be serialized
    #[error("failed to encode {0} request")]
    Encode(&'static str),
}

impl TransportError {
    /// Bus failure with a detail message, truncated to fit
    pub fn bus(details: &str) -> Self {
        Self::Bus(detail(details))
    }
}

/// Port for the bus connection to the relay.
///
/// # Example Implementation
///
/// ```ignore
/// struct NotecardI2c<I: I2c> {
///     i2c: I,
///     address: u8,
/// }
///
/// impl<I: I2c> RelayTransport for NotecardI2c<I> {
///     async fn open(&mut self) -> Result<(), TransportError> {
///         self.reset_bus().await
///     }
///
///     async fn transact(&mut self, request: &RelayRequest) -> Result<RelayResponse, TransportError> {
///         let line = request.to_json_line()?;
///         self.write_chunked(&line).await?;
///         let reply = self.read_line().await?;
///         RelayResponse::from_json(&reply)
///     }
/// }
/// ```
pub trait RelayTransport {
    /// Bring up the bus link. Called by the boot-time retry loop.
    fn open(&mut self) -> impl Future<Output = Result<(), TransportError>>;

    /// Send one request and wait for its reply
    fn transact(
        &mut self,
        request: &RelayRequest,
    ) -> impl Future<Output = Result<RelayResponse, TransportError>>;

    /// Send one request and treat an `err` reply as a failure
    fn request(
        &mut self,
        request: &RelayRequest,
    ) -> impl Future<Output = Result<(), TransportError>> {
        async move { self.transact(request).await?.into_result() }
    }
}

/// State of the link to the relay, decided once while booting.
#[derive(Debug)]
pub enum RelayConnection<T> {
    /// Every open attempt failed
    Unavailable(InitFault),
    Available(T),
}

impl<T> RelayConnection<T> {
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn transport_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Available(transport) => Some(transport),
            Self::Unavailable(_) => None,
        }
    }

    /// Why the relay is unavailable, if it is
    pub fn init_fault(&self) -> Option<&InitFault> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable(fault) => Some(fault),
        }
    }
}
