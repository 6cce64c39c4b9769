// Broker engine: session context, message routing, event fan-out and the
// CALL procedure table. Transport concerns stay with the caller, which feeds
// decoded messages in and supplies a `DeliverySink` for outbound traffic.
mod error;
pub mod messenger;
pub mod procedures;
pub mod router;
pub mod session;
pub mod sink;

pub use error::{DeliveryError, Result, RouterError};
pub use messenger::EventMessenger;
pub use procedures::{CallError, ProcedureHandler, ProcedureTable};
pub use router::{BrokerRouter, FanoutReport, Routed};
pub use session::{Inbound, Session};
pub use sink::{DeliverySink, SessionChannels};
