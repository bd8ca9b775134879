//! Offsetting Client - session orchestration for carbon offsetting
//!
//! Runs the two protocol flows against an offsetting agent reachable only
//! through a broadcast pub/sub bus:
//!
//! - **Status**: publish net energy usage, wait for the agent's view of how
//!   much is left to compensate.
//! - **Compensation**: stage the technics document, sign a claim over it,
//!   publish the claim and wait for the agent's report.
//!
//! Requests are correlated by the household address; the bus itself offers
//! no pairing.

pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod session;
pub mod state;

pub use config::Config;
pub use engine::{PendingRequest, RequestEngine, RequestPhase, ResponseFilter};
pub use error::ClientError;
pub use notify::{
    LogNotifier, LogSink, NoticeKind, Notification, Notifier, RecordingNotifier, RecordingSink,
    StateSink,
};
pub use session::{net_usage, FlowOutcome, Session, SessionConfig};
pub use state::{ClientState, Quantity};
