//! # staffdesk-client
//!
//! Loading and reconciliation for the employee detail view: bounded remote
//! calls, the aggregation orchestrator, the per-session load state machine
//! and the edit reconciler, tied together by [`DetailController`].

pub mod aggregate;
pub mod bounded;
pub mod config;
pub mod detail;
pub mod error;
pub mod events;
pub mod reconcile;
pub mod session;

pub use aggregate::{Aggregation, Aggregator};
pub use bounded::{with_deadline, with_timeout};
pub use config::LoadConfig;
pub use detail::{DetailController, LoadHandle};
pub use error::{ClientError, SessionError};
pub use events::{state_event, StatePayload, EVENT_DETAIL_STATE};
pub use reconcile::{Committed, Reconciler, ResolvedEdits};
pub use session::{LoadMachine, LoadState, LoadTicket, SessionTicket, Start};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("staffdesk_client=debug,staffdesk_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
