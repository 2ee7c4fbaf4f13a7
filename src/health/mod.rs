//! Health checking: transport, probing, classification and scheduling

mod classify;
mod prober;
mod scheduler;
mod transport;

pub use classify::classify;
pub use prober::{
    parse_version_lenient, probe_node, HealthSample, ParsedStatus, Prober, StatusProber,
    StatusProtocol,
};
pub use scheduler::{HealthScheduler, SchedulerHandle, Trigger};
pub use transport::{HttpTransport, Method, RawResponse, Request, Transport};
