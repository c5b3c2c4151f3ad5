pub mod request_trace;
pub mod trace_span;

pub use request_trace::{RequestTrace, TraceId};
pub use trace_span::TraceSpan;
