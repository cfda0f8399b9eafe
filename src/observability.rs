use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("byteforge.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("byteforge.client.request_errors");
pub(crate) static CLIENT_PAYMENT_REQUIRED: Counter =
    Counter::new("byteforge.client.payment_required");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("byteforge.client.request_duration_seconds");

pub(crate) static STREAM_FRAMES: Counter = Counter::new("byteforge.stream.frames");
pub(crate) static STREAM_MALFORMED_FRAMES: Counter =
    Counter::new("byteforge.stream.malformed_frames");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("byteforge.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("byteforge.stream.bytes");
pub(crate) static STREAM_TTFT: Moments = Moments::new("byteforge.stream.ttft_seconds");

pub(crate) static TURN_DURATION: Moments = Moments::new("byteforge.turn.duration_seconds");
pub(crate) static TURNS_REFUSED: Counter = Counter::new("byteforge.turn.refused");
pub(crate) static TURNS_COMPLETED: Counter = Counter::new("byteforge.turn.completed");
pub(crate) static TURNS_FAILED: Counter = Counter::new("byteforge.turn.failed");
pub(crate) static TURNS_CANCELLED: Counter = Counter::new("byteforge.turn.cancelled");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_PAYMENT_REQUIRED);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_FRAMES);
    collector.register_counter(&STREAM_MALFORMED_FRAMES);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_TTFT);

    collector.register_moments(&TURN_DURATION);
    collector.register_counter(&TURNS_REFUSED);
    collector.register_counter(&TURNS_COMPLETED);
    collector.register_counter(&TURNS_FAILED);
    collector.register_counter(&TURNS_CANCELLED);
}
