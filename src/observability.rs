use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("gpterm.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("gpterm.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("gpterm.client.request_duration_seconds");

pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("gpterm.stream.fragments");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("gpterm.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("gpterm.stream.bytes");
pub(crate) static STREAM_DURATION: Moments = Moments::new("gpterm.stream.duration_seconds");

pub(crate) static SCANNER_BLOCKS_CLOSED: Counter = Counter::new("gpterm.scanner.blocks_closed");
pub(crate) static SCANNER_LANGUAGE_TAGS: Counter = Counter::new("gpterm.scanner.language_tags");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&SCANNER_BLOCKS_CLOSED);
    collector.register_counter(&SCANNER_LANGUAGE_TAGS);
}
