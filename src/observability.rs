use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("palaver.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("palaver.client.request_errors");
pub(crate) static CLIENT_NOT_CONFIGURED: Counter = Counter::new("palaver.client.not_configured");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("palaver.client.request_duration_seconds");

pub(crate) static SESSION_MESSAGES: Counter = Counter::new("palaver.session.messages");
pub(crate) static SESSION_REJECTED_SENDS: Counter =
    Counter::new("palaver.session.rejected_sends");
pub(crate) static SESSION_CANCELLED: Counter = Counter::new("palaver.session.cancelled");

pub(crate) static CONFIG_SAVES: Counter = Counter::new("palaver.config.saves");
pub(crate) static CONFIG_REJECTIONS: Counter = Counter::new("palaver.config.rejections");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_NOT_CONFIGURED);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&SESSION_MESSAGES);
    collector.register_counter(&SESSION_REJECTED_SENDS);
    collector.register_counter(&SESSION_CANCELLED);

    collector.register_counter(&CONFIG_SAVES);
    collector.register_counter(&CONFIG_REJECTIONS);
}
