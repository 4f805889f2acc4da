use std::time::Duration;
use url::Url;

/// Endpoints of the external calendar and notification services.
///
/// A missing URL means the corresponding calls are only logged.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    pub calendar_url: Option<Url>,
    pub notification_url: Option<Url>,
    pub request_timeout: Duration,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            calendar_url: None,
            notification_url: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}
