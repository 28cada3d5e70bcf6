use async_trait::async_trait;

use crate::domain::EngineSnapshot;

/// Transport boundary. The engine never talks to the network directly;
/// tests swap in a scripted implementation.
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, String>;
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse, String>;
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Optional observer notified after every applied state transition.
///
/// This is where UI conveniences like persisting the last selected course
/// hang off the engine; sink failures are the sink's problem, never the
/// engine's.
pub trait ChangeSink: Send + Sync {
    fn on_change(&self, snapshot: &EngineSnapshot);
}
