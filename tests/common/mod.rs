//! Scripted in-process transport for engine tests: URL-substring routes,
//! optional per-route latency, and a request log for call-count assertions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use reserva_engine::ports::{HttpClientPort, HttpResponse};

struct Route {
    pattern: String,
    status: u16,
    body: Value,
    delay: Duration,
}

#[derive(Default)]
pub struct ScriptedHttp {
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<String>>,
}

impl ScriptedHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, pattern: &str, body: Value) {
        self.route_with(pattern, 200, body, Duration::ZERO);
    }

    pub fn route_with(&self, pattern: &str, status: u16, body: Value, delay: Duration) {
        self.routes.lock().unwrap().push(Route {
            pattern: pattern.to_string(),
            status,
            body,
            delay,
        });
    }

    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn requests_matching(&self, pattern: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(pattern))
            .count()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    async fn respond(&self, url: &str) -> Result<HttpResponse, String> {
        self.log.lock().unwrap().push(url.to_string());
        // Latest matching route wins so tests can re-route mid-scenario.
        let found = {
            let routes = self.routes.lock().unwrap();
            routes
                .iter()
                .rev()
                .find(|r| url.contains(&r.pattern))
                .map(|r| (r.status, r.body.clone(), r.delay))
        };
        let Some((status, body, delay)) = found else {
            return Ok(HttpResponse {
                status: 404,
                bytes: br#"{"message":"no scripted route"}"#.to_vec(),
                content_type: "application/json".to_string(),
            });
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(HttpResponse {
            status,
            bytes: serde_json::to_vec(&body).unwrap(),
            content_type: "application/json".to_string(),
        })
    }
}

#[async_trait]
impl HttpClientPort for ScriptedHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse, String> {
        self.respond(url).await
    }

    async fn post_json(&self, url: &str, _body: &Value) -> Result<HttpResponse, String> {
        self.respond(url).await
    }
}
