//! Deterministic collaborators for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::docs::DocumentationSource;
use crate::error::{FetchError, GenerationError};
use crate::geocoding::GeocodingApi;
use crate::llm::{Generation, GenerationRequest, Role, StructuredGenerator, TokenUsage};
use crate::models::{GeoSearchParams, GeocodingResponse, Place};
use crate::pipeline::Sleeper;
use crate::{CityScoutError, Result};

/// Replays scripted outputs per role, in order
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<HashMap<Role, VecDeque<std::result::Result<String, GenerationError>>>>,
    log: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, role: Role, text: &str) -> Self {
        self.push(role, Ok(text.to_string()));
        self
    }

    pub fn fail(mut self, role: Role, message: &str) -> Self {
        self.push(role, Err(GenerationError::Provider(message.to_string())));
        self
    }

    fn push(&mut self, role: Role, entry: std::result::Result<String, GenerationError>) {
        self.script
            .get_mut()
            .unwrap()
            .entry(role)
            .or_default()
            .push_back(entry);
    }

    /// Roles of all calls made so far, in order
    pub fn calls(&self) -> Vec<Role> {
        self.log.lock().unwrap().iter().map(|r| r.role).collect()
    }

    /// Context of each call made for `role`
    pub fn contexts(&self, role: Role) -> Vec<Vec<String>> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.role == role)
            .map(|r| r.context.clone())
            .collect()
    }
}

#[async_trait]
impl StructuredGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<Generation, GenerationError> {
        let role = request.role;
        self.log.lock().unwrap().push(request);
        let next = self
            .script
            .lock()
            .unwrap()
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(GenerationError::Provider(format!("no scripted reply for {role}"))));
        next.map(|text| Generation {
            text,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 10,
            },
        })
    }
}

/// Replays scripted geocoding responses, in order
#[derive(Default)]
pub struct ScriptedGeocoder {
    responses: Mutex<VecDeque<std::result::Result<GeocodingResponse, FetchError>>>,
    requests: Mutex<Vec<GeoSearchParams>>,
}

impl ScriptedGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, response: std::result::Result<GeocodingResponse, FetchError>) -> Self {
        self.responses.get_mut().unwrap().push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<GeoSearchParams> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GeocodingApi for ScriptedGeocoder {
    async fn search(
        &self,
        params: &GeoSearchParams,
    ) -> std::result::Result<GeocodingResponse, FetchError> {
        self.requests.lock().unwrap().push(params.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Network("no scripted response".to_string())))
    }
}

/// Records requested delays instead of sleeping
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Documentation source that is always unreachable
pub struct UnreachableDocs;

#[async_trait]
impl DocumentationSource for UnreachableDocs {
    async fn fetch_reference(&self) -> Result<String> {
        Err(CityScoutError::api("documentation page unreachable"))
    }
}

pub fn response_with(names: &[&str]) -> GeocodingResponse {
    GeocodingResponse {
        results: names
            .iter()
            .enumerate()
            .map(|(i, name)| Place {
                name: (*name).to_string(),
                latitude: 37.0 + i as f64,
                longitude: -122.0,
                country: Some("United States".to_string()),
                ..Place::default()
            })
            .collect(),
        generationtime_ms: None,
    }
}

/// Serve one canned HTTP response on a local port. Returns the base URL.
pub async fn serve_once(status_line: &str, content_type: &str, body: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut buffer = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buffer).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buffer[..n]),
            }
        }
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{address}")
}
