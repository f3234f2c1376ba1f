//! Fixture documents and builders shared by integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Value, json};
use shiptrack::core::adapter::SharedAdapter;
use shiptrack::storage::config::Config;
use shiptrack::{Engine, EngineBuilder};

/// Container number whose prefix maps to maersk.
pub const MAERSK_CONTAINER: &str = "MAEU1234567";

/// A provider response body in the HTTP adapter's wire shape.
#[must_use]
pub fn payload_document(status: &str) -> Value {
    json!({
        "carrier": "maersk",
        "service": "AE7",
        "status": status,
        "timeline": [
            {
                "timestamp": "2025-03-10T12:00:00Z",
                "status": "Gate In",
                "location": "Shanghai, CN"
            },
            {
                "timestamp": "2025-03-10T22:00:00Z",
                "status": "Loaded",
                "location": "Shanghai, CN"
            }
        ],
        "containers": [{ "number": MAERSK_CONTAINER, "sizeType": "40HC" }],
        "vessel": { "name": "MAERSK ESSEN", "imo": "9632179", "voyage": "312W" },
        "route": {
            "origin": "CNSHA",
            "destination": "NLRTM",
            "eta": "2025-04-09T12:00:00Z"
        },
        "lastUpdated": "2025-03-10T22:00:00Z"
    })
}

/// A `[[providers]]` block for an HTTP provider at `base_url`.
#[must_use]
pub fn http_provider_toml(id: &str, base_url: &str) -> String {
    format!(
        "[[providers]]\n\
         id = \"{id}\"\n\
         base_url = \"{base_url}\"\n\
         tier = \"free\"\n\
         reliability = 0.9\n"
    )
}

/// Write `body` as `config.toml` under `dir`, pointing the cache snapshot into
/// `dir` as well so no test touches the user's data directory.
pub fn write_config(dir: &Path, body: &str) -> PathBuf {
    let snapshot = dir.join("snapshot.sqlite");
    let content = format!(
        "[cache]\npersist_path = \"{}\"\n\n{body}",
        snapshot.display().to_string().replace('\\', "/")
    );
    let path = dir.join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

/// Engine builder with test timings and the given adapters.
#[must_use]
pub fn builder_with(config: Config, adapters: Vec<SharedAdapter>) -> EngineBuilder {
    Engine::builder(config).with_adapters(adapters)
}

/// A started engine.
pub async fn started_engine(config: Config, adapters: Vec<SharedAdapter>) -> Arc<Engine> {
    let engine = Arc::new(builder_with(config, adapters).build().unwrap());
    engine.start().await.unwrap();
    engine
}
