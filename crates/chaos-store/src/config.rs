use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub connection_url: String,
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "chaosduck".to_string()
}
