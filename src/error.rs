use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnitchError {
    #[error("GoCD API request failed: {0}")]
    Api(String),

    #[error("Slack API error: {0}")]
    Chat(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Malformed webhook payload: {0}")]
    Decode(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Test report parse error: {0}")]
    Report(#[from] quick_xml::DeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SnitchError>;
