#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Producer(#[from] producer::ProducerError),

    #[error("{0}")]
    Api(#[from] relay_api_server::ApiError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
