#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("invalid config ({field}): {detail}")]
    InvalidConfig { field: &'static str, detail: String },
}
