use serde::Deserialize;

use crate::error::ProducerError;

// ═══════════════════════════════════════════════════════════════
//  Source Config
// ═══════════════════════════════════════════════════════════════

/// Конфигурация источника телеметрии. Выбирается по `kind`:
///
/// ```toml
/// [source]
/// kind = "feed"
/// addr = "127.0.0.1:20777"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Live feed: newline-delimited JSON over TCP.
    Feed(FeedConfig),
    /// Session replay from a JSON-lines file.
    Replay(ReplayConfig),
    /// Synthetic generator.
    Simulate(SimulateConfig),
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Simulate(SimulateConfig::default())
    }
}

impl SourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Feed(_) => "feed",
            SourceConfig::Replay(_) => "replay",
            SourceConfig::Simulate(_) => "simulate",
        }
    }

    pub fn validate(&self) -> Result<(), ProducerError> {
        match self {
            SourceConfig::Feed(cfg) => {
                if cfg.addr.trim().is_empty() {
                    return Err(ProducerError::InvalidConfig {
                        field: "source.addr",
                        detail: "must not be empty".into(),
                    });
                }
                if cfg.max_line_bytes == 0 {
                    return Err(ProducerError::InvalidConfig {
                        field: "source.max_line_bytes",
                        detail: "must be > 0".into(),
                    });
                }
            }
            SourceConfig::Replay(cfg) => {
                if cfg.path.trim().is_empty() {
                    return Err(ProducerError::InvalidConfig {
                        field: "source.path",
                        detail: "must not be empty".into(),
                    });
                }
                if cfg.interval_ms == 0 {
                    return Err(ProducerError::InvalidConfig {
                        field: "source.interval_ms",
                        detail: "must be > 0".into(),
                    });
                }
            }
            SourceConfig::Simulate(cfg) => {
                if cfg.cars == 0 {
                    return Err(ProducerError::InvalidConfig {
                        field: "source.cars",
                        detail: "must be > 0".into(),
                    });
                }
                if cfg.interval_ms == 0 {
                    return Err(ProducerError::InvalidConfig {
                        field: "source.interval_ms",
                        detail: "must be > 0".into(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedConfig {
    /// `host:port` of the upstream feed.
    pub addr: String,
    /// Максимальная длина строки; более длинная отбрасывается как bad packet.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplayConfig {
    /// Путь к JSON-lines файлу сессии.
    pub path: String,
    /// Пауза между пакетами.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Начать заново после последнего пакета.
    #[serde(default)]
    pub looped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulateConfig {
    /// Количество машин в сессии.
    #[serde(default = "default_cars")]
    pub cars: u32,
    /// Пауза между пакетами (round-robin по машинам).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Seed для PRNG (0 = текущее время).
    #[serde(default)]
    pub seed: i64,
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            cars: default_cars(),
            interval_ms: default_interval_ms(),
            seed: 0,
        }
    }
}

fn default_cars() -> u32 {
    20
}
fn default_interval_ms() -> u64 {
    50
}
pub fn default_max_line_bytes() -> usize {
    64 * 1024
}

/// Where the car index lives inside a packet (F1 UDP header layout).
pub fn default_key_field() -> String {
    "m_header.m_playerCarIndex".into()
}
