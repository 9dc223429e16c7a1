//! 엔진 설정.
//!
//! TOML 파일에서 로드하며, 생략된 필드는 기본값으로 채워집니다.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// 설정 로드 실패.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// 엔진 전역 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineSettings {
    /// 데이터 디렉토리 (플러그인, 상태 파일)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// 테스트넷 사용 여부
    #[serde(default)]
    pub is_testnet: bool,
    /// 디스패치 실패 후 재시작 지연 (밀리초)
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// 캔들 이벤트 채널 버퍼 크기
    #[serde(default = "default_candle_buffer_size")]
    pub candle_buffer_size: usize,
    /// 생명주기 이벤트 브로드캐스트 버퍼 크기
    #[serde(default = "default_lifecycle_buffer_size")]
    pub lifecycle_buffer_size: usize,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// 로그 레벨 (예: "info", "quantd_strategy=debug")
    pub level: String,
    /// 출력 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_restart_delay_ms() -> u64 {
    1000
}
fn default_candle_buffer_size() -> usize {
    256
}
fn default_lifecycle_buffer_size() -> usize {
    64
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            is_testnet: false,
            restart_delay_ms: default_restart_delay_ms(),
            candle_buffer_size: default_candle_buffer_size(),
            lifecycle_buffer_size: default_lifecycle_buffer_size(),
            logging: LoggingSettings::default(),
        }
    }
}

impl EngineSettings {
    /// TOML 파일에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// 설정 값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.candle_buffer_size == 0 {
            return Err(SettingsError::Invalid(
                "candle_buffer_size must be positive".to_string(),
            ));
        }
        if self.lifecycle_buffer_size == 0 {
            return Err(SettingsError::Invalid(
                "lifecycle_buffer_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// 재시작 지연을 `Duration`으로 반환합니다.
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}
