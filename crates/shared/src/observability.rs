//! # ログ初期化
//!
//! mailer-service のトレーシング購読者をプロセス起動時に 1 回だけ組み立てる。
//!
//! - 出力形式: `LOG_FORMAT`（`json` / `pretty`）。未設定・不正な値は pretty
//! - フィルタ: `RUST_LOG`。未設定なら [`DEFAULT_ENV_FILTER`]
//! - `tracing_error::ErrorLayer` を登録し、インフラ層のエラーが生成時点の
//!   `SpanTrace` を取れるようにする

/// `RUST_LOG` 未設定時のフィルタ
pub const DEFAULT_ENV_FILTER: &str = "info,apptmail=debug";

/// ログ出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 1 行 1 JSON（ログ収集基盤向け）
    Json,
    /// 人間向け（開発環境）
    #[default]
    Pretty,
}

impl LogFormat {
    fn from_value(value: &str) -> Option<Self> {
        match value.trim() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// トレーシング初期化設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// 起動ログに出すサービス名
    pub service_name:    String,
    pub log_format:      LogFormat,
    /// 解釈できなかった `LOG_FORMAT` の値（初期化後に警告する）
    pub rejected_format: Option<String>,
}

impl TracingConfig {
    pub fn from_env(service_name: impl Into<String>) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// キーから値を引く関数を使って設定を読み込む
    pub fn from_lookup(
        service_name: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let raw = lookup("LOG_FORMAT");
        let parsed = raw.as_deref().and_then(LogFormat::from_value);

        Self {
            service_name:    service_name.into(),
            log_format:      parsed.unwrap_or_default(),
            rejected_format: raw.filter(|_| parsed.is_none()),
        }
    }
}

/// トレーシングを初期化する
///
/// 2 回目以降の呼び出しは panic する（`SubscriberInitExt::init`）。
#[cfg(feature = "observability")]
pub fn init_tracing(config: &TracingConfig) {
    use tracing_subscriber::{Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_ENV_FILTER.into());

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .init();

    if let Some(value) = &config.rejected_format {
        tracing::warn!(log_format = %value, "LOG_FORMAT を解釈できないため pretty で出力します");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(log_format: Option<&str>) -> TracingConfig {
        TracingConfig::from_lookup("mailer-service", |key| {
            log_format
                .filter(|_| key == "LOG_FORMAT")
                .map(str::to_string)
        })
    }

    #[test]
    fn test_log_formatの値で出力形式が決まる() {
        assert_eq!(load(Some("json")).log_format, LogFormat::Json);
        assert_eq!(load(Some(" pretty ")).log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_未設定ならprettyで警告もしない() {
        let config = load(None);

        assert_eq!(config.service_name, "mailer-service");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.rejected_format, None);
    }

    #[test]
    fn test_不正な値はprettyにして値を残す() {
        let config = load(Some("Json"));

        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.rejected_format.as_deref(), Some("Json"));
    }

    #[test]
    fn test_デフォルトフィルタがenv_filterとして解釈できる() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_ENV_FILTER).is_ok());
    }
}
