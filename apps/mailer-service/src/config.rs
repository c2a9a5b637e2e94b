//! # Mailer Service 設定
//!
//! 環境変数から Mailer Service の設定を読み込み、検証する。
//!
//! 読み込みは `from_env` で行う。テストでは環境変数を書き換えずに済むよう、
//! キーから値を引く関数を渡せる `from_lookup` を使う。

use std::{env, time::Duration};

use apptmail_infra::mailer::{DEFAULT_IDLE_TIMEOUT, MailerConfig, SmtpSettings};
use chrono::{TimeDelta, Utc};
use thiserror::Error;

use crate::scheduler::CronSchedule;

/// 許容する最短の実行間隔（分）
pub const MIN_INTERVAL_MINUTES: i64 = 15;

/// 件名の既定値
pub const DEFAULT_SUBJECT: &str = "Terminänderungen";

/// SMTP の接続・応答待ちタイムアウト
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// 設定エラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 必須の環境変数が無い
    #[error("{0} が設定されていません")]
    Missing(&'static str),

    /// 数値として解釈できない
    #[error("{name} は数値である必要があります: {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    /// 未知の送信方式
    #[error("MAIL_TRANSPORT は smtp または noop である必要があります: {0:?}")]
    UnknownTransport(String),

    /// cron 式を解釈できない
    #[error("SCHEDULE の cron 式を解釈できません: {0}")]
    InvalidSchedule(String),

    /// 実行間隔が短すぎる
    #[error("SCHEDULE の実行間隔が {minutes} 分です（{MIN_INTERVAL_MINUTES} 分以上にしてください）")]
    IntervalTooShort { minutes: i64 },
}

/// メール送信方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// SMTP サーバー経由で送信
    Smtp,
    /// 送信しない（ログ出力のみ）
    Noop,
}

impl TransportKind {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "smtp" => Ok(Self::Smtp),
            "noop" => Ok(Self::Noop),
            other => Err(ConfigError::UnknownTransport(other.to_string())),
        }
    }
}

/// Mailer Service の設定
#[derive(Debug, Clone)]
pub struct MailerServiceConfig {
    /// 変更ログ DB の接続 URL
    pub database_url: String,
    /// 変更検知の実行スケジュール
    pub schedule:     CronSchedule,
    /// メール送信方式
    pub transport:    TransportKind,
    /// SMTP 接続設定（transport=smtp の場合に使用）
    pub smtp:         SmtpSettings,
    /// メーラーデーモンの設定
    pub mailer:       MailerConfig,
}

impl MailerServiceConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// キーから値を引く関数を使って設定を読み込む
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));
        let optional = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = required("DATABASE_URL")?;
        let schedule = parse_schedule(&required("SCHEDULE")?)?;

        let transport = TransportKind::parse(&optional("MAIL_TRANSPORT", "smtp"))?;
        let smtp = SmtpSettings {
            host:     optional("SMTP_HOST", "localhost"),
            port:     parse_number("SMTP_PORT", &optional("SMTP_PORT", "25"))?,
            username: lookup("SMTP_USER").filter(|user| !user.is_empty()),
            password: optional("SMTP_PASSWORD", ""),
            timeout:  SMTP_TIMEOUT,
        };

        let idle_timeout = match lookup("MAILER_IDLE_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(parse_number("MAILER_IDLE_TIMEOUT_SECS", &value)?),
            None => DEFAULT_IDLE_TIMEOUT,
        };
        let mailer = MailerConfig {
            from: required("MAIL_FROM")?,
            to: required("MAIL_TO")?,
            subject: optional("MAIL_SUBJECT", DEFAULT_SUBJECT),
            idle_timeout,
        };

        Ok(Self {
            database_url,
            schedule,
            transport,
            smtp,
            mailer,
        })
    }
}

/// cron 式をパースし、最短の実行間隔を検証する
fn parse_schedule(expression: &str) -> Result<CronSchedule, ConfigError> {
    let schedule =
        CronSchedule::parse(expression).map_err(|e| ConfigError::InvalidSchedule(e.to_string()))?;

    // 不規則な式でも起動時刻によって結果が変わらないよう、最短の間隔で判定する
    let interval = schedule
        .min_interval(Utc::now())
        .ok_or_else(|| ConfigError::InvalidSchedule("次回の実行時刻がありません".to_string()))?;
    if interval < TimeDelta::minutes(MIN_INTERVAL_MINUTES) {
        return Err(ConfigError::IntervalTooShort {
            minutes: interval.num_minutes(),
        });
    }

    Ok(schedule)
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}
