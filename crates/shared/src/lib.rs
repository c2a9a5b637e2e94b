//! # apptmail 共有ユーティリティ
//!
//! 予約変更通知サービス全体で使用される共通ユーティリティを提供する。
//!
//! ## 設計方針
//!
//! - 他のすべてのクレート（domain, infra, mailer-service）から依存される
//! - ビジネスロジックを含まない純粋なユーティリティのみを配置
//! - 外部クレートへの依存は最小限に抑える
//!
//! ## モジュール構成
//!
//! - [`observability`] - トレーシング初期化とログ出力形式
//! - [`event_log`] - ビジネスイベントログの構造化ヘルパー

pub mod event_log;
pub mod observability;
