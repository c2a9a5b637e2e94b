//! # apptmail インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 責務
//!
//! - **データベース接続**: 変更ログを保持する PostgreSQL への接続プール管理
//! - **変更の取得**: 変更ログから予約変更を読み出す [`collector::ChangeCollector`]
//! - **メール送信**: 送信接続を専有する [`mailer::MailerDaemon`] と
//!   SMTP / Noop の送信トランスポート
//!
//! ## 依存関係
//!
//! ```text
//! mailer-service → infra → domain
//!                    ↘
//!                     shared
//! ```
//!
//! ドメイン層はインフラ層に依存しない（依存性逆転の原則）。
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL データベース接続管理
//! - [`collector`] - 予約変更の取得
//! - [`mailer`] - メーラーデーモンと送信トランスポート
//! - [`error`] - インフラ層エラー定義
//! - `mock` - テスト用インメモリモック（`test-utils` feature）
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use apptmail_infra::{collector::PostgresChangeCollector, db};
//!
//! async fn setup() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = db::create_pool("postgres://localhost/praxis").await?;
//!     let collector = PostgresChangeCollector::new(pool);
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod db;
pub mod error;
pub mod mailer;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use collector::{ChangeCollector, PostgresChangeCollector};
pub use error::{InfraError, InfraErrorKind};
pub use mailer::{MailSender, MailerDaemon, MailerError};
