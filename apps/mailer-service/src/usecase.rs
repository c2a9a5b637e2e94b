//! # ユースケース層
//!
//! Mailer Service のビジネスロジックを実装する。
//!
//! ## 設計方針
//!
//! - **依存性注入**: コレクタ・レンダラー・メーラーを `Arc<dyn Trait>` で外部から注入
//! - **サイクル単位の失敗**: 失敗はそのサイクルだけで完結させ、スケジューラには伝えない
//!
//! ## モジュール構成
//!
//! - [`change_detection`] - 変更検知ジョブ
//! - [`notification`] - 通知本文のレンダリング

pub mod change_detection;
pub mod notification;

pub use change_detection::{ChangeDetectionJob, CycleError};
pub use notification::{NotificationRenderer, TemplateRenderer};
