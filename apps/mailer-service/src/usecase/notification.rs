//! # 通知ユースケース
//!
//! 予約変更の一覧から通知メールの本文を生成する。
//!
//! ## モジュール構成
//!
//! - [`template_renderer`] - tera テンプレートエンジンによる HTML 本文の生成

pub mod template_renderer;

use apptmail_domain::{ChangeRecord, notification::RenderError};
use chrono::{DateTime, Utc};
pub use template_renderer::TemplateRenderer;

/// 通知本文レンダラートレイト
///
/// 空の一覧も受け付け、「変更なし」の本文を返すこと。
pub trait NotificationRenderer: Send + Sync {
    /// カーソル（前回実行時刻）と変更一覧から HTML 本文を生成する
    fn render(&self, since: DateTime<Utc>, changes: &[ChangeRecord]) -> Result<String, RenderError>;
}
