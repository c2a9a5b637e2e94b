//! # テンプレートレンダラー
//!
//! tera テンプレートエンジンで予約変更通知の HTML 本文を生成する。
//!
//! ## 設計方針
//!
//! - **`include_str!` によるコンパイル時埋め込み**: テンプレートはバイナリに埋め込まれる
//! - **自動エスケープ**: テンプレート名が `.html` で終わるため、tera が値を HTML エスケープする。
//!   メーラーデーモンは本文を加工しないので、エスケープはここで完結させる
//! - **日時表記**: `DD.MM.YYYY HH:MM`（ウィーン時間）
//!
//! ## テンプレートに渡す値
//!
//! | キー | 内容 |
//! |------|------|
//! | `since` | 前回実行時刻 |
//! | `has_changes` | 変更が 1 件以上あるか |
//! | `changes[].occurs_at` | 予約日時 |
//! | `changes[].subject_name` | 患者名 |
//! | `changes[].subject_id` | 患者番号 |
//! | `changes[].is_creation` | 予約なら `true`、キャンセルなら `false` |

use apptmail_domain::{ChangeRecord, change::APPOINTMENT_TIMEZONE, notification::RenderError};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tera::{Context, Tera};

use super::NotificationRenderer;

/// テンプレート名
const CHANGED_APPOINTMENTS_TEMPLATE: &str = "changed_appointments.html";

/// 通知本文の日時表記（例: `01.02.2024 08:30`）
pub const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

/// テンプレートに渡す 1 件分の変更
#[derive(Debug, Serialize)]
struct ChangeView<'a> {
    occurs_at:    String,
    subject_name: &'a str,
    subject_id:   i32,
    is_creation:  bool,
}

impl<'a> From<&'a ChangeRecord> for ChangeView<'a> {
    fn from(record: &'a ChangeRecord) -> Self {
        Self {
            occurs_at:    format_date_time(&record.occurs_at()),
            subject_name: record.subject_name(),
            subject_id:   record.subject_id().as_i32(),
            is_creation:  record.is_creation(),
        }
    }
}

/// 日時を通知本文の表記に整形する
fn format_date_time<Tz: TimeZone>(value: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    value.format(DATE_TIME_FORMAT).to_string()
}

/// テンプレートレンダラー
///
/// tera テンプレートエンジンをラップし、変更一覧から HTML 本文を生成する。
pub struct TemplateRenderer {
    engine: Tera,
}

impl TemplateRenderer {
    /// 新しいレンダラーインスタンスを作成
    ///
    /// `include_str!` で埋め込んだテンプレートを tera に登録する。
    pub fn new() -> Result<Self, RenderError> {
        let mut engine = Tera::default();

        engine
            .add_raw_template(
                CHANGED_APPOINTMENTS_TEMPLATE,
                include_str!("../../../templates/notifications/changed_appointments.html"),
            )
            .map_err(|e| RenderError::TemplateRegistration(e.to_string()))?;

        Ok(Self { engine })
    }

    fn build_context(since: DateTime<Utc>, changes: &[ChangeRecord]) -> Context {
        let views: Vec<ChangeView<'_>> = changes.iter().map(ChangeView::from).collect();

        let mut context = Context::new();
        context.insert(
            "since",
            &format_date_time(&since.with_timezone(&APPOINTMENT_TIMEZONE)),
        );
        context.insert("has_changes", &!views.is_empty());
        context.insert("changes", &views);
        context
    }
}

impl NotificationRenderer for TemplateRenderer {
    fn render(&self, since: DateTime<Utc>, changes: &[ChangeRecord]) -> Result<String, RenderError> {
        let context = Self::build_context(since, changes);

        self.engine
            .render(CHANGED_APPOINTMENTS_TEMPLATE, &context)
            .map_err(|e| RenderError::Rendering(e.to_string()))
    }
}
