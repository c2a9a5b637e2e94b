//! # ビジネスイベントログとエラーコンテキストの構造化ヘルパー
//!
//! 変更検知サイクルとメール配送の結果を `jq` で追跡できるよう、
//! ログフィールドの命名規約とヘルパーマクロを提供する。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! ## エラーコンテキスト
//!
//! `tracing::error!` に `error.category` + `error.kind` フィールドを直接追加する。
//! 定数は [`error`] モジュールで提供。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`error.kind`）を使用。tracing の
//! `$($field:ident).+` パターンでサポートされ、JSON 出力でフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` マーカーを自動付与し、
/// `tracing::info!` レベルで出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: イベントカテゴリ（[`event::category`] の定数を使用）
/// - `event.action`: アクション名（[`event::action`] の定数を使用）
/// - `event.result`: 結果（[`event::result`] の定数を使用）
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const CHANGE_DETECTION: &str = "change_detection";
        pub const MAIL: &str = "mail";
    }

    /// イベントアクション
    pub mod action {
        // 変更検知
        pub const CYCLE_COMPLETED: &str = "cycle.completed";
        pub const CYCLE_FAILED: &str = "cycle.failed";

        // メール配送
        pub const MAIL_SENT: &str = "mail.sent";
        pub const MAIL_FAILED: &str = "mail.failed";
        pub const MAIL_SKIPPED: &str = "mail.skipped";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（変更ログ DB）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 外部サービス呼び出し（SMTP サーバー）
        pub const EXTERNAL_SERVICE: &str = "external_service";
        /// アプリケーション内部（テンプレート、デーモン状態）
        pub const INTERNAL: &str = "internal";
    }

    /// エラー種別
    pub mod kind {
        pub const COLLECTION: &str = "collection";
        pub const RENDER: &str = "render";
        pub const DAEMON_NOT_RUNNING: &str = "daemon_not_running";
        pub const DAEMON_ALREADY_RUNNING: &str = "daemon_already_running";
        pub const SMTP_DIAL: &str = "smtp_dial";
        pub const SMTP_SEND: &str = "smtp_send";
        pub const SMTP_CLOSE: &str = "smtp_close";
    }
}
