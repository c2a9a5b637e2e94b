//! # 通知
//!
//! 予約変更通知メールに関するドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **単一宛先**: 送信元・宛先・件名は設定で固定され、メッセージごとに変わるのは
//!   コンテンツタイプと本文だけ
//! - **エスケープは呼び出し側の責務**: [`MailMessage`] の本文はそのまま送信される
//! - **テンプレート分離**: レンダリングのエラー型だけをここに置き、
//!   テンプレートエンジン自体は mailer-service 側に閉じ込める

use thiserror::Error;

/// HTML 本文のコンテンツタイプ
pub const CONTENT_TYPE_HTML: &str = "text/html";

/// メールメッセージ
///
/// メーラーデーモンが組み立て、メール送信トランスポートに渡される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    /// 送信元メールアドレス
    pub from:         String,
    /// 送信先メールアドレス
    pub to:           String,
    /// 件名
    pub subject:      String,
    /// 本文のコンテンツタイプ（例: `text/html`）
    pub content_type: String,
    /// 本文
    pub body:         String,
}

/// 通知本文のレンダリングエラー
#[derive(Debug, Error)]
pub enum RenderError {
    /// テンプレートの登録（構文解析）に失敗
    #[error("テンプレートの登録に失敗: {0}")]
    TemplateRegistration(String),

    /// テンプレートとデータの不整合などでレンダリングに失敗
    #[error("テンプレートレンダリングに失敗: {0}")]
    Rendering(String),
}
