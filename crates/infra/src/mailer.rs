//! # メール送信
//!
//! 通知メールの送信を担当するインフラストラクチャモジュール。
//!
//! ## 設計方針
//!
//! - **デーモンが接続を専有**: [`MailerDaemon`] の単一ワーカーだけが
//!   送信トランスポートの接続を保持し、すべての送信を直列化する
//! - **接続の再利用とアイドルクローズ**: 連続した送信では接続を使い回し、
//!   一定時間送信が無ければ閉じる
//! - **trait による抽象化**: 接続の確立は [`MailTransport`]、
//!   確立済み接続での送信は [`MailConnection`] で抽象化する
//! - **2 つの実装**: SMTP（lettre）、Noop（ログ出力のみ）
//! - **fire-and-forget**: 接続・送信の失敗はワーカー内でログに残すだけで、
//!   [`MailSender::send`] の呼び出し元には伝えない

mod daemon;
mod noop;
mod smtp;

use apptmail_domain::notification::MailMessage;
use async_trait::async_trait;
pub use daemon::{DEFAULT_IDLE_TIMEOUT, MailerConfig, MailerDaemon};
pub use noop::NoopTransport;
pub use smtp::{SmtpSettings, SmtpTransport};
use thiserror::Error;

/// メーラーデーモンの状態エラー
///
/// `run` / `send` の呼び出し元に同期的に返される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MailerError {
    /// デーモンが起動していない（または停止済み）
    #[error("メーラーデーモンが起動していません")]
    NotRunning,

    /// デーモンが既に起動している
    #[error("メーラーデーモンは既に起動しています")]
    AlreadyRunning,
}

/// メール送信トランスポートのエラー
///
/// ワーカー内でログに記録され、呼び出し元には伝播しない。
#[derive(Debug, Error)]
pub enum TransportError {
    /// サーバーへの接続（認証を含む）に失敗
    #[error("メールサーバーへの接続に失敗: {0}")]
    Dial(String),

    /// 確立済み接続での送信に失敗
    #[error("メール送信に失敗: {0}")]
    Send(String),

    /// 接続のクローズに失敗
    #[error("メールサーバーとの切断に失敗: {0}")]
    Close(String),

    /// アドレスやコンテンツタイプが不正でメッセージを組み立てられない
    #[error("メッセージ構築失敗: {0}")]
    InvalidMessage(String),
}

/// メール送信トレイト
///
/// 変更検知ジョブから見たメーラーの契約。
/// 送信元・宛先・件名は実装側の設定で決まる。
#[async_trait]
pub trait MailSender: Send + Sync {
    /// 本文をメーラーに引き渡す
    ///
    /// 引き渡しが完了した時点で `Ok` を返す。実際の配送結果は返さない。
    async fn send(&self, content_type: &str, body: String) -> Result<(), MailerError>;
}

/// メール送信トランスポート
///
/// 送信用の接続を確立する。確立した接続の寿命はメーラーデーモンが管理する。
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// サーバーに接続する
    async fn dial(&self) -> Result<Box<dyn MailConnection>, TransportError>;
}

/// 確立済みのメール送信接続
#[async_trait]
pub trait MailConnection: Send {
    /// メッセージを 1 通送信する。接続は送信後も再利用できる
    async fn send(&mut self, message: &MailMessage) -> Result<(), TransportError>;

    /// 接続を閉じる
    async fn close(&mut self) -> Result<(), TransportError>;
}
