//! Noop 送信トランスポート
//!
//! メールを実際に送信せず、ログ出力のみ行う。
//! 開発環境やドライラン（`MAIL_TRANSPORT=noop`）で使用する。

use apptmail_domain::notification::MailMessage;
use async_trait::async_trait;

use super::{MailConnection, MailTransport, TransportError};

/// Noop 送信トランスポート（ログ出力のみ）
#[derive(Debug, Clone, Default)]
pub struct NoopTransport;

#[async_trait]
impl MailTransport for NoopTransport {
    async fn dial(&self) -> Result<Box<dyn MailConnection>, TransportError> {
        tracing::debug!("Noop: 接続をスキップ");
        Ok(Box::new(NoopConnection))
    }
}

struct NoopConnection;

#[async_trait]
impl MailConnection for NoopConnection {
    async fn send(&mut self, message: &MailMessage) -> Result<(), TransportError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            content_type = %message.content_type,
            body_len = message.body.len(),
            "Noop: メール送信をスキップ"
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
