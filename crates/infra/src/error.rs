//! # インフラ層エラー定義
//!
//! 変更ログ DB との通信や行のデコードで発生するエラーを表現する。
//!
//! ## 構造
//!
//! `std::io::Error` と同じ struct + enum パターンを採用:
//! - [`InfraError`]: エラー種別（[`InfraErrorKind`]）と [`SpanTrace`] を保持するラッパー
//! - [`InfraErrorKind`]: エラーの具体的な種別（Database, Decode 等）
//!
//! `From` 実装はエラー生成時点の
//! スパン情報を自動的にキャプチャする。

use std::fmt;

use apptmail_domain::ChangeDecodeError;
use derive_more::Display;
use thiserror::Error;
use tracing_error::SpanTrace;

/// インフラ層で発生するエラー
///
/// エラー種別に応じた処理には [`kind()`](InfraError::kind) を使用する:
///
/// ```ignore
/// match error.kind() {
///     InfraErrorKind::Decode(e) => { /* 不正な行 */ }
///     _ => { /* その他 */ }
/// }
/// ```
#[derive(Display)]
#[display("{kind}")]
pub struct InfraError {
    kind:       InfraErrorKind,
    span_trace: SpanTrace,
}

/// インフラ層エラーの種別
#[derive(Debug, Error)]
pub enum InfraErrorKind {
    /// データベースエラー
    ///
    /// 接続失敗、クエリの実行失敗、カラム型の不一致など。
    #[error("データベースエラー: {0}")]
    Database(#[source] sqlx::Error),

    /// 変更ログ行をデコードできない
    ///
    /// 行を黙って捨てず、取得全体を失敗させる。
    #[error("変更ログ行のデコードに失敗: {0}")]
    Decode(#[source] ChangeDecodeError),
}

impl InfraError {
    pub fn kind(&self) -> &InfraErrorKind {
        &self.kind
    }

    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    pub fn into_parts(self) -> (InfraErrorKind, SpanTrace) {
        (self.kind, self.span_trace)
    }
}

impl fmt::Debug for InfraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfraError")
            .field("kind", &self.kind)
            .field("span_trace", &self.span_trace)
            .finish()
    }
}

impl std::error::Error for InfraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

impl From<sqlx::Error> for InfraError {
    fn from(source: sqlx::Error) -> Self {
        Self {
            kind:       InfraErrorKind::Database(source),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl From<ChangeDecodeError> for InfraError {
    fn from(source: ChangeDecodeError) -> Self {
        Self {
            kind:       InfraErrorKind::Decode(source),
            span_trace: SpanTrace::capture(),
        }
    }
}
