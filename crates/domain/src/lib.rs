//! # apptmail ドメイン層
//!
//! 予約変更通知の中核となるドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **値オブジェクト**: 変更ログから正規化した [`change::ChangeRecord`] は不変
//! - **カーソル**: 「最後に成功した実行時刻」を [`cursor::JobCursor`] で表現し、
//!   後退しないことを型の操作で保証する
//! - **インフラ非依存**: DB ドライバや SMTP クライアントには一切依存しない
//!
//! ## 依存関係の方向
//!
//! ```text
//! mailer-service → infra → domain
//!        ↘                    ↑
//!          ───────────────────
//! ```
//!
//! ## モジュール構成
//!
//! - [`change`] - 予約変更イベントと変更ログ行のデコード
//! - [`cursor`] - 変更検知ジョブのカーソル
//! - [`clock`] - 時刻プロバイダ
//! - [`notification`] - メールメッセージとレンダリングエラー

pub mod change;
pub mod clock;
pub mod cursor;
pub mod notification;

pub use change::{ChangeDecodeError, ChangeLogEntry, ChangeRecord, SubjectId};
pub use cursor::JobCursor;
