//! # Mailer Service ライブラリ
//!
//! 設定・スケジューラ・ユースケースを公開する。
//! バイナリ（`main.rs`）と統合テストの両方から使用する。

pub mod config;
pub mod scheduler;
pub mod usecase;
