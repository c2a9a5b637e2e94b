//! # ジョブカーソル
//!
//! 変更検知ジョブが「最後に成功した実行時刻」を保持する。
//! 次のサイクルはこの時刻より後に記録された変更だけを問い合わせる。
//!
//! ## 不変条件
//!
//! - 値は単調非減少（[`JobCursor::advance_to`] は過去に戻さない）
//! - 進めるのはサイクル全体（取得・レンダリング・送信）が成功したときだけ。
//!   失敗したサイクルの区間は次のサイクルでそのまま再試行される
//! - プロセス再起動をまたいで永続化しない

use chrono::{DateTime, Utc};

/// 変更検知ジョブのカーソル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobCursor {
    last_run: DateTime<Utc>,
}

impl JobCursor {
    pub fn new(initial: DateTime<Utc>) -> Self {
        Self { last_run: initial }
    }

    /// 最後に成功したサイクルの開始時刻
    pub fn last_run(&self) -> DateTime<Utc> {
        self.last_run
    }

    /// カーソルをサイクル開始時刻まで進める
    ///
    /// `cycle_start` が現在値より前（システム時計の巻き戻りなど）の場合は
    /// 何もせず `false` を返す。
    pub fn advance_to(&mut self, cycle_start: DateTime<Utc>) -> bool {
        if cycle_start < self.last_run {
            return false;
        }
        self.last_run = cycle_start;
        true
    }
}
