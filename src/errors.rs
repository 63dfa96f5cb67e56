//! meic-ctmのエラー型
use time::{Date, Month};

/// meic-ctmエラー型
#[derive(Debug, Clone, thiserror::Error)]
pub enum MeicError {
    /// 予期しない例外
    #[error("{0}")]
    Unexpected(String),

    /// 設定エラー
    #[error("設定が不正です。{0}")]
    Config(String),

    /// 投影法定義文字列のエラー
    #[error("投影法の定義が不正です。{0}")]
    Projection(String),

    /// ファイル・オープン・エラー
    #[error("ファイルを開くときにエラーが発生しました。{0}")]
    Open(String),

    /// ファイル読み込みエラー
    #[error("ファイルの読み込みに失敗しました。{0}")]
    Read(String),

    /// ファイル書き込みエラー
    #[error("ファイルの書き込みに失敗しました。{0}")]
    Write(String),

    /// 出力する化学種がインベントリに存在しない
    #[error("化学種`{species}`({inventory_species})のインベントリが{year}年{month}月に存在しません。")]
    SpeciesNotInInventory {
        species: String,
        inventory_species: String,
        year: i32,
        month: Month,
    },

    /// 日別係数が存在しない
    #[error("部門`{sector}`の{date}の日別係数が存在しません。")]
    DayFactorMissing { sector: String, date: Date },

    /// 時刻別係数が存在しない
    #[error("部門`{sector}`の{hour}時の時刻別係数が存在しません。")]
    HourFactorMissing { sector: String, hour: u8 },

    /// 格子の形状が一致しない
    #[error("`{source_name}`の格子の形状{actual:?}が、モデル格子の形状{expected:?}と一致しません。")]
    GridShapeMismatch {
        source_name: String,
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    /// 出力ファイル・ライターの状態が不正
    #[error("出力ファイル・ライターの状態が不正です。{0}")]
    WriterState(String),

    /// 書き込まれていない時刻スロットが残っている
    #[error("`{path}`に書き込まれていない時刻スロットがあります。`{missing}`")]
    IncompleteFile { path: String, missing: String },
}

/// meic-ctm結果型
pub type MeicResult<T> = Result<T, MeicError>;
