//! 出力する化学種
use std::collections::HashMap;
use std::path::Path;

use crate::readers::{read_csv_table, CsvTable};
use crate::{MeicError, MeicResult};

/// I/O APIの変数名の最大長
pub const NAME_WIDTH: usize = 16;

/// 出力する化学種
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Species {
    /// モデルの化学種コード（出力変数名）
    pub code: String,

    /// 対応するインベントリの化学種
    pub inventory_code: String,

    /// 単位
    ///
    /// 単位は属性として記録するだけで、値の換算はしない。
    pub units: String,
}

/// 出力する化学種の順序付きリスト
///
/// リストの順番が、出力ファイルの変数の順番になる。
/// 同じ化学種コードは1つにまとめ、最初に現れたものを採用する。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeciesList {
    species: Vec<Species>,
}

impl SpeciesList {
    /// 化学種対応表と単位表から化学種のリストを構築する。
    ///
    /// # 引数
    ///
    /// * `map_path` - 化学種対応表（`model_spec,meic_spec`）のパス
    /// * `unit_path` - 単位表（`var,units`）のパス
    pub fn load<P, Q>(map_path: P, unit_path: Q) -> MeicResult<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let map_table = read_csv_table(map_path)?;
        let unit_table = read_csv_table(unit_path)?;

        Self::from_tables(&map_table, &unit_table)
    }

    /// 読み込み済みの化学種対応表と単位表から化学種のリストを構築する。
    pub fn from_tables(map_table: &CsvTable, unit_table: &CsvTable) -> MeicResult<Self> {
        let model_col = map_table.require_column("model_spec", "species-map")?;
        let meic_col = map_table.require_column("meic_spec", "species-map")?;
        let var_col = unit_table.require_column("var", "species-unit")?;
        let units_col = unit_table.require_column("units", "species-unit")?;

        let units: HashMap<&str, &str> = unit_table
            .rows
            .iter()
            .map(|row| (row[var_col].as_str(), row[units_col].as_str()))
            .collect();
        let pairs = map_table
            .rows
            .iter()
            .map(|row| (row[model_col].as_str(), row[meic_col].as_str()));

        Self::from_pairs(pairs, |code| units.get(code).map(|u| u.to_string()))
    }

    /// 化学種コードとインベントリの化学種の組み合わせから、化学種のリストを構築する。
    ///
    /// # 引数
    ///
    /// * `pairs` - モデルの化学種コードとインベントリの化学種の組み合わせ
    /// * `units` - 化学種コードから単位を返す関数
    pub fn from_pairs<'a, I, U>(pairs: I, units: U) -> MeicResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
        U: Fn(&str) -> Option<String>,
    {
        let mut species: Vec<Species> = Vec::new();
        for (code, inventory_code) in pairs {
            if code.is_empty() {
                return Err(MeicError::Config(String::from(
                    "化学種対応表に空の化学種コードがあります。",
                )));
            }
            if NAME_WIDTH < code.len() {
                return Err(MeicError::Config(format!(
                    "化学種コード`{code}`が{NAME_WIDTH}文字を超えています。"
                )));
            }
            if species.iter().any(|s| s.code == code) {
                continue;
            }
            let units = units(code).ok_or_else(|| {
                MeicError::Config(format!("化学種`{code}`の単位が単位表にありません。"))
            })?;
            species.push(Species {
                code: code.to_string(),
                inventory_code: inventory_code.to_string(),
                units,
            });
        }
        if species.is_empty() {
            return Err(MeicError::Config(String::from(
                "出力する化学種がありません。",
            )));
        }

        Ok(Self { species })
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Species> {
        self.species.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Species> {
        self.species.get(index)
    }

    /// 化学種コードを順に返す。
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.species.iter().map(|s| s.code.as_str())
    }

    /// `VAR-LIST`属性の値を返す。
    ///
    /// 化学種コードを16文字に空白で埋めて連結する。
    pub fn var_list(&self) -> String {
        self.codes().map(|code| pad(code, NAME_WIDTH)).collect()
    }
}

impl<'a> IntoIterator for &'a SpeciesList {
    type Item = &'a Species;
    type IntoIter = std::slice::Iter<'a, Species>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// 文字列の末尾を空白で埋めて`width`文字にする。
///
/// `width`文字を超える文字列は切り詰めない。
pub fn pad(s: &str, width: usize) -> String {
    format!("{s:<width$}")
}
