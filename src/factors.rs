//! 日別係数と時刻別係数
use std::collections::BTreeMap;
use std::path::Path;

use time::Date;

use crate::config::parse_date;
use crate::readers::{parse_f64, parse_u8, read_csv_table, CsvTable};
use crate::{MeicError, MeicResult};

/// 時間配分係数を返す。
///
/// 係数は無次元の乗数で、正規化されているとは仮定しない。
pub trait FactorLookup {
    /// 部門`sector`の`date`の日別係数を返す。
    ///
    /// 日別係数は、月の排出量を各日に配分する。
    fn day_factor(&self, date: Date, sector: &str) -> MeicResult<f64>;

    /// 部門`sector`の`hour`時の時刻別係数を返す。
    ///
    /// 時刻別係数は、日の排出量を各時刻に配分する。
    fn hour_factor(&self, hour: u8, sector: &str) -> MeicResult<f64>;
}

/// CSVファイルから読み込んだ日別係数表と時刻別係数表
#[derive(Debug, Clone, Default)]
pub struct FactorTables {
    /// 日付ごとの部門別の日別係数
    day: BTreeMap<Date, BTreeMap<String, f64>>,

    /// 時刻ごとの部門別の時刻別係数
    hour: BTreeMap<u8, BTreeMap<String, f64>>,
}

impl FactorTables {
    /// 日別係数表と時刻別係数表を読み込む。
    ///
    /// # 引数
    ///
    /// * `day_path` - 日別係数表（`date,<部門>...`）のパス
    /// * `hour_path` - 時刻別係数表（`hour,<部門>...`）のパス
    pub fn load<P, Q>(day_path: P, hour_path: Q) -> MeicResult<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let day_table = read_csv_table(day_path)?;
        let hour_table = read_csv_table(hour_path)?;

        Self::from_tables(&day_table, &hour_table)
    }

    /// 読み込み済みの係数表から構築する。
    pub fn from_tables(day_table: &CsvTable, hour_table: &CsvTable) -> MeicResult<Self> {
        let day = rows_by_key(day_table, "date", "day-factor", parse_date)?;
        let hour = rows_by_key(hour_table, "hour", "hour-factor", |s| {
            let hour = parse_u8(s, "時刻")?;
            if 23 < hour {
                return Err(MeicError::Read(format!(
                    "時刻別係数表の時刻`{hour}`が0から23の範囲外です。"
                )));
            }
            Ok(hour)
        })?;

        Ok(Self { day, hour })
    }

    /// 日別係数を設定する。
    pub fn set_day_factor(&mut self, date: Date, sector: &str, factor: f64) {
        self.day
            .entry(date)
            .or_default()
            .insert(sector.to_string(), factor);
    }

    /// 時刻別係数を設定する。
    pub fn set_hour_factor(&mut self, hour: u8, sector: &str, factor: f64) {
        self.hour
            .entry(hour)
            .or_default()
            .insert(sector.to_string(), factor);
    }
}

impl FactorLookup for FactorTables {
    fn day_factor(&self, date: Date, sector: &str) -> MeicResult<f64> {
        self.day
            .get(&date)
            .and_then(|row| row.get(sector))
            .copied()
            .ok_or_else(|| MeicError::DayFactorMissing {
                sector: sector.to_string(),
                date,
            })
    }

    fn hour_factor(&self, hour: u8, sector: &str) -> MeicResult<f64> {
        self.hour
            .get(&hour)
            .and_then(|row| row.get(sector))
            .copied()
            .ok_or_else(|| MeicError::HourFactorMissing {
                sector: sector.to_string(),
                hour,
            })
    }
}

/// 最初の列をキー、残りの列を部門とみなして係数表を読み込む。
fn rows_by_key<K, F>(
    table: &CsvTable,
    key_name: &str,
    table_name: &str,
    parse_key: F,
) -> MeicResult<BTreeMap<K, BTreeMap<String, f64>>>
where
    K: Ord,
    F: Fn(&str) -> MeicResult<K>,
{
    let key_col = table.require_column(key_name, table_name)?;
    let mut rows = BTreeMap::new();
    for row in &table.rows {
        let key = parse_key(&row[key_col])?;
        let mut factors = BTreeMap::new();
        for (col, sector) in table.header.iter().enumerate() {
            if col == key_col {
                continue;
            }
            let factor = parse_f64(&row[col], &format!("`{table_name}`の`{sector}`列"))?;
            factors.insert(sector.clone(), factor);
        }
        if rows.insert(key, factors).is_some() {
            return Err(MeicError::Read(format!(
                "`{table_name}`の`{}`が重複しています。",
                row[key_col]
            )));
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::parse_csv_table;
    use time::macros::date;

    fn tables() -> FactorTables {
        let day = parse_csv_table(
            "date,industry,power\n2023-01-31,0.03,0.032\n2023-02-01,0.035,0\n".as_bytes(),
            "day",
        )
        .unwrap();
        let mut hour_text = String::from("hour,industry,power\n");
        for h in 0..24 {
            hour_text.push_str(&format!("{h},1.{h:02},1\n"));
        }
        let hour = parse_csv_table(hour_text.as_bytes(), "hour").unwrap();
        FactorTables::from_tables(&day, &hour).unwrap()
    }

    #[test]
    fn looks_up_day_and_hour_factors() {
        let tables = tables();
        assert_eq!(tables.day_factor(date!(2023-01-31), "industry").unwrap(), 0.03);
        assert_eq!(tables.day_factor(date!(2023-02-01), "power").unwrap(), 0.0);
        assert_eq!(tables.hour_factor(5, "industry").unwrap(), 1.05);
    }

    #[test]
    fn missing_entries_are_lookup_errors() {
        let tables = tables();
        assert!(matches!(
            tables.day_factor(date!(2023-03-01), "industry"),
            Err(MeicError::DayFactorMissing { .. })
        ));
        assert!(matches!(
            tables.day_factor(date!(2023-01-31), "transportation"),
            Err(MeicError::DayFactorMissing { .. })
        ));
        assert!(matches!(
            tables.hour_factor(3, "residential"),
            Err(MeicError::HourFactorMissing { sector, hour: 3 }) if sector == "residential"
        ));
    }

    #[test]
    fn rejects_bad_rows() {
        let day = parse_csv_table("date,industry\n2023-01-31,x\n".as_bytes(), "day").unwrap();
        let hour = parse_csv_table("hour,industry\n0,1\n".as_bytes(), "hour").unwrap();
        assert!(FactorTables::from_tables(&day, &hour).is_err());

        let day = parse_csv_table("date,industry\n2023-01-31,1\n".as_bytes(), "day").unwrap();
        let hour = parse_csv_table("hour,industry\n24,1\n".as_bytes(), "hour").unwrap();
        assert!(FactorTables::from_tables(&day, &hour).is_err());

        let hour = parse_csv_table("hour,industry\n1,1\n1,2\n".as_bytes(), "hour").unwrap();
        assert!(FactorTables::from_tables(&day, &hour).is_err());
    }

    #[test]
    fn setters_overwrite_entries() {
        let mut tables = FactorTables::default();
        tables.set_day_factor(date!(2023-01-01), "power", 0.5);
        tables.set_day_factor(date!(2023-01-01), "power", 0.25);
        tables.set_hour_factor(0, "power", 2.0);
        assert_eq!(tables.day_factor(date!(2023-01-01), "power").unwrap(), 0.25);
        assert_eq!(tables.hour_factor(0, "power").unwrap(), 2.0);
    }
}
