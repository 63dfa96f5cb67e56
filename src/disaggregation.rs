//! 月排出量の時間配分
//!
//! 1つの化学種の時刻別排出量は、部門ごとに
//! `月排出量 * 日別係数 * 時刻別係数`を計算して合算したものである。
//! 正規化、切り捨て、単位換算はしない。
use ndarray::Array3;
use time::PrimitiveDateTime;
use tracing::trace;

use crate::factors::FactorLookup;
use crate::inventory::{InventoryLoader, MonthlySectorField};
use crate::species::Species;
use crate::{MeicError, MeicResult};

/// 部門別の月排出量を時刻`dt`の排出量に配分する。
///
/// 係数が0の部門も読み飛ばさずに乗算して加える。
///
/// # 引数
///
/// * `monthly` - 部門別の月排出量
/// * `dt` - 時刻
/// * `shape` - モデル格子の形状（層、行、列）
/// * `factors` - 時間配分係数
///
/// # 戻り値
///
/// 時刻別排出量（層、行、列）
pub fn disaggregate<F>(
    monthly: &MonthlySectorField,
    dt: PrimitiveDateTime,
    shape: (usize, usize, usize),
    factors: &F,
) -> MeicResult<Array3<f64>>
where
    F: FactorLookup + ?Sized,
{
    let mut hourly = Array3::<f64>::zeros(shape);
    for field in monthly.iter() {
        if field.values.dim() != shape {
            return Err(MeicError::GridShapeMismatch {
                source_name: field.sector.clone(),
                expected: shape,
                actual: field.values.dim(),
            });
        }
        let day_factor = factors.day_factor(dt.date(), &field.sector)?;
        let hour_factor = factors.hour_factor(dt.hour(), &field.sector)?;
        trace!(sector = %field.sector, day_factor, hour_factor, "部門を合算します");
        hourly.scaled_add(day_factor * hour_factor, &field.values);
    }

    Ok(hourly)
}

/// インベントリと時間配分係数から、化学種ごとの時刻別排出量を計算する。
pub struct Disaggregator<'a, L: ?Sized, F: ?Sized> {
    inventory: &'a L,
    factors: &'a F,
    shape: (usize, usize, usize),
}

impl<'a, L, F> Disaggregator<'a, L, F>
where
    L: InventoryLoader + ?Sized,
    F: FactorLookup + ?Sized,
{
    /// # 引数
    ///
    /// * `inventory` - 月別・部門別排出量
    /// * `factors` - 時間配分係数
    /// * `shape` - モデル格子の形状（層、行、列）
    pub fn new(inventory: &'a L, factors: &'a F, shape: (usize, usize, usize)) -> Self {
        Self {
            inventory,
            factors,
            shape,
        }
    }

    /// 化学種`species`の時刻`dt`の排出量を返す。
    ///
    /// インベントリは`dt`の年月で検索するため、月をまたぐ時刻スロットでは
    /// 翌月のインベントリを参照する。
    pub fn hourly_field(
        &self,
        species: &Species,
        dt: PrimitiveDateTime,
    ) -> MeicResult<Array3<f64>> {
        let monthly = self.inventory.monthly_fields(dt.year(), dt.month(), species)?;
        if monthly.is_empty() {
            return Err(MeicError::SpeciesNotInInventory {
                species: species.code.clone(),
                inventory_species: species.inventory_code.clone(),
                year: dt.year(),
                month: dt.month(),
            });
        }

        disaggregate(&monthly, dt, self.shape, self.factors)
    }
}
