//! 月別・部門別の排出インベントリ
//!
//! インベントリはモデル格子に内挿済みのESRI ASCII格子として読み込む。
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ndarray::{Array2, Array3, Axis};
use time::Month;
use tracing::debug;

use crate::readers::read_ascii_grid;
use crate::species::Species;
use crate::{MeicError, MeicResult};

/// 部門別の月排出量
#[derive(Debug, Clone, PartialEq)]
pub struct SectorField {
    /// 部門
    pub sector: String,

    /// 月排出量（層、行、列）
    pub values: Array3<f64>,
}

/// 1つの化学種、1つの月の部門別排出量
///
/// 部門は追加した順番に保持する。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlySectorField {
    sectors: Vec<SectorField>,
}

impl MonthlySectorField {
    pub fn new() -> Self {
        Self::default()
    }

    /// 部門の月排出量を追加する。
    ///
    /// 既に同じ部門がある場合は、値を置き換える。
    pub fn insert(&mut self, sector: &str, values: Array3<f64>) {
        match self.sectors.iter_mut().find(|s| s.sector == sector) {
            Some(existing) => existing.values = values,
            None => self.sectors.push(SectorField {
                sector: sector.to_string(),
                values,
            }),
        }
    }

    pub fn get(&self, sector: &str) -> Option<&Array3<f64>> {
        self.sectors
            .iter()
            .find(|s| s.sector == sector)
            .map(|s| &s.values)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SectorField> {
        self.sectors.iter()
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }
}

impl FromIterator<(String, Array3<f64>)> for MonthlySectorField {
    fn from_iter<T: IntoIterator<Item = (String, Array3<f64>)>>(iter: T) -> Self {
        let mut field = Self::new();
        for (sector, values) in iter {
            field.insert(&sector, values);
        }
        field
    }
}

/// 月別・部門別の排出量を返す。
pub trait InventoryLoader {
    /// `year`年`month`月の化学種`species`の部門別排出量を返す。
    ///
    /// 化学種がインベントリに存在しない場合は`MeicError::SpeciesNotInInventory`を返す。
    fn monthly_fields(
        &self,
        year: i32,
        month: Month,
        species: &Species,
    ) -> MeicResult<Rc<MonthlySectorField>>;
}

/// モデル格子に内挿済みのMEIC ASCII格子ファイルを読み込む`InventoryLoader`
///
/// ファイルは`<dir>/<YYYY>_<MM>__<部門>__<化学種>.asc`に配置する。
/// 格子は最下層に配置し、それより上の層は0とする。
///
/// 読み込んだ排出量は月が変わるまでキャッシュする。
#[derive(Debug)]
pub struct MeicInventory {
    /// インベントリのディレクトリ
    dir: PathBuf,

    /// 排出部門
    sectors: Vec<String>,

    /// モデル格子の形状（層、行、列）
    shape: (usize, usize, usize),

    /// 現在の月の排出量
    cache: RefCell<MonthCache>,
}

#[derive(Debug, Default)]
struct MonthCache {
    month: Option<(i32, Month)>,
    fields: HashMap<String, Rc<MonthlySectorField>>,
}

impl MeicInventory {
    /// # 引数
    ///
    /// * `dir` - インベントリのディレクトリ
    /// * `sectors` - 排出部門
    /// * `shape` - モデル格子の形状（層、行、列）
    pub fn new<P>(dir: P, sectors: &[String], shape: (usize, usize, usize)) -> Self
    where
        P: AsRef<Path>,
    {
        Self {
            dir: dir.as_ref().to_owned(),
            sectors: sectors.to_vec(),
            shape,
            cache: RefCell::new(MonthCache::default()),
        }
    }

    /// 部門・化学種の月排出量ファイルのパスを返す。
    pub fn file_path(
        &self,
        year: i32,
        month: Month,
        sector: &str,
        inventory_code: &str,
    ) -> PathBuf {
        self.dir.join(format!(
            "{year}_{:02}__{sector}__{inventory_code}.asc",
            month as u8
        ))
    }

    fn read_sector(&self, path: &Path) -> MeicResult<Array3<f64>> {
        let grid = read_ascii_grid(path)?;
        let (nlays, nrows, ncols) = self.shape;
        if grid.nrows != nrows || grid.ncols != ncols {
            return Err(MeicError::GridShapeMismatch {
                source_name: path.display().to_string(),
                expected: self.shape,
                actual: (1, grid.nrows, grid.ncols),
            });
        }
        let surface = Array2::from_shape_vec((nrows, ncols), grid.values).map_err(|e| {
            MeicError::Unexpected(format!("`{}`を配列に変換できません。{e}", path.display()))
        })?;
        let mut values = Array3::zeros((nlays, nrows, ncols));
        values.index_axis_mut(Axis(0), 0).assign(&surface);

        Ok(values)
    }
}

impl InventoryLoader for MeicInventory {
    fn monthly_fields(
        &self,
        year: i32,
        month: Month,
        species: &Species,
    ) -> MeicResult<Rc<MonthlySectorField>> {
        let mut cache = self.cache.borrow_mut();
        if cache.month != Some((year, month)) {
            cache.fields.clear();
            cache.month = Some((year, month));
        }
        if let Some(fields) = cache.fields.get(&species.inventory_code) {
            return Ok(Rc::clone(fields));
        }

        let mut fields = MonthlySectorField::new();
        for sector in &self.sectors {
            let path = self.file_path(year, month, sector, &species.inventory_code);
            if !path.is_file() {
                debug!(path = %path.display(), "部門のインベントリがありません");
                continue;
            }
            fields.insert(sector, self.read_sector(&path)?);
        }
        if fields.is_empty() {
            return Err(MeicError::SpeciesNotInInventory {
                species: species.code.clone(),
                inventory_species: species.inventory_code.clone(),
                year,
                month,
            });
        }
        debug!(
            species = %species.code,
            year,
            month = month as u8,
            sectors = fields.len(),
            "インベントリを読み込みました"
        );
        let fields = Rc::new(fields);
        cache
            .fields
            .insert(species.inventory_code.clone(), Rc::clone(&fields));

        Ok(fields)
    }
}
