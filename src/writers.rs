//! I/O API形式の格子ファイルの書き込み
//!
//! 1日に1つのファイルを作成する。ファイルの構造（次元、大域属性、変数）は
//! `FileLayout`として書き込みライブラリとは独立に構築し、`GridFileBackend`が
//! 1回で適用する。
//!
//! ファイルは`<ファイル名>.partial`に作成し、すべての時刻スロットを書き込んで
//! から本来のファイル名に変更する。途中でエラーが発生した場合は作成中の
//! ファイルを削除する。
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ndarray::Array3;
use time::{Date, PrimitiveDateTime};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::species::{pad, SpeciesList, NAME_WIDTH};
use crate::{MeicError, MeicResult};

/// 変数の説明の幅
pub const DESC_WIDTH: usize = 80;

/// `FILEDESC`属性
const FILE_DESCRIPTION: &str = "Emission aconc generated by meic";

/// `UPNAM`属性
const UPDATE_NAME: &str = "MEIC2";

/// `EXEC_ID`属性
const EXEC_ID: &str = "__EP_CMAQ__";

/// 時刻スロットの間隔（HHMMSS）
const TIME_STEP: i32 = 10000;

/// ファイル種別（格子ファイル）
const FILE_TYPE: i32 = 1;

/// 境界の厚さ
const NTHIK: i32 = 1;

/// 鉛直座標の種別
const VERTICAL_GRID_TYPE: i32 = 7;

/// モデル上端の気圧
const VERTICAL_GRID_TOP: i32 = 10000;

/// 時刻フラグ変数名
pub const TFLAG: &str = "TFLAG";

/// 属性値の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Text,
    Int,
    Double,
    Floats,
}

/// 属性値
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Int(i32),
    Double(f64),
    Floats(Vec<f32>),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            Self::Text(_) => AttributeKind::Text,
            Self::Int(_) => AttributeKind::Int,
            Self::Double(_) => AttributeKind::Double,
            Self::Floats(_) => AttributeKind::Floats,
        }
    }
}

/// 属性
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: &'static str,
    pub value: AttributeValue,
}

impl Attribute {
    fn text(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: AttributeValue::Text(value.into()),
        }
    }

    fn int(name: &'static str, value: i32) -> Self {
        Self {
            name,
            value: AttributeValue::Int(value),
        }
    }

    fn double(name: &'static str, value: f64) -> Self {
        Self {
            name,
            value: AttributeValue::Double(value),
        }
    }

    pub fn kind(&self) -> AttributeKind {
        self.value.kind()
    }
}

/// 次元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    pub name: &'static str,

    /// 次元の長さ
    ///
    /// `None`の場合は無制限次元
    pub len: Option<usize>,
}

/// 変数の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// `TFLAG`（int、`TSTEP`x`VAR`x`DATE-TIME`）
    TimeFlag,

    /// 化学種の排出量（float、`TSTEP`x`LAY`x`ROW`x`COL`）
    Field,
}

impl VariableKind {
    /// 変数の次元名を返す。
    pub fn dimensions(&self) -> &'static [&'static str] {
        match self {
            Self::TimeFlag => &["TSTEP", "VAR", "DATE-TIME"],
            Self::Field => &["TSTEP", "LAY", "ROW", "COL"],
        }
    }
}

/// 変数の定義
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub kind: VariableKind,
    pub attributes: Vec<Attribute>,
}

/// 出力ファイルの構造
#[derive(Debug, Clone, PartialEq)]
pub struct FileLayout {
    pub dimensions: Vec<Dimension>,
    pub global_attributes: Vec<Attribute>,
    pub variables: Vec<VariableDefinition>,
}

impl FileLayout {
    /// 最初の時刻スロットが`first_slot`のファイルの構造を構築する。
    pub fn new(settings: &Settings, first_slot: PrimitiveDateTime) -> MeicResult<Self> {
        let grid = &settings.grid;
        let dimensions = vec![
            Dimension {
                name: "TSTEP",
                len: None,
            },
            Dimension {
                name: "LAY",
                len: Some(grid.nlays),
            },
            Dimension {
                name: "ROW",
                len: Some(grid.nrows),
            },
            Dimension {
                name: "COL",
                len: Some(grid.ncols),
            },
            Dimension {
                name: "VAR",
                len: Some(settings.species.len()),
            },
            Dimension {
                name: "DATE-TIME",
                len: Some(2),
            },
        ];

        Ok(Self {
            dimensions,
            global_attributes: global_attributes(settings, first_slot)?,
            variables: variable_definitions(&settings.species),
        })
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn global_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.global_attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDefinition> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// `LAY`、`ROW`、`COL`次元の長さを返す。
    pub fn field_shape(&self) -> (usize, usize, usize) {
        let len = |name| self.dimension(name).and_then(|d| d.len).unwrap_or(0);
        (len("LAY"), len("ROW"), len("COL"))
    }
}

/// 大域属性を書き込む順番に返す。
///
/// 各属性は1回だけ現れる。
/// 中央経線は`P_GAM`と`XCENT`の両方に記録する。
pub fn global_attributes(
    settings: &Settings,
    first_slot: PrimitiveDateTime,
) -> MeicResult<Vec<Attribute>> {
    let grid = &settings.grid;
    let projection = &grid.projection;
    let created = TimeFlag::from(settings.created);
    let start = TimeFlag::from(first_slot);

    Ok(vec![
        Attribute::text("FILEDESC", FILE_DESCRIPTION),
        Attribute::int("GDTYP", grid.grid_type),
        Attribute::double("P_ALP", projection.standard_parallel_1),
        Attribute::double("P_BET", projection.standard_parallel_2),
        Attribute::double("P_GAM", projection.central_meridian),
        Attribute::double("XCENT", projection.central_meridian),
        Attribute::double("YCENT", projection.latitude_of_origin),
        Attribute::double("XORIG", grid.xorig),
        Attribute::double("YORIG", grid.yorig),
        Attribute::double("XCELL", grid.xcell),
        Attribute::double("YCELL", grid.ycell),
        Attribute {
            name: "VGLVLS",
            value: AttributeValue::Floats(grid.vglvls.clone()),
        },
        Attribute::text("VAR-LIST", settings.species.var_list()),
        Attribute::text("HISTORY", ""),
        Attribute::int("FTYPE", FILE_TYPE),
        Attribute::int("TSTEP", TIME_STEP),
        Attribute::int("NTHIK", NTHIK),
        Attribute::int("VGTYP", VERTICAL_GRID_TYPE),
        Attribute::int("VGTOP", VERTICAL_GRID_TOP),
        Attribute::text("GDNAM", grid.grid_name.as_str()),
        Attribute::text("UPNAM", UPDATE_NAME),
        Attribute::text("EXEC_ID", EXEC_ID),
        Attribute::int("CDATE", created.date),
        Attribute::int("CTIME", created.time),
        Attribute::int("WDATE", created.date),
        Attribute::int("WTIME", created.time),
        Attribute::int("SDATE", start.date),
        Attribute::int("STIME", start.time),
        Attribute::int("NCOLS", to_i32(grid.ncols, "NCOLS")?),
        Attribute::int("NROWS", to_i32(grid.nrows, "NROWS")?),
        Attribute::int("NLAYS", to_i32(grid.nlays, "NLAYS")?),
        Attribute::int("NVARS", to_i32(settings.species.len(), "NVARS")?),
    ])
}

/// `TFLAG`と化学種の変数の定義を、書き込む順番に返す。
pub fn variable_definitions(species: &SpeciesList) -> Vec<VariableDefinition> {
    let mut variables = Vec::with_capacity(species.len() + 1);
    variables.push(VariableDefinition {
        name: TFLAG.to_string(),
        kind: VariableKind::TimeFlag,
        attributes: vec![
            Attribute::text("units", "<YYYYDDD,HHMMSS>"),
            Attribute::text("long_name", pad(TFLAG, NAME_WIDTH)),
            Attribute::text(
                "var_desc",
                pad("Timestep-valid flags: (1) YYYYDDD or (2) HHMMSS", DESC_WIDTH),
            ),
        ],
    });
    for s in species {
        variables.push(VariableDefinition {
            name: s.code.clone(),
            kind: VariableKind::Field,
            attributes: vec![
                Attribute::text("units", pad(&s.units, NAME_WIDTH)),
                Attribute::text("long_name", pad(&s.code, NAME_WIDTH)),
                Attribute::text(
                    "var_desc",
                    pad(&format!("Model species {}", s.code), DESC_WIDTH),
                ),
            ],
        });
    }

    variables
}

fn to_i32(value: usize, name: &str) -> MeicResult<i32> {
    i32::try_from(value)
        .map_err(|e| MeicError::Config(format!("`{name}`の値`{value}`が大きすぎます。{e}")))
}

/// 時刻フラグ
///
/// 日付は`YYYYDDD`（年と通日）、時刻は`HHMMSS`で表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFlag {
    pub date: i32,
    pub time: i32,
}

impl From<PrimitiveDateTime> for TimeFlag {
    fn from(dt: PrimitiveDateTime) -> Self {
        Self {
            date: dt.year() * 1000 + i32::from(dt.ordinal()),
            time: i32::from(dt.hour()) * 10000
                + i32::from(dt.minute()) * 100
                + i32::from(dt.second()),
        }
    }
}

/// 格子ファイルの作成、確定、削除
pub trait GridFileBackend {
    type Handle: GridFileHandle;

    /// `path`のファイルを削除する。
    ///
    /// ファイルが存在した場合は`true`を返す。
    fn remove(&mut self, path: &Path) -> MeicResult<bool>;

    /// `path`にファイルを作成して、次元、大域属性、変数を定義する。
    fn create(&mut self, path: &Path, layout: &FileLayout) -> MeicResult<Self::Handle>;

    /// ファイルを閉じて、`staging`から`path`に名前を変更する。
    fn commit(&mut self, handle: Self::Handle, staging: &Path, path: &Path) -> MeicResult<()>;

    /// ファイルを閉じて、`staging`を削除する。
    fn discard(&mut self, handle: Self::Handle, staging: &Path) -> MeicResult<()>;
}

/// 作成中の格子ファイル
pub trait GridFileHandle {
    /// `slot`番目の時刻スロットの`var_index`番目の変数の時刻フラグを書き込む。
    fn put_time_flag(&mut self, slot: usize, var_index: usize, flag: TimeFlag) -> MeicResult<()>;

    /// `slot`番目の時刻スロットに変数`name`の3次元の値を書き込む。
    fn put_field(&mut self, slot: usize, name: &str, values: &Array3<f32>) -> MeicResult<()>;
}

/// 時刻スロットの書き込み状況
#[derive(Debug, Clone)]
struct SlotProgress {
    time_flags: bool,
    fields: Vec<bool>,
}

impl SlotProgress {
    fn is_complete(&self) -> bool {
        self.time_flags && self.fields.iter().all(|&f| f)
    }
}

/// 書き込み中の日
struct OpenDay<H> {
    date: Date,
    path: PathBuf,
    staging: PathBuf,
    handle: H,
    progress: Vec<SlotProgress>,
}

enum WriterState<H> {
    Idle,
    Populating(OpenDay<H>),
}

/// 1日に1ファイルの格子ファイル・ライター
///
/// 同時に開くファイルは1つだけである。
/// 状態は`Idle`から`open_day`で書き込み中になり、`close_day`または`abort_day`で
/// `Idle`に戻る。
pub struct GridFileWriter<'a, B>
where
    B: GridFileBackend,
{
    settings: &'a Settings,
    backend: B,
    state: WriterState<B::Handle>,
}

impl<'a, B> GridFileWriter<'a, B>
where
    B: GridFileBackend,
{
    pub fn new(backend: B, settings: &'a Settings) -> Self {
        Self {
            settings,
            backend,
            state: WriterState::Idle,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, WriterState::Populating(_))
    }

    /// 書き込み中の日を返す。
    pub fn current_day(&self) -> Option<Date> {
        match &self.state {
            WriterState::Populating(day) => Some(day.date),
            WriterState::Idle => None,
        }
    }

    /// 最初の時刻スロットが`day_start`の日のファイルを作成する。
    ///
    /// 同じ名前のファイルが既に存在する場合は削除する。
    ///
    /// # 戻り値
    ///
    /// 確定後のファイルのパス
    pub fn open_day(&mut self, day_start: PrimitiveDateTime) -> MeicResult<PathBuf> {
        if let WriterState::Populating(day) = &self.state {
            return Err(MeicError::WriterState(format!(
                "{}のファイルを閉じる前に、{}のファイルを開こうとしました。",
                day.date,
                day_start.date()
            )));
        }
        let settings = self.settings;
        let date = day_start.date();
        let path = settings.output.path_for(date)?;
        let staging = settings.output.staging_path_for(date)?;
        if self.backend.remove(&path)? {
            warn!(path = %path.display(), "既存のファイルを削除しました");
        }
        self.backend.remove(&staging)?;

        let layout = FileLayout::new(settings, day_start)?;
        let handle = self.backend.create(&staging, &layout)?;
        let hours = settings.window.hours_per_file() as usize;
        let progress = vec![
            SlotProgress {
                time_flags: false,
                fields: vec![false; settings.species.len()],
            };
            hours
        ];
        info!(path = %path.display(), "ファイルを作成しました");
        self.state = WriterState::Populating(OpenDay {
            date,
            path: path.clone(),
            staging,
            handle,
            progress,
        });

        Ok(path)
    }

    /// `slot`番目の時刻スロットに、すべての変数の時刻フラグを書き込む。
    pub fn write_time_flags(&mut self, slot: usize, dt: PrimitiveDateTime) -> MeicResult<()> {
        let result = self.try_write_time_flags(slot, dt);
        self.discard_on_error(result)
    }

    fn try_write_time_flags(&mut self, slot: usize, dt: PrimitiveDateTime) -> MeicResult<()> {
        let nvars = self.settings.species.len();
        let day = self.open_day_mut()?;
        check_slot(slot, day.progress.len())?;
        let flag = TimeFlag::from(dt);
        for var_index in 0..nvars {
            day.handle.put_time_flag(slot, var_index, flag)?;
        }
        day.progress[slot].time_flags = true;

        Ok(())
    }

    /// `slot`番目の時刻スロットに、`species_index`番目の化学種の排出量を書き込む。
    ///
    /// 値は`f32`に変換して書き込む。
    pub fn write_field(
        &mut self,
        slot: usize,
        species_index: usize,
        field: &Array3<f64>,
    ) -> MeicResult<()> {
        let result = self.try_write_field(slot, species_index, field);
        self.discard_on_error(result)
    }

    fn try_write_field(
        &mut self,
        slot: usize,
        species_index: usize,
        field: &Array3<f64>,
    ) -> MeicResult<()> {
        let settings = self.settings;
        let day = self.open_day_mut()?;
        check_slot(slot, day.progress.len())?;
        let species = settings.species.get(species_index).ok_or_else(|| {
            MeicError::WriterState(format!(
                "化学種のインデックス`{species_index}`が範囲外です。化学種の数は{}です。",
                settings.species.len()
            ))
        })?;
        let shape = settings.grid.shape();
        if field.dim() != shape {
            return Err(MeicError::GridShapeMismatch {
                source_name: species.code.clone(),
                expected: shape,
                actual: field.dim(),
            });
        }
        let values = field.mapv(|v| v as f32);
        day.handle.put_field(slot, &species.code, &values)?;
        day.progress[slot].fields[species_index] = true;

        Ok(())
    }

    /// すべての時刻スロットを書き込んだファイルを確定する。
    ///
    /// 書き込まれていない時刻スロットがある場合は、ファイルを削除してエラーを返す。
    ///
    /// # 戻り値
    ///
    /// 確定したファイルのパス
    pub fn close_day(&mut self) -> MeicResult<PathBuf> {
        let day = match std::mem::replace(&mut self.state, WriterState::Idle) {
            WriterState::Populating(day) => day,
            WriterState::Idle => {
                return Err(MeicError::WriterState(String::from(
                    "開いているファイルがありません。",
                )))
            }
        };
        let missing: Vec<String> = day
            .progress
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_complete())
            .map(|(slot, _)| slot.to_string())
            .collect();
        if !missing.is_empty() {
            self.backend.discard(day.handle, &day.staging)?;
            return Err(MeicError::IncompleteFile {
                path: day.path.display().to_string(),
                missing: missing.join(","),
            });
        }
        self.backend.commit(day.handle, &day.staging, &day.path)?;
        info!(path = %day.path.display(), "ファイルを確定しました");

        Ok(day.path)
    }

    /// 書き込み中のファイルを削除して`Idle`に戻る。
    ///
    /// 開いているファイルがない場合は何もしない。
    pub fn abort_day(&mut self) -> MeicResult<()> {
        if let WriterState::Populating(day) = std::mem::replace(&mut self.state, WriterState::Idle)
        {
            warn!(path = %day.path.display(), "作成中のファイルを破棄します");
            self.backend.discard(day.handle, &day.staging)?;
        }

        Ok(())
    }

    fn open_day_mut(&mut self) -> MeicResult<&mut OpenDay<B::Handle>> {
        match &mut self.state {
            WriterState::Populating(day) => Ok(day),
            WriterState::Idle => Err(MeicError::WriterState(String::from(
                "ファイルを開く前に書き込もうとしました。",
            ))),
        }
    }

    fn discard_on_error<T>(&mut self, result: MeicResult<T>) -> MeicResult<T> {
        if result.is_err() {
            if let Err(e) = self.abort_day() {
                warn!(error = %e, "作成中のファイルを削除できませんでした");
            }
        }
        result
    }
}

fn check_slot(slot: usize, slots: usize) -> MeicResult<()> {
    if slots <= slot {
        return Err(MeicError::WriterState(format!(
            "時刻スロット`{slot}`が範囲外です。スロット数は{slots}です。"
        )));
    }
    Ok(())
}

/// メモリ上に格子ファイルを保持する`GridFileBackend`
///
/// 出力内容の確認や、ファイルを書き込まない試行に使う。
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    files: BTreeMap<PathBuf, MemoryFile>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 確定したファイルを返す。
    pub fn file<P>(&self, path: P) -> Option<&MemoryFile>
    where
        P: AsRef<Path>,
    {
        self.files.get(path.as_ref())
    }

    /// 確定したファイルのパスを返す。
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(|p| p.as_path())
    }
}

impl GridFileBackend for MemoryBackend {
    type Handle = MemoryFile;

    fn remove(&mut self, path: &Path) -> MeicResult<bool> {
        Ok(self.files.remove(path).is_some())
    }

    fn create(&mut self, _path: &Path, layout: &FileLayout) -> MeicResult<MemoryFile> {
        Ok(MemoryFile {
            layout: layout.clone(),
            time_flags: BTreeMap::new(),
            fields: BTreeMap::new(),
        })
    }

    fn commit(&mut self, handle: MemoryFile, _staging: &Path, path: &Path) -> MeicResult<()> {
        debug!(path = %path.display(), "メモリ上のファイルを確定しました");
        self.files.insert(path.to_owned(), handle);
        Ok(())
    }

    fn discard(&mut self, _handle: MemoryFile, _staging: &Path) -> MeicResult<()> {
        Ok(())
    }
}

/// メモリ上の格子ファイル
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryFile {
    layout: FileLayout,
    time_flags: BTreeMap<(usize, usize), TimeFlag>,
    fields: BTreeMap<(usize, String), Array3<f32>>,
}

impl MemoryFile {
    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    /// 変数名を定義順に返す。
    pub fn variable_names(&self) -> Vec<&str> {
        self.layout.variables.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn time_flag(&self, slot: usize, var_index: usize) -> Option<TimeFlag> {
        self.time_flags.get(&(slot, var_index)).copied()
    }

    pub fn field(&self, slot: usize, name: &str) -> Option<&Array3<f32>> {
        self.fields.get(&(slot, name.to_string()))
    }

    /// 書き込まれた時刻スロットの数（`TSTEP`次元の長さ）を返す。
    pub fn slot_count(&self) -> usize {
        let flags = self.time_flags.keys().map(|(slot, _)| slot + 1).max();
        let fields = self.fields.keys().map(|(slot, _)| slot + 1).max();
        flags.max(fields).unwrap_or(0)
    }
}

impl GridFileHandle for MemoryFile {
    fn put_time_flag(&mut self, slot: usize, var_index: usize, flag: TimeFlag) -> MeicResult<()> {
        let nvars = self
            .layout
            .dimension("VAR")
            .and_then(|d| d.len)
            .unwrap_or(0);
        if nvars <= var_index {
            return Err(MeicError::Write(format!(
                "`{TFLAG}`の変数インデックス`{var_index}`が範囲外です。"
            )));
        }
        self.time_flags.insert((slot, var_index), flag);
        Ok(())
    }

    fn put_field(&mut self, slot: usize, name: &str, values: &Array3<f32>) -> MeicResult<()> {
        match self.layout.variable(name) {
            Some(v) if v.kind == VariableKind::Field => {}
            _ => {
                return Err(MeicError::Write(format!(
                    "変数`{name}`は定義されていません。"
                )))
            }
        }
        if values.dim() != self.layout.field_shape() {
            return Err(MeicError::Write(format!(
                "変数`{name}`の形状{:?}が、ファイルの形状{:?}と一致しません。",
                values.dim(),
                self.layout.field_shape()
            )));
        }
        self.fields.insert((slot, name.to_string()), values.clone());
        Ok(())
    }
}

#[cfg(feature = "netcdf")]
pub use self::nc::{NetcdfBackend, NetcdfFile};

#[cfg(feature = "netcdf")]
mod nc {
    use std::fs;
    use std::io::ErrorKind;
    use std::path::Path;

    use ndarray::Array3;

    use super::{
        AttributeValue, FileLayout, GridFileBackend, GridFileHandle, TimeFlag, VariableKind,
        TFLAG,
    };
    use crate::{MeicError, MeicResult};

    /// netCDF classic形式のファイルを作成する`GridFileBackend`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NetcdfBackend;

    /// 作成中のnetCDFファイル
    pub struct NetcdfFile {
        file: netcdf::FileMut,
    }

    fn nc_error(context: &str, e: netcdf::Error) -> MeicError {
        MeicError::Write(format!("{context}: {e}"))
    }

    fn to_netcdf(value: &AttributeValue) -> netcdf::AttributeValue {
        match value {
            AttributeValue::Text(s) => netcdf::AttributeValue::Str(s.clone()),
            AttributeValue::Int(i) => netcdf::AttributeValue::Int(*i),
            AttributeValue::Double(d) => netcdf::AttributeValue::Double(*d),
            AttributeValue::Floats(v) => netcdf::AttributeValue::Floats(v.clone()),
        }
    }

    fn remove_if_exists(path: &Path) -> MeicResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MeicError::Write(format!(
                "`{}`を削除できません。{e}",
                path.display()
            ))),
        }
    }

    impl GridFileBackend for NetcdfBackend {
        type Handle = NetcdfFile;

        fn remove(&mut self, path: &Path) -> MeicResult<bool> {
            remove_if_exists(path)
        }

        fn create(&mut self, path: &Path, layout: &FileLayout) -> MeicResult<NetcdfFile> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    MeicError::Open(format!("`{}`を作成できません。{e}", parent.display()))
                })?;
            }
            let context = path.display().to_string();
            let mut file = netcdf::create_with(path, netcdf::Options::empty())
                .map_err(|e| nc_error(&context, e))?;

            for dim in &layout.dimensions {
                match dim.len {
                    None => file.add_unlimited_dimension(dim.name),
                    Some(len) => file.add_dimension(dim.name, len),
                }
                .map_err(|e| nc_error(dim.name, e))?;
            }
            for attr in &layout.global_attributes {
                file.add_attribute(attr.name, to_netcdf(&attr.value))
                    .map_err(|e| nc_error(attr.name, e))?;
            }
            for definition in &layout.variables {
                let dims = definition.kind.dimensions();
                let mut var = match definition.kind {
                    VariableKind::TimeFlag => file.add_variable::<i32>(&definition.name, dims),
                    VariableKind::Field => file.add_variable::<f32>(&definition.name, dims),
                }
                .map_err(|e| nc_error(&definition.name, e))?;
                for attr in &definition.attributes {
                    var.put_attribute(attr.name, to_netcdf(&attr.value))
                        .map_err(|e| nc_error(&definition.name, e))?;
                }
            }

            Ok(NetcdfFile { file })
        }

        fn commit(&mut self, handle: NetcdfFile, staging: &Path, path: &Path) -> MeicResult<()> {
            // 名前を変更する前にファイルを閉じる
            drop(handle);
            fs::rename(staging, path).map_err(|e| {
                MeicError::Write(format!(
                    "`{}`を`{}`に変更できません。{e}",
                    staging.display(),
                    path.display()
                ))
            })
        }

        fn discard(&mut self, handle: NetcdfFile, staging: &Path) -> MeicResult<()> {
            drop(handle);
            remove_if_exists(staging).map(|_| ())
        }
    }

    impl GridFileHandle for NetcdfFile {
        fn put_time_flag(
            &mut self,
            slot: usize,
            var_index: usize,
            flag: TimeFlag,
        ) -> MeicResult<()> {
            let mut var = self.file.variable_mut(TFLAG).ok_or_else(|| {
                MeicError::Write(format!("変数`{TFLAG}`は定義されていません。"))
            })?;
            var.put_values(&[flag.date, flag.time], (slot, var_index, ..))
                .map_err(|e| nc_error(TFLAG, e))
        }

        fn put_field(&mut self, slot: usize, name: &str, values: &Array3<f32>) -> MeicResult<()> {
            let mut var = self.file.variable_mut(name).ok_or_else(|| {
                MeicError::Write(format!("変数`{name}`は定義されていません。"))
            })?;
            let values = values.as_standard_layout();
            let slice = values.as_slice().ok_or_else(|| {
                MeicError::Unexpected(format!("変数`{name}`の値が連続していません。"))
            })?;
            var.put_values(slice, (slot, .., .., ..))
                .map_err(|e| nc_error(name, e))
        }
    }
}
