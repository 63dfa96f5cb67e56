//! 設定ファイルの読み込みと、1回の実行で参照する設定
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, Duration, PrimitiveDateTime, Time};

use crate::projection::LambertConformal;
use crate::readers::parse_f64;
use crate::species::SpeciesList;
use crate::{MeicError, MeicResult};

/// 設定ファイル名
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// 日付の書式
const DATE_FMT: &[FormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// 出力ファイル名に付与する日付の書式
const FILE_DATE_FMT: &[FormatItem<'_>] = format_description!("[year][month][day]");

/// 作成中のファイルに付与する拡張子
const STAGING_SUFFIX: &str = ".partial";

/// 設定ファイルの内容
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub base: BaseSection,
    pub time: TimeSection,
    pub projection: ProjectionSection,
}

/// `[base]`セクション
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseSection {
    /// 対象とする大気質モデル
    ///
    /// 化学種対応表や時間係数表は`factor_dir/model`ディレクトリから読み込む。
    pub model: String,

    /// MEICインベントリのディレクトリ
    #[serde(default = "default_inventory_dir")]
    pub inventory_dir: PathBuf,

    /// 係数表を格納したディレクトリ
    #[serde(default = "default_factor_dir")]
    pub factor_dir: PathBuf,

    /// 出力ディレクトリ
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// 出力ファイル名の接頭辞
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// 排出部門
    ///
    /// インベントリはこの順番で部門を合算する。
    #[serde(default = "default_sectors")]
    pub sectors: Vec<String>,
}

/// `[time]`セクション
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeSection {
    /// 開始日（`YYYY-MM-DD`）
    pub start_date: String,

    /// 終了日（`YYYY-MM-DD`）
    pub end_date: String,

    /// 各ファイルの最初の時刻（時）
    #[serde(default)]
    pub first_hour: u8,

    /// 1ファイルに記録する時刻スロットの数
    #[serde(default = "default_one_file_hours")]
    pub one_file_hours: u32,
}

/// `[projection]`セクション
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectionSection {
    /// I/O APIの格子種別コード（`GDTYP`）
    #[serde(default = "default_grid_type")]
    pub grid_type: i32,

    /// 格子名（`GDNAM`）
    #[serde(default = "default_grid_name")]
    pub grid_name: String,

    /// PROJ形式の投影法定義文字列
    pub lambert_params: String,

    /// 鉛直層の境界（カンマ区切り）
    pub layers: String,

    /// 東西方向の格子数
    pub xcells: usize,

    /// 南北方向の格子数
    pub ycells: usize,

    /// 格子原点（メートル）
    pub xorig: f64,
    pub yorig: f64,

    /// 格子の大きさ（メートル）
    pub dx: f64,
    pub dy: f64,
}

fn default_inventory_dir() -> PathBuf {
    PathBuf::from("./meic")
}

fn default_factor_dir() -> PathBuf {
    PathBuf::from("./factor")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_file_prefix() -> String {
    String::from("EM_China_d01_")
}

fn default_sectors() -> Vec<String> {
    ["agriculture", "industry", "power", "residential", "transportation"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_one_file_hours() -> u32 {
    24
}

fn default_grid_type() -> i32 {
    2
}

fn default_grid_name() -> String {
    String::from("MEIC2")
}

impl Config {
    /// 設定ファイルを読み込む。
    pub fn from_path<P>(path: P) -> MeicResult<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| MeicError::Open(format!("`{}`: {e}", path.display())))?;

        Self::from_toml_str(&text)
    }

    /// TOML文字列から設定を構築する。
    pub fn from_toml_str(text: &str) -> MeicResult<Self> {
        let config: Config = toml::from_str(text).map_err(|e| MeicError::Config(format!("{e}")))?;
        if config.base.sectors.is_empty() {
            return Err(MeicError::Config(String::from(
                "`base.sectors`に排出部門が指定されていません。",
            )));
        }

        Ok(config)
    }

    /// 計算期間を返す。
    ///
    /// コマンドラインで指定された開始日と終了日は、設定ファイルの値より優先する。
    ///
    /// # 引数
    ///
    /// * `start` - コマンドラインで指定された開始日
    /// * `end` - コマンドラインで指定された終了日
    pub fn window(&self, start: Option<&str>, end: Option<&str>) -> MeicResult<SimulationWindow> {
        let start = parse_date(start.unwrap_or(&self.time.start_date))?;
        let end = parse_date(end.unwrap_or(&self.time.end_date))?;

        SimulationWindow::new(start, end, self.time.first_hour, self.time.one_file_hours)
    }

    /// モデル格子を返す。
    pub fn grid_spec(&self) -> MeicResult<GridSpec> {
        let p = &self.projection;
        let projection = LambertConformal::from_proj_str(&p.lambert_params)?;
        let vglvls = parse_levels(&p.layers)?;
        if p.xcells == 0 || p.ycells == 0 {
            return Err(MeicError::Config(format!(
                "格子数は1以上でなければなりません。xcells={}, ycells={}",
                p.xcells, p.ycells
            )));
        }
        if p.dx <= 0.0 || p.dy <= 0.0 {
            return Err(MeicError::Config(format!(
                "格子の大きさは正でなければなりません。dx={}, dy={}",
                p.dx, p.dy
            )));
        }

        Ok(GridSpec {
            grid_type: p.grid_type,
            grid_name: p.grid_name.clone(),
            nlays: vglvls.len() - 1,
            nrows: p.ycells,
            ncols: p.xcells,
            xorig: p.xorig,
            yorig: p.yorig,
            xcell: p.dx,
            ycell: p.dy,
            vglvls,
            projection,
        })
    }

    /// 化学種対応表などの係数表を格納したディレクトリを返す。
    pub fn model_dir(&self) -> PathBuf {
        self.base.factor_dir.join(&self.base.model)
    }

    pub fn species_map_path(&self) -> PathBuf {
        self.model_dir().join("species-map.csv")
    }

    pub fn species_unit_path(&self) -> PathBuf {
        self.model_dir().join("species-unit.csv")
    }

    pub fn day_factor_path(&self) -> PathBuf {
        self.model_dir().join("day-factor.csv")
    }

    pub fn hour_factor_path(&self) -> PathBuf {
        self.model_dir().join("hour-factor.csv")
    }

    /// 出力ファイルの命名規則を返す。
    pub fn output_naming(&self) -> OutputNaming {
        OutputNaming {
            dir: self.base.output_dir.clone(),
            prefix: self.base.file_prefix.clone(),
        }
    }
}

/// `YYYY-MM-DD`形式の日付を解析する。
pub fn parse_date(s: &str) -> MeicResult<Date> {
    Date::parse(s.trim(), DATE_FMT)
        .map_err(|e| MeicError::Config(format!("日付`{s}`を解析できません。{e}")))
}

/// カンマ区切りの鉛直層の境界を解析する。
///
/// 末尾に`f`が付いた値（`0.995f`）も受け付ける。
/// 境界は2つ以上あり、狭義単調でなければならない。
pub fn parse_levels(s: &str) -> MeicResult<Vec<f32>> {
    let levels = s
        .split(',')
        .map(|token| token.trim().trim_end_matches(['f', 'F']))
        .filter(|token| !token.is_empty())
        .map(|token| {
            parse_f64(token, "鉛直層の境界")
                .map(|v| v as f32)
                .map_err(|e| MeicError::Config(format!("{e}")))
        })
        .collect::<MeicResult<Vec<f32>>>()?;
    if levels.len() < 2 {
        return Err(MeicError::Config(format!(
            "鉛直層の境界は2つ以上必要です。`{s}`"
        )));
    }
    let increasing = levels.windows(2).all(|w| w[0] < w[1]);
    let decreasing = levels.windows(2).all(|w| w[0] > w[1]);
    if !increasing && !decreasing {
        return Err(MeicError::Config(format!(
            "鉛直層の境界が単調ではありません。`{s}`"
        )));
    }

    Ok(levels)
}

/// 計算期間
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationWindow {
    /// 開始日時
    ///
    /// 開始日の`first_hour`時
    start: PrimitiveDateTime,

    /// 終了日時
    ///
    /// 終了日の23時59分59秒
    end: PrimitiveDateTime,

    /// 1ファイルに記録する時刻スロットの数
    hours_per_file: u32,
}

impl SimulationWindow {
    /// 計算期間を構築する。
    ///
    /// # 引数
    ///
    /// * `start_date` - 開始日
    /// * `end_date` - 終了日（この日を含む）
    /// * `first_hour` - 各ファイルの最初の時刻（0から23）
    /// * `hours_per_file` - 1ファイルに記録する時刻スロットの数
    pub fn new(
        start_date: Date,
        end_date: Date,
        first_hour: u8,
        hours_per_file: u32,
    ) -> MeicResult<Self> {
        let first_time = Time::from_hms(first_hour, 0, 0).map_err(|e| {
            MeicError::Config(format!("最初の時刻`{first_hour}`が不正です。{e}"))
        })?;
        if hours_per_file == 0 {
            return Err(MeicError::Config(String::from(
                "1ファイルに記録する時刻スロットの数は1以上でなければなりません。",
            )));
        }
        if end_date < start_date {
            return Err(MeicError::Config(format!(
                "終了日({end_date})が開始日({start_date})より前です。"
            )));
        }
        let last_second = Time::from_hms(23, 59, 59)
            .map_err(|e| MeicError::Unexpected(format!("{e}")))?;

        Ok(Self {
            start: PrimitiveDateTime::new(start_date, first_time),
            end: PrimitiveDateTime::new(end_date, last_second),
            hours_per_file,
        })
    }

    pub fn start(&self) -> PrimitiveDateTime {
        self.start
    }

    pub fn end(&self) -> PrimitiveDateTime {
        self.end
    }

    pub fn hours_per_file(&self) -> u32 {
        self.hours_per_file
    }

    /// 各ファイルの最初の時刻スロットの日時を、開始日から終了日まで順に返す。
    pub fn day_starts(&self) -> impl Iterator<Item = PrimitiveDateTime> {
        let end = self.end;
        std::iter::successors(Some(self.start), |dt| dt.checked_add(Duration::days(1)))
            .take_while(move |dt| *dt <= end)
    }

    /// ファイルの最初の日時から`slot`番目の時刻スロットの日時を返す。
    ///
    /// 時刻スロットは日付や月をまたぐことがある。
    pub fn slot_time(day_start: PrimitiveDateTime, slot: u32) -> PrimitiveDateTime {
        day_start + Duration::hours(i64::from(slot))
    }
}

/// モデル格子
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    /// 格子種別コード（`GDTYP`）
    pub grid_type: i32,
    /// 格子名（`GDNAM`）
    pub grid_name: String,
    /// 鉛直層数
    pub nlays: usize,
    /// 南北方向の格子数
    pub nrows: usize,
    /// 東西方向の格子数
    pub ncols: usize,
    /// 格子原点（メートル）
    pub xorig: f64,
    pub yorig: f64,
    /// 格子の大きさ（メートル）
    pub xcell: f64,
    pub ycell: f64,
    /// 鉛直層の境界
    ///
    /// 要素数は`nlays + 1`である。
    pub vglvls: Vec<f32>,
    /// 投影パラメーター
    pub projection: LambertConformal,
}

impl GridSpec {
    /// 3次元格子の形状（層、行、列）を返す。
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.nlays, self.nrows, self.ncols)
    }
}

/// 出力ファイルの命名規則
///
/// 出力ファイルは`dir/<prefix><YYYYMMDD>.nc`に作成する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNaming {
    pub dir: PathBuf,
    pub prefix: String,
}

impl OutputNaming {
    /// 指定された日付の出力ファイルのパスを返す。
    pub fn path_for(&self, date: Date) -> MeicResult<PathBuf> {
        let stamp = date
            .format(FILE_DATE_FMT)
            .map_err(|e| MeicError::Unexpected(format!("日付を書式化できません。{e}")))?;

        Ok(self.dir.join(format!("{}{stamp}.nc", self.prefix)))
    }

    /// 指定された日付の作成中ファイルのパスを返す。
    pub fn staging_path_for(&self, date: Date) -> MeicResult<PathBuf> {
        let mut path = self.path_for(date)?.into_os_string();
        path.push(STAGING_SUFFIX);

        Ok(PathBuf::from(path))
    }
}

/// 1回の実行で参照する設定
///
/// 起動時に構築して、以後は変更しない。
#[derive(Debug, Clone)]
pub struct Settings {
    pub window: SimulationWindow,
    pub grid: GridSpec,
    pub species: SpeciesList,
    pub output: OutputNaming,
    /// ファイルの作成日時（`CDATE`、`CTIME`、`WDATE`、`WTIME`）
    pub created: PrimitiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    const CONFIG: &str = r#"
[base]
model = "cmaq"
output_dir = "/tmp/out"

[time]
start_date = "2023-01-31"
end_date = "2023-02-01"
first_hour = 0
one_file_hours = 24

[projection]
lambert_params = "+proj=lcc +lat_1=25 +lat_2=40 +lon_0=110 +lat_0=34 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs"
layers = "1.0,0.995f,0.99"
xcells = 4
ycells = 3
xorig = -2000.0
yorig = -1500.0
dx = 1000.0
dy = 1000.0
"#;

    #[test]
    fn parses_config_with_defaults() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.base.model, "cmaq");
        assert_eq!(config.base.file_prefix, "EM_China_d01_");
        assert_eq!(config.base.sectors.len(), 5);
        assert_eq!(config.projection.grid_type, 2);
        assert_eq!(config.projection.grid_name, "MEIC2");
        assert_eq!(
            config.species_map_path(),
            PathBuf::from("./factor/cmaq/species-map.csv")
        );
    }

    #[test]
    fn missing_key_is_config_error() {
        let text = CONFIG.replace("xcells = 4\n", "");
        assert!(matches!(
            Config::from_toml_str(&text),
            Err(MeicError::Config(_))
        ));
    }

    #[test]
    fn grid_spec_from_config() {
        let grid = Config::from_toml_str(CONFIG).unwrap().grid_spec().unwrap();
        assert_eq!(grid.shape(), (2, 3, 4));
        assert_eq!(grid.vglvls, vec![1.0, 0.995, 0.99]);
        assert_eq!(grid.projection.standard_parallel_1, 25.0);
        assert_eq!(grid.xorig, -2000.0);
    }

    #[test]
    fn unparseable_projection_fails_before_anything_else() {
        let text = CONFIG.replace("+proj=lcc", "+proj=utm");
        let config = Config::from_toml_str(&text).unwrap();
        assert!(matches!(config.grid_spec(), Err(MeicError::Projection(_))));
    }

    #[test]
    fn levels_must_be_monotonic() {
        assert!(parse_levels("1.0,0.9,0.95").is_err());
        assert!(parse_levels("1.0").is_err());
        assert!(parse_levels("1.0,abc").is_err());
        assert_eq!(parse_levels("0, 0.5, 1").unwrap(), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn command_line_dates_take_precedence() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        let window = config.window(None, None).unwrap();
        assert_eq!(window.start(), datetime!(2023-01-31 00:00));
        assert_eq!(window.end(), datetime!(2023-02-01 23:59:59));

        let window = config.window(Some("2023-03-01"), None).unwrap_err();
        assert!(matches!(window, MeicError::Config(_)));

        let window = config
            .window(Some("2023-01-15"), Some("2023-01-16"))
            .unwrap();
        assert_eq!(window.start(), datetime!(2023-01-15 00:00));
        assert_eq!(window.end(), datetime!(2023-01-16 23:59:59));

        assert!(config.window(Some("2023/01/15"), None).is_err());
    }

    #[test]
    fn window_iterates_days_inclusive() {
        let window =
            SimulationWindow::new(date!(2023-01-30), date!(2023-02-01), 1, 24).unwrap();
        let days: Vec<_> = window.day_starts().collect();
        assert_eq!(
            days,
            vec![
                datetime!(2023-01-30 01:00),
                datetime!(2023-01-31 01:00),
                datetime!(2023-02-01 01:00),
            ]
        );
        assert_eq!(
            SimulationWindow::slot_time(days[1], 23),
            datetime!(2023-02-01 00:00)
        );
    }

    #[test]
    fn window_rejects_invalid_values() {
        let d = date!(2023-01-01);
        assert!(SimulationWindow::new(d, d, 24, 24).is_err());
        assert!(SimulationWindow::new(d, d, 0, 0).is_err());
        assert!(SimulationWindow::new(d.next_day().unwrap(), d, 0, 24).is_err());
        assert_eq!(SimulationWindow::new(d, d, 0, 24).unwrap().day_starts().count(), 1);
    }

    #[test]
    fn output_paths_follow_naming_pattern() {
        let naming = Config::from_toml_str(CONFIG).unwrap().output_naming();
        assert_eq!(
            naming.path_for(date!(2023-02-01)).unwrap(),
            PathBuf::from("/tmp/out/EM_China_d01_20230201.nc")
        );
        assert_eq!(
            naming.staging_path_for(date!(2023-02-01)).unwrap(),
            PathBuf::from("/tmp/out/EM_China_d01_20230201.nc.partial")
        );
    }
}
