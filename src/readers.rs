//! インベントリと係数表のファイル読み込み
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::{MeicError, MeicResult};

/// ESRI ASCII格子
///
/// MEICの月別排出量は、部門・化学種ごとにESRI ASCII格子形式で配布される。
#[derive(Debug, Clone)]
pub struct AsciiGrid {
    /// 列数
    pub ncols: usize,

    /// 行数
    pub nrows: usize,

    /// 左下の座標
    ///
    /// ヘッダーが`xllcenter`と`yllcenter`の場合も、格子の中心座標をそのまま格納する。
    pub xll: f64,
    pub yll: f64,

    /// 格子の大きさ
    pub cellsize: f64,

    /// 欠測値
    pub nodata_value: Option<f64>,

    /// 格子の値
    ///
    /// ファイルには最北端の行から順に記録されているが、ここでは最南端の行を
    /// 先頭にして行優先で格納する。
    /// 欠測値は0として格納する。
    pub values: Vec<f64>,
}

/// ヘッダー付きのCSV表
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    /// 見出し
    pub header: Vec<String>,

    /// 行
    ///
    /// 各行の列数は見出しの列数と一致する。
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// 見出しが`name`の列のインデックスを返す。
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// 見出しが`name`の列のインデックスを返す。列が存在しない場合はエラーとする。
    pub fn require_column(&self, name: &str, table_name: &str) -> MeicResult<usize> {
        self.column_index(name).ok_or_else(|| {
            MeicError::Read(format!("`{table_name}`に`{name}`列が存在しません。"))
        })
    }
}

/// ESRI ASCII格子ファイルを読み込む。
///
/// # 引数
///
/// * `path` - 読み込むファイルのパス
///
/// # 戻り値
///
/// `AsciiGrid`
pub fn read_ascii_grid<P>(path: P) -> MeicResult<AsciiGrid>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| MeicError::Open(format!("`{}`: {e}", path.display())))?;

    parse_ascii_grid(BufReader::new(file), &path.display().to_string())
}

/// ESRI ASCII格子を解析する。
///
/// # 引数
///
/// * `reader` - 格子を読み込むリーダー
/// * `name` - エラー・メッセージに含める格子の名前
pub fn parse_ascii_grid<R>(reader: R, name: &str) -> MeicResult<AsciiGrid>
where
    R: BufRead,
{
    let mut ncols = None;
    let mut nrows = None;
    let mut xll = None;
    let mut yll = None;
    let mut cellsize = None;
    let mut nodata_value = None;
    let mut raw_values = Vec::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| {
            MeicError::Read(format!("`{name}`の{}行目の読み込みに失敗しました。{e}", number + 1))
        })?;
        let mut tokens = line.split_whitespace().peekable();
        let Some(first) = tokens.peek() else {
            continue;
        };
        // 英字で始まる行はヘッダー
        if first.starts_with(|c: char| c.is_ascii_alphabetic()) {
            if !raw_values.is_empty() {
                return Err(MeicError::Read(format!(
                    "`{name}`の{}行目で、データの後にヘッダーが現れました。",
                    number + 1
                )));
            }
            let key = tokens.next().unwrap_or_default().to_ascii_lowercase();
            let value = tokens.next().ok_or_else(|| {
                MeicError::Read(format!("`{name}`のヘッダー`{key}`に値がありません。"))
            })?;
            match key.as_str() {
                "ncols" => ncols = Some(parse_usize(value, "ncols")?),
                "nrows" => nrows = Some(parse_usize(value, "nrows")?),
                "xllcorner" | "xllcenter" => xll = Some(parse_f64(value, "xllcorner")?),
                "yllcorner" | "yllcenter" => yll = Some(parse_f64(value, "yllcorner")?),
                "cellsize" => cellsize = Some(parse_f64(value, "cellsize")?),
                "nodata_value" => nodata_value = Some(parse_f64(value, "NODATA_value")?),
                _ => {
                    return Err(MeicError::Read(format!(
                        "`{name}`に不明なヘッダー`{key}`が記録されています。"
                    )))
                }
            }
            continue;
        }
        for token in tokens {
            raw_values.push(parse_f64(token, "格子の値")?);
        }
    }

    let missing = |key: &str| MeicError::Read(format!("`{name}`にヘッダー`{key}`がありません。"));
    let ncols = ncols.ok_or_else(|| missing("ncols"))?;
    let nrows = nrows.ok_or_else(|| missing("nrows"))?;
    let xll = xll.ok_or_else(|| missing("xllcorner"))?;
    let yll = yll.ok_or_else(|| missing("yllcorner"))?;
    let cellsize = cellsize.ok_or_else(|| missing("cellsize"))?;
    if ncols == 0 || nrows == 0 {
        return Err(MeicError::Read(format!(
            "`{name}`の格子数({nrows}x{ncols})が0です。"
        )));
    }
    if raw_values.len() != ncols * nrows {
        return Err(MeicError::Read(format!(
            "`{name}`の値の数({})が、格子数({nrows}x{ncols})と一致しません。",
            raw_values.len()
        )));
    }

    // 北から南の行の並びを、南から北に並べ替える
    let mut values = Vec::with_capacity(raw_values.len());
    for row in raw_values.chunks(ncols).rev() {
        values.extend(row.iter().map(|&v| match nodata_value {
            Some(nodata) if v == nodata => 0.0,
            _ => v,
        }));
    }

    Ok(AsciiGrid {
        ncols,
        nrows,
        xll,
        yll,
        cellsize,
        nodata_value,
        values,
    })
}

/// CSVファイルを読み込む。
///
/// 引用符で囲まれた値には対応しない。
pub fn read_csv_table<P>(path: P) -> MeicResult<CsvTable>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| MeicError::Open(format!("`{}`: {e}", path.display())))?;

    parse_csv_table(BufReader::new(file), &path.display().to_string())
}

/// CSVを解析する。
///
/// 空行は読み飛ばし、各値の前後の空白はトリムする。
pub fn parse_csv_table<R>(reader: R, name: &str) -> MeicResult<CsvTable>
where
    R: BufRead,
{
    let mut table = CsvTable::default();
    let mut has_header = false;
    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| {
            MeicError::Read(format!("`{name}`の{}行目の読み込みに失敗しました。{e}", number + 1))
        })?;
        let line = line.trim_start_matches('\u{feff}');
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<String> = line.split(',').map(|f| f.trim().to_string()).collect();
        if !has_header {
            table.header = fields;
            has_header = true;
            continue;
        }
        if fields.len() != table.header.len() {
            return Err(MeicError::Read(format!(
                "`{name}`の{}行目の列数({})が、見出しの列数({})と一致しません。",
                number + 1,
                fields.len(),
                table.header.len()
            )));
        }
        table.rows.push(fields);
    }
    if !has_header {
        return Err(MeicError::Read(format!("`{name}`に見出しがありません。")));
    }

    Ok(table)
}

macro_rules! parse_number {
    ($vis:vis $func_name:ident, $type: ty) => {
        $vis fn $func_name(token: &str, what: &str) -> MeicResult<$type> {
            token.trim().parse::<$type>().map_err(|e| {
                MeicError::Read(format!("{what}の値`{token}`を数値に変換できません。{e}"))
            })
        }
    };
}

parse_number!(pub(crate) parse_usize, usize);
parse_number!(pub(crate) parse_u8, u8);
parse_number!(pub(crate) parse_f64, f64);
