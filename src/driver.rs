//! 計算期間の各日について、格子ファイルを作成する。
use std::path::PathBuf;

use time::PrimitiveDateTime;
use tracing::{debug, info, warn};

use crate::config::{Settings, SimulationWindow};
use crate::disaggregation::Disaggregator;
use crate::factors::FactorLookup;
use crate::inventory::InventoryLoader;
use crate::writers::{GridFileBackend, GridFileWriter};
use crate::MeicResult;

/// 実行結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// 確定したファイル
    pub files: Vec<PathBuf>,

    /// 書き込んだ化学種の3次元排出量の数
    pub fields_written: usize,
}

/// 計算期間の開始日から終了日まで、1日に1つのファイルを作成する。
///
/// エラーが発生した場合は、その日のファイルを破棄して処理を中断する。
/// それまでに確定したファイルは残る。
///
/// # 引数
///
/// * `settings` - 設定
/// * `inventory` - 月別・部門別排出量
/// * `factors` - 時間配分係数
/// * `writer` - 格子ファイル・ライター
pub fn run<L, F, B>(
    settings: &Settings,
    inventory: &L,
    factors: &F,
    writer: &mut GridFileWriter<'_, B>,
) -> MeicResult<RunSummary>
where
    L: InventoryLoader + ?Sized,
    F: FactorLookup + ?Sized,
    B: GridFileBackend,
{
    let engine = Disaggregator::new(inventory, factors, settings.grid.shape());
    let mut summary = RunSummary::default();
    for day_start in settings.window.day_starts() {
        info!(date = %day_start.date(), "日別ファイルの作成を開始します");
        match run_day(settings, &engine, writer, day_start) {
            Ok((path, fields)) => {
                summary.files.push(path);
                summary.fields_written += fields;
            }
            Err(e) => {
                if let Err(abort_error) = writer.abort_day() {
                    warn!(error = %abort_error, "作成中のファイルを破棄できませんでした");
                }
                return Err(e);
            }
        }
    }
    info!(files = summary.files.len(), "すべてのファイルを作成しました");

    Ok(summary)
}

fn run_day<L, F, B>(
    settings: &Settings,
    engine: &Disaggregator<'_, L, F>,
    writer: &mut GridFileWriter<'_, B>,
    day_start: PrimitiveDateTime,
) -> MeicResult<(PathBuf, usize)>
where
    L: InventoryLoader + ?Sized,
    F: FactorLookup + ?Sized,
    B: GridFileBackend,
{
    writer.open_day(day_start)?;
    let mut fields = 0;
    for slot in 0..settings.window.hours_per_file() {
        let dt = SimulationWindow::slot_time(day_start, slot);
        debug!(slot, time = %dt, "時刻スロット");
        let slot = slot as usize;
        writer.write_time_flags(slot, dt)?;
        for (index, species) in settings.species.iter().enumerate() {
            let field = engine.hourly_field(species, dt)?;
            writer.write_field(slot, index, &field)?;
            fields += 1;
        }
    }
    let path = writer.close_day()?;

    Ok((path, fields))
}
