use clap::Parser;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::info;
use tracing_subscriber::EnvFilter;

use meic_ctm::config::{Config, Settings, CONFIG_FILE_NAME};
use meic_ctm::driver::run;
use meic_ctm::factors::FactorTables;
use meic_ctm::inventory::MeicInventory;
use meic_ctm::species::SpeciesList;
use meic_ctm::writers::{GridFileWriter, NetcdfBackend};

/// MEICの月別排出量から、CMAQ用の時間別格子排出量ファイルを作成する
#[derive(Parser, Debug)]
#[command(name = "meic-ctm", long_about = None)]
struct Args {
    /// 開始日（YYYY-MM-DD）。設定ファイルの値より優先する
    #[arg(short, long)]
    start: Option<String>,

    /// 終了日（YYYY-MM-DD）。設定ファイルの値より優先する
    #[arg(short, long)]
    end: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_path(CONFIG_FILE_NAME)?;
    let window = config.window(args.start.as_deref(), args.end.as_deref())?;
    let grid = config.grid_spec()?;
    let species = SpeciesList::load(config.species_map_path(), config.species_unit_path())?;
    let factors = FactorTables::load(config.day_factor_path(), config.hour_factor_path())?;
    let inventory = MeicInventory::new(
        &config.base.inventory_dir,
        &config.base.sectors,
        grid.shape(),
    );
    let now = OffsetDateTime::now_utc();
    let settings = Settings {
        window,
        grid,
        species,
        output: config.output_naming(),
        created: PrimitiveDateTime::new(now.date(), now.time()),
    };
    info!(
        start = %settings.window.start(),
        end = %settings.window.end(),
        species = settings.species.len(),
        "計算を開始します"
    );

    let mut writer = GridFileWriter::new(NetcdfBackend, &settings);
    let summary = run(&settings, &inventory, &factors, &mut writer)?;
    info!(
        files = summary.files.len(),
        fields = summary.fields_written,
        "計算が終了しました"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_short_and_long_date_flags() {
        let args =
            Args::try_parse_from(["meic-ctm", "-s", "2023-01-31", "-e", "2023-02-01"]).unwrap();
        assert_eq!(args.start.as_deref(), Some("2023-01-31"));
        assert_eq!(args.end.as_deref(), Some("2023-02-01"));

        let args = Args::try_parse_from(["meic-ctm", "--start", "2023-03-01"]).unwrap();
        assert_eq!(args.start.as_deref(), Some("2023-03-01"));
        assert_eq!(args.end, None);
    }

    #[test]
    fn rejects_other_flags() {
        assert!(Args::try_parse_from(["meic-ctm", "--config", "other.toml"]).is_err());
    }
}
