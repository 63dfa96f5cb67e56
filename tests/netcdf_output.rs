#![cfg(feature = "netcdf")]

use std::fs;
use std::path::PathBuf;

use ndarray::Array3;
use time::macros::{date, datetime};

use meic_ctm::config::{GridSpec, OutputNaming, Settings, SimulationWindow};
use meic_ctm::projection::LambertConformal;
use meic_ctm::species::SpeciesList;
use meic_ctm::writers::{GridFileWriter, NetcdfBackend};

fn settings(output_dir: PathBuf) -> Settings {
    Settings {
        window: SimulationWindow::new(date!(2023-01-31), date!(2023-01-31), 0, 24).unwrap(),
        grid: GridSpec {
            grid_type: 2,
            grid_name: String::from("MEIC2"),
            nlays: 1,
            nrows: 2,
            ncols: 3,
            xorig: -1500.0,
            yorig: -1000.0,
            xcell: 1000.0,
            ycell: 1000.0,
            vglvls: vec![1.0, 0.995],
            projection: LambertConformal::from_proj_str(
                "+proj=lcc +lat_1=25 +lat_2=40 +lon_0=110 +lat_0=34",
            )
            .unwrap(),
        },
        species: SpeciesList::from_pairs([("NO", "NOx"), ("PEC", "BC")], |_| {
            Some(String::from("moles/s"))
        })
        .unwrap(),
        output: OutputNaming {
            dir: output_dir,
            prefix: String::from("EM_China_d01_"),
        },
        created: datetime!(2024-01-02 03:04:05),
    }
}

fn write_day(settings: &Settings) -> PathBuf {
    let day_start = datetime!(2023-01-31 00:00);
    let mut writer = GridFileWriter::new(NetcdfBackend, settings);
    writer.open_day(day_start).unwrap();
    for slot in 0..24u32 {
        let dt = SimulationWindow::slot_time(day_start, slot);
        writer.write_time_flags(slot as usize, dt).unwrap();
        for index in 0..settings.species.len() {
            let field = Array3::from_elem((1, 2, 3), f64::from(slot) + index as f64);
            writer.write_field(slot as usize, index, &field).unwrap();
        }
    }
    writer.close_day().unwrap()
}

#[test]
fn rewriting_a_day_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path().join("out"));

    let path = write_day(&settings);
    let first = fs::read(&path).unwrap();
    let path_again = write_day(&settings);
    assert_eq!(path, path_again);
    assert_eq!(first, fs::read(&path).unwrap());

    let staging = settings.output.staging_path_for(date!(2023-01-31)).unwrap();
    assert!(!staging.exists());
}

#[test]
fn committed_file_has_ioapi_header() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path().join("out"));
    let path = write_day(&settings);

    let file = netcdf::open(&path).unwrap();
    assert_eq!(file.dimension("TSTEP").unwrap().len(), 24);
    assert_eq!(file.dimension("VAR").unwrap().len(), 2);
    let sdate = file.attribute("SDATE").unwrap().value().unwrap();
    assert!(matches!(sdate, netcdf::AttributeValue::Int(2023031)));
    let tflag = file.variable("TFLAG").unwrap();
    let flags = tflag.get_values::<i32, _>((23, 1, ..)).unwrap();
    assert_eq!(flags, vec![2023031, 230000]);
}

#[test]
fn aborted_day_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path().join("out"));
    let mut writer = GridFileWriter::new(NetcdfBackend, &settings);
    let path = writer.open_day(datetime!(2023-01-31 00:00)).unwrap();
    writer.abort_day().unwrap();
    assert!(!path.exists());
    assert!(!settings
        .output
        .staging_path_for(date!(2023-01-31))
        .unwrap()
        .exists());
}
