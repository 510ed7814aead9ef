use std::path::PathBuf;

use flightprep::{
    init_logging, load_pipeline_config, load_raw_dir, log_app_start, log_run_finish,
    log_run_paths, logging_config_from_env, prepare_dataset, save_artifacts, write_splits,
    LoadConfig, PipelineConfig, ARTIFACTS_FILE_NAME,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let input_dir = std::env::var("FLIGHTPREP_INPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/raw"));
    let output_dir = std::env::var("FLIGHTPREP_OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/prepared"));
    let config_path = std::env::var("FLIGHTPREP_CONFIG").ok().map(PathBuf::from);

    log_run_paths(&input_dir, &output_dir, config_path.as_deref());

    let cfg = match &config_path {
        Some(path) => load_pipeline_config(path)?,
        None => PipelineConfig::default(),
    };

    let table = load_raw_dir(&input_dir, &LoadConfig::default())?;
    let prepared = prepare_dataset(table, &cfg)?;

    let mut written = write_splits(&output_dir, &prepared.splits, &prepared.artifacts.schema)?;
    let artifacts_path = output_dir.join(ARTIFACTS_FILE_NAME);
    save_artifacts(&artifacts_path, &prepared.artifacts)?;
    written.push(artifacts_path);

    log_run_finish(&prepared.report, written.len());

    println!(
        "Prepared {} rows | train={} validation={} test={} dropped={} ({:.2}%)",
        prepared.report.quality.rows,
        prepared.report.train_rows,
        prepared.report.validation_rows,
        prepared.report.test_rows,
        prepared.report.target.dropped_rows,
        prepared.report.target.drop_rate() * 100.0
    );
    for path in &written {
        println!("  wrote {}", path.display());
    }

    Ok(())
}
