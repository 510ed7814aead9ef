//! Flight delay dataset preparation.
//!
//! Pipeline stages, in order:
//! - header normalization and typed records (`table`, `loader`)
//! - timestamp quality flags (`quality`)
//! - delay target and row filtering (`target`)
//! - calendar, cyclical and historical-average features
//! - stratified and time-ordered partitioning (`split`)
//! - CSV and fitted-artifact export

mod calendar;
mod cyclical;
mod export;
mod features;
mod historical;
mod loader;
mod observability;
mod pipeline;
mod quality;
mod split;
mod table;
mod target;

pub use calendar::{
    derive_calendar_features, period_of_day, CalendarConfig, CalendarFeatures, PeriodOfDay,
    COL_DAY_OF_WEEK, COL_DELAY_CAPPED, COL_DELAY_LOG, COL_HIGH_SEASON, COL_HOUR_OF_DAY,
    COL_MONTH, COL_PERIOD_OF_DAY, COL_WEEKEND,
};
pub use cyclical::{
    cyclical_pair, encode_cyclical, CyclicalFeatures, COL_DOW_COS, COL_DOW_SIN, COL_HOUR_COS,
    COL_HOUR_SIN, COL_MONTH_COS, COL_MONTH_SIN, CYCLICAL_COLUMNS,
};
pub use export::{
    load_artifacts, save_artifacts, write_partition_csv, write_splits, ExportError,
    ARTIFACTS_FILE_NAME,
};
pub use features::{
    apply_historical_averages, assert_schema_compatible, build_feature_schema, derive_features,
    ColumnRole, FeatureColumn, FeatureDType, FeatureError, FeatureSchema, FeaturedFlight,
    FEATURE_SCHEMA_VERSION,
};
pub use historical::{
    AveragedValue, CategorySource, ColumnAverages, DelayOutcome, FittedAverages,
    HistoricalAverageConfig, HistoricalAverageEncoder, HistoricalError,
};
pub use loader::{list_input_files, load_raw_dir, read_raw_csv, LoadConfig, LoadError};
pub use observability::{
    init_logging, log_app_start, log_run_finish, log_run_paths, logging_config_from_env,
    logging_config_from_lookup, LogFormat, LoggingConfig, LoggingInitError, ENV_LOG_FORMAT,
    ENV_LOG_LEVEL, ENV_LOG_TARGET,
};
pub use pipeline::{
    featurize_with_artifacts, load_pipeline_config, prepare_dataset, FittedArtifacts,
    PipelineConfig, PipelineError, PipelineReport, PreparedDataset, SplitStrategy,
};
pub use quality::{
    flag_flight, flag_flights, parse_timestamp, FlaggedFlight, QualityConfig, QualityFlags,
    QualityReport, FLAG_COLUMNS, FLAG_DEPARTURE_DELTA_IMPLAUSIBLE, FLAG_MISSING_ACTUAL_DEPARTURE,
    FLAG_MISSING_ORIGIN_AIRPORT, FLAG_MISSING_SCHEDULED_DEPARTURE, FLAG_SCHEDULED_OUT_OF_PERIOD,
    TIMESTAMP_FORMAT,
};
pub use split::{
    check_temporal_order, parse_cutoff, stratified_sample, stratified_split,
    stratified_train_val_test, temporal_split_by_cutoff, temporal_split_by_fraction, time_range,
    DatasetSplits, SplitError, SplitRow, StratifiedSplitConfig, TemporalCutoffSplitConfig,
    TemporalFractionSplitConfig,
};
pub use table::{
    canonical_column_name, normalize_columns, repair_header_encoding, CategoryColumn,
    FlightRecord, RawTable, TableError, COL_ACTUAL_ARRIVAL, COL_ACTUAL_DEPARTURE, COL_AIRLINE,
    COL_AUTHORIZATION_CODE, COL_DESTINATION_AIRPORT, COL_FLIGHT_NUMBER, COL_FLIGHT_STATUS,
    COL_JUSTIFICATION_CODE, COL_LINE_TYPE, COL_ORIGIN_AIRPORT, COL_SCHEDULED_ARRIVAL,
    COL_SCHEDULED_DEPARTURE, RAW_HEADER_MAP, RECORD_COLUMNS,
};
pub use target::{
    build_targets, delay_label, delay_minutes, LabeledFlight, TargetConfig, TargetReport,
    COL_DELAYED, COL_DELAY_MINUTES,
};
