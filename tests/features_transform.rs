use chrono::{Duration, NaiveDateTime};
use flightprep::{
    apply_historical_averages, assert_schema_compatible, build_feature_schema, build_targets,
    derive_calendar_features, derive_features, encode_cyclical, flag_flights, write_partition_csv,
    AveragedValue, CalendarConfig, CategoryColumn, ColumnRole, FeatureDType, FeatureError,
    FittedAverages, FlightRecord, HistoricalAverageConfig, HistoricalAverageEncoder,
    HistoricalError, LabeledFlight, PeriodOfDay, QualityConfig, TargetConfig,
    FEATURE_SCHEMA_VERSION, FLAG_COLUMNS, FLAG_MISSING_ORIGIN_AIRPORT,
};

fn ts(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").expect("valid timestamp")
}

fn flight(airline: &str, origin: Option<&str>, delay_minutes: i64) -> LabeledFlight {
    let scheduled = ts("2023-07-07 18:30:00");
    LabeledFlight::new(
        FlightRecord {
            airline: Some(airline.to_string()),
            origin_airport: origin.map(str::to_string),
            destination_airport: Some("SBRJ".to_string()),
            ..FlightRecord::default()
        },
        scheduled,
        scheduled + Duration::minutes(delay_minutes),
        &TargetConfig::default(),
    )
}

fn airline_only(value: AveragedValue) -> HistoricalAverageConfig {
    HistoricalAverageConfig {
        columns: vec![CategoryColumn::Airline],
        value,
    }
}

#[test]
fn calendar_features_follow_business_rules() {
    let cfg = CalendarConfig::default();
    // 2023-07-07 is a Friday, counted as weekend.
    let friday = derive_calendar_features(ts("2023-07-07 18:30:00"), 30.0, &cfg);
    assert_eq!(friday.hour_of_day, 18);
    assert_eq!(friday.day_of_week, 4);
    assert_eq!(friday.month, 7);
    assert_eq!(friday.period_of_day, PeriodOfDay::Evening);
    assert_eq!(friday.weekend, 1);
    assert_eq!(friday.high_season, 1);
    assert!((friday.delay_log - 31.0_f64.ln()).abs() < 1e-12);
    assert_eq!(friday.delay_capped, 30.0);

    let thursday = derive_calendar_features(ts("2023-03-09 04:59:00"), -5.0, &cfg);
    assert_eq!(thursday.day_of_week, 3);
    assert_eq!(thursday.weekend, 0);
    assert_eq!(thursday.high_season, 0);
    assert_eq!(thursday.period_of_day, PeriodOfDay::LateNight);
    assert_eq!(thursday.delay_log, 0.0);
    assert_eq!(thursday.delay_capped, 0.0);

    let december = derive_calendar_features(ts("2023-12-03 12:00:00"), 500.0, &cfg);
    assert_eq!(december.day_of_week, 6);
    assert_eq!(december.weekend, 1);
    assert_eq!(december.high_season, 1);
    assert_eq!(december.period_of_day, PeriodOfDay::Afternoon);
    assert_eq!(december.delay_capped, 120.0);
}

#[test]
fn cyclical_pairs_lie_on_the_unit_circle() {
    let mut t = ts("2023-01-01 00:00:00");
    for _ in 0..400 {
        let f = encode_cyclical(Some(t));
        for (s, c) in [
            (f.hour_sin, f.hour_cos),
            (f.dow_sin, f.dow_cos),
            (f.month_sin, f.month_cos),
        ] {
            assert!((s * s + c * c - 1.0).abs() < 1e-12);
        }
        t += Duration::hours(23);
    }
}

#[test]
fn cyclical_encoding_wraps_midnight_and_january() {
    let midnight = encode_cyclical(Some(ts("2023-01-02 00:00:00")));
    let late = encode_cyclical(Some(ts("2023-01-02 23:00:00")));
    assert_eq!(midnight.hour_sin, 0.0);
    assert_eq!(midnight.hour_cos, 1.0);
    // 23h sits next to 0h on the circle.
    assert!((late.hour_cos - (2.0 * std::f64::consts::PI * 23.0 / 24.0).cos()).abs() < 1e-12);
    assert!(late.hour_cos > 0.96);
    // January is month zero and Monday is day zero.
    assert_eq!(midnight.month_sin, 0.0);
    assert_eq!(midnight.dow_sin, 0.0);

    assert_eq!(encode_cyclical(None), midnight);
}

#[test]
fn historical_fit_learns_train_means_and_falls_back_to_global() {
    let train = vec![flight("A", Some("SBGR"), 10), flight("A", Some("SBGR"), 20), flight("B", None, 0)];
    let encoder = HistoricalAverageEncoder::new(HistoricalAverageConfig {
        columns: vec![CategoryColumn::Airline, CategoryColumn::OriginAirport],
        value: AveragedValue::DelayMinutes,
    });

    let fitted = encoder.fit_rows(&train).expect("fit succeeds");

    assert_eq!(fitted.global_mean, 10.0);
    assert_eq!(fitted.training_rows, 3);
    assert_eq!(fitted.mean_for(CategoryColumn::Airline, "A"), Some(15.0));
    assert_eq!(fitted.mean_for(CategoryColumn::Airline, "B"), Some(0.0));
    assert_eq!(fitted.mean_for(CategoryColumn::Airline, "C"), None);
    // Rows without an origin are left out of the per-origin means.
    assert_eq!(fitted.mean_for(CategoryColumn::OriginAirport, "SBGR"), Some(15.0));

    let unseen = flight("C", None, 999);
    assert_eq!(fitted.encode(&unseen), vec![10.0, 10.0]);
    assert_eq!(fitted.lookup(CategoryColumn::Airline, Some("C")), 10.0);
    assert_eq!(fitted.lookup(CategoryColumn::Airline, None), 10.0);
    assert_eq!(
        fitted.feature_names(),
        vec!["mean_delay_by_airline", "mean_delay_by_origin_airport"]
    );
}

#[test]
fn target_variant_averages_the_label() {
    let train = vec![flight("A", None, 30), flight("A", None, 0), flight("B", None, 16)];
    let fitted = HistoricalAverageEncoder::new(airline_only(AveragedValue::Target))
        .fit_rows(&train)
        .expect("fit succeeds");

    assert_eq!(fitted.mean_for(CategoryColumn::Airline, "A"), Some(0.5));
    assert_eq!(fitted.mean_for(CategoryColumn::Airline, "B"), Some(1.0));
    assert!((fitted.global_mean - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(fitted.feature_names(), vec!["mean_target_by_airline"]);
}

#[test]
fn explicit_values_fit_and_transform_plain_records() {
    let rows: Vec<FlightRecord> = ["A", "A", "B"]
        .iter()
        .map(|a| FlightRecord {
            airline: Some(a.to_string()),
            ..FlightRecord::default()
        })
        .collect();
    let encoder = HistoricalAverageEncoder::new(airline_only(AveragedValue::DelayMinutes));
    let fitted = encoder.fit(&rows, &[10.0, 20.0, 0.0]).expect("fit succeeds");

    let first = fitted.transform(&rows);
    let second = fitted.transform(&rows);
    assert_eq!(first, vec![vec![15.0], vec![15.0], vec![0.0]]);
    assert_eq!(first, second);
}

#[test]
fn historical_fit_rejects_bad_training_input() {
    let encoder = HistoricalAverageEncoder::new(HistoricalAverageConfig::default());
    let rows = vec![flight("A", None, 1)];

    assert!(matches!(
        encoder.fit(&rows, &[1.0, 2.0]),
        Err(HistoricalError::LengthMismatch { rows: 1, values: 2 })
    ));
    assert!(matches!(
        encoder.fit_rows::<LabeledFlight>(&[]),
        Err(HistoricalError::EmptyTrainingSet)
    ));
    assert!(matches!(
        encoder.fit(&rows, &[f64::NAN]),
        Err(HistoricalError::NonFiniteValue { row: 0 })
    ));
}

#[test]
fn fitted_averages_round_trip_bit_for_bit() {
    let train = vec![
        flight("A", Some("SBGR"), 1),
        flight("A", Some("SBKP"), 0),
        flight("A", Some("SBGR"), 0),
        flight("B", Some("SBKP"), 7),
    ];
    let fitted = HistoricalAverageEncoder::new(HistoricalAverageConfig::default())
        .fit_rows(&train)
        .expect("fit succeeds");

    let restored = FittedAverages::from_json(&fitted.to_json().expect("serialize"))
        .expect("deserialize");

    assert_eq!(restored, fitted);
    assert_eq!(restored.global_mean.to_bits(), fitted.global_mean.to_bits());
    let third = fitted
        .mean_for(CategoryColumn::Airline, "A")
        .expect("A was seen");
    assert_eq!(
        restored
            .mean_for(CategoryColumn::Airline, "A")
            .map(f64::to_bits),
        Some(third.to_bits())
    );
}

#[test]
fn applying_averages_adds_named_columns_without_touching_the_fit() {
    let train = derive_features(
        vec![flight("A", None, 10), flight("B", None, 30)],
        &CalendarConfig::default(),
    );
    let fitted = HistoricalAverageEncoder::new(airline_only(AveragedValue::DelayMinutes))
        .fit_rows(&train)
        .expect("fit succeeds");
    let before = fitted.clone();

    let unseen = derive_features(vec![flight("Z", None, 0)], &CalendarConfig::default());
    let encoded = apply_historical_averages(unseen, &fitted);

    assert_eq!(encoded[0].numeric_value("mean_delay_by_airline"), Some(20.0));
    assert_eq!(fitted, before);
}

#[test]
fn schema_is_deterministic_and_separates_roles() {
    let historical = vec![HistoricalAverageConfig::target(), HistoricalAverageConfig::delay_minutes()];
    let a = build_feature_schema(&historical);
    let b = build_feature_schema(&historical);

    assert_eq!(a, b);
    assert_eq!(a.version, FEATURE_SCHEMA_VERSION);
    assert_eq!(a.target_column(), Some("delayed"));
    assert_eq!(a.column_names().last(), Some(&"delayed"));

    let numeric = a.numeric_columns();
    assert!(numeric.contains(&"hour_sin"));
    assert!(numeric.contains(&"mean_target_by_airline"));
    assert!(numeric.contains(&"mean_delay_by_destination_airport"));
    assert!(!numeric.contains(&"delay_log"));
    assert!(!numeric.contains(&"delay_capped"));
    assert_eq!(
        a.target_derived_columns(),
        vec!["delay_minutes", "delay_log", "delay_capped"]
    );
    assert_eq!(
        a.categorical_columns(),
        vec![
            "airline",
            "line_type",
            "origin_airport",
            "destination_airport",
            "period_of_day"
        ]
    );

    let narrower = build_feature_schema(&[HistoricalAverageConfig::target()]);
    assert_ne!(a.fingerprint, narrower.fingerprint);
}

#[test]
fn schema_compatibility_check_matches_version_and_fingerprint() {
    let schema = build_feature_schema(&[HistoricalAverageConfig::default()]);

    assert_schema_compatible(FEATURE_SCHEMA_VERSION, &schema.fingerprint, &schema)
        .expect("compatibility should pass");

    let err = assert_schema_compatible(FEATURE_SCHEMA_VERSION + 1, &schema.fingerprint, &schema)
        .expect_err("version mismatch");
    assert!(matches!(err, FeatureError::SchemaVersionMismatch { .. }));

    let err = assert_schema_compatible(FEATURE_SCHEMA_VERSION, "deadbeef", &schema)
        .expect_err("fingerprint mismatch");
    assert!(matches!(err, FeatureError::SchemaFingerprintMismatch { .. }));
}

#[test]
fn kept_rows_export_their_quality_flags() {
    let departed = |airline: &str, origin: Option<&str>| FlightRecord {
        airline: Some(airline.to_string()),
        origin_airport: origin.map(str::to_string),
        scheduled_departure: Some("2023-03-10 10:00:00".to_string()),
        actual_departure: Some("2023-03-10 10:45:00".to_string()),
        ..FlightRecord::default()
    };
    let rows = vec![departed("AZU", None), departed("GLO", Some("SBGR"))];

    let (flagged, quality) = flag_flights(rows, &QualityConfig::default());
    assert_eq!(quality.missing_origin_airport, 1);
    let (labeled, _) = build_targets(flagged, &TargetConfig::default());
    assert_eq!(labeled.len(), 2);
    assert!(labeled[0].flags.missing_origin_airport);
    assert!(!labeled[1].flags.missing_origin_airport);

    let schema = build_feature_schema(&[]);
    for name in FLAG_COLUMNS {
        let column = schema
            .columns
            .iter()
            .find(|c| c.name == name)
            .expect("flag column in schema");
        assert_eq!(column.role, ColumnRole::Passthrough);
        assert_eq!(column.dtype, FeatureDType::Bool);
    }

    let featured = derive_features(labeled, &CalendarConfig::default());
    let mut out = Vec::new();
    write_partition_csv(&mut out, &featured, &schema).expect("write partition");

    let mut reader = csv::Reader::from_reader(out.as_slice());
    let headers = reader.headers().expect("header row").clone();
    let slot = |name: &str| headers.iter().position(|h| h == name).expect("column present");
    let records: Vec<csv::StringRecord> = reader
        .records()
        .collect::<Result<_, _>>()
        .expect("rows parse");

    assert_eq!(&records[0][slot(FLAG_MISSING_ORIGIN_AIRPORT)], "true");
    assert_eq!(&records[0][slot("origin_airport")], "");
    assert_eq!(&records[0][slot("flag_missing_actual_departure")], "false");
    assert_eq!(&records[1][slot(FLAG_MISSING_ORIGIN_AIRPORT)], "false");
}
