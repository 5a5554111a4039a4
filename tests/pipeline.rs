use chrono::{Duration, NaiveDate};
use cltv::commands::{run, simulate};
use cltv::config::{parse_setting_pairs, PipelineConfig};
use cltv::models::CustomerRecord;
use cltv::outliers::ClampColumn;
use cltv::synthetic::{simulate_customers, SimulationConfig};
use cltv::{run_pipeline, CltvError};
use serde_json::Value;
use std::fs;
use std::sync::Once;
use tempfile::tempdir;

fn ensure_test_env() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn analysis_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()
}

/// Closed-form fixture: (tenure days, recency days, online orders, offline orders,
/// online value, offline value) for customer `i`.
fn fixture_row(i: usize) -> (i64, i64, f64, f64, f64, f64) {
    let tenure_days = 60 + ((i * 37) % 420) as i64;
    let recency_days = tenure_days * (1 + ((i * 11) % 9) as i64) / 10;
    (
        tenure_days,
        recency_days,
        (1 + i % 5) as f64,
        (1 + (i * 3) % 4) as f64,
        40.0 + ((i * 29) % 160) as f64 + 0.5,
        25.0 + ((i * 17) % 90) as f64,
    )
}

fn fixture_records() -> Vec<CustomerRecord> {
    (0..100)
        .map(|i| {
            let (tenure_days, recency_days, online, offline, online_value, offline_value) =
                fixture_row(i);
            let first = analysis_date() - Duration::days(tenure_days);
            let last = first + Duration::days(recency_days);
            CustomerRecord {
                master_id: format!("cust-{:03}", i),
                order_channel: Some("Desktop".to_string()),
                first_order_date: first.format("%Y-%m-%d").to_string(),
                last_order_date: last.format("%Y-%m-%d").to_string(),
                order_num_total_ever_online: online,
                order_num_total_ever_offline: offline,
                customer_value_total_ever_online: online_value,
                customer_value_total_ever_offline: offline_value,
            }
        })
        .collect()
}

fn simulated_records(customers: usize, seed: u64) -> Vec<CustomerRecord> {
    simulate_customers(&SimulationConfig {
        customers,
        seed,
        end_date: analysis_date(),
        ..SimulationConfig::default()
    })
    .unwrap()
}

#[test]
fn derived_features_match_closed_form_values() {
    ensure_test_env();
    let records = fixture_records();
    let report = run_pipeline(&records, &PipelineConfig::new(analysis_date())).unwrap();

    assert_eq!(report.input_customers, 100);
    assert_eq!(report.records.len(), 100);
    assert!(report.clamps.iter().all(|clamp| clamp.clamped == 0));

    for (i, record) in report.records.iter().enumerate() {
        let (tenure_days, recency_days, online, offline, online_value, offline_value) =
            fixture_row(i);
        let orders = online + offline;
        assert_eq!(record.customer_id, format!("cust-{:03}", i));
        assert!((record.recency - recency_days as f64 / 7.0).abs() < 1e-6);
        assert!((record.tenure - tenure_days as f64 / 7.0).abs() < 1e-6);
        assert_eq!(record.frequency as f64, orders);
        assert!((record.monetary_avg - (online_value + offline_value) / orders).abs() < 1e-6);
    }

    let top = report
        .records
        .iter()
        .max_by(|a, b| a.cltv.total_cmp(&b.cltv))
        .unwrap();
    assert_eq!(top.segment, 'A');
}

#[test]
fn projections_are_consistent_per_customer() {
    ensure_test_env();
    let report = run_pipeline(&fixture_records(), &PipelineConfig::new(analysis_date())).unwrap();

    for record in &report.records {
        let short = record.expected_sales_for(12).unwrap();
        let long = record.expected_sales_for(24).unwrap();
        assert!(short >= 0.0 && long >= short, "{}", record.customer_id);
        assert!(record.exp_average_value > 0.0);
        assert!(record.cltv.is_finite() && record.cltv >= 0.0);
    }
    assert!(report.gamma_gamma.q > 1.0);
    assert!(report.beta_geo_fit.is_some() && report.gamma_gamma_fit.is_some());
}

#[test]
fn repeated_runs_are_identical() {
    ensure_test_env();
    let records = simulated_records(300, 5);
    let snapshot = records.clone();
    let config = PipelineConfig::new(analysis_date());

    let first = run_pipeline(&records, &config).unwrap();
    let second = run_pipeline(&records, &config).unwrap();

    assert_eq!(first.records, second.records);
    assert_eq!(first.beta_geo, second.beta_geo);
    assert_eq!(first.gamma_gamma, second.gamma_gamma);
    assert_eq!(records, snapshot);
}

#[test]
fn simulated_table_satisfies_pipeline_properties() {
    ensure_test_env();
    let records = simulated_records(400, 7);
    let report = run_pipeline(&records, &PipelineConfig::new(analysis_date())).unwrap();

    assert_eq!(report.clamps.len(), ClampColumn::ALL.len());
    let customers = report.records.len();
    assert_eq!(
        customers + report.excluded_zero_activity + report.excluded_single_purchase,
        records.len()
    );

    for record in &report.records {
        assert!(record.frequency > 1);
        assert!(record.recency >= 0.0 && record.recency <= record.tenure);
        let source = records
            .iter()
            .find(|r| r.master_id == record.customer_id)
            .unwrap();
        let online_limit = report.clamps[0].thresholds.upper_limit;
        let offline_limit = report.clamps[1].thresholds.upper_limit;
        let expected_orders = source.order_num_total_ever_online.min(online_limit)
            + source.order_num_total_ever_offline.min(offline_limit);
        assert_eq!(record.frequency as f64, expected_orders);
    }

    let labels = ['A', 'B', 'C', 'D'];
    assert_eq!(report.segments.len(), 4);
    for (summary, label) in report.segments.iter().zip(labels) {
        assert_eq!(summary.segment, label);
        let expected = customers as f64 / 4.0;
        assert!((summary.customers as f64 - expected).abs() <= 1.0);
    }
    for pair in report.segments.windows(2) {
        assert!(pair[0].min_cltv > pair[1].max_cltv);
    }
    assert!(report.frequency_monetary_correlation.is_some());
}

#[test]
fn settings_reshape_the_output() {
    ensure_test_env();
    let settings =
        parse_setting_pairs(&["SALES_HORIZONS=4,8,52", "SEGMENT_COUNT=5", "CLTV_MONTHS=12"])
            .unwrap();
    let config = PipelineConfig::new(analysis_date())
        .with_settings(&settings)
        .unwrap();
    let records = fixture_records();
    let report = run_pipeline(&records, &config).unwrap();
    let baseline = run_pipeline(&records, &PipelineConfig::new(analysis_date())).unwrap();

    assert!(report.records.iter().all(|r| r.expected_sales.len() == 3));
    assert_eq!(report.segments.len(), 5);
    assert_eq!(report.segments[4].segment, 'E');
    for (longer, shorter) in report.records.iter().zip(&baseline.records) {
        assert!(longer.cltv > shorter.cltv);
    }
}

#[test]
fn invalid_inputs_abort_the_run() {
    ensure_test_env();
    let config = PipelineConfig::new(analysis_date());

    assert!(matches!(run_pipeline(&[], &config), Err(CltvError::Input(_))));

    let mut records = fixture_records();
    records[42].first_order_date = "not a date".to_string();
    match run_pipeline(&records, &config) {
        Err(CltvError::InvalidRecord { row, customer_id, .. }) => {
            assert_eq!(row, 42);
            assert_eq!(customer_id, "cust-042");
        }
        other => panic!("unexpected result {:?}", other.map(|r| r.records.len())),
    }

    let early = PipelineConfig::new(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
    assert!(matches!(
        run_pipeline(&fixture_records(), &early),
        Err(CltvError::Config(_))
    ));

    let mut single_purchase = fixture_records();
    for record in &mut single_purchase {
        record.order_num_total_ever_online = 1.0;
        record.order_num_total_ever_offline = 0.0;
    }
    assert!(matches!(
        run_pipeline(&single_purchase, &config),
        Err(CltvError::Precondition(_))
    ));

    let mut daily = config.clone();
    daily.cltv.time_unit = "day".parse().unwrap();
    assert!(matches!(
        run_pipeline(&fixture_records(), &daily),
        Err(CltvError::Config(_))
    ));
}

#[test]
fn cli_commands_round_trip_through_json() {
    ensure_test_env();
    let dir = tempdir().unwrap();
    let customers_path = dir.path().join("customers.json");
    let report_path = dir.path().join("out").join("cltv.json");

    let simulation = SimulationConfig {
        customers: 250,
        seed: 3,
        end_date: analysis_date(),
        ..SimulationConfig::default()
    };
    simulate::run(&customers_path, &simulation).unwrap();
    run::run(
        &customers_path,
        &report_path,
        analysis_date(),
        &["segment_count=3".to_string()],
    )
    .unwrap();

    let report: Value = serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    let rows = report["records"].as_array().unwrap();
    assert!(!rows.is_empty());
    assert_eq!(report["analysis_date"], "2021-06-01");
    assert_eq!(report["time_unit"], "week");
    for row in rows {
        let segment = row["segment"].as_str().unwrap();
        assert!(["A", "B", "C"].contains(&segment));
        assert_eq!(row["expected_sales"].as_array().unwrap().len(), 2);
    }

    let bad = run::run(
        &customers_path,
        &report_path,
        analysis_date(),
        &["SEGMENT_COUNT".to_string()],
    );
    assert!(bad.is_err());
}
