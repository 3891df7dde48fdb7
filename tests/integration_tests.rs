use sensor_query::transport::MockTransport;
use sensor_query::{
    FailurePolicy, QueryEngine, QueryParams, Record, SensorError, SensorField, SensorQueryConfig,
    SortOrder,
};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn engine_with(transport: Arc<MockTransport>, page_size: u64, policy: FailurePolicy) -> QueryEngine {
    let config = SensorQueryConfig {
        page_size,
        request_timeout_ms: 2_000,
        failure_policy: policy,
        ..SensorQueryConfig::default()
    };
    QueryEngine::new(config, transport).unwrap()
}

fn engine(transport: Arc<MockTransport>, page_size: u64) -> QueryEngine {
    engine_with(transport, page_size, FailurePolicy::Lenient)
}

fn readings(field: SensorField, start: u64, step: u64, values: &[i64]) -> Vec<Record> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| Record::new(start + i as u64 * step).with_value(field, v))
        .collect()
}

#[tokio::test]
async fn test_dust_scenario_with_reverse_page_completion() {
    let transport = Arc::new(MockTransport::with_records(readings(
        SensorField::Dust,
        1000,
        100,
        &[5, 3, 9, 1, 7, 2],
    )));
    // Last page answers first, first page answers last
    transport.delay_offset(0, Duration::from_millis(80));
    transport.delay_offset(2, Duration::from_millis(40));

    let report = assert_ok!(
        engine(transport.clone(), 2)
            .query(QueryParams::new(SensorField::Dust, 1000, 2000))
            .await
    );

    assert_eq!(report.total_matches, 6);
    assert_eq!(report.total_pages, 3);
    assert_eq!(report.pages_fetched, 3);
    assert!(!report.is_partial());

    let result = report.result;
    assert_eq!(result.average, 4);
    assert_eq!(result.maximum, 9);
    assert_eq!(result.minimum, 1);
    assert_eq!(result.values, vec![5, 3, 9, 1, 7, 2]);
    assert_eq!(result.timestamps, vec![1000, 1100, 1200, 1300, 1400, 1500]);
    assert_eq!(result.baseline, 0);

    assert_eq!(transport.page_requests().len(), 3);
}

#[tokio::test]
async fn test_empty_window_returns_zeros_without_page_calls() {
    let transport = Arc::new(MockTransport::with_records(readings(
        SensorField::Dust,
        10_000,
        10,
        &[1, 2, 3],
    )));

    let report = assert_ok!(
        engine(transport.clone(), 10)
            .query(QueryParams::new(SensorField::Dust, 0, 5_000))
            .await
    );

    assert_eq!(report.total_pages, 0);
    assert_eq!(report.result.average, 0);
    assert_eq!(report.result.maximum, 0);
    assert_eq!(report.result.minimum, 0);
    assert!(report.result.values.is_empty());
    assert!(report.result.timestamps.is_empty());

    // Probe only: no page requests, and start 0 needs no baseline lookup
    assert_eq!(transport.call_count(), 1);
    assert!(transport.page_requests().is_empty());
}

#[tokio::test]
async fn test_baseline_is_latest_prior_record() {
    let transport = Arc::new(MockTransport::new());
    transport.insert(Record::new(50).with_value(SensorField::Methane, 11));
    transport.insert(Record::new(99).with_value(SensorField::Methane, 42));
    transport.insert_all(readings(SensorField::Methane, 100, 10, &[1, 2, 3]));

    let engine = engine(transport, 10);

    let result = assert_ok!(engine.query_methane(100, 200).await);
    assert_eq!(result.baseline, 42);
    assert_eq!(result.values, vec![1, 2, 3]);

    let result = assert_ok!(engine.query_methane(50, 200).await);
    assert_eq!(result.baseline, 0);
    assert_eq!(result.values, vec![11, 42, 1, 2, 3]);
}

#[tokio::test]
async fn test_baseline_is_zero_when_latest_prior_record_lacks_field() {
    let transport = Arc::new(MockTransport::new());
    transport.insert(Record::new(50).with_value(SensorField::Dust, 11));
    transport.insert(Record::new(99).with_value(SensorField::Humidity, 70));
    transport.insert(Record::new(150).with_value(SensorField::Dust, 8));

    let result = assert_ok!(engine(transport.clone(), 10).query_dust(100, 200).await);
    assert_eq!(result.baseline, 0);
    assert_eq!(result.values, vec![8]);

    let baseline = transport
        .requests()
        .into_iter()
        .find(|d| d.is_baseline())
        .unwrap();
    assert_eq!(baseline.to_ts, 99);
    assert!(!baseline.requires_field());
}

#[tokio::test]
async fn test_descending_single_record_pages_are_not_baseline_lookups() {
    let transport = Arc::new(MockTransport::with_records(readings(
        SensorField::Dust,
        0,
        10,
        &[1, 2, 3],
    )));
    transport.fail_offset(1);

    let report = assert_ok!(
        engine(transport.clone(), 1)
            .query(
                QueryParams::new(SensorField::Dust, 0, 100)
                    .with_sort("datetime_idx", SortOrder::Descending)
            )
            .await
    );

    assert_eq!(report.total_pages, 3);
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.failed_pages.len(), 1);
    assert_eq!(report.failed_pages[0].page_index, 1);
    assert_eq!(report.result.timestamps, vec![0, 20]);
    assert_eq!(transport.page_requests().len(), 3);
}

#[tokio::test]
async fn test_baseline_failure_defaults_to_zero() {
    let transport = Arc::new(MockTransport::new());
    transport.insert(Record::new(99).with_value(SensorField::Dust, 42));
    transport.insert_all(readings(SensorField::Dust, 100, 10, &[4, 6]));
    transport.set_fail_baseline(true);

    let report = assert_ok!(
        engine(transport, 10)
            .query(QueryParams::new(SensorField::Dust, 100, 200))
            .await
    );

    assert_eq!(report.result.baseline, 0);
    assert_eq!(report.result.average, 5);
    assert!(report.baseline_error.is_some());
    assert!(report.is_partial());
}

#[tokio::test]
async fn test_descending_backend_order_is_resorted() {
    let transport = Arc::new(MockTransport::with_records(readings(
        SensorField::Temperature,
        1_000,
        1_000,
        &[20, 21, 22, 23, 24, 25, 26],
    )));
    transport.set_jitter(Duration::from_millis(20));

    let params = QueryParams::new(SensorField::Temperature, 1_000, 10_000)
        .with_sort("datetime_idx", SortOrder::Descending);
    let report = assert_ok!(engine(transport, 3).query(params).await);

    assert_eq!(report.total_pages, 3);
    assert_eq!(report.result.values, vec![20, 21, 22, 23, 24, 25, 26]);
    assert!(report.result.timestamps.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_series_stay_parallel_and_sorted_under_jitter() {
    let values: Vec<i64> = (0..57).map(|i| (i * 37 % 101) as i64).collect();
    let transport = Arc::new(MockTransport::with_records(readings(
        SensorField::Humidity,
        5_000,
        7,
        &values,
    )));
    transport.set_jitter(Duration::from_millis(15));

    let result = assert_ok!(engine(transport, 5).query_humidity(0, 1_000_000).await);

    assert_eq!(result.values.len(), result.timestamps.len());
    assert_eq!(result.values, values);
    assert!(result.timestamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(result.maximum, *values.iter().max().unwrap());
    assert_eq!(result.minimum, *values.iter().min().unwrap());
    assert_eq!(result.average, values.iter().sum::<i64>() / values.len() as i64);
}

#[tokio::test]
async fn test_repeated_query_is_identical() {
    let mut records = readings(SensorField::CarbonMonoxide, 0, 10, &[9, 8, 7, 6, 5, 4, 3, 2, 1]);
    // Equal timestamps straddling page boundaries
    records.push(Record::new(20).with_value(SensorField::CarbonMonoxide, 100));
    records.push(Record::new(40).with_value(SensorField::CarbonMonoxide, 200));
    let transport = Arc::new(MockTransport::with_records(records));
    transport.set_jitter(Duration::from_millis(20));

    let engine = engine(transport, 2);
    let first = assert_ok!(engine.query_carbon_monoxide(5, 500).await);
    let second = assert_ok!(engine.query_carbon_monoxide(5, 500).await);

    assert_eq!(first, second);
    assert_eq!(first.baseline, 9);
}

#[tokio::test]
async fn test_missing_field_records_do_not_skew_statistics() {
    let transport = Arc::new(MockTransport::new());
    transport.insert_all(readings(SensorField::Dust, 100, 10, &[10, 30]));
    transport.insert(Record::new(105).with_value(SensorField::Humidity, 1_000));
    transport.insert(Record::new(115).with_null(SensorField::Dust));

    let report = assert_ok!(
        engine(transport, 10)
            .query(QueryParams::new(SensorField::Dust, 0, 1_000))
            .await
    );

    assert_eq!(report.total_matches, 2);
    assert_eq!(report.result.average, 20);
    assert_eq!(report.result.maximum, 30);
    assert_eq!(report.result.minimum, 10);
    assert_eq!(report.result.timestamps, vec![100, 110]);
}

#[tokio::test]
async fn test_lenient_policy_reports_lost_pages() {
    let transport = Arc::new(MockTransport::with_records(readings(
        SensorField::Dust,
        0,
        1,
        &[1, 2, 3, 4, 5, 6],
    )));
    transport.fail_offset(2);

    let report = assert_ok!(
        engine(transport, 2)
            .query(QueryParams::new(SensorField::Dust, 0, 100))
            .await
    );

    assert!(report.is_partial());
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.failed_pages.len(), 1);
    assert_eq!(report.failed_pages[0].page_index, 1);
    assert_eq!(report.result.values, vec![1, 2, 5, 6]);
    assert_eq!(report.result.average, 3); // 14 / 4
}

#[tokio::test]
async fn test_strict_policy_fails_on_lost_page() {
    let transport = Arc::new(MockTransport::with_records(readings(
        SensorField::Dust,
        0,
        1,
        &[1, 2, 3, 4, 5, 6],
    )));
    transport.fail_offset(4);

    let err = assert_err!(
        engine_with(transport, 2, FailurePolicy::Strict)
            .query(QueryParams::new(SensorField::Dust, 0, 100))
            .await
    );

    match err {
        SensorError::PageFetch { page, .. } => assert_eq!(page, 2),
        other => panic!("expected page fetch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_probe_failure_is_terminal() {
    let transport = Arc::new(MockTransport::with_records(readings(
        SensorField::Dust,
        0,
        1,
        &[1, 2, 3],
    )));
    transport.set_fail_probe(true);

    let err = assert_err!(engine(transport.clone(), 2).query_dust(0, 100).await);
    assert!(matches!(err, SensorError::Probe { .. }));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_query_data_by_name() {
    let transport = Arc::new(MockTransport::with_records(readings(
        SensorField::Temperature,
        0,
        1,
        &[18, 22],
    )));
    let engine = engine(transport, 10);

    let result = assert_ok!(
        engine
            .query_data("temperature", "datetime_idx", SortOrder::Ascending, 0, 10)
            .await
    );
    assert_eq!(result.average, 20);

    let err = assert_err!(
        engine
            .query_data("pressure", "datetime_idx", SortOrder::Ascending, 0, 10)
            .await
    );
    assert!(matches!(err, SensorError::UnknownField(_)));
}
