use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mqtt_exporter::{
    BuildError, CollectedMetric, Configuration, ExporterBuilder, MetricPublisher,
    LIVENESS_METRIC_NAME,
};

const TEMPERATURE_CONFIGURATION: &str = r#"{
    "filters": {
        "temp": {
            "filter": "sensors/(?P<L_room>[a-z]+)/temperature",
            "values": { "value": "$.value" },
            "group": "sensor",
            "type": "counter"
        }
    },
    "prefix": "",
    "payloadType": "json",
    "topics": ["sensors/+/temperature"]
}"#;

fn write_configuration(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir()
        .join(format!("mqtt-exporter-{}-{name}.json", std::process::id()));
    fs::write(&path, contents).unwrap_or_else(|e| panic!("failed to write {path:?}: {e}"));
    path
}

fn unix_now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs_f64()
}

fn wait_for_samples(publisher: &MetricPublisher, count: usize) -> Vec<CollectedMetric> {
    for _ in 0..200 {
        let collected = publisher.collect();
        if collected.len() == count + 1 {
            return collected;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("store never reached {count} samples");
}

#[test]
fn test_matching_message_is_scraped() {
    let path = write_configuration("scraped", TEMPERATURE_CONFIGURATION);
    let configuration = Configuration::from_path(&path).unwrap();
    fs::remove_file(&path).ok();

    let exporter = ExporterBuilder::new(configuration).build_components().unwrap();
    let handler = exporter.handler();
    let publisher = exporter.publisher();

    let before = unix_now();
    assert_eq!(handler.handle("sensors/kitchen/temperature", br#"{"value": 21.5}"#), 1);
    let after = unix_now();

    let collected = wait_for_samples(&publisher, 1);
    let liveness = &collected[0];
    assert_eq!(liveness.name, LIVENESS_METRIC_NAME);
    assert!(liveness.value >= before && liveness.value <= after);

    let sample = &collected[1];
    assert_eq!(sample.name, "sensor_value");
    assert_eq!(sample.value, 21.5);
    assert_eq!(sample.labels.len(), 1);
    assert_eq!(sample.labels["room"], "kitchen");

    let rendered = publisher.render();
    assert!(rendered.contains("# TYPE sensor_value gauge\n"));
    assert!(rendered.contains("sensor_value{room=\"kitchen\"} 21.5\n"));

    exporter.shutdown();
}

#[test]
fn test_uncoercible_value_still_refreshes_liveness() {
    let configuration = Configuration::from_json(TEMPERATURE_CONFIGURATION).unwrap();
    let exporter = ExporterBuilder::new(configuration).build_components().unwrap();
    let handler = exporter.handler();
    let publisher = exporter.publisher();

    assert_eq!(publisher.collect()[0].value, 0.0);

    let before = unix_now();
    assert_eq!(handler.handle("sensors/kitchen/temperature", br#"{"value": "bad"}"#), 0);

    let collected = publisher.collect();
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].name, LIVENESS_METRIC_NAME);
    assert!(collected[0].value >= before);

    // Unmatched topics and absent values leave the gauge alone.
    let last = collected[0].value;
    thread::sleep(Duration::from_millis(10));
    assert_eq!(handler.handle("actuators/kitchen/valve", br#"{"value": 1}"#), 0);
    assert_eq!(handler.handle("sensors/kitchen/temperature", br#"{"other": 1}"#), 0);
    assert_eq!(publisher.collect()[0].value, last);

    exporter.shutdown();
}

#[test]
fn test_latest_value_wins() {
    let configuration = Configuration::from_json(TEMPERATURE_CONFIGURATION).unwrap();
    let exporter = ExporterBuilder::new(configuration).build_components().unwrap();
    let handler = exporter.handler();
    let publisher = exporter.publisher();

    handler.handle("sensors/kitchen/temperature", br#"{"value": 5.0}"#);
    handler.handle("sensors/kitchen/temperature", br#"{"value": 7.0}"#);
    handler.handle("sensors/attic/temperature", br#"{"value": "ON"}"#);

    // The writer applies samples in order, so once the last one lands the others have too.
    let collected = wait_for_samples(&publisher, 2);
    assert_eq!(collected[1].labels["room"], "attic");
    assert_eq!(collected[1].value, 1.0);
    assert_eq!(collected[2].labels["room"], "kitchen");
    assert_eq!(collected[2].value, 7.0);

    exporter.shutdown();
}

#[test]
fn test_unsupported_payload_type_is_fatal() {
    let path = write_configuration(
        "unsupported",
        r#"{ "filters": {}, "prefix": "", "payloadType": "yaml", "topics": ["a/#"] }"#,
    );
    let result = Configuration::from_path(&path);
    fs::remove_file(&path).ok();

    match result {
        Err(BuildError::UnsupportedPayloadType(kind)) => assert_eq!(kind, "yaml"),
        other => panic!("unexpected result: {:?}", other.map(|c| c.topics)),
    }
}

#[test]
fn test_invalid_filter_is_fatal() {
    let configuration = Configuration::from_json(
        r#"{
            "filters": { "broken": { "filter": "sensors/(?P<L_room", "values": {} } },
            "payloadType": "json",
            "topics": []
        }"#,
    )
    .unwrap();

    let result = ExporterBuilder::new(configuration).build_components();
    assert!(matches!(result, Err(BuildError::InvalidFilterPattern { filter, .. }) if filter == "broken"));
}
