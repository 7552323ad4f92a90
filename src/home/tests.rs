use super::*;
use crate::store::{MemoryStore, StorePath};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

#[test]
fn test_status_parse_and_toggle() {
    assert_eq!("on".parse::<DeviceStatus>().unwrap(), DeviceStatus::On);
    assert_eq!("off".parse::<DeviceStatus>().unwrap(), DeviceStatus::Off);
    assert!("ON".parse::<DeviceStatus>().is_err());
    assert!("dim".parse::<DeviceStatus>().is_err());

    assert_eq!(DeviceStatus::On.toggled(), DeviceStatus::Off);
    assert_eq!(DeviceStatus::Off.toggled().to_string(), "on");
}

#[test]
fn test_device_serialization() {
    let devices = seed_devices();
    let value = serde_json::to_value(&devices).unwrap();
    assert_eq!(
        value,
        json!({
            "lamp1": {"name": "Living Room Lamp", "status": "off"},
            "fan1": {"name": "Bedroom Fan", "status": "off"},
            "ac1": {"name": "Air Conditioner", "status": "off", "temperature": 24.0}
        })
    );

    let parsed: Device = serde_json::from_value(json!({"name": "Lamp", "status": "on"})).unwrap();
    assert_eq!(parsed.status, DeviceStatus::On);
    assert_eq!(parsed.temperature, None);
    assert!(serde_json::from_value::<Device>(json!({"name": "Lamp", "status": "dim"})).is_err());
}

#[test]
fn test_device_paths() {
    assert_eq!(devices_path(), StorePath::parse("devices").unwrap());
    assert_eq!(
        device_status_path("lamp1").unwrap(),
        StorePath::parse("devices/lamp1/status").unwrap()
    );
    assert!(device_status_path("lamp.1").is_err());
    assert!(device_status_path("").is_err());
}

#[test]
fn test_sensor_samples_stay_in_bounds() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..10_000 {
        let reading = SensorReading::sample(&mut rng);
        assert!((24.0..=28.0).contains(&reading.temperature), "{:?}", reading);
        assert!((40.0..=50.0).contains(&reading.humidity), "{:?}", reading);
        assert_eq!(round_tenth(reading.temperature), reading.temperature);
        assert_eq!(round_tenth(reading.humidity), reading.humidity);
    }
}

#[test]
fn test_round_tenth() {
    assert_eq!(round_tenth(26.04), 26.0);
    assert_eq!(round_tenth(26.06), 26.1);
    assert_eq!(round_tenth(44.96), 45.0);
}

#[test]
fn test_snapshot_wire_format() {
    let snapshot = SensorReading::baseline().stamped(1_700_000_000_000);
    assert_eq!(
        serde_json::to_value(snapshot).unwrap(),
        json!({"temperature": 26.0, "humidity": 45.0, "lastUpdate": 1_700_000_000_000i64})
    );
    assert_eq!(
        Value::Object(snapshot.fields()),
        serde_json::to_value(snapshot).unwrap()
    );
}

#[test]
fn test_clock_strictly_increases() {
    let clock = MonotonicClock::new();
    let mut last = clock.now_millis();
    for _ in 0..1000 {
        let next = clock.now_millis();
        assert!(next > last);
        last = next;
    }

    let far_future = last + 1_000_000;
    assert_eq!(clock.after(Some(far_future)), far_future + 1);
    assert!(clock.now_millis() > far_future + 1);
}

#[tokio::test]
async fn test_initialize_is_idempotent_with_fresh_timestamp() {
    let store = MemoryStore::new();
    let clock = MonotonicClock::new();

    let (first_devices, first_sensors) = initialize_store(&store, &clock).await.unwrap();
    let (second_devices, second_sensors) = initialize_store(&store, &clock).await.unwrap();

    assert_eq!(first_devices, second_devices);
    assert!(second_sensors.last_update > first_sensors.last_update);

    let stored = store.get(&devices_path()).await.unwrap().unwrap();
    assert_eq!(stored, serde_json::to_value(seed_devices()).unwrap());
    let sensors: SensorSnapshot =
        serde_json::from_value(store.get(&sensors_path()).await.unwrap().unwrap()).unwrap();
    assert_eq!(sensors, second_sensors);
}

#[tokio::test]
async fn test_initialize_stamps_after_stored_timestamp() {
    let store = MemoryStore::new();
    let future = chrono::Utc::now().timestamp_millis() + 60_000;
    store
        .set(&sensors_path(), json!({"temperature": 20.0, "humidity": 30.0, "lastUpdate": future}))
        .await
        .unwrap();

    // A fresh clock (another process) still moves past the stored value
    let (_, sensors) = initialize_store(&store, &MonotonicClock::new()).await.unwrap();
    assert!(sensors.last_update > future);
}

#[tokio::test]
async fn test_initialize_resets_toggled_devices() {
    let store = MemoryStore::new();
    let clock = MonotonicClock::new();
    initialize_store(&store, &clock).await.unwrap();

    store
        .set(&device_status_path("lamp1").unwrap(), json!("on"))
        .await
        .unwrap();
    store
        .set(&device_status_path("garage").unwrap(), json!("on"))
        .await
        .unwrap();

    initialize_store(&store, &clock).await.unwrap();
    let devices = store.get(&devices_path()).await.unwrap().unwrap();
    assert_eq!(devices, serde_json::to_value(seed_devices()).unwrap());
}
