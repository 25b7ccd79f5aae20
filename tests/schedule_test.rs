use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use evsolar::error::{EvSolarError, Result};
use evsolar::schedule::{
    ChargingWindow, Daylight, DaylightSource, DisableRecord, Gate, Schedule, Timezone,
    parse_sunrise_response, time_in_window,
};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap()
}

fn utc_tz() -> Timezone {
    Timezone::Named(chrono_tz::UTC)
}

#[test]
fn window_wraps_midnight() {
    let (start, end) = (hm(22, 0), hm(6, 0));
    assert!(time_in_window(hm(23, 30), start, end));
    assert!(time_in_window(hm(2, 0), start, end));
    assert!(time_in_window(hm(6, 0), start, end));
    assert!(!time_in_window(hm(12, 0), start, end));
}

#[test]
fn sunrise_response_parses_twelve_hour_clock() {
    let body = r#"{"results":{"date":"2024-06-01","sunrise":"5:31:12 AM","sunset":"8:27:45 PM",
        "first_light":"3:45:10 AM","last_light":"10:13:47 PM","dawn":"4:59:33 AM","dusk":"8:59:24 PM",
        "solar_noon":"12:59:29 PM","golden_hour":"7:48:55 PM","day_length":"14:56:33",
        "timezone":"America/Denver","utc_offset":-360},"status":"OK"}"#;
    let d = parse_sunrise_response(body).unwrap();
    assert_eq!(d.date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    assert_eq!(d.sunrise, NaiveTime::from_hms_opt(5, 31, 12).unwrap());
    assert_eq!(d.sunset, NaiveTime::from_hms_opt(20, 27, 45).unwrap());
}

#[test]
fn polar_night_has_no_sunrise() {
    let body = r#"{"results":{"date":"2024-12-21","sunrise":null,"sunset":null},"status":"OK"}"#;
    assert!(parse_sunrise_response(body).is_err());
}

#[tokio::test]
async fn fixed_window_in_named_timezone() {
    let mut schedule = Schedule::new(
        ChargingWindow::Fixed {
            start: hm(9, 0),
            end: hm(17, 0),
        },
        Timezone::Named(chrono_tz::Europe::Amsterdam),
    );
    // 08:30 UTC is 10:30 in Amsterdam during summer time
    assert_eq!(schedule.gate(utc(2024, 7, 1, 8, 30)).await, Gate::Open);
    // 15:30 UTC is 17:30 local
    assert_eq!(schedule.gate(utc(2024, 7, 1, 15, 30)).await, Gate::Closed);
}

struct FakeSun {
    calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl DaylightSource for FakeSun {
    async fn daylight(
        &self,
        _latitude: f64,
        _longitude: f64,
        date: NaiveDate,
        _timezone: Timezone,
    ) -> Result<Daylight> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EvSolarError::network("HTTP 503"));
        }
        Ok(Daylight {
            date,
            sunrise: hm(6, 0),
            sunset: hm(20, 0),
        })
    }
}

fn daylight_schedule() -> (Schedule, Arc<AtomicUsize>, Arc<AtomicBool>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let fail = Arc::new(AtomicBool::new(false));
    let schedule = Schedule::new(
        ChargingWindow::Daylight {
            latitude: 39.74,
            longitude: -104.99,
        },
        utc_tz(),
    )
    .with_daylight_source(Box::new(FakeSun {
        calls: calls.clone(),
        fail: fail.clone(),
    }));
    (schedule, calls, fail)
}

#[tokio::test]
async fn daylight_is_fetched_once_per_day() {
    let (mut schedule, calls, _fail) = daylight_schedule();
    assert_eq!(schedule.gate(utc(2024, 6, 1, 12, 0)).await, Gate::Open);
    assert_eq!(schedule.gate(utc(2024, 6, 1, 21, 0)).await, Gate::Closed);
    assert_eq!(schedule.gate(utc(2024, 6, 1, 5, 0)).await, Gate::Closed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(schedule.gate(utc(2024, 6, 2, 7, 0)).await, Gate::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_lookup_keeps_previous_window() {
    let (mut schedule, calls, fail) = daylight_schedule();
    assert_eq!(schedule.gate(utc(2024, 6, 1, 12, 0)).await, Gate::Open);

    fail.store(true, Ordering::SeqCst);
    assert_eq!(schedule.gate(utc(2024, 6, 2, 22, 0)).await, Gate::Closed);
    assert_eq!(schedule.daylight().unwrap().date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    // Within the retry delay no new lookup is made
    schedule.gate(utc(2024, 6, 2, 22, 5)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unknown_daylight_leaves_gate_open() {
    let (mut schedule, _calls, fail) = daylight_schedule();
    fail.store(true, Ordering::SeqCst);
    assert_eq!(schedule.gate(utc(2024, 6, 1, 23, 0)).await, Gate::Open);
}

#[tokio::test]
async fn disable_file_suspends() {
    let dir = tempfile::tempdir().unwrap();
    let flag = dir.path().join("disable");
    let mut schedule =
        Schedule::new(ChargingWindow::Always, Timezone::Local).with_disable_file(&flag);
    assert_eq!(schedule.gate(Utc::now()).await, Gate::Open);
    std::fs::write(&flag, b"").unwrap();
    assert_eq!(schedule.gate(Utc::now()).await, Gate::Suspended);
    std::fs::remove_file(&flag).unwrap();
    assert_eq!(schedule.gate(Utc::now()).await, Gate::Open);
}

/// Serves whatever the test last published
struct FakeRecord {
    value: Arc<Mutex<Result<Option<String>>>>,
    names: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl DisableRecord for FakeRecord {
    async fn txt(&self, name: &str) -> Result<Option<String>> {
        self.names.lock().unwrap().push(name.to_string());
        match &*self.value.lock().unwrap() {
            Ok(v) => Ok(v.clone()),
            Err(e) => Err(EvSolarError::network(e.to_string())),
        }
    }
}

#[tokio::test]
async fn disable_record_suspends_unless_false_or_zero() {
    let value = Arc::new(Mutex::new(Ok(Some("False".to_string()))));
    let names = Arc::new(Mutex::new(Vec::new()));
    let record = FakeRecord {
        value: value.clone(),
        names: names.clone(),
    };
    let mut schedule = Schedule::new(ChargingWindow::Always, Timezone::Local)
        .with_disable_record("evsolar.example.net", Box::new(record));

    assert_eq!(schedule.gate(Utc::now()).await, Gate::Open);
    *value.lock().unwrap() = Ok(Some("1".to_string()));
    assert_eq!(schedule.gate(Utc::now()).await, Gate::Suspended);
    *value.lock().unwrap() = Ok(Some("0".to_string()));
    assert_eq!(schedule.gate(Utc::now()).await, Gate::Open);
    *value.lock().unwrap() = Ok(None);
    assert_eq!(schedule.gate(Utc::now()).await, Gate::Open);
    assert_eq!(names.lock().unwrap()[0], "evsolar.example.net");
}

#[tokio::test]
async fn failed_disable_lookup_leaves_control_enabled() {
    let record = FakeRecord {
        value: Arc::new(Mutex::new(Err(EvSolarError::network("SERVFAIL")))),
        names: Arc::new(Mutex::new(Vec::new())),
    };
    let mut schedule = Schedule::new(ChargingWindow::Always, Timezone::Local)
        .with_disable_record("evsolar.example.net", Box::new(record));
    assert_eq!(schedule.gate(Utc::now()).await, Gate::Open);
}

#[tokio::test]
async fn disable_file_skips_record_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let flag = dir.path().join("disable");
    std::fs::write(&flag, b"").unwrap();
    let names = Arc::new(Mutex::new(Vec::new()));
    let record = FakeRecord {
        value: Arc::new(Mutex::new(Ok(Some("False".to_string())))),
        names: names.clone(),
    };
    let mut schedule = Schedule::new(ChargingWindow::Always, Timezone::Local)
        .with_disable_file(&flag)
        .with_disable_record("evsolar.example.net", Box::new(record));
    assert_eq!(schedule.gate(Utc::now()).await, Gate::Suspended);
    assert!(names.lock().unwrap().is_empty());
}
