//! Loading `PollSettings` from serialized configuration.

use std::time::Duration;

use poller::prelude::*;
use pretty_assertions::assert_eq;

#[test]
fn empty_object_uses_defaults() {
    let settings: PollSettings = serde_json::from_str("{}").unwrap();
    assert_eq!(settings, PollSettings::default());
    assert_eq!(settings.interval, Duration::from_millis(500));
    assert_eq!(settings.retries, 5);
}

#[test]
fn partial_object_overrides_fields() {
    let settings: PollSettings = serde_json::from_str(r#"{ "retries": 3 }"#).unwrap();
    assert_eq!(settings, PollSettings::new().with_retries(3));
}

#[test]
fn round_trips_through_json() {
    let settings = PollSettings::new()
        .with_interval(Duration::from_millis(250))
        .with_retries(8)
        .with_attempt_timeout(Duration::from_secs(2))
        .with_overall_deadline(Duration::from_secs(30));

    let json = serde_json::to_string(&settings).unwrap();
    let back: PollSettings = serde_json::from_str(&json).unwrap();
    assert_eq!(back, settings);
}

#[cfg(feature = "humantime")]
#[test]
fn humantime_durations() {
    let settings: PollSettings = serde_json::from_str(
        r#"{ "interval": "250ms", "attempt_timeout": "2s", "overall_deadline": "1m" }"#,
    )
    .unwrap();
    assert_eq!(settings.interval, Duration::from_millis(250));
    assert_eq!(settings.attempt_timeout, Some(Duration::from_secs(2)));
    assert_eq!(settings.overall_deadline, Some(Duration::from_secs(60)));
}

#[tokio::test(start_paused = true)]
async fn loaded_settings_drive_a_run() {
    let settings: PollSettings = serde_json::from_str(r#"{ "retries": 2 }"#).unwrap();
    let err = Poller::<(), &str>::builder()
        .task(|| Err::<(), _>("derp"))
        .settings(settings)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.attempts(), 2);
}

#[test]
fn invalid_loaded_settings_fail_build() {
    let settings: PollSettings = serde_json::from_str(r#"{ "retries": 0 }"#).unwrap();
    let err = Poller::<(), &str>::builder()
        .task(|| Err::<(), _>("derp"))
        .settings(settings)
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Validation { .. }));
}
