// Unit tests for types module

use super::*;

#[test]
fn test_viewport_size_parse() {
    let size = ViewportSize::parse("1920x1080").unwrap();
    assert_eq!(size.width, 1920);
    assert_eq!(size.height, 1080);

    assert!(ViewportSize::parse("1920").is_err());
    assert!(ViewportSize::parse("1920x").is_err());
    assert!(ViewportSize::parse("x1080").is_err());
    assert!(ViewportSize::parse("abc x def").is_err());
    assert!(ViewportSize::parse("1920X1080").is_err()); // uppercase X
}

#[test]
fn test_output_format_default() {
    assert_eq!(OutputFormat::default(), OutputFormat::Simple);
    assert_eq!(serde_json::to_string(&OutputFormat::Json).unwrap(), "\"json\"");
}

#[test]
fn test_run_report_skips_missing_screenshot() {
    let report = RunReport {
        scenario: "smoke".to_string(),
        success: true,
        started_at: chrono::Utc::now(),
        duration_ms: 12,
        page_url: "http://localhost:8000/GST%20Reconciliation.html".to_string(),
        fixture_rows: 0,
        stages: vec![StageRecord {
            stage: "idle".to_string(),
            reached_after_ms: 3,
        }],
        console: Vec::new(),
        screenshot: None,
    };

    let value = serde_json::to_value(&report).unwrap();
    assert!(value.get("screenshot").is_none());
    assert!(value.get("console").is_none());
    assert_eq!(value["stages"][0]["stage"], "idle");
    assert_eq!(value["success"], true);
}

#[test]
fn test_console_message_display() {
    let message: ConsoleMessage =
        serde_json::from_str(r#"{"level": "warn", "text": "Sheet has 2 blank rows"}"#).unwrap();
    assert_eq!(
        message.to_string(),
        "Browser Console [warn]: Sheet has 2 blank rows"
    );
    assert!(!message.is_error());
}
