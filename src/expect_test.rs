#[cfg(test)]
mod tests {
    use super::super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_poll_until_succeeds_once_condition_holds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = poll_until("third check", Duration::from_secs(2), || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(Observation::new(n >= 3, format!("check {}", n)))
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out_with_last_observation() {
        let err = poll_until("#dashboard to be visible", Duration::from_millis(250), || async {
            Ok(Observation::new(false, "hidden"))
        })
        .await
        .unwrap_err();

        match err {
            VerifyError::Timeout {
                expectation,
                timeout,
                observed,
            } => {
                assert_eq!(expectation, "#dashboard to be visible");
                assert_eq!(timeout, Duration::from_millis(250));
                assert_eq!(observed, "hidden");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_check_errors_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = poll_until("recovers", Duration::from_secs(2), || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("stale element reference");
                }
                Ok(Observation::new(true, "ok"))
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_check_error_becomes_observation() {
        let err = poll_until("never", Duration::from_millis(150), || async {
            Err::<Observation, _>(anyhow::anyhow!("no such window"))
        })
        .await
        .unwrap_err();

        assert!(err.to_string().contains("error: no such window"));
    }

    #[tokio::test]
    async fn test_zero_timeout_checks_once() {
        let result = poll_until("immediate", Duration::ZERO, || async {
            Ok(Observation::new(true, "ok"))
        })
        .await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_has_class_token() {
        assert!(has_class_token("page active", "active"));
        assert!(has_class_token("  active  ", "active"));
        assert!(!has_class_token("page inactive", "active"));
        assert!(!has_class_token("", "active"));
    }
}
