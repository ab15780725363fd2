// End-to-end verification flows against the in-memory store and audit sink

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use totp_lite::{Sha1, totp_custom};

use praxis_mfa::audit::{AttemptContext, MemoryAuditSink};
use praxis_mfa::config::MfaConfig;
use praxis_mfa::crypto::envelope::{self, EnvelopeKey};
use praxis_mfa::mfa::anomaly::{self, AnomalyConfig, RiskLevel};
use praxis_mfa::mfa::service::{MfaError, MfaService};
use praxis_mfa::models::{CodeSubmission, VerifiedMethod};
use praxis_mfa::storage::CredentialStore;
use praxis_mfa::storage::memory::MemoryCredentialStore;

struct Harness {
    service: MfaService,
    store: Arc<MemoryCredentialStore>,
    sink: Arc<MemoryAuditSink>,
    key: EnvelopeKey,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryCredentialStore::new());
    let sink = Arc::new(MemoryAuditSink::new());
    let key = EnvelopeKey::from_bytes([11u8; 32]);
    let service = MfaService::new(
        store.clone(),
        sink.clone(),
        key.clone(),
        &MfaConfig::default(),
    );

    Harness {
        service,
        store,
        sink,
        key,
    }
}

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_750_000_000, 0).unwrap()
}

fn ctx() -> AttemptContext {
    AttemptContext {
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("Mozilla/5.0".to_string()),
    }
}

fn totp(submitted: &str) -> CodeSubmission {
    CodeSubmission::Totp {
        code: submitted.to_string(),
    }
}

fn backup(submitted: &str) -> CodeSubmission {
    CodeSubmission::Backup {
        code: submitted.to_string(),
    }
}

async fn code_for(harness: &Harness, user_id: &str, at: DateTime<Utc>) -> String {
    let versioned = harness.store.load(user_id).await.unwrap().unwrap();
    let secret = envelope::open(&versioned.credential.secret_envelope, &harness.key).unwrap();
    totp_custom::<Sha1>(30, 6, &secret, at.timestamp() as u64)
}

async fn enroll(harness: &Harness, user_id: &str, at: DateTime<Utc>) -> Vec<String> {
    let start = harness
        .service
        .begin_enrollment(user_id, "dr.martin@praxis.example", at)
        .await
        .unwrap();
    assert!(start.display_uri.starts_with("otpauth://totp/"));
    assert!(!start.manual_key.is_empty());

    let code = code_for(harness, user_id, at).await;
    harness
        .service
        .complete_enrollment(user_id, &code, &ctx(), at)
        .await
        .unwrap()
}

#[tokio::test]
async fn lockout_scenario_end_to_end() {
    let harness = harness();
    let t0 = t0();

    // enrollment with a code valid at t0 enables the credential
    enroll(&harness, "dr-martin", t0).await;
    let status = harness.service.status("dr-martin").await.unwrap();
    assert!(status.enabled);

    // five consecutive wrong codes; the fifth starts the lockout window
    for attempt in 0..4 {
        let result = harness
            .service
            .verify("dr-martin", &totp("999999"), &ctx(), t0)
            .await;
        assert!(
            matches!(result, Err(MfaError::InvalidCode { locked_until: None })),
            "attempt {attempt}"
        );
    }
    let result = harness
        .service
        .verify("dr-martin", &totp("999999"), &ctx(), t0)
        .await;
    let unlock_at = t0 + Duration::minutes(15);
    assert!(matches!(
        result,
        Err(MfaError::InvalidCode { locked_until: Some(at) }) if at == unlock_at
    ));

    // a correct code immediately after is still rejected as locked
    let correct = code_for(&harness, "dr-martin", t0).await;
    let result = harness
        .service
        .verify("dr-martin", &totp(&correct), &ctx(), t0)
        .await;
    assert!(matches!(
        result,
        Err(MfaError::Locked { unlock_at: at }) if at == unlock_at
    ));

    // after the window has lapsed the request is evaluated normally
    let t1 = t0 + Duration::minutes(16);
    let correct = code_for(&harness, "dr-martin", t1).await;
    let success = harness
        .service
        .verify("dr-martin", &totp(&correct), &ctx(), t1)
        .await
        .unwrap();
    assert_eq!(success.method, VerifiedMethod::Totp);

    let versioned = harness.store.load("dr-martin").await.unwrap().unwrap();
    assert_eq!(versioned.credential.failed_attempts, 0);
    assert!(versioned.credential.locked_until.is_none());
}

#[tokio::test]
async fn backup_code_scenario_end_to_end() {
    let harness = harness();
    let t0 = t0();

    let codes = enroll(&harness, "dr-martin", t0).await;
    assert_eq!(codes.len(), 10);

    // code #3 consumed successfully
    let success = harness
        .service
        .verify("dr-martin", &backup(&codes[2]), &ctx(), t0)
        .await
        .unwrap();
    assert_eq!(success.method, VerifiedMethod::Backup);
    assert_eq!(success.remaining_backup_codes, Some(9));

    let status = harness.service.status("dr-martin").await.unwrap();
    assert_eq!(status.remaining_backup_codes, 9);

    // resubmitting the same code fails and does not decrement again
    let result = harness
        .service
        .verify("dr-martin", &backup(&codes[2]), &ctx(), t0)
        .await;
    assert!(matches!(result, Err(MfaError::InvalidCode { .. })));

    let status = harness.service.status("dr-martin").await.unwrap();
    assert_eq!(status.remaining_backup_codes, 9);
}

#[tokio::test]
async fn totp_window_tolerance() {
    let harness = harness();
    let t0 = t0();
    enroll(&harness, "dr-martin", t0).await;

    let issued = t0 + Duration::minutes(10);
    let code = code_for(&harness, "dr-martin", issued).await;

    for drift in [Duration::zero(), Duration::seconds(29), Duration::seconds(-29)] {
        let result = harness
            .service
            .verify("dr-martin", &totp(&code), &ctx(), issued + drift)
            .await;
        assert!(result.is_ok(), "drift {drift}");
    }

    let result = harness
        .service
        .verify(
            "dr-martin",
            &totp(&code),
            &ctx(),
            issued + Duration::seconds(90),
        )
        .await;
    assert!(matches!(result, Err(MfaError::InvalidCode { .. })));
}

#[tokio::test]
async fn malformed_input_fails_fast() {
    let harness = harness();

    // no credential record is ever touched: malformed input is rejected
    // before the store would report NotConfigured
    let result = harness
        .service
        .verify("ghost", &totp("12 456"), &ctx(), t0())
        .await;
    assert!(matches!(result, Err(MfaError::MalformedCode(_))));

    let result = harness
        .service
        .verify("ghost", &backup("XYZ"), &ctx(), t0())
        .await;
    assert!(matches!(result, Err(MfaError::MalformedCode(_))));
}

#[tokio::test]
async fn attempt_trail_feeds_anomaly_assessment() {
    let harness = harness();
    let t0 = t0();
    enroll(&harness, "dr-martin", t0).await;

    // a scripted-looking burst of failures a few minutes after enrollment;
    // the lockout cuts the trail off after five, which is plenty
    for i in 0..10 {
        let at = t0 + Duration::minutes(5) + Duration::milliseconds(400 * i);
        let _ = harness
            .service
            .verify("dr-martin", &totp("999999"), &ctx(), at)
            .await;
    }

    let now = t0 + Duration::minutes(20);
    let recent = harness
        .sink
        .recent("dr-martin", now - Duration::hours(1))
        .await;
    let assessment = anomaly::assess(&recent, now, &AnomalyConfig::default());

    assert!(assessment.suspicious);
    assert_eq!(assessment.risk_level, RiskLevel::High);

    // advisory only: the credential still verifies normally once unlocked
    let t1 = t0 + Duration::minutes(40);
    let code = code_for(&harness, "dr-martin", t1).await;
    let success = harness
        .service
        .verify("dr-martin", &totp(&code), &ctx(), t1)
        .await
        .unwrap();
    assert_eq!(success.method, VerifiedMethod::Totp);
}
