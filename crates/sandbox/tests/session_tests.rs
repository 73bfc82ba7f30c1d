//! End-to-end session behavior.

use std::sync::Arc;
use std::time::Duration;

use policy::{AllowRules, CapabilityPolicy};
use sandbox::{
    AccessKind, CaptureSink, EvalError, Evaluator, InitError, MemoryLimit, Session,
    SessionConfig, Value,
};

fn deny_all_config() -> SessionConfig {
    SessionConfig::new().with_policy(CapabilityPolicy::default())
}

fn ok_with(matches: Vec<Value>) -> Value {
    Value::List(vec![Value::atom("ok"), Value::List(matches)])
}

#[tokio::test]
async fn fresh_session_is_alive_with_empty_streams() {
    let session = Session::create(SessionConfig::default()).await.unwrap();
    assert!(session.is_alive());
    assert!(session.drain_stdout().is_empty());
    assert!(session.drain_stderr().is_empty());
}

#[tokio::test]
async fn insert_then_query_returns_marker_and_result_set() {
    let session = Session::create(deny_all_config()).await.unwrap();

    assert_eq!(
        session.evaluate("(assert (parent tom bob))").await.unwrap(),
        Value::atom("ok")
    );

    let fact = Value::List(vec![
        Value::atom("parent"),
        Value::atom("tom"),
        Value::atom("bob"),
    ]);
    assert_eq!(
        session.evaluate("(query (parent tom bob))").await.unwrap(),
        ok_with(vec![fact])
    );
}

#[tokio::test]
async fn stdout_drains_exactly_once() {
    let session = Session::create(deny_all_config()).await.unwrap();
    session.evaluate(r#"(print "hello world")"#).await.unwrap();

    assert_eq!(session.drain_stdout(), b"hello world");
    assert_eq!(session.drain_stdout(), b"");
}

#[tokio::test]
async fn flush_resets_both_streams() {
    let session = Session::create(deny_all_config()).await.unwrap();
    session.evaluate(r#"(print "out")"#).await.unwrap();
    session.evaluate(r#"(eprint "err")"#).await.unwrap();

    session.flush();
    assert!(session.drain_stdout().is_empty());
    assert!(session.drain_stderr().is_empty());
}

#[tokio::test]
async fn syntax_error_leaves_session_alive() {
    let session = Session::create(deny_all_config()).await.unwrap();
    let err = session.evaluate("(assert (unclosed").await.unwrap_err();
    assert!(matches!(err, EvalError::Syntax(_)));
    assert!(session.is_alive());

    // Still usable afterward.
    session.evaluate("(assert (fine))").await.unwrap();
}

#[tokio::test]
async fn memory_breach_is_terminal() {
    let config = deny_all_config().with_memory_limit(MemoryLimit::from_bytes(64 * 1024));
    let session = Session::create(config).await.unwrap();

    let err = session.evaluate("(alloc 1000000)").await.unwrap_err();
    assert!(matches!(err, EvalError::ResourceExhausted { .. }));
    assert!(err.to_string().contains("out of memory"));
    assert!(!session.is_alive());

    // Once dead, further evaluates deterministically report termination.
    for _ in 0..2 {
        let err = session.evaluate("(alloc 1)").await.unwrap_err();
        assert!(matches!(err, EvalError::Terminated));
    }
}

#[tokio::test]
async fn capability_policy_is_enforced_per_kind() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("data.txt");
    std::fs::write(&file, "allowed").unwrap();

    let policy = CapabilityPolicy {
        allow: AllowRules {
            fs_read: vec![dir.path().to_path_buf()],
            ..AllowRules::default()
        },
    };
    let session = Session::create(SessionConfig::new().with_policy(policy))
        .await
        .unwrap();

    // Read inside the allowed subtree succeeds.
    let read = session
        .evaluate(format!(r#"(read-file "{}")"#, file.display()))
        .await
        .unwrap();
    assert_eq!(read, Value::Str("allowed".into()));

    let denied = [
        (r#"(read-file "/etc/passwd")"#, AccessKind::Read),
        (r#"(write-file "/tmp/brig-denied.txt" "x")"#, AccessKind::Write),
        (r#"(connect "localhost" 80)"#, AccessKind::Network),
        ("(listen 8080)", AccessKind::Network),
        (r#"(exec "ls")"#, AccessKind::Execute),
    ];
    for (expr, expected) in denied {
        let first = session.evaluate(expr).await.unwrap_err();
        let second = session.evaluate(expr).await.unwrap_err();
        // Denials are deterministic: same expression, same refusal.
        assert_eq!(first.to_string(), second.to_string());
        match first {
            EvalError::AccessDenied { kind, .. } => assert_eq!(kind, expected),
            other => panic!("expected access denial for {expr}, got {other}"),
        }
        assert!(session.is_alive());
    }
}

#[tokio::test]
async fn kill_is_terminal_but_output_remains_drainable() {
    let session = Session::create(deny_all_config()).await.unwrap();
    session.evaluate(r#"(print "buffered")"#).await.unwrap();

    session.kill();
    assert!(!session.is_alive());

    let err = session.evaluate("(list)").await.unwrap_err();
    assert!(matches!(err, EvalError::Terminated));
    assert_eq!(session.drain_stdout(), b"buffered");
}

#[tokio::test]
async fn sessions_are_fully_isolated() {
    let a = Session::create(deny_all_config()).await.unwrap();
    let b = Session::create(deny_all_config()).await.unwrap();
    assert_ne!(a.id, b.id);

    a.evaluate("(assert (secret alpha))").await.unwrap();
    a.evaluate(r#"(print "from a")"#).await.unwrap();

    assert_eq!(
        b.evaluate("(query (secret _))").await.unwrap(),
        ok_with(vec![])
    );
    assert!(b.drain_stdout().is_empty());

    b.kill();
    assert!(a.is_alive());
    assert_eq!(a.drain_stdout(), b"from a");
}

struct FailingEvaluator;

impl Evaluator for FailingEvaluator {
    fn start(
        _policy: CapabilityPolicy,
        _limit: MemoryLimit,
        _stdout: CaptureSink,
        _stderr: CaptureSink,
    ) -> Result<Self, InitError> {
        Err(InitError::Startup("interpreter image missing".into()))
    }

    fn submit(&mut self, _expr: &str) -> Result<Value, EvalError> {
        unreachable!("never started")
    }
}

#[tokio::test]
async fn failed_startup_surfaces_as_init_error() {
    let err = Session::create_with::<FailingEvaluator>(SessionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, InitError::Startup(_)));
}

#[tokio::test]
async fn backpressure_requires_concurrent_draining() {
    let config = deny_all_config().with_capture_capacity(16);
    let session = Arc::new(Session::create(config).await.unwrap());

    let expr = format!(r#"(print "{}")"#, "x".repeat(256));
    let writer = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.evaluate(expr).await })
    };

    let mut collected = Vec::new();
    while !writer.is_finished() {
        collected.extend(session.drain_stdout());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    writer.await.unwrap().unwrap();
    collected.extend(session.drain_stdout());

    assert_eq!(collected.len(), 256);
    assert!(collected.iter().all(|&b| b == b'x'));
}

#[tokio::test]
async fn kill_interrupts_an_evaluation_blocked_on_backpressure() {
    let config = deny_all_config().with_capture_capacity(8);
    let session = Arc::new(Session::create(config).await.unwrap());

    let expr = format!(r#"(print "{}")"#, "y".repeat(64));
    let writer = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.evaluate(expr).await })
    };

    // Give the evaluation time to fill the capture and block.
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.kill();

    let result = writer.await.unwrap();
    assert!(matches!(result.unwrap_err(), EvalError::Terminated));
    assert!(!session.is_alive());
}
