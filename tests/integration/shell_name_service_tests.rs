//! Integration tests for the shell-name service.
//!
//! Drives the service through scripted collaborators and checks the
//! observable contract: which titles reach the terminal, and when.

use std::sync::Arc;
use std::time::Duration;

use shelltitle::config::ShellTitleConfig;
use shelltitle::models::TitleSource;
use shelltitle::orchestrator::{CheckOutcome, ShellNameService};
use shelltitle::platform::Platform;
use shelltitle::source::{ProcessInfoSource, TerminalSession};
use shelltitle::AppError;

use super::test_helpers::{
    bash_tree, fast_config, rec, spawn_service, FakeTerminal, Scripted, ScriptedSource, FALLBACK,
};

/// Long enough for a 50 ms debounce window plus the check itself.
const SETTLE: Duration = Duration::from_millis(300);

#[tokio::test]
async fn refuses_construction_off_target_platform() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());

    for platform in [Platform::Linux, Platform::MacOs, Platform::Other] {
        let result = ShellNameService::spawn(
            platform,
            1,
            FALLBACK,
            Arc::clone(&terminal) as Arc<dyn TerminalSession>,
            Arc::clone(&source) as Arc<dyn ProcessInfoSource>,
            &ShellTitleConfig::default(),
        );
        let Err(err) = result else {
            panic!("service must not start on {platform}");
        };
        assert!(matches!(err, AppError::UnsupportedPlatform(_)));
        assert!(err.to_string().contains(&platform.to_string()));
    }
}

#[tokio::test]
async fn activity_burst_sets_title_once() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());
    let service = spawn_service(&terminal, source.clone(), &fast_config());

    for _ in 0..20 {
        service.notify_activity();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(SETTLE).await;

    assert_eq!(terminal.titles(), vec!["bash".to_owned()]);
    assert_eq!(terminal.title_sources(), vec![TitleSource::Process]);
    assert_eq!(source.calls(), 1, "one burst, one lookup");

    service.shutdown().await;
}

#[tokio::test]
async fn separate_bursts_each_check() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3, 4]);
    let source = ScriptedSource::new(bash_tree());
    source.push(Scripted::ok(bash_tree()));
    let mut with_vim = bash_tree();
    with_vim.push(rec(4, 3, "vim", 10));
    source.push(Scripted::ok(with_vim));
    let service = spawn_service(&terminal, source.clone(), &fast_config());

    service.notify_activity();
    tokio::time::sleep(SETTLE).await;
    service.notify_activity();
    tokio::time::sleep(SETTLE).await;

    assert_eq!(terminal.titles(), vec!["bash".to_owned(), "vim".to_owned()]);
    assert_eq!(source.calls(), 2);

    service.shutdown().await;
}

#[tokio::test]
async fn user_managed_title_skips_lookup() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    terminal.set_user_title(true);
    let source = ScriptedSource::new(bash_tree());
    let service = spawn_service(&terminal, source.clone(), &fast_config());

    service.notify_activity();
    tokio::time::sleep(SETTLE).await;

    assert!(terminal.titles().is_empty());
    assert_eq!(source.calls(), 0, "no lookup while the user owns the title");
    assert_eq!(
        service.check_shell().await.expect("check runs"),
        CheckOutcome::Skipped
    );

    service.shutdown().await;
}

#[tokio::test]
async fn absent_root_reports_fallback() {
    let terminal = FakeTerminal::with_pids(&[7, 8]);
    let source = ScriptedSource::new(vec![rec(7, 0, "explorer.exe", 0), rec(8, 7, "code", 1)]);
    let service = spawn_service(&terminal, source, &fast_config());

    let outcome = service.check_shell().await.expect("check runs");

    assert_eq!(outcome, CheckOutcome::Applied(FALLBACK.to_owned()));
    assert_eq!(terminal.titles(), vec![FALLBACK.to_owned()]);

    service.shutdown().await;
}

#[tokio::test]
async fn get_shell_name_does_not_touch_title() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());
    let service = spawn_service(&terminal, source, &fast_config());

    assert_eq!(service.get_shell_name().await.expect("resolves"), "bash");
    assert!(terminal.titles().is_empty());
    assert_eq!(service.root_pid(), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn lookup_failure_propagates_and_next_check_recovers() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());
    source.push(Scripted::fail("access denied"));
    let service = spawn_service(&terminal, source, &fast_config());

    let err = service.check_shell().await.expect_err("first lookup fails");
    assert!(matches!(err, AppError::Query(ref msg) if msg == "access denied"));
    assert!(terminal.titles().is_empty());

    let outcome = service.check_shell().await.expect("second lookup succeeds");
    assert_eq!(outcome, CheckOutcome::Applied("bash".into()));

    service.shutdown().await;
}

#[tokio::test]
async fn failed_background_check_does_not_stop_service() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());
    source.push(Scripted::fail("transient"));
    let service = spawn_service(&terminal, source.clone(), &fast_config());

    service.notify_activity();
    tokio::time::sleep(SETTLE).await;
    assert!(terminal.titles().is_empty());

    service.notify_activity();
    tokio::time::sleep(SETTLE).await;
    assert_eq!(terminal.titles(), vec!["bash".to_owned()]);
    assert_eq!(source.calls(), 2);

    service.shutdown().await;
}

#[tokio::test]
async fn session_pid_failure_propagates() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    terminal.fail_pid_lookup(true);
    let source = ScriptedSource::new(bash_tree());
    let service = spawn_service(&terminal, source.clone(), &fast_config());

    let err = service.check_shell().await.expect_err("pid lookup fails");

    assert!(matches!(err, AppError::Query(_)));
    assert_eq!(source.calls(), 0);

    service.shutdown().await;
}

#[tokio::test]
async fn result_after_dispose_is_discarded() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());
    source.push(Scripted::slow(Duration::from_millis(300), bash_tree()));
    let service = spawn_service(&terminal, source, &fast_config());

    let (outcome, ()) = tokio::join!(service.check_shell(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.dispose();
    });

    assert_eq!(outcome.expect("lookup completes"), CheckOutcome::Discarded);
    assert!(terminal.titles().is_empty());
    assert!(service.is_disposed());
}

#[tokio::test]
async fn lookup_failing_after_dispose_is_discarded() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());
    source.push(Scripted {
        delay: Duration::from_millis(300),
        result: Err("query process killed".into()),
    });
    let service = spawn_service(&terminal, source, &fast_config());

    let (outcome, ()) = tokio::join!(service.check_shell(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.dispose();
    });

    assert_eq!(
        outcome.expect("failure after dispose is not reported"),
        CheckOutcome::Discarded
    );
    assert!(terminal.titles().is_empty());
}

#[tokio::test]
async fn background_check_in_flight_at_dispose_sets_no_title() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());
    source.push(Scripted::slow(Duration::from_millis(300), bash_tree()));
    let service = spawn_service(&terminal, source.clone(), &fast_config());

    service.notify_activity();
    // Debounce elapsed, lookup in flight.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(source.calls(), 1);
    service.dispose();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(terminal.titles().is_empty(), "title must not change after dispose");
}

#[tokio::test]
async fn activity_after_dispose_is_ignored() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());
    let service = spawn_service(&terminal, source.clone(), &fast_config());

    service.dispose();
    service.dispose();
    service.notify_activity();
    tokio::time::sleep(SETTLE).await;

    assert_eq!(source.calls(), 0);
    assert!(terminal.titles().is_empty());
}

#[tokio::test]
async fn dropping_service_disposes_it() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());
    source.push(Scripted::slow(Duration::from_millis(300), bash_tree()));
    let service = spawn_service(&terminal, source.clone(), &fast_config());

    service.notify_activity();
    tokio::time::sleep(Duration::from_millis(150)).await;
    drop(service);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(terminal.titles().is_empty());
}

#[tokio::test]
async fn stale_result_is_dropped_by_default() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());
    source.push(Scripted::slow(
        Duration::from_millis(300),
        vec![rec(1, 0, "slow", 0)],
    ));
    source.push(Scripted::ok(vec![rec(1, 0, "fast", 0)]));
    let service = spawn_service(&terminal, source, &fast_config());

    let (older, newer) = tokio::join!(service.check_shell(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.check_shell().await
    });

    assert_eq!(newer.expect("fast check"), CheckOutcome::Applied("fast".into()));
    assert_eq!(older.expect("slow check"), CheckOutcome::Stale);
    assert_eq!(terminal.titles(), vec!["fast".to_owned()]);

    service.shutdown().await;
}

#[tokio::test]
async fn last_to_complete_wins_when_guard_disabled() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());
    source.push(Scripted::slow(
        Duration::from_millis(300),
        vec![rec(1, 0, "slow", 0)],
    ));
    source.push(Scripted::ok(vec![rec(1, 0, "fast", 0)]));
    let config = ShellTitleConfig {
        drop_stale_results: false,
        ..fast_config()
    };
    let service = spawn_service(&terminal, source, &config);

    let (older, newer) = tokio::join!(service.check_shell(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.check_shell().await
    });

    assert_eq!(newer.expect("fast check"), CheckOutcome::Applied("fast".into()));
    assert_eq!(older.expect("slow check"), CheckOutcome::Applied("slow".into()));
    assert_eq!(terminal.titles(), vec!["fast".to_owned(), "slow".to_owned()]);

    service.shutdown().await;
}

#[tokio::test]
async fn slow_check_does_not_block_next_trigger() {
    let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
    let source = ScriptedSource::new(bash_tree());
    source.push(Scripted::slow(Duration::from_secs(5), bash_tree()));
    source.push(Scripted::ok(vec![rec(1, 0, "pwsh", 0)]));
    let service = spawn_service(&terminal, source.clone(), &fast_config());

    service.notify_activity();
    tokio::time::sleep(SETTLE).await;
    service.notify_activity();
    tokio::time::sleep(SETTLE).await;

    assert_eq!(source.calls(), 2, "second trigger must not wait for the first");
    assert_eq!(terminal.titles(), vec!["pwsh".to_owned()]);

    service.shutdown().await;
}

// ── Out-of-process queries ───────────────────────────────────────────────────

#[cfg(unix)]
mod wmic_backend {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use shelltitle::orchestrator::CheckOutcome;
    use shelltitle::source::WmicSource;
    use shelltitle::AppError;

    use super::super::test_helpers::{fast_config, spawn_service, FakeTerminal};

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-wmic");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
        path
    }

    #[tokio::test]
    async fn resolves_through_wmic_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = write_script(
            temp.path(),
            "printf 'Node,CreationDate,ExecutablePath,Name,ParentProcessId,ProcessId\\r\\n'\n\
             printf 'HOST,20240101000000.000000+000,,cmd.exe,0,1\\r\\n'\n\
             printf 'HOST,20240101000005.000000+000,,node.exe,1,2\\r\\n'\n\
             printf 'HOST,20240101000009.000000+000,,bash.exe,1,3\\r\\n'",
        );
        let terminal = FakeTerminal::with_pids(&[1, 2, 3]);
        let source = Arc::new(WmicSource::new(script.to_string_lossy()));
        let service = spawn_service(&terminal, source, &fast_config());

        let outcome = service.check_shell().await.expect("wmic check");

        assert_eq!(outcome, CheckOutcome::Applied("bash.exe".into()));
        assert!(service.outstanding_queries().is_empty());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn dispose_kills_outstanding_query() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = write_script(temp.path(), "exec sleep 30");
        let terminal = FakeTerminal::with_pids(&[1]);
        let source = Arc::new(WmicSource::new(script.to_string_lossy()));
        let service = spawn_service(&terminal, source, &fast_config());

        let (outcome, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(service.check_shell(), async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                assert_eq!(service.outstanding_queries().len(), 1);
                service.dispose();
            })
        })
        .await
        .expect("killed query returns promptly");

        assert_eq!(
            outcome.expect("killed query is discarded, not an error"),
            CheckOutcome::Discarded
        );
        assert!(service.outstanding_queries().is_empty());
        assert!(terminal.titles().is_empty());

        // A second dispose finds nothing left to kill.
        service.dispose();
    }

    #[tokio::test]
    async fn failing_wmic_is_a_query_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = write_script(temp.path(), "exit 3");
        let terminal = FakeTerminal::with_pids(&[1]);
        let source = Arc::new(WmicSource::new(script.to_string_lossy()));
        let service = spawn_service(&terminal, source, &fast_config());

        let err = service.check_shell().await.expect_err("non-zero exit");

        assert!(matches!(err, AppError::Query(ref msg) if msg.contains("exited")));
        service.shutdown().await;
    }
}
