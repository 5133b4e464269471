//! Plugins, reporters and YAML suites driven through a real run
//!
//! Run with: cargo test --package pagecheck-runner --test plugins

use std::sync::Arc;

use pagecheck_common::{Document, ElementQuery, Rect, WcagLevel};
use pagecheck_runner::config::{PerformanceConfig, ScreenshotConfig};
use pagecheck_runner::plugins::{ContrastPlugin, IsolationPlugin, PerformancePlugin, ScreenshotPlugin};
use pagecheck_runner::reporter::RunReport;
use pagecheck_runner::{ensure, JsonReporter, Outcome, Runner, RunnerError, SuiteSpec};

#[tokio::test]
async fn isolation_rolls_back_each_execution() {
    let runner = Runner::new(Document::parse_html(r#"<ul id="list"><li>a</li><li>b</li></ul>"#));
    let isolation = runner.install(IsolationPlugin::new()).unwrap();
    runner.describe("Mutating", |suite| {
        suite
            .test("appends", |ctx| async move {
                let mut doc = ctx.write();
                let list = doc.get_element_by_id("list").unwrap();
                let item = doc.create_element("li");
                doc.append_child(list, item)?;
                let count = doc.element_children(list).len();
                ensure(count == 3, format!("list has {} items", count))
            })
            .selector("li");
    });

    let results = runner.run().await.unwrap();
    assert_eq!(results[0].passed, 2);
    assert_eq!(isolation.restores(), 2);
    let doc = runner.document().read();
    let list = doc.get_element_by_id("list").unwrap();
    assert_eq!(doc.element_children(list).len(), 2);
}

#[tokio::test]
async fn disabled_isolation_keeps_changes() {
    let runner = Runner::new(Document::parse_html(r#"<p id="p">x</p>"#));
    let isolation = runner.install(IsolationPlugin::new()).unwrap();
    isolation.set_enabled(false);
    runner.describe("Mutating", |suite| {
        suite.test("marks", |ctx| async move {
            let mut doc = ctx.write();
            let p = doc.get_element_by_id("p").unwrap();
            doc.set_attribute(p, "data-seen", "1")?;
            Ok(())
        });
    });

    runner.run().await.unwrap();
    assert_eq!(isolation.restores(), 0);
    let doc = runner.document().read();
    let p = doc.get_element_by_id("p").unwrap();
    assert_eq!(doc.attribute(p, "data-seen"), Some("1"));
}

#[tokio::test]
async fn performance_flags_slow_tests() {
    let runner = Runner::new(Document::parse_html("<p>a</p><p>b</p>"));
    let performance = runner
        .install(PerformancePlugin::new(PerformanceConfig {
            enabled: true,
            slow_threshold_ms: 20.0,
            slowest: 1,
        }))
        .unwrap();
    runner.describe("Timing", |suite| {
        suite
            .test("sleepy", |ctx| async move {
                if ctx.text() == "b" {
                    tokio::time::sleep(std::time::Duration::from_millis(40)).await;
                }
                Ok(())
            })
            .selector("p");
    });

    runner.run().await.unwrap();
    let metrics = performance.metrics();
    assert_eq!(metrics.executions, 2);
    assert_eq!(metrics.slow.len(), 1);
    assert_eq!(metrics.slowest.len(), 1);
    assert!(metrics.slowest[0].duration_ms >= 40.0);
    assert!(metrics.last_run_ms.is_some());
}

#[tokio::test]
async fn contrast_collects_executed_elements() {
    let runner = Runner::new(Document::parse_html(
        r#"<div style="background:#000">
             <p id="dark" style="color:#111">hidden in the dark</p>
             <p id="light" style="color:#fff">readable</p>
           </div>"#,
    ));
    let contrast = runner.install(ContrastPlugin::new(WcagLevel::AA)).unwrap();
    runner.describe("Text", |suite| {
        suite.test("visited", |_ctx| async { Ok(()) }).selector("p");
    });

    runner.run().await.unwrap();
    assert_eq!(contrast.results().len(), 2);
    let failures = contrast.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].selector, "#dark");
}

#[tokio::test]
async fn screenshots_capture_failures() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = Document::parse_html(r#"<div id="box" style="background:#eee"><span>x</span></div>"#);
    let node = doc.get_element_by_id("box").unwrap();
    doc.set_rect(node, Rect { x: 0.0, y: 0.0, width: 40.0, height: 20.0 }).unwrap();

    let runner = Runner::new(doc);
    let screenshots = runner
        .install(ScreenshotPlugin::new(ScreenshotConfig {
            enabled: true,
            output_dir: dir.path().join("actual"),
            baseline_dir: dir.path().join("baseline"),
            diff_dir: dir.path().join("diff"),
            ..Default::default()
        }))
        .unwrap();
    runner.describe("Boxes", |suite| {
        suite
            .test("fails", |_ctx| async { ensure(false, "always") })
            .selector("#box");
    });

    runner.run().await.unwrap();
    let captures = screenshots.captures();
    assert_eq!(captures.len(), 1);
    assert!(captures[0].path.exists());
    assert!(captures[0].diff.is_none());

    screenshots.update_baseline(&captures[0].name).unwrap();
    assert_eq!(screenshots.list_baselines().unwrap(), vec![captures[0].name.clone()]);
    assert!(screenshots.compare(&captures[0].name).unwrap().matches);

    {
        let mut doc = runner.document().write();
        doc.set_attribute(node, "style", "background:#000").unwrap();
    }
    screenshots.capture(&runner.document().read(), node, &captures[0].name).unwrap();
    match screenshots.compare(&captures[0].name) {
        Err(RunnerError::ScreenshotMismatch { name, diff_percent, threshold }) => {
            assert_eq!(name, captures[0].name);
            assert!(diff_percent > threshold);
        }
        other => panic!("expected a mismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn json_reporter_writes_results() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Runner::new(Document::parse_html("<img src=a.png><img src=b.png alt=b>"));
    let reporter = Arc::new(JsonReporter::new(dir.path()));
    runner.attach_reporter(reporter.clone());
    runner.describe("Images", |suite| {
        suite
            .test("alt", |ctx| async move { ensure(ctx.attribute("alt").is_some(), "missing alt") })
            .selector("img");
    });

    runner.run().await.unwrap();
    let report: RunReport = JsonReporter::read_results(&reporter.path()).unwrap();
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.suites[0].results[0].outcome, Outcome::Fail);
}

#[tokio::test]
async fn yaml_suites_from_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("nested")).unwrap();
    std::fs::write(
        dir.path().join("buttons.yaml"),
        r#"
name: Buttons
tags: [a11y]
tests:
  - name: named
    selector: button
    checks:
      - check: accessible_name
        non_empty: true
      - check: focusable
"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("nested/lang.yml"),
        r#"
name: Language
tags: [meta]
tests:
  - name: declared
    selector: html
    checks:
      - check: has_attribute
        name: lang
        value: en
"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a suite").unwrap();

    let specs = SuiteSpec::load_all(dir.path()).unwrap();
    assert_eq!(specs.len(), 2);
    let a11y = SuiteSpec::filter_by_tag(&specs, "a11y");
    assert_eq!(a11y.len(), 1);

    let runner = Runner::new(Document::parse_html(
        r#"<html lang="fr"><body><button>Go</button><button disabled>Stop</button></body></html>"#,
    ));
    for spec in &specs {
        spec.register(&runner);
    }
    let results = runner.run().await.unwrap();
    let buttons = results.iter().find(|s| s.name == "Buttons").unwrap();
    assert_eq!((buttons.passed, buttons.failed), (1, 1));
    let language = results.iter().find(|s| s.name == "Language").unwrap();
    assert_eq!(
        language.results[0].error.as_ref().unwrap().message,
        "attribute 'lang' is \"fr\", expected \"en\""
    );
}
