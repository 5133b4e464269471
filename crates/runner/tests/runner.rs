//! End-to-end runs of the selector-driven runner
//!
//! Run with: cargo test --package pagecheck-runner --test runner

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;

use pagecheck_common::{Document, ElementQuery};
use pagecheck_runner::events::ElementRef;
use pagecheck_runner::plugins::{PerformancePlugin, Plugin};
use pagecheck_runner::runner::BAIL_MESSAGE;
use pagecheck_runner::{ensure, ensure_eq, EventKind, Outcome, Runner, RunnerConfig, RunnerError, TestError};

const GALLERY: &str = r#"
<html lang="en"><body>
  <main id="gallery">
    <img id="logo" src="logo.png" alt="Company logo">
    <img id="spacer" src="spacer.gif" alt="">
    <img id="photo" src="photo.jpg">
  </main>
</body></html>
"#;

#[tokio::test]
async fn images_have_alt_text() {
    let runner = Runner::new(Document::parse_html(GALLERY));
    runner.describe("Images", |suite| {
        suite
            .test("alt text", |ctx| async move {
                let name = ctx.accessible_name();
                ensure(name.is_some(), format!("{} has no accessible name", ctx.selector()))
            })
            .selector("img");
    });

    let results = runner.run().await.unwrap();
    assert_eq!(results.len(), 1);
    let images = &results[0];
    assert_eq!((images.passed, images.failed), (2, 1));

    let elements: Vec<&ElementRef> = images.results.iter().filter_map(|r| r.element.as_ref()).collect();
    let selectors: Vec<&str> = elements.iter().map(|e| e.selector.as_str()).collect();
    assert_eq!(selectors, vec!["#logo", "#spacer", "#photo"]);

    let failure = images.results[2].error.as_ref().unwrap();
    assert_eq!(failure.kind, "assertion");
    assert_eq!(failure.message, "#photo has no accessible name");
}

#[tokio::test]
async fn scoped_suites_run_per_root() {
    let runner = Runner::new(Document::parse_html(
        r#"<section class="card"><h2>A</h2><p>x</p></section>
           <section class="card"><h2>B</h2></section>
           <section class="card"></section>"#,
    ));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    runner.describe_within("Cards", ".card", move |suite| {
        suite
            .test("titled", move |ctx| {
                let record = record.clone();
                async move {
                    record.lock().push(ctx.text());
                    Ok(())
                }
            })
            .selector("h2");
        suite.test("is a section", |ctx| async move {
            ensure_eq(ctx.tag_name().as_deref(), Some("section"), "tag")
        });
    });

    let results = runner.run().await.unwrap();
    assert_eq!(*seen.lock(), vec!["A".to_string(), "B".to_string()]);
    assert_eq!(results[0].passed, 5);
}

#[tokio::test]
async fn missing_scope_skips_every_test() {
    let runner = Runner::new(Document::parse_html("<p>nothing here</p>"));
    runner.describe_within("Tables", "table", |suite| {
        suite.test("has caption", |_ctx| async { Err(TestError::assertion("never runs")) });
        suite.test("has headers", |_ctx| async { Err(TestError::assertion("never runs")) });
    });

    let results = runner.run().await.unwrap();
    assert_eq!(results[0].skipped, 2);
    for result in &results[0].results {
        assert_eq!(result.message.as_deref(), Some("No elements found for selector \"table\""));
    }
}

#[tokio::test]
async fn invalid_selector_fails_the_test() {
    let runner = Runner::new(Document::parse_html("<p>x</p>"));
    runner.describe("Broken", |suite| {
        suite.test("bad", |_ctx| async { Ok(()) }).selector("p[");
        suite.test("good", |_ctx| async { Ok(()) }).selector("p");
    });

    let results = runner.run().await.unwrap();
    assert_eq!(results[0].results[0].outcome, Outcome::Fail);
    assert_eq!(results[0].results[0].error.as_ref().unwrap().kind, "selector");
    assert_eq!(results[0].results[1].outcome, Outcome::Pass);
}

#[tokio::test]
async fn only_focuses_the_run() {
    let runner = Runner::new(Document::parse_html("<p>x</p>"));
    runner.describe("Unfocused", |suite| {
        suite.test("a", |_ctx| async { Ok(()) });
    });
    runner.describe("Mixed", |suite| {
        suite.test("b", |_ctx| async { Ok(()) });
        suite.test("c", |_ctx| async { Ok(()) }).only();
    });
    runner.describe_only("Focused", |suite| {
        suite.test("d", |_ctx| async { Ok(()) });
        suite.test("e", |_ctx| async { Ok(()) }).skip();
    });

    let results = runner.run().await.unwrap();
    let outcomes: Vec<(String, Outcome)> = results
        .iter()
        .flat_map(|s| s.results.iter())
        .map(|r| (r.name.clone(), r.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("a".to_string(), Outcome::Skip),
            ("b".to_string(), Outcome::Skip),
            ("c".to_string(), Outcome::Pass),
            ("d".to_string(), Outcome::Pass),
            ("e".to_string(), Outcome::Skip),
        ]
    );
}

#[tokio::test]
async fn test_only_narrows_a_focused_suite() {
    let runner = Runner::new(Document::parse_html("<p>x</p>"));
    runner.describe_only("Focused", |suite| {
        suite.test("wide", |_ctx| async { Ok(()) });
        suite.test("narrow", |_ctx| async { Ok(()) }).only();
    });
    runner.describe_only("Whole", |suite| {
        suite.test("all", |_ctx| async { Ok(()) });
    });

    let results = runner.run().await.unwrap();
    let outcomes: Vec<(&str, Outcome)> = results
        .iter()
        .flat_map(|s| s.results.iter())
        .map(|r| (r.name.as_str(), r.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![("wide", Outcome::Skip), ("narrow", Outcome::Pass), ("all", Outcome::Pass)]
    );
}

#[tokio::test]
async fn bail_stops_after_first_failure() {
    let runner = Runner::with_config(
        Document::parse_html("<ul><li>1</li><li>2</li><li>3</li></ul>"),
        RunnerConfig {
            bail: true,
            ..Default::default()
        },
    );
    runner.describe("List", |suite| {
        suite
            .test("not two", |ctx| async move { ensure(ctx.text() != "2", "found 2") })
            .selector("li");
        suite.test("later", |_ctx| async { Ok(()) });
    });

    let results = runner.run().await.unwrap();
    let list = &results[0];
    assert_eq!((list.passed, list.failed, list.skipped), (1, 1, 2));
    assert_eq!(list.results[2].message.as_deref(), Some(BAIL_MESSAGE));
    assert_eq!(list.results[3].message.as_deref(), Some(BAIL_MESSAGE));
}

#[tokio::test]
async fn hooks_wrap_every_execution() {
    let runner = Runner::new(Document::parse_html("<p id=a>a</p><p id=b>b</p>"));
    let log = Arc::new(Mutex::new(Vec::new()));
    let (before, body, after) = (log.clone(), log.clone(), log.clone());
    runner.describe("Hooks", move |suite| {
        suite
            .before_each(move |ctx| {
                let log = before.clone();
                async move {
                    log.lock().push(format!("before {}", ctx.text()));
                    Ok(())
                }
            })
            .after_each(move |ctx| {
                let log = after.clone();
                async move {
                    log.lock().push(format!("after {}", ctx.text()));
                    Ok(())
                }
            });
        suite
            .test("body", move |ctx| {
                let log = body.clone();
                async move {
                    log.lock().push(format!("test {}", ctx.text()));
                    Ok(())
                }
            })
            .selector("p");
    });

    runner.run().await.unwrap();
    assert_eq!(
        *log.lock(),
        vec!["before a", "test a", "after a", "before b", "test b", "after b"]
    );
}

#[tokio::test]
async fn failing_before_each_skips_body() {
    let runner = Runner::new(Document::parse_html("<p>x</p>"));
    let ran = Arc::new(Mutex::new(false));
    let flag = ran.clone();
    runner.describe("Setup", move |suite| {
        suite.before_each(|_ctx| async { Err(TestError::assertion("fixture missing")) });
        suite
            .test("body", move |_ctx| {
                let flag = flag.clone();
                async move {
                    *flag.lock() = true;
                    Ok(())
                }
            })
            .selector("p");
    });

    let results = runner.run().await.unwrap();
    assert!(!*ran.lock());
    let error = results[0].results[0].error.as_ref().unwrap();
    assert_eq!(error.kind, "hook");
    assert_eq!(error.message, "before_each hook failed: fixture missing");
}

#[tokio::test]
async fn failing_after_each_overrides_a_skip() {
    let runner = Runner::new(Document::parse_html("<p>x</p>"));
    runner.describe("Teardown", |suite| {
        suite.after_each(|_ctx| async { Err(TestError::assertion("cleanup failed")) });
        suite
            .test("skips", |ctx| async move { Err(ctx.skip("not today")) })
            .selector("p");
        suite
            .test("todo", |ctx| async move { Err(ctx.todo("later")) })
            .selector("p");
    });

    let results = runner.run().await.unwrap();
    let suite = &results[0];
    assert_eq!((suite.failed, suite.skipped, suite.todo), (2, 0, 0));
    for result in &suite.results {
        let error = result.error.as_ref().unwrap();
        assert_eq!(error.kind, "hook");
        assert_eq!(error.message, "after_each hook failed: cleanup failed");
    }
}

#[tokio::test]
async fn skip_and_todo_from_inside_a_test() {
    let runner = Runner::new(Document::parse_html("<p>x</p><p></p>"));
    runner.describe("Controls", |suite| {
        suite
            .test("empty paragraphs", |ctx| async move {
                if ctx.text().is_empty() {
                    return Err(ctx.skip("empty"));
                }
                Ok(())
            })
            .selector("p");
        suite.test("unwritten", |ctx| async move { Err(ctx.todo("check spacing")) });
        suite.todo("declared", "not started");
    });

    let results = runner.run().await.unwrap();
    let suite = &results[0];
    assert_eq!((suite.passed, suite.skipped, suite.todo), (1, 1, 2));
    assert_eq!(suite.results[1].message.as_deref(), Some("empty"));
    assert_eq!(suite.results[2].message.as_deref(), Some("check spacing"));
}

#[tokio::test]
async fn stream_and_run_together() {
    let runner = Runner::new(Document::parse_html(GALLERY));
    runner.describe("Images", |suite| {
        suite.test("exists", |_ctx| async { Ok(()) }).selector("img");
    });

    let stream = runner.stream();
    let (events, results) = tokio::join!(stream.collect::<Vec<_>>(), runner.run());
    let results = results.unwrap();

    let names: Vec<&str> = events.iter().map(|e| e.kind.name()).collect();
    assert_eq!(names.first(), Some(&"run-start"));
    assert_eq!(names.last(), Some(&"test-complete"));
    assert_eq!(names.iter().filter(|n| **n == "test-start").count(), 3);
    assert_eq!(names.iter().filter(|n| **n == "test-result").count(), 3);

    match &events.last().unwrap().kind {
        EventKind::TestComplete { summary, results: sent, .. } => {
            assert_eq!(summary.passed, 3);
            assert_eq!(sent, &results);
        }
        other => panic!("unexpected final event {:?}", other),
    }

    let json = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(json["type"], "run-start");
    assert_eq!(json["data"]["tests"], 1);
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn concurrent_run_is_refused() {
    let runner = Runner::new(Document::parse_html("<p>x</p>"));
    runner.describe("Slow", |suite| {
        suite.test("waits", |_ctx| async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(())
        });
    });

    let other = runner.clone();
    let (first, second) = tokio::join!(runner.run(), async {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        other.run().await
    });
    assert!(first.is_ok());
    assert!(matches!(second, Err(RunnerError::AlreadyRunning)));
    assert!(!runner.is_running());
}

#[tokio::test]
async fn failures_are_highlighted() {
    let runner = Runner::with_config(
        Document::parse_html(GALLERY),
        RunnerConfig {
            highlight_failures: true,
            ..Default::default()
        },
    );
    runner.describe("Images", |suite| {
        suite
            .test("has alt", |ctx| async move { ensure(ctx.attribute("alt").is_some(), "no alt") })
            .selector("img");
    });

    runner.run().await.unwrap();
    assert_eq!(runner.highlighted_count(), 1);
    {
        let doc = runner.document().read();
        assert!(doc.get_element_by_id("pagecheck-highlight-container").is_some());
    }

    runner.clear_highlights();
    assert_eq!(runner.highlighted_count(), 0);
    assert!(runner.document().read().get_element_by_id("pagecheck-highlight-container").is_none());
}

#[tokio::test]
async fn overlays_are_never_test_targets() {
    // A page saved with an overlay from an earlier session still in it
    let page = r#"
        <body>
          <img src="a.png">
          <div class="card">card</div>
          <div id="pagecheck-highlight-container">
            <div class="pagecheck-highlight"><div class="pagecheck-highlight-tooltip">old</div></div>
          </div>
        </body>"#;
    let runner = Runner::with_config(
        Document::parse_html(page),
        RunnerConfig {
            highlight_failures: true,
            ..Default::default()
        },
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    runner.describe("Images", |suite| {
        suite
            .test("has alt", |ctx| async move { ensure(ctx.attribute("alt").is_some(), "no alt") })
            .selector("img");
    });
    runner.describe("Divs", move |suite| {
        suite
            .test("visits", move |ctx| {
                let log = log.clone();
                async move {
                    log.lock().push(ctx.attribute("class"));
                    Ok(())
                }
            })
            .selector("div");
    });
    runner.describe_within("Scoped", "div", |suite| {
        suite.test("per root", |_ctx| async { Ok(()) });
    });

    for _ in 0..2 {
        seen.lock().clear();
        let results = runner.run().await.unwrap();
        assert_eq!(results[0].failed, 1);
        assert_eq!(results[1].results.len(), 1);
        assert_eq!(results[2].results.len(), 1);
        assert_eq!(*seen.lock(), vec![Some("card".to_string())]);
        assert_eq!(runner.highlighted_count(), 1);
    }

    let doc = runner.document().read();
    let overlays = doc.query_selector_all(doc.root(), ".pagecheck-highlight").unwrap();
    // the stale overlay plus the one drawn by the last run
    assert_eq!(overlays.len(), 2);
}

#[test]
fn plugins_install_once() {
    let runner = Runner::new(Document::new());
    let plugin = PerformancePlugin::default();
    assert_eq!(plugin.name(), "performance");
    runner.install(plugin).unwrap();

    let again = runner.install(PerformancePlugin::default());
    assert!(matches!(again, Err(RunnerError::PluginAlreadyInstalled(name)) if name == "performance"));
    assert!(runner.is_installed("performance"));
    assert_eq!(runner.memory_usage().plugins, 1);
}
