//! Built-in accessibility audit used by `pagecheck audit`

use pagecheck_common::{validate_heading_order, ElementQuery, NodeId, WcagLevel};

use crate::context::TestContext;
use crate::error::{ensure, TestError};
use crate::runner::Runner;

pub const IMAGES: &str = "Images";
pub const NAMES: &str = "Interactive names";
pub const FORMS: &str = "Form labels";
pub const HEADINGS: &str = "Headings";
pub const KEYBOARD: &str = "Keyboard";
pub const LANGUAGE: &str = "Language";
pub const CONTRAST: &str = "Contrast";

const LABELLED_CONTROLS: &str = "input:not([type=hidden]):not([type=submit]):not([type=button]):not([type=reset]):not([type=image]), select, textarea";
const TEXT_ELEMENTS: &str = "p, span, a, button, label, li, td, th, dt, dd, h1, h2, h3, h4, h5, h6";

fn has_name(ctx: &TestContext) -> bool {
    ctx.accessible_name().is_some_and(|name| !name.trim().is_empty())
}

fn own_text(ctx: &TestContext, node: NodeId) -> bool {
    let doc = ctx.read();
    doc.children(node)
        .iter()
        .any(|child| doc.text(*child).is_some_and(|text| !text.trim().is_empty()))
}

/// Register every audit suite with `runner`
pub fn register_accessibility_audit(runner: &Runner) {
    register_accessibility_audit_at(runner, WcagLevel::AA);
}

/// Same as [`register_accessibility_audit`] with a stricter contrast level
pub fn register_accessibility_audit_at(runner: &Runner, level: WcagLevel) {
    register_images(runner);
    register_names(runner);
    register_forms(runner);
    register_headings(runner);
    register_keyboard(runner);
    register_language(runner);
    register_contrast(runner, level);
}

pub fn register_images(runner: &Runner) {
    runner.describe(IMAGES, |suite| {
        suite
            .test("has alt text", |ctx| async move {
                // alt="" marks a decorative image and is fine
                let decorative = matches!(ctx.role().as_deref(), Some("presentation" | "none"));
                ensure(decorative || ctx.attribute("alt").is_some(), "image has no alt attribute")
            })
            .selector("img");
    });
}

pub fn register_names(runner: &Runner) {
    runner.describe(NAMES, |suite| {
        suite
            .test("buttons have names", |ctx| async move {
                if ctx.is_hidden() {
                    return Err(ctx.skip("hidden"));
                }
                ensure(has_name(&ctx), "button has no accessible name")
            })
            .selector("button, [role=button]");
        suite
            .test("links have names", |ctx| async move {
                if ctx.is_hidden() {
                    return Err(ctx.skip("hidden"));
                }
                ensure(has_name(&ctx), "link has no accessible name")
            })
            .selector("a[href]");
    });
}

pub fn register_forms(runner: &Runner) {
    runner.describe(FORMS, |suite| {
        suite
            .test("controls are labelled", |ctx| async move {
                if ctx.is_hidden() {
                    return Err(ctx.skip("hidden"));
                }
                let tag = ctx.tag_name().unwrap_or_default();
                ensure(has_name(&ctx), format!("{} has no label", tag))
            })
            .selector(LABELLED_CONTROLS);
    });
}

pub fn register_headings(runner: &Runner) {
    runner.describe(HEADINGS, |suite| {
        suite
            .test("levels do not skip", |ctx| async move {
                let report = validate_heading_order(&*ctx.read());
                let Some(heading) = report.headings.iter().find(|h| h.node == ctx.element()) else {
                    return Err(ctx.skip("not a heading"));
                };
                if heading.valid {
                    return Ok(());
                }
                let message = match report.first_break.map(|index| &report.headings[index]) {
                    Some(first) if first.node == heading.node => {
                        format!("h{} \"{}\" skips a heading level", heading.level, heading.text)
                    }
                    Some(first) => format!(
                        "h{} \"{}\" follows a skipped level at \"{}\"",
                        heading.level, heading.text, first.text
                    ),
                    None => format!("h{} \"{}\" is out of order", heading.level, heading.text),
                };
                Err(TestError::assertion(message))
            })
            .selector("h1, h2, h3, h4, h5, h6, [role=heading]");
    });
}

pub fn register_keyboard(runner: &Runner) {
    runner.describe(KEYBOARD, |suite| {
        suite
            .test("no positive tabindex", |ctx| async move {
                let value = ctx.attribute("tabindex").unwrap_or_default();
                match value.trim().parse::<i32>() {
                    Ok(index) => ensure(index <= 0, format!("tabindex=\"{}\" changes the tab order", index)),
                    Err(_) => Err(TestError::assertion(format!("tabindex=\"{}\" is not a number", value))),
                }
            })
            .selector("[tabindex]");
    });
}

pub fn register_language(runner: &Runner) {
    runner.describe(LANGUAGE, |suite| {
        suite
            .test("page declares a language", |ctx| async move {
                let lang = ctx.attribute("lang").unwrap_or_default();
                ensure(!lang.trim().is_empty(), "<html> has no lang attribute")
            })
            .selector("html");
    });
}

pub fn register_contrast(runner: &Runner, level: WcagLevel) {
    runner.describe(CONTRAST, move |suite| {
        suite
            .test("text is readable", move |ctx| async move {
                if !own_text(&ctx, ctx.element()) {
                    return Err(ctx.skip("no text"));
                }
                if ctx.is_hidden() {
                    return Err(ctx.skip("hidden"));
                }
                let result = ctx.contrast();
                ensure(
                    result.passes(level),
                    format!(
                        "contrast {:.2}:1 is below {:.1}:1 ({:?})",
                        result.ratio,
                        level.required_ratio(result.large_text),
                        level
                    ),
                )
            })
            .selector(TEXT_ELEMENTS);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Outcome, SuiteResult};
    use pagecheck_common::Document;

    async fn audit(html: &str) -> Vec<SuiteResult> {
        let runner = Runner::new(Document::parse_html(html));
        register_accessibility_audit(&runner);
        runner.run().await.unwrap()
    }

    fn suite<'a>(results: &'a [SuiteResult], name: &str) -> &'a SuiteResult {
        results.iter().find(|s| s.name == name).unwrap()
    }

    #[tokio::test]
    async fn clean_page_passes() {
        let results = audit(
            r#"<html lang="en"><body>
                 <h1>Title</h1><h2>Section</h2>
                 <img src="a.png" alt="A chart">
                 <button>Save</button>
                 <label for="q">Search</label><input id="q" type="text">
               </body></html>"#,
        )
        .await;
        assert!(results.iter().all(|s| s.failed == 0), "{:#?}", results);
        assert_eq!(suite(&results, IMAGES).passed, 1);
        assert_eq!(suite(&results, HEADINGS).passed, 2);
    }

    #[tokio::test]
    async fn problems_are_reported() {
        let results = audit(
            r#"<html><body>
                 <h1>Title</h1><h3>Deep</h3>
                 <img src="a.png">
                 <a href="/x"></a>
                 <input type="email">
                 <div tabindex="3">x</div>
                 <p style="color:#ccc;background:#fff">faint</p>
               </body></html>"#,
        )
        .await;
        assert_eq!(suite(&results, IMAGES).failed, 1);
        assert_eq!(suite(&results, NAMES).failed, 1);
        assert_eq!(suite(&results, FORMS).failed, 1);
        assert_eq!(suite(&results, HEADINGS).failed, 1);
        assert_eq!(suite(&results, KEYBOARD).failed, 1);
        assert_eq!(suite(&results, LANGUAGE).failed, 1);
        let contrast = suite(&results, CONTRAST);
        assert_eq!(contrast.failed, 1);
        let failure = contrast.results.iter().find(|r| r.is_failure()).unwrap();
        assert!(failure.error.as_ref().unwrap().message.starts_with("contrast"));
        assert_eq!(failure.element.as_ref().unwrap().selector, "html > body > p");
    }

    #[tokio::test]
    async fn missing_elements_are_skipped() {
        let results = audit("<html lang=\"en\"><body><p>Just text</p></body></html>").await;
        let images = suite(&results, IMAGES);
        assert_eq!(images.skipped, 1);
        assert_eq!(images.results[0].outcome, Outcome::Skip);
        assert_eq!(suite(&results, CONTRAST).passed, 1);
    }
}
