//! Declarative YAML suite definitions
//!
//! ```yaml
//! name: Images
//! selector: main
//! tags: [a11y]
//! tests:
//!   - name: alt text
//!     selector: img
//!     checks:
//!       - check: has_attribute
//!         name: alt
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::TestContext;
use crate::error::{ensure, RunnerError, RunnerResult, TestError};
use crate::runner::Runner;

/// A suite parsed from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteSpec {
    /// Suite name shown in reports
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Scope selector; tests run within every match
    #[serde(default)]
    pub selector: Option<String>,

    /// Tags for filtering suites
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub skip: bool,

    #[serde(default)]
    pub only: bool,

    pub tests: Vec<TestSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    pub name: String,

    #[serde(default)]
    pub selector: Option<String>,

    #[serde(default)]
    pub skip: bool,

    /// Reason the test is not written yet
    #[serde(default)]
    pub todo: Option<String>,

    #[serde(default)]
    pub only: bool,

    /// Evaluated in order; the first failing check fails the test
    #[serde(default)]
    pub checks: Vec<Check>,
}

/// An assertion about the element under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Check {
    /// Attribute present, optionally with an exact value
    HasAttribute {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },

    AccessibleName {
        #[serde(default)]
        equals: Option<String>,
        #[serde(default)]
        non_empty: bool,
    },

    Role {
        equals: String,
    },

    Focusable {
        #[serde(default = "default_true")]
        expected: bool,
    },

    TextContains {
        text: String,
    },

    /// Foreground/background contrast of at least `min_ratio`
    Contrast {
        #[serde(default = "default_min_ratio")]
        min_ratio: f64,
    },

    NotHidden,
}

fn default_true() -> bool {
    true
}

fn default_min_ratio() -> f64 {
    4.5 // WCAG AA for normal text
}

impl Check {
    pub fn evaluate(&self, ctx: &TestContext) -> Result<(), TestError> {
        match self {
            Check::HasAttribute { name, value } => match (ctx.attribute(name), value) {
                (None, _) => Err(TestError::assertion(format!("missing attribute '{}'", name))),
                (Some(actual), Some(expected)) => ensure(
                    &actual == expected,
                    format!("attribute '{}' is \"{}\", expected \"{}\"", name, actual, expected),
                ),
                (Some(_), None) => Ok(()),
            },
            Check::AccessibleName { equals, non_empty } => {
                let name = ctx.accessible_name();
                if let Some(expected) = equals {
                    ensure(
                        name.as_deref() == Some(expected.as_str()),
                        format!("accessible name is {:?}, expected \"{}\"", name, expected),
                    )?;
                }
                if *non_empty {
                    ensure(
                        name.as_deref().is_some_and(|n| !n.trim().is_empty()),
                        "element has no accessible name",
                    )?;
                }
                Ok(())
            }
            Check::Role { equals } => {
                let role = ctx.role();
                ensure(
                    role.as_deref() == Some(equals.as_str()),
                    format!("role is {:?}, expected \"{}\"", role, equals),
                )
            }
            Check::Focusable { expected } => {
                let focusable = ctx.is_focusable();
                ensure(
                    focusable == *expected,
                    if *expected { "element is not focusable" } else { "element is focusable" },
                )
            }
            Check::TextContains { text } => {
                let content = ctx.text();
                ensure(
                    content.contains(text.as_str()),
                    format!("text \"{}\" does not contain \"{}\"", content.trim(), text),
                )
            }
            Check::Contrast { min_ratio } => {
                let ratio = ctx.contrast().ratio;
                ensure(
                    ratio >= *min_ratio,
                    format!("contrast {:.2}:1 is below {:.2}:1", ratio, min_ratio),
                )
            }
            Check::NotHidden => ensure(!ctx.is_hidden(), "element is hidden"),
        }
    }
}

impl SuiteSpec {
    /// Parse a suite from YAML string
    pub fn from_yaml(yaml: &str) -> RunnerResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> RunnerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| RunnerError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory, in path order
    pub fn load_all(dir: &Path) -> RunnerResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            debug!("Loading suite from {}", entry.path().display());
            specs.push(Self::from_file(entry.path())?);
        }

        Ok(specs)
    }

    /// Filter suites by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    fn validate(&self) -> RunnerResult<()> {
        if self.name.trim().is_empty() {
            return Err(RunnerError::SpecParse("suite name is empty".to_string()));
        }
        for test in &self.tests {
            if test.name.trim().is_empty() {
                return Err(RunnerError::SpecParse(format!("suite '{}' has a test without a name", self.name)));
            }
            if test.checks.is_empty() && test.todo.is_none() && !test.skip {
                return Err(RunnerError::SpecParse(format!(
                    "test '{}' in suite '{}' has no checks",
                    test.name, self.name
                )));
            }
        }
        Ok(())
    }

    /// Register this suite with a runner
    pub fn register(&self, runner: &Runner) {
        let define = |suite: &mut crate::suite::Suite| {
            if self.skip {
                suite.skip();
            }
            if self.only {
                suite.only();
            }
            for spec in &self.tests {
                let checks = Arc::new(spec.checks.clone());
                let test = suite.test(spec.name.clone(), move |ctx| {
                    let checks = checks.clone();
                    async move {
                        for check in checks.iter() {
                            check.evaluate(&ctx)?;
                        }
                        Ok(())
                    }
                });
                if let Some(selector) = &spec.selector {
                    test.selector(selector.clone());
                }
                if spec.skip {
                    test.skip();
                }
                if spec.only {
                    test.only();
                }
                if let Some(reason) = &spec.todo {
                    test.todo(reason.clone());
                }
            }
        };
        match &self.selector {
            Some(selector) => runner.describe_within(self.name.clone(), selector, define),
            None => runner.describe(self.name.clone(), define),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::share;
    use pagecheck_common::{Document, ElementQuery};
    use test_case::test_case;

    fn evaluate(html: &str, check: Check) -> Result<(), String> {
        let doc = Document::parse_html(html);
        let target = doc.get_element_by_id("t").unwrap();
        let ctx = TestContext::new(share(doc), target, "suite", "test");
        check.evaluate(&ctx).map_err(|e| e.to_string())
    }

    #[test_case(r#"<html lang="fr"><p id="t">x</p></html>"#, Check::HasAttribute { name: "id".into(), value: Some("t".into()) } ; "attribute value")]
    #[test_case(r#"<button id="t">Save</button>"#, Check::Role { equals: "button".into() } ; "implicit role")]
    #[test_case(r#"<div id="t" tabindex="0">x</div>"#, Check::Focusable { expected: true } ; "tabindex focusable")]
    #[test_case(r#"<span id="t">x</span>"#, Check::Focusable { expected: false } ; "span not focusable")]
    #[test_case(r#"<p id="t">Hello world</p>"#, Check::TextContains { text: "world".into() } ; "text contains")]
    #[test_case(r#"<p id="t">x</p>"#, Check::NotHidden ; "visible")]
    fn test_check_passes(html: &str, check: Check) {
        assert_eq!(evaluate(html, check), Ok(()));
    }

    #[test]
    fn test_check_failure_messages() {
        let html = r#"<html lang="fr"><body><p id="t" hidden>x</p></body></html>"#;
        let value = Check::HasAttribute { name: "hidden".into(), value: Some("until-found".into()) };
        assert_eq!(evaluate(html, value).unwrap_err(), r#"attribute 'hidden' is "", expected "until-found""#);
        assert_eq!(evaluate(html, Check::NotHidden).unwrap_err(), "element is hidden");
        let missing = Check::HasAttribute { name: "alt".into(), value: None };
        assert_eq!(evaluate(html, missing).unwrap_err(), "missing attribute 'alt'");
    }

    #[test]
    fn test_parse_suite() {
        let yaml = r#"
name: Forms
description: Every control has a label
selector: form
tags:
  - a11y
  - smoke
tests:
  - name: inputs are labelled
    selector: input
    checks:
      - check: accessible_name
        non_empty: true
      - check: focusable
  - name: submit
    selector: button
    checks:
      - check: role
        equals: button
      - check: contrast
  - name: later
    todo: needs keyboard support
"#;
        let spec = SuiteSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.name, "Forms");
        assert_eq!(spec.selector.as_deref(), Some("form"));
        assert_eq!(spec.tests.len(), 3);
        assert_eq!(spec.tests[0].checks[1], Check::Focusable { expected: true });
        assert_eq!(spec.tests[1].checks[1], Check::Contrast { min_ratio: 4.5 });
        assert_eq!(SuiteSpec::filter_by_tag(std::slice::from_ref(&spec), "smoke").len(), 1);
        assert!(SuiteSpec::filter_by_tag(std::slice::from_ref(&spec), "visual").is_empty());
    }

    #[test]
    fn test_rejects_test_without_checks() {
        let yaml = r#"
name: Empty
tests:
  - name: nothing
"#;
        assert!(matches!(SuiteSpec::from_yaml(yaml), Err(RunnerError::SpecParse(_))));
    }

    #[test]
    fn test_unknown_check_is_a_yaml_error() {
        let yaml = r#"
name: Bad
tests:
  - name: t
    checks:
      - check: teleports
"#;
        assert!(matches!(SuiteSpec::from_yaml(yaml), Err(RunnerError::Yaml(_))));
    }

    #[tokio::test]
    async fn test_registered_checks_run() {
        let runner = Runner::new(Document::parse_html(
            r#"<nav><a href="/a">Home</a><a href="/b" aria-label="Docs">x</a><a href="/c"></a></nav>"#,
        ));
        let spec = SuiteSpec::from_yaml(
            r#"
name: Links
selector: nav
tests:
  - name: named
    selector: a[href]
    checks:
      - check: has_attribute
        name: href
      - check: accessible_name
        non_empty: true
"#,
        )
        .unwrap();
        spec.register(&runner);

        let results = runner.run().await.unwrap();
        assert_eq!(results[0].passed, 2);
        assert_eq!(results[0].failed, 1);
        let failure = results[0].results[2].error.as_ref().unwrap();
        assert_eq!(failure.message, "element has no accessible name");
    }
}
