use serde::Deserialize;

use crate::error::Result;

/// Parsed JUnit XML report, normalized to a list of suites regardless of
/// whether the document root was `<testsuites>` or a bare `<testsuite>`.
#[derive(Debug, Default, Deserialize)]
pub struct TestReport {
    #[serde(rename = "testsuite", default)]
    pub suites: Vec<TestSuite>,
}

#[derive(Debug, Deserialize)]
pub struct TestSuite {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@errors", default)]
    pub errors: u32,
    #[serde(rename = "@failures", default)]
    pub failures: u32,
    #[serde(rename = "testcase", default)]
    pub cases: Vec<TestCase>,
}

#[derive(Debug, Deserialize)]
pub struct TestCase {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@classname")]
    pub classname: Option<String>,
    #[serde(rename = "@file")]
    pub file: Option<String>,
    #[serde(rename = "@line")]
    pub line: Option<u32>,
    #[serde(rename = "failure", default)]
    pub failures: Vec<TestProblem>,
    #[serde(rename = "error", default)]
    pub errors: Vec<TestProblem>,
}

/// A `<failure>` or `<error>` child of a test case.
#[derive(Debug, Deserialize)]
pub struct TestProblem {
    #[serde(rename = "@message")]
    pub message: Option<String>,
    #[serde(rename = "$text")]
    pub body: Option<String>,
}

impl TestSuite {
    pub fn has_problems(&self) -> bool {
        self.errors > 0 || self.failures > 0
    }
}

impl TestCase {
    pub fn is_problem(&self) -> bool {
        !self.failures.is_empty() || !self.errors.is_empty()
    }

    /// The first recorded failure or error of this case.
    pub fn first_problem(&self) -> Option<&TestProblem> {
        self.failures.iter().chain(self.errors.iter()).next()
    }
}

impl TestProblem {
    /// Human-readable message: the `message` attribute when present, else
    /// the element body.
    pub fn rendered_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.body.as_ref().map(|body| body.trim().to_string()))
            .unwrap_or_default()
    }
}

/// Parse a JUnit XML document.
pub fn parse_report(xml: &str) -> Result<TestReport> {
    if root_element(xml) == Some("testsuite") {
        let suite: TestSuite = quick_xml::de::from_str(xml)?;
        return Ok(TestReport {
            suites: vec![suite],
        });
    }
    Ok(quick_xml::de::from_str(xml)?)
}

/// Name of the document's root element, skipping the XML declaration,
/// comments, and doctype.
fn root_element(xml: &str) -> Option<&str> {
    let mut rest = xml;
    loop {
        let start = rest.find('<')?;
        rest = &rest[start + 1..];
        if rest.starts_with('?') || rest.starts_with('!') {
            let end = rest.find('>')?;
            rest = &rest[end + 1..];
            continue;
        }
        let end = rest.find(|c: char| c.is_whitespace() || c == '>' || c == '/')?;
        return Some(&rest[..end]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED_REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites>
  <testsuite name="cart" errors="0" failures="1" tests="3">
    <testcase name="adds items" file="spec/cart.js" line="10"/>
    <testcase name="computes totals" file="spec/cart.js" line="31">
      <failure message="expected 10 to equal 12">AssertionError: expected 10 to equal 12
    at Context.&lt;anonymous&gt; (spec/cart.js:31:5)</failure>
    </testcase>
  </testsuite>
  <testsuite name="checkout" errors="0" failures="0" tests="5">
    <testcase name="pays"/>
  </testsuite>
</testsuites>"#;

    #[test]
    fn parses_a_testsuites_root() {
        let report = parse_report(NESTED_REPORT).unwrap();
        assert_eq!(report.suites.len(), 2);
        assert_eq!(report.suites[0].name, "cart");
        assert_eq!(report.suites[0].failures, 1);
        assert_eq!(report.suites[0].cases.len(), 2);
    }

    #[test]
    fn parses_a_bare_testsuite_root() {
        let xml = r#"<testsuite name="cart" errors="1" failures="0">
            <testcase name="boom" classname="CartSpec">
              <error message="null pointer"/>
            </testcase>
        </testsuite>"#;

        let report = parse_report(xml).unwrap();
        assert_eq!(report.suites.len(), 1);
        assert_eq!(report.suites[0].errors, 1);
        assert_eq!(
            report.suites[0].cases[0].classname.as_deref(),
            Some("CartSpec")
        );
    }

    #[test]
    fn flags_only_suites_with_problems() {
        let report = parse_report(NESTED_REPORT).unwrap();
        assert!(report.suites[0].has_problems());
        assert!(!report.suites[1].has_problems());
    }

    #[test]
    fn flags_only_cases_with_problems() {
        let report = parse_report(NESTED_REPORT).unwrap();
        let suite = &report.suites[0];
        assert!(!suite.cases[0].is_problem());
        assert!(suite.cases[1].is_problem());
    }

    #[test]
    fn rendered_message_prefers_the_attribute() {
        let report = parse_report(NESTED_REPORT).unwrap();
        let problem = report.suites[0].cases[1].first_problem().unwrap();
        assert_eq!(problem.rendered_message(), "expected 10 to equal 12");
    }

    #[test]
    fn rendered_message_falls_back_to_the_body() {
        let xml = r#"<testsuite name="s" failures="1">
            <testcase name="t"><failure>stack trace here</failure></testcase>
        </testsuite>"#;

        let report = parse_report(xml).unwrap();
        let problem = report.suites[0].cases[0].first_problem().unwrap();
        assert_eq!(problem.rendered_message(), "stack trace here");
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_report("<testsuites><unclosed").is_err());
    }

    #[test]
    fn root_element_skips_declaration_and_comments() {
        assert_eq!(root_element(NESTED_REPORT), Some("testsuites"));
        assert_eq!(
            root_element("<!-- generated --><testsuite name=\"x\"/>"),
            Some("testsuite")
        );
        assert_eq!(root_element("no xml here"), None);
    }
}
