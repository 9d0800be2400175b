use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use sequence::{DiagnosticError, RunReport, Sandbox, compile_source};

use crate::config::ScriptConfig;

const TEST_SUFFIX: &str = ".test.script";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedWarning {
    /// Substring that must appear in the warning message.
    pub contains: String,

    /// If set, the warning's span must start on this 1-based line of the
    /// script body.
    #[serde(default)]
    pub line: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedResult {
    pub solver: String,
    /// Objective or constraint name, e.g. `Sat1.SMA`.
    pub name: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub reports: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestConfig {
    pub description: Option<String>,

    /// Compilation must fail.
    pub expect_parse_error: bool,

    /// Some compile, initialization or run error must contain this text.
    pub expect_error: Option<String>,

    /// The sequence listing (two-space indent, no generating strings),
    /// compared with surrounding whitespace trimmed.
    pub expect_listing: Option<String>,

    pub expect_results: Vec<ExpectedResult>,

    /// Final values of `Variable`s, or `Object.Parameter` values.
    pub expect_values: BTreeMap<String, f64>,

    /// If present (even empty), warning count and content are checked.
    pub expect_warnings: Option<Vec<ExpectedWarning>>,
}

const TOLERANCE: f64 = 1e-9;

/// Split a `.test.script` file into its TOML frontmatter and script body.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');
    let Some(after_open) = content.strip_prefix("---") else {
        return Err("missing opening --- frontmatter delimiter".into());
    };
    let after_open = after_open
        .strip_prefix("\r\n")
        .or_else(|| after_open.strip_prefix('\n'))
        .unwrap_or(after_open);

    // The closing delimiter is a line of exactly `---`; listings in the
    // frontmatter contain longer dash runs.
    let close = after_open
        .match_indices("\n---")
        .map(|(i, _)| i)
        .find(|&i| matches!(after_open[i + 4..].chars().next(), None | Some('\n' | '\r')))
        .ok_or("missing closing --- frontmatter delimiter")?;
    let frontmatter = after_open[..close].trim_end_matches('\r');
    let rest = &after_open[close + 4..];
    let body = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig =
        toml::from_str(frontmatter).map_err(|e| format!("TOML parse error: {}", e))?;
    Ok((config, body))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn label(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| {
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.trim_end_matches(TEST_SUFFIX))
                .unwrap_or("?")
        })
    }
}

fn run_single_test(path: &Path, settings: &ScriptConfig) -> TestResult {
    let mut description = None;
    let outcome = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read file: {}", e))
        .and_then(|content| {
            let (config, body) =
                parse_test_file(&content).map_err(|e| format!("frontmatter error: {}", e))?;
            description = config.description.clone();
            check_script(&config, body, settings)
        });

    TestResult {
        path: path.to_path_buf(),
        description,
        outcome: match outcome {
            Ok(()) => TestOutcome::Pass,
            Err(reason) => TestOutcome::Fail(reason),
        },
    }
}

/// Compile and run `body`, then hold the outcome against `config`.
fn check_script(config: &TestConfig, body: &str, settings: &ScriptConfig) -> Result<(), String> {
    let compiled = compile_source(body, 0, &settings.registry());

    if config.expect_parse_error {
        return match compiled {
            Err(_) => Ok(()),
            Ok(_) => Err("expected a compile error, but compilation succeeded".into()),
        };
    }

    let script = match compiled {
        Ok(script) => script,
        Err(errors) => {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return match &config.expect_error {
                Some(expected) if messages.iter().any(|m| m.contains(expected.as_str())) => Ok(()),
                _ => Err(format!("unexpected compile error: {}", messages.join("; "))),
            };
        }
    };

    let mut sandbox = Sandbox::new(script, settings.run_options());

    if let Some(expected) = &config.expect_listing {
        let listing = sandbox.command_seq_string(false, false, "  ");
        if listing.trim() != expected.trim() {
            return Err(format!(
                "listing mismatch\n  expected:\n{}\n  actual:\n{}",
                expected.trim(),
                listing.trim()
            ));
        }
    }

    let report = match (sandbox.execute(), &config.expect_error) {
        (Err(error), Some(expected)) => {
            let message = error.to_string();
            return if message.contains(expected.as_str()) {
                Ok(())
            } else {
                Err(format!(
                    "expected error containing \"{}\", got: {}",
                    expected, message
                ))
            };
        }
        (Ok(_), Some(expected)) => {
            return Err(format!(
                "expected error containing \"{}\", but the run succeeded",
                expected
            ));
        }
        (Err(error), None) => return Err(format!("unexpected error: {}", error)),
        (Ok(report), None) => report,
    };
    debug!("test run executed {} command(s)", report.commands_executed);

    check_results(&report, &config.expect_results)?;
    check_values(&sandbox, &config.expect_values)?;
    if let Some(expected) = &config.expect_warnings {
        check_warnings(body, &report.warnings, expected)?;
    }
    Ok(())
}

fn check_results(report: &RunReport, expected: &[ExpectedResult]) -> Result<(), String> {
    for want in expected {
        let result = report
            .solver_results
            .iter()
            .filter(|(solver, _)| *solver == want.solver)
            .flat_map(|(_, results)| results.iter())
            .find(|r| r.name == want.name)
            .ok_or_else(|| format!("solver {} recorded no result for {}", want.solver, want.name))?;

        if let Some(value) = want.value {
            match result.value {
                Some(actual) if (actual - value).abs() <= TOLERANCE => {}
                actual => {
                    return Err(format!(
                        "{} {}: expected value {}, got {:?}",
                        want.solver, want.name, value, actual
                    ));
                }
            }
        }
        if let Some(reports) = want.reports {
            if result.reports != reports {
                return Err(format!(
                    "{} {}: expected {} report(s), got {}",
                    want.solver, want.name, reports, result.reports
                ));
            }
        }
    }
    Ok(())
}

fn check_values(sandbox: &Sandbox, expected: &BTreeMap<String, f64>) -> Result<(), String> {
    for (name, value) in expected {
        let (object, parameter) = name.split_once('.').unwrap_or((name.as_str(), "Value"));
        match sandbox.objects().get_parameter(object, parameter) {
            Some(actual) if (actual - value).abs() <= TOLERANCE => {}
            actual => {
                return Err(format!("{}: expected {}, got {:?}", name, value, actual));
            }
        }
    }
    Ok(())
}

fn byte_offset_to_line(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].matches('\n').count() + 1
}

fn check_warnings(
    source: &str,
    warnings: &[DiagnosticError],
    expected: &[ExpectedWarning],
) -> Result<(), String> {
    if warnings.len() != expected.len() {
        let actual: Vec<String> = warnings.iter().map(|w| format!("    - {}", w)).collect();
        return Err(format!(
            "expected {} warning(s), got {}\n  actual warnings:\n{}",
            expected.len(),
            warnings.len(),
            if actual.is_empty() {
                "    (none)".to_string()
            } else {
                actual.join("\n")
            }
        ));
    }

    for (i, (actual, want)) in warnings.iter().zip(expected).enumerate() {
        let message = actual.to_string();
        if !message.contains(&want.contains) {
            return Err(format!(
                "warning[{}]: expected message containing \"{}\", got: {}",
                i, want.contains, message
            ));
        }
        let Some(line) = want.line else {
            continue;
        };
        match &actual.span {
            Some(span) if byte_offset_to_line(source, span.start) == line => {}
            Some(span) => {
                return Err(format!(
                    "warning[{}]: expected on line {}, but span is on line {}",
                    i,
                    line,
                    byte_offset_to_line(source, span.start)
                ));
            }
            None => {
                return Err(format!(
                    "warning[{}]: expected on line {}, but warning has no span",
                    i, line
                ));
            }
        }
    }
    Ok(())
}

/// `.test.script` files under `root`, keyed by their folder relative to
/// `root` ("" for files directly inside it).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|entry| entry.path()) {
        if path.is_dir() {
            collect_tests(&path, root, out);
            continue;
        }
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(TEST_SUFFIX));
        if is_test {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }
    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return;
    }
    eprintln!("available categories:");
    for (category, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(category), files.len());
    }
}

struct Palette {
    no_color: bool,
}

impl Palette {
    fn paint(&self, text: &str, code: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        }
    }

    fn pass(&self) -> String {
        self.paint("PASS", "32")
    }

    fn fail(&self) -> String {
        self.paint("FAIL", "31")
    }

    fn bold(&self, text: &str) -> String {
        self.paint(text, "1")
    }
}

/// Pick the categories to run. Unknown requests are reported and skipped.
fn select<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a [PathBuf]> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
    }
    let mut selected = BTreeMap::new();
    for request in requested {
        let request = request.trim_matches('/');
        let prefix = format!("{}/", request);
        let before = selected.len();
        for (category, files) in all {
            if category == request || category.starts_with(&prefix) {
                selected.insert(category.as_str(), files.as_slice());
            }
        }
        if selected.len() == before {
            eprintln!(
                "warning: category '{}' not found (available: {})",
                request,
                all.keys()
                    .map(|k| category_label(k))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
    selected
}

/// Run every `.test.script` file under `path` (or `path` itself when it is
/// a file). Returns the process exit code.
pub fn run_tests(
    path: &Path,
    no_color: bool,
    categories: &[String],
    settings: &ScriptConfig,
) -> i32 {
    let palette = Palette { no_color };

    let single;
    let all;
    let groups: BTreeMap<&str, &[PathBuf]> = if path.is_file() {
        single = [path.to_path_buf()];
        BTreeMap::from([("", &single[..])])
    } else {
        all = discover_categorized(path);
        if all.is_empty() {
            eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
            return 1;
        }
        select(&all, categories)
    };
    if groups.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (category, files) in &groups {
        if !path.is_file() {
            eprintln!();
            eprintln!("{}", palette.bold(category_label(category)));
        }
        for file in files.iter() {
            let result = run_single_test(file, settings);
            match result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", palette.pass(), result.label());
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", palette.fail(), result.label());
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for failure in &failures {
            eprintln!();
            eprintln!("  --- {} ---", failure.path.display());
            if let TestOutcome::Fail(reason) = &failure.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    if failures.is_empty() {
        eprintln!("test result: {}. {} passed, 0 failed", palette.paint("ok", "32"), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            palette.paint("FAILED", "31"),
            passed,
            failures.len(),
            passed + failures.len()
        );
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_split() {
        let (config, body) = parse_test_file(
            "---\ndescription = \"demo\"\nexpect_values = { x = 2.0 }\n---\nCreate Variable x;\n",
        )
        .unwrap();
        assert_eq!(config.description.as_deref(), Some("demo"));
        assert_eq!(config.expect_values.get("x"), Some(&2.0));
        assert_eq!(body, "Create Variable x;\n");
    }

    #[test]
    fn frontmatter_required() {
        assert!(parse_test_file("Create Variable x;\n").is_err());
        assert!(parse_test_file("---\ndescription = \"x\"\n").is_err());
        assert!(parse_test_file("---\nbogus = 1\n---\n").is_err());
    }

    #[test]
    fn frontmatter_with_listing() {
        let (config, body) = parse_test_file(
            "---\nexpect_listing = '''\n---------- Mission Sequence ----------\n  NoOp\n'''\n---\nNoOp;\n",
        )
        .unwrap();
        assert!(config.expect_listing.unwrap().contains("  NoOp"));
        assert_eq!(body, "NoOp;\n");
    }

    #[test]
    fn line_of_offset() {
        let source = "a;\nb;\nc;\n";
        assert_eq!(byte_offset_to_line(source, 0), 1);
        assert_eq!(byte_offset_to_line(source, 3), 2);
        assert_eq!(byte_offset_to_line(source, 100), 4);
    }
}
