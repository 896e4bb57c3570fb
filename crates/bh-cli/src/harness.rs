//! Command implementations.
//!
//! `regex-test` checks a domain either against one pattern given on the command
//! line or against every regex filter in the rule database, reporting each
//! match. `check` runs the resolver's decision path once for a domain.

use std::io::Write;
use std::time::Instant;

use bh_core::{ClientScope, DebugFlags, MatchHit, RuleCategory, Verdict, CLI_ORIGIN_ID};
use bh_gravity::{EngineOptions, FilterEngine, MemorySource, RuleSource};

use crate::config::Config;
use crate::error::{HarnessError, Result};

/// Result of a command that completed without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessOutcome {
    Match,
    NoMatch,
}

impl HarnessOutcome {
    /// Process exit status: 0 on match, 2 when nothing matched.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Match => 0,
            Self::NoMatch => 2,
        }
    }
}

/// Exit status for commands that failed.
pub const ERROR_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Default)]
pub struct RegexTestOptions {
    pub domain: String,
    /// Test only this pattern instead of the rule database.
    pub pattern: Option<String>,
    pub debug: bool,
    /// Print match lines only.
    pub quiet: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    pub domain: String,
    /// Evaluate as this client address instead of with every rule enabled.
    pub client: Option<String>,
    pub debug: bool,
}

/// Writes command output, dropping progress lines in quiet mode.
struct Report<'w, W: Write> {
    out: &'w mut W,
    quiet: bool,
}

impl<W: Write> Report<'_, W> {
    fn progress(&mut self, line: std::fmt::Arguments<'_>) -> Result<()> {
        if !self.quiet {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    fn result(&mut self, line: std::fmt::Arguments<'_>) -> Result<()> {
        writeln!(self.out, "{line}")?;
        Ok(())
    }
}

fn engine_options(config: &Config, debug: bool) -> EngineOptions {
    let mut options = config.engine_options();
    options.debug = if debug {
        options.debug | DebugFlags::REGEX
    } else {
        DebugFlags::empty()
    };
    options
}

fn check_input_len(options: &EngineOptions, domain: &str) -> Result<()> {
    if options.limits.admits(domain) {
        return Ok(());
    }
    Err(HarnessError::InputTooLong {
        len: domain.len(),
        max: options.limits.max_input_len,
    })
}

fn elapsed_msec(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// =============================================================================
// regex-test
// =============================================================================

pub fn run_regex_test<W: Write>(config: &Config, opts: &RegexTestOptions, out: &mut W) -> Result<HarnessOutcome> {
    let options = engine_options(config, opts.debug);
    check_input_len(&options, &opts.domain)?;
    let mut report = Report { out, quiet: opts.quiet };

    let matched = match &opts.pattern {
        Some(pattern) => test_pattern(options, &opts.domain, pattern, &mut report)?,
        None => {
            let source = MemorySource::load(&config.database)?;
            test_database(source, options, &opts.domain, &mut report)?
        }
    };

    Ok(if matched {
        HarnessOutcome::Match
    } else {
        HarnessOutcome::NoMatch
    })
}

fn test_pattern<W: Write>(
    options: EngineOptions,
    domain: &str,
    pattern: &str,
    report: &mut Report<'_, W>,
) -> Result<bool> {
    report.progress(format_args!("[i] Compiling regex filter..."))?;

    let mut engine = FilterEngine::new(MemorySource::new(), options);
    let start = Instant::now();
    engine.compile_cli_pattern(pattern)?;
    report.progress(format_args!("    Compiled regex filter in {:.3} msec\n", elapsed_msec(start)))?;

    report.progress(format_args!("Checking domain..."))?;
    let start = Instant::now();
    let hits = engine
        .matcher()
        .all_matches(domain, ClientScope::All, RuleCategory::CliTest);
    print_hits(&engine, &hits, report)?;
    if hits.is_empty() {
        report.result(format_args!("    NO MATCH!"))?;
    }
    report.progress(format_args!("   Time: {:.3} msec", elapsed_msec(start)))?;

    Ok(!hits.is_empty())
}

fn test_database<S: RuleSource, W: Write>(
    source: S,
    options: EngineOptions,
    domain: &str,
    report: &mut Report<'_, W>,
) -> Result<bool> {
    report.progress(format_args!("[i] Loading regex filters from database..."))?;

    let start = Instant::now();
    let mut engine = FilterEngine::new(source, options);
    let loaded = engine.bootstrap();
    report.progress(format_args!(
        "    Compiled {} black- and {} whitelist regex filters in {:.3} msec\n",
        loaded.blacklist_count,
        loaded.whitelist_count,
        elapsed_msec(start)
    ))?;

    let mut matched = false;
    for category in RuleCategory::PERSISTENT {
        report.progress(format_args!("[i] Checking domain against {category}..."))?;
        let start = Instant::now();
        let hits = engine.matcher().all_matches(domain, ClientScope::All, category);
        print_hits(&engine, &hits, report)?;
        report.progress(format_args!("    Time: {:.3} msec", elapsed_msec(start)))?;
        matched |= !hits.is_empty();
    }

    Ok(matched)
}

fn print_hits<S: RuleSource, W: Write>(
    engine: &FilterEngine<S>,
    hits: &[MatchHit],
    report: &mut Report<'_, W>,
) -> Result<()> {
    for hit in hits {
        let Some(rule) = engine.rule(hit.handle) else {
            continue;
        };
        if hit.category() == RuleCategory::CliTest && hit.origin_id == CLI_ORIGIN_ID {
            report.result(format_args!("    {} matches", rule.pattern()))?;
        } else {
            report.result(format_args!(
                "    {} matches (regex {}, DB ID {})",
                rule.pattern(),
                hit.category(),
                hit.origin_id
            ))?;
        }
    }
    Ok(())
}

// =============================================================================
// check
// =============================================================================

pub fn run_check<W: Write>(config: &Config, opts: &CheckOptions, out: &mut W) -> Result<HarnessOutcome> {
    let options = engine_options(config, opts.debug);
    check_input_len(&options, &opts.domain)?;
    let source = MemorySource::load(&config.database)?;
    let mut engine = FilterEngine::new(source, options);
    engine.bootstrap();

    let scope = match &opts.client {
        Some(address) => engine.register_client(address).into(),
        None => ClientScope::All,
    };

    let domain = opts.domain.as_str();
    match engine.verdict(domain, scope) {
        Verdict::Blocked(id) => {
            writeln!(out, "{domain}: blocked by regex blacklist (DB ID {id})")?;
            Ok(HarnessOutcome::Match)
        }
        Verdict::Allowed(id) => {
            writeln!(out, "{domain}: allowed by regex whitelist (DB ID {id})")?;
            Ok(HarnessOutcome::Match)
        }
        Verdict::Pass => {
            writeln!(out, "{domain}: no regex filter applies")?;
            Ok(HarnessOutcome::NoMatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const DATABASE: &str = r#"{
        "blacklist": [
            { "id": 1, "pattern": "^ads\\." },
            { "id": 2, "pattern": "\\.example\\.com$" },
            { "id": 3, "pattern": "^video\\.", "groups": [4] }
        ],
        "whitelist": [{ "id": 9, "pattern": "^ads\\.good\\." }],
        "clients": [{ "address": "10.0.0.4", "groups": [0, 4] }]
    }"#;

    fn config_for(dir: &Path) -> Config {
        let database = dir.join("gravity.json");
        std::fs::write(&database, DATABASE).unwrap();
        Config {
            database,
            ..Config::default()
        }
    }

    fn regex_test(config: &Config, domain: &str, pattern: Option<&str>, quiet: bool) -> (Result<HarnessOutcome>, String) {
        let opts = RegexTestOptions {
            domain: domain.to_string(),
            pattern: pattern.map(str::to_string),
            debug: false,
            quiet,
        };
        let mut out = Vec::new();
        let result = run_regex_test(config, &opts, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_cli_pattern_match() {
        let (result, output) = regex_test(&Config::default(), "ads.example.com", Some("^ads\\."), false);

        assert_eq!(result.unwrap(), HarnessOutcome::Match);
        assert!(output.contains("Compiled regex filter in"));
        assert!(output.contains("    ^ads\\. matches\n"));
        assert!(!output.contains("NO MATCH!"));
    }

    #[test]
    fn test_cli_pattern_no_match() {
        let (result, output) = regex_test(&Config::default(), "www.example.org", Some("^ads\\."), false);

        assert_eq!(result.unwrap().exit_code(), 2);
        assert!(output.contains("    NO MATCH!"));
    }

    #[test]
    fn test_cli_pattern_invalid() {
        let (result, _) = regex_test(&Config::default(), "ads.example.com", Some("(unclosed"), false);

        let err = result.unwrap_err();
        assert!(matches!(err, HarnessError::CompileFailed(_)));
        assert_eq!(err.to_string(), "regex filter \"(unclosed\" could not be compiled");
    }

    #[test]
    fn test_fully_qualified_name_is_checked() {
        let fqdn = format!("{}.com.", "a".repeat(249));
        let (result, output) = regex_test(&Config::default(), &fqdn, Some("com\\.$"), true);

        assert_eq!(result.unwrap(), HarnessOutcome::Match);
        assert_eq!(output, "    com\\.$ matches\n");
    }

    #[test]
    fn test_overlong_domain_is_an_error() {
        let domain = format!("{}.com", "a".repeat(251));
        let (result, output) = regex_test(&Config::default(), &domain, Some("com$"), true);

        match result {
            Err(HarnessError::InputTooLong { len, max }) => {
                assert_eq!((len, max), (255, 254));
            }
            other => panic!("expected input length error, got {other:?}"),
        }
        assert!(output.is_empty());
    }

    #[test]
    fn test_database_reports_every_match() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());

        let (result, output) = regex_test(&config, "ads.good.example.com", None, false);

        assert_eq!(result.unwrap(), HarnessOutcome::Match);
        assert!(output.contains("Compiled 3 black- and 1 whitelist regex filters in"));
        assert!(output.contains("    ^ads\\. matches (regex blacklist, DB ID 1)"));
        assert!(output.contains("    \\.example\\.com$ matches (regex blacklist, DB ID 2)"));
        assert!(output.contains("    ^ads\\.good\\. matches (regex whitelist, DB ID 9)"));
    }

    #[test]
    fn test_database_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());

        let (result, output) = regex_test(&config, "www.example.org", None, false);

        assert_eq!(result.unwrap(), HarnessOutcome::NoMatch);
        assert!(!output.contains("matches"));
    }

    #[test]
    fn test_quiet_keeps_match_lines() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());

        let (result, output) = regex_test(&config, "ads.example.com", None, true);

        assert_eq!(result.unwrap(), HarnessOutcome::Match);
        assert_eq!(
            output,
            "    ^ads\\. matches (regex blacklist, DB ID 1)\n    \\.example\\.com$ matches (regex blacklist, DB ID 2)\n"
        );
    }

    #[test]
    fn test_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database: dir.path().join("absent.json"),
            ..Config::default()
        };

        let (result, _) = regex_test(&config, "ads.example.com", None, false);
        assert!(matches!(result, Err(HarnessError::Store(_))));
    }

    #[test]
    fn test_check_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let check = |domain: &str, client: Option<&str>| {
            let opts = CheckOptions {
                domain: domain.to_string(),
                client: client.map(str::to_string),
                debug: false,
            };
            let mut out = Vec::new();
            let outcome = run_check(&config, &opts, &mut out).unwrap();
            (outcome, String::from_utf8(out).unwrap())
        };

        let (outcome, output) = check("ads.good.example.com", None);
        assert_eq!(outcome, HarnessOutcome::Match);
        assert_eq!(output, "ads.good.example.com: allowed by regex whitelist (DB ID 9)\n");

        let (_, output) = check("video.cdn.net", Some("10.0.0.4"));
        assert_eq!(output, "video.cdn.net: blocked by regex blacklist (DB ID 3)\n");

        let (outcome, output) = check("video.cdn.net", Some("10.0.0.5"));
        assert_eq!(outcome, HarnessOutcome::NoMatch);
        assert_eq!(output, "video.cdn.net: no regex filter applies\n");
    }
}
