//! Error-template matching turns a sandbox validation log into a structured
//! hint about *why* an environment failed (spec.md §4.E step "classify"),
//! grounded on the regex table in `env_validation/template.py` of the
//! distilled system: `ModuleNotFoundError`, `ImportError`,
//! `<module> has no attribute <name>`, `<object> has no attribute <name>`,
//! and `SyntaxError`.

use once_cell::sync::Lazy;
use regex::Regex;

use envpin_normalize::TopModule;

/// What an error template matched, and what it implies about the next
/// adjustment (spec.md §4.E): either a whole module is missing, or one
/// attribute lookup within an otherwise-present module failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchedTemplate {
    ModuleNotFound { module: TopModule },
    ImportError { module: TopModule },
    ModuleAttributeError { module: TopModule, attribute: String },
    ObjectAttributeError { object: String, attribute: String },
    SyntaxError { message: String },
    Unrecognized,
}

pub trait ErrorTemplateMatcher {
    /// Classifies a single log line (or short log excerpt). Callers split
    /// multi-line logs themselves and take the first non-`Unrecognized`
    /// match, mirroring the line-by-line scan in the distilled matcher.
    fn classify(&self, log_line: &str) -> MatchedTemplate;
}

static RE_MODULE_NOT_FOUND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"No module named '(?P<module>[\w.]+)'").unwrap());

static RE_IMPORT_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"cannot import name '[\w.]+' from '(?P<module>[\w.]+)'").unwrap()
});

static RE_MODULE_ATTRIBUTE_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"module '(?P<module>[\w.]+)' has no attribute '(?P<attribute>\w+)'").unwrap()
});

static RE_OBJECT_ATTRIBUTE_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'(?P<object>\w+)' object has no attribute '(?P<attribute>\w+)'").unwrap()
});

static RE_SYNTAX_ERROR: Lazy<Regex> = Lazy::new(|| Regex::new(r"SyntaxError: (?P<message>.+)$").unwrap());

/// The default matcher: applies the fixed regex table in a fixed order
/// (module-not-found before plain import error, since the former is a
/// special case of the latter's surface text in some interpreter
/// versions).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorTemplateMatcher;

impl ErrorTemplateMatcher for DefaultErrorTemplateMatcher {
    fn classify(&self, log_line: &str) -> MatchedTemplate {
        if let Some(caps) = RE_MODULE_NOT_FOUND.captures(log_line) {
            return MatchedTemplate::ModuleNotFound {
                module: TopModule::from_import(&caps["module"]),
            };
        }
        if let Some(caps) = RE_IMPORT_ERROR.captures(log_line) {
            return MatchedTemplate::ImportError {
                module: TopModule::from_import(&caps["module"]),
            };
        }
        if let Some(caps) = RE_MODULE_ATTRIBUTE_ERROR.captures(log_line) {
            return MatchedTemplate::ModuleAttributeError {
                module: TopModule::from_import(&caps["module"]),
                attribute: caps["attribute"].to_string(),
            };
        }
        if let Some(caps) = RE_OBJECT_ATTRIBUTE_ERROR.captures(log_line) {
            return MatchedTemplate::ObjectAttributeError {
                object: caps["object"].to_string(),
                attribute: caps["attribute"].to_string(),
            };
        }
        if let Some(caps) = RE_SYNTAX_ERROR.captures(log_line) {
            return MatchedTemplate::SyntaxError {
                message: caps["message"].to_string(),
            };
        }
        MatchedTemplate::Unrecognized
    }
}

impl DefaultErrorTemplateMatcher {
    /// Scans a full (possibly multi-line) log and returns the first
    /// recognized template, or `Unrecognized` if none matched any line.
    pub fn classify_log(&self, log: &str) -> MatchedTemplate {
        classify_log(self, log)
    }
}

/// Scans a full (possibly multi-line) log line by line with any
/// [`ErrorTemplateMatcher`], returning the first recognized template or
/// `Unrecognized` if none matched — the generic form of
/// [`DefaultErrorTemplateMatcher::classify_log`], usable with a caller's own
/// matcher (e.g. a test fake).
pub fn classify_log<T: ErrorTemplateMatcher + ?Sized>(matcher: &T, log: &str) -> MatchedTemplate {
    for line in log.lines() {
        match matcher.classify(line) {
            MatchedTemplate::Unrecognized => continue,
            matched => return matched,
        }
    }
    MatchedTemplate::Unrecognized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_module_not_found() {
        let m = DefaultErrorTemplateMatcher.classify("ModuleNotFoundError: No module named 'requests'");
        assert_eq!(
            m,
            MatchedTemplate::ModuleNotFound {
                module: TopModule::from_import("requests")
            }
        );
    }

    #[test]
    fn matches_module_attribute_error() {
        let m = DefaultErrorTemplateMatcher
            .classify("AttributeError: module 'numpy' has no attribute 'matrixx'");
        assert_eq!(
            m,
            MatchedTemplate::ModuleAttributeError {
                module: TopModule::from_import("numpy"),
                attribute: "matrixx".to_string(),
            }
        );
    }

    #[test]
    fn falls_through_unrecognized_lines_in_a_log() {
        let log = "Traceback (most recent call last):\n  File \"x.py\"\nModuleNotFoundError: No module named 'flask'\n";
        let m = DefaultErrorTemplateMatcher.classify_log(log);
        assert_eq!(
            m,
            MatchedTemplate::ModuleNotFound {
                module: TopModule::from_import("flask")
            }
        );
    }

    #[test]
    fn unrecognized_when_nothing_matches() {
        let m = DefaultErrorTemplateMatcher.classify_log("everything is fine\n");
        assert_eq!(m, MatchedTemplate::Unrecognized);
    }
}
