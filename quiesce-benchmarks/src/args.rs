//! Command-Line Argument Analyzer
//!
//! A small parser for the driver's option grammar:
//!
//! - `-k` and `--key` record a switch (empty value),
//! - `-k=v` and `--key=v` record a key/value pair,
//! - `--` terminates options; everything after it is positional,
//! - tokens without a leading dash are positional.
//!
//! Keys are stored without their dashes, so `-n` and `--n` are the same
//! switch.

use std::collections::HashMap;
use std::str::FromStr;

/// Parsed command-line input: a key/value map plus positional arguments.
#[derive(Debug, Default)]
pub struct Argv {
    kv: HashMap<String, String>,
    positional: Vec<String>,
}

impl Argv {
    /// Parses an iterator of tokens (the program name already stripped).
    pub fn parse<I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut kv = HashMap::new();
        let mut positional = Vec::new();
        let mut options_done = false;

        for token in tokens {
            if options_done {
                positional.push(token);
                continue;
            }

            if token == "--" {
                options_done = true;
                continue;
            }

            let body = token
                .strip_prefix("--")
                .or_else(|| token.strip_prefix('-'));

            match body {
                Some(body) => {
                    let (key, value) = match body.split_once('=') {
                        Some((key, value)) => (key, value),
                        None => (body, ""),
                    };
                    kv.insert(key.to_owned(), value.to_owned());
                }
                None => positional.push(token),
            }
        }

        Self { kv, positional }
    }

    /// Parses the process arguments, skipping the program name.
    pub fn from_env() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    /// Whether `key` was given, as a switch or with a value.
    pub fn has(&self, key: &str) -> bool {
        self.kv.contains_key(key)
    }

    /// The raw value of `key`; empty string for a bare switch.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.kv.get(key).map(String::as_str)
    }

    /// The value of `key` parsed as `T`.
    ///
    /// `Ok(None)` when the key is absent; `Err` carries the parse failure so
    /// the caller can report it and exit non-zero.
    pub fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, T::Err> {
        self.value(key).map(str::parse).transpose()
    }

    /// The key/value map of all options.
    pub fn kv_map(&self) -> &HashMap<String, String> {
        &self.kv
    }

    /// Positional arguments, in order.
    pub fn positional(&self) -> &[String] {
        &self.positional
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(tokens: &[&str]) -> Argv {
        Argv::parse(tokens.iter().map(|token| (*token).to_owned()))
    }

    #[test]
    fn test_grammar_forms() {
        let args = parse(&[
            "test",
            "-1",
            "--second_key=2nd_value",
            "--3",
            "--fourth_key",
            "--",
            "--b=nonsense",
            "value_1",
            "value_2",
        ]);

        assert_eq!(args.value("second_key"), Some("2nd_value"));
        assert!(args.has("1"));
        assert!(args.has("3"));
        assert_eq!(args.value("fourth_key"), Some(""));

        // Everything after "--" is positional, dashes and all.
        assert_eq!(
            args.positional(),
            &["test", "--b=nonsense", "value_1", "value_2"]
        );
        assert!(!args.has("b"));
    }

    #[test]
    fn test_numeric_values() {
        let args = parse(&["--thread_num=12", "--workload=100"]);

        assert_eq!(args.parsed::<u64>("thread_num"), Ok(Some(12)));
        assert_eq!(args.parsed::<u64>("workload"), Ok(Some(100)));
        assert_eq!(args.parsed::<u64>("absent"), Ok(None));
    }

    #[test]
    fn test_malformed_numeric_is_an_error() {
        let args = parse(&["--thread_num=twelve"]);
        assert!(args.parsed::<u64>("thread_num").is_err());
    }

    #[test]
    fn test_last_occurrence_wins() {
        let args = parse(&["--n=1", "--n=2"]);
        assert_eq!(args.value("n"), Some("2"));
    }
}
