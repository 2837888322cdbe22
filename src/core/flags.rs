//! # Command-line flags declared by units.
//!
//! [`Flags`] wraps a [`clap::Command`]. Configure hooks declare typed, long-only
//! flags (`--name=value`); new hooks read the parsed values back.
//!
//! ## Rules
//! - Names are unique; `help`, `version` and `args` are reserved.
//! - Every flag has a default, so getters return `Some` once arguments are parsed.
//! - Boolean flags take an optional `=value`: `--debug` and `--debug=true` are equal.
//! - Durations use Go-style text: `300ms`, `1.5s`, `1m30s`, `2h`.
//! - Unmatched words are kept as positional arguments, see [`Flags::args`].
//! - `-help` and `-version` are accepted as spellings of `--help` and `--version`.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt::Write as _;
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use crate::error::RuntimeError;

const HELP: &str = "help";
const VERSION: &str = "version";
const ARGS: &str = "args";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    String,
    Int,
    Uint,
    Float,
    Duration,
}

/// Outcome of [`Flags::parse`] when parsing succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Parsed {
    Run,
    Help,
    Version,
}

/// Rewrites `-help` and `-version` to their long forms; clap would read them
/// as bundles of short flags. Words after `--` are left alone.
fn single_dash_aliases<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut escaped = false;
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if escaped {
                return arg;
            }
            match arg.to_str() {
                Some("--") => {
                    escaped = true;
                    arg
                }
                Some("-help") => OsString::from("--help"),
                Some("-version") => OsString::from("--version"),
                _ => arg,
            }
        })
        .collect()
}

/// Typed command-line flags.
pub struct Flags {
    command: Command,
    version: Option<String>,
    kinds: HashMap<String, Kind>,
    matches: Option<ArgMatches>,
}

impl Flags {
    /// Creates an empty flag set for application `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let command = Command::new(name.into())
            .no_binary_name(true)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .arg(
                Arg::new(HELP)
                    .long(HELP)
                    .short('h')
                    .action(ArgAction::SetTrue)
                    .help("Print help"),
            )
            .arg(
                Arg::new(VERSION)
                    .long(VERSION)
                    .action(ArgAction::SetTrue)
                    .help("Print version"),
            )
            .arg(
                Arg::new(ARGS)
                    .num_args(0..)
                    .action(ArgAction::Append)
                    .value_parser(value_parser!(String))
                    .help("Positional arguments"),
            );
        Self {
            command,
            version: None,
            kinds: HashMap::new(),
            matches: None,
        }
    }

    /// Sets the version string printed by `--version`.
    pub fn with_version(mut self, version: Option<String>) -> Self {
        if let Some(v) = &version {
            self.command = self.command.version(v.clone());
        }
        self.version = version;
        self
    }

    /// Sets the description shown by `--help`.
    pub fn with_about(mut self, about: Option<String>) -> Self {
        if let Some(a) = about {
            self.command = self.command.about(a);
        }
        self
    }

    fn declare(&mut self, name: &str, kind: Kind, arg: Arg) -> Result<(), RuntimeError> {
        if name.is_empty() {
            return Err(RuntimeError::bad_parameter("flag name is empty"));
        }
        if matches!(name, HELP | VERSION | ARGS) {
            return Err(RuntimeError::bad_parameter(format!("flag name {name:?} is reserved")));
        }
        if self.matches.is_some() {
            return Err(RuntimeError::out_of_order(format!(
                "flag {name:?} declared after parsing"
            )));
        }
        if self.kinds.contains_key(name) {
            return Err(RuntimeError::bad_parameter(format!("flag {name:?} declared twice")));
        }
        self.kinds.insert(name.to_string(), kind);
        let command = std::mem::replace(&mut self.command, Command::new(""));
        self.command = command.arg(arg);
        Ok(())
    }

    fn arg(name: &str, help: &str, default: String) -> Arg {
        Arg::new(name.to_string())
            .long(name.to_string())
            .help(help.to_string())
            .default_value(default)
            .action(ArgAction::Set)
    }

    /// Declares `--name[=true|false]`.
    pub fn bool(&mut self, name: &str, default: bool, help: &str) -> Result<(), RuntimeError> {
        let arg = Self::arg(name, help, default.to_string())
            .value_parser(value_parser!(bool))
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true");
        self.declare(name, Kind::Bool, arg)
    }

    /// Declares `--name=text`.
    pub fn string(&mut self, name: &str, default: &str, help: &str) -> Result<(), RuntimeError> {
        let arg = Self::arg(name, help, default.to_string()).value_parser(value_parser!(String));
        self.declare(name, Kind::String, arg)
    }

    /// Declares `--name=<i64>`.
    pub fn int(&mut self, name: &str, default: i64, help: &str) -> Result<(), RuntimeError> {
        let arg = Self::arg(name, help, default.to_string())
            .value_parser(value_parser!(i64))
            .allow_negative_numbers(true);
        self.declare(name, Kind::Int, arg)
    }

    /// Declares `--name=<u64>`.
    pub fn uint(&mut self, name: &str, default: u64, help: &str) -> Result<(), RuntimeError> {
        let arg = Self::arg(name, help, default.to_string()).value_parser(value_parser!(u64));
        self.declare(name, Kind::Uint, arg)
    }

    /// Declares `--name=<f64>`.
    pub fn float(&mut self, name: &str, default: f64, help: &str) -> Result<(), RuntimeError> {
        let arg = Self::arg(name, help, default.to_string())
            .value_parser(value_parser!(f64))
            .allow_negative_numbers(true);
        self.declare(name, Kind::Float, arg)
    }

    /// Declares `--name=<duration>`, e.g. `--poll=1m30s`.
    pub fn duration(&mut self, name: &str, default: Duration, help: &str) -> Result<(), RuntimeError> {
        let arg = Self::arg(name, help, format_duration(default)).value_parser(parse_duration);
        self.declare(name, Kind::Duration, arg)
    }

    /// True if a flag called `name` has been declared.
    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Parses `args` (program name excluded).
    pub(crate) fn parse<I, T>(&mut self, args: I) -> Result<Parsed, RuntimeError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        if self.matches.is_some() {
            return Err(RuntimeError::out_of_order("arguments already parsed"));
        }
        let matches = self
            .command
            .try_get_matches_from_mut(single_dash_aliases(args))
            .map_err(|e| RuntimeError::bad_parameter(e.to_string().trim_end().to_string()))?;

        let parsed = if matches.get_flag(HELP) {
            Parsed::Help
        } else if matches.get_flag(VERSION) {
            Parsed::Version
        } else {
            Parsed::Run
        };
        self.matches = Some(matches);
        Ok(parsed)
    }

    /// Rendered usage text.
    pub fn usage(&mut self) -> String {
        self.command.render_help().to_string()
    }

    /// `name version` line printed by `--version`.
    pub fn version_line(&self) -> String {
        match &self.version {
            Some(v) => format!("{} {v}", self.command.get_name()),
            None => self.command.get_name().to_string(),
        }
    }

    fn get<T: Clone + Send + Sync + 'static>(&self, name: &str, kind: Kind) -> Option<T> {
        if self.kinds.get(name) != Some(&kind) {
            return None;
        }
        self.matches
            .as_ref()?
            .try_get_one::<T>(name)
            .ok()
            .flatten()
            .cloned()
    }

    /// Value of a bool flag; `None` before parsing or for an unknown name.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name, Kind::Bool)
    }

    /// Value of a string flag.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get(name, Kind::String)
    }

    /// Value of an int flag.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name, Kind::Int)
    }

    /// Value of a uint flag.
    pub fn get_uint(&self, name: &str) -> Option<u64> {
        self.get(name, Kind::Uint)
    }

    /// Value of a float flag.
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name, Kind::Float)
    }

    /// Value of a duration flag.
    pub fn get_duration(&self, name: &str) -> Option<Duration> {
        self.get(name, Kind::Duration)
    }

    /// Positional arguments, in order.
    pub fn args(&self) -> Vec<String> {
        self.matches
            .as_ref()
            .and_then(|m| m.try_get_many::<String>(ARGS).ok().flatten())
            .map(|vals| vals.cloned().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.kinds.keys().collect();
        names.sort();
        f.debug_struct("Flags")
            .field("name", &self.command.get_name())
            .field("flags", &names)
            .field("parsed", &self.matches.is_some())
            .finish()
    }
}

/// Parses Go-style duration text: a sequence of decimal numbers with units
/// `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` is accepted.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    const FRACTION_DIGITS: u32 = 18;

    let s = text.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut rest = s;
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (num, tail) = rest.split_at(num_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        rest = tail;

        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            "" => return Err(format!("missing unit in duration {text:?}")),
            other => return Err(format!("unknown unit {other:?} in duration {text:?}")),
        };

        let (int, frac) = num.split_once('.').unwrap_or((num, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(format!("invalid duration {text:?}"));
        }
        let int_value: u128 = if int.is_empty() {
            0
        } else {
            int.parse()
                .map_err(|_| format!("invalid duration {text:?}"))?
        };
        let mut frac_value: u128 = 0;
        let mut denom: u128 = 1;
        for (i, b) in frac.bytes().enumerate() {
            if !b.is_ascii_digit() {
                return Err(format!("invalid duration {text:?}"));
            }
            if (i as u32) < FRACTION_DIGITS {
                frac_value = frac_value * 10 + u128::from(b - b'0');
                denom *= 10;
            }
        }

        let part = int_value
            .checked_mul(scale)
            .and_then(|v| v.checked_add(frac_value * scale / denom))
            .ok_or_else(|| format!("duration {text:?} overflows"))?;
        total = total
            .checked_add(part)
            .ok_or_else(|| format!("duration {text:?} overflows"))?;
    }

    let secs = u64::try_from(total / 1_000_000_000)
        .map_err(|_| format!("duration {text:?} overflows"))?;
    Ok(Duration::new(secs, (total % 1_000_000_000) as u32))
}

/// Formats `d` the way [`parse_duration`] reads it, e.g. `1h30m0s`, `1.5s`, `250ms`.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    let total = d.as_secs();
    let nanos = d.subsec_nanos();
    let mut out = String::new();

    if total == 0 {
        let _ = match nanos {
            n if n % 1_000_000 == 0 => write!(out, "{}ms", n / 1_000_000),
            n if n % 1_000 == 0 => write!(out, "{}us", n / 1_000),
            n => write!(out, "{n}ns"),
        };
        return out;
    }

    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        let _ = write!(out, "{h}h");
    }
    if h > 0 || m > 0 {
        let _ = write!(out, "{m}m");
    }
    if nanos == 0 {
        let _ = write!(out, "{s}s");
    } else {
        let frac = format!("{nanos:09}");
        let _ = write!(out, "{s}.{}s", frac.trim_end_matches('0'));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> Flags {
        let mut f = Flags::new("demo").with_version(Some("1.2.3".into()));
        f.bool("debug", false, "Verbose logs").unwrap();
        f.string("mode", "auto", "Mode").unwrap();
        f.int("offset", -3, "Offset").unwrap();
        f.uint("display.width", 800, "Width").unwrap();
        f.float("gain", 0.5, "Gain").unwrap();
        f.duration("poll", Duration::from_secs(90), "Poll interval").unwrap();
        f
    }

    #[test]
    fn defaults_apply() {
        let mut f = flags();
        assert_eq!(f.get_uint("display.width"), None);
        assert_eq!(f.parse(Vec::<String>::new()).unwrap(), Parsed::Run);

        assert_eq!(f.get_bool("debug"), Some(false));
        assert_eq!(f.get_string("mode").as_deref(), Some("auto"));
        assert_eq!(f.get_int("offset"), Some(-3));
        assert_eq!(f.get_uint("display.width"), Some(800));
        assert_eq!(f.get_float("gain"), Some(0.5));
        assert_eq!(f.get_duration("poll"), Some(Duration::from_secs(90)));
        assert!(f.args().is_empty());
    }

    #[test]
    fn values_and_positionals() {
        let mut f = flags();
        f.parse([
            "--debug",
            "--mode=manual",
            "--offset=-7",
            "--display.width",
            "1024",
            "--gain=1.25",
            "--poll=1m30s",
            "one",
            "two",
        ])
        .unwrap();

        assert_eq!(f.get_bool("debug"), Some(true));
        assert_eq!(f.get_string("mode").as_deref(), Some("manual"));
        assert_eq!(f.get_int("offset"), Some(-7));
        assert_eq!(f.get_uint("display.width"), Some(1024));
        assert_eq!(f.get_float("gain"), Some(1.25));
        assert_eq!(f.get_duration("poll"), Some(Duration::from_secs(90)));
        assert_eq!(f.args(), ["one", "two"]);
    }

    #[test]
    fn wrong_kind_reads_none() {
        let mut f = flags();
        f.parse(Vec::<String>::new()).unwrap();
        assert_eq!(f.get_int("display.width"), None);
        assert_eq!(f.get_string("missing"), None);
    }

    #[test]
    fn bad_values_are_bad_parameters() {
        let mut f = flags();
        assert!(matches!(
            f.parse(["--display.width=-1"]),
            Err(RuntimeError::BadParameter { .. })
        ));
        let mut f = flags();
        assert!(matches!(
            f.parse(["--poll=soon"]),
            Err(RuntimeError::BadParameter { .. })
        ));
        let mut f = flags();
        assert!(matches!(
            f.parse(["--nope"]),
            Err(RuntimeError::BadParameter { .. })
        ));
    }

    #[test]
    fn duplicates_and_reserved_names() {
        let mut f = flags();
        assert!(matches!(
            f.uint("display.width", 1, ""),
            Err(RuntimeError::BadParameter { .. })
        ));
        for name in ["help", "version", "args", ""] {
            assert!(matches!(
                f.bool(name, false, ""),
                Err(RuntimeError::BadParameter { .. })
            ));
        }
    }

    #[test]
    fn declare_after_parse_is_out_of_order() {
        let mut f = flags();
        f.parse(Vec::<String>::new()).unwrap();
        assert!(matches!(
            f.bool("late", false, ""),
            Err(RuntimeError::OutOfOrder { .. })
        ));
        assert!(matches!(
            f.parse(Vec::<String>::new()),
            Err(RuntimeError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn help_and_version() {
        let mut f = flags();
        assert_eq!(f.parse(["-h"]).unwrap(), Parsed::Help);
        assert!(f.usage().contains("--display.width"));

        let mut f = flags();
        assert_eq!(f.parse(["--version"]).unwrap(), Parsed::Version);
        assert_eq!(f.version_line(), "demo 1.2.3");
    }

    #[test]
    fn single_dash_help_and_version() {
        let mut f = flags();
        assert_eq!(f.parse(["-help"]).unwrap(), Parsed::Help);

        let mut f = flags();
        assert_eq!(f.parse(["-version"]).unwrap(), Parsed::Version);

        let mut f = flags();
        assert_eq!(f.parse(["--", "-help"]).unwrap(), Parsed::Run);
        assert_eq!(f.args(), ["-help"]);
    }

    #[test]
    fn go_style_durations() {
        let cases = [
            ("0", Duration::ZERO),
            ("300ms", Duration::from_millis(300)),
            ("1.5s", Duration::from_millis(1500)),
            ("1m30s", Duration::from_secs(90)),
            ("2h", Duration::from_secs(7200)),
            ("1h2m3s4ms", Duration::new(3723, 4_000_000)),
            ("10us", Duration::from_micros(10)),
            ("10µs", Duration::from_micros(10)),
            ("7ns", Duration::from_nanos(7)),
            (".5s", Duration::from_millis(500)),
        ];
        for (text, want) in cases {
            assert_eq!(parse_duration(text), Ok(want), "{text}");
        }
        for bad in ["", "5", "s", "1x", "-1s", "1..2s", "."] {
            assert!(parse_duration(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn formatted_durations_parse_back() {
        for d in [
            Duration::ZERO,
            Duration::from_millis(250),
            Duration::from_micros(3),
            Duration::from_nanos(9),
            Duration::from_millis(1500),
            Duration::from_secs(5400),
            Duration::new(3723, 4_000_000),
        ] {
            assert_eq!(parse_duration(&format_duration(d)), Ok(d));
        }
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m0s");
    }
}
