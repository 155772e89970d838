use clap::ArgMatches;
use rayon::ThreadPoolBuildError;
use std::io::{Error, ErrorKind};
use visitlog::{Execution, ParserConfig};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

pub fn setup_thread_pool(matches: &ArgMatches) -> Result<(), ThreadPoolBuildError> {
    if let Some(threads) = matches.value_of("threads") {
        if let Ok(threads) = threads.parse() {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()?;
        }
    }
    Ok(())
}

/// Parse a `<from>-<to>` year span, either side may be left out
pub fn parse_year_span(spec: &str, default: (u32, u32)) -> std::io::Result<(u32, u32)> {
    let pattern = regex::Regex::new(r"^(?P<from>\d*)-(?P<to>\d*)$")
        .map_err(|e| Error::new(ErrorKind::Other, e))?;
    let invalid = || Error::new(ErrorKind::InvalidInput, format!("Invalid year span {}", spec));
    let caps = pattern.captures(spec).ok_or_else(invalid)?;
    let year = |name: &str, default: u32| match caps.name(name).map(|m| m.as_str()) {
        Some("") | None => Ok(default),
        Some(text) => text.parse().map_err(|_| invalid()),
    };
    let from = year("from", default.0)?;
    let to = year("to", default.1)?;
    if from > to {
        return Err(invalid());
    }
    Ok((from, to))
}

/// Build the parser config from an optional JSON file plus the command line overrides
pub fn load_config(matches: &ArgMatches) -> AppResult<ParserConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => ParserConfig::from_json_file(path)?,
        None => ParserConfig::default(),
    };
    if let Some(workers) = matches.value_of("workers") {
        config.workers = workers.parse()?;
    }
    if let Some(threshold) = matches.value_of("parallel-threshold") {
        config.parallel_threshold = threshold.parse()?;
    }
    if let Some(mode) = matches.value_of("execution") {
        config.execution = mode.parse::<Execution>()?;
    }
    if let Some(spec) = matches.value_of("years") {
        let (from, to) = parse_year_span(spec, (config.start_year, config.end_year))?;
        config.start_year = from;
        config.end_year = to;
    }
    if let Some(prefix) = matches.value_of("route-prefix") {
        config.route_prefix = prefix.to_owned();
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_spans() {
        assert_eq!(parse_year_span("2021-2023", (2020, 2026)).unwrap(), (2021, 2023));
        assert_eq!(parse_year_span("-2023", (2020, 2026)).unwrap(), (2020, 2023));
        assert_eq!(parse_year_span("2024-", (2020, 2026)).unwrap(), (2024, 2026));
        assert!(parse_year_span("2024", (2020, 2026)).is_err());
        assert!(parse_year_span("2025-2021", (2020, 2026)).is_err());
        assert!(parse_year_span("a-b", (2020, 2026)).is_err());
    }
}
