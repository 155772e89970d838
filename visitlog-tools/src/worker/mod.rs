use clap::{load_yaml, App, ArgMatches};
use log::debug;
use visitlog::task::run_worker;
use visitlog_tools::AppResult;

fn main_impl(matches: ArgMatches<'_>) -> AppResult<()> {
    let manifest = matches.value_of("manifest").unwrap();
    let start: u64 = matches.value_of("start").unwrap().parse()?;
    let end: u64 = matches.value_of("end").unwrap().parse()?;
    let output = matches.value_of("output").unwrap();

    let stats = run_worker(manifest, start, end, output)?;
    debug!("Worker [{}, {}) counted {} records", start, end, stats.records);
    Ok(())
}

pub fn entry_point(args: Vec<String>) -> AppResult<()> {
    let yaml = load_yaml!("cli.yml");
    let matches = App::from_yaml(yaml)
        .version(visitlog::VERSION)
        .get_matches_from(args);

    main_impl(matches)
}
