use clap::{load_yaml, App, ArgMatches};
use log::info;
use std::fs::File;
use std::time::Instant;
use visitlog::{read_path_list, LogParser};
use visitlog_tools::{load_config, setup_thread_pool, AppResult};

fn main_impl(matches: ArgMatches<'_>) -> AppResult<()> {
    setup_thread_pool(&matches)?;
    let config = load_config(&matches)?;

    let input = matches.value_of("input-file").unwrap();
    let output = matches.value_of("output-file").unwrap();
    let known_paths = match matches.value_of("paths") {
        Some(path) => read_path_list(File::open(path)?)?,
        None => vec![],
    };

    let begin = Instant::now();
    let aggregate = LogParser::new(config).parse_with_known_paths(input, output, known_paths)?;
    info!(
        "Report of {} paths written to {} in {}ms",
        aggregate.paths.len(),
        output,
        begin.elapsed().as_millis()
    );

    if matches.is_present("summary") {
        let stats = aggregate.stats;
        eprintln!("chunks\t{}", aggregate.bounds.len().saturating_sub(1));
        eprintln!("records\t{}", stats.records);
        eprintln!("unresolved\t{}", stats.unresolved);
        eprintln!("malformed\t{}", stats.malformed);
        eprintln!("truncated\t{}", stats.truncated);
    }
    Ok(())
}

pub fn entry_point(args: Vec<String>) -> AppResult<()> {
    let yaml = load_yaml!("cli.yml");
    let matches = App::from_yaml(yaml)
        .version(visitlog::VERSION)
        .get_matches_from(args);

    main_impl(matches)
}
