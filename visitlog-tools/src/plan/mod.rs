use clap::{load_yaml, App, ArgMatches};
use std::fs::File;
use std::io::{stdout, BufWriter, Write};
use visitlog::{read_path_list, LogParser};
use visitlog_tools::{load_config, AppResult};

fn main_impl(matches: ArgMatches<'_>) -> AppResult<()> {
    let config = load_config(&matches)?;
    let input = matches.value_of("input-file").unwrap();
    let known_paths = match matches.value_of("paths") {
        Some(path) => read_path_list(File::open(path)?)?,
        None => vec![],
    };

    let parser = LogParser::new(config);
    let plan = parser.plan(input, known_paths)?;

    if matches.is_present("dump-dict") {
        println!("{}", plan.paths.pretty_print()?);
        return Ok(());
    }

    let stdout = stdout();
    let mut out = BufWriter::new(stdout.lock());
    let (first_year, last_year) = plan.calendar.span();
    writeln!(out, "# paths: {}", plan.paths.len())?;
    writeln!(out, "# days: {} ({}-{})", plan.calendar.len(), first_year, last_year)?;
    writeln!(out, "# execution: {:?}", parser.config().execution)?;
    for (idx, (begin, end)) in plan.chunks().enumerate() {
        let role = if idx == 0 { "host" } else { "worker" };
        writeln!(out, "{}\t{}\t{}\t{}", idx, role, begin, end)?;
    }
    out.flush()?;
    Ok(())
}

pub fn entry_point(args: Vec<String>) -> AppResult<()> {
    let yaml = load_yaml!("cli.yml");
    let matches = App::from_yaml(yaml)
        .version(visitlog::VERSION)
        .get_matches_from(args);

    main_impl(matches)
}
