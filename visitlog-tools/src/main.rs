mod parse;
mod plan;
mod worker;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "warn"),
    );
    let args: Vec<_> = std::env::args().skip(1).collect();
    let ret = match args.first().map(AsRef::as_ref) {
        Some("parse") => parse::entry_point(args),
        Some("plan") => plan::entry_point(args),
        Some("worker") => worker::entry_point(args),
        _ => {
            eprintln!(
                "Visit Log Utilities Program {}(visitlog library version: {})",
                visitlog_tools::VERSION,
                visitlog::VERSION
            );
            eprintln!("Usage: visitlog <subcommand> <args>");
            eprintln!("Possible subcommands are:");
            eprintln!("\tparse \tAggregate an access log into a JSON visit report");
            eprintln!("\tplan  \tPrint the discovered paths and the chunk plan of a log");
            eprintln!("\tworker\tScan one chunk for a parent run (internal)");
            eprintln!();
            eprintln!("Type 'visitlog <subcommand> --help' to learn more about each subcommands.");
            Ok(())
        }
    };

    if let Some(io_error) = ret
        .as_ref()
        .err()
        .and_then(|e| e.downcast_ref::<std::io::Error>())
    {
        if io_error.kind() == std::io::ErrorKind::BrokenPipe {
            return Ok(());
        }
    }
    ret
}
