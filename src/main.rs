use std::{
    fs,
    io::{self, Read},
};

use anyhow::{anyhow, bail, Context};
use clap::{App, Arg, ArgMatches};
use kaleidoscope_frontend::{parser::DEFAULT_MAX_DEPTH, Lexer, Parser, PrecedenceTable};
use log::{error, info, LevelFilter};

fn init_logger(verbosity: u64) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbosity > 0 {
        builder.filter_level(match verbosity {
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        });
    }
    builder.init();
}

/// read an operator binding of the form `CHAR=PREC`, e.g. `/=40`
fn parse_operator(binding: &str) -> anyhow::Result<(char, u32)> {
    let (op, precedence) = binding
        .split_once('=')
        .ok_or_else(|| anyhow!("operator binding `{}` should look like CHAR=PREC", binding))?;
    let mut chars = op.chars();
    let op = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => bail!("operator `{}` must be a single character", op),
    };
    let precedence = precedence
        .parse()
        .with_context(|| format!("invalid precedence for operator '{}'", op))?;
    Ok((op, precedence))
}

fn precedence_table(matches: &ArgMatches) -> anyhow::Result<PrecedenceTable> {
    let mut table = PrecedenceTable::default();
    for binding in matches.values_of("op").into_iter().flatten() {
        let (op, precedence) = parse_operator(binding)?;
        table.register(op, precedence)?;
        info!("registered operator '{}' with precedence {}", op, precedence);
    }
    Ok(table)
}

fn parse_all<I: Iterator<Item = char>>(parser: Parser<I>) -> anyhow::Result<()> {
    let (mut parsed, mut failed) = (0usize, 0usize);
    for result in parser {
        match result {
            Ok(node) => {
                parsed += 1;
                println!("{}", node);
            }
            Err(err) => {
                failed += 1;
                eprintln!("error: {}", err);
            }
        }
    }

    info!("parsed {} constructs with {} errors", parsed, failed);
    if failed > 0 {
        bail!("{} of {} constructs failed to parse", failed, parsed + failed);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let matches = App::new("kaleidoscope")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("INPUT")
                .help("source file to read, stdin when omitted")
                .index(1),
        )
        .arg(
            Arg::with_name("tokens")
                .long("tokens")
                .help("print the token stream instead of parsing"),
        )
        .arg(
            Arg::with_name("op")
                .long("op")
                .value_name("CHAR=PREC")
                .help("register an extra binary operator")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("max-depth")
                .long("max-depth")
                .value_name("N")
                .help("deepest expression nesting accepted")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("log more, repeat for more detail"),
        )
        .get_matches();

    init_logger(matches.occurrences_of("verbose"));

    let table = precedence_table(&matches)?;
    let max_depth = match matches.value_of("max-depth") {
        Some(depth) => depth.parse().context("--max-depth expects a number")?,
        None => DEFAULT_MAX_DEPTH,
    };

    let source;
    let input: Box<dyn Iterator<Item = char> + '_> = match matches.value_of("INPUT") {
        Some(path) => {
            source = fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
            Box::new(source.chars())
        }
        None => Box::new(
            io::stdin()
                .lock()
                .bytes()
                .map_while(|byte| {
                    byte.map_err(|err| error!("failed to read stdin: {}", err))
                        .ok()
                })
                .map(char::from),
        ),
    };

    if matches.is_present("tokens") {
        for token in Lexer::new(input) {
            println!("{}", token);
        }
        return Ok(());
    }

    parse_all(Parser::new(input, table).with_max_depth(max_depth))
}
