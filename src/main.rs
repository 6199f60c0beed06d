use std::process;

use coolc::cli::{parse_args, run};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = parse_args(&args);

    if options.inputs.is_empty() {
        eprintln!("usage: coolc [+-]flag... [-o output] file.cl...");
        process::exit(-1);
    }

    process::exit(run(&options));
}
