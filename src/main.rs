use std::{
    env,
    process,
};

use ankiport::cli;
use log::error;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match cli::parse_args(env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            error!("{}", e);
            eprint!("{}", cli::USAGE);
            process::exit(2);
        }
    };

    if let Err(e) = cli::run(cli) {
        error!("{}", e);
        process::exit(1);
    }
}
