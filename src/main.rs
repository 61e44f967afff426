//! CLI entry point for wave-daq.
//!
//! ```bash
//! # play wave.csv for 10 s (0 = until Ctrl-C)
//! wave-daq out wave.csv 10
//!
//! # record 5 s from the input channel
//! wave-daq in capture.csv 5
//! ```

use wave_daq::cli;

#[tokio::main]
async fn main() {
    let code = match cli::parse(std::env::args_os()) {
        Ok(Ok(invocation)) => cli::execute(invocation).await,
        Ok(Err(code)) => code,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}
