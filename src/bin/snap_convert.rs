//! CSV.GZ -> mmappable `.snap` converter.
//!
//! Exit codes: 0 on success, 2 on usage error, 1 on conversion failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lobsim::data::convert;

#[derive(Parser)]
#[command(
    name = "snap-convert",
    about = "Convert a gzipped L2 snapshot CSV into the mmappable .snap format",
    long_about = "Streams <input.csv.gz> and writes fixed-size snapshot records to \
                  <output.snap>. The input must carry a header row with ts_recv_ns \
                  (required), ts_event_ms (optional), and bid_p{i}/bid_q{i}/\
                  ask_p{i}/ask_q{i} columns for i in [1,20]. Output is written to \
                  <output.snap>.part and atomically renamed on success."
)]
struct Args {
    /// Gzipped CSV input.
    input: PathBuf,
    /// Destination .snap file.
    output: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    // clap exits with code 2 on usage errors before we get here.
    let args = Args::parse();

    match convert(&args.input, &args.output) {
        Ok(summary) => {
            tracing::info!(
                records_written = summary.records_written,
                bad_rows = summary.bad_rows,
                output = %args.output.display(),
                "ok"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(input = %args.input.display(), error = %err, "conversion failed");
            ExitCode::FAILURE
        }
    }
}
